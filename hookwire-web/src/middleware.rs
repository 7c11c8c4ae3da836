//! 中间件模块
//!
//! 提供内置的管道阶段，以及把它们登记进容器的服务提供者。

use std::sync::Arc;
use std::time::Instant;

use http::{HeaderName, HeaderValue};
use hookwire_core::{ApplicationResult, Container, ServiceProvider};

use crate::binding::SubstituteBindings;
use crate::config::RoutingConfig;
use crate::constants::{
    BINDINGS_STAGE, EXCEPTION_HANDLER, LOCAL_PLATFORM, PLATFORM, REQUEST_ID_HEADER,
    REQUEST_ID_STAGE, REQUEST_LOG_STAGE,
};
use crate::error::StageResult;
use crate::exception_handler::{build_exception_handler_registry_from_inventory, ExceptionHandler};
use crate::pipeline::{Next, Stage, StageFn};
use crate::platform::{LocalPlatform, Platform};
use crate::request::Request;
use crate::response::Response;

/// 请求日志
pub struct RequestLogging;

impl Stage<Request, Response> for RequestLogging {
    fn handle(&self, request: Request, next: Next<'_, Request, Response>) -> StageResult<Response> {
        let method = request.method().clone();
        let path = request.path().to_string();
        let start = Instant::now();

        let result = next.run(request);
        let elapsed = start.elapsed();

        match &result {
            Ok(response) => tracing::info!(
                method = %method,
                path = %path,
                status = %response.status().as_u16(),
                elapsed = ?elapsed,
                "Request completed"
            ),
            Err(fault) => tracing::info!(
                method = %method,
                path = %path,
                status = %fault.status().as_u16(),
                elapsed = ?elapsed,
                "Request failed"
            ),
        }

        result
    }
}

/// 请求 ID
///
/// 为请求和响应加上 `x-request-id` 头；请求已经带有该头时沿用原值。
pub struct RequestId;

impl Stage<Request, Response> for RequestId {
    fn handle(
        &self,
        mut request: Request,
        next: Next<'_, Request, Response>,
    ) -> StageResult<Response> {
        let header = HeaderName::from_static(REQUEST_ID_HEADER);
        let value = match request.headers().get(&header) {
            Some(existing) => existing.clone(),
            None => {
                let generated = HeaderValue::from_str(&uuid::Uuid::new_v4().to_string())
                    .map_err(anyhow::Error::from)?;
                request.headers_mut().insert(header.clone(), generated.clone());
                generated
            }
        };

        let mut response = next.run(request)?;
        response.headers_mut().insert(header, value);
        Ok(response)
    }
}

/// 内置的请求 ID 阶段，可直接登记到容器
pub fn request_id_stage() -> Arc<dyn Stage<Request, Response>> {
    Arc::new(RequestId)
}

/// 往容器里登记请求阶段
pub trait ContainerStageExt {
    fn register_stage<S>(&self, key: &str, stage: S)
    where
        S: Stage<Request, Response> + 'static;

    fn register_stage_fn<F>(&self, key: &str, f: F)
    where
        F: for<'a> Fn(Request, Next<'a, Request, Response>) -> StageResult<Response>
            + Send
            + Sync
            + 'static;
}

impl ContainerStageExt for Container {
    fn register_stage<S>(&self, key: &str, stage: S)
    where
        S: Stage<Request, Response> + 'static,
    {
        self.instance(key, Arc::new(stage) as Arc<dyn Stage<Request, Response>>);
    }

    fn register_stage_fn<F>(&self, key: &str, f: F)
    where
        F: for<'a> Fn(Request, Next<'a, Request, Response>) -> StageResult<Response>
            + Send
            + Sync
            + 'static,
    {
        self.instance(key, StageFn::new(f));
    }
}

/// 登记 Web 层的默认组件，已经登记的键保持不变
pub fn register_defaults(container: &Arc<Container>) {
    if !container.has(BINDINGS_STAGE) {
        container.register_stage(BINDINGS_STAGE, SubstituteBindings::new(container));
    }
    if !container.has(REQUEST_LOG_STAGE) {
        container.register_stage(REQUEST_LOG_STAGE, RequestLogging);
    }
    if !container.has(REQUEST_ID_STAGE) {
        container.register_stage(REQUEST_ID_STAGE, RequestId);
    }

    if !container.has(EXCEPTION_HANDLER) {
        container.singleton(
            EXCEPTION_HANDLER,
            |c: &Container| -> anyhow::Result<Arc<dyn ExceptionHandler>> {
                let debug = RoutingConfig::from_container(c).debug;
                Ok(Arc::new(build_exception_handler_registry_from_inventory(debug)))
            },
        );
    }

    if !container.has(PLATFORM) {
        let platform = Arc::new(LocalPlatform::new());
        container.instance_arc(LOCAL_PLATFORM, Arc::clone(&platform));
        container.instance(PLATFORM, platform as Arc<dyn Platform>);
    }

    tracing::debug!("Web defaults registered");
}

/// Web 层服务提供者
#[derive(Debug, Default)]
pub struct WebServiceProvider;

impl ServiceProvider for WebServiceProvider {
    fn name(&self) -> &str {
        "web"
    }

    fn priority(&self) -> i32 {
        10
    }

    fn register(&self, container: &Arc<Container>) -> ApplicationResult<()> {
        register_defaults(container);
        Ok(())
    }
}

hookwire_core::submit_provider!(WebServiceProvider);
