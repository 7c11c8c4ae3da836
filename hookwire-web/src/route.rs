//! 路由
//!
//! 一条路由拥有方法集合、路径模板、动作，以及创建时从分组继承的属性。
//! 状态流转：
//!
//! ```text
//! Defined --dispatch--> Registered --触发--> Invoked --> Resolved | Faulted
//! ```
//!
//! Defined -> Registered 只发生一次；之后每次外部触发都会完整地跑一遍管道。

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use http::Method;
use hookwire_core::Container;
use once_cell::sync::OnceCell;
use serde_json::Value;

use crate::action::{Action, Handler};
use crate::config::RoutingConfig;
use crate::constants::EXCEPTION_HANDLER;
use crate::error::{Fault, RouterError};
use crate::exception_handler::{ExceptionHandler, ExceptionHandlerRegistry};
use crate::pipeline::{Pipe, Pipeline};
use crate::platform::Platform;
use crate::request::Request;
use crate::response::Response;
use crate::{ajax, rest};

/// 分组属性
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupAttributes {
    pub prefix: Option<String>,
    pub namespace: Option<String>,
    pub middleware: Vec<String>,
}

impl GroupAttributes {
    pub fn is_empty(&self) -> bool {
        self.prefix.is_none() && self.namespace.is_none() && self.middleware.is_empty()
    }

    /// 合并多层分组属性（外层在前）
    ///
    /// 前缀和命名空间逐层用 `/` 连接，中间件去重并保留首次出现的顺序。
    pub fn merge<'a, I>(layers: I) -> GroupAttributes
    where
        I: IntoIterator<Item = &'a GroupAttributes>,
    {
        let mut prefixes = Vec::new();
        let mut namespaces = Vec::new();
        let mut middleware: Vec<String> = Vec::new();

        for layer in layers {
            if let Some(prefix) = layer.prefix.as_deref() {
                prefixes.push(prefix);
            }
            if let Some(namespace) = layer.namespace.as_deref() {
                namespaces.push(namespace);
            }
            for name in &layer.middleware {
                if !middleware.contains(name) {
                    middleware.push(name.clone());
                }
            }
        }

        GroupAttributes {
            prefix: join_segments(prefixes),
            namespace: join_segments(namespaces),
            middleware,
        }
    }
}

/// 以 `/` 连接非空片段，全部为空时返回 None
pub(crate) fn join_segments<'a>(segments: impl IntoIterator<Item = &'a str>) -> Option<String> {
    let joined = segments
        .into_iter()
        .map(|segment| segment.trim_matches('/'))
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join("/");

    if joined.is_empty() {
        None
    } else {
        Some(joined)
    }
}

/// 路由状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteState {
    Defined,
    Registered,
    Invoked,
    Resolved,
    Faulted,
}

/// 一次触发的结果
#[derive(Debug, Clone)]
pub struct Outcome {
    pub state: RouteState,
    pub response: Response,
}

/// 分发策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// 资源式路由：在 REST 初始化事件中按路径模板注册
    Rest,
    /// 动作式路由：直接挂到一对具名钩子上（登录 / 未登录）
    Ajax,
}

/// 路由运行所需的环境
#[derive(Clone)]
pub struct RouteContext {
    container: Arc<Container>,
    config: RoutingConfig,
}

impl RouteContext {
    pub fn new(container: Arc<Container>, config: RoutingConfig) -> Self {
        Self { container, config }
    }

    pub fn container(&self) -> &Arc<Container> {
        &self.container
    }

    pub fn config(&self) -> &RoutingConfig {
        &self.config
    }

    /// 异常翻译器：容器中登记了就用登记的，否则使用默认注册表
    pub fn exception_handler(&self) -> Arc<dyn ExceptionHandler> {
        if self.container.has(EXCEPTION_HANDLER) {
            match self
                .container
                .get_as::<Arc<dyn ExceptionHandler>>(EXCEPTION_HANDLER)
            {
                Ok(handler) => return Arc::clone(&*handler),
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        "Failed to resolve exception handler, using default"
                    );
                }
            }
        }
        Arc::new(self.default_exception_handler())
    }

    fn default_exception_handler(&self) -> ExceptionHandlerRegistry {
        ExceptionHandlerRegistry::new().with_debug(self.config.debug)
    }

    /// 把失败翻译为响应
    ///
    /// 登记的翻译器自身 panic 时退回默认注册表。
    pub fn render_fault(&self, request: &Request, fault: &Fault) -> Response {
        let handler = self.exception_handler();
        panic::catch_unwind(AssertUnwindSafe(|| handler.render(request, fault))).unwrap_or_else(
            |panic| {
                tracing::error!(
                    panic = %panic_message(panic),
                    "Exception handler panicked, using default rendering"
                );
                self.default_exception_handler().render(request, fault)
            },
        )
    }
}

/// 路由
pub struct Route {
    strategy: Strategy,
    methods: Vec<Method>,
    uri: String,
    action: Action,
    attributes: OnceCell<GroupAttributes>,
    registered: AtomicBool,
}

impl Route {
    pub fn new(
        strategy: Strategy,
        methods: Vec<Method>,
        uri: impl Into<String>,
        action: Action,
    ) -> Self {
        Self {
            strategy,
            methods,
            uri: uri.into(),
            action,
            attributes: OnceCell::new(),
            registered: AtomicBool::new(false),
        }
    }

    /// 写入分组属性，只允许一次
    pub(crate) fn stamp(&self, attributes: GroupAttributes) -> Result<(), RouterError> {
        self.attributes.set(attributes).map_err(|_| {
            RouterError::GroupMisuse(format!(
                "route '{}' already carries group attributes",
                self.uri
            ))
        })
    }

    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    pub fn methods(&self) -> &[Method] {
        &self.methods
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn attributes(&self) -> Option<&GroupAttributes> {
        self.attributes.get()
    }

    pub fn prefix(&self) -> Option<&str> {
        self.attributes().and_then(|a| a.prefix.as_deref())
    }

    pub fn namespace(&self) -> Option<&str> {
        self.attributes().and_then(|a| a.namespace.as_deref())
    }

    pub fn middleware(&self) -> &[String] {
        self.attributes()
            .map(|a| a.middleware.as_slice())
            .unwrap_or(&[])
    }

    /// 前缀 + 路径模板（不含首尾斜杠）
    pub fn path(&self) -> String {
        join_segments([self.prefix().unwrap_or(""), self.uri.as_str()]).unwrap_or_default()
    }

    /// 动作定义（包含参数声明）
    pub fn action_definition(&self) -> &Action {
        &self.action
    }

    /// 解析出可调用的动作
    pub fn action(&self) -> Arc<dyn Handler> {
        self.action.resolve()
    }

    pub fn state(&self) -> RouteState {
        if self.registered.load(Ordering::SeqCst) {
            RouteState::Registered
        } else {
            RouteState::Defined
        }
    }

    /// 把路由挂到外部触发机制上，每条路由只会注册一次
    pub fn dispatch(
        self: &Arc<Self>,
        request: &Request,
        context: &RouteContext,
        platform: &Arc<dyn Platform>,
    ) -> Result<(), RouterError> {
        if self.registered.swap(true, Ordering::SeqCst) {
            tracing::warn!(route = %self.uri, "Route already registered, skipping");
            return Ok(());
        }

        let result = match self.strategy {
            Strategy::Rest => rest::register(self, request, context, platform),
            Strategy::Ajax => ajax::register(self, request, context, platform),
        };

        if result.is_err() {
            self.registered.store(false, Ordering::SeqCst);
        }
        result
    }

    /// 让请求穿过中间件栈并调用动作
    ///
    /// 失败边界：任何失败（包括 panic）都交给异常翻译器，不会传播给触发机制。
    pub fn run_request_through_stack(
        self: &Arc<Self>,
        mut request: Request,
        extra_args: Vec<Value>,
        context: &RouteContext,
    ) -> Outcome {
        tracing::debug!(
            route = %self.uri,
            state = ?RouteState::Invoked,
            method = %request.method(),
            "Running request through route stack"
        );

        request.set_route(Arc::clone(self));
        request.push_args(extra_args);
        let failed_request = request.clone();

        let pipes: Vec<Pipe<Request, Response>> = context
            .config
            .stack_for(self.middleware())
            .into_iter()
            .map(Pipe::named)
            .collect();

        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            Pipeline::new(Arc::clone(&context.container))
                .send(request)
                .through(pipes)
                .then(|request| self.action().call(request))
        }))
        .unwrap_or_else(|panic| Err(Fault::Panicked(panic_message(panic))));

        match result {
            Ok(response) => {
                tracing::debug!(
                    route = %self.uri,
                    state = ?RouteState::Resolved,
                    status = %response.status().as_u16(),
                    "Route resolved"
                );
                Outcome {
                    state: RouteState::Resolved,
                    response,
                }
            }
            Err(fault) => {
                if fault.status().is_server_error() {
                    tracing::error!(route = %self.uri, error = %fault, "Route faulted");
                } else {
                    tracing::debug!(route = %self.uri, error = %fault, "Route faulted");
                }
                let response = context.render_fault(&failed_request, &fault);
                Outcome {
                    state: RouteState::Faulted,
                    response,
                }
            }
        }
    }
}

fn panic_message(panic: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "Unknown panic occurred".to_string()
    }
}

impl std::fmt::Debug for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Route")
            .field("strategy", &self.strategy)
            .field("methods", &self.methods)
            .field("uri", &self.uri)
            .field("action", &self.action.describe())
            .field("attributes", &self.attributes.get())
            .field("state", &self.state())
            .finish()
    }
}
