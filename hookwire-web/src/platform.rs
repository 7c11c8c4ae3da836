//! 外部触发机制
//!
//! 路由只通过 [`Platform`] 和触发机制打交道：按名字监听钩子，以及在 REST
//! 初始化事件中登记路径模板。[`LocalPlatform`] 是进程内实现，测试和嵌入式
//! 场景直接用它来驱动请求。

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use http::{Method, StatusCode};
use hookwire_core::{HookRegistry, Listener};
use parking_lot::RwLock;
use regex::Regex;
use serde_json::json;

use crate::constants::{AJAX_HOOK_PREFIX, AJAX_NOPRIV_HOOK_PREFIX, REST_API_INIT};
use crate::error::RouterError;
use crate::request::Request;
use crate::response::Response;

/// 钩子回调
pub type HookListener = Listener<Request, Response>;

/// REST 端点回调
pub type RestCallback = Arc<dyn Fn(RestRequest) -> Response + Send + Sync>;

/// REST 端点收到的调用：入站请求和路径模板捕获到的参数
#[derive(Debug, Clone)]
pub struct RestRequest {
    pub request: Request,
    pub params: BTreeMap<String, String>,
}

/// 外部触发机制
pub trait Platform: Send + Sync {
    /// 为一组钩子名登记回调
    fn listen(&self, names: &[String], listener: HookListener);

    fn has_listeners(&self, name: &str) -> bool;

    /// 登记 REST 端点
    ///
    /// `pattern` 已经是正则捕获语法，以 `/` 开头（或为空）。
    fn register_rest_route(
        &self,
        namespace: &str,
        pattern: &str,
        methods: &[Method],
        callback: RestCallback,
    ) -> Result<(), RouterError>;
}

struct RestEndpoint {
    route: String,
    methods: Vec<Method>,
    matcher: Regex,
    callback: RestCallback,
}

/// 进程内触发机制
pub struct LocalPlatform {
    hooks: HookRegistry<Request, Response>,
    endpoints: RwLock<Vec<RestEndpoint>>,
    rest_initialized: AtomicBool,
}

impl LocalPlatform {
    pub fn new() -> Self {
        Self {
            hooks: HookRegistry::new(),
            endpoints: RwLock::new(Vec::new()),
            rest_initialized: AtomicBool::new(false),
        }
    }

    /// 触发 REST 初始化事件（只触发一次）
    ///
    /// 之后才 dispatch 的资源式路由不会再被登记。
    pub fn init_rest(&self) {
        if self.rest_initialized.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::debug!("Initializing REST routes");
        self.hooks.fire(REST_API_INIT, None);
        tracing::info!(endpoints = self.endpoints.read().len(), "REST routes initialized");
    }

    pub fn is_rest_initialized(&self) -> bool {
        self.rest_initialized.load(Ordering::SeqCst)
    }

    /// 把请求交给匹配的 REST 端点
    ///
    /// 路径匹配但方法不匹配时返回 405，没有任何端点匹配时返回 404。
    pub fn serve(&self, request: Request) -> Response {
        self.init_rest();

        let mut path_matched = false;
        let mut matched = None;
        {
            let endpoints = self.endpoints.read();
            for endpoint in endpoints.iter() {
                let Some(captures) = endpoint.matcher.captures(request.path()) else {
                    continue;
                };
                path_matched = true;
                if !endpoint.methods.contains(request.method()) {
                    continue;
                }

                let params: BTreeMap<String, String> = endpoint
                    .matcher
                    .capture_names()
                    .flatten()
                    .filter_map(|name| {
                        captures
                            .name(name)
                            .map(|value| (name.to_string(), value.as_str().to_string()))
                    })
                    .collect();
                matched = Some((Arc::clone(&endpoint.callback), params));
                break;
            }
        }

        match matched {
            Some((callback, params)) => callback(RestRequest { request, params }),
            None if path_matched => {
                tracing::debug!(
                    method = %request.method(),
                    path = %request.path(),
                    "Method not allowed"
                );
                no_route(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed for this route")
            }
            None => {
                tracing::debug!(
                    method = %request.method(),
                    path = %request.path(),
                    "No REST route matched"
                );
                no_route(
                    StatusCode::NOT_FOUND,
                    "No route was found matching the URL and request method",
                )
            }
        }
    }

    /// 触发动作钩子
    pub fn fire_ajax(
        &self,
        action: &str,
        request: Request,
        authenticated: bool,
    ) -> Option<Response> {
        let prefix = if authenticated {
            AJAX_HOOK_PREFIX
        } else {
            AJAX_NOPRIV_HOOK_PREFIX
        };
        self.hooks.fire(&format!("{}{}", prefix, action), Some(request))
    }

    /// 触发任意钩子
    pub fn fire(&self, name: &str, request: Option<Request>) -> Option<Response> {
        self.hooks.fire(name, request)
    }

    /// 已登记的 REST 端点
    pub fn rest_routes(&self) -> Vec<(String, Vec<Method>)> {
        self.endpoints
            .read()
            .iter()
            .map(|endpoint| (endpoint.route.clone(), endpoint.methods.clone()))
            .collect()
    }

    /// 已登记的钩子名
    pub fn hooks(&self) -> Vec<String> {
        self.hooks.hooks()
    }

    pub fn listener_count(&self, name: &str) -> usize {
        self.hooks.listener_count(name)
    }
}

impl Default for LocalPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl Platform for LocalPlatform {
    fn listen(&self, names: &[String], listener: HookListener) {
        self.hooks.listen(names, listener);
    }

    fn has_listeners(&self, name: &str) -> bool {
        self.hooks.has_listeners(name)
    }

    fn register_rest_route(
        &self,
        namespace: &str,
        pattern: &str,
        methods: &[Method],
        callback: RestCallback,
    ) -> Result<(), RouterError> {
        let namespace = namespace.trim_matches('/');
        let route = if namespace.is_empty() {
            pattern.to_string()
        } else {
            format!("/{}{}", namespace, pattern)
        };

        let mut source = String::from("^");
        if !namespace.is_empty() {
            source.push('/');
            source.push_str(&regex::escape(namespace));
        }
        source.push_str(pattern);
        source.push_str("/?$");

        let matcher = Regex::new(&source).map_err(|source| RouterError::InvalidPattern {
            pattern: route.clone(),
            source,
        })?;

        tracing::debug!(route = %route, methods = ?methods, "REST route registered");
        self.endpoints.write().push(RestEndpoint {
            route,
            methods: methods.to_vec(),
            matcher,
            callback,
        });
        Ok(())
    }
}

impl std::fmt::Debug for LocalPlatform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalPlatform")
            .field("hooks", &self.hooks)
            .field("endpoints", &self.endpoints.read().len())
            .field("rest_initialized", &self.is_rest_initialized())
            .finish()
    }
}

fn no_route(status: StatusCode, message: &str) -> Response {
    Response::json(
        status,
        json!({
            "status": status.as_u16(),
            "error": status.canonical_reason().unwrap_or("Unknown"),
            "message": message,
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::IntoResponse;
    use hookwire_core::Trigger;

    fn echo_params() -> RestCallback {
        Arc::new(|rest: RestRequest| -> Response {
            json!({ "path": rest.request.path(), "params": rest.params }).into_response()
        })
    }

    #[test]
    fn test_serve_matches_namespace_and_captures() {
        let platform = LocalPlatform::new();
        platform
            .register_rest_route(
                "shop/v1",
                "/widgets/(?P<widget>[^/]+)",
                &[Method::GET],
                echo_params(),
            )
            .unwrap();

        let response = platform.serve(Request::get("/shop/v1/widgets/42"));
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.json_body(),
            Some(&json!({ "path": "/shop/v1/widgets/42", "params": { "widget": "42" } }))
        );
        assert_eq!(
            platform.rest_routes(),
            vec![("/shop/v1/widgets/(?P<widget>[^/]+)".to_string(), vec![Method::GET])]
        );
    }

    #[test]
    fn test_serve_not_found_and_method_not_allowed() {
        let platform = LocalPlatform::new();
        platform
            .register_rest_route("api", "/widgets", &[Method::GET], echo_params())
            .unwrap();

        assert_eq!(
            platform.serve(Request::post("/api/widgets")).status(),
            StatusCode::METHOD_NOT_ALLOWED
        );
        assert_eq!(
            platform.serve(Request::get("/api/gadgets")).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(platform.serve(Request::get("/api/widgets/")).status(), StatusCode::OK);
    }

    #[test]
    fn test_rest_init_fires_once() {
        let platform = Arc::new(LocalPlatform::new());
        let weak = Arc::downgrade(&platform);
        platform.listen(
            &[REST_API_INIT.to_string()],
            Arc::new(move |_trigger: &mut Trigger<Request, Response>| {
                if let Some(platform) = weak.upgrade() {
                    platform
                        .register_rest_route("api", "/ping", &[Method::GET], echo_params())
                        .unwrap();
                }
            }),
        );

        platform.init_rest();
        platform.init_rest();
        assert!(platform.is_rest_initialized());
        assert_eq!(platform.rest_routes().len(), 1);
    }

    #[test]
    fn test_fire_ajax_picks_hook_by_authentication() {
        let platform = LocalPlatform::new();
        platform.listen(
            &["ajax_save".to_string()],
            Arc::new(|trigger: &mut Trigger<Request, Response>| {
                trigger.terminate("member".into_response());
            }),
        );
        platform.listen(
            &["ajax_nopriv_save".to_string()],
            Arc::new(|trigger: &mut Trigger<Request, Response>| {
                trigger.terminate("guest".into_response());
            }),
        );

        let member = platform.fire_ajax("save", Request::post("/ajax"), true).unwrap();
        let guest = platform.fire_ajax("save", Request::post("/ajax"), false).unwrap();
        assert_eq!(member.text_body(), Some("member"));
        assert_eq!(guest.text_body(), Some("guest"));
        assert!(platform.fire_ajax("unknown", Request::post("/ajax"), true).is_none());
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        let platform = LocalPlatform::new();
        let result =
            platform.register_rest_route("api", "/(?P<broken", &[Method::GET], echo_params());
        assert!(matches!(result, Err(RouterError::InvalidPattern { .. })));
    }
}
