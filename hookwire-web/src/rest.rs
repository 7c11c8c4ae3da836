//! 资源式路由的注册
//!
//! dispatch 时只监听 REST 初始化事件；事件触发后才把路径模板登记到触发机制上。
//! 端点被调用时，捕获到的参数合并进共享请求，然后跑一遍路由的管道。

use std::sync::Arc;

use hookwire_core::Trigger;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde_json::{Map, Value};

use crate::constants::REST_API_INIT;
use crate::error::RouterError;
use crate::platform::{HookListener, Platform, RestCallback, RestRequest};
use crate::request::Request;
use crate::response::Response;
use crate::route::{Route, RouteContext};

static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(/?)\{(\w+)(\?)?\}").expect("placeholder regex is valid"));

/// 把 `{name}` / `{name?}` 改写为正则捕获语法
///
/// 可选参数连同它前面的 `/` 一起变为可选，其余字面量按原样转义。
/// 返回值以 `/` 开头；空路径返回空串。
pub fn capture_pattern(path: &str) -> String {
    let path = path.trim_matches('/');
    if path.is_empty() {
        return String::new();
    }
    let template = format!("/{}", path);

    let mut pattern = String::with_capacity(template.len() * 2);
    let mut last = 0;
    for captures in PLACEHOLDER.captures_iter(&template) {
        let Some(whole) = captures.get(0) else {
            continue;
        };
        pattern.push_str(&regex::escape(&template[last..whole.start()]));
        pattern.push_str(&placeholder(&captures));
        last = whole.end();
    }
    pattern.push_str(&regex::escape(&template[last..]));
    pattern
}

fn placeholder(captures: &Captures<'_>) -> String {
    let slash = captures.get(1).map(|m| m.as_str()).unwrap_or("");
    let name = captures.get(2).map(|m| m.as_str()).unwrap_or("");
    let optional = captures.get(3).is_some();

    match (optional, slash.is_empty()) {
        (true, false) => format!("(?:/(?P<{}>[^/]+))?", name),
        (true, true) => format!("(?P<{}>[^/]+)?", name),
        (false, _) => format!("{}(?P<{}>[^/]+)", slash, name),
    }
}

pub(crate) fn register(
    route: &Arc<Route>,
    request: &Request,
    context: &RouteContext,
    platform: &Arc<dyn Platform>,
) -> Result<(), RouterError> {
    let namespace = route
        .namespace()
        .map(str::to_string)
        .unwrap_or_else(|| context.config().rest_namespace.clone());
    let pattern = capture_pattern(&route.path());

    // 模板错误在 dispatch 时就暴露，而不是等到初始化事件里
    Regex::new(&format!("^{}$", pattern)).map_err(|source| RouterError::InvalidPattern {
        pattern: route.path(),
        source,
    })?;

    let weak_platform = Arc::downgrade(platform);
    let callback = rest_callback(Arc::clone(route), request.clone(), context.clone());
    let methods = route.methods().to_vec();
    let uri = route.uri().to_string();

    let listener: HookListener = Arc::new(move |_trigger: &mut Trigger<Request, Response>| {
        let Some(platform) = weak_platform.upgrade() else {
            tracing::warn!(route = %uri, "Platform dropped before REST routes were initialized");
            return;
        };
        if let Err(e) =
            platform.register_rest_route(&namespace, &pattern, &methods, Arc::clone(&callback))
        {
            tracing::error!(route = %uri, error = %e, "Failed to register REST route");
        }
    });

    platform.listen(&[REST_API_INIT.to_string()], listener);
    tracing::debug!(
        route = %route.uri(),
        methods = ?route.methods(),
        strategy = "rest",
        "Route registered"
    );
    Ok(())
}

fn rest_callback(route: Arc<Route>, shared: Request, context: RouteContext) -> RestCallback {
    Arc::new(move |inbound: RestRequest| -> Response {
        let mut request = shared.clone();
        request.merge_from(&inbound.request);
        request.merge_parameters(inbound.params.iter().map(|(k, v)| (k.as_str(), v.as_str())));

        let params: Map<String, Value> = inbound
            .params
            .into_iter()
            .map(|(name, value)| (name, Value::String(value)))
            .collect();

        route
            .run_request_through_stack(request, vec![Value::Object(params)], &context)
            .response
    })
}
