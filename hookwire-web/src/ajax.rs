//! 动作式路由的注册
//!
//! 路由直接挂到 `ajax_{action}` 和 `ajax_nopriv_{action}` 两个钩子上，
//! 动作名由命名空间、前缀和路径拼成。这类路由没有路径参数。

use std::sync::Arc;

use hookwire_core::Trigger;

use crate::constants::{AJAX_HOOK_PREFIX, AJAX_NOPRIV_HOOK_PREFIX};
use crate::error::RouterError;
use crate::platform::{HookListener, Platform};
use crate::request::Request;
use crate::response::Response;
use crate::route::{join_segments, Route, RouteContext};

/// 路由对应的动作名
pub fn action_name(route: &Route) -> String {
    join_segments([
        route.namespace().unwrap_or(""),
        route.prefix().unwrap_or(""),
        route.uri(),
    ])
    .unwrap_or_default()
}

/// 路由监听的两个钩子名（登录 / 未登录）
pub fn hook_names(route: &Route) -> [String; 2] {
    let action = action_name(route);
    [
        format!("{}{}", AJAX_HOOK_PREFIX, action),
        format!("{}{}", AJAX_NOPRIV_HOOK_PREFIX, action),
    ]
}

pub(crate) fn register(
    route: &Arc<Route>,
    request: &Request,
    context: &RouteContext,
    platform: &Arc<dyn Platform>,
) -> Result<(), RouterError> {
    if action_name(route).is_empty() {
        return Err(RouterError::Definition(anyhow::anyhow!(
            "AJAX route needs a non-empty action name"
        )));
    }
    let hooks = hook_names(route);

    let shared = request.clone();
    let context = context.clone();
    let target = Arc::clone(route);
    let listener: HookListener = Arc::new(move |trigger: &mut Trigger<Request, Response>| {
        tracing::trace!(hook = %trigger.name(), route = %target.uri(), "AJAX hook fired");
        let mut request = shared.clone();
        if let Some(inbound) = trigger.take_payload() {
            request.merge_from(&inbound);
        }
        let outcome = target.run_request_through_stack(request, Vec::new(), &context);
        trigger.terminate(outcome.response);
    });

    platform.listen(&hooks, listener);
    tracing::debug!(
        route = %route.uri(),
        hooks = ?hooks,
        strategy = "ajax",
        "Route registered"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::Action;
    use crate::error::Fault;
    use crate::route::{GroupAttributes, Strategy};
    use http::Method;

    #[test]
    fn test_hook_names_include_group_attributes() {
        let route = Route::new(
            Strategy::Ajax,
            vec![Method::POST],
            "save",
            Action::new(|_: Request| -> Result<(), Fault> { Ok(()) }),
        );
        assert_eq!(hook_names(&route), ["ajax_save".to_string(), "ajax_nopriv_save".to_string()]);

        route
            .stamp(GroupAttributes {
                prefix: Some("widgets".into()),
                namespace: Some("shop".into()),
                middleware: Vec::new(),
            })
            .unwrap();
        assert_eq!(action_name(&route), "shop/widgets/save");
    }
}
