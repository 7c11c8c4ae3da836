//! 路由器
//!
//! 路由器的生命周期分两个严格先后的阶段：
//!
//! 1. 定义阶段：通过 `get` / `post` / `group` / `resource` 等方法创建路由，
//!    分组属性在路由创建时一次性写入
//! 2. 分发阶段：`dispatch` 按定义顺序把每条路由挂到触发机制上
//!
//! 分组状态只在定义阶段使用，分发时分组栈必须为空。

use std::collections::HashMap;
use std::sync::Arc;

use http::Method;
use hookwire_core::Container;
use serde_json::Value;

use crate::action::Action;
use crate::config::RoutingConfig;
use crate::constants::PLATFORM;
use crate::error::RouterError;
use crate::platform::{HookListener, Platform};
use crate::request::Request;
use crate::resource::{ResourceController, ResourceMethod};
use crate::route::{GroupAttributes, Route, RouteContext, Strategy};
use crate::route_source::{find_source, route_sources};

/// 路由宏：按名字登记的扩展方法
pub type RouteMacro = Arc<dyn Fn(&mut Router, &[Value]) -> Result<(), RouterError> + Send + Sync>;

/// `any` 路由响应的方法
const ANY_METHODS: [Method; 7] = [
    Method::GET,
    Method::HEAD,
    Method::POST,
    Method::PUT,
    Method::PATCH,
    Method::DELETE,
    Method::OPTIONS,
];

pub struct Router {
    context: RouteContext,
    platform: Arc<dyn Platform>,
    routes: Vec<Arc<Route>>,
    group_stack: Vec<GroupAttributes>,
    current_group: GroupAttributes,
    macros: HashMap<String, RouteMacro>,
}

impl Router {
    /// 创建路由器，路由配置从容器中登记的配置环境读取
    pub fn new(container: Arc<Container>, platform: Arc<dyn Platform>) -> Self {
        let config = RoutingConfig::from_container(&container);
        Self::with_config(container, platform, config)
    }

    pub fn with_config(
        container: Arc<Container>,
        platform: Arc<dyn Platform>,
        config: RoutingConfig,
    ) -> Self {
        Self {
            context: RouteContext::new(container, config),
            platform,
            routes: Vec::new(),
            group_stack: Vec::new(),
            current_group: GroupAttributes::default(),
            macros: HashMap::new(),
        }
    }

    /// 使用容器中登记的触发机制
    pub fn from_container(container: Arc<Container>) -> Result<Self, RouterError> {
        let platform = container
            .get_as::<Arc<dyn Platform>>(PLATFORM)
            .map_err(|e| RouterError::Definition(e.into()))?;
        let platform = Arc::clone(&*platform);
        Ok(Self::new(container, platform))
    }

    // ==================== 路由工厂 ====================

    pub fn get(
        &mut self,
        uri: impl Into<String>,
        action: Action,
    ) -> Result<Arc<Route>, RouterError> {
        self.matches(&[Method::GET], uri, action)
    }

    pub fn post(
        &mut self,
        uri: impl Into<String>,
        action: Action,
    ) -> Result<Arc<Route>, RouterError> {
        self.matches(&[Method::POST], uri, action)
    }

    pub fn put(
        &mut self,
        uri: impl Into<String>,
        action: Action,
    ) -> Result<Arc<Route>, RouterError> {
        self.matches(&[Method::PUT], uri, action)
    }

    pub fn patch(
        &mut self,
        uri: impl Into<String>,
        action: Action,
    ) -> Result<Arc<Route>, RouterError> {
        self.matches(&[Method::PATCH], uri, action)
    }

    pub fn delete(
        &mut self,
        uri: impl Into<String>,
        action: Action,
    ) -> Result<Arc<Route>, RouterError> {
        self.matches(&[Method::DELETE], uri, action)
    }

    pub fn any(
        &mut self,
        uri: impl Into<String>,
        action: Action,
    ) -> Result<Arc<Route>, RouterError> {
        self.matches(&ANY_METHODS, uri, action)
    }

    /// 指定方法集合的资源式路由
    pub fn matches(
        &mut self,
        methods: &[Method],
        uri: impl Into<String>,
        action: Action,
    ) -> Result<Arc<Route>, RouterError> {
        if methods.is_empty() {
            return Err(RouterError::Definition(anyhow::anyhow!(
                "Route needs at least one method"
            )));
        }
        self.add_route(Route::new(Strategy::Rest, methods.to_vec(), uri, action))
    }

    /// 动作式路由（POST，登录 / 未登录两个钩子）
    pub fn ajax(
        &mut self,
        uri: impl Into<String>,
        action: Action,
    ) -> Result<Arc<Route>, RouterError> {
        self.add_route(Route::new(Strategy::Ajax, vec![Method::POST], uri, action))
    }

    /// 追加路由；处于分组内时写入合并后的分组属性
    pub fn add_route(&mut self, route: Route) -> Result<Arc<Route>, RouterError> {
        if !self.current_group.is_empty() {
            return Err(RouterError::GroupMisuse(format!(
                "route '{}' added while group attributes {:?} are waiting for a group",
                route.uri(),
                self.current_group
            )));
        }

        if self.has_group_stack() {
            route.stamp(self.merged_group_stack())?;
        }

        let route = Arc::new(route);
        tracing::trace!(
            route = %route.uri(),
            methods = ?route.methods(),
            action = %route.action_definition().describe(),
            "Route defined"
        );
        self.routes.push(Arc::clone(&route));
        Ok(route)
    }

    // ==================== 分组 ====================

    /// 设置下一个分组的路径前缀
    pub fn prefix(&mut self, prefix: impl Into<String>) -> &mut Self {
        self.current_group.prefix = Some(prefix.into());
        self
    }

    /// 设置下一个分组的命名空间
    pub fn namespace(&mut self, namespace: impl Into<String>) -> &mut Self {
        self.current_group.namespace = Some(namespace.into());
        self
    }

    /// 为下一个分组追加中间件
    pub fn middleware<I, S>(&mut self, names: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for name in names {
            let name = name.into();
            if !self.current_group.middleware.contains(&name) {
                self.current_group.middleware.push(name);
            }
        }
        self
    }

    /// 打开一个分组
    ///
    /// 之前通过 `prefix` / `namespace` / `middleware` 写入的属性成为新的一层，
    /// 分组体返回（包括返回错误）之后这一层被弹出。
    pub fn group<F>(&mut self, body: F) -> Result<(), RouterError>
    where
        F: FnOnce(&mut Router) -> Result<(), RouterError>,
    {
        let layer = std::mem::take(&mut self.current_group);
        self.group_stack.push(layer);
        let depth = self.group_stack.len();

        let result = body(self);

        if !self.current_group.is_empty() {
            tracing::warn!(
                attributes = ?self.current_group,
                "Group attributes were set but no group was opened, discarding"
            );
            self.current_group = GroupAttributes::default();
        }
        self.group_stack.truncate(depth - 1);

        result
    }

    /// 在分组内加载编译时登记的路由定义来源
    pub fn group_source(&mut self, name: &str) -> Result<(), RouterError> {
        let Some(source) = find_source(name) else {
            let available: Vec<&str> = route_sources().iter().map(|source| source.name).collect();
            tracing::warn!(source = %name, available = ?available, "Route source not found");
            return Err(RouterError::SourceNotFound(name.to_string()));
        };
        tracing::debug!(source = source.name, "Loading route source");
        self.group(source.define)
    }

    pub fn has_group_stack(&self) -> bool {
        !self.group_stack.is_empty()
    }

    /// 当前生效的分组属性
    pub fn merged_group_stack(&self) -> GroupAttributes {
        GroupAttributes::merge(&self.group_stack)
    }

    // ==================== 资源路由 ====================

    /// 注册资源控制器的全部五条约定路由
    pub fn resource<C: ResourceController>(
        &mut self,
        path: &str,
    ) -> Result<Vec<Arc<Route>>, RouterError> {
        self.resource_only::<C>(path, &ResourceMethod::ALL)
    }

    /// 只注册列出的约定路由
    ///
    /// 资源路径本身占用一层分组前缀，调用前不能有等待分组的属性；
    /// 需要外层前缀时先用 `group` 包一层。
    pub fn resource_only<C: ResourceController>(
        &mut self,
        path: &str,
        methods: &[ResourceMethod],
    ) -> Result<Vec<Arc<Route>>, RouterError> {
        if !self.current_group.is_empty() {
            return Err(RouterError::GroupMisuse(format!(
                "resource '{}' defined while group attributes {:?} are waiting for a group",
                path, self.current_group
            )));
        }

        let member = format!("{{{}}}", C::route_parameter());
        let mut created = Vec::new();

        self.prefix(path);
        self.group(|router| {
            for method in ResourceMethod::ALL {
                if !methods.contains(&method) {
                    continue;
                }
                let uri = if method.has_parameter() {
                    member.clone()
                } else {
                    String::new()
                };
                let verbs = match method {
                    ResourceMethod::Index | ResourceMethod::Show => vec![Method::GET],
                    ResourceMethod::Store => vec![Method::POST],
                    ResourceMethod::Update => vec![Method::PUT, Method::PATCH],
                    ResourceMethod::Destroy => vec![Method::DELETE],
                };
                let action = resource_action::<C>(method).with_parameters(C::parameters());
                created.push(router.matches(&verbs, uri, action)?);
            }
            Ok(())
        })?;

        tracing::debug!(path = %path, routes = created.len(), "Resource routes defined");
        Ok(created)
    }

    // ==================== 宏 ====================

    pub fn register_macro<F>(&mut self, name: impl Into<String>, f: F)
    where
        F: Fn(&mut Router, &[Value]) -> Result<(), RouterError> + Send + Sync + 'static,
    {
        let name = name.into();
        tracing::trace!(name = %name, "Router macro registered");
        self.macros.insert(name, Arc::new(f));
    }

    pub fn has_macro(&self, name: &str) -> bool {
        self.macros.contains_key(name)
    }

    pub fn call_macro(&mut self, name: &str, args: &[Value]) -> Result<(), RouterError> {
        let route_macro = self
            .macros
            .get(name)
            .cloned()
            .ok_or_else(|| RouterError::MacroNotRegistered(name.to_string()))?;
        route_macro(self, args)
    }

    // ==================== 分发 ====================

    /// 按定义顺序把所有路由挂到触发机制上
    pub fn dispatch(&self, request: &Request) -> Result<(), RouterError> {
        if self.has_group_stack() {
            return Err(RouterError::GroupMisuse(
                "routes cannot be dispatched from inside a group".to_string(),
            ));
        }

        for route in &self.routes {
            route.dispatch(request, &self.context, &self.platform)?;
        }

        tracing::info!(routes = self.routes.len(), "Routes dispatched");
        Ok(())
    }

    /// 直接监听触发机制的钩子
    pub fn listen(&self, names: &[String], listener: HookListener) {
        self.platform.listen(names, listener);
    }

    pub fn routes(&self) -> &[Arc<Route>] {
        &self.routes
    }

    pub fn container(&self) -> &Arc<Container> {
        self.context.container()
    }

    pub fn config(&self) -> &RoutingConfig {
        self.context.config()
    }

    pub fn platform(&self) -> &Arc<dyn Platform> {
        &self.platform
    }
}

fn resource_action<C: ResourceController>(method: ResourceMethod) -> Action {
    match method {
        ResourceMethod::Index => Action::method(method.name(), C::index),
        ResourceMethod::Show => Action::method(method.name(), C::show),
        ResourceMethod::Store => Action::method(method.name(), C::store),
        ResourceMethod::Update => Action::method(method.name(), C::update),
        ResourceMethod::Destroy => Action::method(method.name(), C::destroy),
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("routes", &self.routes.len())
            .field("group_depth", &self.group_stack.len())
            .field("macros", &self.macros.keys().collect::<Vec<_>>())
            .field("config", self.context.config())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Fault, StageResult};
    use crate::platform::LocalPlatform;
    use crate::response::{IntoResponse, Response};
    use crate::route_source;
    use http::StatusCode;

    fn router() -> (Router, Arc<LocalPlatform>) {
        let platform = Arc::new(LocalPlatform::new());
        let router = Router::with_config(
            Arc::new(Container::new()),
            platform.clone(),
            RoutingConfig::default(),
        );
        (router, platform)
    }

    fn noop() -> Action {
        Action::new(|_: Request| -> Result<(), Fault> { Ok(()) })
    }

    #[test]
    fn test_nested_groups_merge_attributes() {
        let (mut router, _) = router();

        router.prefix("a").middleware(["m1"]);
        router
            .group(|router| {
                router.prefix("b").middleware(["m2"]);
                router.group(|router| {
                    router.prefix("c").middleware(["m1", "m3"]);
                    router.group(|router| {
                        router.get("leaf", noop())?;
                        Ok(())
                    })
                })
            })
            .unwrap();
        let outside = router.get("outside", noop()).unwrap();

        let leaf = &router.routes()[0];
        assert_eq!(leaf.prefix(), Some("a/b/c"));
        assert_eq!(leaf.middleware(), ["m1", "m2", "m3"]);
        assert_eq!(leaf.path(), "a/b/c/leaf");

        assert!(outside.attributes().is_none());
        assert!(!router.has_group_stack());
    }

    #[test]
    fn test_group_pops_on_error() {
        let (mut router, _) = router();
        router.prefix("broken");
        let result = router.group(|_| Err(RouterError::Definition(anyhow::anyhow!("bad file"))));

        assert!(result.is_err());
        assert!(!router.has_group_stack());
        assert!(router.merged_group_stack().is_empty());
    }

    #[test]
    fn test_pending_attributes_rejected() {
        let (mut router, _) = router();
        router.namespace("shop");
        assert!(matches!(
            router.get("widgets", noop()),
            Err(RouterError::GroupMisuse(_))
        ));
    }

    #[test]
    fn test_dispatch_inside_group_rejected() {
        let (mut router, _) = router();
        let result = router.group(|router| router.dispatch(&Request::default()));
        assert!(matches!(result, Err(RouterError::GroupMisuse(_))));
    }

    #[derive(Default)]
    struct WidgetResource;

    impl ResourceController for WidgetResource {
        fn route_parameter() -> &'static str {
            "widget"
        }

        fn index(&self, _request: Request) -> StageResult<Response> {
            Ok("list".into_response())
        }

        fn show(&self, request: Request) -> StageResult<Response> {
            Ok(format!("show {}", request.param("widget").unwrap_or("?")).into_response())
        }
    }

    #[test]
    fn test_resource_routes() {
        let (mut router, _) = router();
        let routes = router.resource::<WidgetResource>("widgets").unwrap();

        let summary: Vec<(String, Vec<Method>)> = routes
            .iter()
            .map(|route| (route.path(), route.methods().to_vec()))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("widgets".to_string(), vec![Method::GET]),
                ("widgets/{widget}".to_string(), vec![Method::GET]),
                ("widgets".to_string(), vec![Method::POST]),
                ("widgets/{widget}".to_string(), vec![Method::PUT, Method::PATCH]),
                ("widgets/{widget}".to_string(), vec![Method::DELETE]),
            ]
        );
        assert!(routes[1]
            .action_definition()
            .describe()
            .ends_with("WidgetResource@show"));
    }

    #[test]
    fn test_resource_with_pending_prefix_rejected() {
        let (mut router, _) = router();
        router.prefix("admin");
        assert!(matches!(
            router.resource::<WidgetResource>("widgets"),
            Err(RouterError::GroupMisuse(_))
        ));
        assert!(router.routes().is_empty());
    }

    #[test]
    fn test_resource_nested_in_prefixed_group() {
        let (mut router, _) = router();
        router.prefix("admin");
        router
            .group(|router| {
                router.resource_only::<WidgetResource>("widgets", &[ResourceMethod::Show])?;
                Ok(())
            })
            .unwrap();

        assert_eq!(router.routes()[0].path(), "admin/widgets/{widget}");
        assert!(router.routes()[0]
            .action_definition()
            .describe()
            .ends_with("@show"));
    }

    #[test]
    fn test_resource_only_and_dispatch() {
        let (mut router, platform) = router();
        router.middleware(["request.id"]);
        router
            .group(|router| {
                router.resource_only::<WidgetResource>(
                    "widgets",
                    &[ResourceMethod::Index, ResourceMethod::Show, ResourceMethod::Destroy],
                )?;
                Ok(())
            })
            .unwrap();
        assert_eq!(router.routes().len(), 3);
        assert_eq!(router.routes()[0].middleware(), ["request.id"]);

        router
            .container()
            .instance(crate::constants::REQUEST_ID_STAGE, crate::middleware::request_id_stage());
        router.dispatch(&Request::default()).unwrap();

        let shown = platform.serve(Request::get("/api/widgets/7"));
        assert_eq!(shown.text_body(), Some("show 7"));
        assert!(shown.header("x-request-id").is_some());

        let destroyed = platform.serve(Request::new(Method::DELETE, "/api/widgets/7"));
        assert_eq!(destroyed.status(), StatusCode::METHOD_NOT_ALLOWED);

        let stored = platform.serve(Request::post("/api/widgets"));
        assert_eq!(stored.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[test]
    fn test_macros() {
        let (mut router, _) = router();
        router.register_macro("health", |router: &mut Router, args: &[Value]| {
            let path = args.first().and_then(Value::as_str).unwrap_or("health");
            let health = Action::new(|_: Request| -> Result<&'static str, Fault> { Ok("ok") });
            router.get(path, health)?;
            Ok(())
        });

        assert!(router.has_macro("health"));
        router.call_macro("health", &[Value::from("status")]).unwrap();
        assert_eq!(router.routes()[0].uri(), "status");

        assert!(matches!(
            router.call_macro("missing", &[]),
            Err(RouterError::MacroNotRegistered(name)) if name == "missing"
        ));
    }

    fn admin_routes(router: &mut Router) -> Result<(), RouterError> {
        router.get("dashboard", noop())?;
        Ok(())
    }

    route_source!("router-tests-admin", admin_routes);

    #[test]
    fn test_group_source() {
        let (mut router, _) = router();
        router.prefix("admin");
        router.group_source("router-tests-admin").unwrap();
        assert_eq!(router.routes()[0].path(), "admin/dashboard");
        assert!(route_sources()
            .iter()
            .any(|source| source.name == "router-tests-admin"));

        assert!(matches!(
            router.group_source("nowhere"),
            Err(RouterError::SourceNotFound(_))
        ));
    }

    #[test]
    fn test_ajax_route_registers_hook_pair() {
        let (mut router, platform) = router();
        router.namespace("shop");
        router
            .group(|router| {
                router.ajax(
                    "save",
                    Action::new(|_: Request| -> Result<&'static str, Fault> { Ok("saved") }),
                )?;
                Ok(())
            })
            .unwrap();
        router.dispatch(&Request::default()).unwrap();

        assert!(platform.has_listeners("ajax_shop/save"));
        assert!(platform.has_listeners("ajax_nopriv_shop/save"));
        let response = platform
            .fire_ajax("shop/save", Request::post("/ajax"), false)
            .unwrap();
        assert_eq!(response.text_body(), Some("saved"));
    }

    #[test]
    fn test_second_dispatch_does_not_register_twice() {
        let (mut router, platform) = router();
        router.ajax("ping", noop()).unwrap();

        router.dispatch(&Request::default()).unwrap();
        router.dispatch(&Request::default()).unwrap();

        assert_eq!(platform.hooks(), vec!["ajax_nopriv_ping", "ajax_ping"]);
        assert_eq!(platform.listener_count("ajax_ping"), 1);
        assert_eq!(
            router.routes()[0].state(),
            crate::route::RouteState::Registered
        );
    }
}
