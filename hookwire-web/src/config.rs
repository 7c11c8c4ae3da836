//! 路由配置

use hookwire_core::{Container, Environment, CONFIG_KEY};

use crate::constants::{
    APP_DEBUG, DEFAULT_REST_NAMESPACE, ROUTING_MIDDLEWARE, ROUTING_REST_NAMESPACE,
};

/// 路由配置
///
/// ```toml
/// [app]
/// debug = true
///
/// [routing]
/// rest_namespace = "shop/v1"
/// middleware = ["request.id", "request.log"]
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingConfig {
    /// 路由没有声明命名空间时使用的 REST 命名空间
    pub rest_namespace: String,
    /// 错误响应是否包含内部错误信息
    pub debug: bool,
    /// 所有路由共用的中间件，排在路由自己的中间件之前
    pub middleware: Vec<String>,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            rest_namespace: DEFAULT_REST_NAMESPACE.to_string(),
            debug: false,
            middleware: Vec::new(),
        }
    }
}

impl RoutingConfig {
    /// 从配置环境读取
    ///
    /// 环境变量给出的值都是字符串，所以逐个键读取而不是整段反序列化。
    pub fn from_environment(env: &Environment) -> Self {
        let defaults = Self::default();
        Self {
            rest_namespace: env.get_string_or(ROUTING_REST_NAMESPACE, &defaults.rest_namespace),
            debug: env.get_bool_or(APP_DEBUG, defaults.debug),
            middleware: env
                .get_string_array(ROUTING_MIDDLEWARE)
                .unwrap_or(defaults.middleware),
        }
    }

    /// 从容器中登记的配置环境读取，没有登记时使用默认值
    pub fn from_container(container: &Container) -> Self {
        if !container.has(CONFIG_KEY) {
            return Self::default();
        }
        match container.get_as::<Environment>(CONFIG_KEY) {
            Ok(env) => Self::from_environment(&env),
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    "Failed to resolve configuration, using routing defaults"
                );
                Self::default()
            }
        }
    }

    /// 一条路由实际经过的中间件：全局中间件在前，路由自己的在后，去重
    pub fn stack_for(&self, route_middleware: &[String]) -> Vec<String> {
        let mut stack: Vec<String> =
            Vec::with_capacity(self.middleware.len() + route_middleware.len());
        for name in self.middleware.iter().chain(route_middleware) {
            if !stack.contains(name) {
                stack.push(name.clone());
            }
        }
        stack
    }
}
