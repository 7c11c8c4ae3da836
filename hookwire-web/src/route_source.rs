//! 路由定义来源
//!
//! 路由定义代码可以分散在各个模块里，通过 inventory 在编译时收集，
//! 再由 `Router::group_source` 在某个分组内按名字加载。
//!
//! ```ignore
//! fn admin_routes(router: &mut Router) -> Result<(), RouterError> {
//!     router.get("dashboard", Action::new(dashboard))?;
//!     Ok(())
//! }
//!
//! route_source!("admin", admin_routes);
//!
//! router.prefix("admin").middleware(["auth"]);
//! router.group_source("admin")?;
//! ```

use crate::error::RouterError;
use crate::router::Router;

/// 路由定义函数
pub type DefineRoutes = fn(&mut Router) -> Result<(), RouterError>;

/// 编译时登记的路由定义来源
pub struct RouteSource {
    pub name: &'static str,
    pub define: DefineRoutes,
}

impl RouteSource {
    pub const fn new(name: &'static str, define: DefineRoutes) -> Self {
        Self { name, define }
    }
}

inventory::collect!(RouteSource);

/// 登记路由定义来源
#[macro_export]
macro_rules! route_source {
    ($name:expr, $define:path) => {
        $crate::inventory::submit! {
            $crate::route_source::RouteSource::new($name, $define)
        }
    };
}

/// 所有登记的来源（按名字排序）
pub fn route_sources() -> Vec<&'static RouteSource> {
    let mut sources: Vec<&'static RouteSource> =
        inventory::iter::<RouteSource>.into_iter().collect();
    sources.sort_by_key(|source| source.name);
    sources
}

pub fn find_source(name: &str) -> Option<&'static RouteSource> {
    inventory::iter::<RouteSource>
        .into_iter()
        .find(|source| source.name == name)
}
