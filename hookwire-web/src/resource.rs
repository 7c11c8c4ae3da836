//! 资源控制器
//!
//! `Router::resource` 按约定为控制器注册最多五条路由：
//!
//! | 方法      | 动词         | 路径            |
//! |-----------|--------------|-----------------|
//! | `index`   | GET          | `{path}`        |
//! | `show`    | GET          | `{path}/{id}`   |
//! | `store`   | POST         | `{path}`        |
//! | `update`  | PUT / PATCH  | `{path}/{id}`   |
//! | `destroy` | DELETE       | `{path}/{id}`   |

use crate::action::Parameter;
use crate::error::{Fault, StageResult};
use crate::request::Request;
use crate::response::Response;

/// 资源控制器
///
/// 未实现的方法返回 405。每次调用都会构造新的控制器实例。
pub trait ResourceController: Default + Send + Sync + 'static {
    /// 路径参数名
    fn route_parameter() -> &'static str {
        "id"
    }

    /// 动作参数声明，用于绑定替换
    fn parameters() -> Vec<Parameter> {
        Vec::new()
    }

    fn index(&self, _request: Request) -> StageResult<Response> {
        Err(not_supported("index"))
    }

    fn show(&self, _request: Request) -> StageResult<Response> {
        Err(not_supported("show"))
    }

    fn store(&self, _request: Request) -> StageResult<Response> {
        Err(not_supported("store"))
    }

    fn update(&self, _request: Request) -> StageResult<Response> {
        Err(not_supported("update"))
    }

    fn destroy(&self, _request: Request) -> StageResult<Response> {
        Err(not_supported("destroy"))
    }
}

fn not_supported(method: &str) -> Fault {
    Fault::method_not_allowed(format!("Resource does not support '{}'", method))
}

/// 资源路由的五个约定方法
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceMethod {
    Index,
    Show,
    Store,
    Update,
    Destroy,
}

impl ResourceMethod {
    pub const ALL: [ResourceMethod; 5] = [
        ResourceMethod::Index,
        ResourceMethod::Show,
        ResourceMethod::Store,
        ResourceMethod::Update,
        ResourceMethod::Destroy,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ResourceMethod::Index => "index",
            ResourceMethod::Show => "show",
            ResourceMethod::Store => "store",
            ResourceMethod::Update => "update",
            ResourceMethod::Destroy => "destroy",
        }
    }

    /// 是否需要路径参数
    pub fn has_parameter(&self) -> bool {
        matches!(
            self,
            ResourceMethod::Show | ResourceMethod::Update | ResourceMethod::Destroy
        )
    }
}
