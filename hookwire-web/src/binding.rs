//! 路由模型绑定
//!
//! 把路径参数中的原始字符串替换为领域实体。只处理动作声明为实体类型的参数：
//! 查找失败时以 `EntityNotFound` 终止请求，动作永远看不到缺失的实体。

use std::sync::{Arc, Weak};

use hookwire_core::Container;

use crate::action::ParamKind;
use crate::error::{Fault, StageResult};
use crate::pipeline::{Next, Stage};
use crate::request::{Request, RouteValue};
use crate::response::Response;

/// 可以通过路由参数查找的领域实体
///
/// # 示例
///
/// ```ignore
/// #[derive(Default)]
/// struct Widget { id: u32, slug: String }
///
/// impl RouteModel for Widget {
///     fn resolve_route_binding(&self, field: &str, value: &str) -> anyhow::Result<Option<Self>> {
///         Ok(WIDGETS.iter().find(|w| w.matches(field, value)).cloned())
///     }
/// }
/// ```
pub trait RouteModel: Send + Sync + Sized + 'static {
    /// 用于查找的字段名
    fn route_key_name(&self) -> &str {
        "id"
    }

    /// 按字段查找单个实体
    fn resolve_route_binding(&self, field: &str, value: &str) -> anyhow::Result<Option<Self>>;
}

/// 替换请求中所有实体参数
///
/// - 未被捕获的参数跳过
/// - 可选参数捕获到空值时跳过
/// - 已经是实体的参数不再查找
pub fn substitute_bindings(container: &Container, request: &mut Request) -> StageResult<()> {
    let route = request.route().cloned().ok_or(Fault::MissingRoute)?;

    for parameter in route.action_definition().parameters() {
        let ParamKind::Entity(binder) = parameter.kind() else {
            continue;
        };

        let raw = match request.route_param(parameter.name()) {
            Some(RouteValue::Raw(raw)) => raw.clone(),
            Some(RouteValue::Entity(_)) | None => continue,
        };

        if raw.is_empty() && parameter.is_optional() {
            tracing::trace!(param = parameter.name(), "Skipping empty optional binding");
            continue;
        }

        let lookup = binder.lookup(container, &raw)?;
        match lookup.entity {
            Some(entity) => {
                tracing::debug!(
                    param = parameter.name(),
                    entity = binder.type_name(),
                    value = %raw,
                    "Route binding resolved"
                );
                request.set_parameter(parameter.name(), RouteValue::Entity(entity));
            }
            None => {
                return Err(Fault::EntityNotFound {
                    entity: short_type_name(binder.type_name()).to_string(),
                    field: lookup.field,
                    value: raw,
                });
            }
        }
    }

    Ok(())
}

/// `app::models::Widget` -> `Widget`
fn short_type_name(full: &str) -> &str {
    full.rsplit("::").next().unwrap_or(full)
}

/// 绑定替换阶段
///
/// 注册在容器里，所以只持有容器的弱引用。
pub struct SubstituteBindings {
    container: Weak<Container>,
}

impl SubstituteBindings {
    pub fn new(container: &Arc<Container>) -> Self {
        Self {
            container: Arc::downgrade(container),
        }
    }
}

impl Stage<Request, Response> for SubstituteBindings {
    fn handle(
        &self,
        mut request: Request,
        next: Next<'_, Request, Response>,
    ) -> StageResult<Response> {
        let container = self
            .container
            .upgrade()
            .ok_or_else(|| Fault::Action(anyhow::anyhow!("Container dropped before binding")))?;

        substitute_bindings(&container, &mut request)?;
        next.run(request)
    }
}
