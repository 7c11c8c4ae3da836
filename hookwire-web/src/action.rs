//! 路由动作
//!
//! 动作有两种形态：
//! - 直接可调用的处理函数
//! - 类动作：记录类型和方法名，每次 `resolve` 时直接构造一个新实例再绑定到方法上
//!   （不经过容器，也不缓存）
//!
//! 动作还声明自己的参数列表，绑定替换阶段据此判断哪些路径参数需要解析为实体。

use std::any::type_name;
use std::sync::Arc;

use hookwire_core::Container;

use crate::binding::RouteModel;
use crate::error::{Fault, StageResult};
use crate::request::{EntityValue, Request};
use crate::response::{IntoResponse, Response};

/// 处理函数
pub trait Handler: Send + Sync {
    fn call(&self, request: Request) -> StageResult<Response>;
}

impl<F, R, E> Handler for F
where
    F: Fn(Request) -> Result<R, E> + Send + Sync,
    R: IntoResponse,
    E: Into<Fault>,
{
    fn call(&self, request: Request) -> StageResult<Response> {
        (self)(request)
            .map(IntoResponse::into_response)
            .map_err(Into::into)
    }
}

/// 类动作的约定入口
pub trait Invokable: Send + Sync {
    fn invoke(&self, request: Request) -> StageResult<Response>;
}

/// 实体查找结果
pub struct BindingLookup {
    /// 实际用于查找的字段
    pub field: String,
    pub entity: Option<EntityValue>,
}

type Resolver = Arc<dyn Fn(&Container, &str) -> StageResult<BindingLookup> + Send + Sync>;

/// 实体参数的查找能力
#[derive(Clone)]
pub struct EntityBinder {
    type_name: &'static str,
    resolve: Resolver,
}

impl EntityBinder {
    fn new<T: RouteModel + Default>(key_name: Option<String>) -> Self {
        let resolve: Resolver = Arc::new(
            move |container: &Container, raw: &str| -> StageResult<BindingLookup> {
                let model = resolve_model::<T>(container)?;
                let field = key_name
                    .clone()
                    .unwrap_or_else(|| model.route_key_name().to_string());
                let entity = model
                    .resolve_route_binding(&field, raw)
                    .map_err(Fault::Action)?
                    .map(EntityValue::new);
                Ok(BindingLookup { field, entity })
            },
        );

        Self {
            type_name: type_name::<T>(),
            resolve,
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// 按原始值查找实体
    pub fn lookup(&self, container: &Container, raw: &str) -> StageResult<BindingLookup> {
        (self.resolve)(container, raw)
    }
}

/// 容器中登记了该类型时使用容器里的实例，否则直接构造
fn resolve_model<T: RouteModel + Default>(container: &Container) -> StageResult<Arc<T>> {
    if container.has(type_name::<T>()) {
        Ok(container.get_type::<T>()?)
    } else {
        Ok(Arc::new(T::default()))
    }
}

/// 参数声明的类型
#[derive(Clone)]
pub enum ParamKind {
    /// 未声明类型
    Untyped,
    /// 基本类型（字符串、数字等），不参与绑定
    Primitive(&'static str),
    /// 非基本类型但不具备查找能力，原始值原样保留
    Class(&'static str),
    /// 领域实体，按路由键查找
    Entity(EntityBinder),
}

impl ParamKind {
    pub fn type_name(&self) -> Option<&'static str> {
        match self {
            ParamKind::Untyped => None,
            ParamKind::Primitive(name) | ParamKind::Class(name) => Some(name),
            ParamKind::Entity(binder) => Some(binder.type_name()),
        }
    }
}

impl std::fmt::Debug for ParamKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParamKind::Untyped => write!(f, "Untyped"),
            ParamKind::Primitive(name) => write!(f, "Primitive({})", name),
            ParamKind::Class(name) => write!(f, "Class({})", name),
            ParamKind::Entity(binder) => write!(f, "Entity({})", binder.type_name()),
        }
    }
}

/// 动作参数声明
#[derive(Debug, Clone)]
pub struct Parameter {
    name: String,
    kind: ParamKind,
    optional: bool,
}

impl Parameter {
    pub fn untyped(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ParamKind::Untyped,
            optional: false,
        }
    }

    pub fn primitive<T>(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ParamKind::Primitive(type_name::<T>()),
            optional: false,
        }
    }

    pub fn class<T>(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ParamKind::Class(type_name::<T>()),
            optional: false,
        }
    }

    /// 按实体自身的路由键查找
    pub fn entity<T: RouteModel + Default>(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ParamKind::Entity(EntityBinder::new::<T>(None)),
            optional: false,
        }
    }

    /// 按指定字段查找
    pub fn entity_with_key<T: RouteModel + Default>(
        name: impl Into<String>,
        key: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            kind: ParamKind::Entity(EntityBinder::new::<T>(Some(key.into()))),
            optional: false,
        }
    }

    /// 标记为可选参数
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &ParamKind {
        &self.kind
    }

    pub fn is_optional(&self) -> bool {
        self.optional
    }

    /// 是否为领域实体参数
    pub fn is_domain(&self) -> bool {
        matches!(self.kind, ParamKind::Entity(_))
    }
}

type Constructor = Arc<dyn Fn() -> Arc<dyn Handler> + Send + Sync>;

/// 类动作
#[derive(Clone)]
pub struct ClassAction {
    class: &'static str,
    method: &'static str,
    construct: Constructor,
}

impl ClassAction {
    pub fn class(&self) -> &'static str {
        self.class
    }

    pub fn method(&self) -> &'static str {
        self.method
    }
}

/// 动作形态
#[derive(Clone)]
pub enum ActionKind {
    Invocable(Arc<dyn Handler>),
    Class(ClassAction),
}

/// 路由动作
#[derive(Clone)]
pub struct Action {
    kind: ActionKind,
    parameters: Vec<Parameter>,
}

impl Action {
    /// 直接可调用的动作
    pub fn new<F, R, E>(handler: F) -> Self
    where
        F: Fn(Request) -> Result<R, E> + Send + Sync + 'static,
        R: IntoResponse + 'static,
        E: Into<Fault> + 'static,
    {
        Self::handler(Arc::new(handler))
    }

    pub fn handler(handler: Arc<dyn Handler>) -> Self {
        Self {
            kind: ActionKind::Invocable(handler),
            parameters: Vec::new(),
        }
    }

    /// 类动作，入口为 [`Invokable::invoke`]
    pub fn class<C>() -> Self
    where
        C: Invokable + Default + 'static,
    {
        let construct: Constructor = Arc::new(|| {
            let instance = C::default();
            Arc::new(move |request: Request| instance.invoke(request)) as Arc<dyn Handler>
        });

        Self {
            kind: ActionKind::Class(ClassAction {
                class: type_name::<C>(),
                method: "invoke",
                construct,
            }),
            parameters: Vec::new(),
        }
    }

    /// 类 + 方法形式的动作
    pub fn method<C, R, E>(name: &'static str, method: fn(&C, Request) -> Result<R, E>) -> Self
    where
        C: Default + Send + Sync + 'static,
        R: IntoResponse + 'static,
        E: Into<Fault> + 'static,
    {
        let construct: Constructor = Arc::new(move || {
            let instance = C::default();
            Arc::new(move |request: Request| method(&instance, request)) as Arc<dyn Handler>
        });

        Self {
            kind: ActionKind::Class(ClassAction {
                class: type_name::<C>(),
                method: name,
                construct,
            }),
            parameters: Vec::new(),
        }
    }

    /// 声明一个参数
    pub fn param(mut self, parameter: Parameter) -> Self {
        self.parameters.push(parameter);
        self
    }

    pub fn with_parameters(mut self, parameters: impl IntoIterator<Item = Parameter>) -> Self {
        self.parameters.extend(parameters);
        self
    }

    /// 参数列表（按声明顺序）
    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    pub fn kind(&self) -> &ActionKind {
        &self.kind
    }

    /// 得到可调用的处理函数
    ///
    /// 类动作每次调用都会构造新的实例。
    pub fn resolve(&self) -> Arc<dyn Handler> {
        match &self.kind {
            ActionKind::Invocable(handler) => Arc::clone(handler),
            ActionKind::Class(action) => {
                tracing::trace!(
                    class = action.class,
                    method = action.method,
                    "Constructing action"
                );
                (action.construct)()
            }
        }
    }

    /// 用于日志和路由列表的描述
    pub fn describe(&self) -> String {
        match &self.kind {
            ActionKind::Invocable(_) => "Closure".to_string(),
            ActionKind::Class(action) => format!("{}@{}", action.class, action.method),
        }
    }
}

impl std::fmt::Debug for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Action")
            .field("action", &self.describe())
            .field("parameters", &self.parameters)
            .finish()
    }
}
