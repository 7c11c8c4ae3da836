//! # Hookwire Web
//!
//! 基于钩子的请求分发层，构建在 hookwire-core 的容器之上
//!
//! ## 核心特性
//!
//! - **路由分组** - 前缀、命名空间、中间件按层继承
//! - **两种分发策略** - REST 初始化事件中登记的资源式路由，以及挂在动作钩子上的动作式路由
//! - **中间件管道** - 洋葱式调用链，阶段可以从容器按键解析
//! - **模型绑定** - 路径参数自动替换为领域实体，找不到时返回 404
//! - **失败边界** - 动作和中间件的错误统一翻译为响应

pub mod action;
pub mod ajax;
pub mod binding;
pub mod config;
pub mod constants;
pub mod error;
pub mod exception_handler;
pub mod middleware;
pub mod pipeline;
pub mod platform;
pub mod request;
pub mod resource;
pub mod response;
pub mod rest;
pub mod route;
pub mod route_source;
pub mod router;

pub use action::{Action, ActionKind, Handler, Invokable, ParamKind, Parameter};
pub use binding::{substitute_bindings, RouteModel, SubstituteBindings};
pub use config::RoutingConfig;
pub use error::{Fault, RouterError, StageResult};
pub use exception_handler::{
    ErrorResponse, ExceptionHandler, ExceptionHandlerRegistration, ExceptionHandlerRegistry,
    GlobalExceptionHandler,
};
pub use middleware::{register_defaults, ContainerStageExt, WebServiceProvider};
pub use pipeline::{Next, Pipe, Pipeline, Stage, StageFn};
pub use platform::{LocalPlatform, Platform, RestRequest};
pub use request::{EntityValue, Request, RouteValue};
pub use resource::{ResourceController, ResourceMethod};
pub use response::{Body, IntoResponse, Response, ResponseEntity};
pub use route::{GroupAttributes, Outcome, Route, RouteState, Strategy};
pub use route_source::RouteSource;
pub use router::Router;

// 导出 inventory，供宏使用
pub use inventory;

pub mod prelude {
    //! 预导入模块

    pub use crate::action::{Action, Invokable, Parameter};
    pub use crate::binding::RouteModel;
    pub use crate::error::{Fault, RouterError, StageResult};
    pub use crate::exception_handler::{ErrorResponse, ExceptionHandler, GlobalExceptionHandler};
    pub use crate::middleware::ContainerStageExt;
    pub use crate::pipeline::{Next, Pipe, Pipeline, Stage};
    pub use crate::platform::{LocalPlatform, Platform};
    pub use crate::request::Request;
    pub use crate::resource::{ResourceController, ResourceMethod};
    pub use crate::response::{IntoResponse, Response, ResponseEntity};
    pub use crate::route::{Route, RouteState};
    pub use crate::route_source;
    pub use crate::router::Router;

    pub use http::{Method, StatusCode};
}
