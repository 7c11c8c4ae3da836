//! Web 层错误类型
//!
//! - [`Fault`]：一次管道运行可能产生的所有失败，由路由的失败边界统一翻译成响应，
//!   永远不会原样交给触发机制
//! - [`RouterError`]：路由定义和分发阶段的配置问题，直接返回给调用方

use http::StatusCode;
use hookwire_core::ContainerError;
use thiserror::Error;

/// 阶段和动作的返回结果
pub type StageResult<T> = std::result::Result<T, Fault>;

/// 管道运行失败
#[derive(Error, Debug)]
pub enum Fault {
    /// 路由参数无法解析为实体 - 404 Not Found
    #[error("No {entity} found where {field} = '{value}'")]
    EntityNotFound {
        entity: String,
        field: String,
        value: String,
    },

    /// 带状态码的失败，由用户代码主动抛出
    #[error("{message}")]
    Http { status: StatusCode, message: String },

    /// 容器解析失败（例如中间件键未注册）- 500
    #[error(transparent)]
    Container(#[from] ContainerError),

    /// 动作或阶段抛出的任意错误 - 500
    #[error(transparent)]
    Action(#[from] anyhow::Error),

    /// 需要路由的阶段运行在没有匹配路由的请求上 - 500
    #[error("Request has no matched route")]
    MissingRoute,

    /// 动作或阶段 panic - 500
    #[error("Handler panicked: {0}")]
    Panicked(String),
}

impl Fault {
    /// 构造带状态码的失败
    pub fn http(status: StatusCode, message: impl Into<String>) -> Self {
        Fault::Http {
            status,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::http(StatusCode::NOT_FOUND, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::http(StatusCode::BAD_REQUEST, message)
    }

    pub fn method_not_allowed(message: impl Into<String>) -> Self {
        Self::http(StatusCode::METHOD_NOT_ALLOWED, message)
    }

    /// 获取错误对应的 HTTP 状态码
    pub fn status(&self) -> StatusCode {
        match self {
            Fault::EntityNotFound { .. } => StatusCode::NOT_FOUND,
            Fault::Http { status, .. } => *status,
            Fault::Container(_)
            | Fault::Action(_)
            | Fault::MissingRoute
            | Fault::Panicked(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn is_entity_not_found(&self) -> bool {
        matches!(self, Fault::EntityNotFound { .. })
    }
}

/// 路由定义错误
#[derive(Error, Debug)]
pub enum RouterError {
    /// 分组状态被错误使用（例如在分组内部分发路由）
    #[error("Route group misuse: {0}")]
    GroupMisuse(String),

    #[error("Router macro '{0}' is not registered")]
    MacroNotRegistered(String),

    #[error("Route source '{0}' is not registered")]
    SourceNotFound(String),

    /// 路径模板改写后不是合法的正则
    #[error("Invalid route pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// 路由定义代码自身的错误
    #[error(transparent)]
    Definition(#[from] anyhow::Error),
}
