//! 统一的错误类型
//!
//! 容器错误（[`ContainerError`]）表示启动或解析阶段的配置问题，允许向调用方传播；
//! 应用错误（[`ApplicationError`]）覆盖引导阶段（配置、日志、服务提供者）。

use thiserror::Error;

/// 容器操作结果
pub type ContainerResult<T> = std::result::Result<T, ContainerError>;

/// 应用引导结果
pub type ApplicationResult<T> = std::result::Result<T, ApplicationError>;

/// 容器错误
#[derive(Error, Debug)]
pub enum ContainerError {
    /// 既没有绑定也没有实例
    #[error("No binding or instance registered for '{0}'")]
    NotFound(String),

    /// 工厂在构造过程中失败，原始错误作为 source 保留
    #[error("Failed to construct '{key}': {source}")]
    ConstructionFailure {
        key: String,
        #[source]
        source: anyhow::Error,
    },

    /// 解析链中出现了环
    #[error("Circular dependency detected: {0}")]
    CircularDependency(String),

    /// 解析出的值无法转换为请求的类型
    #[error("Value registered for '{key}' is not of type {expected}")]
    TypeMismatch { key: String, expected: &'static str },
}

impl ContainerError {
    /// 是否为 NotFound
    pub fn is_not_found(&self) -> bool {
        matches!(self, ContainerError::NotFound(_))
    }
}

/// 应用引导错误
#[derive(Error, Debug)]
pub enum ApplicationError {
    #[error(transparent)]
    Container(#[from] ContainerError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to initialize logging: {0}")]
    LoggingInitFailed(String),

    #[error("Service provider '{name}' failed: {source}")]
    Provider {
        name: String,
        #[source]
        source: anyhow::Error,
    },
}
