// hookwire-core: 请求分发核心的基础设施
//
// 提供：
// - 以字符串键登记的惰性依赖容器（绑定 / 单例 / 实例）
// - 分层配置（TOML 文件、环境变量、内存映射）
// - 日志初始化
// - 钩子注册表（外部触发机制的进程内实现）
// - 服务提供者与应用引导

pub mod app;
pub mod config;
pub mod constants;
pub mod container;
pub mod error;
pub mod event;
pub mod logging;
pub mod provider;
pub mod utils;

// 重新导出常用类型
pub use app::{Application, RunningApplication};
pub use config::{
    ConfigValue, Environment, EnvironmentPropertySource, MapPropertySource, PropertySource,
    TomlPropertySource,
};
pub use constants::*;
pub use container::{Container, Factory, Instance};
pub use error::{ApplicationError, ApplicationResult, ContainerError, ContainerResult};
pub use event::{HookRegistry, Listener, Trigger};
pub use logging::{LogFormat, LogLevel, LoggingConfig};
pub use provider::{load_providers, ProviderRegistry, ProviderSubmission, ServiceProvider};

// 导出 inventory，供宏使用
pub use inventory;

/// Prelude 模块，包含常用的 traits 和类型
pub mod prelude {
    pub use crate::app::{Application, RunningApplication};
    pub use crate::config::{
        self, ConfigValue, Environment, EnvironmentPropertySource, MapPropertySource,
        PropertySource, TomlPropertySource,
    };
    pub use crate::container::Container;
    pub use crate::error::{ApplicationError, ApplicationResult, ContainerError, ContainerResult};
    pub use crate::event::{HookRegistry, Trigger};
    pub use crate::logging::{LogFormat, LogLevel, LoggingConfig};
    pub use crate::provider::{load_providers, ProviderRegistry, ServiceProvider};
    pub use crate::submit_provider;
    // Re-export anyhow for convenience
    pub use anyhow::{anyhow, Context};
}
