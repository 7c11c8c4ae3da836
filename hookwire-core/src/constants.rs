//! 核心容器键常量
//!
//! 容器、宏和各个提供者通过这些常量引用同一个键，避免硬编码。

/// 应用配置（`Arc<Environment>`）
pub const CONFIG_KEY: &str = "config";

/// 应用名称（`String`）
pub const APP_NAME_KEY: &str = "app.name";

/// 默认配置文件
pub const DEFAULT_CONFIG_FILE: &str = "hookwire.toml";

/// 默认环境变量前缀
pub const DEFAULT_ENV_PREFIX: &str = "HOOKWIRE_";
