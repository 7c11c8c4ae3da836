use std::path::Path;
use std::sync::Arc;

use crate::config::{Environment, EnvironmentPropertySource, TomlPropertySource};
use crate::constants::{APP_NAME_KEY, CONFIG_KEY, DEFAULT_CONFIG_FILE, DEFAULT_ENV_PREFIX};
use crate::container::Container;
use crate::error::ApplicationResult;
use crate::logging::LoggingConfig;
use crate::provider::{load_providers, ProviderRegistry, ServiceProvider};

/// Hookwire 应用程序
///
/// 负责引导：加载配置、初始化日志、创建容器，然后让服务提供者
/// 依次登记和启动。路由定义由提供者在启动阶段完成。
pub struct Application {
    /// 应用名称
    name: String,

    /// 配置文件路径（不存在的文件会被跳过）
    config_files: Vec<String>,

    /// 环境变量前缀
    env_prefix: String,

    /// 日志配置，未设置时从配置和环境变量推导
    logging_config: Option<LoggingConfig>,

    /// 是否初始化日志
    init_logging: bool,

    /// 是否加载通过 `submit_provider!` 提交的提供者
    discover_providers: bool,

    /// 显式添加的提供者
    providers: Vec<Box<dyn ServiceProvider>>,
}

impl Application {
    /// 创建新的应用
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            config_files: vec![DEFAULT_CONFIG_FILE.to_string()],
            env_prefix: DEFAULT_ENV_PREFIX.to_string(),
            logging_config: None,
            init_logging: true,
            discover_providers: true,
            providers: Vec::new(),
        }
    }

    /// 设置配置文件路径
    pub fn config_file(mut self, path: impl Into<String>) -> Self {
        self.config_files = vec![path.into()];
        self
    }

    /// 设置多个配置文件，后面的覆盖前面的
    pub fn config_files(mut self, paths: Vec<String>) -> Self {
        self.config_files = paths;
        self
    }

    /// 设置环境变量前缀
    pub fn env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    /// 设置日志配置
    pub fn logging(mut self, config: LoggingConfig) -> Self {
        self.logging_config = Some(config);
        self
    }

    /// 不初始化日志（由调用方自行安装订阅者）
    pub fn skip_logging(mut self) -> Self {
        self.init_logging = false;
        self
    }

    /// 不加载全局提交的提供者，只使用显式添加的
    pub fn without_discovery(mut self) -> Self {
        self.discover_providers = false;
        self
    }

    /// 添加提供者
    pub fn provider(mut self, provider: impl ServiceProvider + 'static) -> Self {
        self.providers.push(Box::new(provider));
        self
    }

    /// 运行应用
    pub fn run(self) -> ApplicationResult<RunningApplication> {
        let start_time = std::time::Instant::now();

        let environment = Arc::new(self.build_environment());

        if self.init_logging {
            let logging_config = self
                .logging_config
                .clone()
                .unwrap_or_else(|| LoggingConfig::from_environment(&environment));
            // 订阅者已存在（例如测试中多次启动）时不视为致命错误
            if let Err(e) = logging_config.init() {
                tracing::debug!("Logging not initialized: {}", e);
            }
        }

        tracing::info!("Starting {} application", self.name);

        let container = Arc::new(Container::new());
        container.instance_arc(CONFIG_KEY, Arc::clone(&environment));
        container.instance(APP_NAME_KEY, self.name.clone());

        let mut registry = if self.discover_providers {
            load_providers()
        } else {
            ProviderRegistry::new()
        };
        for provider in self.providers {
            registry.register(provider);
        }
        registry.sort_by_priority();

        tracing::info!("Loaded {} service provider(s)", registry.len());

        registry.register_all(&container)?;
        registry.boot_all(&container)?;

        tracing::info!(
            "Started {} in {}ms",
            self.name,
            start_time.elapsed().as_millis()
        );

        Ok(RunningApplication {
            name: self.name,
            container,
            environment,
        })
    }

    fn build_environment(&self) -> Environment {
        let environment = Environment::new();

        for (index, config_file) in self.config_files.iter().enumerate() {
            if !Path::new(config_file).exists() {
                tracing::debug!("Configuration file not found: {}", config_file);
                continue;
            }
            match TomlPropertySource::from_file(config_file) {
                Ok(source) => {
                    let priority = index as i32;
                    tracing::info!(
                        "Loaded configuration from: {} (priority: {})",
                        config_file,
                        priority
                    );
                    environment.add_property_source(Box::new(source.with_priority(priority)));
                }
                Err(e) => {
                    tracing::warn!("Failed to load {}: {}", config_file, e);
                }
            }
        }

        // 环境变量优先级最高
        environment.add_property_source(Box::new(EnvironmentPropertySource::new(
            &self.env_prefix,
        )));
        tracing::debug!("Environment variable prefix: {}", self.env_prefix);

        environment
    }
}

impl Default for Application {
    fn default() -> Self {
        Self::new("HookwireApplication")
    }
}

/// 运行中的应用
pub struct RunningApplication {
    name: String,
    container: Arc<Container>,
    environment: Arc<Environment>,
}

impl RunningApplication {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn container(&self) -> &Arc<Container> {
        &self.container
    }

    pub fn environment(&self) -> &Arc<Environment> {
        &self.environment
    }
}

impl std::fmt::Debug for RunningApplication {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunningApplication")
            .field("name", &self.name)
            .field("container", &self.container)
            .finish()
    }
}
