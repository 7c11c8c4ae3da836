//! 服务提供者
//!
//! 提供者分两个阶段工作：先由所有提供者 `register` 往容器里登记绑定，
//! 再由所有提供者 `boot`，此时可以放心解析其他提供者登记的键。

use std::sync::Arc;

use crate::container::Container;
use crate::error::{ApplicationError, ApplicationResult};

/// 服务提供者 trait
pub trait ServiceProvider: Send + Sync {
    /// 提供者名称
    fn name(&self) -> &str;

    /// 优先级（数字越小越先执行）
    fn priority(&self) -> i32 {
        100
    }

    /// 登记阶段，只登记绑定，不要解析
    fn register(&self, container: &Arc<Container>) -> ApplicationResult<()>;

    /// 启动阶段，所有提供者登记完成后执行
    fn boot(&self, _container: &Arc<Container>) -> ApplicationResult<()> {
        Ok(())
    }
}

/// 提供者注册表
pub struct ProviderRegistry {
    providers: Vec<Box<dyn ServiceProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self {
            providers: Vec::new(),
        }
    }

    /// 注册提供者
    pub fn register(&mut self, provider: Box<dyn ServiceProvider>) {
        tracing::debug!("Registering provider: {}", provider.name());
        self.providers.push(provider);
    }

    /// 按优先级排序（稳定排序，同优先级保持注册顺序）
    pub fn sort_by_priority(&mut self) {
        self.providers.sort_by_key(|p| p.priority());
    }

    pub fn providers(&self) -> &[Box<dyn ServiceProvider>] {
        &self.providers
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// 执行登记阶段
    pub fn register_all(&self, container: &Arc<Container>) -> ApplicationResult<()> {
        for provider in &self.providers {
            tracing::info!("Registering services from provider: {}", provider.name());
            provider
                .register(container)
                .map_err(|e| provider_error(provider.name(), e))?;
        }
        Ok(())
    }

    /// 执行启动阶段
    pub fn boot_all(&self, container: &Arc<Container>) -> ApplicationResult<()> {
        for provider in &self.providers {
            tracing::info!("Booting provider: {}", provider.name());
            provider
                .boot(container)
                .map_err(|e| provider_error(provider.name(), e))?;
        }
        Ok(())
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// 给提供者错误补上提供者名称
fn provider_error(name: &str, error: ApplicationError) -> ApplicationError {
    match error {
        ApplicationError::Provider { .. } => error,
        other => ApplicationError::Provider {
            name: name.to_string(),
            source: anyhow::Error::new(other),
        },
    }
}

/// 用于全局收集提供者的宏
#[macro_export]
macro_rules! submit_provider {
    ($provider_type:ty) => {
        $crate::inventory::submit! {
            $crate::ProviderSubmission {
                create: || Box::new(<$provider_type>::default())
            }
        }
    };
}

/// 提供者提交结构
pub struct ProviderSubmission {
    pub create: fn() -> Box<dyn ServiceProvider>,
}

inventory::collect!(ProviderSubmission);

/// 从全局注册表加载所有提供者
pub fn load_providers() -> ProviderRegistry {
    let mut registry = ProviderRegistry::new();

    for submission in inventory::iter::<ProviderSubmission> {
        registry.register((submission.create)());
    }

    registry.sort_by_priority();
    registry
}
