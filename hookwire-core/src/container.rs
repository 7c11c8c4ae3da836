//! 依赖容器
//!
//! 以字符串键登记构造配方（绑定）或已构造好的实例，按需惰性解析：
//! - `bind` 注册的绑定每次解析都会调用工厂
//! - `singleton` 注册的绑定首次解析后缓存到实例表，之后返回同一个实例
//! - `instance` 直接登记已构造的值，解析时绕过任何工厂

use std::any::{type_name, Any};
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::{ContainerError, ContainerResult};
use crate::utils::dependency::{CreationGuard, CreationTracker};

/// 容器中保存的值
pub type Instance = Arc<dyn Any + Send + Sync>;

/// 类型擦除后的工厂
pub type Factory = Arc<dyn Fn(&Container) -> anyhow::Result<Instance> + Send + Sync>;

/// 构造配方
#[derive(Clone)]
struct Binding {
    factory: Factory,
    shared: bool,
}

/// 进程级依赖容器
///
/// 内部使用读写锁，可以 `Arc<Container>` 的形式在路由、管道和阶段之间共享。
/// 工厂执行期间不持有任何锁，因此工厂内部可以继续解析其他键。
pub struct Container {
    /// 构造配方
    bindings: RwLock<HashMap<String, Binding>>,

    /// 已构造的实例（显式登记或单例缓存）
    instances: RwLock<HashMap<String, Instance>>,

    /// 循环依赖检测
    creation_tracker: CreationTracker,
}

impl Container {
    /// 创建空容器
    pub fn new() -> Self {
        Self {
            bindings: RwLock::new(HashMap::new()),
            instances: RwLock::new(HashMap::new()),
            creation_tracker: CreationTracker::new(),
        }
    }

    /// 注册（或覆盖）非共享绑定
    pub fn bind<T, F>(&self, key: impl Into<String>, factory: F)
    where
        T: Any + Send + Sync,
        F: Fn(&Container) -> anyhow::Result<T> + Send + Sync + 'static,
    {
        self.bind_with(key, factory, false);
    }

    /// 注册（或覆盖）共享绑定，等价于 `bind_with(key, factory, true)`
    pub fn singleton<T, F>(&self, key: impl Into<String>, factory: F)
    where
        T: Any + Send + Sync,
        F: Fn(&Container) -> anyhow::Result<T> + Send + Sync + 'static,
    {
        self.bind_with(key, factory, true);
    }

    /// 注册绑定并指定是否共享
    ///
    /// 覆盖绑定时会丢弃该键已缓存的实例，下一次解析使用新的配方。
    pub fn bind_with<T, F>(&self, key: impl Into<String>, factory: F, shared: bool)
    where
        T: Any + Send + Sync,
        F: Fn(&Container) -> anyhow::Result<T> + Send + Sync + 'static,
    {
        let key = key.into();
        let factory: Factory =
            Arc::new(move |container| factory(container).map(|value| Arc::new(value) as Instance));

        self.instances.write().remove(&key);
        let replaced = self
            .bindings
            .write()
            .insert(key.clone(), Binding { factory, shared })
            .is_some();

        tracing::trace!(key = %key, shared, replaced, "Binding registered");
    }

    /// 登记已构造的值
    pub fn instance<T>(&self, key: impl Into<String>, value: T) -> Arc<T>
    where
        T: Any + Send + Sync,
    {
        let value = Arc::new(value);
        self.instance_arc(key, Arc::clone(&value));
        value
    }

    /// 登记已构造的共享值（保持调用方持有的 `Arc` 与容器中的是同一个）
    pub fn instance_arc<T>(&self, key: impl Into<String>, value: Arc<T>)
    where
        T: Any + Send + Sync,
    {
        let key = key.into();
        tracing::trace!(key = %key, type_name = type_name::<T>(), "Instance registered");
        self.instances.write().insert(key, value as Instance);
    }

    /// 是否存在实例或绑定
    pub fn has(&self, key: &str) -> bool {
        self.instances.read().contains_key(key) || self.bindings.read().contains_key(key)
    }

    /// 该键是否以共享方式绑定
    pub fn is_shared(&self, key: &str) -> bool {
        self.instances.read().contains_key(key)
            || self
                .bindings
                .read()
                .get(key)
                .map(|binding| binding.shared)
                .unwrap_or(false)
    }

    /// 解析一个键
    ///
    /// 实例优先；否则执行绑定的工厂，共享绑定首次构造后写入实例表。
    pub fn get(&self, key: &str) -> ContainerResult<Instance> {
        if let Some(instance) = self.instances.read().get(key) {
            tracing::trace!(key = %key, "Resolved from instances");
            return Ok(Arc::clone(instance));
        }

        let binding = self.binding(key)?;
        let instance = self.build(key, &binding)?;

        if binding.shared {
            let mut instances = self.instances.write();
            let cached = instances
                .entry(key.to_string())
                .or_insert_with(|| Arc::clone(&instance));
            tracing::debug!(key = %key, "Shared instance created and cached");
            return Ok(Arc::clone(cached));
        }

        Ok(instance)
    }

    /// 解析并转换为具体类型
    pub fn get_as<T>(&self, key: &str) -> ContainerResult<Arc<T>>
    where
        T: Any + Send + Sync,
    {
        self.get(key)?
            .downcast::<T>()
            .map_err(|_| ContainerError::TypeMismatch {
                key: key.to_string(),
                expected: type_name::<T>(),
            })
    }

    /// 忽略缓存，总是通过绑定构造一个新值
    ///
    /// 只有实例没有绑定的键直接返回该实例。
    pub fn make(&self, key: &str) -> ContainerResult<Instance> {
        match self.binding(key) {
            Ok(binding) => self.build(key, &binding),
            Err(err) => self
                .instances
                .read()
                .get(key)
                .cloned()
                .ok_or(err),
        }
    }

    /// 以类型名为键注册非共享绑定
    pub fn bind_type<T, F>(&self, factory: F)
    where
        T: Any + Send + Sync,
        F: Fn(&Container) -> anyhow::Result<T> + Send + Sync + 'static,
    {
        self.bind(type_name::<T>(), factory);
    }

    /// 以类型名为键注册共享绑定
    pub fn singleton_type<T, F>(&self, factory: F)
    where
        T: Any + Send + Sync,
        F: Fn(&Container) -> anyhow::Result<T> + Send + Sync + 'static,
    {
        self.singleton(type_name::<T>(), factory);
    }

    /// 按类型名解析
    pub fn get_type<T>(&self) -> ContainerResult<Arc<T>>
    where
        T: Any + Send + Sync,
    {
        self.get_as::<T>(type_name::<T>())
    }

    /// 丢弃已缓存的实例，绑定保留
    pub fn forget_instance(&self, key: &str) -> bool {
        self.instances.write().remove(key).is_some()
    }

    /// 移除一个键的绑定和实例
    ///
    /// 工厂执行中移除自身的键后失败时，解析结果是 NotFound 而不是构造失败。
    pub fn forget(&self, key: &str) -> bool {
        let instance = self.instances.write().remove(key).is_some();
        let binding = self.bindings.write().remove(key).is_some();
        tracing::trace!(key = %key, instance, binding, "Key forgotten");
        instance || binding
    }

    /// 所有已登记的键（排序后）
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .bindings
            .read()
            .keys()
            .chain(self.instances.read().keys())
            .cloned()
            .collect();
        keys.sort();
        keys.dedup();
        keys
    }

    fn binding(&self, key: &str) -> ContainerResult<Binding> {
        self.bindings.read().get(key).cloned().ok_or_else(|| {
            tracing::debug!(key = %key, "Key not registered in container");
            ContainerError::NotFound(key.to_string())
        })
    }

    fn build(&self, key: &str, binding: &Binding) -> ContainerResult<Instance> {
        if !self.creation_tracker.start_creating(key) {
            let chain = self.creation_tracker.current_chain();
            tracing::error!(
                key = %key,
                chain = ?chain,
                "Circular dependency detected while resolving"
            );
            return Err(ContainerError::CircularDependency(format!(
                "{} -> {}",
                chain.join(" -> "),
                key
            )));
        }
        let _guard = CreationGuard::new(&self.creation_tracker, key);

        (binding.factory)(self).map_err(|source| self.construction_failure(key, source))
    }

    /// 包装工厂错误
    ///
    /// 嵌套的循环依赖原样上抛；键本身已不存在时 NotFound 优先。
    fn construction_failure(&self, key: &str, source: anyhow::Error) -> ContainerError {
        let source = match source.downcast::<ContainerError>() {
            Ok(ContainerError::CircularDependency(chain)) => {
                return ContainerError::CircularDependency(chain)
            }
            Ok(inner) => anyhow::Error::new(inner),
            Err(source) => source,
        };

        if !self.has(key) {
            return ContainerError::NotFound(key.to_string());
        }

        tracing::warn!(key = %key, error = %source, "Factory failed during construction");
        ContainerError::ConstructionFailure {
            key: key.to_string(),
            source,
        }
    }
}

impl Default for Container {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Container")
            .field("bindings", &self.bindings.read().len())
            .field("instances", &self.instances.read().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Mailer {
        id: usize,
    }

    #[test]
    fn test_singleton_returns_identical_instance() {
        let container = Container::new();
        let built = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&built);
        container.singleton("mailer", move |_| {
            Ok(Mailer {
                id: counter.fetch_add(1, Ordering::SeqCst),
            })
        });

        let first = container.get_as::<Mailer>("mailer").unwrap();
        let second = container.get_as::<Mailer>("mailer").unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(built.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_bind_builds_every_time() {
        let container = Container::new();
        let built = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&built);
        container.bind("mailer", move |_| {
            Ok(Mailer {
                id: counter.fetch_add(1, Ordering::SeqCst),
            })
        });

        let first = container.get_as::<Mailer>("mailer").unwrap();
        let second = container.get_as::<Mailer>("mailer").unwrap();

        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!((first.id, second.id), (0, 1));
    }

    #[test]
    fn test_missing_key_is_not_found() {
        let container = Container::new();
        assert!(!container.has("unregistered.key"));

        let err = container.get("unregistered.key").unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_instance_bypasses_factory() {
        let container = Container::new();
        container.bind("mailer", |_| -> anyhow::Result<Mailer> {
            anyhow::bail!("factory must not run")
        });
        let registered = container.instance("mailer", Mailer { id: 7 });

        let resolved = container.get_as::<Mailer>("mailer").unwrap();
        assert!(Arc::ptr_eq(&registered, &resolved));
    }

    #[test]
    fn test_factory_failure_is_wrapped() {
        let container = Container::new();
        container.bind("mailer", |_| -> anyhow::Result<Mailer> {
            anyhow::bail!("smtp host missing")
        });

        match container.get("mailer") {
            Err(ContainerError::ConstructionFailure { key, source }) => {
                assert_eq!(key, "mailer");
                assert!(source.to_string().contains("smtp host missing"));
            }
            other => panic!("expected ConstructionFailure, got {:?}", other.err()),
        }
    }

    #[test]
    fn test_singleton_memo_visible_to_has() {
        let container = Container::new();
        container.singleton("mailer", |_| Ok(Mailer { id: 1 }));
        container.get("mailer").unwrap();

        assert!(container.has("mailer"));
        assert!(container.is_shared("mailer"));
        assert!(container.forget_instance("mailer"));
        assert!(!container.forget_instance("mailer"));
    }

    #[test]
    fn test_rebinding_drops_stale_instance() {
        let container = Container::new();
        container.singleton("mailer", |_| Ok(Mailer { id: 1 }));
        assert_eq!(container.get_as::<Mailer>("mailer").unwrap().id, 1);

        container.singleton("mailer", |_| Ok(Mailer { id: 2 }));
        assert_eq!(container.get_as::<Mailer>("mailer").unwrap().id, 2);
    }

    #[test]
    fn test_nested_resolution() {
        struct Transport(&'static str);

        let container = Container::new();
        container.singleton("transport", |_| Ok(Transport("smtp")));
        container.bind("mailer", |c| {
            let transport = c.get_as::<Transport>("transport")?;
            Ok(Mailer {
                id: transport.0.len(),
            })
        });

        assert_eq!(container.get_as::<Mailer>("mailer").unwrap().id, 4);
    }

    #[test]
    fn test_circular_dependency_detected() {
        let container = Container::new();
        container.bind("a", |c| c.get("b").map(|_| ()).map_err(anyhow::Error::from));
        container.bind("b", |c| c.get("a").map(|_| ()).map_err(anyhow::Error::from));

        match container.get("a") {
            Err(ContainerError::CircularDependency(chain)) => {
                assert_eq!(chain, "a -> b -> a");
            }
            other => panic!("expected CircularDependency, got {:?}", other.err()),
        }
        // tracker is cleared after the failure
        assert!(matches!(
            container.get("a"),
            Err(ContainerError::CircularDependency(_))
        ));
    }

    #[test]
    fn test_type_mismatch() {
        let container = Container::new();
        container.instance("mailer", 42_u32);

        assert!(matches!(
            container.get_as::<Mailer>("mailer"),
            Err(ContainerError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_typed_helpers_and_make() {
        let container = Container::new();
        container.singleton_type::<Mailer, _>(|_| Ok(Mailer { id: 3 }));

        let first = container.get_type::<Mailer>().unwrap();
        let second = container.get_type::<Mailer>().unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        let fresh = container.make(type_name::<Mailer>()).unwrap();
        let fresh = fresh.downcast::<Mailer>().unwrap();
        assert!(!Arc::ptr_eq(&first, &fresh));
    }

    #[test]
    fn test_forget_removes_binding_and_instance() {
        let container = Container::new();
        container.singleton("mailer", |_| Ok(Mailer { id: 1 }));
        container.get("mailer").unwrap();

        assert!(container.forget("mailer"));
        assert!(!container.has("mailer"));
        assert!(container.get("mailer").unwrap_err().is_not_found());
        assert!(!container.forget("mailer"));
    }

    #[test]
    fn test_key_removed_during_failed_construction_is_not_found() {
        let container = Container::new();
        container.bind("mailer", |c| -> anyhow::Result<Mailer> {
            c.forget("mailer");
            anyhow::bail!("smtp host missing")
        });

        assert!(matches!(
            container.get("mailer"),
            Err(ContainerError::NotFound(key)) if key == "mailer"
        ));
    }

    #[test]
    fn test_concurrent_first_resolution_is_not_a_cycle() {
        use std::sync::Barrier;
        use std::thread;
        use std::time::Duration;

        let container = Arc::new(Container::new());
        container.singleton("mailer", |_| {
            thread::sleep(Duration::from_millis(50));
            Ok(Mailer { id: 1 })
        });

        let barrier = Arc::new(Barrier::new(2));
        let handles: Vec<_> = (0..2)
            .map(|_| {
                let container = Arc::clone(&container);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    container.get_as::<Mailer>("mailer")
                })
            })
            .collect();

        let resolved: Vec<Arc<Mailer>> = handles
            .into_iter()
            .map(|handle| handle.join().unwrap().unwrap())
            .collect();

        assert!(Arc::ptr_eq(&resolved[0], &resolved[1]));
        assert_eq!(resolved[0].id, 1);
    }

    #[test]
    fn test_keys_are_sorted_and_unique() {
        let container = Container::new();
        container.singleton("b", |_| Ok(1_u8));
        container.instance("a", 2_u8);
        container.get("b").unwrap();

        assert_eq!(container.keys(), vec!["a", "b"]);
    }
}
