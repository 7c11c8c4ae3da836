//! 钩子注册表
//!
//! 以名字登记回调，按名字触发。路由通过它把自己挂到外部触发机制上：
//! 平台在合适的时机触发某个钩子，所有监听者按登记顺序依次执行，
//! 直到某个监听者调用 [`Trigger::terminate`] 产生输出为止。

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

/// 一次触发
///
/// 携带钩子名、可选的载荷以及输出槽。
pub struct Trigger<P, O> {
    name: String,
    payload: Option<P>,
    output: Option<O>,
}

impl<P, O> Trigger<P, O> {
    pub fn new(name: impl Into<String>, payload: Option<P>) -> Self {
        Self {
            name: name.into(),
            payload,
            output: None,
        }
    }

    /// 钩子名
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn payload(&self) -> Option<&P> {
        self.payload.as_ref()
    }

    /// 取走载荷，之后的监听者看不到它
    pub fn take_payload(&mut self) -> Option<P> {
        self.payload.take()
    }

    /// 写入输出并结束本次触发
    pub fn terminate(&mut self, output: O) {
        self.output = Some(output);
    }

    pub fn is_terminated(&self) -> bool {
        self.output.is_some()
    }

    pub fn into_output(self) -> Option<O> {
        self.output
    }
}

/// 钩子回调
pub type Listener<P, O> = Arc<dyn Fn(&mut Trigger<P, O>) + Send + Sync>;

/// 钩子注册表
pub struct HookRegistry<P, O> {
    listeners: RwLock<HashMap<String, Vec<Listener<P, O>>>>,
}

impl<P, O> HookRegistry<P, O> {
    pub fn new() -> Self {
        Self {
            listeners: RwLock::new(HashMap::new()),
        }
    }

    /// 为一组钩子名登记同一个回调
    pub fn listen<S: AsRef<str>>(&self, names: &[S], listener: Listener<P, O>) {
        let mut listeners = self.listeners.write();
        for name in names {
            let name = name.as_ref();
            listeners
                .entry(name.to_string())
                .or_default()
                .push(Arc::clone(&listener));
            tracing::debug!(hook = %name, "Listener added");
        }
    }

    pub fn has_listeners(&self, name: &str) -> bool {
        self.listeners
            .read()
            .get(name)
            .map(|list| !list.is_empty())
            .unwrap_or(false)
    }

    pub fn listener_count(&self, name: &str) -> usize {
        self.listeners.read().get(name).map(Vec::len).unwrap_or(0)
    }

    /// 所有已登记的钩子名（排序后）
    pub fn hooks(&self) -> Vec<String> {
        let mut names: Vec<String> = self.listeners.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// 触发钩子
    ///
    /// 监听者按登记顺序执行，某个监听者 terminate 之后不再继续。
    /// 执行期间不持锁，监听者可以继续登记新的回调。
    pub fn fire(&self, name: &str, payload: Option<P>) -> Option<O> {
        // 克隆监听器列表，避免长时间持锁
        let listeners: Vec<Listener<P, O>> = match self.listeners.read().get(name) {
            Some(list) => list.iter().map(Arc::clone).collect(),
            None => {
                tracing::trace!(hook = %name, "Fired hook without listeners");
                return None;
            }
        };

        tracing::debug!(hook = %name, listeners = listeners.len(), "Firing hook");

        let mut trigger = Trigger::new(name, payload);
        for listener in listeners {
            listener(&mut trigger);
            if trigger.is_terminated() {
                tracing::trace!(hook = %name, "Hook terminated by listener");
                break;
            }
        }
        trigger.into_output()
    }
}

impl<P, O> Default for HookRegistry<P, O> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P, O> std::fmt::Debug for HookRegistry<P, O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookRegistry")
            .field("hooks", &self.hooks())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn test_fire_runs_listeners_in_order() {
        let registry: HookRegistry<u32, String> = HookRegistry::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        for tag in ["first", "second"] {
            let log = Arc::clone(&log);
            registry.listen(
                &["init"],
                Arc::new(move |trigger: &mut Trigger<u32, String>| {
                    log.lock()
                        .push(format!("{}:{}:{:?}", tag, trigger.name(), trigger.payload()));
                }),
            );
        }

        assert_eq!(registry.fire("init", Some(7)), None);
        assert_eq!(*log.lock(), vec!["first:init:Some(7)", "second:init:Some(7)"]);
    }

    #[test]
    fn test_terminate_stops_remaining_listeners() {
        let registry: HookRegistry<(), String> = HookRegistry::new();
        let ran = Arc::new(Mutex::new(0));

        registry.listen(&["save"], Arc::new(|trigger: &mut Trigger<(), String>| {
            trigger.terminate("saved".to_string());
        }));
        let counter = Arc::clone(&ran);
        registry.listen(&["save"], Arc::new(move |_: &mut Trigger<(), String>| {
            *counter.lock() += 1;
        }));

        assert_eq!(registry.fire("save", None).as_deref(), Some("saved"));
        assert_eq!(*ran.lock(), 0);
    }

    #[test]
    fn test_listen_on_many_names() {
        let registry: HookRegistry<(), ()> = HookRegistry::new();
        registry.listen(&["ajax_save", "ajax_nopriv_save"], Arc::new(|_: &mut Trigger<(), ()>| {}));

        assert!(registry.has_listeners("ajax_save"));
        assert!(registry.has_listeners("ajax_nopriv_save"));
        assert!(!registry.has_listeners("ajax_delete"));
        assert_eq!(registry.listener_count("ajax_save"), 1);
        assert_eq!(registry.hooks(), vec!["ajax_nopriv_save", "ajax_save"]);
    }

    #[test]
    fn test_listener_may_register_during_fire() {
        let registry: Arc<HookRegistry<(), ()>> = Arc::new(HookRegistry::new());
        let inner = Arc::clone(&registry);
        registry.listen(&["init"], Arc::new(move |_: &mut Trigger<(), ()>| {
            inner.listen(&["late"], Arc::new(|_: &mut Trigger<(), ()>| {}));
        }));

        registry.fire("init", None);
        assert!(registry.has_listeners("late"));
    }
}
