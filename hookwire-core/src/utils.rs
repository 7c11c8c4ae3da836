//! Utility types used by the container.

/// Dependency resolution utilities
pub mod dependency {
    use std::collections::HashMap;
    use std::thread::{self, ThreadId};

    use parking_lot::Mutex;

    /// Tracks keys currently being constructed to detect circular resolution.
    ///
    /// Each thread keeps its own creation chain, in resolution order, so a
    /// detected cycle can be reported as `a -> b -> a`. Two threads building
    /// the same key at once never see each other's chain.
    #[derive(Debug, Default)]
    pub struct CreationTracker {
        creating: Mutex<HashMap<ThreadId, Vec<String>>>,
    }

    impl CreationTracker {
        /// Creates a new empty creation tracker.
        pub fn new() -> Self {
            Self {
                creating: Mutex::new(HashMap::new()),
            }
        }

        /// Checks if a key is currently being constructed on this thread.
        pub fn is_creating(&self, key: &str) -> bool {
            self.creating
                .lock()
                .get(&thread::current().id())
                .is_some_and(|chain| chain.iter().any(|k| k == key))
        }

        /// Marks a key as being constructed on this thread.
        ///
        /// Returns `false` if the key was already on the chain (circular dependency).
        pub fn start_creating(&self, key: &str) -> bool {
            let mut creating = self.creating.lock();
            let chain = creating.entry(thread::current().id()).or_default();
            if chain.iter().any(|k| k == key) {
                return false;
            }
            chain.push(key.to_string());
            true
        }

        /// Removes a key from this thread's chain.
        pub fn finish_creating(&self, key: &str) {
            let mut creating = self.creating.lock();
            let id = thread::current().id();
            if let Some(chain) = creating.get_mut(&id) {
                if let Some(pos) = chain.iter().rposition(|k| k == key) {
                    chain.remove(pos);
                }
                if chain.is_empty() {
                    creating.remove(&id);
                }
            }
        }

        /// Returns this thread's creation chain, outermost first.
        pub fn current_chain(&self) -> Vec<String> {
            self.creating
                .lock()
                .get(&thread::current().id())
                .cloned()
                .unwrap_or_default()
        }
    }

    /// Clears the tracker entry when construction ends, including on early return.
    pub struct CreationGuard<'a> {
        tracker: &'a CreationTracker,
        key: String,
    }

    impl<'a> CreationGuard<'a> {
        pub fn new(tracker: &'a CreationTracker, key: &str) -> Self {
            Self {
                tracker,
                key: key.to_string(),
            }
        }
    }

    impl Drop for CreationGuard<'_> {
        fn drop(&mut self) {
            self.tracker.finish_creating(&self.key);
        }
    }
}
