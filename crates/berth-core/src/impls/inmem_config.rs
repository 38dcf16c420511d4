use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::domain::Properties;
use crate::domain::ids::ConfigWatchId;
use crate::ports::config_store::{ConfigListener, ConfigStore};

/// In-memory configuration store. Listener callbacks run synchronously on
/// the mutating thread, outside the internal lock.
pub struct InMemoryConfigStore {
    state: Mutex<StoreState>,
}

struct StoreState {
    next_watch: u64,
    values: BTreeMap<String, Properties>,
    watches: HashMap<ConfigWatchId, WatchEntry>,
}

struct WatchEntry {
    pid: String,
    listener: Arc<dyn ConfigListener>,
}

impl InMemoryConfigStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(StoreState {
                next_watch: 0,
                values: BTreeMap::new(),
                watches: HashMap::new(),
            }),
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn watch_count(&self) -> usize {
        self.lock().watches.len()
    }

    /// Creates or replaces a configuration and notifies its watchers.
    pub fn put(&self, pid: &str, properties: Properties) {
        let targets = {
            let mut state = self.lock();
            state.values.insert(pid.to_string(), properties.clone());
            listeners_for(&state, pid)
        };
        debug!(pid, "configuration updated");
        for listener in targets {
            listener.updated(pid, Some(&properties));
        }
    }

    /// Deletes a configuration and notifies its watchers. Idempotent.
    pub fn remove(&self, pid: &str) {
        let targets = {
            let mut state = self.lock();
            if state.values.remove(pid).is_none() {
                return;
            }
            listeners_for(&state, pid)
        };
        debug!(pid, "configuration removed");
        for listener in targets {
            listener.updated(pid, None);
        }
    }
}

fn listeners_for(state: &StoreState, pid: &str) -> Vec<Arc<dyn ConfigListener>> {
    state
        .watches
        .values()
        .filter(|entry| entry.pid == pid)
        .map(|entry| Arc::clone(&entry.listener))
        .collect()
}

impl ConfigStore for InMemoryConfigStore {
    fn watch(&self, pid: &str, listener: Arc<dyn ConfigListener>) -> ConfigWatchId {
        let (id, current) = {
            let mut state = self.lock();
            state.next_watch += 1;
            let id = ConfigWatchId(state.next_watch);
            let current = state.values.get(pid).cloned();
            state.watches.insert(
                id,
                WatchEntry {
                    pid: pid.to_string(),
                    listener: Arc::clone(&listener),
                },
            );
            (id, current)
        };
        if let Some(properties) = current {
            listener.updated(pid, Some(&properties));
        }
        id
    }

    fn unwatch(&self, id: ConfigWatchId) {
        self.lock().watches.remove(&id);
    }

    fn current(&self, pid: &str) -> Option<Properties> {
        self.lock().values.get(pid).cloned()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::json;

    use super::*;

    struct Recorder {
        updates: AtomicUsize,
        removals: AtomicUsize,
    }

    impl Recorder {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                updates: AtomicUsize::new(0),
                removals: AtomicUsize::new(0),
            })
        }
    }

    impl ConfigListener for Recorder {
        fn updated(&self, _pid: &str, properties: Option<&Properties>) {
            match properties {
                Some(_) => self.updates.fetch_add(1, Ordering::SeqCst),
                None => self.removals.fetch_add(1, Ordering::SeqCst),
            };
        }
    }

    fn props() -> Properties {
        [("k".to_string(), json!("v"))].into_iter().collect()
    }

    #[test]
    fn watch_replays_current_value() {
        let store = InMemoryConfigStore::new();
        store.put("a.pid", props());
        let recorder = Recorder::new();
        store.watch("a.pid", recorder.clone());
        assert_eq!(recorder.updates.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn put_and_remove_notify_watchers_of_that_pid_only() {
        let store = InMemoryConfigStore::new();
        let recorder = Recorder::new();
        store.watch("a.pid", recorder.clone());

        store.put("a.pid", props());
        store.put("b.pid", props());
        store.remove("a.pid");
        store.remove("a.pid");

        assert_eq!(recorder.updates.load(Ordering::SeqCst), 1);
        assert_eq!(recorder.removals.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unwatch_is_silent() {
        let store = InMemoryConfigStore::new();
        let recorder = Recorder::new();
        let id = store.watch("a.pid", recorder.clone());
        store.unwatch(id);
        store.put("a.pid", props());
        assert_eq!(recorder.updates.load(Ordering::SeqCst), 0);
        assert_eq!(store.current("a.pid"), Some(props()));
    }
}
