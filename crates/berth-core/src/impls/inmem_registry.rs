use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use serde_json::json;
use tracing::debug;

use crate::domain::Properties;
use crate::domain::filter::Filter;
use crate::domain::ids::{ServiceId, WatcherId};
use crate::ports::service_registry::{
    ServiceEvent, ServiceHandle, ServiceRegistration, ServiceRegistry, ServiceWatcher,
};

/// In-memory service registry. Watcher callbacks run synchronously on the
/// mutating thread, after the internal lock is released, so callbacks may
/// re-enter the registry.
pub struct InMemoryServiceRegistry {
    state: Mutex<RegistryState>,
}

struct RegistryState {
    next_service: u64,
    next_watcher: u64,
    services: BTreeMap<ServiceId, ServiceHandle>,
    watchers: HashMap<WatcherId, WatcherEntry>,
}

struct WatcherEntry {
    filter: Filter,
    watcher: Arc<dyn ServiceWatcher>,
}

impl InMemoryServiceRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(RegistryState {
                next_service: 0,
                next_watcher: 0,
                services: BTreeMap::new(),
                watchers: HashMap::new(),
            }),
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn service_count(&self) -> usize {
        self.lock().services.len()
    }

    pub fn watcher_count(&self) -> usize {
        self.lock().watchers.len()
    }

    /// Replaces a service's caller-supplied properties and notifies
    /// watchers of the modification.
    pub fn update(&self, id: ServiceId, properties: Properties) {
        let (handle, targets) = {
            let mut state = self.lock();
            let Some(existing) = state.services.get(&id).cloned() else {
                return;
            };
            let mut merged = properties;
            decorate(&mut merged, &existing.types, id, existing.ranking);
            if let Some(scope) = existing.properties.get("service.scope") {
                merged.insert("service.scope".into(), scope.clone());
            }
            let updated = ServiceHandle {
                properties: merged,
                ..existing.clone()
            };
            state.services.insert(id, updated.clone());
            let targets = matching_watchers(&state, |filter| {
                existing.matches(filter) || updated.matches(filter)
            });
            (updated, targets)
        };
        for watcher in targets {
            watcher.on_event(ServiceEvent::Modified(handle.clone()));
        }
    }
}

fn decorate(properties: &mut Properties, types: &[String], id: ServiceId, ranking: i32) {
    properties.insert("objectClass".into(), json!(types));
    properties.insert("service.id".into(), json!(id.0));
    properties.insert("service.ranking".into(), json!(ranking));
}

fn decorate_scope(properties: &mut Properties, scope: crate::domain::template::ServiceScope) {
    if let Ok(value) = serde_json::to_value(scope) {
        properties.insert("service.scope".into(), value);
    }
}

fn matching_watchers(
    state: &RegistryState,
    mut accepts: impl FnMut(&Filter) -> bool,
) -> Vec<Arc<dyn ServiceWatcher>> {
    state
        .watchers
        .values()
        .filter(|entry| accepts(&entry.filter))
        .map(|entry| Arc::clone(&entry.watcher))
        .collect()
}

impl ServiceRegistry for InMemoryServiceRegistry {
    fn register(&self, registration: ServiceRegistration) -> ServiceHandle {
        let (handle, targets) = {
            let mut state = self.lock();
            state.next_service += 1;
            let id = ServiceId(state.next_service);
            let mut properties = registration.properties;
            decorate(&mut properties, &registration.types, id, registration.ranking);
            decorate_scope(&mut properties, registration.scope);
            let handle = ServiceHandle {
                id,
                ranking: registration.ranking,
                types: registration.types,
                properties,
            };
            state.services.insert(id, handle.clone());
            let targets = matching_watchers(&state, |filter| handle.matches(filter));
            (handle, targets)
        };
        debug!(service = %handle.id, types = ?handle.types, "service registered");
        // Notify outside the lock so callbacks can re-enter.
        for watcher in targets {
            watcher.on_event(ServiceEvent::Arriving(handle.clone()));
        }
        handle
    }

    fn unregister(&self, id: ServiceId) {
        let departed = {
            let mut state = self.lock();
            let Some(handle) = state.services.remove(&id) else {
                return;
            };
            let targets = matching_watchers(&state, |filter| handle.matches(filter));
            Some((handle, targets))
        };
        if let Some((handle, targets)) = departed {
            debug!(service = %handle.id, "service unregistered");
            for watcher in targets {
                watcher.on_event(ServiceEvent::Departing(handle.clone()));
            }
        }
    }

    fn install_watcher(&self, filter: Filter, watcher: Arc<dyn ServiceWatcher>) -> WatcherId {
        let (id, replay) = {
            let mut state = self.lock();
            state.next_watcher += 1;
            let id = WatcherId(state.next_watcher);
            let replay: Vec<ServiceHandle> = state
                .services
                .values()
                .filter(|handle| handle.matches(&filter))
                .cloned()
                .collect();
            state.watchers.insert(
                id,
                WatcherEntry {
                    filter,
                    watcher: Arc::clone(&watcher),
                },
            );
            (id, replay)
        };
        for handle in replay {
            watcher.on_event(ServiceEvent::Arriving(handle));
        }
        id
    }

    fn remove_watcher(&self, id: WatcherId) {
        self.lock().watchers.remove(&id);
    }

    fn query(&self, filter: &Filter) -> Vec<ServiceHandle> {
        self.lock()
            .services
            .values()
            .filter(|handle| handle.matches(filter))
            .cloned()
            .collect()
    }
}
