use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::domain::Properties;
use crate::domain::filter::Filter;
use crate::domain::ids::{ServiceId, WatcherId};
use crate::domain::template::ServiceScope;

/// What a publisher hands to the registry.
#[derive(Debug, Clone)]
pub struct ServiceRegistration {
    pub types: Vec<String>,
    pub ranking: i32,
    pub scope: ServiceScope,
    pub properties: Properties,
}

/// A published service as seen by consumers. `properties` already carries
/// the registry-maintained keys (`objectClass`, `service.id`,
/// `service.ranking`), so filters evaluate against it directly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceHandle {
    pub id: ServiceId,
    pub ranking: i32,
    pub types: Vec<String>,
    pub properties: Properties,
}

impl ServiceHandle {
    pub fn matches(&self, filter: &Filter) -> bool {
        filter.matches(&self.properties)
    }
}

#[derive(Debug, Clone)]
pub enum ServiceEvent {
    Arriving(ServiceHandle),
    Modified(ServiceHandle),
    Departing(ServiceHandle),
}

impl ServiceEvent {
    pub fn handle(&self) -> &ServiceHandle {
        match self {
            ServiceEvent::Arriving(h) | ServiceEvent::Modified(h) | ServiceEvent::Departing(h) => {
                h
            }
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ServiceEvent::Arriving(_) => "arriving",
            ServiceEvent::Modified(_) => "modified",
            ServiceEvent::Departing(_) => "departing",
        }
    }
}

/// Callbacks run synchronously on the thread that mutated the registry.
pub trait ServiceWatcher: Send + Sync {
    fn on_event(&self, event: ServiceEvent);
}

pub trait ServiceRegistry: Send + Sync {
    fn register(&self, registration: ServiceRegistration) -> ServiceHandle;

    /// Idempotent; unknown ids are ignored.
    fn unregister(&self, id: ServiceId);

    /// Installing replays every already-matching service to the watcher as
    /// `Arriving` before returning.
    fn install_watcher(&self, filter: Filter, watcher: Arc<dyn ServiceWatcher>) -> WatcherId;

    /// Silent removal: no synthetic departure events are delivered.
    fn remove_watcher(&self, id: WatcherId);

    fn query(&self, filter: &Filter) -> Vec<ServiceHandle>;
}
