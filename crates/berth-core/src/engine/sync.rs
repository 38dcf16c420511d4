use std::sync::{Arc, Weak};

use crate::domain::Properties;
use crate::domain::ids::GenerationId;
use crate::ports::config_store::ConfigListener;
use crate::ports::service_registry::{ServiceEvent, ServiceWatcher};

use super::container::Container;

/// Bridges registry callbacks back into the container. Holds the
/// container weakly so an installed watcher never keeps a torn-down
/// container alive, and carries the generation it was minted for.
pub struct ReferenceSync {
    container: Weak<Container>,
    generation: GenerationId,
}

impl ReferenceSync {
    pub fn new(container: Weak<Container>, generation: GenerationId) -> Arc<Self> {
        Arc::new(Self {
            container,
            generation,
        })
    }
}

impl ServiceWatcher for ReferenceSync {
    fn on_event(&self, event: ServiceEvent) {
        if let Some(container) = self.container.upgrade() {
            container.handle_service_event(self.generation, event);
        }
    }
}

/// Configuration counterpart of [`ReferenceSync`].
pub struct ConfigurationListener {
    container: Weak<Container>,
    generation: GenerationId,
}

impl ConfigurationListener {
    pub fn new(container: Weak<Container>, generation: GenerationId) -> Arc<Self> {
        Arc::new(Self {
            container,
            generation,
        })
    }
}

impl ConfigListener for ConfigurationListener {
    fn updated(&self, pid: &str, properties: Option<&Properties>) {
        if let Some(container) = self.container.upgrade() {
            container.handle_configuration(self.generation, pid, properties);
        }
    }
}
