use crate::domain::Properties;
use crate::domain::errors::BerthError;
use crate::domain::template::{CollectionShape, ModuleTemplate};

use super::service_registry::ServiceHandle;

/// Opaque handle to one deployed module inside the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModelHandle(pub u64);

/// One value delivered to a component at bind time.
#[derive(Debug, Clone)]
pub enum Binding {
    Configuration {
        component: String,
        pid: String,
        properties: Properties,
    },
    Reference {
        component: String,
        reference: String,
        shape: CollectionShape,
        /// Best match first.
        matches: Vec<ServiceHandle>,
    },
}

/// The component framework behind the engine (bean manager, DI container,
/// ...). Implementations are called with the container lock held: they
/// must not block and must not call back into the container, the service
/// registry or the configuration store.
pub trait ComponentModel: Send + Sync {
    fn deploy(&self, template: &ModuleTemplate) -> Result<ModelHandle, BerthError>;

    /// Rebinding the same (component, pid) or (component, reference) pair
    /// replaces the previous binding.
    fn bind(&self, handle: ModelHandle, binding: Binding) -> Result<(), BerthError>;

    /// Final consistency check before services are published.
    fn validate(&self, handle: ModelHandle) -> Result<(), BerthError>;

    /// Idempotent; unknown handles are ignored.
    fn discard(&self, handle: ModelHandle);
}
