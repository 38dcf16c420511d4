//! Seams between the engine and its environment. The engine only ever
//! talks to these traits; `impls` provides in-memory implementations.

pub mod clock;
pub mod component_model;
pub mod config_store;
pub mod event_sink;
pub mod id_generator;
pub mod metadata;
pub mod service_registry;

pub use clock::{Clock, FixedClock, SystemClock};
pub use component_model::{Binding, ComponentModel, ModelHandle};
pub use config_store::{ConfigListener, ConfigStore};
pub use event_sink::LifecycleEventSink;
pub use id_generator::{IdGenerator, UlidGenerator};
pub use metadata::{FixedTemplate, JsonMetadata, MetadataProvider};
pub use service_registry::{
    ServiceEvent, ServiceHandle, ServiceRegistration, ServiceRegistry, ServiceWatcher,
};
