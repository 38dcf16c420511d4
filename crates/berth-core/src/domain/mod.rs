//! Domain model: identifiers, templates, filters, snapshots and lifecycle
//! events. No I/O and no locking in here.

pub mod errors;
pub mod events;
pub mod filter;
pub mod ids;
pub mod op;
pub mod snapshot;
pub mod template;

use std::collections::BTreeMap;

/// Service and configuration properties. BTreeMap keeps iteration (and
/// serialized output) deterministic.
pub type Properties = BTreeMap<String, serde_json::Value>;

pub use errors::BerthError;
pub use events::{LifecycleEvent, LifecycleState};
pub use filter::{Filter, FilterError};
pub use ids::{ConfigWatchId, ContainerId, GenerationId, ServiceId, WatcherId};
pub use op::{Op, OpKind, OpMode};
pub use snapshot::{
    ActivationSnapshot, ComponentSnapshot, ConfigurationSnapshot, ModuleSnapshot,
    ReferenceSnapshot,
};
pub use template::{
    ActivationTemplate, CollectionShape, ComponentKind, ComponentTemplate, ConfigCardinality,
    ConfigPolicy, ConfigRequirement, ExtensionRequirement, ModuleTemplate, PolicyOption,
    ReferencePolicy, ReferenceRequirement, ServiceScope,
};
