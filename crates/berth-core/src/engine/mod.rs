//! The lifecycle engine: scheduler, phase chain and the container that
//! ties them together.

pub mod completion;
pub mod container;
pub mod dependency;
pub mod phase;
pub mod phases;
pub mod scheduler;
pub mod sync;

pub use completion::Completion;
pub use container::{Container, Ports};
pub use dependency::{
    ConfigurationDependency, ReferenceDependency, ResolvedReference, combined_filter,
};
pub use phase::{BoxedPhase, CoreState, Phase, PhaseContext, SideEffect};
pub use scheduler::Scheduler;
pub use sync::{ConfigurationListener, ReferenceSync};
