//! berth-core — a phased dependency-resolution and activation engine.
//!
//! A [`engine::Container`] walks one module through a chain of lifecycle
//! phases (discovery, extension loading, bootstrap, configuration
//! binding, reference binding, publication), opening downstream phases as
//! their dependencies resolve and tearing them down again as dependencies
//! go away. All work is tagged with an [`domain::Op`] and routed through
//! the [`engine::Scheduler`]: teardown runs synchronously, setup is
//! deferred to the runtime.
//!
//! The engine only talks to the traits in [`ports`]; [`impls`] provides
//! in-memory implementations of all of them.

pub mod domain;
pub mod engine;
pub mod impls;
pub mod ports;

pub use domain::{
    BerthError, LifecycleEvent, LifecycleState, ModuleSnapshot, ModuleTemplate, Op, OpKind,
    OpMode, Properties,
};
pub use engine::{Completion, Container, Ports, Scheduler};
