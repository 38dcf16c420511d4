//! In-memory implementations of the ports, used by the demo driver and
//! the test suite.

pub mod event_sink;
pub mod inmem_config;
pub mod inmem_registry;
pub mod model;

pub use event_sink::{RecordingEventSink, TracingEventSink};
pub use inmem_config::InMemoryConfigStore;
pub use inmem_registry::InMemoryServiceRegistry;
pub use model::SimpleComponentModel;
