use crate::domain::events::LifecycleEvent;

/// Receives every lifecycle event the container emits, in order. Called
/// outside the container lock.
pub trait LifecycleEventSink: Send + Sync {
    fn on_event(&self, event: LifecycleEvent);
}
