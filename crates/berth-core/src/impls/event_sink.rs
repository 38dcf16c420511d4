use std::sync::{Arc, Mutex};

use tracing::info;

use crate::domain::events::{LifecycleEvent, LifecycleState};
use crate::ports::event_sink::LifecycleEventSink;

/// Keeps every emitted event, in order.
pub struct RecordingEventSink {
    events: Mutex<Vec<LifecycleEvent>>,
}

impl RecordingEventSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            events: Mutex::new(Vec::new()),
        })
    }

    pub fn events(&self) -> Vec<LifecycleEvent> {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn states(&self) -> Vec<LifecycleState> {
        self.events().iter().map(|e| e.state).collect()
    }
}

impl LifecycleEventSink for RecordingEventSink {
    fn on_event(&self, event: LifecycleEvent) {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(event);
    }
}

/// Forwards events to the tracing subscriber.
pub struct TracingEventSink;

impl LifecycleEventSink for TracingEventSink {
    fn on_event(&self, event: LifecycleEvent) {
        match &event.cause {
            Some(cause) => {
                info!(module = %event.module, state = ?event.state, cause = %cause, "lifecycle event");
            }
            None => {
                info!(module = %event.module, state = ?event.state, "lifecycle event");
            }
        }
    }
}
