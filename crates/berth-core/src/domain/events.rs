use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Externally observable lifecycle states, in rough forward order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Creating,
    WaitingForExtensions,
    WaitingForConfigurations,
    WaitingForServices,
    Satisfied,
    Created,
    Failed,
    Destroying,
    Destroyed,
}

impl LifecycleState {
    /// Waiting states are suppressed once teardown has begun, so a closing
    /// container never appears to regress into waiting.
    pub fn is_waiting(self) -> bool {
        matches!(
            self,
            LifecycleState::WaitingForExtensions
                | LifecycleState::WaitingForConfigurations
                | LifecycleState::WaitingForServices
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleEvent {
    pub module: String,
    pub state: LifecycleState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cause: Option<String>,
    pub at: DateTime<Utc>,
}
