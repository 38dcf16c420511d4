use std::sync::Arc;

use crate::domain::Properties;
use crate::domain::ids::ConfigWatchId;

/// Configuration callbacks. `None` or an empty map means the identifier is
/// absent; non-empty means present.
pub trait ConfigListener: Send + Sync {
    fn updated(&self, pid: &str, properties: Option<&Properties>);
}

pub trait ConfigStore: Send + Sync {
    /// Installing replays the identifier's current value (if any) to the
    /// listener before returning.
    fn watch(&self, pid: &str, listener: Arc<dyn ConfigListener>) -> ConfigWatchId;

    /// Silent removal; unknown ids are ignored.
    fn unwatch(&self, id: ConfigWatchId);

    fn current(&self, pid: &str) -> Option<Properties>;
}
