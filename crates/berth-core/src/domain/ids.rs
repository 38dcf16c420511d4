use std::fmt;
use std::marker::PhantomData;

use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// 型ごとに ID を分けるためのマーカー。
pub trait IdMarker: Clone + Copy + PartialEq + Eq + PartialOrd + Ord + std::hash::Hash {
    fn prefix() -> &'static str;
}

/// Typed identifier backed by a ULID. `Id<ContainerMarker>` and
/// `Id<GenerationMarker>` are distinct types and cannot be mixed up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Id<T: IdMarker> {
    value: Ulid,
    #[serde(skip)]
    _marker: PhantomData<T>,
}

impl<T: IdMarker> Id<T> {
    pub fn from_ulid(value: Ulid) -> Self {
        Self {
            value,
            _marker: PhantomData,
        }
    }

    pub fn value(&self) -> Ulid {
        self.value
    }
}

impl<T: IdMarker> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", T::prefix(), self.value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ContainerMarker {}

impl IdMarker for ContainerMarker {
    fn prefix() -> &'static str {
        "container"
    }
}

/// A watch generation. Every (re)installation of a watcher mints a fresh
/// one; callbacks carrying a stale generation are dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum GenerationMarker {}

impl IdMarker for GenerationMarker {
    fn prefix() -> &'static str {
        "gen"
    }
}

pub type ContainerId = Id<ContainerMarker>;
pub type GenerationId = Id<GenerationMarker>;

/// Registry-assigned service identity. Monotonic within a registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ServiceId(pub u64);

impl fmt::Display for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "service-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WatcherId(pub u64);

impl fmt::Display for WatcherId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "watcher-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConfigWatchId(pub u64);

impl fmt::Display for ConfigWatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cfgwatch-{}", self.0)
    }
}
