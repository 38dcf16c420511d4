use ulid::Ulid;

use crate::domain::ids::{ContainerId, GenerationId};

use super::clock::Clock;

pub trait IdGenerator: Send + Sync {
    fn container_id(&self) -> ContainerId;
    fn generation_id(&self) -> GenerationId;
}

/// ULID generator seeded from a clock, so identifiers sort by creation
/// time.
pub struct UlidGenerator<C> {
    clock: C,
}

impl<C: Clock> UlidGenerator<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }

    fn next(&self) -> Ulid {
        let timestamp = self.clock.now().timestamp_millis().max(0) as u64;
        Ulid::from_parts(timestamp, rand::random())
    }
}

impl<C: Clock> IdGenerator for UlidGenerator<C> {
    fn container_id(&self) -> ContainerId {
        ContainerId::from_ulid(self.next())
    }

    fn generation_id(&self) -> GenerationId {
        GenerationId::from_ulid(self.next())
    }
}
