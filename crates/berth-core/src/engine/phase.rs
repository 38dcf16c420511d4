use std::collections::HashMap;
use std::sync::{Arc, Weak};

use crate::domain::Properties;
use crate::domain::errors::BerthError;
use crate::domain::events::LifecycleState;
use crate::domain::ids::{ConfigWatchId, GenerationId, ServiceId, WatcherId};
use crate::domain::op::{Op, OpKind, OpMode};
use crate::domain::snapshot::ModuleSnapshot;
use crate::domain::template::ModuleTemplate;
use crate::ports::component_model::ModelHandle;
use crate::ports::config_store::ConfigListener;
use crate::ports::service_registry::{ServiceEvent, ServiceRegistration, ServiceWatcher};

use super::container::{Container, Ports};

/// External actions a phase decided on while the container lock was held.
/// They are executed by the container after the lock is released, in
/// order, so port callbacks can re-enter the container without
/// deadlocking.
pub enum SideEffect {
    RegisterService {
        component: String,
        activation: usize,
        generation: GenerationId,
        registration: ServiceRegistration,
    },
    UnregisterService(ServiceId),
    InstallWatcher {
        owner: OpKind,
        generation: GenerationId,
        filter: crate::domain::filter::Filter,
        watcher: Arc<dyn ServiceWatcher>,
    },
    RemoveWatcher(WatcherId),
    WatchConfig {
        pid: String,
        generation: GenerationId,
        listener: Arc<dyn ConfigListener>,
    },
    UnwatchConfig(ConfigWatchId),
    Emit {
        state: LifecycleState,
        payload: Option<serde_json::Value>,
        cause: Option<String>,
    },
}

/// A phase's claim on a service watcher. The slot is reserved under the
/// lock when the install is decided; the registry id arrives later, once
/// the effect executor has run, and only if the slot still carries the
/// generation the watcher was minted for.
pub struct WatcherSlot {
    pub generation: GenerationId,
    pub id: Option<WatcherId>,
}

/// Lock-guarded mutable state of one container.
pub struct CoreState {
    pub snapshot: ModuleSnapshot,
    pub change_count: u64,
    pub errors: Vec<BerthError>,
    pub closing: bool,
    pub last_state: LifecycleState,
    pub model: Option<ModelHandle>,
    /// Installed service watcher per owning phase.
    pub service_watchers: HashMap<OpKind, WatcherSlot>,
    /// Generation of the currently open configuration-binding phase.
    pub config_generation: Option<GenerationId>,
    pub config_watches: Vec<ConfigWatchId>,
    /// Set while a publication is live; registrations arriving with any
    /// other generation are retracted on sight.
    pub publication_generation: Option<GenerationId>,
}

impl CoreState {
    pub fn new(snapshot: ModuleSnapshot) -> Self {
        Self {
            snapshot,
            change_count: 0,
            errors: Vec::new(),
            closing: false,
            last_state: LifecycleState::Creating,
            model: None,
            service_watchers: HashMap::new(),
            config_generation: None,
            config_watches: Vec::new(),
            publication_generation: None,
        }
    }

    pub fn touch(&mut self) {
        self.change_count += 1;
    }
}

/// Everything a phase sees while it runs under the container lock.
pub struct PhaseContext<'a> {
    pub module: &'a str,
    pub template: &'a Arc<ModuleTemplate>,
    pub core: &'a mut CoreState,
    pub ports: &'a Ports,
    pub container: &'a Weak<Container>,
    pub effects: &'a mut Vec<SideEffect>,
}

impl PhaseContext<'_> {
    pub fn emit(&mut self, state: LifecycleState) {
        self.effects.push(SideEffect::Emit {
            state,
            payload: None,
            cause: None,
        });
    }

    pub fn emit_failed(&mut self, cause: impl Into<String>) {
        self.effects.push(SideEffect::Emit {
            state: LifecycleState::Failed,
            payload: None,
            cause: Some(cause.into()),
        });
    }

    pub fn record_error(&mut self, error: BerthError) {
        tracing::warn!(module = %self.module, error = %error, "recording container error");
        self.core.errors.push(error);
        self.core.touch();
    }

    pub fn fresh_generation(&self) -> GenerationId {
        self.ports.ids.generation_id()
    }

    /// Reserves the watcher slot for `kind` and queues the install. The
    /// executor records the registry id into the slot only while it still
    /// carries this generation.
    pub fn install_watcher(
        &mut self,
        kind: OpKind,
        generation: GenerationId,
        filter: crate::domain::filter::Filter,
        watcher: Arc<dyn ServiceWatcher>,
    ) {
        self.core.service_watchers.insert(
            kind,
            WatcherSlot {
                generation,
                id: None,
            },
        );
        self.effects.push(SideEffect::InstallWatcher {
            owner: kind,
            generation,
            filter,
            watcher,
        });
    }

    /// Releases the watcher slot for `kind`. An install still in flight
    /// finds the slot gone and retracts itself.
    pub fn remove_watcher(&mut self, kind: OpKind) {
        if let Some(slot) = self.core.service_watchers.remove(&kind) {
            if let Some(id) = slot.id {
                self.effects.push(SideEffect::RemoveWatcher(id));
            }
        }
    }
}

/// One link in a container's phase chain. `open` and `close` run with the
/// container lock held and express external actions as side effects.
///
/// `open` returns true when the phase (and everything downstream of it)
/// finished opening, false when it parked itself waiting for dependencies.
/// `close` is idempotent.
pub trait Phase: Send {
    fn kind(&self) -> OpKind;

    fn module(&self) -> &str;

    fn open(&mut self, cx: &mut PhaseContext<'_>) -> bool;

    fn close(&mut self, cx: &mut PhaseContext<'_>) -> bool;

    fn next_mut(&mut self) -> Option<&mut BoxedPhase>;

    fn open_op(&self) -> Op {
        Op::of(OpMode::Open, self.kind(), self.module())
    }

    fn close_op(&self) -> Op {
        Op::of(OpMode::Close, self.kind(), self.module())
    }

    /// Configuration delivery/removal. The default forwards down the
    /// chain; phases that own configuration watchers override and still
    /// forward. Returns true if any phase acted on the callback.
    fn on_configuration(
        &mut self,
        cx: &mut PhaseContext<'_>,
        generation: GenerationId,
        pid: &str,
        properties: Option<&Properties>,
    ) -> bool {
        match self.next_mut() {
            Some(next) => next.on_configuration(cx, generation, pid, properties),
            None => false,
        }
    }

    /// Service arrival/modification/departure, same contract as
    /// `on_configuration`.
    fn on_service(
        &mut self,
        cx: &mut PhaseContext<'_>,
        generation: GenerationId,
        event: &ServiceEvent,
    ) -> bool {
        match self.next_mut() {
            Some(next) => next.on_service(cx, generation, event),
            None => false,
        }
    }
}

pub type BoxedPhase = Box<dyn Phase>;
