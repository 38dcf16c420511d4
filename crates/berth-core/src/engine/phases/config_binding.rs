use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{debug, info};

use crate::domain::Properties;
use crate::domain::events::LifecycleState;
use crate::domain::ids::GenerationId;
use crate::domain::op::OpKind;
use crate::domain::template::ModuleTemplate;

use super::super::dependency::ConfigurationDependency;
use super::super::phase::{BoxedPhase, Phase, PhaseContext, SideEffect};
use super::super::sync::ConfigurationListener;
use super::reference_binding::ReferenceBindingPhase;

/// Gates the rest of the chain on required configuration identifiers and
/// captures delivered properties for binding. The downstream chain is
/// never patched in place: on any resolution change it is closed and a
/// fresh one is built, so stale bindings cannot leak across attempts.
pub struct ConfigBindingPhase {
    module: String,
    template: Arc<ModuleTemplate>,
    deps: Vec<ConfigurationDependency>,
    generation: Option<GenerationId>,
    resolved: bool,
    opened: bool,
    next: Option<BoxedPhase>,
}

impl ConfigBindingPhase {
    pub fn new(module: &str, template: Arc<ModuleTemplate>) -> Self {
        Self {
            module: module.to_string(),
            template,
            deps: Vec::new(),
            generation: None,
            resolved: false,
            opened: false,
            next: None,
        }
    }

    fn all_resolved(&self) -> bool {
        self.deps.iter().all(|d| d.is_resolved())
    }

    fn open_fresh_downstream(&mut self, cx: &mut PhaseContext<'_>) {
        let mut next: BoxedPhase = Box::new(ReferenceBindingPhase::new(
            &self.module,
            Arc::clone(&self.template),
        ));
        next.open(cx);
        self.next = Some(next);
    }

    fn close_downstream(&mut self, cx: &mut PhaseContext<'_>) {
        if let Some(mut next) = self.next.take() {
            next.close(cx);
            cx.core.snapshot.clear_reference_state();
            cx.core.touch();
        }
    }

    fn store_properties(cx: &mut PhaseContext<'_>, pid: &str, properties: Option<&Properties>) {
        for component in &mut cx.core.snapshot.components {
            for configuration in &mut component.configurations {
                if configuration.pid == pid {
                    configuration.properties = properties.cloned();
                }
            }
        }
        cx.core.touch();
    }
}

impl Phase for ConfigBindingPhase {
    fn kind(&self) -> OpKind {
        OpKind::ConfigurationBinding
    }

    fn module(&self) -> &str {
        &self.module
    }

    fn open(&mut self, cx: &mut PhaseContext<'_>) -> bool {
        if self.opened {
            return match &mut self.next {
                Some(next) => next.open(cx),
                None => false,
            };
        }
        self.opened = true;
        self.deps.clear();

        let mut pids = BTreeSet::new();
        for component in &self.template.components {
            let enabled = cx
                .core
                .snapshot
                .component(&component.name)
                .map(|c| c.enabled)
                .unwrap_or(false);
            if !enabled {
                continue;
            }
            for configuration in &component.configurations {
                pids.insert(configuration.pid.clone());
                self.deps.push(ConfigurationDependency::new(
                    &component.name,
                    vec![configuration.pid.clone()],
                    configuration.is_required(),
                ));
            }
        }

        let generation = cx.fresh_generation();
        self.generation = Some(generation);
        cx.core.config_generation = Some(generation);
        self.resolved = self.all_resolved();
        if !self.resolved {
            // Emitted ahead of the watches: each watch replays the current
            // value while this effect batch drains, which may resolve the
            // phase (and publish) on the spot.
            debug!(module = %self.module, "waiting for required configurations");
            cx.emit(LifecycleState::WaitingForConfigurations);
        }
        // One watch per identifier, shared across components.
        for pid in pids {
            cx.effects.push(SideEffect::WatchConfig {
                pid,
                generation,
                listener: ConfigurationListener::new(cx.container.clone(), generation),
            });
        }

        if self.resolved {
            self.open_fresh_downstream(cx);
            true
        } else {
            false
        }
    }

    fn close(&mut self, cx: &mut PhaseContext<'_>) -> bool {
        if let Some(mut next) = self.next.take() {
            next.close(cx);
        }
        cx.core.config_generation = None;
        for id in cx.core.config_watches.drain(..) {
            cx.effects.push(SideEffect::UnwatchConfig(id));
        }
        cx.core.snapshot.clear_configuration_state();
        cx.core.touch();
        self.deps.clear();
        self.generation = None;
        self.resolved = false;
        self.opened = false;
        true
    }

    fn next_mut(&mut self) -> Option<&mut BoxedPhase> {
        self.next.as_mut()
    }

    fn on_configuration(
        &mut self,
        cx: &mut PhaseContext<'_>,
        generation: GenerationId,
        pid: &str,
        properties: Option<&Properties>,
    ) -> bool {
        if self.generation != Some(generation) {
            return match &mut self.next {
                Some(next) => next.on_configuration(cx, generation, pid, properties),
                None => false,
            };
        }

        let present = properties.map(|p| !p.is_empty()).unwrap_or(false);
        if present {
            let mut tracked = false;
            for dep in &mut self.deps {
                tracked |= dep.offer(pid);
            }
            Self::store_properties(cx, pid, properties);
            if tracked && !self.resolved && self.all_resolved() {
                info!(module = %self.module, "required configurations present");
                self.resolved = true;
                if self.next.is_some() {
                    // Stale downstream from an earlier attempt: rebuild.
                    self.close_downstream(cx);
                    cx.emit(LifecycleState::WaitingForConfigurations);
                }
                self.open_fresh_downstream(cx);
            }
        } else {
            let mut retracted = false;
            for dep in &mut self.deps {
                retracted |= dep.retract(pid);
            }
            if retracted {
                Self::store_properties(cx, pid, None);
                if self.next.is_some() {
                    info!(module = %self.module, pid, "configuration removed, rebuilding downstream");
                    self.close_downstream(cx);
                    cx.emit(LifecycleState::WaitingForConfigurations);
                    if self.all_resolved() {
                        self.open_fresh_downstream(cx);
                    } else {
                        self.resolved = false;
                    }
                } else if !self.all_resolved() {
                    self.resolved = false;
                }
            }
        }
        true
    }
}
