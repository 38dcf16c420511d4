use std::sync::Arc;

use tracing::{debug, info};

use crate::domain::events::LifecycleState;
use crate::domain::ids::GenerationId;
use crate::domain::op::OpKind;
use crate::domain::template::ModuleTemplate;
use crate::ports::service_registry::ServiceEvent;

use super::super::dependency::{ReferenceDependency, combined_filter};
use super::super::phase::{BoxedPhase, Phase, PhaseContext};
use super::super::sync::ReferenceSync;

/// Gates the chain on the module's required runtime extensions. With no
/// extensions declared this is a pass-through; otherwise the downstream
/// chain opens only once every extension service is present, and is torn
/// down again if one departs.
pub struct ExtensionPhase {
    module: String,
    template: Arc<ModuleTemplate>,
    deps: Vec<ReferenceDependency>,
    generation: Option<GenerationId>,
    opened: bool,
    downstream_open: bool,
    next: BoxedPhase,
}

impl ExtensionPhase {
    pub fn new(module: &str, template: Arc<ModuleTemplate>, next: BoxedPhase) -> Self {
        Self {
            module: module.to_string(),
            template,
            deps: Vec::new(),
            generation: None,
            opened: false,
            downstream_open: false,
            next,
        }
    }

    fn all_resolved(&self) -> bool {
        self.deps.iter().all(|d| d.is_resolved())
    }

    fn tear_down_downstream(&mut self, cx: &mut PhaseContext<'_>) {
        self.next.close(cx);
        cx.core.snapshot.clear_reference_state();
        cx.core.snapshot.clear_configuration_state();
        cx.core.touch();
        self.downstream_open = false;
        cx.emit(LifecycleState::WaitingForExtensions);
    }
}

impl Phase for ExtensionPhase {
    fn kind(&self) -> OpKind {
        OpKind::ExtensionLoading
    }

    fn module(&self) -> &str {
        &self.module
    }

    fn open(&mut self, cx: &mut PhaseContext<'_>) -> bool {
        if self.opened {
            return if self.downstream_open {
                self.next.open(cx)
            } else {
                false
            };
        }
        self.opened = true;
        self.deps.clear();

        for extension in &self.template.extensions {
            match ReferenceDependency::for_extension(extension) {
                Ok(dep) => self.deps.push(dep),
                Err(err) => cx.record_error(err),
            }
        }

        if self.deps.is_empty() {
            self.downstream_open = true;
            return self.next.open(cx);
        }

        debug!(module = %self.module, extensions = self.deps.len(), "waiting for runtime extensions");
        let generation = cx.fresh_generation();
        self.generation = Some(generation);
        // Emits before the install: the watcher replays existing services
        // while this effect batch is still draining, and may finish the
        // open on the spot.
        cx.emit(LifecycleState::WaitingForExtensions);
        if let Some(filter) = combined_filter(self.deps.iter()) {
            cx.install_watcher(
                OpKind::ExtensionLoading,
                generation,
                filter,
                ReferenceSync::new(cx.container.clone(), generation),
            );
        }
        false
    }

    fn close(&mut self, cx: &mut PhaseContext<'_>) -> bool {
        self.next.close(cx);
        cx.remove_watcher(OpKind::ExtensionLoading);
        self.deps.clear();
        self.generation = None;
        self.opened = false;
        self.downstream_open = false;
        true
    }

    fn next_mut(&mut self) -> Option<&mut BoxedPhase> {
        Some(&mut self.next)
    }

    fn on_service(
        &mut self,
        cx: &mut PhaseContext<'_>,
        generation: GenerationId,
        event: &ServiceEvent,
    ) -> bool {
        let mut handled = false;
        if self.generation == Some(generation) {
            match event {
                ServiceEvent::Arriving(handle) | ServiceEvent::Modified(handle) => {
                    for dep in &mut self.deps {
                        if dep.matches(handle) {
                            dep.resolve(handle);
                        } else {
                            dep.unresolve(handle.id);
                        }
                    }
                    if self.all_resolved() {
                        if !self.downstream_open {
                            info!(module = %self.module, "required extensions present");
                            self.downstream_open = true;
                            self.next.open(cx);
                        }
                    } else if self.downstream_open {
                        // A modification can take a bound extension out of
                        // the filter; that is a departure in effect.
                        info!(module = %self.module, "required extension no longer matches, tearing down");
                        self.tear_down_downstream(cx);
                    }
                    handled = true;
                }
                ServiceEvent::Departing(handle) => {
                    let mut changed = false;
                    for dep in &mut self.deps {
                        changed |= dep.unresolve(handle.id);
                    }
                    if changed && !self.all_resolved() && self.downstream_open {
                        info!(module = %self.module, "required extension departed, tearing down");
                        self.tear_down_downstream(cx);
                    }
                    handled = true;
                }
            }
        }
        self.next.on_service(cx, generation, event) || handled
    }
}
