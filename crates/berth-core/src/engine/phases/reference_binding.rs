use std::sync::Arc;

use tracing::{debug, info};

use crate::domain::events::LifecycleState;
use crate::domain::ids::GenerationId;
use crate::domain::op::OpKind;
use crate::domain::template::ModuleTemplate;
use crate::ports::service_registry::ServiceEvent;

use super::super::dependency::{ReferenceDependency, ResolvedReference, combined_filter};
use super::super::phase::{BoxedPhase, Phase, PhaseContext};
use super::super::sync::ReferenceSync;
use super::publication::PublicationPhase;

/// Tracks service reference dependencies and owns the publication phase.
/// Publication exists exactly while every required reference is resolved;
/// any change to the candidate set closes it (and reopens it if the
/// module is still satisfied) rather than patching bindings in place.
pub struct ReferenceBindingPhase {
    module: String,
    template: Arc<ModuleTemplate>,
    deps: Vec<ReferenceDependency>,
    generation: Option<GenerationId>,
    opened: bool,
    next: Option<BoxedPhase>,
}

impl ReferenceBindingPhase {
    pub fn new(module: &str, template: Arc<ModuleTemplate>) -> Self {
        Self {
            module: module.to_string(),
            template,
            deps: Vec::new(),
            generation: None,
            opened: false,
            next: None,
        }
    }

    fn all_resolved(&self) -> bool {
        self.deps.iter().all(|d| d.is_resolved())
    }

    fn sync_snapshot(&self, cx: &mut PhaseContext<'_>) {
        for dep in &self.deps {
            if let Some(component) = cx.core.snapshot.component_mut(dep.component()) {
                if let Some(reference) = component
                    .references
                    .iter_mut()
                    .find(|r| r.name == dep.name())
                {
                    reference.matches = dep.match_ids();
                }
            }
        }
        cx.core.touch();
    }

    fn open_publication(&mut self, cx: &mut PhaseContext<'_>) {
        let resolved: Vec<ResolvedReference> = self
            .deps
            .iter()
            .map(|dep| ResolvedReference {
                component: dep.component().to_string(),
                reference: dep.name().to_string(),
                shape: dep.shape(),
                matches: dep.matched(),
            })
            .collect();
        let mut publication: BoxedPhase = Box::new(PublicationPhase::new(
            &self.module,
            Arc::clone(&self.template),
            resolved,
        ));
        publication.open(cx);
        self.next = Some(publication);
    }

    fn close_publication(&mut self, cx: &mut PhaseContext<'_>) {
        if let Some(mut publication) = self.next.take() {
            publication.close(cx);
        }
    }
}

impl Phase for ReferenceBindingPhase {
    fn kind(&self) -> OpKind {
        OpKind::ReferenceBinding
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
            for reference in &component.references {
                match ReferenceDependency::new(&component.name, reference) {
                    Ok(dep) => self.deps.push(dep),
                    Err(err) => cx.record_error(err),
                }
            }
        }

        if !self.deps.iter().any(|d| d.is_required()) {
            self.open_publication(cx);
            return true;
        }

        debug!(module = %self.module, references = self.deps.len(), "waiting for referenced services");
        let generation = cx.fresh_generation();
        self.generation = Some(generation);
        // Emit first; the install below replays existing services and may
        // satisfy the module before this effect batch finishes draining.
        cx.emit(LifecycleState::WaitingForServices);
        if let Some(filter) = combined_filter(self.deps.iter().filter(|d| d.is_required())) {
            cx.install_watcher(
                OpKind::ReferenceBinding,
                generation,
                filter,
                ReferenceSync::new(cx.container.clone(), generation),
            );
        }
        false
    }

    fn close(&mut self, cx: &mut PhaseContext<'_>) -> bool {
        self.close_publication(cx);
        cx.remove_watcher(OpKind::ReferenceBinding);
        self.deps.clear();
        self.generation = None;
        self.opened = false;
        true
    }

    fn next_mut(&mut self) -> Option<&mut BoxedPhase> {
        self.next.as_mut()
    }

    fn on_service(
        &mut self,
        cx: &mut PhaseContext<'_>,
        generation: GenerationId,
        event: &ServiceEvent,
    ) -> bool {
        if self.generation != Some(generation) {
            return match &mut self.next {
                Some(next) => next.on_service(cx, generation, event),
                None => false,
            };
        }

        match event {
            ServiceEvent::Arriving(handle) => {
                for dep in &mut self.deps {
                    if dep.matches(handle) {
                        dep.resolve(handle);
                    }
                }
                self.sync_snapshot(cx);
                if self.next.is_none() && self.all_resolved() {
                    info!(module = %self.module, "references satisfied, publishing");
                    self.open_publication(cx);
                }
            }
            ServiceEvent::Modified(handle) => {
                for dep in &mut self.deps {
                    if dep.matches(handle) {
                        dep.resolve(handle);
                    } else {
                        dep.unresolve(handle.id);
                    }
                }
                self.sync_snapshot(cx);
                // Properties feed bindings, so a live publication is
                // rebuilt even when the candidate set stays resolved.
                if self.next.is_some() {
                    self.close_publication(cx);
                    if self.all_resolved() {
                        self.open_publication(cx);
                    } else {
                        cx.emit(LifecycleState::WaitingForServices);
                    }
                } else if self.all_resolved() {
                    self.open_publication(cx);
                }
            }
            ServiceEvent::Departing(handle) => {
                let mut removed = false;
                for dep in &mut self.deps {
                    removed |= dep.unresolve(handle.id);
                }
                if removed {
                    self.sync_snapshot(cx);
                    if self.next.is_some() {
                        info!(module = %self.module, service = %handle.id, "bound service departing");
                        self.close_publication(cx);
                        if self.all_resolved() {
                            self.open_publication(cx);
                        } else {
                            cx.emit(LifecycleState::WaitingForServices);
                        }
                    }
                }
            }
        }
        true
    }
}
