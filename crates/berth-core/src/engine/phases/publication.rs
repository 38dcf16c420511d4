use std::sync::Arc;

use serde_json::json;
use tracing::debug;

use crate::domain::Properties;
use crate::domain::errors::BerthError;
use crate::domain::events::LifecycleState;
use crate::domain::ids::GenerationId;
use crate::domain::op::OpKind;
use crate::domain::template::{ComponentKind, ModuleTemplate};
use crate::ports::component_model::Binding;
use crate::ports::service_registry::ServiceRegistration;

use super::super::dependency::ResolvedReference;
use super::super::phase::{BoxedPhase, Phase, PhaseContext, SideEffect};

/// Tail of the chain. Binds configurations and references into the
/// component model, validates it, then publishes component activations.
/// Setup announces `Satisfied` before and `Created` after registration;
/// teardown retracts in reverse order and stays silent.
pub struct PublicationPhase {
    module: String,
    template: Arc<ModuleTemplate>,
    resolved: Vec<ResolvedReference>,
    generation: Option<GenerationId>,
    opened: bool,
}

impl PublicationPhase {
    pub fn new(
        module: &str,
        template: Arc<ModuleTemplate>,
        resolved: Vec<ResolvedReference>,
    ) -> Self {
        Self {
            module: module.to_string(),
            template,
            resolved,
            generation: None,
            opened: false,
        }
    }

    fn bind_all(&self, cx: &mut PhaseContext<'_>) -> Result<(), BerthError> {
        let handle = cx.core.model.ok_or_else(|| BerthError::PhaseOpen {
            op: self.open_op(),
            detail: "component model not deployed".into(),
        })?;

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
                let properties = cx
                    .core
                    .snapshot
                    .component(&component.name)
                    .and_then(|c| {
                        c.configurations
                            .iter()
                            .find(|s| s.pid == configuration.pid)
                    })
                    .and_then(|s| s.properties.clone());
                if let Some(properties) = properties {
                    cx.ports.model.bind(
                        handle,
                        Binding::Configuration {
                            component: component.name.clone(),
                            pid: configuration.pid.clone(),
                            properties,
                        },
                    )?;
                }
            }
        }

        for reference in &self.resolved {
            cx.ports.model.bind(
                handle,
                Binding::Reference {
                    component: reference.component.clone(),
                    reference: reference.reference.clone(),
                    shape: reference.shape,
                    matches: reference.matches.clone(),
                },
            )?;
        }

        cx.ports.model.validate(handle)
    }
}

impl Phase for PublicationPhase {
    fn kind(&self) -> OpKind {
        OpKind::Publication
    }

    fn module(&self) -> &str {
        &self.module
    }

    fn open(&mut self, cx: &mut PhaseContext<'_>) -> bool {
        if self.opened {
            return true;
        }
        self.opened = true;

        cx.emit(LifecycleState::Satisfied);

        if let Err(err) = self.bind_all(cx) {
            cx.record_error(BerthError::PhaseOpen {
                op: self.open_op(),
                detail: err.to_string(),
            });
            cx.emit_failed(err.to_string());
            return true;
        }

        let generation = cx.fresh_generation();
        self.generation = Some(generation);
        cx.core.publication_generation = Some(generation);

        for component in &self.template.components {
            let Some(snapshot) = cx.core.snapshot.component_mut(&component.name) else {
                continue;
            };
            if !snapshot.enabled {
                continue;
            }
            // Factory components activate per factory configuration
            // instance; without one they stay dormant.
            if component.kind == ComponentKind::Factory {
                continue;
            }
            snapshot.active = true;
            for (index, activation) in component.activations.iter().enumerate() {
                let mut properties = Properties::new();
                properties.insert("component.name".into(), json!(component.name));
                properties.insert("module.name".into(), json!(self.module));
                cx.effects.push(SideEffect::RegisterService {
                    component: component.name.clone(),
                    activation: index,
                    generation,
                    registration: ServiceRegistration {
                        types: activation.service_types.clone(),
                        ranking: activation.ranking,
                        scope: activation.scope,
                        properties,
                    },
                });
            }
        }
        cx.core.touch();
        cx.emit(LifecycleState::Created);
        true
    }

    fn close(&mut self, cx: &mut PhaseContext<'_>) -> bool {
        if !self.opened {
            return true;
        }
        self.opened = false;
        self.generation = None;
        cx.core.publication_generation = None;

        debug!(module = %self.module, "retracting published services");
        for component in cx.core.snapshot.components.iter_mut().rev() {
            component.active = false;
            for activation in component.activations.iter_mut().rev() {
                if let Some(id) = activation.service_id.take() {
                    cx.effects.push(SideEffect::UnregisterService(id));
                }
            }
        }
        cx.core.touch();
        true
    }

    fn next_mut(&mut self) -> Option<&mut BoxedPhase> {
        None
    }
}
