use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::debug;

use crate::domain::errors::BerthError;
use crate::domain::op::OpKind;
use crate::domain::snapshot::ComponentSnapshot;
use crate::domain::template::ModuleTemplate;

use super::super::phase::{BoxedPhase, Phase, PhaseContext};

/// Head of the chain. Discovers components from the template, validates
/// their descriptors and seeds the snapshot. A bad descriptor disables
/// that one component; the rest of the module proceeds.
pub struct InitPhase {
    module: String,
    template: Arc<ModuleTemplate>,
    opened: bool,
    next: BoxedPhase,
}

impl InitPhase {
    pub fn new(module: &str, template: Arc<ModuleTemplate>, next: BoxedPhase) -> Self {
        Self {
            module: module.to_string(),
            template,
            opened: false,
            next,
        }
    }
}

impl Phase for InitPhase {
    fn kind(&self) -> OpKind {
        OpKind::ContainerInit
    }

    fn module(&self) -> &str {
        &self.module
    }

    fn open(&mut self, cx: &mut PhaseContext<'_>) -> bool {
        if self.opened {
            return self.next.open(cx);
        }
        self.opened = true;

        debug!(module = %self.module, components = self.template.components.len(), "discovering components");
        let mut seen = BTreeSet::new();
        cx.core.snapshot.components.clear();
        for component in &self.template.components {
            let mut snapshot = ComponentSnapshot::from_template(component);
            if !seen.insert(component.name.clone()) {
                let error = BerthError::descriptor(
                    &component.name,
                    "duplicate component name in module",
                );
                snapshot.disable(error.to_string());
                cx.core.snapshot.components.push(snapshot);
                cx.record_error(error);
                continue;
            }
            for reference in &component.references {
                if let Err(err) = reference.target_filter() {
                    let error = BerthError::descriptor(
                        &component.name,
                        format!("reference '{}': {err}", reference.name),
                    );
                    snapshot.disable(error.to_string());
                    cx.record_error(error);
                }
            }
            cx.core.snapshot.components.push(snapshot);
        }

        cx.core.touch();
        self.next.open(cx)
    }

    fn close(&mut self, cx: &mut PhaseContext<'_>) -> bool {
        let closed = self.next.close(cx);
        self.opened = false;
        closed
    }

    fn next_mut(&mut self) -> Option<&mut BoxedPhase> {
        Some(&mut self.next)
    }
}
