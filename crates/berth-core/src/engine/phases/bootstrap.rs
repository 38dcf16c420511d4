use std::sync::Arc;

use tracing::debug;

use crate::domain::errors::BerthError;
use crate::domain::op::OpKind;
use crate::domain::template::ModuleTemplate;

use super::super::phase::{BoxedPhase, Phase, PhaseContext};

/// Deploys the module into the component model. Failure here is terminal
/// for the attempt: the container reports failed and stays put until
/// closed.
pub struct BootstrapPhase {
    module: String,
    template: Arc<ModuleTemplate>,
    opened: bool,
    next: BoxedPhase,
}

impl BootstrapPhase {
    pub fn new(module: &str, template: Arc<ModuleTemplate>, next: BoxedPhase) -> Self {
        Self {
            module: module.to_string(),
            template,
            opened: false,
            next,
        }
    }
}

impl Phase for BootstrapPhase {
    fn kind(&self) -> OpKind {
        OpKind::ContainerBootstrap
    }

    fn module(&self) -> &str {
        &self.module
    }

    fn open(&mut self, cx: &mut PhaseContext<'_>) -> bool {
        if self.opened {
            return self.next.open(cx);
        }
        match cx.ports.model.deploy(&self.template) {
            Ok(handle) => {
                debug!(module = %self.module, ?handle, "component model deployed");
                cx.core.model = Some(handle);
                cx.core.touch();
                self.opened = true;
                self.next.open(cx)
            }
            Err(err) => {
                cx.record_error(BerthError::PhaseOpen {
                    op: self.open_op(),
                    detail: err.to_string(),
                });
                cx.emit_failed(err.to_string());
                true
            }
        }
    }

    fn close(&mut self, cx: &mut PhaseContext<'_>) -> bool {
        self.next.close(cx);
        if let Some(handle) = cx.core.model.take() {
            cx.ports.model.discard(handle);
            cx.core.touch();
        }
        self.opened = false;
        true
    }

    fn next_mut(&mut self) -> Option<&mut BoxedPhase> {
        Some(&mut self.next)
    }
}
