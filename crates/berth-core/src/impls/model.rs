use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::domain::errors::BerthError;
use crate::domain::template::ModuleTemplate;
use crate::ports::component_model::{Binding, ComponentModel, ModelHandle};

/// Recording component model. Stores deployments and their bindings so
/// callers can inspect what the engine delivered; failure switches let
/// tests drive the failure paths.
pub struct SimpleComponentModel {
    fail_deploy: AtomicBool,
    fail_validation: AtomicBool,
    state: Mutex<ModelState>,
}

struct ModelState {
    next: u64,
    deployments: HashMap<ModelHandle, Deployment>,
}

struct Deployment {
    module: String,
    bindings: Vec<Binding>,
    validations: u32,
}

impl SimpleComponentModel {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            fail_deploy: AtomicBool::new(false),
            fail_validation: AtomicBool::new(false),
            state: Mutex::new(ModelState {
                next: 0,
                deployments: HashMap::new(),
            }),
        })
    }

    pub fn set_fail_deploy(&self, fail: bool) {
        self.fail_deploy.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_validation(&self, fail: bool) {
        self.fail_validation.store(fail, Ordering::SeqCst);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ModelState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn deployment_count(&self) -> usize {
        self.lock().deployments.len()
    }

    /// How many times `validate` succeeded for this deployment.
    pub fn validation_count(&self, handle: ModelHandle) -> u32 {
        self.lock()
            .deployments
            .get(&handle)
            .map(|d| d.validations)
            .unwrap_or(0)
    }

    pub fn bindings(&self, handle: ModelHandle) -> Vec<Binding> {
        self.lock()
            .deployments
            .get(&handle)
            .map(|d| d.bindings.clone())
            .unwrap_or_default()
    }

    /// Bindings across all live deployments, oldest deployment first.
    pub fn all_bindings(&self) -> Vec<Binding> {
        let state = self.lock();
        let mut handles: Vec<&ModelHandle> = state.deployments.keys().collect();
        handles.sort_by_key(|h| h.0);
        handles
            .into_iter()
            .flat_map(|h| state.deployments[h].bindings.clone())
            .collect()
    }
}

fn binding_key(binding: &Binding) -> (u8, String, String) {
    match binding {
        Binding::Configuration { component, pid, .. } => (0, component.clone(), pid.clone()),
        Binding::Reference {
            component,
            reference,
            ..
        } => (1, component.clone(), reference.clone()),
    }
}

impl ComponentModel for SimpleComponentModel {
    fn deploy(&self, template: &ModuleTemplate) -> Result<ModelHandle, BerthError> {
        if self.fail_deploy.load(Ordering::SeqCst) {
            return Err(BerthError::Model(format!(
                "deployment of '{}' rejected",
                template.name
            )));
        }
        let mut state = self.lock();
        state.next += 1;
        let handle = ModelHandle(state.next);
        state.deployments.insert(
            handle,
            Deployment {
                module: template.name.clone(),
                bindings: Vec::new(),
                validations: 0,
            },
        );
        debug!(module = %template.name, ?handle, "module deployed into model");
        Ok(handle)
    }

    fn bind(&self, handle: ModelHandle, binding: Binding) -> Result<(), BerthError> {
        let mut state = self.lock();
        let Some(deployment) = state.deployments.get_mut(&handle) else {
            return Err(BerthError::Model(format!("unknown deployment {handle:?}")));
        };
        // Rebinding the same target replaces the previous value.
        let key = binding_key(&binding);
        deployment.bindings.retain(|b| binding_key(b) != key);
        deployment.bindings.push(binding);
        Ok(())
    }

    fn validate(&self, handle: ModelHandle) -> Result<(), BerthError> {
        if self.fail_validation.load(Ordering::SeqCst) {
            return Err(BerthError::Model("validation rejected".into()));
        }
        let mut state = self.lock();
        match state.deployments.get_mut(&handle) {
            Some(deployment) => {
                deployment.validations += 1;
                Ok(())
            }
            None => Err(BerthError::Model(format!("unknown deployment {handle:?}"))),
        }
    }

    fn discard(&self, handle: ModelHandle) {
        let mut state = self.lock();
        if let Some(deployment) = state.deployments.remove(&handle) {
            debug!(module = %deployment.module, ?handle, "deployment discarded");
        }
    }
}
