use serde::{Deserialize, Serialize};

use super::Properties;
use super::ids::ServiceId;
use super::template::{
    ComponentKind, ComponentTemplate, ConfigCardinality, ConfigPolicy, ModuleTemplate,
    ServiceScope,
};

/// Introspectable runtime state of one module. Cloned out under the
/// container lock; readers never see a half-written view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleSnapshot {
    pub module: String,
    pub components: Vec<ComponentSnapshot>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentSnapshot {
    pub name: String,
    pub kind: ComponentKind,
    pub enabled: bool,
    pub active: bool,
    pub configurations: Vec<ConfigurationSnapshot>,
    pub references: Vec<ReferenceSnapshot>,
    pub activations: Vec<ActivationSnapshot>,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigurationSnapshot {
    pub pid: String,
    pub policy: ConfigPolicy,
    pub cardinality: ConfigCardinality,
    /// Last delivered non-empty properties, if any.
    pub properties: Option<Properties>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferenceSnapshot {
    pub name: String,
    pub service_type: String,
    pub minimum_cardinality: u32,
    pub target: Option<String>,
    /// Current candidate set, best match first.
    pub matches: Vec<ServiceId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivationSnapshot {
    pub service_types: Vec<String>,
    pub scope: ServiceScope,
    pub ranking: i32,
    pub service_id: Option<ServiceId>,
    pub errors: Vec<String>,
}

impl ModuleSnapshot {
    pub fn new(module: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            components: Vec::new(),
        }
    }

    pub fn from_template(template: &ModuleTemplate) -> Self {
        Self {
            module: template.name.clone(),
            components: template
                .components
                .iter()
                .map(ComponentSnapshot::from_template)
                .collect(),
        }
    }

    pub fn component(&self, name: &str) -> Option<&ComponentSnapshot> {
        self.components.iter().find(|c| c.name == name)
    }

    pub fn component_mut(&mut self, name: &str) -> Option<&mut ComponentSnapshot> {
        self.components.iter_mut().find(|c| c.name == name)
    }

    /// Drops reference matches and activation state, keeping templates and
    /// delivered configurations. Used when the downstream chain is rebuilt.
    pub fn clear_reference_state(&mut self) {
        for component in &mut self.components {
            component.active = false;
            for reference in &mut component.references {
                reference.matches.clear();
            }
            for activation in &mut component.activations {
                activation.service_id = None;
            }
        }
    }

    /// Drops delivered configuration properties as well.
    pub fn clear_configuration_state(&mut self) {
        for component in &mut self.components {
            for configuration in &mut component.configurations {
                configuration.properties = None;
            }
        }
    }
}

impl ComponentSnapshot {
    pub fn from_template(template: &ComponentTemplate) -> Self {
        Self {
            name: template.name.clone(),
            kind: template.kind,
            enabled: true,
            active: false,
            configurations: template
                .configurations
                .iter()
                .map(|c| ConfigurationSnapshot {
                    pid: c.pid.clone(),
                    policy: c.policy,
                    cardinality: c.cardinality,
                    properties: None,
                })
                .collect(),
            references: template
                .references
                .iter()
                .map(|r| ReferenceSnapshot {
                    name: r.name.clone(),
                    service_type: r.service_type.clone(),
                    minimum_cardinality: r.minimum_cardinality,
                    target: r.target.clone(),
                    matches: Vec::new(),
                })
                .collect(),
            activations: template
                .activations
                .iter()
                .map(|a| ActivationSnapshot {
                    service_types: a.service_types.clone(),
                    scope: a.scope,
                    ranking: a.ranking,
                    service_id: None,
                    errors: Vec::new(),
                })
                .collect(),
            errors: Vec::new(),
        }
    }

    pub fn disable(&mut self, reason: impl Into<String>) {
        self.enabled = false;
        self.errors.push(reason.into());
    }
}
