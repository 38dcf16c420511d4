use serde::{Deserialize, Serialize};

use super::filter::{Filter, FilterError};

/// Service type under which runtime extensions publish themselves.
pub const EXTENSION_SERVICE_TYPE: &str = "berth.extension";
/// Property an extension service carries to identify itself.
pub const EXTENSION_NAME_PROPERTY: &str = "extension.name";

/// How a component is instantiated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentKind {
    /// Shares the module lifecycle.
    Ordinary,
    /// One instance, activated with the module.
    Single,
    /// One instance per factory configuration instance.
    Factory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigPolicy {
    Required,
    Optional,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigCardinality {
    One,
    Many,
}

/// A configuration identifier the component consumes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigRequirement {
    pub pid: String,
    pub policy: ConfigPolicy,
    pub cardinality: ConfigCardinality,
}

impl ConfigRequirement {
    pub fn required(pid: impl Into<String>) -> Self {
        Self {
            pid: pid.into(),
            policy: ConfigPolicy::Required,
            cardinality: ConfigCardinality::One,
        }
    }

    pub fn optional(pid: impl Into<String>) -> Self {
        Self {
            pid: pid.into(),
            policy: ConfigPolicy::Optional,
            cardinality: ConfigCardinality::One,
        }
    }

    pub fn is_required(&self) -> bool {
        self.policy == ConfigPolicy::Required
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferencePolicy {
    Static,
    Dynamic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyOption {
    Reluctant,
    Greedy,
}

/// How matched services are handed to the component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionShape {
    /// The service value itself.
    Value,
    /// An indirect handle that resolves lazily.
    Handle,
    /// The service properties only.
    Properties,
    /// Handle plus properties.
    Tuple,
    /// A binder the component drives itself.
    Binder,
}

/// A dependency on services published by other parties.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceRequirement {
    pub name: String,
    pub service_type: String,
    pub minimum_cardinality: u32,
    pub target: Option<String>,
    pub policy: ReferencePolicy,
    pub policy_option: PolicyOption,
    pub shape: CollectionShape,
}

impl ReferenceRequirement {
    pub fn new(name: impl Into<String>, service_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            service_type: service_type.into(),
            minimum_cardinality: 1,
            target: None,
            policy: ReferencePolicy::Static,
            policy_option: PolicyOption::Reluctant,
            shape: CollectionShape::Value,
        }
    }

    pub fn optional(mut self) -> Self {
        self.minimum_cardinality = 0;
        self
    }

    pub fn with_minimum_cardinality(mut self, minimum: u32) -> Self {
        self.minimum_cardinality = minimum;
        self
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn with_policy(mut self, policy: ReferencePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_shape(mut self, shape: CollectionShape) -> Self {
        self.shape = shape;
        self
    }

    pub fn is_required(&self) -> bool {
        self.minimum_cardinality > 0
    }

    /// Effective filter: the service type constraint, narrowed by the
    /// optional target expression.
    pub fn target_filter(&self) -> Result<Filter, FilterError> {
        let expression = match &self.target {
            Some(target) => format!("(&(objectClass={}){})", self.service_type, target),
            None => format!("(objectClass={})", self.service_type),
        };
        Filter::parse(&expression)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceScope {
    Singleton,
    Bundle,
    Prototype,
}

/// A service publication a component makes once satisfied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivationTemplate {
    pub service_types: Vec<String>,
    pub scope: ServiceScope,
    pub ranking: i32,
}

impl ActivationTemplate {
    pub fn new(service_types: Vec<String>) -> Self {
        Self {
            service_types,
            scope: ServiceScope::Singleton,
            ranking: 0,
        }
    }

    pub fn with_scope(mut self, scope: ServiceScope) -> Self {
        self.scope = scope;
        self
    }

    pub fn with_ranking(mut self, ranking: i32) -> Self {
        self.ranking = ranking;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentTemplate {
    pub name: String,
    pub kind: ComponentKind,
    pub configurations: Vec<ConfigRequirement>,
    pub references: Vec<ReferenceRequirement>,
    pub activations: Vec<ActivationTemplate>,
}

impl ComponentTemplate {
    pub fn new(name: impl Into<String>, kind: ComponentKind) -> Self {
        Self {
            name: name.into(),
            kind,
            configurations: Vec::new(),
            references: Vec::new(),
            activations: Vec::new(),
        }
    }

    pub fn with_configuration(mut self, configuration: ConfigRequirement) -> Self {
        self.configurations.push(configuration);
        self
    }

    pub fn with_reference(mut self, reference: ReferenceRequirement) -> Self {
        self.references.push(reference);
        self
    }

    pub fn with_activation(mut self, activation: ActivationTemplate) -> Self {
        self.activations.push(activation);
        self
    }
}

/// A named runtime extension the module refuses to start without.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtensionRequirement {
    pub name: String,
    pub target: Option<String>,
}

impl ExtensionRequirement {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            target: None,
        }
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn target_filter(&self) -> Result<Filter, FilterError> {
        let base = format!(
            "(&(objectClass={EXTENSION_SERVICE_TYPE})({EXTENSION_NAME_PROPERTY}={}))",
            self.name
        );
        let expression = match &self.target {
            Some(target) => format!("(&{base}{target})"),
            None => base,
        };
        Filter::parse(&expression)
    }
}

/// Everything the engine knows about a module: its components, their
/// dependencies and the extensions it requires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleTemplate {
    pub name: String,
    pub extensions: Vec<ExtensionRequirement>,
    pub components: Vec<ComponentTemplate>,
}

impl ModuleTemplate {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            extensions: Vec::new(),
            components: Vec::new(),
        }
    }

    pub fn with_extension(mut self, extension: ExtensionRequirement) -> Self {
        self.extensions.push(extension);
        self
    }

    pub fn with_component(mut self, component: ComponentTemplate) -> Self {
        self.components.push(component);
        self
    }
}
