use std::collections::{BTreeMap, BTreeSet};

use crate::domain::errors::BerthError;
use crate::domain::filter::Filter;
use crate::domain::ids::ServiceId;
use crate::domain::template::{
    CollectionShape, ExtensionRequirement, PolicyOption, ReferencePolicy, ReferenceRequirement,
};
use crate::ports::service_registry::ServiceHandle;

/// Tracks delivery of the configuration identifiers one requirement
/// covers. Resolved once every tracked identifier is currently delivered,
/// or immediately if the requirement is optional.
#[derive(Debug, Clone)]
pub struct ConfigurationDependency {
    component: String,
    pids: Vec<String>,
    required: bool,
    delivered: BTreeSet<String>,
}

impl ConfigurationDependency {
    pub fn new(component: impl Into<String>, pids: Vec<String>, required: bool) -> Self {
        Self {
            component: component.into(),
            pids,
            required,
            delivered: BTreeSet::new(),
        }
    }

    pub fn component(&self) -> &str {
        &self.component
    }

    pub fn pids(&self) -> &[String] {
        &self.pids
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    /// Records a delivery. Returns true if the identifier is tracked here.
    pub fn offer(&mut self, pid: &str) -> bool {
        if self.pids.iter().any(|p| p == pid) {
            self.delivered.insert(pid.to_string());
            true
        } else {
            false
        }
    }

    /// Records a removal. Returns true if the identifier was delivered.
    pub fn retract(&mut self, pid: &str) -> bool {
        self.delivered.remove(pid)
    }

    pub fn is_resolved(&self) -> bool {
        !self.required || self.pids.iter().all(|p| self.delivered.contains(p))
    }
}

/// Tracks the candidate set for one service reference. Resolved once the
/// candidate count reaches the minimum cardinality.
#[derive(Debug, Clone)]
pub struct ReferenceDependency {
    component: String,
    name: String,
    minimum_cardinality: u32,
    filter: Filter,
    policy: ReferencePolicy,
    policy_option: PolicyOption,
    shape: CollectionShape,
    matches: BTreeMap<ServiceId, ServiceHandle>,
}

impl ReferenceDependency {
    pub fn new(component: &str, requirement: &ReferenceRequirement) -> Result<Self, BerthError> {
        let filter = requirement
            .target_filter()
            .map_err(|err| BerthError::descriptor(
                component,
                format!("reference '{}': {err}", requirement.name),
            ))?;
        Ok(Self {
            component: component.to_string(),
            name: requirement.name.clone(),
            minimum_cardinality: requirement.minimum_cardinality,
            filter,
            policy: requirement.policy,
            policy_option: requirement.policy_option,
            shape: requirement.shape,
            matches: BTreeMap::new(),
        })
    }

    /// Extensions are mandatory single-cardinality references on the
    /// extension service type.
    pub fn for_extension(requirement: &ExtensionRequirement) -> Result<Self, BerthError> {
        let component = format!("extension:{}", requirement.name);
        let filter = requirement
            .target_filter()
            .map_err(|err| BerthError::descriptor(&component, err))?;
        Ok(Self {
            component,
            name: requirement.name.clone(),
            minimum_cardinality: 1,
            filter,
            policy: ReferencePolicy::Static,
            policy_option: PolicyOption::Reluctant,
            shape: CollectionShape::Value,
            matches: BTreeMap::new(),
        })
    }

    pub fn component(&self) -> &str {
        &self.component
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn filter(&self) -> &Filter {
        &self.filter
    }

    pub fn shape(&self) -> CollectionShape {
        self.shape
    }

    pub fn policy(&self) -> ReferencePolicy {
        self.policy
    }

    pub fn policy_option(&self) -> PolicyOption {
        self.policy_option
    }

    pub fn is_required(&self) -> bool {
        self.minimum_cardinality > 0
    }

    pub fn matches(&self, handle: &ServiceHandle) -> bool {
        handle.matches(&self.filter)
    }

    /// Adds (or refreshes) a candidate. Returns true if it was new.
    pub fn resolve(&mut self, handle: &ServiceHandle) -> bool {
        self.matches.insert(handle.id, handle.clone()).is_none()
    }

    /// Drops a candidate. Returns true if it was present.
    pub fn unresolve(&mut self, id: ServiceId) -> bool {
        self.matches.remove(&id).is_some()
    }

    pub fn is_resolved(&self) -> bool {
        self.matches.len() as u32 >= self.minimum_cardinality
    }

    /// Highest ranking wins; ties break towards the oldest registration
    /// (lowest service id).
    pub fn best_match(&self) -> Option<&ServiceHandle> {
        self.matches
            .values()
            .min_by(|a, b| b.ranking.cmp(&a.ranking).then(a.id.cmp(&b.id)))
    }

    /// All candidates, best match first.
    pub fn matched(&self) -> Vec<ServiceHandle> {
        let mut handles: Vec<ServiceHandle> = self.matches.values().cloned().collect();
        handles.sort_by(|a, b| b.ranking.cmp(&a.ranking).then(a.id.cmp(&b.id)));
        handles
    }

    pub fn match_ids(&self) -> Vec<ServiceId> {
        self.matched().iter().map(|h| h.id).collect()
    }
}

/// Disjunction over the filters of the given dependencies.
pub fn combined_filter<'a, I>(deps: I) -> Option<Filter>
where
    I: IntoIterator<Item = &'a ReferenceDependency>,
{
    let filters: Vec<Filter> = deps.into_iter().map(|d| d.filter().clone()).collect();
    if filters.is_empty() {
        None
    } else {
        Some(Filter::any_of(filters))
    }
}

/// A reference dependency's outcome, carried into publication for binding.
#[derive(Debug, Clone)]
pub struct ResolvedReference {
    pub component: String,
    pub reference: String,
    pub shape: CollectionShape,
    pub matches: Vec<ServiceHandle>,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::domain::Properties;

    use super::*;

    fn handle(id: u64, ranking: i32, ty: &str) -> ServiceHandle {
        let mut properties = Properties::new();
        properties.insert("objectClass".into(), json!([ty]));
        properties.insert("service.id".into(), json!(id));
        properties.insert("service.ranking".into(), json!(ranking));
        ServiceHandle {
            id: ServiceId(id),
            ranking,
            types: vec![ty.to_string()],
            properties,
        }
    }

    #[test]
    fn optional_configuration_is_always_resolved() {
        let dep = ConfigurationDependency::new("c", vec!["a.pid".into()], false);
        assert!(dep.is_resolved());
    }

    #[test]
    fn required_configuration_resolves_when_all_pids_delivered() {
        let mut dep =
            ConfigurationDependency::new("c", vec!["a.pid".into(), "b.pid".into()], true);
        assert!(!dep.is_resolved());
        assert!(dep.offer("a.pid"));
        assert!(!dep.is_resolved());
        assert!(dep.offer("b.pid"));
        assert!(dep.is_resolved());
    }

    #[test]
    fn retract_unresolves_a_required_configuration() {
        let mut dep = ConfigurationDependency::new("c", vec!["a.pid".into()], true);
        dep.offer("a.pid");
        assert!(dep.is_resolved());
        assert!(dep.retract("a.pid"));
        assert!(!dep.is_resolved());
        assert!(!dep.retract("a.pid"));
    }

    #[test]
    fn untracked_pid_is_ignored() {
        let mut dep = ConfigurationDependency::new("c", vec!["a.pid".into()], true);
        assert!(!dep.offer("other.pid"));
        assert!(!dep.is_resolved());
    }

    #[test]
    fn reference_resolves_at_minimum_cardinality() {
        let requirement = ReferenceRequirement::new("logger", "demo.Logger")
            .with_minimum_cardinality(2);
        let mut dep = ReferenceDependency::new("c", &requirement).unwrap();
        dep.resolve(&handle(1, 0, "demo.Logger"));
        assert!(!dep.is_resolved());
        dep.resolve(&handle(2, 0, "demo.Logger"));
        assert!(dep.is_resolved());
        dep.unresolve(ServiceId(1));
        assert!(!dep.is_resolved());
    }

    #[test]
    fn best_match_prefers_ranking_then_lowest_id() {
        let requirement = ReferenceRequirement::new("logger", "demo.Logger");
        let mut dep = ReferenceDependency::new("c", &requirement).unwrap();
        dep.resolve(&handle(10, 5, "demo.Logger"));
        dep.resolve(&handle(20, 5, "demo.Logger"));
        dep.resolve(&handle(30, 3, "demo.Logger"));

        assert_eq!(dep.best_match().unwrap().id, ServiceId(10));
        assert_eq!(
            dep.match_ids(),
            vec![ServiceId(10), ServiceId(20), ServiceId(30)]
        );
    }

    #[test]
    fn malformed_target_becomes_descriptor_error() {
        let requirement = ReferenceRequirement::new("logger", "demo.Logger").with_target("(((");
        let err = ReferenceDependency::new("c", &requirement).unwrap_err();
        assert!(matches!(err, BerthError::Descriptor { .. }));
    }

    #[test]
    fn extension_dependency_matches_named_extension_only() {
        let dep =
            ReferenceDependency::for_extension(&ExtensionRequirement::new("txlog")).unwrap();
        let mut good = handle(1, 0, "berth.extension");
        good.properties
            .insert("extension.name".into(), json!("txlog"));
        assert!(dep.matches(&good));

        let bad = handle(2, 0, "berth.extension");
        assert!(!dep.matches(&bad));
    }

    #[test]
    fn combined_filter_covers_all_dependencies() {
        let a = ReferenceDependency::new(
            "c",
            &ReferenceRequirement::new("a", "demo.A"),
        )
        .unwrap();
        let b = ReferenceDependency::new(
            "c",
            &ReferenceRequirement::new("b", "demo.B"),
        )
        .unwrap();
        let filter = combined_filter([&a, &b]).unwrap();
        assert!(handle(1, 0, "demo.A").matches(&filter));
        assert!(handle(2, 0, "demo.B").matches(&filter));
        assert!(!handle(3, 0, "demo.C").matches(&filter));
    }
}
