use std::sync::{Arc, Mutex, Weak};

use tokio::sync::watch;
use tracing::{debug, error, info};

use crate::domain::Properties;
use crate::domain::errors::BerthError;
use crate::domain::events::{LifecycleEvent, LifecycleState};
use crate::domain::ids::{ContainerId, GenerationId};
use crate::domain::op::{Op, OpKind, OpMode};
use crate::domain::snapshot::ModuleSnapshot;
use crate::domain::template::ModuleTemplate;
use crate::ports::clock::Clock;
use crate::ports::component_model::ComponentModel;
use crate::ports::config_store::ConfigStore;
use crate::ports::event_sink::LifecycleEventSink;
use crate::ports::id_generator::IdGenerator;
use crate::ports::metadata::MetadataProvider;
use crate::ports::service_registry::{ServiceEvent, ServiceRegistry};

use super::completion::Completion;
use super::phase::{BoxedPhase, CoreState, PhaseContext, SideEffect};
use super::phases::build_chain;
use super::scheduler::Scheduler;

/// The environment one container runs against.
#[derive(Clone)]
pub struct Ports {
    pub registry: Arc<dyn ServiceRegistry>,
    pub config: Arc<dyn ConfigStore>,
    pub model: Arc<dyn ComponentModel>,
    pub sink: Arc<dyn LifecycleEventSink>,
    pub clock: Arc<dyn Clock>,
    pub ids: Arc<dyn IdGenerator>,
}

/// One module's lifecycle engine.
///
/// All mutable state sits behind a single mutex. Phases run under that
/// lock and record external actions as [`SideEffect`]s, which the
/// container executes after releasing it; port callbacks triggered by
/// those actions may therefore re-enter the container freely.
pub struct Container {
    id: ContainerId,
    module: String,
    template: Arc<ModuleTemplate>,
    ports: Ports,
    scheduler: Arc<Scheduler>,
    inner: Mutex<ContainerInner>,
    state_tx: watch::Sender<LifecycleState>,
}

struct ContainerInner {
    core: CoreState,
    chain: Option<BoxedPhase>,
}

impl Container {
    pub fn new(metadata: &dyn MetadataProvider, ports: Ports) -> Result<Arc<Self>, BerthError> {
        let template = Arc::new(metadata.module_template()?);
        let module = template.name.clone();
        let id = ports.ids.container_id();
        let snapshot = ModuleSnapshot::new(&module);
        let (state_tx, _) = watch::channel(LifecycleState::Creating);
        info!(container = %id, module, "container created");
        Ok(Arc::new(Self {
            id,
            module,
            template,
            ports,
            scheduler: Arc::new(Scheduler::new()),
            inner: Mutex::new(ContainerInner {
                core: CoreState::new(snapshot),
                chain: None,
            }),
            state_tx,
        }))
    }

    pub fn id(&self) -> ContainerId {
        self.id
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    pub fn template(&self) -> &ModuleTemplate {
        &self.template
    }

    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    pub fn state(&self) -> LifecycleState {
        *self.state_tx.borrow()
    }

    /// Observe lifecycle state transitions.
    pub fn state_watch(&self) -> watch::Receiver<LifecycleState> {
        self.state_tx.subscribe()
    }

    /// Consistent copy of the introspection state.
    pub fn snapshot(&self) -> ModuleSnapshot {
        self.lock_inner().core.snapshot.clone()
    }

    /// Bumped on every observable mutation; lets pollers detect torn
    /// sequences of snapshots.
    pub fn change_count(&self) -> u64 {
        self.lock_inner().core.change_count
    }

    pub fn errors(&self) -> Vec<BerthError> {
        self.lock_inner().core.errors.clone()
    }

    /// Begins opening the phase chain. Deferred: the returned completion
    /// resolves once the first open attempt has run to a steady state
    /// (created, waiting or failed). Idempotent.
    pub fn start(self: &Arc<Self>) -> Completion {
        {
            let mut inner = self.lock_inner();
            if inner.core.closing {
                return Completion::resolved(Err(BerthError::Closing));
            }
            if inner.chain.is_some() {
                debug!(module = %self.module, "start ignored, already started");
                return Completion::ok();
            }
            inner.chain = Some(build_chain(&self.module, &self.template));
        }
        self.fire(LifecycleState::Creating, None, None);

        let op = Op::of(OpMode::Open, OpKind::ContainerInit, &self.module);
        let this = Arc::clone(self);
        self.submit(op, move || {
            let (_, effects) = this.with_chain(|chain, cx| {
                chain.open(cx);
            });
            this.drive(effects);
            Ok(())
        })
    }

    /// Synchronous teardown, downstream first. Safe to call at any time,
    /// any number of times, from any thread.
    pub fn close(self: &Arc<Self>) -> Result<(), BerthError> {
        {
            // Check and mark in one critical section so concurrent closes
            // cannot both win.
            let mut inner = self.lock_inner();
            if inner.core.closing {
                debug!(module = %self.module, "close ignored, already closed");
                return Ok(());
            }
            inner.core.closing = true;
        }
        self.scheduler.mark_closing();
        let op = Op::of(OpMode::Close, OpKind::Container, &self.module);
        let this = Arc::clone(self);
        let completion = self.scheduler.submit(op, move || {
            this.close_now();
            Ok(())
        });
        completion.now().unwrap_or(Ok(()))
    }

    fn close_now(self: &Arc<Self>) {
        self.fire(LifecycleState::Destroying, None, None);
        let weak = Arc::downgrade(self);
        let mut effects = Vec::new();
        {
            let mut inner = self.lock_inner();
            let ContainerInner { core, chain } = &mut *inner;
            if let Some(chain) = chain.as_mut() {
                let mut cx = PhaseContext {
                    module: &self.module,
                    template: &self.template,
                    core,
                    ports: &self.ports,
                    container: &weak,
                    effects: &mut effects,
                };
                chain.close(&mut cx);
            }
        }
        self.drive(effects);
        self.fire(LifecycleState::Destroyed, None, None);
    }

    /// Routes a task through the scheduler, recording failures against the
    /// container.
    pub fn submit<F>(self: &Arc<Self>, op: Op, task: F) -> Completion
    where
        F: FnOnce() -> Result<(), BerthError> + Send + 'static,
    {
        let this = Arc::clone(self);
        let tag = op.clone();
        self.scheduler.submit(op, move || {
            let result = task();
            if let Err(err) = &result {
                this.record_failure(&tag, err.clone());
            }
            result
        })
    }

    pub(crate) fn handle_service_event(
        self: &Arc<Self>,
        generation: GenerationId,
        event: ServiceEvent,
    ) {
        debug!(module = %self.module, event = event.label(), service = %event.handle().id, "service event");
        let (_, effects) = self.with_chain(|chain, cx| {
            if cx.core.closing {
                return;
            }
            chain.on_service(cx, generation, &event);
        });
        self.drive(effects);
    }

    pub(crate) fn handle_configuration(
        self: &Arc<Self>,
        generation: GenerationId,
        pid: &str,
        properties: Option<&Properties>,
    ) {
        debug!(module = %self.module, pid, present = properties.is_some(), "configuration event");
        let (_, effects) = self.with_chain(|chain, cx| {
            if cx.core.closing {
                return;
            }
            chain.on_configuration(cx, generation, pid, properties);
        });
        self.drive(effects);
    }

    fn lock_inner(&self) -> std::sync::MutexGuard<'_, ContainerInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn with_chain<R>(
        self: &Arc<Self>,
        f: impl FnOnce(&mut BoxedPhase, &mut PhaseContext<'_>) -> R,
    ) -> (Option<R>, Vec<SideEffect>) {
        let weak = Arc::downgrade(self);
        let mut effects = Vec::new();
        let mut out = None;
        {
            let mut inner = self.lock_inner();
            let ContainerInner { core, chain } = &mut *inner;
            if let Some(chain) = chain.as_mut() {
                let mut cx = PhaseContext {
                    module: &self.module,
                    template: &self.template,
                    core,
                    ports: &self.ports,
                    container: &weak,
                    effects: &mut effects,
                };
                out = Some(f(chain, &mut cx));
            }
        }
        (out, effects)
    }

    /// Executes side effects decided under the lock. Runs outside it, so
    /// callbacks triggered here (watcher replays, registry events) can
    /// re-enter the container.
    fn drive(self: &Arc<Self>, effects: Vec<SideEffect>) {
        for effect in effects {
            match effect {
                SideEffect::Emit {
                    state,
                    payload,
                    cause,
                } => self.fire(state, payload, cause),
                SideEffect::RegisterService {
                    component,
                    activation,
                    generation,
                    registration,
                } => {
                    let handle = self.ports.registry.register(registration);
                    let mut stale = None;
                    {
                        let mut inner = self.lock_inner();
                        let core = &mut inner.core;
                        if core.publication_generation == Some(generation) && !core.closing {
                            if let Some(slot) = core
                                .snapshot
                                .component_mut(&component)
                                .and_then(|c| c.activations.get_mut(activation))
                            {
                                slot.service_id = Some(handle.id);
                            }
                            core.touch();
                        } else {
                            stale = Some(handle.id);
                        }
                    }
                    if let Some(id) = stale {
                        // The publication was torn down between deciding
                        // this registration and executing it.
                        debug!(module = %self.module, service = %id, "retracting registration for a torn-down publication");
                        self.ports.registry.unregister(id);
                    }
                }
                SideEffect::UnregisterService(id) => self.ports.registry.unregister(id),
                SideEffect::InstallWatcher {
                    owner,
                    generation,
                    filter,
                    watcher,
                } => {
                    let id = self.ports.registry.install_watcher(filter, watcher);
                    let stale = {
                        let mut inner = self.lock_inner();
                        if inner.core.closing {
                            true
                        } else {
                            // The owning phase may have been closed (and
                            // reopened with a new generation) while this
                            // install was in flight; only the slot that
                            // minted the watcher may record its id.
                            match inner.core.service_watchers.get_mut(&owner) {
                                Some(slot) if slot.generation == generation => {
                                    slot.id = Some(id);
                                    false
                                }
                                _ => true,
                            }
                        }
                    };
                    if stale {
                        debug!(module = %self.module, watcher = %id, "retracting watcher for a torn-down phase");
                        self.ports.registry.remove_watcher(id);
                    }
                }
                SideEffect::RemoveWatcher(id) => self.ports.registry.remove_watcher(id),
                SideEffect::WatchConfig {
                    pid,
                    generation,
                    listener,
                } => {
                    let id = self.ports.config.watch(&pid, listener);
                    let stale = {
                        let mut inner = self.lock_inner();
                        if inner.core.closing || inner.core.config_generation != Some(generation) {
                            true
                        } else {
                            inner.core.config_watches.push(id);
                            false
                        }
                    };
                    if stale {
                        self.ports.config.unwatch(id);
                    }
                }
                SideEffect::UnwatchConfig(id) => self.ports.config.unwatch(id),
            }
        }
    }

    fn record_failure(&self, op: &Op, err: BerthError) {
        error!(module = %self.module, op = %op, error = %err, "operation failed");
        {
            let mut inner = self.lock_inner();
            inner.core.errors.push(err.clone());
            inner.core.touch();
        }
        self.fire(LifecycleState::Failed, None, Some(err.to_string()));
    }

    fn fire(
        &self,
        state: LifecycleState,
        payload: Option<serde_json::Value>,
        cause: Option<String>,
    ) {
        let event = {
            let mut inner = self.lock_inner();
            let core = &mut inner.core;
            // A closing container never looks like it regressed into a
            // waiting state.
            if state.is_waiting()
                && matches!(
                    core.last_state,
                    LifecycleState::Destroying | LifecycleState::Destroyed
                )
            {
                return;
            }
            core.last_state = state;
            core.touch();
            LifecycleEvent {
                module: self.module.clone(),
                state,
                payload,
                cause,
                at: self.ports.clock.now(),
            }
        };
        debug!(module = %self.module, state = ?state, "lifecycle transition");
        self.state_tx.send_replace(state);
        self.ports.sink.on_event(event);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::json;

    use crate::domain::template::{
        ActivationTemplate, ComponentKind, ComponentTemplate, ConfigRequirement,
        ExtensionRequirement, ReferenceRequirement, ServiceScope,
    };
    use crate::impls::{
        InMemoryConfigStore, InMemoryServiceRegistry, RecordingEventSink, SimpleComponentModel,
    };
    use crate::ports::clock::SystemClock;
    use crate::ports::component_model::Binding;
    use crate::ports::id_generator::UlidGenerator;
    use crate::ports::metadata::FixedTemplate;
    use crate::ports::service_registry::ServiceRegistration;
    use crate::domain::filter::Filter;

    use super::*;

    struct TestEnv {
        registry: Arc<InMemoryServiceRegistry>,
        config: Arc<InMemoryConfigStore>,
        model: Arc<SimpleComponentModel>,
        sink: Arc<RecordingEventSink>,
    }

    impl TestEnv {
        fn new() -> Self {
            Self {
                registry: InMemoryServiceRegistry::new(),
                config: InMemoryConfigStore::new(),
                model: SimpleComponentModel::new(),
                sink: RecordingEventSink::new(),
            }
        }

        fn container(&self, template: ModuleTemplate) -> Arc<Container> {
            Container::new(
                &FixedTemplate(template),
                Ports {
                    registry: self.registry.clone(),
                    config: self.config.clone(),
                    model: self.model.clone(),
                    sink: self.sink.clone(),
                    clock: Arc::new(SystemClock),
                    ids: Arc::new(UlidGenerator::new(SystemClock)),
                },
            )
            .unwrap()
        }

        fn provide(&self, ty: &str, ranking: i32) -> crate::ports::service_registry::ServiceHandle {
            self.registry.register(ServiceRegistration {
                types: vec![ty.to_string()],
                ranking,
                scope: ServiceScope::Singleton,
                properties: Properties::new(),
            })
        }

        fn provide_extension(&self, name: &str) -> crate::ports::service_registry::ServiceHandle {
            let mut properties = Properties::new();
            properties.insert("extension.name".into(), json!(name));
            self.registry.register(ServiceRegistration {
                types: vec!["berth.extension".to_string()],
                ranking: 0,
                scope: ServiceScope::Singleton,
                properties,
            })
        }

        fn published(&self, ty: &str) -> usize {
            self.registry
                .query(&Filter::parse(&format!("(objectClass={ty})")).unwrap())
                .len()
        }
    }

    fn greeter() -> ComponentTemplate {
        ComponentTemplate::new("greeter", ComponentKind::Single)
            .with_activation(ActivationTemplate::new(vec!["demo.Greeter".into()]))
    }

    #[tokio::test]
    async fn module_without_dependencies_publishes_immediately() {
        let env = TestEnv::new();
        let container = env.container(ModuleTemplate::new("demo").with_component(greeter()));

        container.start().wait().await.unwrap();

        assert_eq!(container.state(), LifecycleState::Created);
        assert_eq!(
            env.sink.states(),
            vec![
                LifecycleState::Creating,
                LifecycleState::Satisfied,
                LifecycleState::Created,
            ]
        );
        assert_eq!(env.published("demo.Greeter"), 1);

        let snapshot = container.snapshot();
        let component = snapshot.component("greeter").unwrap();
        assert!(component.active);
        assert!(component.activations[0].service_id.is_some());
    }

    #[tokio::test]
    async fn close_retracts_everything() {
        let env = TestEnv::new();
        let container = env.container(ModuleTemplate::new("demo").with_component(greeter()));
        container.start().wait().await.unwrap();

        container.close().unwrap();

        assert_eq!(container.state(), LifecycleState::Destroyed);
        assert_eq!(env.registry.service_count(), 0);
        assert_eq!(env.registry.watcher_count(), 0);
        assert_eq!(env.config.watch_count(), 0);
        assert_eq!(env.model.deployment_count(), 0);
        let states = env.sink.states();
        assert_eq!(
            &states[states.len() - 2..],
            &[LifecycleState::Destroying, LifecycleState::Destroyed]
        );
    }

    #[tokio::test]
    async fn reference_gates_publication_through_the_full_cycle() {
        let env = TestEnv::new();
        let template = ModuleTemplate::new("demo").with_component(
            greeter().with_reference(ReferenceRequirement::new("target", "demo.Target")),
        );
        let container = env.container(template);

        container.start().wait().await.unwrap();
        assert_eq!(container.state(), LifecycleState::WaitingForServices);
        assert_eq!(env.published("demo.Greeter"), 0);

        // Arrival satisfies the module.
        let first = env.provide("demo.Target", 0);
        assert_eq!(container.state(), LifecycleState::Created);
        assert_eq!(env.published("demo.Greeter"), 1);
        let snapshot = container.snapshot();
        assert_eq!(
            snapshot.component("greeter").unwrap().references[0].matches,
            vec![first.id]
        );

        // Departure retracts the publication and goes back to waiting.
        env.registry.unregister(first.id);
        assert_eq!(container.state(), LifecycleState::WaitingForServices);
        assert_eq!(env.published("demo.Greeter"), 0);

        // A replacement provider satisfies the module again.
        let second = env.provide("demo.Target", 10);
        assert_eq!(container.state(), LifecycleState::Created);
        assert_eq!(env.published("demo.Greeter"), 1);

        let reference_binding = env
            .model
            .all_bindings()
            .into_iter()
            .find_map(|binding| match binding {
                Binding::Reference { matches, .. } => Some(matches),
                _ => None,
            })
            .unwrap();
        assert_eq!(reference_binding[0].id, second.id);
    }

    #[tokio::test]
    async fn best_match_prefers_ranking_then_age() {
        let env = TestEnv::new();
        let template = ModuleTemplate::new("demo").with_component(
            greeter().with_reference(ReferenceRequirement::new("target", "demo.Target")),
        );
        let container = env.container(template);

        let low = env.provide("demo.Target", 1);
        let high_old = env.provide("demo.Target", 5);
        let high_new = env.provide("demo.Target", 5);
        container.start().wait().await.unwrap();

        assert_eq!(container.state(), LifecycleState::Created);
        let snapshot = container.snapshot();
        assert_eq!(
            snapshot.component("greeter").unwrap().references[0].matches,
            vec![high_old.id, high_new.id, low.id]
        );
    }

    #[tokio::test]
    async fn configuration_churn_rebuilds_exactly_once_per_cycle() {
        let env = TestEnv::new();
        let template = ModuleTemplate::new("demo").with_component(
            greeter().with_configuration(ConfigRequirement::required("demo.cfg")),
        );
        let container = env.container(template);

        container.start().wait().await.unwrap();
        assert_eq!(container.state(), LifecycleState::WaitingForConfigurations);

        let properties: Properties = [("greeting".to_string(), json!("hello"))]
            .into_iter()
            .collect();
        env.config.put("demo.cfg", properties.clone());
        assert_eq!(container.state(), LifecycleState::Created);
        assert_eq!(env.published("demo.Greeter"), 1);

        env.config.remove("demo.cfg");
        assert_eq!(container.state(), LifecycleState::WaitingForConfigurations);
        assert_eq!(env.published("demo.Greeter"), 0);

        env.config.put("demo.cfg", properties);
        assert_eq!(container.state(), LifecycleState::Created);
        assert_eq!(env.published("demo.Greeter"), 1);

        // One publication per resolution cycle, no extras.
        assert_eq!(
            env.sink.states(),
            vec![
                LifecycleState::Creating,
                LifecycleState::WaitingForConfigurations,
                LifecycleState::Satisfied,
                LifecycleState::Created,
                LifecycleState::WaitingForConfigurations,
                LifecycleState::Satisfied,
                LifecycleState::Created,
            ]
        );

        let config_binding = env
            .model
            .all_bindings()
            .into_iter()
            .find_map(|binding| match binding {
                Binding::Configuration { pid, properties, .. } if pid == "demo.cfg" => {
                    Some(properties)
                }
                _ => None,
            })
            .unwrap();
        assert_eq!(config_binding["greeting"], json!("hello"));
    }

    #[tokio::test]
    async fn optional_dependencies_never_block() {
        let env = TestEnv::new();
        let template = ModuleTemplate::new("demo").with_component(
            greeter()
                .with_configuration(ConfigRequirement::optional("demo.opt"))
                .with_reference(ReferenceRequirement::new("cache", "demo.Cache").optional()),
        );
        let container = env.container(template);

        container.start().wait().await.unwrap();

        assert_eq!(container.state(), LifecycleState::Created);
        assert_eq!(env.published("demo.Greeter"), 1);

        // A late optional configuration is captured without a rebuild.
        env.config
            .put("demo.opt", [("k".to_string(), json!("v"))].into_iter().collect());
        assert_eq!(container.state(), LifecycleState::Created);
        let snapshot = container.snapshot();
        assert!(
            snapshot.component("greeter").unwrap().configurations[0]
                .properties
                .is_some()
        );
    }

    #[tokio::test]
    async fn extensions_gate_the_whole_chain() {
        let env = TestEnv::new();
        let template = ModuleTemplate::new("demo")
            .with_extension(ExtensionRequirement::new("txlog"))
            .with_component(greeter());
        let container = env.container(template);

        container.start().wait().await.unwrap();
        assert_eq!(container.state(), LifecycleState::WaitingForExtensions);
        assert_eq!(env.model.deployment_count(), 0);

        let extension = env.provide_extension("txlog");
        assert_eq!(container.state(), LifecycleState::Created);
        assert_eq!(env.model.deployment_count(), 1);
        assert_eq!(env.published("demo.Greeter"), 1);

        // Extension departure tears the whole downstream chain down.
        env.registry.unregister(extension.id);
        assert_eq!(container.state(), LifecycleState::WaitingForExtensions);
        assert_eq!(env.published("demo.Greeter"), 0);
        assert_eq!(env.model.deployment_count(), 0);

        env.provide_extension("txlog");
        assert_eq!(container.state(), LifecycleState::Created);
        assert_eq!(env.published("demo.Greeter"), 1);
    }

    #[tokio::test]
    async fn extension_modified_out_of_the_filter_tears_down() {
        let env = TestEnv::new();
        let template = ModuleTemplate::new("demo")
            .with_extension(ExtensionRequirement::new("txlog"))
            .with_component(greeter());
        let container = env.container(template);

        let extension = env.provide_extension("txlog");
        container.start().wait().await.unwrap();
        assert_eq!(container.state(), LifecycleState::Created);

        // An update that drops the extension name takes the service out of
        // the filter without it ever departing.
        env.registry.update(extension.id, Properties::new());
        assert_eq!(container.state(), LifecycleState::WaitingForExtensions);
        assert_eq!(env.published("demo.Greeter"), 0);
        assert_eq!(env.model.deployment_count(), 0);

        // Restoring the name brings the module back.
        let mut properties = Properties::new();
        properties.insert("extension.name".into(), json!("txlog"));
        env.registry.update(extension.id, properties);
        assert_eq!(container.state(), LifecycleState::Created);
        assert_eq!(env.published("demo.Greeter"), 1);
    }

    #[tokio::test]
    async fn bad_descriptor_disables_only_that_component() {
        let env = TestEnv::new();
        let template = ModuleTemplate::new("demo")
            .with_component(
                ComponentTemplate::new("broken", ComponentKind::Single)
                    .with_reference(
                        ReferenceRequirement::new("dep", "demo.Dep").with_target("((("),
                    )
                    .with_activation(ActivationTemplate::new(vec!["demo.Broken".into()])),
            )
            .with_component(greeter());
        let container = env.container(template);

        container.start().wait().await.unwrap();

        assert_eq!(container.state(), LifecycleState::Created);
        assert_eq!(env.published("demo.Greeter"), 1);
        assert_eq!(env.published("demo.Broken"), 0);

        let snapshot = container.snapshot();
        let broken = snapshot.component("broken").unwrap();
        assert!(!broken.enabled);
        assert!(!broken.active);
        assert!(
            container
                .errors()
                .iter()
                .any(|e| matches!(e, BerthError::Descriptor { component, .. } if component == "broken"))
        );
    }

    #[tokio::test]
    async fn model_deploy_failure_reports_failed() {
        let env = TestEnv::new();
        env.model.set_fail_deploy(true);
        let container = env.container(ModuleTemplate::new("demo").with_component(greeter()));

        container.start().wait().await.unwrap();

        assert_eq!(container.state(), LifecycleState::Failed);
        assert!(!container.errors().is_empty());
        assert_eq!(env.registry.service_count(), 0);
    }

    #[tokio::test]
    async fn model_validation_failure_reports_failed() {
        let env = TestEnv::new();
        env.model.set_fail_validation(true);
        let container = env.container(ModuleTemplate::new("demo").with_component(greeter()));

        container.start().wait().await.unwrap();

        assert_eq!(container.state(), LifecycleState::Failed);
        assert!(
            container
                .errors()
                .iter()
                .any(|e| matches!(e, BerthError::PhaseOpen { .. }))
        );
        assert_eq!(env.registry.service_count(), 0);
    }

    #[tokio::test]
    async fn close_before_start_and_double_close_are_safe() {
        let env = TestEnv::new();
        let container = env.container(ModuleTemplate::new("demo").with_component(greeter()));

        container.close().unwrap();
        assert_eq!(container.state(), LifecycleState::Destroyed);

        // Starting after close resolves as a refusal.
        assert!(container.start().wait().await.is_err());

        // Second close is a no-op.
        let events_before = env.sink.events().len();
        container.close().unwrap();
        assert_eq!(env.sink.events().len(), events_before);
    }

    #[tokio::test]
    async fn rebuild_churn_does_not_leak_watchers() {
        let env = TestEnv::new();
        let template = ModuleTemplate::new("demo").with_component(
            greeter()
                .with_configuration(ConfigRequirement::required("demo.cfg"))
                .with_reference(ReferenceRequirement::new("target", "demo.Target")),
        );
        let container = env.container(template);
        env.provide("demo.Target", 0);
        let properties: Properties = [("k".to_string(), json!("v"))].into_iter().collect();

        container.start().wait().await.unwrap();
        for _ in 0..3 {
            env.config.put("demo.cfg", properties.clone());
            assert_eq!(container.state(), LifecycleState::Created);
            assert_eq!(env.registry.watcher_count(), 1);
            assert_eq!(env.config.watch_count(), 1);
            env.config.remove("demo.cfg");
            assert_eq!(container.state(), LifecycleState::WaitingForConfigurations);
            assert_eq!(env.registry.watcher_count(), 0);
        }

        container.close().unwrap();
        assert_eq!(env.registry.watcher_count(), 0);
        assert_eq!(env.config.watch_count(), 0);
    }

    #[tokio::test]
    async fn concurrent_closes_tear_down_once() {
        let env = TestEnv::new();
        let container = env.container(ModuleTemplate::new("demo").with_component(greeter()));
        container.start().wait().await.unwrap();

        let first = Arc::clone(&container);
        let second = Arc::clone(&container);
        let a = std::thread::spawn(move || first.close());
        let b = std::thread::spawn(move || second.close());
        a.join().unwrap().unwrap();
        b.join().unwrap().unwrap();

        let states = env.sink.states();
        assert_eq!(
            states
                .iter()
                .filter(|s| **s == LifecycleState::Destroying)
                .count(),
            1
        );
        assert_eq!(
            states
                .iter()
                .filter(|s| **s == LifecycleState::Destroyed)
                .count(),
            1
        );
    }

    #[tokio::test]
    async fn probes_observe_container_operations() {
        let env = TestEnv::new();
        let container = env.container(ModuleTemplate::new("demo").with_component(greeter()));

        let opens = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&opens);
        container.scheduler().add_probe(
            |op| op.is_open() && op.kind == OpKind::ContainerInit,
            move |_, result| {
                assert!(result.is_ok());
                counter.fetch_add(1, Ordering::SeqCst);
            },
        );

        container.start().wait().await.unwrap();
        assert_eq!(opens.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn change_count_advances_with_mutations() {
        let env = TestEnv::new();
        let container = env.container(ModuleTemplate::new("demo").with_component(greeter()));
        let before = container.change_count();
        container.start().wait().await.unwrap();
        let after_start = container.change_count();
        assert!(after_start > before);

        container.close().unwrap();
        assert!(container.change_count() > after_start);
    }

    #[tokio::test]
    async fn start_is_idempotent() {
        let env = TestEnv::new();
        let container = env.container(ModuleTemplate::new("demo").with_component(greeter()));
        container.start().wait().await.unwrap();
        container.start().wait().await.unwrap();
        assert_eq!(env.published("demo.Greeter"), 1);
        assert_eq!(
            env.sink
                .states()
                .iter()
                .filter(|s| **s == LifecycleState::Created)
                .count(),
            1
        );
    }
}
