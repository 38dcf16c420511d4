//! Demo driver: wires a container against the in-memory ports and walks
//! it through a full lifecycle (waiting, satisfied, churn, teardown).

use std::sync::Arc;

use serde_json::json;
use tracing::info;

use berth_core::domain::Properties;
use berth_core::domain::template::{
    ActivationTemplate, ComponentKind, ComponentTemplate, ConfigRequirement, ModuleTemplate,
    ReferenceRequirement, ServiceScope,
};
use berth_core::engine::{Container, Ports};
use berth_core::impls::{
    InMemoryConfigStore, InMemoryServiceRegistry, SimpleComponentModel, TracingEventSink,
};
use berth_core::ports::clock::SystemClock;
use berth_core::ports::id_generator::UlidGenerator;
use berth_core::ports::metadata::FixedTemplate;
use berth_core::ports::service_registry::{ServiceRegistration, ServiceRegistry};

fn demo_template() -> ModuleTemplate {
    ModuleTemplate::new("demo").with_component(
        ComponentTemplate::new("greeter", ComponentKind::Single)
            .with_configuration(ConfigRequirement::required("demo.greeter"))
            .with_reference(ReferenceRequirement::new("logger", "demo.Logger"))
            .with_activation(ActivationTemplate::new(vec!["demo.Greeter".into()])),
    )
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let registry = InMemoryServiceRegistry::new();
    let config = InMemoryConfigStore::new();
    let model = SimpleComponentModel::new();

    let container = Container::new(
        &FixedTemplate(demo_template()),
        Ports {
            registry: registry.clone(),
            config: config.clone(),
            model: model.clone(),
            sink: Arc::new(TracingEventSink),
            clock: Arc::new(SystemClock),
            ids: Arc::new(UlidGenerator::new(SystemClock)),
        },
    )?;

    info!(container = %container.id(), "starting");
    container.start().wait().await?;
    info!(state = ?container.state(), "after start");

    let mut greeter_config = Properties::new();
    greeter_config.insert("greeting".into(), json!("hello"));
    config.put("demo.greeter", greeter_config);
    info!(state = ?container.state(), "after configuration arrived");

    let logger = registry.register(ServiceRegistration {
        types: vec!["demo.Logger".into()],
        ranking: 0,
        scope: ServiceScope::Singleton,
        properties: Properties::new(),
    });
    info!(state = ?container.state(), "after logger arrived");

    println!(
        "{}",
        serde_json::to_string_pretty(&container.snapshot())?
    );

    // Churn: the bound logger goes away and a replacement shows up.
    registry.unregister(logger.id);
    info!(state = ?container.state(), "after logger departed");
    registry.register(ServiceRegistration {
        types: vec!["demo.Logger".into()],
        ranking: 5,
        scope: ServiceScope::Singleton,
        properties: Properties::new(),
    });
    info!(state = ?container.state(), "after replacement logger arrived");

    container.close()?;
    info!(state = ?container.state(), services = registry.service_count(), "after close");
    Ok(())
}
