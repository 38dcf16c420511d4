//! The phase chain, upstream to downstream: init, extension loading,
//! bootstrap, configuration binding, reference binding, publication.

mod bootstrap;
mod config_binding;
mod extension;
mod init;
mod publication;
mod reference_binding;

use std::sync::Arc;

pub use bootstrap::BootstrapPhase;
pub use config_binding::ConfigBindingPhase;
pub use extension::ExtensionPhase;
pub use init::InitPhase;
pub use publication::PublicationPhase;
pub use reference_binding::ReferenceBindingPhase;

use crate::domain::template::ModuleTemplate;

use super::phase::BoxedPhase;

/// Builds the static head of the chain. Reference binding and publication
/// are created dynamically by their upstream phases.
pub fn build_chain(module: &str, template: &Arc<ModuleTemplate>) -> BoxedPhase {
    let config = ConfigBindingPhase::new(module, Arc::clone(template));
    let bootstrap = BootstrapPhase::new(module, Arc::clone(template), Box::new(config));
    let extension = ExtensionPhase::new(module, Arc::clone(template), Box::new(bootstrap));
    Box::new(InitPhase::new(module, Arc::clone(template), Box::new(extension)))
}
