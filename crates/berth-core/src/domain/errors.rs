use thiserror::Error;

use super::filter::FilterError;
use super::op::Op;

/// Engine error taxonomy. Descriptor errors disable one component;
/// phase-open errors drive the container to the failed state.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BerthError {
    #[error("component '{component}': {detail}")]
    Descriptor { component: String, detail: String },

    #[error("dependency resolution failed: {0}")]
    Resolution(String),

    #[error("{op} failed: {detail}")]
    PhaseOpen { op: Op, detail: String },

    #[error(transparent)]
    Filter(#[from] FilterError),

    #[error("metadata provider failed: {0}")]
    Metadata(String),

    #[error("component model rejected the module: {0}")]
    Model(String),

    #[error("container is closing")]
    Closing,

    #[error("{0}")]
    Other(String),
}

impl BerthError {
    pub fn descriptor(component: impl Into<String>, detail: impl std::fmt::Display) -> Self {
        BerthError::Descriptor {
            component: component.into(),
            detail: detail.to_string(),
        }
    }
}
