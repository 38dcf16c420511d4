use std::fmt;

use serde::{Deserialize, Serialize};

/// Direction of a lifecycle operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpMode {
    Open,
    Close,
}

/// What part of the container an operation targets. One kind per phase,
/// plus `Container` for whole-container open/close.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpKind {
    Container,
    ContainerInit,
    ExtensionLoading,
    ContainerBootstrap,
    ConfigurationBinding,
    ReferenceBinding,
    Publication,
}

impl OpKind {
    pub fn label(self) -> &'static str {
        match self {
            OpKind::Container => "container",
            OpKind::ContainerInit => "container_init",
            OpKind::ExtensionLoading => "extension_loading",
            OpKind::ContainerBootstrap => "container_bootstrap",
            OpKind::ConfigurationBinding => "configuration_binding",
            OpKind::ReferenceBinding => "reference_binding",
            OpKind::Publication => "publication",
        }
    }
}

/// Correlation token for scheduled work. Carries no behaviour of its own;
/// probes and logs match on it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Op {
    pub mode: OpMode,
    pub kind: OpKind,
    pub name: String,
}

impl Op {
    pub fn of(mode: OpMode, kind: OpKind, name: impl Into<String>) -> Self {
        Self {
            mode,
            kind,
            name: name.into(),
        }
    }

    pub fn is_open(&self) -> bool {
        self.mode == OpMode::Open
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mode = match self.mode {
            OpMode::Open => "open",
            OpMode::Close => "close",
        };
        write!(f, "{mode}:{}[{}]", self.kind.label(), self.name)
    }
}
