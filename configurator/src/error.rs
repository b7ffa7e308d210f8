//! Configurator-specific error types

use std::time::Duration;
use thiserror::Error;

use crate::report::PhaseKind;

#[derive(Error, Debug)]
pub enum BootstrapError {
    #[error("Command failed on {node} (exit {exit_code:?}): {command}: {stderr}")]
    RemoteCommand {
        node: String,
        command: String,
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("Connection to {node} failed: {message}")]
    Connection { node: String, message: String },

    #[error("Failed to write {path} on {node}: {message}")]
    FileWrite {
        node: String,
        path: String,
        message: String,
    },

    #[error("Template '{template}' requires missing key '{key}'")]
    MissingTemplateKey { template: String, key: String },

    #[error("Firewall update failed for group {group}: {message}")]
    Firewall { group: String, message: String },

    #[error("Barrier expected {expected} jobs but {submitted} were submitted")]
    BarrierMismatch { expected: usize, submitted: usize },

    #[error("Phase {phase} failed on {} node(s): {}", nodes.len(), nodes.join(", "))]
    PhaseFailed { phase: PhaseKind, nodes: Vec<String> },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("{operation} timed out after {after:?}")]
    Timeout { operation: String, after: Duration },
}

impl BootstrapError {
    pub fn connection(node: impl Into<String>, message: impl Into<String>) -> Self {
        BootstrapError::Connection {
            node: node.into(),
            message: message.into(),
        }
    }

    pub fn firewall(group: impl Into<String>, message: impl Into<String>) -> Self {
        BootstrapError::Firewall {
            group: group.into(),
            message: message.into(),
        }
    }
}

pub type BootstrapResult<T> = Result<T, BootstrapError>;
