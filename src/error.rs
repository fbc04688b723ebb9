//! Error taxonomy shared by every public operation.

use std::time::Duration;

use serde_json::{json, Value};
use thiserror::Error;

use crate::provider::ProviderError;

#[derive(Debug, Error)]
pub enum DevboxError {
    /// Missing or invalid provider credential.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Environment creation failed. Callers normally never see this: the
    /// provisioner turns it into a demo session.
    #[error("Failed to provision sandbox: {0}")]
    Provision(#[source] ProviderError),

    /// The project skeleton could not be written. The environment has been
    /// torn down.
    #[error("Sandbox setup failed: {0}")]
    Setup(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Failed to reconnect to sandbox {id}: {reason}")]
    Reconnect { id: String, reason: String },

    #[error("Install failed: {message}")]
    Install {
        message: String,
        packages: Vec<String>,
    },

    #[error("{operation} timed out after {}s", after.as_secs())]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// A command inside a live sandbox could not be run.
    #[error("Sandbox command failed: {0}")]
    Remote(#[source] ProviderError),
}

impl DevboxError {
    /// Stable machine-readable code for the error envelope.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "CONFIGURATION_ERROR",
            Self::Provision(_) => "PROVISION_ERROR",
            Self::Setup(_) => "SETUP_ERROR",
            Self::NotFound(_) => "SANDBOX_NOT_FOUND",
            Self::Reconnect { .. } => "RECONNECT_ERROR",
            Self::Install { .. } => "INSTALL_ERROR",
            Self::Timeout { .. } => "TIMEOUT",
            Self::InvalidRequest(_) => "INVALID_REQUEST",
            Self::Remote(_) => "REMOTE_ERROR",
        }
    }

    /// HTTP-like status code for the error envelope.
    pub fn status(&self) -> u16 {
        match self {
            Self::InvalidRequest(_) => 400,
            Self::NotFound(_) => 404,
            Self::Provision(_) | Self::Reconnect { .. } | Self::Remote(_) => 502,
            Self::Timeout { .. } => 504,
            Self::Configuration(_) | Self::Setup(_) | Self::Install { .. } => 500,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Provision(_)
                | Self::Setup(_)
                | Self::Reconnect { .. }
                | Self::Install { .. }
                | Self::Timeout { .. }
                | Self::Remote(_)
        )
    }

    /// Structured details for the error envelope.
    pub fn details(&self) -> Value {
        let mut details = match self {
            Self::Reconnect { id, reason } => json!({ "sandboxId": id, "reason": reason }),
            Self::Install { packages, .. } => json!({ "packages": packages }),
            Self::Timeout { operation, after } => {
                json!({ "operation": operation, "timeoutSecs": after.as_secs() })
            }
            Self::Provision(source) | Self::Remote(source) => {
                json!({ "reason": source.to_string() })
            }
            _ => json!({}),
        };
        details["retryable"] = Value::Bool(self.is_retryable());
        details
    }
}
