//! Controller-specific error types.
//!
//! Failures that stop the whole run. Per-claim reservation failures are
//! reported in the summary instead.

use ip_store::StoreError;
use network_model::NetworkError;
use thiserror::Error;

/// Errors that can occur in the IP Reservation Controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Reading a configuration file failed
    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// A configuration file is not valid YAML for its schema
    #[error("Failed to parse {path}: {source}")]
    Yaml {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    /// Summary serialization failed
    #[error("Failed to render summary: {0}")]
    Json(#[from] serde_json::Error),

    /// IP store error
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Network declaration error
    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    /// Some claims were rejected
    #[error("{0} claim(s) failed")]
    ClaimsFailed(usize),
}
