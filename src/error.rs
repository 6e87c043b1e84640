//! Central error types for the failover operator
//!
//! Uses `thiserror` for ergonomic, type-safe error handling with
//! automatic `Display` and `Error` trait implementations.

use thiserror::Error;

/// Central error type for the failover operator
#[derive(Error, Debug)]
pub enum Error {
    /// Kubernetes API error from kube-rs
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    /// Malformed label or field selector
    #[error("Invalid selector {selector:?}: {reason}")]
    InvalidSelector { selector: String, reason: String },

    /// Configuration validation error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// The node selector matched nothing
    #[error("No nodes found with selector {0:?}")]
    NoNodesMatched(String),

    /// Resource not found in the cluster
    #[error("Resource not found: {kind}/{name} in namespace {namespace}")]
    NotFound {
        kind: String,
        name: String,
        namespace: String,
    },

    /// Store failure that did not come from the API server
    #[error("Cluster store error: {0}")]
    StoreError(String),

    /// Failed to read a local file (config, service account namespace)
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Config file could not be parsed
    #[error("Config file parse error: {0}")]
    TomlError(#[from] toml::de::Error),
}

/// Result type alias for operator operations
pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    /// Errors caused by operator misconfiguration rather than cluster state
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Error::InvalidSelector { .. }
                | Error::ConfigError(_)
                | Error::NoNodesMatched(_)
                | Error::TomlError(_)
        )
    }

    /// Whether this error means the requested object does not exist
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::NotFound { .. } => true,
            Error::KubeError(kube::Error::Api(resp)) => resp.code == 404,
            _ => false,
        }
    }

    /// Short label used for metrics and log fields
    pub fn kind(&self) -> &'static str {
        match self {
            Error::KubeError(_) => "kube",
            Error::InvalidSelector { .. } => "selector",
            Error::ConfigError(_) => "config",
            Error::NoNodesMatched(_) => "no_nodes",
            Error::NotFound { .. } => "not_found",
            Error::StoreError(_) => "store",
            Error::IoError(_) => "io",
            Error::TomlError(_) => "toml",
        }
    }
}
