//! Error types for pipewright-kube

use pipewright_core::{CoreError, ErrorKind};
use thiserror::Error;

/// Result type for pipewright-kube operations
pub type Result<T> = std::result::Result<T, KubeError>;

/// Errors that can occur while reconciling a release
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum KubeError {
    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    Api(#[from] kube::Error),

    /// Release has no recorded history
    #[error("release '{name}' not found in namespace '{namespace}'")]
    ReleaseNotFound { name: String, namespace: String },

    /// Release history could not be read
    #[error("cannot read history of release '{name}': {message}")]
    History { name: String, message: String },

    /// Chart fetch or dependency download failed
    #[error("chart error: {0}")]
    Chart(String),

    /// Install or upgrade failed
    #[error("{action} of release '{name}' failed: {message}")]
    Apply {
        action: String,
        name: String,
        message: String,
    },

    /// Error raised by pipewright-core
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_yaml::Error> for KubeError {
    fn from(e: serde_yaml::Error) -> Self {
        KubeError::Serialization(e.to_string())
    }
}

impl From<serde_json::Error> for KubeError {
    fn from(e: serde_json::Error) -> Self {
        KubeError::Serialization(e.to_string())
    }
}

impl KubeError {
    /// Check if the release has no history
    pub fn is_release_not_found(&self) -> bool {
        matches!(self, KubeError::ReleaseNotFound { .. })
    }

    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Api(_) | Self::ReleaseNotFound { .. } | Self::History { .. } | Self::Chart(_) => {
                ErrorKind::LookupFailed
            }
            Self::Apply { .. } => ErrorKind::ApplyFailed,
            Self::Core(e) => e.kind(),
            Self::Serialization(_) | Self::Io(_) => ErrorKind::SynthesisFailed,
            Self::InvalidConfig(_) => ErrorKind::ConfigurationMissing,
        }
    }
}
