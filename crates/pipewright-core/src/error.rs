//! Core error types

use thiserror::Error;

/// Coarse classification shared by every pipewright error type
///
/// The CLI maps each kind to a distinct exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A required context field or credential is absent
    ConfigurationMissing,
    /// A tag, branch or version string failed validation
    FormatInvalid,
    /// A remote tag, history or dependency operation failed
    LookupFailed,
    /// A filesystem operation for manifest or bundle construction failed
    SynthesisFailed,
    /// An install or upgrade call failed or timed out
    ApplyFailed,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::ConfigurationMissing => "configuration missing",
            Self::FormatInvalid => "format invalid",
            Self::LookupFailed => "lookup failed",
            Self::SynthesisFailed => "synthesis failed",
            Self::ApplyFailed => "apply failed",
        };
        write!(f, "{}", s)
    }
}

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("{message}")]
    ConfigurationMissing { message: String },

    #[error("{message}")]
    FormatInvalid { message: String },

    #[error("{message}")]
    LookupFailed { message: String },

    #[error("{message}")]
    SynthesisFailed { message: String },

    #[error("Failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Values merge error: {message}")]
    ValuesMerge { message: String },
}

impl CoreError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::ConfigurationMissing {
            message: message.into(),
        }
    }

    pub fn format(message: impl Into<String>) -> Self {
        Self::FormatInvalid {
            message: message.into(),
        }
    }

    pub fn lookup(message: impl Into<String>) -> Self {
        Self::LookupFailed {
            message: message.into(),
        }
    }

    pub fn synthesis(message: impl Into<String>) -> Self {
        Self::SynthesisFailed {
            message: message.into(),
        }
    }

    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ConfigurationMissing { .. } => ErrorKind::ConfigurationMissing,
            Self::FormatInvalid { .. } => ErrorKind::FormatInvalid,
            Self::LookupFailed { .. } => ErrorKind::LookupFailed,
            Self::SynthesisFailed { .. }
            | Self::YamlParse(_)
            | Self::JsonParse(_)
            | Self::Io(_)
            | Self::ValuesMerge { .. } => ErrorKind::SynthesisFailed,
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
