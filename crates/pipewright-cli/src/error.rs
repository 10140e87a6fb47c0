//! CLI error types with exit code handling
//!
//! Library errors are folded into [`CliError`] by their [`ErrorKind`], so
//! every failure of the pipeline ends with the exit code of its kind.

use miette::Diagnostic;
use pipewright_core::{CoreError, ErrorKind};
use pipewright_kube::KubeError;
use pipewright_repo::RepoError;
use thiserror::Error;

use crate::exit_codes;

#[derive(Error, Debug, Diagnostic, Clone)]
pub enum CliError {
    #[error("Configuration missing: {message}")]
    #[diagnostic(code(pipewright::cli::configuration))]
    Configuration {
        message: String,
        #[help]
        help: Option<String>,
    },

    #[error("Invalid format: {message}")]
    #[diagnostic(code(pipewright::cli::format))]
    Format {
        message: String,
        #[help]
        help: Option<String>,
    },

    #[error("Lookup failed: {message}")]
    #[diagnostic(code(pipewright::cli::lookup))]
    Lookup {
        message: String,
        #[help]
        help: Option<String>,
    },

    #[error("Chart synthesis failed: {message}")]
    #[diagnostic(code(pipewright::cli::synthesis))]
    Synthesis {
        message: String,
        #[help]
        help: Option<String>,
    },

    #[error("Release apply failed: {message}")]
    #[diagnostic(code(pipewright::cli::apply))]
    Apply {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// The image builder failed
    #[error("Build failed: {message}")]
    #[diagnostic(code(pipewright::cli::build))]
    Build { message: String },

    /// Arguments that clap accepted but that cannot be used
    #[error("Invalid usage: {message}")]
    #[diagnostic(code(pipewright::cli::usage))]
    Usage {
        message: String,
        #[help]
        help: Option<String>,
    },

    #[error("IO error: {message}")]
    #[diagnostic(code(pipewright::cli::io))]
    Io { message: String },
}

impl CliError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Configuration { .. } => exit_codes::CONFIGURATION_ERROR,
            CliError::Format { .. } => exit_codes::FORMAT_ERROR,
            CliError::Lookup { .. } => exit_codes::LOOKUP_ERROR,
            CliError::Synthesis { .. } => exit_codes::SYNTHESIS_ERROR,
            CliError::Apply { .. } => exit_codes::APPLY_ERROR,
            CliError::Usage { .. } => exit_codes::USAGE_ERROR,
            CliError::Build { .. } | CliError::Io { .. } => exit_codes::ERROR,
        }
    }

    /// Wrap a library error of the given kind
    pub fn from_kind(kind: ErrorKind, message: impl Into<String>) -> Self {
        let message = message.into();
        match kind {
            ErrorKind::ConfigurationMissing => Self::Configuration {
                message,
                help: Some(
                    "Check the CI variables and flags used by the templates of this job".into(),
                ),
            },
            ErrorKind::FormatInvalid => Self::Format {
                message,
                help: Some("Tags and chart versions must look like MAJOR.MINOR.PATCH".into()),
            },
            ErrorKind::LookupFailed => Self::Lookup {
                message,
                help: None,
            },
            ErrorKind::SynthesisFailed => Self::Synthesis {
                message,
                help: None,
            },
            ErrorKind::ApplyFailed => Self::Apply {
                message,
                help: Some("Inspect the release with `helm history` and `helm status`".into()),
            },
        }
    }

    /// Create a usage error with help text
    pub fn usage(message: impl Into<String>, help: impl Into<String>) -> Self {
        Self::Usage {
            message: message.into(),
            help: Some(help.into()),
        }
    }

    pub fn build(message: impl Into<String>) -> Self {
        Self::Build {
            message: message.into(),
        }
    }
}

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        Self::from_kind(err.kind(), err.to_string())
    }
}

impl From<KubeError> for CliError {
    fn from(err: KubeError) -> Self {
        Self::from_kind(err.kind(), err.to_string())
    }
}

impl From<RepoError> for CliError {
    fn from(err: RepoError) -> Self {
        Self::from_kind(err.kind(), err.to_string())
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        CliError::Io {
            message: err.to_string(),
        }
    }
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;
