//! Release placeholders in value files
//!
//! Value files may mention the release they are deployed as, either in Go
//! template form (`{{ .Name }}`) or plain (`{{ Namespace }}`). Anything
//! other than `Name` and `Namespace` is an error.
//!
//! Only text containing `{{` is rendered. Such text is a full template, so
//! `{%` and `{#` in it are template syntax as well.

use minijinja::{Environment, UndefinedBehavior, context};
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;
use tracing::debug;

use crate::error::{CoreError, Result};

/// `{{ .Field` / `{{- .Field` become `{{ Field` / `{{- Field`
static GO_FIELD_ACCESS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\{\{-?\s*)\.([A-Za-z_])").expect("valid regex"));

/// Release identity exposed to value files
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseIdentity {
    pub name: String,
    pub namespace: String,
}

impl ReleaseIdentity {
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
        }
    }

    /// Substitute placeholders in a string
    pub fn render(&self, source: &str) -> Result<String> {
        if !has_markup(source) {
            return Ok(source.to_string());
        }

        let source = GO_FIELD_ACCESS.replace_all(source, "$1$2");

        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        env.set_keep_trailing_newline(true);

        env.render_str(
            &source,
            context! {
                Name => &self.name,
                Namespace => &self.namespace,
            },
        )
        .map_err(|e| CoreError::synthesis(format!("cannot substitute placeholders: {}", e)))
    }

    /// Substitute placeholders in a file, rewriting it in place
    pub fn render_file(&self, path: &Path) -> Result<()> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            CoreError::synthesis(format!("cannot read values file {}: {}", path.display(), e))
        })?;

        if !has_markup(&content) {
            return Ok(());
        }

        let rendered = self.render(&content).map_err(|e| {
            CoreError::synthesis(format!("{}: {}", path.display(), e))
        })?;
        std::fs::write(path, rendered).map_err(|e| {
            CoreError::synthesis(format!("cannot write values file {}: {}", path.display(), e))
        })?;

        debug!(file = %path.display(), "substituted release placeholders");
        Ok(())
    }
}

fn has_markup(source: &str) -> bool {
    source.contains("{{")
}
