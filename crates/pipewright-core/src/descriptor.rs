//! Synthesized chart descriptors (`Chart.yaml`)

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use std::path::{Path, PathBuf};

use crate::chart::CHART_FILE;
use crate::error::{CoreError, Result};

/// Optional sidecar listing chart dependencies, next to the chart sources
pub const DEPENDENCIES_FILE: &str = "dependencies.yaml";

/// Chart API version written into synthesized descriptors
pub const CHART_API_VERSION: &str = "v2";

/// Version used for bundles when the caller does not provide one
pub const BUNDLE_VERSION: &str = "0.0.0";

/// Chart metadata as read from and written to `Chart.yaml`
///
/// Only the fields pipewright writes are modelled; anything else in a
/// loaded `Chart.yaml` is ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartDescriptor {
    pub api_version: String,

    #[serde(rename = "type", default = "default_chart_type")]
    pub chart_type: String,

    pub name: String,

    #[serde(deserialize_with = "scalar_string")]
    pub version: String,

    #[serde(default, deserialize_with = "scalar_string")]
    pub app_version: String,

    /// Dependency declarations, kept verbatim
    #[serde(default)]
    pub dependencies: Vec<serde_yaml::Value>,
}

fn default_chart_type() -> String {
    "application".to_string()
}

/// Accept unquoted numbers (`appVersion: 1.16`) as strings
fn scalar_string<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_yaml::Value::deserialize(deserializer)? {
        serde_yaml::Value::String(s) => Ok(s),
        serde_yaml::Value::Number(n) => Ok(n.to_string()),
        serde_yaml::Value::Bool(b) => Ok(b.to_string()),
        serde_yaml::Value::Null => Ok(String::new()),
        other => Err(D::Error::custom(format!(
            "expected a scalar, found {:?}",
            other
        ))),
    }
}

impl ChartDescriptor {
    /// Build a descriptor for an application chart
    ///
    /// `version` must be SemVer. Dependencies are read from
    /// `dependencies.yaml` in `sidecar_dir` when that file exists.
    pub fn synthesize(
        name: &str,
        version: &str,
        app_version: &str,
        sidecar_dir: Option<&Path>,
    ) -> Result<Self> {
        semver::Version::parse(version).map_err(|e| {
            CoreError::format(format!("chart version '{}' is not valid SemVer: {}", version, e))
        })?;

        let dependencies = match sidecar_dir {
            Some(dir) => load_dependencies(&dir.join(DEPENDENCIES_FILE))?,
            None => Vec::new(),
        };

        Ok(Self {
            api_version: CHART_API_VERSION.to_string(),
            chart_type: default_chart_type(),
            name: name.to_string(),
            version: version.to_string(),
            app_version: app_version.to_string(),
            dependencies,
        })
    }

    /// Render as YAML
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Write `Chart.yaml` into `dir`, replacing any existing one
    pub fn write_to(&self, dir: &Path) -> Result<PathBuf> {
        let path = dir.join(CHART_FILE);
        let content = self.to_yaml()?;
        std::fs::write(&path, content).map_err(|e| {
            CoreError::synthesis(format!("cannot write {}: {}", path.display(), e))
        })?;
        Ok(path)
    }
}

fn load_dependencies(path: &Path) -> Result<Vec<serde_yaml::Value>> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let content = std::fs::read_to_string(path).map_err(|e| {
        CoreError::synthesis(format!(
            "cannot read dependencies file {}: {}",
            path.display(),
            e
        ))
    })?;

    let dependencies: Option<Vec<serde_yaml::Value>> =
        serde_yaml::from_str(&content).map_err(|e| {
            CoreError::synthesis(format!(
                "cannot parse dependencies file {}: {}",
                path.display(),
                e
            ))
        })?;

    Ok(dependencies.unwrap_or_default())
}
