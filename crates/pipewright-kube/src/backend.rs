//! Collaborator interfaces
//!
//! The reconciler never talks to Helm, the cluster or the filesystem
//! merge logic directly. Each of them sits behind one of these traits so
//! the decision logic can be exercised with in-memory backends.

use async_trait::async_trait;
use pipewright_core::{LoadedChart, Values};
use std::path::{Path, PathBuf};

use crate::actions::{InstallOptions, UpgradeOptions};
use crate::error::Result;

/// One entry of a release's history, newest first
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseRevision {
    pub revision: u32,
    pub status: String,
}

impl ReleaseRevision {
    pub fn new(revision: u32, status: impl Into<String>) -> Self {
        Self {
            revision,
            status: status.into(),
        }
    }
}

/// Chart retrieval and dependency management
#[async_trait]
pub trait ChartEngine: Send + Sync {
    /// Pull `chart` at `version` from `repository_url` and unpack it below
    /// `dest`, returning the chart root
    async fn fetch(
        &self,
        repository_url: &str,
        chart: &str,
        version: &str,
        dest: &Path,
    ) -> Result<PathBuf>;

    /// Load a chart directory
    fn load(&self, path: &Path) -> Result<LoadedChart> {
        Ok(LoadedChart::load(path)?)
    }

    /// Declared dependencies missing from `charts/`
    fn missing_dependencies(&self, chart: &LoadedChart) -> Vec<String> {
        chart.missing_dependencies()
    }

    /// Download the declared dependencies into `charts/`
    async fn download_dependencies(&self, chart: &LoadedChart) -> Result<()>;
}

/// Release history and the two apply primitives
#[async_trait]
pub trait ClusterApply: Send + Sync {
    /// Up to `max` revisions of a release, newest first
    ///
    /// A release that was never installed yields
    /// [`KubeError::ReleaseNotFound`](crate::KubeError::ReleaseNotFound).
    async fn history(&self, name: &str, namespace: &str, max: usize)
    -> Result<Vec<ReleaseRevision>>;

    async fn install(
        &self,
        chart: &LoadedChart,
        values: &Values,
        options: &InstallOptions,
    ) -> Result<()>;

    async fn upgrade(
        &self,
        chart: &LoadedChart,
        values: &Values,
        options: &UpgradeOptions,
    ) -> Result<()>;
}

/// Merge of value documents
pub trait ValuesMerge: Send + Sync {
    /// Merge the files in order, later files winning
    fn merge_files(&self, files: &[PathBuf]) -> Result<Values>;
}

/// [`ValuesMerge`] using the deep merge of [`Values`]
#[derive(Debug, Clone, Copy, Default)]
pub struct YamlValuesMerge;

impl ValuesMerge for YamlValuesMerge {
    fn merge_files(&self, files: &[PathBuf]) -> Result<Values> {
        let documents = files
            .iter()
            .map(Values::from_file)
            .collect::<pipewright_core::Result<Vec<_>>>()?;
        Ok(Values::merge_all(documents))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_yaml_merge_precedence() {
        let dir = TempDir::new().unwrap();
        let base = dir.path().join("values.yaml");
        let prod = dir.path().join("values-prod.yaml");
        std::fs::write(&base, "replicas: 1\nimage:\n  pullPolicy: IfNotPresent\n").unwrap();
        std::fs::write(&prod, "replicas: 3\n").unwrap();

        let merged = YamlValuesMerge.merge_files(&[base, prod]).unwrap();
        assert_eq!(merged.get("replicas").unwrap(), 3);
        assert_eq!(merged.get("image.pullPolicy").unwrap(), "IfNotPresent");
    }

    #[test]
    fn test_yaml_merge_of_nothing_is_empty() {
        assert!(YamlValuesMerge.merge_files(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_yaml_merge_reports_bad_file() {
        let dir = TempDir::new().unwrap();
        let bad = dir.path().join("broken.yaml");
        std::fs::write(&bad, "a: [1, 2\n").unwrap();

        let err = YamlValuesMerge.merge_files(&[bad]).unwrap_err();
        assert!(err.to_string().contains("broken.yaml"));
    }
}
