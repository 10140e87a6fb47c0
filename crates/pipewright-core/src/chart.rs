//! Chart sourcing
//!
//! A deployment target is one of four things: a chart in a remote Helm
//! repository, a local chart with a `templates/` directory, a directory of
//! plain manifests, or a single manifest file. The last two are "bundles"
//! and get turned into a minimal chart on the fly.

use std::path::{Path, PathBuf};

use crate::descriptor::ChartDescriptor;
use crate::error::{CoreError, Result};

/// Name of the directory that marks a proper local chart
pub const TEMPLATES_DIR: &str = "templates";

/// Name of the chart descriptor file
pub const CHART_FILE: &str = "Chart.yaml";

/// Name of the default values document of a chart
pub const VALUES_FILE: &str = "values.yaml";

/// How a release's chart is obtained
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChartSource {
    /// Chart pulled from a Helm repository
    Remote {
        repository_url: String,
        chart_name: String,
        version: String,
    },

    /// Local chart with a `templates/` directory
    LocalPackaged { path: PathBuf },

    /// Directory of manifests without chart structure
    LocalBundleDirectory { path: PathBuf },

    /// Single manifest file
    LocalBundleFile { path: PathBuf },
}

impl ChartSource {
    /// Classify a chart location
    ///
    /// A repository URL always means a remote chart. Otherwise the path is a
    /// packaged chart iff `<path>/templates` exists, and a bundle directory or
    /// file depending on what the path itself is.
    pub fn classify(repository_url: &str, chart_path: &Path, version: &str) -> Result<Self> {
        if !repository_url.is_empty() {
            return Ok(Self::Remote {
                repository_url: repository_url.to_string(),
                chart_name: chart_path.to_string_lossy().into_owned(),
                version: version.to_string(),
            });
        }

        if chart_path.join(TEMPLATES_DIR).is_dir() {
            return Ok(Self::LocalPackaged {
                path: chart_path.to_path_buf(),
            });
        }

        let metadata = std::fs::metadata(chart_path).map_err(|e| {
            CoreError::synthesis(format!(
                "cannot determine whether chart '{}' is a file or a directory: {}",
                chart_path.display(),
                e
            ))
        })?;

        if metadata.is_dir() {
            Ok(Self::LocalBundleDirectory {
                path: chart_path.to_path_buf(),
            })
        } else {
            Ok(Self::LocalBundleFile {
                path: chart_path.to_path_buf(),
            })
        }
    }

    /// Whether this is a proper local chart (the only kind that receives image overrides)
    pub fn is_local_chart(&self) -> bool {
        matches!(self, Self::LocalPackaged { .. })
    }

    /// Short name of the sourcing mode, for logs
    pub fn mode(&self) -> &'static str {
        match self {
            Self::Remote { .. } => "remote chart",
            Self::LocalPackaged { .. } => "local chart",
            Self::LocalBundleDirectory { .. } => "bundle directory",
            Self::LocalBundleFile { .. } => "bundle file",
        }
    }
}

/// A chart directory whose descriptor has been read
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedChart {
    /// Chart root directory
    pub root: PathBuf,

    /// Parsed `Chart.yaml`
    pub metadata: ChartDescriptor,
}

impl LoadedChart {
    /// Load a chart from a directory containing `Chart.yaml`
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let root = path.as_ref().to_path_buf();
        let chart_file = root.join(CHART_FILE);

        if !chart_file.exists() {
            return Err(CoreError::synthesis(format!(
                "unable to load chart: {} not found in {}",
                CHART_FILE,
                root.display()
            )));
        }

        let content = std::fs::read_to_string(&chart_file)?;
        let metadata: ChartDescriptor = serde_yaml::from_str(&content).map_err(|e| {
            CoreError::synthesis(format!(
                "unable to load chart: invalid {}: {}",
                chart_file.display(),
                e
            ))
        })?;

        Ok(Self { root, metadata })
    }

    /// Names of the declared dependencies
    pub fn dependency_names(&self) -> Vec<String> {
        self.metadata
            .dependencies
            .iter()
            .filter_map(|dep| dep.get("name").and_then(|n| n.as_str()))
            .map(str::to_string)
            .collect()
    }

    /// Declared dependencies that have no counterpart in `charts/`
    ///
    /// A dependency is present when `charts/<name>/` or a
    /// `charts/<name>-<version>.tgz` archive exists.
    pub fn missing_dependencies(&self) -> Vec<String> {
        let charts_dir = self.root.join("charts");
        let archives: Vec<String> = std::fs::read_dir(&charts_dir)
            .map(|entries| {
                entries
                    .filter_map(|e| e.ok())
                    .map(|e| e.file_name().to_string_lossy().into_owned())
                    .collect()
            })
            .unwrap_or_default();

        self.dependency_names()
            .into_iter()
            .filter(|name| {
                let unpacked = charts_dir.join(name).is_dir();
                let packed = archives
                    .iter()
                    .any(|f| f.starts_with(&format!("{}-", name)) && f.ends_with(".tgz"));
                !unpacked && !packed
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_repository_means_remote() {
        let source = ChartSource::classify("https://charts.bitnami.com", Path::new("redis"), "17.0.0")
            .unwrap();
        assert_eq!(
            source,
            ChartSource::Remote {
                repository_url: "https://charts.bitnami.com".to_string(),
                chart_name: "redis".to_string(),
                version: "17.0.0".to_string(),
            }
        );
        assert!(!source.is_local_chart());
    }

    #[test]
    fn test_repository_wins_over_local_templates() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("templates")).unwrap();

        let source = ChartSource::classify("https://example.com/charts", dir.path(), "1.0.0").unwrap();
        assert!(matches!(source, ChartSource::Remote { .. }));
    }

    #[test]
    fn test_values_only_directory_is_bundle() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("values.yaml"), "replicas: 1\n").unwrap();

        let source = ChartSource::classify("", dir.path(), "0.0.0").unwrap();
        assert_eq!(
            source,
            ChartSource::LocalBundleDirectory {
                path: dir.path().to_path_buf()
            }
        );
        assert!(!source.is_local_chart());

        fs::create_dir(dir.path().join("templates")).unwrap();
        let source = ChartSource::classify("", dir.path(), "0.0.0").unwrap();
        assert_eq!(
            source,
            ChartSource::LocalPackaged {
                path: dir.path().to_path_buf()
            }
        );
        assert!(source.is_local_chart());
    }

    #[test]
    fn test_templates_file_is_not_a_chart() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("templates"), "kind: ConfigMap\n").unwrap();

        let source = ChartSource::classify("", dir.path(), "0.0.0").unwrap();
        assert_eq!(
            source,
            ChartSource::LocalBundleDirectory {
                path: dir.path().to_path_buf()
            }
        );
    }

    #[test]
    fn test_single_file_is_bundle_file() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("deployment.yaml");
        fs::write(&file, "kind: Deployment\n").unwrap();

        let source = ChartSource::classify("", &file, "0.0.0").unwrap();
        assert_eq!(source, ChartSource::LocalBundleFile { path: file });
    }

    #[test]
    fn test_classification_is_stable() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("svc.yaml"), "kind: Service\n").unwrap();

        let first = ChartSource::classify("", dir.path(), "0.0.0").unwrap();
        let second = ChartSource::classify("", dir.path(), "0.0.0").unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_missing_path_fails() {
        let dir = TempDir::new().unwrap();
        let err = ChartSource::classify("", &dir.path().join("nope"), "0.0.0").unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::SynthesisFailed);
    }

    #[test]
    fn test_load_requires_chart_file() {
        let dir = TempDir::new().unwrap();
        let err = LoadedChart::load(dir.path()).unwrap_err();
        assert!(err.to_string().contains("Chart.yaml"));
    }

    #[test]
    fn test_missing_dependencies() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("Chart.yaml"),
            r#"apiVersion: v2
type: application
name: web
version: 0.0.0
appVersion: 1.0.0
dependencies:
  - name: redis
    version: 17.0.0
    repository: https://charts.bitnami.com/bitnami
  - name: postgresql
    version: 12.0.0
    repository: https://charts.bitnami.com/bitnami
  - name: common
    version: 2.0.0
    repository: https://charts.bitnami.com/bitnami
"#,
        )
        .unwrap();
        let charts = dir.path().join("charts");
        fs::create_dir_all(charts.join("postgresql")).unwrap();
        fs::write(charts.join("common-2.0.0.tgz"), b"archive").unwrap();

        let chart = LoadedChart::load(dir.path()).unwrap();
        assert_eq!(chart.dependency_names(), vec!["redis", "postgresql", "common"]);
        assert_eq!(chart.missing_dependencies(), vec!["redis"]);
    }
}
