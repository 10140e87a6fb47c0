//! In-memory backends for testing
//!
//! These backends record every call and never touch a cluster or the
//! network, so the reconciler can be exercised in unit tests.

use async_trait::async_trait;
use pipewright_core::{ChartDescriptor, LoadedChart, Values};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use crate::actions::{InstallOptions, UpgradeOptions};
use crate::backend::{ChartEngine, ClusterApply, ReleaseRevision};
use crate::error::{KubeError, Result};

/// A recorded install or upgrade
#[derive(Debug, Clone)]
pub enum ApplyCall {
    Install {
        options: InstallOptions,
        chart: ChartDescriptor,
        chart_root: PathBuf,
        /// Whether the chart directory existed while applying
        chart_present: bool,
        values: Values,
    },
    Upgrade {
        options: UpgradeOptions,
        chart: ChartDescriptor,
        chart_root: PathBuf,
        chart_present: bool,
        values: Values,
    },
}

impl ApplyCall {
    pub fn chart(&self) -> &ChartDescriptor {
        match self {
            Self::Install { chart, .. } | Self::Upgrade { chart, .. } => chart,
        }
    }

    pub fn values(&self) -> &Values {
        match self {
            Self::Install { values, .. } | Self::Upgrade { values, .. } => values,
        }
    }

    pub fn chart_root(&self) -> &Path {
        match self {
            Self::Install { chart_root, .. } | Self::Upgrade { chart_root, .. } => chart_root,
        }
    }

    pub fn chart_present(&self) -> bool {
        match self {
            Self::Install { chart_present, .. } | Self::Upgrade { chart_present, .. } => {
                *chart_present
            }
        }
    }
}

/// What the mock history query answers
#[derive(Debug, Clone)]
pub enum MockHistory {
    NotFound,
    Revisions(Vec<ReleaseRevision>),
    Error(String),
}

/// In-memory cluster for testing
#[derive(Clone)]
pub struct MockClusterApply {
    history: Arc<RwLock<MockHistory>>,
    apply_error: Arc<RwLock<Option<String>>>,
    calls: Arc<RwLock<Vec<ApplyCall>>>,
    history_queries: Arc<RwLock<Vec<(String, String, usize)>>>,
}

impl MockClusterApply {
    /// A cluster where no release exists yet
    pub fn new() -> Self {
        Self::with_history(MockHistory::NotFound)
    }

    /// A cluster answering history queries with `history`
    pub fn with_history(history: MockHistory) -> Self {
        Self {
            history: Arc::new(RwLock::new(history)),
            apply_error: Arc::new(RwLock::new(None)),
            calls: Arc::new(RwLock::new(Vec::new())),
            history_queries: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// A cluster where the release exists at `revision`
    pub fn with_revision(revision: u32) -> Self {
        Self::with_history(MockHistory::Revisions(vec![ReleaseRevision::new(
            revision, "deployed",
        )]))
    }

    /// Make every install and upgrade fail with `message`
    pub fn fail_apply(&self, message: impl Into<String>) {
        *self.apply_error.write().unwrap() = Some(message.into());
    }

    /// Recorded applies
    pub fn calls(&self) -> Vec<ApplyCall> {
        self.calls.read().unwrap().clone()
    }

    /// Recorded history queries as (name, namespace, max)
    pub fn history_queries(&self) -> Vec<(String, String, usize)> {
        self.history_queries.read().unwrap().clone()
    }

    fn check_apply(&self, action: &str, name: &str) -> Result<()> {
        match self.apply_error.read().unwrap().as_ref() {
            Some(message) => Err(KubeError::Apply {
                action: action.to_string(),
                name: name.to_string(),
                message: message.clone(),
            }),
            None => Ok(()),
        }
    }
}

impl Default for MockClusterApply {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ClusterApply for MockClusterApply {
    async fn history(
        &self,
        name: &str,
        namespace: &str,
        max: usize,
    ) -> Result<Vec<ReleaseRevision>> {
        self.history_queries.write().unwrap().push((
            name.to_string(),
            namespace.to_string(),
            max,
        ));

        match &*self.history.read().unwrap() {
            MockHistory::NotFound => Err(KubeError::ReleaseNotFound {
                name: name.to_string(),
                namespace: namespace.to_string(),
            }),
            MockHistory::Revisions(revisions) => {
                Ok(revisions.iter().take(max).cloned().collect())
            }
            MockHistory::Error(message) => Err(KubeError::History {
                name: name.to_string(),
                message: message.clone(),
            }),
        }
    }

    async fn install(
        &self,
        chart: &LoadedChart,
        values: &Values,
        options: &InstallOptions,
    ) -> Result<()> {
        self.calls.write().unwrap().push(ApplyCall::Install {
            options: options.clone(),
            chart: chart.metadata.clone(),
            chart_root: chart.root.clone(),
            chart_present: chart.root.exists(),
            values: values.clone(),
        });
        self.check_apply("install", &options.name)
    }

    async fn upgrade(
        &self,
        chart: &LoadedChart,
        values: &Values,
        options: &UpgradeOptions,
    ) -> Result<()> {
        self.calls.write().unwrap().push(ApplyCall::Upgrade {
            options: options.clone(),
            chart: chart.metadata.clone(),
            chart_root: chart.root.clone(),
            chart_present: chart.root.exists(),
            values: values.clone(),
        });
        self.check_apply("upgrade", &options.name)
    }
}

/// In-memory chart engine for testing
///
/// `fetch` writes a minimal chart named after the requested chart and
/// `download_dependencies` creates an empty `charts/<name>/` directory per
/// declared dependency.
#[derive(Clone, Default)]
pub struct MockChartEngine {
    fetches: Arc<RwLock<Vec<(String, String, String)>>>,
    downloads: Arc<RwLock<Vec<PathBuf>>>,
}

impl MockChartEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Recorded fetches as (repository, chart, version)
    pub fn fetches(&self) -> Vec<(String, String, String)> {
        self.fetches.read().unwrap().clone()
    }

    /// Chart roots whose dependencies were downloaded
    pub fn downloads(&self) -> Vec<PathBuf> {
        self.downloads.read().unwrap().clone()
    }
}

#[async_trait]
impl ChartEngine for MockChartEngine {
    async fn fetch(
        &self,
        repository_url: &str,
        chart: &str,
        version: &str,
        dest: &Path,
    ) -> Result<PathBuf> {
        self.fetches.write().unwrap().push((
            repository_url.to_string(),
            chart.to_string(),
            version.to_string(),
        ));

        let root = dest.join(chart);
        std::fs::create_dir_all(root.join("templates"))?;
        ChartDescriptor::synthesize(chart, version, version, None)?.write_to(&root)?;
        Ok(root)
    }

    async fn download_dependencies(&self, chart: &LoadedChart) -> Result<()> {
        self.downloads.write().unwrap().push(chart.root.clone());
        for name in chart.dependency_names() {
            std::fs::create_dir_all(chart.root.join("charts").join(name))?;
        }
        Ok(())
    }
}
