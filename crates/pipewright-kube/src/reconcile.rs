//! Release reconciliation
//!
//! Reconciling a release means bringing a chart, wherever it comes from,
//! into the cluster under a fixed name. The reconciler decides between a
//! fresh install and an upgrade based on the release history and always
//! applies with the same policy (see [`InstallOptions::deployment`] and
//! [`UpgradeOptions::deployment`]).

use pipewright_core::{
    BUNDLE_VERSION, BundleWorkspace, ChartDescriptor, ChartSource, LoadedChart, ReleaseIdentity,
    TemplateResolver, Values,
};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info, warn};

use crate::actions::{InstallOptions, UpgradeOptions};
use crate::backend::{ChartEngine, ClusterApply, ValuesMerge};
use crate::error::{KubeError, Result};
use crate::values::{ImageOverride, assemble_values};

/// Everything the caller decides about a deployment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployRequest {
    /// Helm repository URL; empty for local charts
    pub repository_url: String,

    /// Chart name (remote) or path (local)
    pub chart: PathBuf,

    /// Chart version
    pub version: String,

    /// Release name
    pub name: String,

    /// Target namespace
    pub namespace: String,

    /// User value files, lowest precedence first
    pub value_files: Vec<PathBuf>,

    /// Image path template, used for local charts only
    pub image: String,

    /// Tag template, used for local charts only
    pub tag: String,

    /// Simulate the apply
    pub dry_run: bool,
}

impl DeployRequest {
    pub fn new(chart: impl Into<PathBuf>, name: impl Into<String>) -> Self {
        Self {
            repository_url: String::new(),
            chart: chart.into(),
            version: BUNDLE_VERSION.to_string(),
            name: name.into(),
            namespace: "default".to_string(),
            value_files: Vec::new(),
            image: String::new(),
            tag: String::new(),
            dry_run: false,
        }
    }
}

/// Lifecycle of a single reconciliation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReleasePhase {
    /// History not yet consulted
    Unknown,

    /// First-time install in progress
    Installing,

    /// Upgrade of an existing release in progress
    Upgrading { previous_revision: u32 },

    /// Apply succeeded
    Done,
}

impl ReleasePhase {
    /// Check if this phase ends the reconciliation
    ///
    /// Failures are not a phase: they surface as the error of
    /// [`ReleaseReconciler::reconcile`].
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done)
    }

    /// Human-readable phase name
    pub fn status_name(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Installing => "installing",
            Self::Upgrading { .. } => "upgrading",
            Self::Done => "done",
        }
    }

    fn advance(&mut self, next: ReleasePhase) {
        debug!(from = self.status_name(), to = next.status_name(), "release phase");
        *self = next;
    }
}

impl std::fmt::Display for ReleasePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Upgrading { previous_revision } => {
                write!(f, "upgrading from revision {}", previous_revision)
            }
            other => write!(f, "{}", other.status_name()),
        }
    }
}

/// Which apply primitive was used
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseAction {
    Install,
    Upgrade,
}

impl std::fmt::Display for ReleaseAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Install => write!(f, "install"),
            Self::Upgrade => write!(f, "upgrade"),
        }
    }
}

/// Result of a successful reconciliation
#[derive(Debug, Clone)]
pub struct ReconcileOutcome {
    pub action: ReleaseAction,
    pub phase: ReleasePhase,
    /// Revision found in the history before an upgrade
    pub previous_revision: Option<u32>,
    /// Descriptor of the chart that was applied
    pub chart: ChartDescriptor,
    /// Values the chart was applied with
    pub values: Values,
    pub dry_run: bool,
}

/// Temporary directories that must outlive the apply
enum Scratch {
    None,
    Remote(TempDir),
    Bundle(BundleWorkspace),
}

/// Drives a release from a [`DeployRequest`] to an applied chart
pub struct ReleaseReconciler {
    resolver: TemplateResolver,
    engine: Box<dyn ChartEngine>,
    cluster: Box<dyn ClusterApply>,
    merger: Box<dyn ValuesMerge>,
}

impl ReleaseReconciler {
    pub fn new(
        resolver: TemplateResolver,
        engine: Box<dyn ChartEngine>,
        cluster: Box<dyn ClusterApply>,
        merger: Box<dyn ValuesMerge>,
    ) -> Self {
        Self {
            resolver,
            engine,
            cluster,
            merger,
        }
    }

    /// Reconcile a release
    ///
    /// Temporary chart directories are removed before this returns,
    /// whatever the outcome.
    pub async fn reconcile(&self, request: &DeployRequest) -> Result<ReconcileOutcome> {
        let source =
            ChartSource::classify(&request.repository_url, &request.chart, &request.version)?;
        debug!(mode = source.mode(), chart = %request.chart.display(), "classified chart");

        let image = if source.is_local_chart() {
            Some(ImageOverride {
                name: self.resolver.expand_image_path(&request.image)?,
                tag: self.resolver.expand_tag(&request.tag).await?,
            })
        } else {
            None
        };

        let (chart, scratch) = self.obtain_chart(&source, request, image.as_ref()).await?;
        if let Some(dir) = scratch.path() {
            debug!(dir = %dir.display(), "chart staged in temporary directory");
        }

        let identity = ReleaseIdentity::new(&request.name, &request.namespace);
        let values = assemble_values(
            &source,
            &request.value_files,
            image.as_ref(),
            &identity,
            self.merger.as_ref(),
        )?;

        let mut phase = ReleasePhase::Unknown;
        let previous_revision = match self.cluster.history(&request.name, &request.namespace, 1).await {
            Ok(history) => history.first().map(|r| r.revision),
            Err(e) if e.is_release_not_found() => None,
            Err(e) => {
                return Err(KubeError::History {
                    name: request.name.clone(),
                    message: e.to_string(),
                });
            }
        };

        let action = match previous_revision {
            None => {
                info!(release = %request.name, namespace = %request.namespace, "installing release");
                phase.advance(ReleasePhase::Installing);
                let options = InstallOptions::deployment(&request.name, &request.namespace)
                    .with_dry_run(request.dry_run);
                self.cluster.install(&chart, &values, &options).await.map(|_| ReleaseAction::Install)
            }
            Some(revision) => {
                info!(
                    release = %request.name,
                    namespace = %request.namespace,
                    revision,
                    "upgrading release"
                );
                phase.advance(ReleasePhase::Upgrading {
                    previous_revision: revision,
                });
                let options = UpgradeOptions::deployment(&request.name, &request.namespace)
                    .with_dry_run(request.dry_run);
                self.cluster.upgrade(&chart, &values, &options).await.map(|_| ReleaseAction::Upgrade)
            }
        };

        let action = match action {
            Ok(action) => action,
            Err(e) => {
                let failed_action = if previous_revision.is_some() {
                    ReleaseAction::Upgrade
                } else {
                    ReleaseAction::Install
                };
                warn!(
                    release = %request.name,
                    phase = phase.status_name(),
                    error = %e,
                    "{} failed",
                    failed_action
                );
                return Err(into_apply_error(e, failed_action, &request.name));
            }
        };

        phase.advance(ReleasePhase::Done);
        Ok(ReconcileOutcome {
            action,
            phase,
            previous_revision,
            chart: chart.metadata,
            values,
            dry_run: request.dry_run,
        })
    }

    async fn obtain_chart(
        &self,
        source: &ChartSource,
        request: &DeployRequest,
        image: Option<&ImageOverride>,
    ) -> Result<(LoadedChart, Scratch)> {
        match source {
            ChartSource::Remote {
                repository_url,
                chart_name,
                version,
            } => {
                let dir = tempfile::Builder::new()
                    .prefix("pipewright-chart-")
                    .tempdir()?;
                let root = self
                    .engine
                    .fetch(repository_url, chart_name, version, dir.path())
                    .await?;
                let chart = self.engine.load(&root)?;
                Ok((chart, Scratch::Remote(dir)))
            }
            ChartSource::LocalPackaged { path } => {
                let app_version = image.map(|i| i.tag.as_str()).unwrap_or_default();
                ChartDescriptor::synthesize(&request.name, &request.version, app_version, Some(path))?
                    .write_to(path)?;

                let chart = self.load_with_dependencies(path).await?;
                Ok((chart, Scratch::None))
            }
            ChartSource::LocalBundleDirectory { .. } | ChartSource::LocalBundleFile { .. } => {
                let workspace = BundleWorkspace::materialize(source, &request.name, &request.version)?;
                let chart = self.load_with_dependencies(workspace.root()).await?;
                Ok((chart, Scratch::Bundle(workspace)))
            }
        }
    }

    /// Load a local chart, downloading declared dependencies missing from `charts/`
    async fn load_with_dependencies(&self, root: &Path) -> Result<LoadedChart> {
        let chart = self.engine.load(root)?;
        let missing = self.engine.missing_dependencies(&chart);
        if missing.is_empty() {
            return Ok(chart);
        }

        debug!(dependencies = ?missing, "downloading missing chart dependencies");
        self.engine.download_dependencies(&chart).await?;
        self.engine.load(root)
    }
}

fn into_apply_error(err: KubeError, action: ReleaseAction, name: &str) -> KubeError {
    match err {
        KubeError::Apply { .. } => err,
        other => KubeError::Apply {
            action: action.to_string(),
            name: name.to_string(),
            message: other.to_string(),
        },
    }
}

impl Scratch {
    fn path(&self) -> Option<&Path> {
        match self {
            Self::None => None,
            Self::Remote(dir) => Some(dir.path()),
            Self::Bundle(ws) => Some(ws.root()),
        }
    }
}
