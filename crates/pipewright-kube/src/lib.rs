//! Pipewright Kube - Release reconciliation against a Kubernetes cluster
//!
//! This crate provides:
//! - **Reconciler**: Install-or-upgrade decision with a fixed apply policy
//! - **Value Assembly**: Chart defaults, user files and image overrides
//! - **Backends**: Helm CLI for charts and applies, Kubernetes Secrets for history
//! - **Mocks**: In-memory backends for tests

pub mod actions;
pub mod backend;
pub mod error;
pub mod helm;
pub mod history;
pub mod mock;
pub mod reconcile;
pub mod values;

pub use actions::{APPLY_TIMEOUT_MINUTES, InstallOptions, MAX_HISTORY, UpgradeOptions};
pub use backend::{ChartEngine, ClusterApply, ReleaseRevision, ValuesMerge, YamlValuesMerge};
pub use error::{KubeError, Result};
pub use helm::{HelmCli, HelmCluster};
pub use history::SecretsHistory;
pub use mock::{ApplyCall, MockChartEngine, MockClusterApply, MockHistory};
pub use reconcile::{
    DeployRequest, ReconcileOutcome, ReleaseAction, ReleasePhase, ReleaseReconciler,
};
pub use values::{ImageOverride, assemble_values};
