//! Helm CLI backend

use async_trait::async_trait;
use pipewright_core::{LoadedChart, Values};
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::debug;

use crate::actions::{InstallOptions, UpgradeOptions};
use crate::backend::{ChartEngine, ClusterApply, ReleaseRevision};
use crate::error::{KubeError, Result};
use crate::history::SecretsHistory;

/// Runs the `helm` binary
#[derive(Debug, Clone)]
pub struct HelmCli {
    binary: PathBuf,
}

impl Default for HelmCli {
    fn default() -> Self {
        Self::new()
    }
}

impl HelmCli {
    /// Use `helm` from `PATH`
    pub fn new() -> Self {
        Self {
            binary: PathBuf::from("helm"),
        }
    }

    /// Use a specific helm binary
    pub fn with_binary(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Run helm, returning stdout or a message carrying stderr
    async fn run(&self, args: &[String]) -> std::result::Result<String, String> {
        debug!(binary = %self.binary.display(), ?args, "running helm");

        let output = Command::new(&self.binary)
            .args(args)
            .output()
            .await
            .map_err(|e| format!("cannot run {}: {}", self.binary.display(), e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(format!(
                "helm {} exited with {}: {}",
                args.first().map(String::as_str).unwrap_or_default(),
                output.status,
                stderr.trim()
            ));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn apply(&self, action: &str, name: &str, args: Vec<String>) -> Result<()> {
        let stdout = self.run(&args).await.map_err(|message| KubeError::Apply {
            action: action.to_string(),
            name: name.to_string(),
            message,
        })?;
        debug!(output = %stdout.trim(), "helm {} finished", action);
        Ok(())
    }

    pub async fn install(
        &self,
        chart: &LoadedChart,
        values: &Values,
        options: &InstallOptions,
    ) -> Result<()> {
        let values_file = write_values(values)?;
        let args = install_args(&chart.root, values_file.path(), options);
        self.apply("install", &options.name, args).await
    }

    pub async fn upgrade(
        &self,
        chart: &LoadedChart,
        values: &Values,
        options: &UpgradeOptions,
    ) -> Result<()> {
        let values_file = write_values(values)?;
        let args = upgrade_args(&chart.root, values_file.path(), options);
        self.apply("upgrade", &options.name, args).await
    }
}

#[async_trait]
impl ChartEngine for HelmCli {
    async fn fetch(
        &self,
        repository_url: &str,
        chart: &str,
        version: &str,
        dest: &Path,
    ) -> Result<PathBuf> {
        let args = pull_args(repository_url, chart, version, dest);
        self.run(&args).await.map_err(|message| {
            KubeError::Chart(format!(
                "unable to find chart '{}' in {}: {}",
                chart, repository_url, message
            ))
        })?;
        Ok(dest.join(chart))
    }

    async fn download_dependencies(&self, chart: &LoadedChart) -> Result<()> {
        let args = dependency_update_args(&chart.root);
        self.run(&args)
            .await
            .map_err(|message| KubeError::Chart(format!("failed to download dependencies: {}", message)))?;
        Ok(())
    }
}

/// Helm for applying, Kubernetes secrets for history
pub struct HelmCluster {
    helm: HelmCli,
    history: SecretsHistory,
}

impl HelmCluster {
    pub fn new(helm: HelmCli, history: SecretsHistory) -> Self {
        Self { helm, history }
    }
}

#[async_trait]
impl ClusterApply for HelmCluster {
    async fn history(
        &self,
        name: &str,
        namespace: &str,
        max: usize,
    ) -> Result<Vec<ReleaseRevision>> {
        self.history.history(name, namespace, max).await
    }

    async fn install(
        &self,
        chart: &LoadedChart,
        values: &Values,
        options: &InstallOptions,
    ) -> Result<()> {
        self.helm.install(chart, values, options).await
    }

    async fn upgrade(
        &self,
        chart: &LoadedChart,
        values: &Values,
        options: &UpgradeOptions,
    ) -> Result<()> {
        self.helm.upgrade(chart, values, options).await
    }
}

fn write_values(values: &Values) -> Result<tempfile::NamedTempFile> {
    let file = tempfile::Builder::new()
        .prefix("pipewright-values-")
        .suffix(".yaml")
        .tempfile()?;
    values.write_to(file.path())?;
    Ok(file)
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// `helm pull` arguments for a remote chart
pub fn pull_args(repository_url: &str, chart: &str, version: &str, dest: &Path) -> Vec<String> {
    vec![
        "pull".to_string(),
        chart.to_string(),
        "--repo".to_string(),
        repository_url.to_string(),
        "--version".to_string(),
        version.to_string(),
        "--untar".to_string(),
        "--untardir".to_string(),
        path_arg(dest),
    ]
}

/// `helm dependency update` arguments
pub fn dependency_update_args(chart_root: &Path) -> Vec<String> {
    vec![
        "dependency".to_string(),
        "update".to_string(),
        path_arg(chart_root),
    ]
}

/// `helm install` arguments
pub fn install_args(chart_root: &Path, values_file: &Path, options: &InstallOptions) -> Vec<String> {
    let mut args = vec![
        "install".to_string(),
        options.name.clone(),
        path_arg(chart_root),
    ];
    push_common(
        &mut args,
        &options.namespace,
        values_file,
        options.wait,
        options.atomic,
        options.timeout,
        options.no_hooks,
        options.dry_run,
    );
    args
}

/// `helm upgrade` arguments
pub fn upgrade_args(chart_root: &Path, values_file: &Path, options: &UpgradeOptions) -> Vec<String> {
    let mut args = vec![
        "upgrade".to_string(),
        options.name.clone(),
        path_arg(chart_root),
    ];
    push_common(
        &mut args,
        &options.namespace,
        values_file,
        options.wait,
        options.atomic,
        options.timeout,
        options.no_hooks,
        options.dry_run,
    );
    if let Some(max) = options.max_history {
        args.push("--history-max".to_string());
        args.push(max.to_string());
    }
    args
}

#[allow(clippy::too_many_arguments)]
fn push_common(
    args: &mut Vec<String>,
    namespace: &str,
    values_file: &Path,
    wait: bool,
    atomic: bool,
    timeout: Option<chrono::Duration>,
    no_hooks: bool,
    dry_run: bool,
) {
    args.push("--namespace".to_string());
    args.push(namespace.to_string());
    args.push("--values".to_string());
    args.push(path_arg(values_file));
    if wait {
        args.push("--wait".to_string());
    }
    if atomic {
        args.push("--atomic".to_string());
    }
    if let Some(timeout) = timeout {
        args.push("--timeout".to_string());
        args.push(format!("{}s", timeout.num_seconds()));
    }
    if no_hooks {
        args.push("--no-hooks".to_string());
    }
    if dry_run {
        args.push("--dry-run".to_string());
    }
}
