//! Deploy command - install or upgrade a release

use console::style;
use pipewright_core::{EnvironmentContext, ErrorKind};
use pipewright_kube::{
    DeployRequest, HelmCli, HelmCluster, ReconcileOutcome, ReleaseAction, ReleaseReconciler,
    SecretsHistory, YamlValuesMerge,
};
use std::path::{Path, PathBuf};

use crate::error::{CliError, Result};

/// Run the deploy command
#[allow(clippy::too_many_arguments)]
pub async fn run(
    repository_url: &str,
    chart: &Path,
    version: &str,
    name: Option<&str>,
    value_files: &[PathBuf],
    namespace: &str,
    image: &str,
    tag: &str,
    dry_run: bool,
) -> Result<()> {
    let name = name.filter(|n| !n.is_empty()).ok_or_else(|| {
        CliError::from_kind(
            ErrorKind::ConfigurationMissing,
            "no release name given and CI_PROJECT_PATH_SLUG is not set",
        )
    })?;

    let request = DeployRequest {
        repository_url: repository_url.to_string(),
        chart: chart.to_path_buf(),
        version: version.to_string(),
        name: name.to_string(),
        namespace: namespace.to_string(),
        value_files: value_files.to_vec(),
        image: image.to_string(),
        tag: tag.to_string(),
        dry_run,
    };

    println!(
        "{} Deploying {} to namespace {}{}",
        style("→").blue().bold(),
        style(&request.name).cyan(),
        style(&request.namespace).yellow(),
        if dry_run { " (dry run)" } else { "" }
    );

    let resolver = super::resolver(EnvironmentContext::from_env())?;
    let history = SecretsHistory::new().await?;
    let reconciler = ReleaseReconciler::new(
        resolver,
        Box::new(HelmCli::new()),
        Box::new(HelmCluster::new(HelmCli::new(), history)),
        Box::new(YamlValuesMerge),
    );

    let outcome = reconciler.reconcile(&request).await?;
    print_outcome(&request, &outcome);
    Ok(())
}

fn print_outcome(request: &DeployRequest, outcome: &ReconcileOutcome) {
    let verb = match (outcome.action, outcome.dry_run) {
        (ReleaseAction::Install, false) => "Installed",
        (ReleaseAction::Upgrade, false) => "Upgraded",
        (ReleaseAction::Install, true) => "Simulated install of",
        (ReleaseAction::Upgrade, true) => "Simulated upgrade of",
    };
    println!(
        "{} {} release {}",
        style("✓").green().bold(),
        verb,
        style(&request.name).cyan()
    );
    println!(
        "  {} {} {}",
        style("Chart:").dim(),
        outcome.chart.name,
        style(&outcome.chart.version).yellow()
    );
    if !outcome.chart.app_version.is_empty() {
        println!("  {} {}", style("App version:").dim(), outcome.chart.app_version);
    }
    if let Some(revision) = outcome.previous_revision {
        println!("  {} {}", style("Previous revision:").dim(), revision);
    }
    println!("  {} {}", style("Status:").dim(), outcome.phase);
}
