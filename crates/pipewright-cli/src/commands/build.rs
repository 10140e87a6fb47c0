//! Build command - build an image and push it with templated tags

use console::style;
use pipewright_core::EnvironmentContext;
use std::path::Path;

use crate::builder::{BuildRequest, DockerCli, ImageBuilder, validate_secret};
use crate::error::{CliError, Result};

/// Run the build command
#[allow(clippy::too_many_arguments)]
pub async fn run(
    buildkit_host: Option<String>,
    context: &Path,
    dockerfile: &Path,
    args: &[(String, String)],
    image: &str,
    tags: &[String],
    secrets: &[String],
    ssh: bool,
) -> Result<()> {
    for secret in secrets {
        validate_secret(secret)?;
    }
    if ssh && std::env::var_os("SSH_AUTH_SOCK").is_none() {
        return Err(CliError::from_kind(
            pipewright_core::ErrorKind::ConfigurationMissing,
            "--ssh needs a running SSH agent but SSH_AUTH_SOCK is not set",
        ));
    }

    let resolver = super::resolver(EnvironmentContext::from_env())?;
    let request = BuildRequest {
        context: context.to_path_buf(),
        dockerfile: dockerfile.to_path_buf(),
        image: resolver.expand_image_path(image)?,
        tags: resolver.expand_tags(tags).await?,
        args: args.to_vec(),
        secrets: secrets.to_vec(),
        ssh,
    };

    print_summary(&request, buildkit_host.as_deref());

    DockerCli::new(buildkit_host).build(&request).await?;

    if request.pushes() {
        println!(
            "{} Pushed {} tag(s) of {}",
            style("✓").green().bold(),
            request.tags.len(),
            style(&request.image).cyan()
        );
    } else {
        println!(
            "{} Built {} (no tag, not pushed)",
            style("✓").green().bold(),
            style(&request.image).cyan()
        );
    }
    Ok(())
}

fn print_summary(request: &BuildRequest, buildkit_host: Option<&str>) {
    println!("{} Building image", style("→").blue().bold());
    println!("  {} {}", style("Context:").dim(), request.context.display());
    println!("  {} {}", style("Dockerfile:").dim(), request.dockerfile.display());
    println!("  {} {}", style("Image:").dim(), style(&request.image).cyan());
    println!(
        "  {} [{}]",
        style("Tags:").dim(),
        style(request.tags.join(", ")).yellow()
    );
    let args: Vec<String> = request
        .args
        .iter()
        .map(|(key, value)| format!("{}={}", key, value))
        .collect();
    println!("  {} [{}]", style("Args:").dim(), args.join(", "));
    println!("  {} {}", style("SSH:").dim(), request.ssh);
    if let Some(host) = buildkit_host.filter(|h| !h.is_empty()) {
        println!("  {} {}", style("BuildKit:").dim(), host);
    }
}
