//! Image builder backend
//!
//! Builds go through the Docker CLI. Without a BuildKit host the local
//! daemon builds with `DOCKER_BUILDKIT=1`, then the image is tagged and
//! pushed once per tag. With a BuildKit host, `docker buildx` talks to
//! that host and pushes every tag in the same invocation.

use async_trait::async_trait;
use std::path::PathBuf;
use tokio::process::Command;
use tracing::debug;

use crate::error::{CliError, Result};

/// Everything needed to build one image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildRequest {
    pub context: PathBuf,
    pub dockerfile: PathBuf,
    /// Fully expanded image path, without tag
    pub image: String,
    /// Fully expanded tags; empty means build without push
    pub tags: Vec<String>,
    /// Build arguments in the order given
    pub args: Vec<(String, String)>,
    /// Secret specifications (`id=<name>,src=<file>`)
    pub secrets: Vec<String>,
    /// Forward the default SSH agent
    pub ssh: bool,
}

impl BuildRequest {
    /// `image:tag` for every tag
    pub fn references(&self) -> Vec<String> {
        self.tags
            .iter()
            .map(|tag| format!("{}:{}", self.image, tag))
            .collect()
    }

    pub fn pushes(&self) -> bool {
        !self.tags.is_empty()
    }
}

/// Something that can build (and push) an image
#[async_trait]
pub trait ImageBuilder: Send + Sync {
    async fn build(&self, request: &BuildRequest) -> Result<()>;
}

/// Parse a `KEY=VALUE` build argument
pub fn parse_build_arg(arg: &str) -> std::result::Result<(String, String), String> {
    match arg.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got '{}'", arg)),
    }
}

/// Check a secret specification: comma separated `id=` and `src=` pairs
pub fn validate_secret(secret: &str) -> Result<()> {
    for item in secret.split(',') {
        let Some((key, _)) = item.split_once('=') else {
            return Err(CliError::from_kind(
                pipewright_core::ErrorKind::FormatInvalid,
                format!("secret '{}' has a wrong format", item),
            ));
        };
        if key != "id" && key != "src" {
            return Err(CliError::from_kind(
                pipewright_core::ErrorKind::FormatInvalid,
                format!("unknown key '{}' for secret", key),
            ));
        }
    }
    Ok(())
}

/// Docker CLI builder
#[derive(Debug, Clone)]
pub struct DockerCli {
    binary: PathBuf,
    buildkit_host: Option<String>,
}

impl DockerCli {
    /// Use `docker` from `PATH`, with an optional remote BuildKit host
    pub fn new(buildkit_host: Option<String>) -> Self {
        Self {
            binary: PathBuf::from("docker"),
            buildkit_host: buildkit_host.filter(|host| !host.is_empty()),
        }
    }

    pub fn with_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.binary = binary.into();
        self
    }

    async fn run(&self, args: &[String], envs: &[(&str, &str)]) -> Result<()> {
        debug!(binary = %self.binary.display(), ?args, "running docker");

        let status = Command::new(&self.binary)
            .args(args)
            .envs(envs.iter().copied())
            .status()
            .await
            .map_err(|e| CliError::build(format!("cannot run {}: {}", self.binary.display(), e)))?;

        if !status.success() {
            return Err(CliError::build(format!(
                "docker {} exited with {}",
                args.first().map(String::as_str).unwrap_or_default(),
                status
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl ImageBuilder for DockerCli {
    async fn build(&self, request: &BuildRequest) -> Result<()> {
        if let Some(host) = &self.buildkit_host {
            let args = buildx_args(request);
            return self.run(&args, &[("BUILDKIT_HOST", host.as_str())]).await;
        }

        self.run(&build_args(request), &[("DOCKER_BUILDKIT", "1")])
            .await?;

        for reference in request.references() {
            self.run(&tag_args(&request.image, &reference), &[]).await?;
            self.run(&push_args(&reference), &[]).await?;
        }
        Ok(())
    }
}

fn push_build_options(args: &mut Vec<String>, request: &BuildRequest) {
    args.push("-f".to_string());
    args.push(request.dockerfile.to_string_lossy().into_owned());
    for (key, value) in &request.args {
        args.push("--build-arg".to_string());
        args.push(format!("{}={}", key, value));
    }
    for secret in &request.secrets {
        args.push("--secret".to_string());
        args.push(secret.clone());
    }
    if request.ssh {
        args.push("--ssh".to_string());
        args.push("default".to_string());
    }
}

/// `docker build` arguments for the local daemon
pub fn build_args(request: &BuildRequest) -> Vec<String> {
    let mut args = vec!["build".to_string(), "-t".to_string(), request.image.clone()];
    push_build_options(&mut args, request);
    args.push(request.context.to_string_lossy().into_owned());
    args
}

/// `docker buildx build` arguments for a remote BuildKit host
pub fn buildx_args(request: &BuildRequest) -> Vec<String> {
    let mut args = vec!["buildx".to_string(), "build".to_string()];
    for reference in request.references() {
        args.push("-t".to_string());
        args.push(reference);
    }
    push_build_options(&mut args, request);
    if request.pushes() {
        args.push("--push".to_string());
    }
    args.push(request.context.to_string_lossy().into_owned());
    args
}

pub fn tag_args(image: &str, reference: &str) -> Vec<String> {
    vec!["tag".to_string(), image.to_string(), reference.to_string()]
}

pub fn push_args(reference: &str) -> Vec<String> {
    vec!["push".to_string(), reference.to_string()]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn request(tags: &[&str]) -> BuildRequest {
        BuildRequest {
            context: PathBuf::from("."),
            dockerfile: PathBuf::from("Dockerfile"),
            image: "registry.gitlab.com/group/app".to_string(),
            tags: strings(tags),
            args: vec![("VERSION".to_string(), "1.4.3".to_string())],
            secrets: vec!["id=npmrc,src=/tmp/.npmrc".to_string()],
            ssh: true,
        }
    }

    #[test]
    fn test_parse_build_arg() {
        assert_eq!(
            parse_build_arg("VERSION=1.4.3").unwrap(),
            ("VERSION".to_string(), "1.4.3".to_string())
        );
        assert_eq!(
            parse_build_arg("OPTS=a=b").unwrap(),
            ("OPTS".to_string(), "a=b".to_string())
        );
        assert_eq!(
            parse_build_arg("EMPTY=").unwrap(),
            ("EMPTY".to_string(), String::new())
        );
        assert!(parse_build_arg("VERSION").is_err());
        assert!(parse_build_arg("=1").is_err());
    }

    #[test]
    fn test_validate_secret() {
        assert!(validate_secret("id=npmrc,src=/tmp/.npmrc").is_ok());
        assert!(validate_secret("id=npmrc").is_ok());

        let err = validate_secret("id=npmrc,file").unwrap_err();
        assert!(matches!(err, CliError::Format { .. }));

        let err = validate_secret("id=npmrc,path=/tmp/x").unwrap_err();
        assert!(err.to_string().contains("unknown key 'path'"));
    }

    #[test]
    fn test_docker_build_args() {
        assert_eq!(
            build_args(&request(&["1.4.3"])),
            strings(&[
                "build",
                "-t",
                "registry.gitlab.com/group/app",
                "-f",
                "Dockerfile",
                "--build-arg",
                "VERSION=1.4.3",
                "--secret",
                "id=npmrc,src=/tmp/.npmrc",
                "--ssh",
                "default",
                ".",
            ])
        );
    }

    #[test]
    fn test_buildx_args_push_every_tag() {
        let mut req = request(&["1.4.3", "1.4", "latest"]);
        req.secrets.clear();
        req.ssh = false;
        assert_eq!(
            buildx_args(&req),
            strings(&[
                "buildx",
                "build",
                "-t",
                "registry.gitlab.com/group/app:1.4.3",
                "-t",
                "registry.gitlab.com/group/app:1.4",
                "-t",
                "registry.gitlab.com/group/app:latest",
                "-f",
                "Dockerfile",
                "--build-arg",
                "VERSION=1.4.3",
                "--push",
                ".",
            ])
        );
    }

    #[test]
    fn test_no_tags_no_push() {
        let req = request(&[]);
        assert!(!req.pushes());
        assert!(req.references().is_empty());
        assert!(!buildx_args(&req).contains(&"--push".to_string()));
    }

    #[test]
    fn test_tag_and_push_args() {
        assert_eq!(
            tag_args("app", "app:1.0.0"),
            strings(&["tag", "app", "app:1.0.0"])
        );
        assert_eq!(push_args("app:1.0.0"), strings(&["push", "app:1.0.0"]));
    }

    #[test]
    fn test_empty_buildkit_host_uses_local_daemon() {
        assert!(DockerCli::new(Some(String::new())).buildkit_host.is_none());
        assert_eq!(
            DockerCli::new(Some("tcp://buildkitd:1234".into()))
                .buildkit_host
                .as_deref(),
            Some("tcp://buildkitd:1234")
        );
    }

    #[tokio::test]
    async fn test_missing_binary_is_a_build_error() {
        let docker = DockerCli::new(None).with_binary("/nonexistent/docker");
        let err = docker.build(&request(&[])).await.unwrap_err();
        assert!(matches!(err, CliError::Build { .. }));
        assert!(err.to_string().contains("/nonexistent/docker"));
    }
}
