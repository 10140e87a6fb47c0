//! Pipewright - image builds and Helm releases driven by CI metadata

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod builder;
mod commands;
mod error;
mod exit_codes;

use error::Result;

const BUILD_ABOUT: &str = "\
Build a Docker image and optionally push it with templated tags.

Image templates:
  %r  registry host (DOCKER_HOST or CI_REGISTRY)
  %p  project path (CI_PROJECT_PATH)

Tag templates:
  %t  CI_COMMIT_TAG, or the newest tag of the project; must be MAJOR.MINOR.PATCH
  %m  MAJOR of %t (skipped when 0)
  %n  MAJOR.MINOR of %t
  %r  version found in the branch name (CI_COMMIT_REF_NAME)
  %h  short commit hash (CI_COMMIT_SHA)
  %d  current date, YYYY-MM-DD
  %@  all of %t, %m, %n and latest";

#[derive(Parser)]
#[command(name = "pipewright")]
#[command(author, version, about = "Build images and reconcile Helm releases from CI pipelines")]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug output
    #[arg(long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Build a Docker image and optionally push it", long_about = BUILD_ABOUT)]
    Build {
        /// BuildKit daemon to build with instead of the local Docker daemon
        #[arg(long, env = "BUILDKIT_HOST")]
        buildkit_host: Option<String>,

        /// Build context
        #[arg(long, default_value = ".")]
        context: PathBuf,

        /// Dockerfile to build
        #[arg(short = 'f', long, default_value = "Dockerfile")]
        dockerfile: PathBuf,

        /// Build argument (KEY=VALUE, repeatable)
        #[arg(long = "arg", value_parser = builder::parse_build_arg)]
        args: Vec<(String, String)>,

        /// Image path template; ignored without tags
        #[arg(long, default_value = "unnamed")]
        image: String,

        /// Tag template (repeatable); no push without tags
        #[arg(short, long = "tag")]
        tags: Vec<String>,

        /// Secret exposed to the build (id=<name>,src=<file>, repeatable)
        #[arg(long = "secret")]
        secrets: Vec<String>,

        /// Forward the default SSH agent to the build
        #[arg(long)]
        ssh: bool,
    },

    /// Install or upgrade a release on the current cluster
    #[command(disable_version_flag = true)]
    Deploy {
        /// Helm repository of the chart; empty for local charts
        #[arg(long, default_value = "")]
        repo: String,

        /// Chart name (with --repo) or local path
        #[arg(long, default_value = "./deploy/helm")]
        chart: PathBuf,

        /// Chart version
        #[arg(long, default_value = "0.0.0")]
        version: String,

        /// Release name
        #[arg(long, env = "CI_PROJECT_PATH_SLUG")]
        name: Option<String>,

        /// Values file (repeatable, later files take precedence)
        #[arg(short = 'f', long = "values")]
        values: Vec<PathBuf>,

        /// Target namespace
        #[arg(short, long, default_value = "default")]
        namespace: String,

        /// Image path template for local charts
        #[arg(long, default_value = "")]
        image: String,

        /// Tag template for local charts
        #[arg(short, long, default_value = "")]
        tag: String,

        /// Simulate the install or upgrade
        #[arg(long)]
        dry_run: bool,
    },
}

fn init_tracing(debug: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if debug {
            EnvFilter::new("warn,pipewright=debug,pipewright_core=debug,pipewright_kube=debug,pipewright_repo=debug")
        } else {
            EnvFilter::new("warn")
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Build {
            buildkit_host,
            context,
            dockerfile,
            args,
            image,
            tags,
            secrets,
            ssh,
        } => {
            commands::build::run(
                buildkit_host,
                &context,
                &dockerfile,
                &args,
                &image,
                &tags,
                &secrets,
                ssh,
            )
            .await
        }

        Commands::Deploy {
            repo,
            chart,
            version,
            name,
            values,
            namespace,
            image,
            tag,
            dry_run,
        } => {
            commands::deploy::run(
                &repo,
                &chart,
                &version,
                name.as_deref(),
                &values,
                &namespace,
                &image,
                &tag,
                dry_run,
            )
            .await
        }
    }
}

#[tokio::main]
async fn main() {
    // Setup miette for nice error display
    miette::set_panic_hook();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let code = if err.use_stderr() {
                exit_codes::USAGE_ERROR
            } else {
                exit_codes::SUCCESS
            };
            let _ = err.print();
            std::process::exit(code);
        }
    };

    init_tracing(cli.debug);

    if let Err(err) = run(cli).await {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
}
