//! CLI commands

pub mod build;
pub mod deploy;

use pipewright_core::{EnvironmentContext, TemplateResolver};
use pipewright_repo::GitlabTagLookup;
use tracing::debug;

use crate::error::Result;

/// Template resolver for the current CI job
///
/// The GitLab tag lookup is attached only when the job carries every
/// connection value; otherwise `%t` without `CI_COMMIT_TAG` fails inside
/// the resolver with a message naming what is missing.
pub fn resolver(env: EnvironmentContext) -> Result<TemplateResolver> {
    let connection = env.tag_connection();
    let mut resolver = TemplateResolver::new(env);
    if let Some(connection) = connection {
        debug!(server = %connection.server_host, project = %connection.project_id, "tag lookup configured");
        resolver = resolver.with_tag_lookup(Box::new(GitlabTagLookup::new(connection)?));
    }
    Ok(resolver)
}
