//! Pipewright Repo - Source repository access
//!
//! Provides [`GitlabTagLookup`], the [`pipewright_core::TagLookup`] used to
//! find the newest tag of a project when a pipeline does not run for a tag.

pub mod error;
pub mod gitlab;

pub use error::{RepoError, Result};
pub use gitlab::GitlabTagLookup;
