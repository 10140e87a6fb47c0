//! Remote tag lookup capability

use async_trait::async_trait;

use crate::error::Result;

/// Source of the most recently created tag of a project
///
/// Used by the template resolver when the pipeline does not run for a tag.
#[async_trait]
pub trait TagLookup: Send + Sync {
    /// Name of the newest tag, or a lookup error if there is none
    async fn latest_tag(&self) -> Result<String>;
}
