//! GitLab tag lookup
//!
//! Authenticates with the resource owner password grant and asks the
//! project's tag list for its first entry, which GitLab orders newest
//! first.

use async_trait::async_trait;
use pipewright_core::{CoreError, TagConnection, TagLookup};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::error::{RepoError, Result};

const REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct Tag {
    name: String,
}

/// Latest-tag lookup against a GitLab server
pub struct GitlabTagLookup {
    base_url: Url,
    connection: TagConnection,
    client: reqwest::Client,
}

impl std::fmt::Debug for GitlabTagLookup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitlabTagLookup")
            .field("base_url", &self.base_url.as_str())
            .field("project_id", &self.connection.project_id)
            .field("user", &self.connection.user)
            .finish_non_exhaustive()
    }
}

impl GitlabTagLookup {
    /// Lookup against `https://<server_host>`
    pub fn new(connection: TagConnection) -> Result<Self> {
        let base_url = format!("https://{}", connection.server_host);
        Self::with_base_url(connection, &base_url)
    }

    /// Lookup against an explicit server URL
    pub fn with_base_url(connection: TagConnection, base_url: &str) -> Result<Self> {
        let base_url = Url::parse(base_url).map_err(|e| RepoError::InvalidRepositoryUrl {
            url: base_url.to_string(),
            reason: e.to_string(),
        })?;
        if base_url.cannot_be_a_base() {
            return Err(RepoError::InvalidRepositoryUrl {
                url: base_url.to_string(),
                reason: "not a base URL".to_string(),
            });
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            base_url,
            connection,
            client,
        })
    }

    /// Name of the most recent tag of the project
    pub async fn fetch_latest_tag(&self) -> Result<String> {
        let token = self.access_token().await?;

        let url = self.tags_url()?;
        debug!(url = %url, "listing project tags");
        let response = self.client.get(url).bearer_auth(token).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RepoError::HttpError {
                status: status.as_u16(),
                message: body,
            });
        }

        let tags: Vec<Tag> = response.json().await?;
        tags.into_iter()
            .next()
            .map(|tag| tag.name)
            .ok_or_else(|| RepoError::NoTags {
                project: self.connection.project_id.clone(),
            })
    }

    async fn access_token(&self) -> Result<String> {
        let url = self.endpoint(&["oauth", "token"])?;
        let response = self
            .client
            .post(url)
            .form(&[
                ("grant_type", "password"),
                ("username", self.connection.user.as_str()),
                ("password", self.connection.password.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RepoError::AuthFailed {
                message: format!("token request returned {}: {}", status, body),
            });
        }

        let token: TokenResponse = response.json().await?;
        Ok(token.access_token)
    }

    /// `/api/v4/projects/<id>/repository/tags?per_page=1`, with the id
    /// encoded as a single path segment
    fn tags_url(&self) -> Result<Url> {
        let mut url = self.endpoint(&[
            "api",
            "v4",
            "projects",
            self.connection.project_id.as_str(),
            "repository",
            "tags",
        ])?;
        url.query_pairs_mut().append_pair("per_page", "1");
        Ok(url)
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| RepoError::InvalidRepositoryUrl {
                url: self.base_url.to_string(),
                reason: "not a base URL".to_string(),
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

#[async_trait]
impl TagLookup for GitlabTagLookup {
    async fn latest_tag(&self) -> pipewright_core::Result<String> {
        self.fetch_latest_tag().await.map_err(CoreError::from)
    }
}
