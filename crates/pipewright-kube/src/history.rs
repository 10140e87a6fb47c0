//! Release history from Helm's Kubernetes Secrets
//!
//! Helm stores one Secret per revision, labelled with the release name,
//! the revision number and its status. Only the labels are read.

use k8s_openapi::api::core::v1::Secret;
use kube::Client;
use kube::api::{Api, ListParams};
use tracing::debug;

use crate::backend::ReleaseRevision;
use crate::error::{KubeError, Result};

/// Reads release history through the Kubernetes API
pub struct SecretsHistory {
    client: Client,
}

impl SecretsHistory {
    /// Connect with the default kubeconfig or in-cluster configuration
    pub async fn new() -> Result<Self> {
        let client = Client::try_default().await.map_err(|e| {
            KubeError::InvalidConfig(format!("cannot load Kubernetes configuration: {}", e))
        })?;
        Ok(Self { client })
    }

    /// Create with an existing client
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    /// Up to `max` revisions of `name`, newest first
    pub async fn history(
        &self,
        name: &str,
        namespace: &str,
        max: usize,
    ) -> Result<Vec<ReleaseRevision>> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        let params = ListParams::default().labels(&release_selector(name));
        let secrets = api.list(&params).await?;

        let revisions = newest_first(secrets.items.iter().filter_map(revision_of), max);
        if revisions.is_empty() {
            return Err(KubeError::ReleaseNotFound {
                name: name.to_string(),
                namespace: namespace.to_string(),
            });
        }

        debug!(release = name, namespace, latest = revisions[0].revision, "read release history");
        Ok(revisions)
    }
}

/// Label selector matching every revision Secret of a release
pub fn release_selector(name: &str) -> String {
    format!("owner=helm,name={}", name)
}

/// Revision described by a Helm release Secret, if its labels are complete
fn revision_of(secret: &Secret) -> Option<ReleaseRevision> {
    let labels = secret.metadata.labels.as_ref()?;
    let revision = labels.get("version")?.parse().ok()?;
    let status = labels.get("status").cloned().unwrap_or_default();
    Some(ReleaseRevision { revision, status })
}

fn newest_first(revisions: impl Iterator<Item = ReleaseRevision>, max: usize) -> Vec<ReleaseRevision> {
    let mut revisions: Vec<ReleaseRevision> = revisions.collect();
    revisions.sort_by(|a, b| b.revision.cmp(&a.revision));
    revisions.truncate(max);
    revisions
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use std::collections::BTreeMap;

    fn secret(labels: &[(&str, &str)]) -> Secret {
        let labels: BTreeMap<String, String> = labels
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Secret {
            metadata: ObjectMeta {
                name: Some("sh.helm.release.v1.web.v1".to_string()),
                labels: Some(labels),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_selector() {
        assert_eq!(release_selector("group-app"), "owner=helm,name=group-app");
    }

    #[test]
    fn test_revision_from_labels() {
        let s = secret(&[
            ("owner", "helm"),
            ("name", "web"),
            ("version", "12"),
            ("status", "deployed"),
        ]);
        assert_eq!(revision_of(&s), Some(ReleaseRevision::new(12, "deployed")));
    }

    #[test]
    fn test_incomplete_labels_are_skipped() {
        assert_eq!(revision_of(&secret(&[("owner", "helm")])), None);
        assert_eq!(revision_of(&secret(&[("version", "latest")])), None);
        assert_eq!(revision_of(&Secret::default()), None);
    }

    #[test]
    fn test_newest_first_and_limited() {
        let revisions = vec![
            ReleaseRevision::new(1, "superseded"),
            ReleaseRevision::new(3, "deployed"),
            ReleaseRevision::new(2, "superseded"),
        ];

        let latest = newest_first(revisions.clone().into_iter(), 1);
        assert_eq!(latest, vec![ReleaseRevision::new(3, "deployed")]);

        let all = newest_first(revisions.into_iter(), 10);
        let order: Vec<u32> = all.iter().map(|r| r.revision).collect();
        assert_eq!(order, vec![3, 2, 1]);
    }
}
