//! Value assembly for a release

use pipewright_core::{ChartSource, ReleaseIdentity, VALUES_FILE, Values};
use serde_json::Value as JsonValue;
use std::path::PathBuf;
use tracing::debug;

use crate::backend::ValuesMerge;
use crate::error::Result;

/// Image injected into a local chart's values
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageOverride {
    pub name: String,
    pub tag: String,
}

/// Build the final values of a release
///
/// For a local chart its `values.yaml` is the base document. User files
/// follow in order, each later file winning. All of them get their release
/// placeholders substituted in place first. The image override is applied
/// last and only for local charts.
pub fn assemble_values(
    source: &ChartSource,
    value_files: &[PathBuf],
    image: Option<&ImageOverride>,
    identity: &ReleaseIdentity,
    merger: &dyn ValuesMerge,
) -> Result<Values> {
    let mut documents = Vec::with_capacity(value_files.len() + 1);

    if let ChartSource::LocalPackaged { path } = source {
        let defaults = path.join(VALUES_FILE);
        if defaults.exists() {
            identity.render_file(&defaults)?;
            documents.push(defaults);
        }
    }

    for file in value_files {
        identity.render_file(file)?;
        documents.push(file.clone());
    }

    debug!(files = documents.len(), "merging value files");
    let mut values = merger.merge_files(&documents)?;

    if let (true, Some(image)) = (source.is_local_chart(), image) {
        values.set("image.name", JsonValue::String(image.name.clone()))?;
        values.set("image.tag", JsonValue::String(image.tag.clone()))?;
        debug!(image = %image.name, tag = %image.tag, "injected image override");
    }

    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::YamlValuesMerge;
    use pipewright_core::ErrorKind;
    use serde_json::json;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn identity() -> ReleaseIdentity {
        ReleaseIdentity::new("web", "prod")
    }

    fn image() -> ImageOverride {
        ImageOverride {
            name: "registry.gitlab.com/group/app".to_string(),
            tag: "1.4.3".to_string(),
        }
    }

    fn packaged_chart(root: &Path) -> ChartSource {
        fs::create_dir_all(root.join("templates")).unwrap();
        fs::write(
            root.join("values.yaml"),
            "replicas: 1\nimage:\n  name: nginx\n  tag: stable\nhost: \"{{ .Name }}.example.com\"\n",
        )
        .unwrap();
        ChartSource::LocalPackaged {
            path: root.to_path_buf(),
        }
    }

    #[test]
    fn test_chart_defaults_then_user_files() {
        let dir = TempDir::new().unwrap();
        let source = packaged_chart(&dir.path().join("chart"));
        let user = dir.path().join("values-prod.yaml");
        fs::write(&user, "replicas: 3\nnamespace: \"{{ .Namespace }}\"\n").unwrap();

        let values = assemble_values(&source, &[user], None, &identity(), &YamlValuesMerge).unwrap();

        assert_eq!(values.get("replicas").unwrap(), 3);
        assert_eq!(values.get("host").unwrap(), "web.example.com");
        assert_eq!(values.get("namespace").unwrap(), "prod");
        assert_eq!(values.get("image.tag").unwrap(), "stable");
    }

    #[test]
    fn test_image_override_beats_user_files() {
        let dir = TempDir::new().unwrap();
        let source = packaged_chart(&dir.path().join("chart"));
        let user = dir.path().join("override.yaml");
        fs::write(&user, "image:\n  tag: from-user\n  pullPolicy: Always\n").unwrap();

        let values =
            assemble_values(&source, &[user], Some(&image()), &identity(), &YamlValuesMerge)
                .unwrap();

        assert_eq!(
            values.get("image").unwrap(),
            &json!({
                "name": "registry.gitlab.com/group/app",
                "tag": "1.4.3",
                "pullPolicy": "Always"
            })
        );
    }

    #[test]
    fn test_bundles_never_get_image_override() {
        let dir = TempDir::new().unwrap();
        let source = ChartSource::LocalBundleDirectory {
            path: dir.path().to_path_buf(),
        };
        let user = dir.path().join("values.yaml");
        fs::write(&user, "replicas: 2\n").unwrap();

        let values =
            assemble_values(&source, &[user], Some(&image()), &identity(), &YamlValuesMerge)
                .unwrap();
        assert!(values.get("image").is_none());
        assert_eq!(values.get("replicas").unwrap(), 2);
    }

    #[test]
    fn test_remote_chart_uses_only_user_files() {
        let dir = TempDir::new().unwrap();
        let source = ChartSource::Remote {
            repository_url: "https://charts.bitnami.com/bitnami".to_string(),
            chart_name: "redis".to_string(),
            version: "17.0.0".to_string(),
        };
        let first = dir.path().join("a.yaml");
        let second = dir.path().join("b.yaml");
        fs::write(&first, "auth:\n  enabled: true\n  user: a\n").unwrap();
        fs::write(&second, "auth:\n  user: b\n").unwrap();

        let values =
            assemble_values(&source, &[first, second], None, &identity(), &YamlValuesMerge)
                .unwrap();
        assert_eq!(values.inner(), &json!({"auth": {"enabled": true, "user": "b"}}));
    }

    #[test]
    fn test_user_file_is_substituted_in_place() {
        let dir = TempDir::new().unwrap();
        let source = ChartSource::LocalBundleFile {
            path: dir.path().join("job.yaml"),
        };
        let user = dir.path().join("values.yaml");
        fs::write(&user, "release: \"{{ .Name }}\"\n").unwrap();

        assemble_values(&source, &[user.clone()], None, &identity(), &YamlValuesMerge).unwrap();
        assert_eq!(fs::read_to_string(&user).unwrap(), "release: \"web\"\n");
    }

    #[test]
    fn test_missing_user_file_fails() {
        let dir = TempDir::new().unwrap();
        let source = ChartSource::LocalBundleDirectory {
            path: dir.path().to_path_buf(),
        };
        let err = assemble_values(
            &source,
            &[dir.path().join("absent.yaml")],
            None,
            &identity(),
            &YamlValuesMerge,
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SynthesisFailed);
    }
}
