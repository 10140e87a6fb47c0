//! Bundle workspaces
//!
//! A bundle is a directory (or a single file) of plain manifests. To
//! deploy it, pipewright builds a throwaway chart around it: a temporary
//! directory with a synthesized `Chart.yaml` and every manifest linked
//! flat into `templates/`.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::chart::{ChartSource, TEMPLATES_DIR};
use crate::descriptor::{BUNDLE_VERSION, ChartDescriptor, DEPENDENCIES_FILE};
use crate::error::{CoreError, Result};

/// Temporary chart built around a bundle
///
/// The directory is removed when the workspace is dropped.
#[derive(Debug)]
pub struct BundleWorkspace {
    dir: TempDir,
    descriptor: ChartDescriptor,
}

impl BundleWorkspace {
    /// Build the workspace for a bundle source
    ///
    /// `version` is the chart version; an empty one means
    /// [`BUNDLE_VERSION`]. Fails with `SynthesisFailed` for non-bundle
    /// sources.
    pub fn materialize(source: &ChartSource, name: &str, version: &str) -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix("pipewright-bundle-")
            .tempdir()
            .map_err(|e| CoreError::synthesis(format!("cannot create bundle directory: {}", e)))?;

        let templates = dir.path().join(TEMPLATES_DIR);
        std::fs::create_dir(&templates).map_err(|e| {
            CoreError::synthesis(format!(
                "cannot create {}: {}",
                templates.display(),
                e
            ))
        })?;

        let sidecar_dir = match source {
            ChartSource::LocalBundleDirectory { path } => {
                link_directory(path, &templates)?;
                Some(path.as_path())
            }
            ChartSource::LocalBundleFile { path } => {
                let file_name = path.file_name().ok_or_else(|| {
                    CoreError::synthesis(format!("invalid bundle file {}", path.display()))
                })?;
                link_or_copy(path, &templates.join(file_name))?;
                None
            }
            other => {
                return Err(CoreError::synthesis(format!(
                    "{} cannot be materialized as a bundle",
                    other.mode()
                )));
            }
        };

        let version = if version.is_empty() {
            BUNDLE_VERSION
        } else {
            version
        };
        let descriptor = ChartDescriptor::synthesize(name, version, BUNDLE_VERSION, sidecar_dir)?;
        descriptor.write_to(dir.path())?;

        debug!(
            bundle = %dir.path().display(),
            mode = source.mode(),
            "materialized bundle workspace"
        );

        Ok(Self { dir, descriptor })
    }

    /// Root of the synthesized chart
    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// The descriptor written into the workspace
    pub fn descriptor(&self) -> &ChartDescriptor {
        &self.descriptor
    }

    /// File names under `templates/`, sorted
    pub fn templates(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = std::fs::read_dir(self.root().join(TEMPLATES_DIR))?
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        Ok(names)
    }
}

/// Link every file below `bundle` into `templates` under its flattened name
///
/// Two files flattening to the same name fail the synthesis.
fn link_directory(bundle: &Path, templates: &Path) -> Result<()> {
    let mut linked: HashMap<String, PathBuf> = HashMap::new();

    for entry in WalkDir::new(bundle).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            CoreError::synthesis(format!("cannot scan bundle {}: {}", bundle.display(), e))
        })?;
        if !entry.file_type().is_file() {
            continue;
        }

        let relative = entry.path().strip_prefix(bundle).map_err(|e| {
            CoreError::synthesis(format!(
                "unexpected bundle entry {}: {}",
                entry.path().display(),
                e
            ))
        })?;
        if relative == Path::new(DEPENDENCIES_FILE) {
            continue;
        }

        let name = flatten(relative);
        if let Some(first) = linked.get(&name) {
            return Err(CoreError::synthesis(format!(
                "bundle files {} and {} both flatten to {}",
                first.display(),
                entry.path().display(),
                name
            )));
        }
        link_or_copy(entry.path(), &templates.join(&name))?;
        linked.insert(name, entry.path().to_path_buf());
    }
    Ok(())
}

/// `apps/web/deploy.yaml` becomes `apps-web-deploy.yaml`
fn flatten(relative: &Path) -> String {
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("-")
}

/// Hard-link `from` to `to`, copying only when they sit on different devices
///
/// An existing `to` is never touched.
fn link_or_copy(from: &Path, to: &Path) -> Result<PathBuf> {
    if to.exists() {
        return Err(CoreError::synthesis(format!(
            "cannot link {} into bundle: {} already exists",
            from.display(),
            to.display()
        )));
    }

    match std::fs::hard_link(from, to) {
        Ok(()) => {}
        Err(link_err) if link_err.kind() == io::ErrorKind::CrossesDevices => {
            warn!(
                file = %from.display(),
                error = %link_err,
                "cannot hard-link bundle file across devices, copying instead"
            );
            std::fs::copy(from, to).map_err(|e| {
                CoreError::synthesis(format!(
                    "cannot copy {} into bundle: {}",
                    from.display(),
                    e
                ))
            })?;
        }
        Err(e) => {
            return Err(CoreError::synthesis(format!(
                "cannot link {} into bundle: {}",
                from.display(),
                e
            )));
        }
    }
    Ok(to.to_path_buf())
}
