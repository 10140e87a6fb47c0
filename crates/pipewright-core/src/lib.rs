//! Pipewright Core - CI context, tag templates and chart sourcing
//!
//! This crate provides the pieces of pipewright that need neither a cluster
//! nor a network:
//! - `EnvironmentContext`: Snapshot of the GitLab CI variables
//! - `TemplateResolver`: Expansion of tag and image path templates
//! - `ChartSource`: Classification of where a release's chart comes from
//! - `ChartDescriptor` / `BundleWorkspace`: Chart synthesis for plain manifests
//! - `Values`: Release values with deep merge support

pub mod bundle;
pub mod chart;
pub mod context;
pub mod descriptor;
pub mod error;
pub mod lookup;
pub mod placeholders;
pub mod template;
pub mod values;

pub use bundle::BundleWorkspace;
pub use chart::{CHART_FILE, ChartSource, LoadedChart, TEMPLATES_DIR, VALUES_FILE};
pub use context::{EnvironmentContext, EnvironmentContextBuilder, TagConnection};
pub use descriptor::{BUNDLE_VERSION, ChartDescriptor, DEPENDENCIES_FILE};
pub use error::{CoreError, ErrorKind, Result};
pub use lookup::TagLookup;
pub use placeholders::ReleaseIdentity;
pub use template::{ALL_TAGS_MACRO, TemplateResolver};
pub use values::Values;
