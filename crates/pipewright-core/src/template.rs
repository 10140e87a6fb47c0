//! Tag and image path templates
//!
//! Tag templates understand the following tokens:
//!
//! | token | expands to |
//! |-------|------------|
//! | `%t`  | full SemVer tag (`CI_COMMIT_TAG` or the latest repository tag) |
//! | `%m`  | `<major>` of `%t` |
//! | `%n`  | `<major>.<minor>` of `%t` |
//! | `%d`  | current date, `YYYY-MM-DD` |
//! | `%h`  | first seven characters of the commit hash |
//! | `%r`  | first `N.N.N` found in the branch name |
//! | `%@`  | the tags `%t`, `%m`, `%n` and `latest` (whole template only) |
//!
//! Image path templates understand `%r` (registry host) and `%p`
//! (project path).

use chrono::{Local, NaiveDate};
use once_cell::sync::{Lazy, OnceCell};
use regex::Regex;
use tracing::debug;

use crate::context::EnvironmentContext;
use crate::error::{CoreError, Result};
use crate::lookup::TagLookup;

/// Macro that expands to every derived tag
pub const ALL_TAGS_MACRO: &str = "%@";

/// Members of [`ALL_TAGS_MACRO`], in output order
const ALL_TAGS_MEMBERS: [&str; 4] = ["%t", "%m", "%n", "latest"];

/// Expansions equal to this are dropped from tag batches (`v0.x.y` majors)
const ZERO_SENTINEL: &str = "0";

const SHORT_HASH_LEN: usize = 7;

static SEMVER_STRICT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([0-9]+)\.([0-9]+)\.([0-9]+)$").expect("valid regex"));

static SEMVER_RELAXED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[0-9]+\.[0-9]+\.[0-9]+").expect("valid regex"));

/// Expands tag and image templates against a CI context
pub struct TemplateResolver {
    env: EnvironmentContext,
    tag_lookup: Option<Box<dyn TagLookup>>,
    date: Option<NaiveDate>,
    full_tag: OnceCell<String>,
}

impl TemplateResolver {
    pub fn new(env: EnvironmentContext) -> Self {
        Self {
            env,
            tag_lookup: None,
            date: None,
            full_tag: OnceCell::new(),
        }
    }

    /// Use a remote repository to find the tag when `CI_COMMIT_TAG` is empty
    pub fn with_tag_lookup(mut self, lookup: Box<dyn TagLookup>) -> Self {
        self.tag_lookup = Some(lookup);
        self
    }

    /// Pin the date used for `%d`
    pub fn with_date(mut self, date: NaiveDate) -> Self {
        self.date = Some(date);
        self
    }

    /// The CI context this resolver reads from
    pub fn context(&self) -> &EnvironmentContext {
        &self.env
    }

    /// Expand a list of tag templates
    ///
    /// Evaluates in order and fails on the first error. Expansions that
    /// yield exactly `"0"` are skipped.
    pub async fn expand_tags(&self, templates: &[String]) -> Result<Vec<String>> {
        let mut tags = Vec::new();

        for template in templates {
            let members: Vec<&str> = if template == ALL_TAGS_MACRO {
                ALL_TAGS_MEMBERS.to_vec()
            } else {
                vec![template.as_str()]
            };

            for member in members {
                let tag = self.expand_tag(member).await?;
                if tag == ZERO_SENTINEL {
                    debug!(template = member, "skipping tag expanding to 0");
                    continue;
                }
                tags.push(tag);
            }
        }

        Ok(tags)
    }

    /// Expand a single tag template
    pub async fn expand_tag(&self, template: &str) -> Result<String> {
        let mut expanded = template.to_string();

        if ["%t", "%m", "%n"].iter().any(|t| expanded.contains(t)) {
            let full_tag = self.full_tag().await?;
            let (major, minor) = split_version(full_tag)?;
            expanded = expanded
                .replace("%t", full_tag)
                .replace("%m", major)
                .replace("%n", &format!("{}.{}", major, minor));
        }

        if expanded.contains("%d") {
            let today = self.date.unwrap_or_else(|| Local::now().date_naive());
            expanded = expanded.replace("%d", &today.format("%Y-%m-%d").to_string());
        }

        if expanded.contains("%h") {
            if self.env.commit_hash.is_empty() {
                return Err(CoreError::configuration(
                    "cannot use template %h as CI_COMMIT_SHA is not set",
                ));
            }
            let short: String = self.env.commit_hash.chars().take(SHORT_HASH_LEN).collect();
            expanded = expanded.replace("%h", &short);
        }

        if expanded.contains("%r") {
            let branch = &self.env.branch_name;
            if branch.is_empty() {
                return Err(CoreError::configuration(
                    "cannot use template %r as CI_COMMIT_REF_NAME is not set",
                ));
            }
            let version = SEMVER_RELAXED.find(branch).ok_or_else(|| {
                CoreError::format(format!(
                    "cannot use template %r as branch '{}' does not contain valid SemVer2",
                    branch
                ))
            })?;
            expanded = expanded.replace("%r", version.as_str());
        }

        debug!(template, tag = %expanded, "expanded tag template");
        Ok(expanded)
    }

    /// Expand an image path template
    ///
    /// Text other than `%r` and `%p` is kept as is.
    pub fn expand_image_path(&self, template: &str) -> Result<String> {
        let mut expanded = template.to_string();

        if expanded.contains("%r") {
            if self.env.registry_host.is_empty() {
                return Err(CoreError::configuration(
                    "cannot use template %r as CI_REGISTRY is not set",
                ));
            }
            expanded = expanded.replace("%r", &self.env.registry_host);
        }

        if expanded.contains("%p") {
            if self.env.project_path.is_empty() {
                return Err(CoreError::configuration(
                    "cannot use template %p as CI_PROJECT_PATH is not set",
                ));
            }
            expanded = expanded.replace("%p", &self.env.project_path);
        }

        Ok(expanded)
    }

    /// The validated full tag, resolved at most once per resolver
    async fn full_tag(&self) -> Result<&str> {
        if let Some(tag) = self.full_tag.get() {
            return Ok(tag.as_str());
        }

        let tag = if !self.env.commit_tag.is_empty() {
            self.env.commit_tag.clone()
        } else {
            let lookup = self.tag_lookup.as_ref().ok_or_else(|| {
                CoreError::configuration(
                    "using templates %t, %m or %n requires CI_COMMIT_TAG or a connection to a \
                     GitLab repository; set CI_SERVER_HOST, CI_PROJECT_ID, CI_REGISTRY_USER and \
                     CI_REGISTRY_PASSWORD to initiate such a connection",
                )
            })?;
            let tag = lookup.latest_tag().await.map_err(|e| {
                CoreError::lookup(format!("cannot fetch latest tag from repository: {}", e))
            })?;
            debug!(tag = %tag, "resolved tag from repository");
            tag
        };

        if !SEMVER_STRICT.is_match(&tag) {
            return Err(CoreError::format(format!(
                "tag '{}' does not follow SemVer2",
                tag
            )));
        }

        Ok(self.full_tag.get_or_init(|| tag).as_str())
    }
}

/// Major and minor component of a strict `MAJOR.MINOR.PATCH` string
fn split_version(tag: &str) -> Result<(&str, &str)> {
    let caps = SEMVER_STRICT
        .captures(tag)
        .ok_or_else(|| CoreError::format(format!("tag '{}' does not follow SemVer2", tag)))?;
    match (caps.get(1), caps.get(2)) {
        (Some(major), Some(minor)) => Ok((major.as_str(), minor.as_str())),
        _ => Err(CoreError::format(format!(
            "tag '{}' does not follow SemVer2",
            tag
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use async_trait::async_trait;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const HASH: &str = "38d3ff0737d2514f789dc39c2a5d8ca44821a077f0e71f4024cd83b9ba936a1f";

    struct FixedTag {
        tag: Result<String>,
        calls: Arc<AtomicUsize>,
    }

    impl FixedTag {
        fn ok(tag: &str) -> (Self, Arc<AtomicUsize>) {
            let calls = Arc::new(AtomicUsize::new(0));
            (
                Self {
                    tag: Ok(tag.to_string()),
                    calls: calls.clone(),
                },
                calls,
            )
        }

        fn failing() -> Self {
            Self {
                tag: Err(CoreError::lookup("No tag found")),
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    #[async_trait]
    impl TagLookup for FixedTag {
        async fn latest_tag(&self) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.tag {
                Ok(tag) => Ok(tag.clone()),
                Err(e) => Err(CoreError::lookup(e.to_string())),
            }
        }
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 9).unwrap()
    }

    fn resolver(tag: &str) -> TemplateResolver {
        let env = EnvironmentContext::builder()
            .commit_tag(tag)
            .commit_hash(HASH)
            .build();
        TemplateResolver::new(env).with_date(date())
    }

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_tag_tokens() {
        let r = resolver("1.4.3");

        assert_eq!(r.expand_tag("%t").await.unwrap(), "1.4.3");
        assert_eq!(r.expand_tag("%m").await.unwrap(), "1");
        assert_eq!(r.expand_tag("%n").await.unwrap(), "1.4");
        assert_eq!(r.expand_tag("%h").await.unwrap(), "38d3ff0");
        assert_eq!(r.expand_tag("%d").await.unwrap(), "2024-03-09");
    }

    #[tokio::test]
    async fn test_combined_template() {
        let r = resolver("1.4.3");
        assert_eq!(
            r.expand_tag("%t-rc-%d-%h").await.unwrap(),
            "1.4.3-rc-2024-03-09-38d3ff0"
        );
    }

    #[tokio::test]
    async fn test_date_defaults_to_today() {
        let env = EnvironmentContext::builder().build();
        let r = TemplateResolver::new(env);
        let today = Local::now().format("%Y-%m-%d").to_string();
        assert_eq!(r.expand_tag("%d").await.unwrap(), today);
    }

    #[tokio::test]
    async fn test_multi_digit_components() {
        let r = resolver("12.40.3");
        assert_eq!(r.expand_tag("%m").await.unwrap(), "12");
        assert_eq!(r.expand_tag("%n").await.unwrap(), "12.40");
        assert_eq!(r.expand_tag("v%t").await.unwrap(), "v12.40.3");
    }

    #[tokio::test]
    async fn test_literal_template_passes_through() {
        let r = resolver("");
        assert_eq!(r.expand_tag("latest").await.unwrap(), "latest");
        assert_eq!(r.expand_tag("stable-%x").await.unwrap(), "stable-%x");
    }

    #[tokio::test]
    async fn test_all_tags_macro() {
        let r = resolver("1.4.3");
        let tags = r.expand_tags(&strings(&["%@"])).await.unwrap();
        assert_eq!(tags, strings(&["1.4.3", "1", "1.4", "latest"]));
    }

    #[tokio::test]
    async fn test_all_tags_macro_suppresses_zero_major() {
        let r = resolver("0.4.3");
        let tags = r.expand_tags(&strings(&["%@"])).await.unwrap();
        assert_eq!(tags, strings(&["0.4.3", "0.4", "latest"]));
    }

    #[tokio::test]
    async fn test_batch_keeps_order() {
        let r = resolver("2.0.1");
        let tags = r
            .expand_tags(&strings(&["%h", "%m", "nightly-%d"]))
            .await
            .unwrap();
        assert_eq!(tags, strings(&["38d3ff0", "2", "nightly-2024-03-09"]));
    }

    #[tokio::test]
    async fn test_batch_fails_fast() {
        let env = EnvironmentContext::builder().commit_tag("1.0.0").build();
        let r = TemplateResolver::new(env);
        let err = r
            .expand_tags(&strings(&["%t", "%h", "latest"]))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfigurationMissing);
    }

    #[tokio::test]
    async fn test_missing_hash() {
        let r = TemplateResolver::new(EnvironmentContext::default());
        let err = r.expand_tag("%h").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfigurationMissing);
        assert!(err.to_string().contains("CI_COMMIT_SHA"));
    }

    #[tokio::test]
    async fn test_short_hash_is_kept_whole() {
        let env = EnvironmentContext::builder().commit_hash("abc12").build();
        let r = TemplateResolver::new(env);
        assert_eq!(r.expand_tag("%h").await.unwrap(), "abc12");
    }

    #[tokio::test]
    async fn test_tag_must_be_strict_semver() {
        for bad in ["v1.2.3", "1.2", "1.2.3-rc.1", "1.2.3+build"] {
            let err = resolver(bad).expand_tag("%t").await.unwrap_err();
            assert_eq!(err.kind(), ErrorKind::FormatInvalid, "tag {}", bad);
            assert!(err.to_string().contains(bad));
        }
    }

    #[tokio::test]
    async fn test_tag_group_without_tag_or_connection() {
        let r = TemplateResolver::new(EnvironmentContext::default());
        let err = r.expand_tag("%n").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfigurationMissing);
        let message = err.to_string();
        for var in [
            "CI_SERVER_HOST",
            "CI_PROJECT_ID",
            "CI_REGISTRY_USER",
            "CI_REGISTRY_PASSWORD",
        ] {
            assert!(message.contains(var), "missing {} in: {}", var, message);
        }
    }

    #[tokio::test]
    async fn test_tag_from_lookup_is_resolved_once() {
        let (lookup, calls) = FixedTag::ok("3.1.4");
        let r = TemplateResolver::new(EnvironmentContext::default())
            .with_tag_lookup(Box::new(lookup));

        let tags = r.expand_tags(&strings(&["%@"])).await.unwrap();
        assert_eq!(tags, strings(&["3.1.4", "3", "3.1", "latest"]));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_commit_tag_wins_over_lookup() {
        let (lookup, calls) = FixedTag::ok("9.9.9");
        let env = EnvironmentContext::builder().commit_tag("1.0.0").build();
        let r = TemplateResolver::new(env).with_tag_lookup(Box::new(lookup));

        assert_eq!(r.expand_tag("%t").await.unwrap(), "1.0.0");
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_lookup_failure() {
        let r = TemplateResolver::new(EnvironmentContext::default())
            .with_tag_lookup(Box::new(FixedTag::failing()));
        let err = r.expand_tag("%t").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::LookupFailed);
        assert!(err.to_string().contains("No tag found"));
    }

    #[tokio::test]
    async fn test_lookup_result_is_validated() {
        let (lookup, _) = FixedTag::ok("release-7");
        let r = TemplateResolver::new(EnvironmentContext::default())
            .with_tag_lookup(Box::new(lookup));
        let err = r.expand_tag("%t").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FormatInvalid);
    }

    #[tokio::test]
    async fn test_branch_version() {
        let env = EnvironmentContext::builder()
            .branch_name("release/12.3.4-hotfix")
            .build();
        let r = TemplateResolver::new(env);
        assert_eq!(r.expand_tag("%r").await.unwrap(), "12.3.4");
        assert_eq!(r.expand_tag("%r-rc").await.unwrap(), "12.3.4-rc");
    }

    #[tokio::test]
    async fn test_branch_version_takes_first_triple() {
        let env = EnvironmentContext::builder()
            .branch_name("backport-1.2.3-to-2.0.0")
            .build();
        let r = TemplateResolver::new(env);
        assert_eq!(r.expand_tag("%r").await.unwrap(), "1.2.3");
    }

    #[tokio::test]
    async fn test_branch_version_errors() {
        let r = TemplateResolver::new(EnvironmentContext::default());
        let err = r.expand_tag("%r").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfigurationMissing);

        let env = EnvironmentContext::builder().branch_name("main").build();
        let r = TemplateResolver::new(env);
        let err = r.expand_tag("%r").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FormatInvalid);
        assert!(err.to_string().contains("main"));
    }

    #[test]
    fn test_image_path() {
        let env = EnvironmentContext::builder()
            .registry_host("registry.gitlab.com")
            .project_path("group/app")
            .build();
        let r = TemplateResolver::new(env);

        assert_eq!(
            r.expand_image_path("%r/%p").unwrap(),
            "registry.gitlab.com/group/app"
        );
        assert_eq!(
            r.expand_image_path("%r/%p/worker").unwrap(),
            "registry.gitlab.com/group/app/worker"
        );
        assert_eq!(r.expand_image_path("nginx").unwrap(), "nginx");
        assert_eq!(r.expand_image_path("ghcr.io/%x").unwrap(), "ghcr.io/%x");
    }

    #[test]
    fn test_image_path_missing_context() {
        let r = TemplateResolver::new(EnvironmentContext::default());

        let err = r.expand_image_path("%r/app").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfigurationMissing);
        assert!(err.to_string().contains("CI_REGISTRY"));

        let err = r.expand_image_path("docker.io/%p").unwrap_err();
        assert!(err.to_string().contains("CI_PROJECT_PATH"));
    }
}
