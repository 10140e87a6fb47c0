//! CI environment snapshot
//!
//! The context is read once at process start and handed by value to the
//! components that need it. Nothing else in pipewright reads CI variables.

/// Docker-style aliases that win over the GitLab registry variables
const REGISTRY_ALIASES: [(&str, &str); 3] = [
    ("DOCKER_HOST", "CI_REGISTRY"),
    ("DOCKER_USER", "CI_REGISTRY_USER"),
    ("DOCKER_PASSWORD", "CI_REGISTRY_PASSWORD"),
];

/// Immutable snapshot of the CI metadata of the running job
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvironmentContext {
    /// Full commit SHA (`CI_COMMIT_SHA`)
    pub commit_hash: String,

    /// Tag being built, if the pipeline runs for a tag (`CI_COMMIT_TAG`)
    pub commit_tag: String,

    /// Branch or tag name (`CI_COMMIT_REF_NAME`)
    pub branch_name: String,

    /// Slugified ref name (`CI_COMMIT_REF_SLUG`)
    pub commit_slug: String,

    /// Numeric project identifier (`CI_PROJECT_ID`)
    pub project_id: String,

    /// Namespaced project path, e.g. `group/app` (`CI_PROJECT_PATH`)
    pub project_path: String,

    /// Slugified project path (`CI_PROJECT_PATH_SLUG`)
    pub project_slug: String,

    /// Checkout directory (`CI_PROJECT_DIR`)
    pub project_dir: String,

    /// Container registry host (`CI_REGISTRY` or `DOCKER_HOST`)
    pub registry_host: String,

    /// Project image path in the registry (`CI_REGISTRY_IMAGE`)
    pub registry_image: String,

    /// Registry user (`CI_REGISTRY_USER` or `DOCKER_USER`)
    pub registry_user: String,

    /// Registry password (`CI_REGISTRY_PASSWORD` or `DOCKER_PASSWORD`)
    pub registry_password: String,

    /// GitLab server host (`CI_SERVER_HOST`)
    pub server_host: String,
}

impl EnvironmentContext {
    /// Read the context from the process environment
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read the context through an arbitrary variable lookup
    ///
    /// Unset variables become empty strings.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| -> String {
            if let Some((alias, _)) = REGISTRY_ALIASES.iter().find(|(_, target)| *target == key) {
                if let Some(value) = lookup(alias).filter(|v| !v.is_empty()) {
                    return value;
                }
            }
            lookup(key).unwrap_or_default()
        };

        Self {
            commit_hash: var("CI_COMMIT_SHA"),
            commit_tag: var("CI_COMMIT_TAG"),
            branch_name: var("CI_COMMIT_REF_NAME"),
            commit_slug: var("CI_COMMIT_REF_SLUG"),
            project_id: var("CI_PROJECT_ID"),
            project_path: var("CI_PROJECT_PATH"),
            project_slug: var("CI_PROJECT_PATH_SLUG"),
            project_dir: var("CI_PROJECT_DIR"),
            registry_host: var("CI_REGISTRY"),
            registry_image: var("CI_REGISTRY_IMAGE"),
            registry_user: var("CI_REGISTRY_USER"),
            registry_password: var("CI_REGISTRY_PASSWORD"),
            server_host: var("CI_SERVER_HOST"),
        }
    }

    /// Start building a context explicitly
    pub fn builder() -> EnvironmentContextBuilder {
        EnvironmentContextBuilder::default()
    }

    /// Connection settings for a remote tag lookup, if all of them are present
    pub fn tag_connection(&self) -> Option<TagConnection> {
        let fields = [
            &self.server_host,
            &self.project_id,
            &self.registry_user,
            &self.registry_password,
        ];
        if fields.iter().any(|f| f.is_empty()) {
            return None;
        }

        Some(TagConnection {
            server_host: self.server_host.clone(),
            project_id: self.project_id.clone(),
            user: self.registry_user.clone(),
            password: self.registry_password.clone(),
        })
    }
}

/// Builder for [`EnvironmentContext`]
#[derive(Debug, Clone, Default)]
pub struct EnvironmentContextBuilder {
    inner: EnvironmentContext,
}

impl EnvironmentContextBuilder {
    pub fn commit_hash(mut self, value: impl Into<String>) -> Self {
        self.inner.commit_hash = value.into();
        self
    }

    pub fn commit_tag(mut self, value: impl Into<String>) -> Self {
        self.inner.commit_tag = value.into();
        self
    }

    pub fn branch_name(mut self, value: impl Into<String>) -> Self {
        self.inner.branch_name = value.into();
        self
    }

    pub fn project_id(mut self, value: impl Into<String>) -> Self {
        self.inner.project_id = value.into();
        self
    }

    pub fn project_path(mut self, value: impl Into<String>) -> Self {
        self.inner.project_path = value.into();
        self
    }

    pub fn project_slug(mut self, value: impl Into<String>) -> Self {
        self.inner.project_slug = value.into();
        self
    }

    pub fn registry_host(mut self, value: impl Into<String>) -> Self {
        self.inner.registry_host = value.into();
        self
    }

    pub fn registry_credentials(
        mut self,
        user: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.inner.registry_user = user.into();
        self.inner.registry_password = password.into();
        self
    }

    pub fn server_host(mut self, value: impl Into<String>) -> Self {
        self.inner.server_host = value.into();
        self
    }

    pub fn build(self) -> EnvironmentContext {
        self.inner
    }
}

/// Everything needed to ask the GitLab API for the latest tag
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagConnection {
    pub server_host: String,
    pub project_id: String,
    pub user: String,
    pub password: String,
}
