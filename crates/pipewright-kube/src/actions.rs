//! Action options for install and upgrade operations

use chrono::Duration;

/// Upper bound for a single install or upgrade, including the wait
pub const APPLY_TIMEOUT_MINUTES: i64 = 15;

/// Revisions kept per release after an upgrade
pub const MAX_HISTORY: u32 = 10;

/// Options for install operation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InstallOptions {
    /// Release name
    pub name: String,

    /// Target namespace
    pub namespace: String,

    /// Wait for resources to be ready
    pub wait: bool,

    /// Timeout for wait
    pub timeout: Option<Duration>,

    /// Roll back on failure (only with wait=true)
    pub atomic: bool,

    /// Skip hooks
    pub no_hooks: bool,

    /// Simulate the install
    pub dry_run: bool,
}

impl InstallOptions {
    /// Create default install options with name and namespace
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            ..Default::default()
        }
    }

    /// The policy every deployment runs with: hooks, wait and atomic
    /// within [`APPLY_TIMEOUT_MINUTES`]
    pub fn deployment(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self::new(name, namespace).with_atomic(Duration::minutes(APPLY_TIMEOUT_MINUTES))
    }

    /// Enable waiting for resources
    pub fn with_wait(mut self, timeout: Duration) -> Self {
        self.wait = true;
        self.timeout = Some(timeout);
        self
    }

    /// Enable atomic mode (roll back on failure)
    pub fn with_atomic(mut self, timeout: Duration) -> Self {
        self.wait = true;
        self.atomic = true;
        self.timeout = Some(timeout);
        self
    }

    /// Enable or disable dry-run mode
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }
}

/// Options for upgrade operation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpgradeOptions {
    /// Release name
    pub name: String,

    /// Target namespace
    pub namespace: String,

    /// Wait for resources to be ready
    pub wait: bool,

    /// Timeout for wait
    pub timeout: Option<Duration>,

    /// Roll back on failure
    pub atomic: bool,

    /// Skip hooks
    pub no_hooks: bool,

    /// Simulate the upgrade
    pub dry_run: bool,

    /// Maximum history to keep
    pub max_history: Option<u32>,
}

impl UpgradeOptions {
    /// Create default upgrade options
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            ..Default::default()
        }
    }

    /// The install policy plus history pruning to [`MAX_HISTORY`]
    pub fn deployment(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self::new(name, namespace)
            .with_atomic(Duration::minutes(APPLY_TIMEOUT_MINUTES))
            .with_max_history(MAX_HISTORY)
    }

    /// Enable atomic mode
    pub fn with_atomic(mut self, timeout: Duration) -> Self {
        self.wait = true;
        self.atomic = true;
        self.timeout = Some(timeout);
        self
    }

    /// Keep at most `max` revisions
    pub fn with_max_history(mut self, max: u32) -> Self {
        self.max_history = Some(max);
        self
    }

    /// Enable or disable dry-run mode
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }
}
