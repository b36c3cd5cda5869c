//! Sync configuration.

use zinic_core::models::demo::SANDBOX_LIFETIME_HOURS;

/// Configuration for the sync orchestrator.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Optional pepper prepended to secrets before Argon2id hashing.
    pub pepper: Option<String>,
    /// Tenant codes starting with this prefix are sandbox sessions.
    pub sandbox_prefix: String,
    /// Sandbox lifetime in hours (default: 48).
    pub sandbox_lifetime_hours: i64,
    /// Limits applied to freshly provisioned sandboxes.
    pub sandbox_max_users: u32,
    pub sandbox_max_items: u32,
    /// Change-feed buffer per subscriber before it lags.
    pub feed_capacity: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            pepper: None,
            sandbox_prefix: "DEMO-".into(),
            sandbox_lifetime_hours: SANDBOX_LIFETIME_HOURS,
            sandbox_max_users: 5,
            sandbox_max_items: 100,
            feed_capacity: 256,
        }
    }
}
