//! Demo lead and sandbox lifetime.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::models::tenant::TenantCode;

/// Sandboxes and their credentials live this long after registration.
pub const SANDBOX_LIFETIME_HOURS: i64 = 48;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LeadStatus {
    Pending,
    /// The prospect has logged in to the issued sandbox.
    Verified,
}

impl LeadStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            LeadStatus::Pending => "PENDING",
            LeadStatus::Verified => "VERIFIED",
        }
    }
}

/// A prospect who requested a trial, and the sandbox code issued to them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DemoLead {
    pub id: String,
    pub full_name: String,
    pub hotel_name: String,
    pub position: String,
    pub location: String,
    pub email: String,
    pub mobile: String,
    pub registered_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub tenant: TenantCode,
    pub status: LeadStatus,
}

impl DemoLead {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Lead capture form.
#[derive(Debug, Clone, Default)]
pub struct CreateDemoLead {
    pub full_name: String,
    pub hotel_name: String,
    pub position: String,
    pub location: String,
    pub email: String,
    pub mobile: String,
}

pub fn sandbox_expiry(registered_at: DateTime<Utc>, lifetime_hours: i64) -> DateTime<Utc> {
    registered_at + Duration::hours(lifetime_hours)
}
