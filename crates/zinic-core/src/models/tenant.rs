//! Tenant (hotel) domain model.
//!
//! Tenants provide full data isolation. A tenant is identified by a short
//! alphanumeric code that is unique across the network and compared
//! case-insensitively; the canonical form is uppercase.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Canonical (trimmed, uppercase) tenant code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct TenantCode(String);

impl TenantCode {
    pub fn new(raw: &str) -> Self {
        Self(raw.trim().to_ascii_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether this code follows the sandbox pattern `<prefix>XXXX`,
    /// e.g. `DEMO-4KQZ`.
    pub fn is_sandbox(&self, prefix: &str) -> bool {
        let prefix = prefix.to_ascii_uppercase();
        match self.0.strip_prefix(&prefix) {
            Some(rest) => !rest.is_empty() && rest.chars().all(|c| c.is_ascii_alphanumeric()),
            None => false,
        }
    }
}

impl From<String> for TenantCode {
    fn from(raw: String) -> Self {
        Self::new(&raw)
    }
}

impl From<&str> for TenantCode {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

impl From<TenantCode> for String {
    fn from(code: TenantCode) -> Self {
        code.0
    }
}

impl fmt::Display for TenantCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A hotel: the unit of isolation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tenant {
    pub code: TenantCode,
    pub name: String,
    /// Suspended tenants cannot authenticate.
    pub is_active: bool,
    pub max_users: u32,
    pub max_items: u32,
    pub contact_email: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Fields required to provision a new tenant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTenant {
    pub code: TenantCode,
    pub name: String,
    pub max_users: u32,
    pub max_items: u32,
    pub contact_email: Option<String>,
}

/// Fields the super role may change on an existing tenant.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UpdateTenant {
    pub name: Option<String>,
    pub is_active: Option<bool>,
    pub max_users: Option<u32>,
    pub max_items: Option<u32>,
    /// `Some(Some(val))` = set, `Some(None)` = clear, `None` = no change.
    pub contact_email: Option<Option<String>>,
}

impl Tenant {
    pub fn apply(&mut self, update: UpdateTenant) {
        if let Some(name) = update.name {
            self.name = name;
        }
        if let Some(is_active) = update.is_active {
            self.is_active = is_active;
        }
        if let Some(max_users) = update.max_users {
            self.max_users = max_users;
        }
        if let Some(max_items) = update.max_items {
            self.max_items = max_items;
        }
        if let Some(contact_email) = update.contact_email {
            self.contact_email = contact_email;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_canonicalised_to_uppercase() {
        assert_eq!(TenantCode::new(" grand01 ").as_str(), "GRAND01");
        assert_eq!(TenantCode::from("Grand01"), TenantCode::from("GRAND01"));
    }

    #[test]
    fn sandbox_pattern_requires_suffix() {
        assert!(TenantCode::new("demo-ab12").is_sandbox("DEMO-"));
        assert!(!TenantCode::new("DEMO-").is_sandbox("DEMO-"));
        assert!(!TenantCode::new("GRAND01").is_sandbox("DEMO-"));
        assert!(!TenantCode::new("DEMO-A B").is_sandbox("DEMO-"));
    }

    #[test]
    fn deserialising_canonicalises() {
        let code: TenantCode = serde_json::from_str("\"hq\"").unwrap();
        assert_eq!(code.as_str(), "HQ");
    }
}
