//! Department labels.
//!
//! Departments are free text configured per tenant. Tenants that have not
//! configured any fall back to [`DEFAULT_DEPARTMENTS`].

use serde::{Deserialize, Serialize};

use crate::models::tenant::TenantCode;

pub const DEFAULT_DEPARTMENTS: [&str; 6] = [
    "Main Store",
    "Kitchen",
    "Housekeeping",
    "F&B",
    "Maintenance",
    "Admin",
];

/// Department assigned to tenant administrators created by provisioning.
pub const ADMIN_DEPARTMENT: &str = "Admin";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Department {
    pub id: String,
    pub tenant: TenantCode,
    pub name: String,
}
