//! Staff (user) domain model.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::models::tenant::TenantCode;
use crate::permission::Grants;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    #[serde(rename = "SUPERADMIN")]
    Super,
    #[serde(rename = "HOTEL_ADMIN")]
    TenantAdmin,
    #[serde(rename = "DEPT_USER")]
    DepartmentUser,
    #[serde(rename = "APPROVER")]
    Approver,
    #[serde(rename = "VIEWER")]
    Viewer,
}

impl Role {
    /// Stored representation.
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Super => "SUPERADMIN",
            Role::TenantAdmin => "HOTEL_ADMIN",
            Role::DepartmentUser => "DEPT_USER",
            Role::Approver => "APPROVER",
            Role::Viewer => "VIEWER",
        }
    }

    /// Super and tenant-admin bypass grant checks entirely.
    pub fn is_admin(self) -> bool {
        matches!(self, Role::Super | Role::TenantAdmin)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    /// Accepts both the stored names (`HOTEL_ADMIN`) and the descriptive
    /// ones (`tenant-admin`), in any case and with `-` or `_` separators.
    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let normalized = raw.trim().to_ascii_uppercase().replace('-', "_");
        match normalized.as_str() {
            "SUPERADMIN" | "SUPER_ADMIN" | "SUPER" => Ok(Role::Super),
            "HOTEL_ADMIN" | "TENANT_ADMIN" => Ok(Role::TenantAdmin),
            "DEPT_USER" | "DEPARTMENT_USER" => Ok(Role::DepartmentUser),
            "APPROVER" => Ok(Role::Approver),
            "VIEWER" => Ok(Role::Viewer),
            _ => Err(format!("unknown role: {raw}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub tenant: TenantCode,
    /// Unique within the tenant.
    pub username: String,
    pub full_name: String,
    pub email: Option<String>,
    pub role: Role,
    pub department: String,
    pub grants: Grants,
    /// Argon2id PHC string.
    pub secret_hash: String,
}

/// Fields required to create a staff account.
#[derive(Debug, Clone)]
pub struct CreateUser {
    pub tenant: TenantCode,
    pub username: String,
    pub full_name: String,
    pub email: Option<String>,
    pub role: Role,
    pub department: String,
    /// `None` seeds the role defaults.
    pub grants: Option<Grants>,
    /// Raw secret (hashed before storage).
    pub secret: String,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateUser {
    pub full_name: Option<String>,
    /// `Some(Some(val))` = set, `Some(None)` = clear, `None` = no change.
    pub email: Option<Option<String>>,
    pub role: Option<Role>,
    pub department: Option<String>,
    pub grants: Option<Grants>,
    /// Raw replacement secret.
    pub secret: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_parsing_is_case_insensitive() {
        assert_eq!("hotel_admin".parse::<Role>().unwrap(), Role::TenantAdmin);
        assert_eq!("Tenant-Admin".parse::<Role>().unwrap(), Role::TenantAdmin);
        assert_eq!("superadmin".parse::<Role>().unwrap(), Role::Super);
        assert_eq!("department-user".parse::<Role>().unwrap(), Role::DepartmentUser);
        assert!("janitor".parse::<Role>().is_err());
    }

    #[test]
    fn role_round_trips_through_stored_name() {
        for role in [
            Role::Super,
            Role::TenantAdmin,
            Role::DepartmentUser,
            Role::Approver,
            Role::Viewer,
        ] {
            assert_eq!(role.as_str().parse::<Role>().unwrap(), role);
        }
    }
}
