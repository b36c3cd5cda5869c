//! Access resolution from role plus stored capability grants.
//!
//! Staff records carry grants in one of two shapes:
//!
//! - **Coarse** capability flags (`MANAGE_USERS`, `APPROVE_REQUESTS`, ...).
//! - **Graded** per-module rights (`inventory:view`, `requests:modify`, ...),
//!   where `modify` implies `add` implies `view`.
//!
//! Both are decoded into [`Grants`] and evaluated through
//! [`Grants::permits`]. Tenant admins and the super role are allowed
//! everything regardless of what is stored.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ZinicError, ZinicResult};
use crate::models::user::{Role, User};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Capability {
    ManageUsers,
    ApproveRequests,
    ManageInventory,
    ManageConsumption,
    ManageFinance,
}

impl Capability {
    pub const ALL: [Capability; 5] = [
        Capability::ManageUsers,
        Capability::ApproveRequests,
        Capability::ManageInventory,
        Capability::ManageConsumption,
        Capability::ManageFinance,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Capability::ManageUsers => "MANAGE_USERS",
            Capability::ApproveRequests => "APPROVE_REQUESTS",
            Capability::ManageInventory => "MANAGE_INVENTORY",
            Capability::ManageConsumption => "MANAGE_CONSUMPTION",
            Capability::ManageFinance => "MANAGE_FINANCE",
        }
    }

    fn parse(token: &str) -> Option<Self> {
        let token = token.trim().to_ascii_uppercase().replace('-', "_");
        Self::ALL.into_iter().find(|cap| cap.as_str() == token)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Module {
    Dashboard,
    Inventory,
    Requests,
    Reports,
    Users,
    Vendors,
    Settings,
    Support,
}

impl Module {
    pub const ALL: [Module; 8] = [
        Module::Dashboard,
        Module::Inventory,
        Module::Requests,
        Module::Reports,
        Module::Users,
        Module::Vendors,
        Module::Settings,
        Module::Support,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Module::Dashboard => "dashboard",
            Module::Inventory => "inventory",
            Module::Requests => "requests",
            Module::Reports => "reports",
            Module::Users => "users",
            Module::Vendors => "vendors",
            Module::Settings => "settings",
            Module::Support => "support",
        }
    }
}

/// Graded right. Ordering encodes implication: `Modify > Add > View`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Access {
    View,
    Add,
    Modify,
}

impl Access {
    pub fn as_str(self) -> &'static str {
        match self {
            Access::View => "view",
            Access::Add => "add",
            Access::Modify => "modify",
        }
    }
}

/// A request to perform `access` on `module`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModuleAction {
    pub module: Module,
    pub access: Access,
}

impl ModuleAction {
    pub const fn new(module: Module, access: Access) -> Self {
        Self { module, access }
    }

    /// Approve, reject or transfer a requisition.
    pub const REVIEW_REQUESTS: Self = Self::new(Module::Requests, Access::Modify);
    /// Raise a requisition or log consumption against one.
    pub const RAISE_REQUESTS: Self = Self::new(Module::Requests, Access::Add);
    pub const VIEW_REQUESTS: Self = Self::new(Module::Requests, Access::View);
    pub const VIEW_INVENTORY: Self = Self::new(Module::Inventory, Access::View);
    pub const ADD_INVENTORY: Self = Self::new(Module::Inventory, Access::Add);
    pub const MODIFY_INVENTORY: Self = Self::new(Module::Inventory, Access::Modify);
    pub const VIEW_USERS: Self = Self::new(Module::Users, Access::View);
    pub const MANAGE_USERS: Self = Self::new(Module::Users, Access::Modify);
    pub const VIEW_VENDORS: Self = Self::new(Module::Vendors, Access::View);
    pub const MANAGE_VENDORS: Self = Self::new(Module::Vendors, Access::Modify);
    pub const VIEW_DASHBOARD: Self = Self::new(Module::Dashboard, Access::View);
    pub const VIEW_REPORTS: Self = Self::new(Module::Reports, Access::View);
    pub const MANAGE_SETTINGS: Self = Self::new(Module::Settings, Access::Modify);

    /// What a coarse-shaped grant set must contain for this action.
    fn coarse_rule(self) -> CoarseRule {
        use Access::*;
        use Module::*;
        match (self.module, self.access) {
            (_, View) => CoarseRule::Open,
            (Users | Settings, Add | Modify) => CoarseRule::Requires(Capability::ManageUsers),
            (Requests, Modify) => CoarseRule::Requires(Capability::ApproveRequests),
            (Requests, Add) => CoarseRule::Requires(Capability::ManageConsumption),
            (Inventory, Add | Modify) => CoarseRule::Requires(Capability::ManageInventory),
            (Vendors | Reports, Add | Modify) => CoarseRule::Requires(Capability::ManageFinance),
            (Dashboard | Support, Add | Modify) => CoarseRule::AdminOnly,
        }
    }
}

impl fmt::Display for ModuleAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.module.as_str(), self.access.as_str())
    }
}

impl FromStr for ModuleAction {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let (module, access) = raw
            .trim()
            .split_once(':')
            .ok_or_else(|| format!("not a module action: {raw}"))?;
        let module = module.trim().to_ascii_lowercase();
        let access = access.trim().to_ascii_lowercase();
        let module = Module::ALL
            .into_iter()
            .find(|m| m.as_str() == module)
            .ok_or_else(|| format!("unknown module: {module}"))?;
        let access = [Access::View, Access::Add, Access::Modify]
            .into_iter()
            .find(|a| a.as_str() == access)
            .ok_or_else(|| format!("unknown access level: {access}"))?;
        Ok(Self { module, access })
    }
}

enum CoarseRule {
    Open,
    Requires(Capability),
    AdminOnly,
}

/// Stored grant set, in whichever shape the staff record was created with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub enum Grants {
    Coarse(BTreeSet<Capability>),
    Graded(BTreeMap<Module, Access>),
}

impl Default for Grants {
    fn default() -> Self {
        Grants::Coarse(BTreeSet::new())
    }
}

impl Grants {
    /// Seed values assigned at staff creation.
    pub fn role_defaults(role: Role) -> Self {
        let caps: &[Capability] = match role {
            Role::Super | Role::TenantAdmin => &Capability::ALL,
            Role::Approver => &[Capability::ApproveRequests],
            Role::DepartmentUser => &[Capability::ManageConsumption],
            Role::Viewer => &[],
        };
        Grants::Coarse(caps.iter().copied().collect())
    }

    /// Decode a stored token list.
    ///
    /// Any `module:access` token makes the set graded; records mixing both
    /// shapes keep only the graded tokens. Unknown tokens are rejected.
    pub fn from_tokens<I, S>(tokens: I) -> ZinicResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut coarse = BTreeSet::new();
        let mut graded: BTreeMap<Module, Access> = BTreeMap::new();

        for token in tokens {
            let token = token.as_ref();
            if token.contains(':') {
                let action: ModuleAction = token
                    .parse()
                    .map_err(|e: String| ZinicError::malformed("grants", e))?;
                let level = graded.entry(action.module).or_insert(action.access);
                *level = (*level).max(action.access);
            } else {
                let cap = Capability::parse(token).ok_or_else(|| {
                    ZinicError::malformed("grants", format!("unknown capability: {token}"))
                })?;
                coarse.insert(cap);
            }
        }

        if graded.is_empty() {
            return Ok(Grants::Coarse(coarse));
        }
        if !coarse.is_empty() {
            warn!(
                dropped = coarse.len(),
                "Grant set mixes coarse and graded tokens; keeping graded"
            );
        }
        Ok(Grants::Graded(graded))
    }

    pub fn to_tokens(&self) -> Vec<String> {
        match self {
            Grants::Coarse(caps) => caps.iter().map(|c| c.as_str().to_string()).collect(),
            Grants::Graded(rights) => rights
                .iter()
                .map(|(module, access)| ModuleAction::new(*module, *access).to_string())
                .collect(),
        }
    }

    /// Evaluate the stored grants alone, without the admin bypass.
    pub fn permits(&self, action: ModuleAction) -> bool {
        match self {
            Grants::Coarse(caps) => match action.coarse_rule() {
                CoarseRule::Open => true,
                CoarseRule::Requires(cap) => caps.contains(&cap),
                CoarseRule::AdminOnly => false,
            },
            Grants::Graded(rights) => rights
                .get(&action.module)
                .is_some_and(|granted| *granted >= action.access),
        }
    }
}

impl TryFrom<Vec<String>> for Grants {
    type Error = ZinicError;

    fn try_from(tokens: Vec<String>) -> Result<Self, Self::Error> {
        Grants::from_tokens(tokens)
    }
}

impl From<Grants> for Vec<String> {
    fn from(grants: Grants) -> Self {
        grants.to_tokens()
    }
}

/// Whether `user` may perform `action`.
pub fn is_allowed(user: &User, action: ModuleAction) -> bool {
    user.role.is_admin() || user.grants.permits(action)
}

/// [`is_allowed`] as a guard.
pub fn require(user: &User, action: ModuleAction) -> ZinicResult<()> {
    if is_allowed(user, action) {
        Ok(())
    } else {
        Err(ZinicError::PermissionDenied {
            action: action.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::tenant::TenantCode;

    fn staff(role: Role, grants: Grants) -> User {
        User {
            id: "u-1".into(),
            tenant: TenantCode::new("GRAND01"),
            username: "sam".into(),
            full_name: "Sam Porter".into(),
            email: None,
            role,
            department: "Kitchen".into(),
            grants,
            secret_hash: String::new(),
        }
    }

    fn every_action() -> Vec<ModuleAction> {
        Module::ALL
            .into_iter()
            .flat_map(|m| {
                [Access::View, Access::Add, Access::Modify]
                    .into_iter()
                    .map(move |a| ModuleAction::new(m, a))
            })
            .collect()
    }

    #[test]
    fn admins_are_allowed_everything_regardless_of_grants() {
        for role in [Role::Super, Role::TenantAdmin] {
            let user = staff(role, Grants::from_tokens(["inventory:view"]).unwrap());
            for action in every_action() {
                assert!(is_allowed(&user, action), "{role} denied {action}");
            }
        }
    }

    #[test]
    fn graded_view_only_denies_update() {
        let user = staff(
            Role::DepartmentUser,
            Grants::from_tokens(["inventory:view"]).unwrap(),
        );
        assert!(is_allowed(&user, ModuleAction::VIEW_INVENTORY));
        assert!(!is_allowed(&user, ModuleAction::MODIFY_INVENTORY));
        assert!(!is_allowed(&user, ModuleAction::ADD_INVENTORY));
        assert!(!is_allowed(&user, ModuleAction::VIEW_REQUESTS));
    }

    #[test]
    fn graded_modify_implies_add_and_view() {
        let grants = Grants::from_tokens(["requests:modify"]).unwrap();
        assert!(grants.permits(ModuleAction::VIEW_REQUESTS));
        assert!(grants.permits(ModuleAction::RAISE_REQUESTS));
        assert!(grants.permits(ModuleAction::REVIEW_REQUESTS));
    }

    #[test]
    fn repeated_module_keeps_highest_level() {
        let grants = Grants::from_tokens(["vendors:view", "vendors:add"]).unwrap();
        assert_eq!(grants.to_tokens(), vec!["vendors:add".to_string()]);
    }

    #[test]
    fn coarse_flags_gate_matching_actions() {
        let approver = staff(Role::Approver, Grants::role_defaults(Role::Approver));
        assert!(is_allowed(&approver, ModuleAction::REVIEW_REQUESTS));
        assert!(!is_allowed(&approver, ModuleAction::RAISE_REQUESTS));
        assert!(is_allowed(&approver, ModuleAction::VIEW_INVENTORY));

        let dept = staff(Role::DepartmentUser, Grants::role_defaults(Role::DepartmentUser));
        assert!(is_allowed(&dept, ModuleAction::RAISE_REQUESTS));
        assert!(!is_allowed(&dept, ModuleAction::REVIEW_REQUESTS));

        let viewer = staff(Role::Viewer, Grants::role_defaults(Role::Viewer));
        assert!(!is_allowed(&viewer, ModuleAction::MODIFY_INVENTORY));
        assert!(!is_allowed(&viewer, ModuleAction::new(Module::Dashboard, Access::Modify)));
    }

    #[test]
    fn role_defaults_are_seed_values_not_fallbacks() {
        // A viewer explicitly granted approval is allowed; an approver
        // whose grants were stripped is not.
        let viewer = staff(Role::Viewer, Grants::from_tokens(["APPROVE_REQUESTS"]).unwrap());
        assert!(is_allowed(&viewer, ModuleAction::REVIEW_REQUESTS));
        let approver = staff(Role::Approver, Grants::default());
        assert!(!is_allowed(&approver, ModuleAction::REVIEW_REQUESTS));
    }

    #[test]
    fn resolution_is_idempotent() {
        let user = staff(
            Role::Approver,
            Grants::from_tokens(["requests:add", "reports:view"]).unwrap(),
        );
        for action in every_action() {
            assert_eq!(is_allowed(&user, action), is_allowed(&user, action));
        }
    }

    #[test]
    fn token_decoding_is_case_insensitive_and_strict() {
        let grants = Grants::from_tokens(["manage_inventory", "Approve-Requests"]).unwrap();
        assert_eq!(
            grants,
            Grants::Coarse(
                [Capability::ManageInventory, Capability::ApproveRequests]
                    .into_iter()
                    .collect()
            )
        );
        assert!(Grants::from_tokens(["FLY_HELICOPTER"]).is_err());
        assert!(Grants::from_tokens(["kitchen:view"]).is_err());
        assert!(Grants::from_tokens(["inventory:delete"]).is_err());
    }

    #[test]
    fn mixed_shapes_keep_graded() {
        let grants = Grants::from_tokens(["MANAGE_USERS", "inventory:add"]).unwrap();
        assert!(matches!(grants, Grants::Graded(_)));
        assert!(!grants.permits(ModuleAction::MANAGE_USERS));
        assert!(grants.permits(ModuleAction::ADD_INVENTORY));
    }

    #[test]
    fn grants_serialise_as_token_lists() {
        let json = serde_json::to_string(&Grants::role_defaults(Role::Approver)).unwrap();
        assert_eq!(json, r#"["APPROVE_REQUESTS"]"#);
        let back: Grants = serde_json::from_str(r#"["users:view"]"#).unwrap();
        assert!(back.permits(ModuleAction::VIEW_USERS));
    }
}
