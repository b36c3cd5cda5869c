//! In-memory view of one scope, and the changes that can be applied to it.
//!
//! A [`Change`] is the unit every mutation is expressed in. Durable
//! sessions turn changes into remote [`Write`]s; sandbox sessions apply
//! them to their local snapshot. Either way the same lifecycle checks ran
//! before the change was built.

use serde::{Deserialize, Serialize};
use zinic_core::error::{ZinicError, ZinicResult};
use zinic_core::mapper::{RowMapping, stock_patch};
use zinic_core::models::department::{DEFAULT_DEPARTMENTS, Department};
use zinic_core::models::item::StockItem;
use zinic_core::models::request::StockRequest;
use zinic_core::models::tenant::{Tenant, TenantCode};
use zinic_core::models::user::User;
use zinic_core::models::vendor::Vendor;
use zinic_core::repository::{Filter, Table, Write};

/// What a snapshot covers: one tenant, or every tenant (super role).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Scope {
    Tenant(TenantCode),
    Global,
}

impl Scope {
    pub fn new(code: &TenantCode, is_global: bool) -> Self {
        if is_global {
            Scope::Global
        } else {
            Scope::Tenant(code.clone())
        }
    }

    pub fn is_global(&self) -> bool {
        matches!(self, Scope::Global)
    }

    /// Remote filter selecting this scope's rows of `table`.
    pub fn filter(&self, table: Table) -> Filter {
        match self {
            Scope::Global => Filter::all(),
            Scope::Tenant(code) if table == Table::Hotels => Filter::by_id(code.as_str()),
            Scope::Tenant(code) => Filter::eq("client_id", code.as_str()),
        }
    }
}

/// Entities partitioned by owning tenant.
pub trait Owned {
    fn tenant(&self) -> &TenantCode;
}

macro_rules! owned {
    ($($ty:ty),*) => {
        $(impl Owned for $ty {
            fn tenant(&self) -> &TenantCode {
                &self.tenant
            }
        })*
    };
}

owned!(User, StockItem, StockRequest, Vendor, Department);

impl Owned for Tenant {
    fn tenant(&self) -> &TenantCode {
        &self.code
    }
}

fn of<T: Owned + Clone>(rows: &[T], code: &TenantCode) -> Vec<T> {
    rows.iter().filter(|r| r.tenant() == code).cloned().collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub scope: Scope,
    pub tenants: Vec<Tenant>,
    pub users: Vec<User>,
    pub items: Vec<StockItem>,
    pub requests: Vec<StockRequest>,
    pub vendors: Vec<Vendor>,
    pub departments: Vec<Department>,
}

impl Snapshot {
    pub fn empty(scope: Scope) -> Self {
        Self {
            scope,
            tenants: Vec::new(),
            users: Vec::new(),
            items: Vec::new(),
            requests: Vec::new(),
            vendors: Vec::new(),
            departments: Vec::new(),
        }
    }

    pub fn tenant(&self, code: &TenantCode) -> Option<&Tenant> {
        self.tenants.iter().find(|t| t.code == *code)
    }

    pub fn users_of(&self, code: &TenantCode) -> Vec<User> {
        of(&self.users, code)
    }

    pub fn items_of(&self, code: &TenantCode) -> Vec<StockItem> {
        of(&self.items, code)
    }

    pub fn requests_of(&self, code: &TenantCode) -> Vec<StockRequest> {
        of(&self.requests, code)
    }

    pub fn vendors_of(&self, code: &TenantCode) -> Vec<Vendor> {
        of(&self.vendors, code)
    }

    pub fn departments_of(&self, code: &TenantCode) -> Vec<Department> {
        of(&self.departments, code)
    }

    /// Configured department labels, or the defaults when none are set.
    pub fn department_names(&self, code: &TenantCode) -> Vec<String> {
        let configured: Vec<String> = self
            .departments
            .iter()
            .filter(|d| d.tenant == *code)
            .map(|d| d.name.clone())
            .collect();
        if configured.is_empty() {
            DEFAULT_DEPARTMENTS.iter().map(|d| d.to_string()).collect()
        } else {
            configured
        }
    }

    pub fn user(&self, id: &str) -> Option<&User> {
        self.users.iter().find(|u| u.id == id)
    }

    pub fn item(&self, id: &str) -> Option<&StockItem> {
        self.items.iter().find(|i| i.id == id)
    }

    pub fn request(&self, id: &str) -> Option<&StockRequest> {
        self.requests.iter().find(|r| r.id == id)
    }

    pub fn vendor(&self, id: &str) -> Option<&Vendor> {
        self.vendors.iter().find(|v| v.id == id)
    }

    /// Apply one change in place. Insert-style changes fail on a taken id
    /// or username, leaving the snapshot untouched.
    pub fn apply(&mut self, change: Change) -> ZinicResult<()> {
        match change {
            Change::InsertTenant(tenant) => {
                if self.tenant(&tenant.code).is_some() {
                    return Err(ZinicError::AlreadyExists {
                        entity: "tenant".into(),
                        id: tenant.code.to_string(),
                    });
                }
                self.tenants.push(tenant);
            }
            Change::PutTenant(tenant) => put(&mut self.tenants, tenant, |a, b| a.code == b.code),
            Change::InsertUser(user) => {
                let taken = self.users.iter().any(|u| {
                    u.id == user.id || (u.tenant == user.tenant && u.username == user.username)
                });
                if taken {
                    return Err(ZinicError::AlreadyExists {
                        entity: "user".into(),
                        id: user.username,
                    });
                }
                self.users.push(user);
            }
            Change::PutUser(user) => put(&mut self.users, user, |a, b| a.id == b.id),
            Change::PutItem(item) => put(&mut self.items, item, |a, b| a.id == b.id),
            Change::SetStock(item) => {
                let slot = self
                    .items
                    .iter_mut()
                    .find(|i| i.id == item.id && i.tenant == item.tenant)
                    .ok_or_else(|| ZinicError::not_found("inventory item", &item.id))?;
                slot.current_stock = item.current_stock;
                slot.last_updated = item.last_updated;
            }
            Change::DeleteItem { id, .. } => self.items.retain(|i| i.id != id),
            Change::PutRequest(request) => put(&mut self.requests, request, |a, b| a.id == b.id),
            Change::PutVendor(vendor) => put(&mut self.vendors, vendor, |a, b| a.id == b.id),
            Change::ReplaceDepartments { tenant, departments } => {
                self.departments.retain(|d| d.tenant != tenant);
                self.departments.extend(departments);
            }
            Change::PurgeTenant(code) => {
                self.users.retain(|r| r.tenant != code);
                self.items.retain(|r| r.tenant != code);
                self.requests.retain(|r| r.tenant != code);
                self.vendors.retain(|r| r.tenant != code);
                self.departments.retain(|r| r.tenant != code);
                self.tenants.retain(|t| t.code != code);
            }
        }
        Ok(())
    }
}

fn put<T>(rows: &mut Vec<T>, value: T, same: impl Fn(&T, &T) -> bool) {
    match rows.iter_mut().find(|r| same(r, &value)) {
        Some(slot) => *slot = value,
        None => rows.push(value),
    }
}

/// A validated, ready-to-persist state change.
#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    InsertTenant(Tenant),
    PutTenant(Tenant),
    InsertUser(User),
    PutUser(User),
    PutItem(StockItem),
    /// Stock movement: only the item's on-hand quantity and timestamp.
    SetStock(StockItem),
    DeleteItem { tenant: TenantCode, id: String },
    PutRequest(StockRequest),
    PutVendor(Vendor),
    ReplaceDepartments {
        tenant: TenantCode,
        departments: Vec<Department>,
    },
    /// Remove a tenant and everything it owns.
    PurgeTenant(TenantCode),
}

impl Change {
    /// Remote writes carrying this change.
    pub fn into_writes(self) -> Vec<Write> {
        match self {
            Change::InsertTenant(tenant) => vec![Write::Insert {
                table: Table::Hotels,
                row: tenant.to_row(),
            }],
            Change::PutTenant(tenant) => vec![Write::Upsert {
                table: Table::Hotels,
                row: tenant.to_row(),
            }],
            Change::InsertUser(user) => vec![Write::Insert {
                table: Table::Users,
                row: user.to_row(),
            }],
            Change::PutUser(user) => vec![Write::Upsert {
                table: Table::Users,
                row: user.to_row(),
            }],
            Change::PutItem(item) => vec![Write::Upsert {
                table: Table::Inventory,
                row: item.to_row(),
            }],
            Change::SetStock(item) => vec![Write::Merge {
                table: Table::Inventory,
                filter: Filter::by_id(item.id.as_str()).and("client_id", item.tenant.as_str()),
                patch: stock_patch(&item),
            }],
            Change::DeleteItem { tenant, id } => vec![Write::Delete {
                table: Table::Inventory,
                filter: Filter::by_id(id).and("client_id", tenant.as_str()),
            }],
            Change::PutRequest(request) => vec![Write::Upsert {
                table: Table::Requests,
                row: request.to_row(),
            }],
            Change::PutVendor(vendor) => vec![Write::Upsert {
                table: Table::Vendors,
                row: vendor.to_row(),
            }],
            Change::ReplaceDepartments {
                tenant,
                departments,
            } => {
                let mut writes = vec![Write::Delete {
                    table: Table::Departments,
                    filter: Filter::eq("client_id", tenant.as_str()),
                }];
                writes.extend(departments.into_iter().map(|d| Write::Insert {
                    table: Table::Departments,
                    row: d.to_row(),
                }));
                writes
            }
            Change::PurgeTenant(code) => {
                let mut writes: Vec<Write> = Table::TENANT_SCOPED
                    .into_iter()
                    .map(|table| Write::Delete {
                        table,
                        filter: Filter::eq("client_id", code.as_str()),
                    })
                    .collect();
                writes.push(Write::Delete {
                    table: Table::Hotels,
                    filter: Filter::by_id(code.as_str()),
                });
                writes
            }
        }
    }
}
