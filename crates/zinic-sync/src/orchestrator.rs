//! Sync orchestrator: the single entry point for sessions, queries and
//! mutations.
//!
//! A session is either durable (backed by the remote store and the tenant
//! data cache) or sandboxed (backed by the local sandbox store), chosen by
//! the tenant code pattern at login. Every mutation runs the same checks in
//! both modes and is expressed as a list of [`Change`]s; only the final
//! commit differs. Durable commits write first and refresh the cache
//! before returning, so the caller always reads its own writes.

use std::sync::{Arc, RwLock};

use chrono::Utc;
use rand::Rng;
use rand::distr::Alphanumeric;
use tracing::{debug, info, warn};
use uuid::Uuid;
use zinic_core::collaborator::{
    InsightItem, InsightProvider, InventoryInsights, Notifier, parse_insights,
};
use zinic_core::error::{ZinicError, ZinicResult};
use zinic_core::lifecycle::{self, ensure_same_tenant};
use zinic_core::mapper::{RowMapping, lead_status_patch};
use zinic_core::models::demo::{CreateDemoLead, DemoLead, LeadStatus, sandbox_expiry};
use zinic_core::models::department::{ADMIN_DEPARTMENT, Department};
use zinic_core::models::item::{SaveItem, StockItem};
use zinic_core::models::request::{CreateRequest, LogConsumption, RequestStatus, StockRequest};
use zinic_core::models::tenant::{CreateTenant, Tenant, TenantCode, UpdateTenant};
use zinic_core::models::user::{CreateUser, Role, UpdateUser, User};
use zinic_core::models::vendor::{Invoice, SaveInvoice, SaveVendor, Vendor};
use zinic_core::permission::{Grants, ModuleAction, require};
use zinic_core::repository::{Filter, KeyValueStorage, RemoteStore, Table, Write};

use crate::cache::TenantDataCache;
use crate::config::SyncConfig;
use crate::observer::{ObserverSet, Subscription};
use crate::password;
use crate::reports::{self, DashboardStats, ReportData};
use crate::sandbox::{SandboxSession, SandboxStore};
use crate::snapshot::{Change, Snapshot};

/// Characters used for generated sandbox codes (no 0/O, 1/I).
const CODE_CHARSET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
const CODE_LENGTH: usize = 4;
const DEMO_SECRET_LENGTH: usize = 10;
const ADMIN_USERNAME: &str = "admin";

/// Remote store reachability as last observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbStatus {
    Connecting,
    Connected,
    Disconnected,
}

/// A successful login.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthOutcome {
    pub user: User,
    pub tenant: Tenant,
    /// The session is backed by the local sandbox store.
    pub sandbox: bool,
}

/// Initial administrator of a newly provisioned tenant.
#[derive(Debug, Clone)]
pub struct NewTenantAdmin {
    pub username: String,
    pub full_name: String,
    pub email: Option<String>,
    pub secret: String,
}

/// Credentials handed to a prospect after `start_demo`.
#[derive(Debug, Clone)]
pub struct DemoAccess {
    pub lead: DemoLead,
    pub username: String,
    pub secret: String,
}

pub struct SyncOrchestrator<S: RemoteStore + 'static, K: KeyValueStorage, N: Notifier> {
    store: Arc<S>,
    cache: TenantDataCache<S>,
    sandbox: SandboxStore<K>,
    notifier: N,
    config: SyncConfig,
    session: RwLock<Option<AuthOutcome>>,
    status: RwLock<DbStatus>,
    observers: Arc<ObserverSet<Snapshot>>,
    _relays: [Subscription; 2],
}

fn new_id(prefix: &str) -> String {
    format!("{prefix}-{}", Uuid::new_v4().simple())
}

fn non_empty(value: &str, what: &str) -> ZinicResult<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ZinicError::validation(format!("{what} must not be empty")));
    }
    Ok(value.to_string())
}

fn non_negative(value: f64, what: &str) -> ZinicResult<()> {
    if !value.is_finite() || value < 0.0 {
        return Err(ZinicError::invalid_quantity(format!(
            "{what} must be a non-negative number, got {value}"
        )));
    }
    Ok(())
}

fn require_super(user: &User, action: &str) -> ZinicResult<()> {
    if user.role == Role::Super {
        Ok(())
    } else {
        Err(ZinicError::PermissionDenied {
            action: action.into(),
        })
    }
}

fn sandbox_code(prefix: &str) -> TenantCode {
    let mut rng = rand::rng();
    let suffix: String = (0..CODE_LENGTH)
        .map(|_| CODE_CHARSET[rng.random_range(0..CODE_CHARSET.len())] as char)
        .collect();
    TenantCode::new(&format!("{prefix}{suffix}"))
}

fn demo_secret() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(DEMO_SECRET_LENGTH)
        .map(char::from)
        .collect()
}

impl<S, K, N> SyncOrchestrator<S, K, N>
where
    S: RemoteStore + 'static,
    K: KeyValueStorage,
    N: Notifier,
{
    pub fn new(store: Arc<S>, storage: K, notifier: N, config: SyncConfig) -> ZinicResult<Self> {
        let cache = TenantDataCache::new(Arc::clone(&store));
        let sandbox = SandboxStore::open(storage)?;
        let observers = Arc::new(ObserverSet::new());

        let relay = Arc::clone(&observers);
        let from_cache = cache.subscribe(move |snapshot: &Snapshot| relay.notify(snapshot));
        let relay = Arc::clone(&observers);
        let from_sandbox = sandbox.subscribe(move |snapshot: &Snapshot| relay.notify(snapshot));

        Ok(Self {
            store,
            cache,
            sandbox,
            notifier,
            config,
            session: RwLock::new(None),
            status: RwLock::new(DbStatus::Connecting),
            observers,
            _relays: [from_cache, from_sandbox],
        })
    }

    fn pepper(&self) -> Option<&str> {
        self.config.pepper.as_deref()
    }

    fn set_session(&self, session: Option<AuthOutcome>) {
        *self.session.write().unwrap_or_else(|e| e.into_inner()) = session;
    }

    fn set_status(&self, status: DbStatus) {
        *self.status.write().unwrap_or_else(|e| e.into_inner()) = status;
    }

    /// The current session. Fails with `Unauthorized` when nobody is logged
    /// in and with `SandboxExpired` once the session's sandbox is gone.
    fn active(&self) -> ZinicResult<AuthOutcome> {
        let session = self
            .session
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .ok_or_else(|| ZinicError::unauthorized("no active session"))?;

        if session.sandbox {
            let expired = self
                .sandbox
                .session()
                .filter(|s| s.tenant.code == session.tenant.code)
                .is_none_or(|s| s.is_expired(Utc::now()));
            if expired {
                return Err(ZinicError::SandboxExpired {
                    code: session.tenant.code.to_string(),
                });
            }
        }
        Ok(session)
    }

    fn view(&self, session: &AuthOutcome) -> Arc<Snapshot> {
        if session.sandbox {
            Arc::new(self.sandbox.snapshot())
        } else {
            self.cache.snapshot()
        }
    }

    /// Resolve the tenant a query or mutation targets: the session's own
    /// tenant unless another one is named (super role only).
    fn target(&self, session: &AuthOutcome, code: Option<&TenantCode>) -> ZinicResult<TenantCode> {
        let code = code.cloned().unwrap_or_else(|| session.user.tenant.clone());
        ensure_same_tenant(&session.user, &code)?;
        Ok(code)
    }

    fn tenant_record(
        &self,
        session: &AuthOutcome,
        view: &Snapshot,
        code: &TenantCode,
    ) -> ZinicResult<Tenant> {
        if let Some(tenant) = view.tenant(code) {
            return Ok(tenant.clone());
        }
        if session.tenant.code == *code {
            return Ok(session.tenant.clone());
        }
        Err(ZinicError::not_found("tenant", code.as_str()))
    }

    async fn commit(&self, session: &AuthOutcome, changes: Vec<Change>) -> ZinicResult<()> {
        if session.sandbox {
            return self.sandbox.commit(changes);
        }

        let writes: Vec<Write> = changes.into_iter().flat_map(Change::into_writes).collect();
        self.store.apply(writes).await?;

        // The write is acknowledged; a failed refresh only delays the
        // caller's view until the next feed event.
        if let Err(e) = self.cache.refresh().await {
            warn!(error = %e, "Refresh after write failed; snapshot is stale");
        }
        Ok(())
    }

    fn refresh_session_user(&self, user: &User) {
        let mut guard = self.session.write().unwrap_or_else(|e| e.into_inner());
        if let Some(session) = guard.as_mut().filter(|s| s.user.id == user.id) {
            session.user = user.clone();
        }
    }

    // -----------------------------------------------------------------
    // Connection and session
    // -----------------------------------------------------------------

    pub fn db_status(&self) -> DbStatus {
        *self.status.read().unwrap_or_else(|e| e.into_inner())
    }

    /// Ping the remote store and record the outcome.
    pub async fn check_connection(&self) -> DbStatus {
        let status = match self.store.ping().await {
            Ok(()) => DbStatus::Connected,
            Err(e) => {
                warn!(error = %e, "Remote store unreachable");
                DbStatus::Disconnected
            }
        };
        self.set_status(status);
        status
    }

    /// Log in. Sandbox codes are checked against the local sandbox store;
    /// every other code against the remote store, after which the cache
    /// loads the tenant (or, for the super role, every tenant) and starts
    /// following the change feed.
    pub async fn authenticate(
        &self,
        code: &str,
        username: &str,
        secret: &str,
    ) -> ZinicResult<AuthOutcome> {
        let code = TenantCode::new(code);
        if code.is_empty() {
            return Err(ZinicError::validation("tenant code must not be empty"));
        }
        let username = username.trim();

        if code.is_sandbox(&self.config.sandbox_prefix) {
            let (user, tenant) =
                self.sandbox
                    .authenticate(&code, username, secret, self.pepper(), Utc::now())?;
            if let Some(lead_id) = self.sandbox.session().and_then(|s| s.lead_id) {
                self.verify_lead(&lead_id).await;
            }
            self.cache.clear();
            let outcome = AuthOutcome {
                user,
                tenant,
                sandbox: true,
            };
            self.set_session(Some(outcome.clone()));
            info!(tenant = %code, username, "Sandbox session started");
            return Ok(outcome);
        }

        let row = self
            .store
            .select(Table::Hotels, Filter::by_id(code.as_str()))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| ZinicError::not_found("tenant", code.as_str()))?;
        let tenant = Tenant::from_row(row)?;

        let row = self
            .store
            .select(
                Table::Users,
                Filter::eq("client_id", code.as_str()).and("username", username),
            )
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| ZinicError::not_found("user", username))?;
        let user = User::from_row(row)?;
        self.set_status(DbStatus::Connected);

        if !password::verify_secret(secret, &user.secret_hash, self.pepper())? {
            warn!(tenant = %code, username, "Login rejected: credential mismatch");
            return Err(ZinicError::unauthorized("credential mismatch"));
        }
        if !tenant.is_active {
            warn!(tenant = %code, username, "Login rejected: tenant suspended");
            return Err(ZinicError::unauthorized("tenant suspended"));
        }

        if let Err(e) = self.store.watch().await {
            warn!(error = %e, "Live change feed unavailable; only local writes refresh the cache");
        }
        self.cache.load_scope(&code, user.role == Role::Super).await?;
        self.cache.start();

        let outcome = AuthOutcome {
            user,
            tenant,
            sandbox: false,
        };
        self.set_session(Some(outcome.clone()));
        info!(tenant = %code, username, role = %outcome.user.role, "Session started");
        Ok(outcome)
    }

    /// Mark the lead behind a sandbox as verified once its owner logs in.
    /// Best-effort: the sandbox works without the remote store.
    async fn verify_lead(&self, lead_id: &str) {
        let write = Write::Merge {
            table: Table::DemoLeads,
            filter: Filter::by_id(lead_id).and("status", LeadStatus::Pending.as_str()),
            patch: lead_status_patch(LeadStatus::Verified),
        };
        match self.store.apply(vec![write]).await {
            Ok(()) => debug!(lead = lead_id, "Demo lead verified"),
            Err(e) => warn!(lead = lead_id, error = %e, "Demo lead not marked verified"),
        }
    }

    pub fn logout(&self) {
        if let Some(session) = self.session.write().unwrap_or_else(|e| e.into_inner()).take() {
            info!(tenant = %session.tenant.code, username = %session.user.username, "Session ended");
        }
        self.cache.clear();
    }

    pub fn session(&self) -> Option<AuthOutcome> {
        self.session.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Observe every snapshot change, durable or sandboxed.
    pub fn subscribe(&self, observer: impl Fn(&Snapshot) + Send + Sync + 'static) -> Subscription {
        self.observers.subscribe(observer)
    }

    pub fn cache(&self) -> &TenantDataCache<S> {
        &self.cache
    }

    pub fn sandbox(&self) -> &SandboxStore<K> {
        &self.sandbox
    }

    /// Stop following the change feed.
    pub fn shutdown(&self) {
        self.cache.stop();
        info!("Sync orchestrator stopped");
    }

    // -----------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------

    /// Tenants visible to the session: all of them for the super role.
    pub fn tenants(&self) -> ZinicResult<Vec<Tenant>> {
        let session = self.active()?;
        let view = self.view(&session);
        if session.user.role == Role::Super {
            return Ok(view.tenants.clone());
        }
        Ok(vec![self.tenant_record(&session, &view, &session.user.tenant)?])
    }

    pub fn users(&self, code: Option<&TenantCode>) -> ZinicResult<Vec<User>> {
        let session = self.active()?;
        require(&session.user, ModuleAction::VIEW_USERS)?;
        let code = self.target(&session, code)?;
        Ok(self.view(&session).users_of(&code))
    }

    pub fn items(&self, code: Option<&TenantCode>) -> ZinicResult<Vec<StockItem>> {
        let session = self.active()?;
        require(&session.user, ModuleAction::VIEW_INVENTORY)?;
        let code = self.target(&session, code)?;
        Ok(self.view(&session).items_of(&code))
    }

    pub fn requests(&self, code: Option<&TenantCode>) -> ZinicResult<Vec<StockRequest>> {
        let session = self.active()?;
        require(&session.user, ModuleAction::VIEW_REQUESTS)?;
        let code = self.target(&session, code)?;
        Ok(self.view(&session).requests_of(&code))
    }

    pub fn vendors(&self, code: Option<&TenantCode>) -> ZinicResult<Vec<Vendor>> {
        let session = self.active()?;
        require(&session.user, ModuleAction::VIEW_VENDORS)?;
        let code = self.target(&session, code)?;
        Ok(self.view(&session).vendors_of(&code))
    }

    /// Department labels, falling back to the defaults.
    pub fn department_names(&self, code: Option<&TenantCode>) -> ZinicResult<Vec<String>> {
        let session = self.active()?;
        let code = self.target(&session, code)?;
        Ok(self.view(&session).department_names(&code))
    }

    pub fn stats(&self, code: Option<&TenantCode>) -> ZinicResult<DashboardStats> {
        let session = self.active()?;
        require(&session.user, ModuleAction::VIEW_DASHBOARD)?;
        let code = self.target(&session, code)?;
        Ok(reports::dashboard_stats(&self.view(&session), &code))
    }

    pub fn report(&self, code: Option<&TenantCode>) -> ZinicResult<ReportData> {
        let session = self.active()?;
        require(&session.user, ModuleAction::VIEW_REPORTS)?;
        let code = self.target(&session, code)?;
        Ok(reports::report(&self.view(&session), &code))
    }

    /// Ask `provider` for an audit of the session tenant's inventory. A
    /// reply that does not parse yields the manual-audit summary.
    pub async fn inventory_insights<P: InsightProvider>(
        &self,
        provider: &P,
    ) -> ZinicResult<InventoryInsights> {
        let session = self.active()?;
        require(&session.user, ModuleAction::VIEW_INVENTORY)?;
        let items: Vec<InsightItem> = self
            .view(&session)
            .items_of(&session.user.tenant)
            .iter()
            .map(InsightItem::from)
            .collect();

        let raw = provider.inventory_insights(&items).await?;
        Ok(parse_insights(&raw).unwrap_or_else(|e| {
            warn!(error = %e, "Insight reply unusable; falling back to manual audit");
            InventoryInsights::manual_audit()
        }))
    }

    // -----------------------------------------------------------------
    // Requisitions and stock
    // -----------------------------------------------------------------

    /// Raise a requisition and announce it to approvers.
    pub async fn create_request(&self, input: CreateRequest) -> ZinicResult<StockRequest> {
        let session = self.active()?;
        let view = self.view(&session);
        let items = view.items_of(&session.user.tenant);
        let request = lifecycle::open_request(&session.user, input, &items, Utc::now())?;

        self.commit(&session, vec![Change::PutRequest(request.clone())])
            .await?;
        info!(request = %request.id, department = %request.department, "Requisition raised");
        self.notifier.new_order(&request.id, &request.department);
        Ok(request)
    }

    async fn review(&self, request_id: &str, target: RequestStatus) -> ZinicResult<StockRequest> {
        let session = self.active()?;
        let view = self.view(&session);
        let request = view
            .request(request_id)
            .ok_or_else(|| ZinicError::not_found("request", request_id))?;
        let updated = lifecycle::transition(&session.user, request, target)?;

        self.commit(&session, vec![Change::PutRequest(updated.clone())])
            .await?;
        info!(request = %updated.id, status = %updated.status, "Requisition reviewed");
        Ok(updated)
    }

    pub async fn approve_request(&self, request_id: &str) -> ZinicResult<StockRequest> {
        self.review(request_id, RequestStatus::Approved).await
    }

    pub async fn reject_request(&self, request_id: &str) -> ZinicResult<StockRequest> {
        self.review(request_id, RequestStatus::Rejected).await
    }

    pub async fn transfer_request(&self, request_id: &str) -> ZinicResult<StockRequest> {
        self.review(request_id, RequestStatus::Transferred).await
    }

    /// Log usage against a transferred requisition. The request and the
    /// drawn-down item are committed together.
    pub async fn log_consumption(&self, input: LogConsumption) -> ZinicResult<StockRequest> {
        let session = self.active()?;
        let view = self.view(&session);
        let request = view
            .request(&input.request_id)
            .ok_or_else(|| ZinicError::not_found("request", &input.request_id))?;
        let item = view
            .item(&input.item_id)
            .ok_or_else(|| ZinicError::not_found("inventory item", &input.item_id))?;
        let consumption =
            lifecycle::log_consumption(&session.user, request, item, &input, Utc::now())?;

        self.commit(
            &session,
            vec![
                Change::PutRequest(consumption.request.clone()),
                Change::SetStock(consumption.item.clone()),
            ],
        )
        .await?;
        info!(
            request = %consumption.request.id,
            item = %consumption.item.id,
            amount = input.amount,
            status = %consumption.request.status,
            "Consumption logged"
        );
        if consumption.crossed_threshold {
            self.notifier
                .low_stock(&consumption.item.name, consumption.item.current_stock);
        }
        Ok(consumption.request)
    }

    /// Apply a signed correction to an item's on-hand stock.
    pub async fn adjust_stock(&self, item_id: &str, delta: f64) -> ZinicResult<StockItem> {
        let session = self.active()?;
        let view = self.view(&session);
        let item = view
            .item(item_id)
            .ok_or_else(|| ZinicError::not_found("inventory item", item_id))?;
        let adjustment = lifecycle::adjust_stock(&session.user, item, delta, Utc::now())?;

        self.commit(&session, vec![Change::SetStock(adjustment.item.clone())])
            .await?;
        debug!(item = %item_id, delta, stock = adjustment.item.current_stock, "Stock adjusted");
        if adjustment.crossed_threshold {
            self.notifier
                .low_stock(&adjustment.item.name, adjustment.item.current_stock);
        }
        Ok(adjustment.item)
    }

    /// Create or update an inventory item. Creating respects the tenant's
    /// `max_items` and seeds the opening stock; updates keep the on-hand
    /// quantity, which only consumption and adjustments move.
    pub async fn save_item(&self, input: SaveItem) -> ZinicResult<StockItem> {
        let session = self.active()?;
        let view = self.view(&session);
        let code = session.user.tenant.clone();

        let name = non_empty(&input.name, "item name")?;
        non_negative(input.min_stock_level, "minimum stock level")?;

        let existing = match &input.id {
            Some(id) => Some(
                view.item(id)
                    .filter(|i| i.tenant == code)
                    .cloned()
                    .ok_or_else(|| ZinicError::not_found("inventory item", id))?,
            ),
            None => None,
        };

        let item = StockItem {
            id: existing
                .as_ref()
                .map(|i| i.id.clone())
                .unwrap_or_else(|| new_id("itm")),
            tenant: code.clone(),
            name,
            category: input.category.trim().to_string(),
            unit: input.unit.trim().to_string(),
            current_stock: match &existing {
                Some(previous) => previous.current_stock,
                None => {
                    non_negative(input.current_stock, "current stock")?;
                    input.current_stock
                }
            },
            min_stock_level: input.min_stock_level,
            vendor_id: input.vendor_id.filter(|v| !v.trim().is_empty()),
            last_updated: Utc::now(),
        };

        let crossed = match &existing {
            // Raising the threshold can put an unchanged quantity at or
            // below it.
            Some(previous) => {
                require(&session.user, ModuleAction::MODIFY_INVENTORY)?;
                !previous.is_low() && item.is_low()
            }
            None => {
                require(&session.user, ModuleAction::ADD_INVENTORY)?;
                let tenant = self.tenant_record(&session, &view, &code)?;
                let count = view.items_of(&code).len();
                if count >= tenant.max_items as usize {
                    return Err(ZinicError::LimitExceeded {
                        message: format!("{code} already holds {count} of {} items", tenant.max_items),
                    });
                }
                false
            }
        };

        self.commit(&session, vec![Change::PutItem(item.clone())])
            .await?;
        info!(item = %item.id, tenant = %code, created = existing.is_none(), "Item saved");
        if crossed {
            self.notifier.low_stock(&item.name, item.current_stock);
        }
        Ok(item)
    }

    pub async fn delete_item(&self, item_id: &str) -> ZinicResult<()> {
        let session = self.active()?;
        require(&session.user, ModuleAction::MODIFY_INVENTORY)?;
        let view = self.view(&session);
        let item = view
            .item(item_id)
            .filter(|i| i.tenant == session.user.tenant)
            .ok_or_else(|| ZinicError::not_found("inventory item", item_id))?;

        self.commit(
            &session,
            vec![Change::DeleteItem {
                tenant: item.tenant.clone(),
                id: item.id.clone(),
            }],
        )
        .await?;
        info!(item = %item_id, "Item deleted");
        Ok(())
    }

    // -----------------------------------------------------------------
    // Vendors
    // -----------------------------------------------------------------

    fn own_vendor(&self, session: &AuthOutcome, view: &Snapshot, vendor_id: &str) -> ZinicResult<Vendor> {
        view.vendor(vendor_id)
            .filter(|v| v.tenant == session.user.tenant)
            .cloned()
            .ok_or_else(|| ZinicError::not_found("vendor", vendor_id))
    }

    /// Create or update a vendor. Invoices are kept on update.
    pub async fn save_vendor(&self, input: SaveVendor) -> ZinicResult<Vendor> {
        let session = self.active()?;
        require(&session.user, ModuleAction::MANAGE_VENDORS)?;
        let view = self.view(&session);

        let invoices = match &input.id {
            Some(id) => self.own_vendor(&session, &view, id)?.invoices,
            None => Vec::new(),
        };
        let vendor = Vendor {
            id: input.id.clone().unwrap_or_else(|| new_id("vnd")),
            tenant: session.user.tenant.clone(),
            name: non_empty(&input.name, "vendor name")?,
            contact_person: input.contact_person.trim().to_string(),
            email: input.email.trim().to_string(),
            phone: input.phone.trim().to_string(),
            invoices,
        };

        self.commit(&session, vec![Change::PutVendor(vendor.clone())])
            .await?;
        info!(vendor = %vendor.id, "Vendor saved");
        Ok(vendor)
    }

    /// Create or replace an invoice on a vendor. Its status follows from
    /// the amounts.
    pub async fn save_invoice(&self, vendor_id: &str, input: SaveInvoice) -> ZinicResult<Invoice> {
        let session = self.active()?;
        require(&session.user, ModuleAction::MANAGE_VENDORS)?;
        let view = self.view(&session);
        let mut vendor = self.own_vendor(&session, &view, vendor_id)?;

        non_negative(input.total_amount, "invoice total")?;
        non_negative(input.paid_amount, "paid amount")?;
        if input.paid_amount > input.total_amount {
            return Err(ZinicError::invalid_quantity(format!(
                "paid amount {} exceeds invoice total {}",
                input.paid_amount, input.total_amount
            )));
        }

        let invoice = Invoice {
            id: input.id.clone().unwrap_or_else(|| new_id("inv")),
            invoice_number: non_empty(&input.invoice_number, "invoice number")?,
            date: input.date,
            due_date: input.due_date,
            total_amount: input.total_amount,
            paid_amount: input.paid_amount,
            payment_mode: input.payment_mode,
            notes: input.notes.filter(|n| !n.trim().is_empty()),
        };
        match vendor.invoices.iter_mut().find(|i| i.id == invoice.id) {
            Some(slot) => *slot = invoice.clone(),
            None if input.id.is_some() => {
                return Err(ZinicError::not_found("invoice", &invoice.id));
            }
            None => vendor.invoices.push(invoice.clone()),
        }

        self.commit(&session, vec![Change::PutVendor(vendor)]).await?;
        info!(vendor = %vendor_id, invoice = %invoice.id, status = ?invoice.status(), "Invoice saved");
        Ok(invoice)
    }

    pub async fn delete_invoice(&self, vendor_id: &str, invoice_id: &str) -> ZinicResult<()> {
        let session = self.active()?;
        require(&session.user, ModuleAction::MANAGE_VENDORS)?;
        let view = self.view(&session);
        let mut vendor = self.own_vendor(&session, &view, vendor_id)?;

        let before = vendor.invoices.len();
        vendor.invoices.retain(|i| i.id != invoice_id);
        if vendor.invoices.len() == before {
            return Err(ZinicError::not_found("invoice", invoice_id));
        }

        self.commit(&session, vec![Change::PutVendor(vendor)]).await?;
        info!(vendor = %vendor_id, invoice = %invoice_id, "Invoice deleted");
        Ok(())
    }

    // -----------------------------------------------------------------
    // Staff and settings
    // -----------------------------------------------------------------

    /// Add a staff member. Grants default to the role's seed set and the
    /// tenant's `max_users` is enforced.
    pub async fn create_user(&self, input: CreateUser) -> ZinicResult<User> {
        let session = self.active()?;
        require(&session.user, ModuleAction::MANAGE_USERS)?;
        ensure_same_tenant(&session.user, &input.tenant)?;
        if input.role == Role::Super {
            require_super(&session.user, "assign the super role")?;
        }

        let view = self.view(&session);
        let tenant = self.tenant_record(&session, &view, &input.tenant)?;
        let username = non_empty(&input.username, "username")?;
        let full_name = non_empty(&input.full_name, "full name")?;
        let secret = non_empty(&input.secret, "password")?;

        let staff = view.users_of(&tenant.code);
        if staff.iter().any(|u| u.username == username) {
            return Err(ZinicError::AlreadyExists {
                entity: "user".into(),
                id: username,
            });
        }
        if staff.len() >= tenant.max_users as usize {
            return Err(ZinicError::LimitExceeded {
                message: format!(
                    "{} already has {} of {} users",
                    tenant.code,
                    staff.len(),
                    tenant.max_users
                ),
            });
        }

        let user = User {
            id: new_id("usr"),
            tenant: tenant.code.clone(),
            username,
            full_name,
            email: input.email.filter(|e| !e.trim().is_empty()),
            role: input.role,
            department: input.department.trim().to_string(),
            grants: input.grants.unwrap_or_else(|| Grants::role_defaults(input.role)),
            secret_hash: password::hash_secret(&secret, self.pepper())?,
        };

        self.commit(&session, vec![Change::InsertUser(user.clone())])
            .await?;
        info!(user = %user.id, tenant = %user.tenant, role = %user.role, "User created");
        Ok(user)
    }

    pub async fn update_user(&self, user_id: &str, update: UpdateUser) -> ZinicResult<User> {
        let session = self.active()?;
        require(&session.user, ModuleAction::MANAGE_USERS)?;
        let view = self.view(&session);
        let mut user = view
            .user(user_id)
            .cloned()
            .ok_or_else(|| ZinicError::not_found("user", user_id))?;
        ensure_same_tenant(&session.user, &user.tenant)?;

        if let Some(role) = update.role {
            if role == Role::Super || user.role == Role::Super {
                require_super(&session.user, "change the super role")?;
            }
            user.role = role;
        }
        if let Some(full_name) = update.full_name {
            user.full_name = non_empty(&full_name, "full name")?;
        }
        if let Some(email) = update.email {
            user.email = email.filter(|e| !e.trim().is_empty());
        }
        if let Some(department) = update.department {
            user.department = department.trim().to_string();
        }
        if let Some(grants) = update.grants {
            user.grants = grants;
        }
        if let Some(secret) = update.secret {
            let secret = non_empty(&secret, "password")?;
            user.secret_hash = password::hash_secret(&secret, self.pepper())?;
        }

        self.commit(&session, vec![Change::PutUser(user.clone())])
            .await?;
        self.refresh_session_user(&user);
        info!(user = %user.id, "User updated");
        Ok(user)
    }

    /// Change the session user's own password. The current one must verify.
    pub async fn change_password(&self, current: &str, replacement: &str) -> ZinicResult<()> {
        let session = self.active()?;
        let view = self.view(&session);
        let mut user = view
            .user(&session.user.id)
            .cloned()
            .unwrap_or_else(|| session.user.clone());

        if !password::verify_secret(current, &user.secret_hash, self.pepper())? {
            return Err(ZinicError::unauthorized("credential mismatch"));
        }
        let replacement = non_empty(replacement, "password")?;
        user.secret_hash = password::hash_secret(&replacement, self.pepper())?;

        self.commit(&session, vec![Change::PutUser(user.clone())])
            .await?;
        self.refresh_session_user(&user);
        info!(user = %user.id, "Password changed");
        Ok(())
    }

    /// Replace the session tenant's department list. Names are trimmed and
    /// de-duplicated case-insensitively.
    pub async fn set_departments(&self, names: Vec<String>) -> ZinicResult<Vec<Department>> {
        let session = self.active()?;
        require(&session.user, ModuleAction::MANAGE_SETTINGS)?;
        let code = session.user.tenant.clone();

        let mut unique: Vec<String> = Vec::new();
        for name in names {
            let name = name.trim();
            if !name.is_empty() && !unique.iter().any(|n| n.eq_ignore_ascii_case(name)) {
                unique.push(name.to_string());
            }
        }
        if unique.is_empty() {
            return Err(ZinicError::validation("at least one department is required"));
        }

        let departments: Vec<Department> = unique
            .into_iter()
            .map(|name| Department {
                id: new_id("dep"),
                tenant: code.clone(),
                name,
            })
            .collect();

        self.commit(
            &session,
            vec![Change::ReplaceDepartments {
                tenant: code.clone(),
                departments: departments.clone(),
            }],
        )
        .await?;
        info!(tenant = %code, count = departments.len(), "Departments replaced");
        Ok(departments)
    }

    // -----------------------------------------------------------------
    // Network administration (super role)
    // -----------------------------------------------------------------

    fn tenant_admin(&self, tenant: &TenantCode, admin: NewTenantAdmin, role: Role) -> ZinicResult<User> {
        let secret = non_empty(&admin.secret, "admin password")?;
        Ok(User {
            id: new_id("usr"),
            tenant: tenant.clone(),
            username: non_empty(&admin.username, "admin username")?,
            full_name: non_empty(&admin.full_name, "admin full name")?,
            email: admin.email.filter(|e| !e.trim().is_empty()),
            role,
            department: ADMIN_DEPARTMENT.into(),
            grants: Grants::role_defaults(role),
            secret_hash: password::hash_secret(&secret, self.pepper())?,
        })
    }

    fn new_tenant(&self, input: CreateTenant) -> ZinicResult<Tenant> {
        if input.code.is_empty() {
            return Err(ZinicError::validation("tenant code must not be empty"));
        }
        if input.code.is_sandbox(&self.config.sandbox_prefix) {
            return Err(ZinicError::validation(format!(
                "tenant code {} is reserved for sandboxes",
                input.code
            )));
        }
        if !input.code.as_str().chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(ZinicError::validation(format!(
                "tenant code {} must be alphanumeric",
                input.code
            )));
        }
        Ok(Tenant {
            name: non_empty(&input.name, "tenant name")?,
            code: input.code,
            is_active: true,
            max_users: input.max_users,
            max_items: input.max_items,
            contact_email: input.contact_email.filter(|e| !e.trim().is_empty()),
            created_at: Utc::now(),
        })
    }

    /// Create the network's super tenant if it does not exist yet. Needs no
    /// session; returns whether anything was written.
    pub async fn bootstrap_super_tenant(
        &self,
        input: CreateTenant,
        admin: NewTenantAdmin,
    ) -> ZinicResult<bool> {
        let existing = self
            .store
            .select(Table::Hotels, Filter::by_id(input.code.as_str()))
            .await?;
        if !existing.is_empty() {
            debug!(tenant = %input.code, "Super tenant already present");
            return Ok(false);
        }

        let tenant = self.new_tenant(input)?;
        let admin = self.tenant_admin(&tenant.code, admin, Role::Super)?;
        let code = tenant.code.clone();
        let writes = [Change::InsertTenant(tenant), Change::InsertUser(admin)]
            .into_iter()
            .flat_map(Change::into_writes)
            .collect();
        self.store.apply(writes).await?;
        info!(tenant = %code, "Super tenant bootstrapped");
        Ok(true)
    }

    /// Onboard a hotel together with its first administrator.
    pub async fn provision_tenant(
        &self,
        input: CreateTenant,
        admin: NewTenantAdmin,
    ) -> ZinicResult<Tenant> {
        let session = self.active()?;
        require_super(&session.user, "provision tenants")?;
        let tenant = self.new_tenant(input)?;
        if self.view(&session).tenant(&tenant.code).is_some() {
            return Err(ZinicError::AlreadyExists {
                entity: "tenant".into(),
                id: tenant.code.to_string(),
            });
        }
        let admin = self.tenant_admin(&tenant.code, admin, Role::TenantAdmin)?;

        self.commit(
            &session,
            vec![Change::InsertTenant(tenant.clone()), Change::InsertUser(admin)],
        )
        .await?;
        info!(tenant = %tenant.code, "Tenant provisioned");
        Ok(tenant)
    }

    pub async fn update_tenant(&self, code: &TenantCode, update: UpdateTenant) -> ZinicResult<Tenant> {
        let session = self.active()?;
        require_super(&session.user, "update tenants")?;
        let mut tenant = self
            .view(&session)
            .tenant(code)
            .cloned()
            .ok_or_else(|| ZinicError::not_found("tenant", code.as_str()))?;
        tenant.apply(update);
        if tenant.name.trim().is_empty() {
            return Err(ZinicError::validation("tenant name must not be empty"));
        }

        self.commit(&session, vec![Change::PutTenant(tenant.clone())])
            .await?;
        info!(tenant = %code, active = tenant.is_active, "Tenant updated");
        Ok(tenant)
    }

    /// Force a new password onto a tenant's `admin` account.
    pub async fn reset_admin_password(&self, code: &TenantCode, secret: &str) -> ZinicResult<()> {
        let session = self.active()?;
        require_super(&session.user, "reset tenant admin passwords")?;
        let mut admin = self
            .view(&session)
            .users_of(code)
            .into_iter()
            .find(|u| u.username == ADMIN_USERNAME)
            .ok_or_else(|| ZinicError::not_found("user", ADMIN_USERNAME))?;
        let secret = non_empty(secret, "password")?;
        admin.secret_hash = password::hash_secret(&secret, self.pepper())?;

        self.commit(&session, vec![Change::PutUser(admin)]).await?;
        info!(tenant = %code, "Admin password reset");
        Ok(())
    }

    /// Remove a tenant and everything it owns.
    pub async fn decommission_tenant(&self, code: &TenantCode) -> ZinicResult<()> {
        let session = self.active()?;
        require_super(&session.user, "decommission tenants")?;
        if *code == session.user.tenant {
            return Err(ZinicError::validation("cannot decommission the tenant you are logged into"));
        }
        if self.view(&session).tenant(code).is_none() {
            return Err(ZinicError::not_found("tenant", code.as_str()));
        }

        self.commit(&session, vec![Change::PurgeTenant(code.clone())])
            .await?;
        warn!(tenant = %code, "Tenant decommissioned");
        Ok(())
    }

    /// Registered demo leads, newest first. Leads that fail to decode are
    /// skipped.
    pub async fn demo_leads(&self) -> ZinicResult<Vec<DemoLead>> {
        let session = self.active()?;
        require_super(&session.user, "list demo leads")?;
        let rows = self.store.select(Table::DemoLeads, Filter::all()).await?;

        let mut leads: Vec<DemoLead> = rows
            .into_iter()
            .filter_map(|row| match DemoLead::from_row(row) {
                Ok(lead) => Some(lead),
                Err(e) => {
                    warn!(error = %e, "Skipping malformed demo lead");
                    None
                }
            })
            .collect();
        leads.sort_by(|a, b| b.registered_at.cmp(&a.registered_at));
        Ok(leads)
    }

    // -----------------------------------------------------------------
    // Demo sandboxes
    // -----------------------------------------------------------------

    /// Register a prospect and provision a fresh local sandbox for them.
    /// Recording the lead remotely is best-effort.
    pub async fn start_demo(&self, input: CreateDemoLead) -> ZinicResult<DemoAccess> {
        let full_name = non_empty(&input.full_name, "full name")?;
        let hotel_name = non_empty(&input.hotel_name, "hotel name")?;
        let email = non_empty(&input.email, "email")?;

        let now = Utc::now();
        let code = sandbox_code(&self.config.sandbox_prefix);
        let lead = DemoLead {
            id: new_id("lead"),
            full_name: full_name.clone(),
            hotel_name: hotel_name.clone(),
            position: input.position.trim().to_string(),
            location: input.location.trim().to_string(),
            email: email.clone(),
            mobile: input.mobile.trim().to_string(),
            registered_at: now,
            expires_at: sandbox_expiry(now, self.config.sandbox_lifetime_hours),
            tenant: code.clone(),
            status: LeadStatus::Pending,
        };

        let record = vec![Write::Insert {
            table: Table::DemoLeads,
            row: lead.to_row(),
        }];
        if let Err(e) = self.store.apply(record).await {
            warn!(lead = %lead.id, error = %e, "Demo lead not recorded remotely");
        }

        let secret = demo_secret();
        let tenant = Tenant {
            code: code.clone(),
            name: hotel_name,
            is_active: true,
            max_users: self.config.sandbox_max_users,
            max_items: self.config.sandbox_max_items,
            contact_email: Some(email.clone()),
            created_at: now,
        };
        let admin = User {
            id: new_id("usr"),
            tenant: code.clone(),
            username: ADMIN_USERNAME.into(),
            full_name,
            email: Some(email),
            role: Role::TenantAdmin,
            department: ADMIN_DEPARTMENT.into(),
            grants: Grants::role_defaults(Role::TenantAdmin),
            secret_hash: password::hash_secret(&secret, self.pepper())?,
        };
        self.sandbox.provision(
            SandboxSession {
                tenant,
                lead_id: Some(lead.id.clone()),
                created_at: now,
                expires_at: lead.expires_at,
            },
            admin,
        )?;

        info!(tenant = %code, lead = %lead.id, expires_at = %lead.expires_at, "Demo sandbox issued");
        Ok(DemoAccess {
            lead,
            username: ADMIN_USERNAME.into(),
            secret,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sandbox_codes_follow_the_prefix_pattern() {
        for _ in 0..50 {
            let code = sandbox_code("DEMO-");
            assert!(code.is_sandbox("DEMO-"), "{code}");
            assert_eq!(code.as_str().len(), "DEMO-".len() + CODE_LENGTH);
            let suffix = &code.as_str()["DEMO-".len()..];
            assert!(!suffix.contains(['0', 'O', '1', 'I']));
        }
    }

    #[test]
    fn demo_secrets_are_alphanumeric() {
        let secret = demo_secret();
        assert_eq!(secret.len(), DEMO_SECRET_LENGTH);
        assert!(secret.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn quantity_checks_reject_negatives_and_nan() {
        assert!(non_negative(0.0, "stock").is_ok());
        assert!(matches!(
            non_negative(-1.0, "stock"),
            Err(ZinicError::InvalidQuantity { .. })
        ));
        assert!(non_negative(f64::NAN, "stock").is_err());
    }
}
