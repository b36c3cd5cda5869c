//! Tenant data cache: the authoritative in-memory snapshot of one scope.
//!
//! The cache is an explicitly constructed service. [`TenantDataCache::load_scope`]
//! fetches every watched table for the scope and swaps the whole snapshot
//! in one step; a failed fetch keeps the previous snapshot. After
//! [`TenantDataCache::start`], every change-feed event triggers the same
//! full refresh. Observers run after each successful refresh.
//!
//! Refreshes may overlap. Each fetch takes a ticket when it starts, and a
//! fetch that finishes after a later-started one is discarded, so the
//! installed snapshot never goes back in time.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use zinic_core::error::ZinicResult;
use zinic_core::mapper::RowMapping;
use zinic_core::models::department::Department;
use zinic_core::models::item::StockItem;
use zinic_core::models::request::StockRequest;
use zinic_core::models::tenant::{Tenant, TenantCode};
use zinic_core::models::user::User;
use zinic_core::models::vendor::Vendor;
use zinic_core::repository::{RemoteStore, Row, Table};

use crate::observer::{ObserverSet, Subscription};
use crate::snapshot::{Owned, Scope, Snapshot};

/// Tables whose changes invalidate the snapshot.
pub const WATCHED_TABLES: [Table; 6] = [
    Table::Hotels,
    Table::Users,
    Table::Inventory,
    Table::Requests,
    Table::Vendors,
    Table::Departments,
];

struct CacheState {
    scope: Option<Scope>,
    snapshot: Arc<Snapshot>,
    /// Ticket of the fetch that produced `snapshot`, or the last ticket
    /// issued before a clear.
    installed: u64,
}

struct CacheInner<S> {
    store: Arc<S>,
    state: RwLock<CacheState>,
    tickets: AtomicU64,
    observers: ObserverSet<Snapshot>,
}

pub struct TenantDataCache<S: RemoteStore + 'static> {
    inner: Arc<CacheInner<S>>,
    listener: Mutex<Option<JoinHandle<()>>>,
}

/// Decode rows, dropping (and logging) the ones that fail validation so a
/// single bad record cannot blank the whole view.
fn decode_rows<T: RowMapping>(rows: Vec<Row>) -> Vec<T> {
    rows.into_iter()
        .filter_map(|row| match T::from_row(row) {
            Ok(entity) => Some(entity),
            Err(e) => {
                warn!(table = %T::TABLE, error = %e, "Skipping malformed row");
                None
            }
        })
        .collect()
}

impl<S: RemoteStore + 'static> CacheInner<S> {
    fn read(&self) -> std::sync::RwLockReadGuard<'_, CacheState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    async fn fetch(&self, scope: &Scope) -> ZinicResult<Snapshot> {
        let store = &self.store;
        let (tenants, users, items, requests, vendors, departments) = tokio::try_join!(
            store.select(Table::Hotels, scope.filter(Table::Hotels)),
            store.select(Table::Users, scope.filter(Table::Users)),
            store.select(Table::Inventory, scope.filter(Table::Inventory)),
            store.select(Table::Requests, scope.filter(Table::Requests)),
            store.select(Table::Vendors, scope.filter(Table::Vendors)),
            store.select(Table::Departments, scope.filter(Table::Departments)),
        )?;

        Ok(Snapshot {
            scope: scope.clone(),
            tenants: decode_rows::<Tenant>(tenants),
            users: decode_rows::<User>(users),
            items: decode_rows::<StockItem>(items),
            requests: decode_rows::<StockRequest>(requests),
            vendors: decode_rows::<Vendor>(vendors),
            departments: decode_rows::<Department>(departments),
        })
    }

    /// Fetch `scope` and install it. `switch` allows replacing a different
    /// scope; feed refreshes only install into the scope they were started
    /// for.
    async fn load(&self, scope: Scope, switch: bool) -> ZinicResult<()> {
        let ticket = self.tickets.fetch_add(1, Ordering::SeqCst) + 1;
        let snapshot = match self.fetch(&scope).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(scope = ?scope, error = %e, "Refresh failed; keeping previous snapshot");
                return Err(e);
            }
        };

        let snapshot = Arc::new(snapshot);
        {
            let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
            if !switch && state.scope.as_ref() != Some(&scope) {
                debug!(scope = ?scope, "Discarding refresh for a scope no longer loaded");
                return Ok(());
            }
            if ticket <= state.installed {
                debug!(ticket, installed = state.installed, "Discarding overtaken refresh");
                return Ok(());
            }
            state.scope = Some(scope);
            state.snapshot = Arc::clone(&snapshot);
            state.installed = ticket;
        }

        debug!(
            tenants = snapshot.tenants.len(),
            items = snapshot.items.len(),
            requests = snapshot.requests.len(),
            "Snapshot refreshed"
        );
        self.observers.notify(&snapshot);
        Ok(())
    }

    async fn refresh(&self) -> ZinicResult<()> {
        let scope = self.read().scope.clone();
        match scope {
            Some(scope) => self.load(scope, false).await,
            None => Ok(()),
        }
    }
}

impl<S: RemoteStore + 'static> TenantDataCache<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                store,
                state: RwLock::new(CacheState {
                    scope: None,
                    snapshot: Arc::new(Snapshot::empty(Scope::Global)),
                    installed: 0,
                }),
                tickets: AtomicU64::new(0),
                observers: ObserverSet::new(),
            }),
            listener: Mutex::new(None),
        }
    }

    /// Fetch and replace the whole snapshot for `code` (or every tenant
    /// when `is_global`).
    pub async fn load_scope(&self, code: &TenantCode, is_global: bool) -> ZinicResult<()> {
        let scope = Scope::new(code, is_global);
        info!(tenant = %code, global = is_global, "Loading tenant scope");
        self.inner.load(scope, true).await
    }

    /// Re-fetch the current scope. No-op before the first `load_scope`.
    pub async fn refresh(&self) -> ZinicResult<()> {
        self.inner.refresh().await
    }

    /// Spawn the change-feed listener. Calling it while already running
    /// does nothing.
    pub fn start(&self) {
        let mut listener = self.listener.lock().unwrap_or_else(|e| e.into_inner());
        if listener.as_ref().is_some_and(|h| !h.is_finished()) {
            return;
        }

        let mut feed = self.inner.store.subscribe();
        let inner = Arc::clone(&self.inner);
        *listener = Some(tokio::spawn(async move {
            debug!("Change-feed listener started");
            loop {
                match feed.recv().await {
                    Ok(change) if !WATCHED_TABLES.contains(&change.table) => continue,
                    Ok(change) => debug!(table = %change.table, "Change received"),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Change feed lagged; refreshing");
                    }
                    Err(RecvError::Closed) => {
                        debug!("Change feed closed");
                        break;
                    }
                }

                // Every refresh is a full re-fetch, so queued events add
                // nothing.
                loop {
                    match feed.try_recv() {
                        Ok(_) | Err(TryRecvError::Lagged(_)) => continue,
                        Err(_) => break,
                    }
                }

                // Failure is already logged; the next event retries.
                let _ = inner.refresh().await;
            }
            debug!("Change-feed listener stopped");
        }));
    }

    /// Stop the change-feed listener. The snapshot is kept.
    pub fn stop(&self) {
        let handle = self
            .listener
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(handle) = handle {
            handle.abort();
            debug!("Change-feed listener aborted");
        }
    }

    pub fn is_running(&self) -> bool {
        self.listener
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }

    /// Stop listening and forget the loaded scope.
    pub fn clear(&self) {
        self.stop();
        let mut state = self.inner.state.write().unwrap_or_else(|e| e.into_inner());
        state.scope = None;
        state.snapshot = Arc::new(Snapshot::empty(Scope::Global));
        // Fetches already in flight must not resurrect the cleared scope.
        state.installed = self.inner.tickets.load(Ordering::SeqCst);
    }

    pub fn subscribe(&self, observer: impl Fn(&Snapshot) + Send + Sync + 'static) -> Subscription {
        self.inner.observers.subscribe(observer)
    }

    pub fn scope(&self) -> Option<Scope> {
        self.inner.read().scope.clone()
    }

    pub fn snapshot(&self) -> Arc<Snapshot> {
        Arc::clone(&self.inner.read().snapshot)
    }

    fn visible<T: Owned + Clone>(&self, code: &TenantCode, pick: impl Fn(&Snapshot) -> &[T]) -> Vec<T> {
        let snapshot = self.snapshot();
        let rows = pick(&snapshot);
        if snapshot.scope.is_global() {
            rows.to_vec()
        } else {
            rows.iter().filter(|r| r.tenant() == code).cloned().collect()
        }
    }

    pub fn tenants(&self) -> Vec<Tenant> {
        self.snapshot().tenants.clone()
    }

    pub fn users(&self, code: &TenantCode) -> Vec<User> {
        self.visible(code, |s| s.users.as_slice())
    }

    pub fn items(&self, code: &TenantCode) -> Vec<StockItem> {
        self.visible(code, |s| s.items.as_slice())
    }

    pub fn requests(&self, code: &TenantCode) -> Vec<StockRequest> {
        self.visible(code, |s| s.requests.as_slice())
    }

    pub fn vendors(&self, code: &TenantCode) -> Vec<Vendor> {
        self.visible(code, |s| s.vendors.as_slice())
    }

    pub fn departments(&self, code: &TenantCode) -> Vec<Department> {
        self.visible(code, |s| s.departments.as_slice())
    }

    pub fn department_names(&self, code: &TenantCode) -> Vec<String> {
        self.snapshot().department_names(code)
    }
}

impl<S: RemoteStore + 'static> Drop for TenantDataCache<S> {
    fn drop(&mut self) {
        self.stop();
    }
}
