//! Local sandbox store for time-boxed demo sessions.
//!
//! The sandbox mirrors a single tenant entirely in local key-value storage,
//! one JSON document per collection. It has no change feed: every commit
//! persists and then notifies observers directly.
//!
//! A commit spans several keys, so before touching them the previous values
//! are recorded under [`JOURNAL_KEY`]. A key that fails to write rolls the
//! others back; if the rollback itself is cut short, the next
//! [`SandboxStore::open`] finishes it. A failed commit leaves both memory
//! and storage as they were.

use std::collections::BTreeMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use zinic_core::error::{ZinicError, ZinicResult};
use zinic_core::models::item::StockItem;
use zinic_core::models::tenant::{Tenant, TenantCode};
use zinic_core::models::user::User;
use zinic_core::repository::KeyValueStorage;

use crate::error::SyncError;
use crate::observer::{ObserverSet, Subscription};
use crate::password;
use crate::snapshot::{Change, Scope, Snapshot};

pub const ITEMS_KEY: &str = "zinic_demo_items";
pub const REQUESTS_KEY: &str = "zinic_demo_requests";
pub const VENDORS_KEY: &str = "zinic_demo_vendors";
pub const DEPARTMENTS_KEY: &str = "zinic_demo_departments";
pub const USERS_KEY: &str = "zinic_demo_users";
pub const SESSION_KEY: &str = "zinic_demo_session";
/// Previous values of the keys a commit is rewriting; empty when no commit
/// is in progress.
pub const JOURNAL_KEY: &str = "zinic_demo_journal";

/// The provisional tenant and its lifetime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SandboxSession {
    pub tenant: Tenant,
    pub lead_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl SandboxSession {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

struct SandboxState {
    session: Option<SandboxSession>,
    snapshot: Snapshot,
}

pub struct SandboxStore<K: KeyValueStorage> {
    storage: K,
    state: Mutex<SandboxState>,
    observers: ObserverSet<Snapshot>,
}

/// Example stock every new sandbox starts with.
pub fn seed_items(tenant: &TenantCode, at: DateTime<Utc>) -> Vec<StockItem> {
    const SEED: [(&str, &str, &str, f64, f64); 6] = [
        ("Bath Towel", "Linen", "pcs", 120.0, 40.0),
        ("Bed Sheet (King)", "Linen", "pcs", 60.0, 25.0),
        ("Basmati Rice", "Dry Goods", "kg", 50.0, 20.0),
        ("Cooking Oil", "Dry Goods", "ltr", 18.0, 20.0),
        ("Hand Soap", "Amenities", "pcs", 300.0, 100.0),
        ("Floor Cleaner", "Housekeeping", "ltr", 12.0, 10.0),
    ];
    SEED.iter()
        .enumerate()
        .map(|(index, (name, category, unit, stock, min))| StockItem {
            id: format!("demo-itm-{}", index + 1),
            tenant: tenant.clone(),
            name: (*name).into(),
            category: (*category).into(),
            unit: (*unit).into(),
            current_stock: *stock,
            min_stock_level: *min,
            vendor_id: None,
            last_updated: at,
        })
        .collect()
}

/// Raw value of `key`, with an empty string standing for "never written"
/// (storage has no delete).
fn raw<K: KeyValueStorage>(storage: &K, key: &str) -> ZinicResult<String> {
    Ok(storage.get(key)?.unwrap_or_default())
}

fn load<T: DeserializeOwned, K: KeyValueStorage>(storage: &K, key: &str) -> ZinicResult<Option<T>> {
    let text = raw(storage, key)?;
    if text.is_empty() {
        return Ok(None);
    }
    Ok(Some(serde_json::from_str(&text).map_err(SyncError::from)?))
}

fn encode<T: Serialize>(value: &T) -> ZinicResult<String> {
    Ok(serde_json::to_string(value).map_err(SyncError::from)?)
}

/// Documents for every persisted collection of `snapshot`, plus the
/// session when there is one.
fn documents(
    session: Option<&SandboxSession>,
    snapshot: &Snapshot,
) -> ZinicResult<Vec<(&'static str, String)>> {
    let mut documents = vec![
        (ITEMS_KEY, encode(&snapshot.items)?),
        (REQUESTS_KEY, encode(&snapshot.requests)?),
        (VENDORS_KEY, encode(&snapshot.vendors)?),
        (DEPARTMENTS_KEY, encode(&snapshot.departments)?),
        (USERS_KEY, encode(&snapshot.users)?),
    ];
    if let Some(session) = session {
        documents.push((SESSION_KEY, encode(session)?));
    }
    Ok(documents)
}

/// Write `documents` all-or-nothing.
fn write_all<K: KeyValueStorage>(
    storage: &K,
    documents: &[(&'static str, String)],
) -> ZinicResult<()> {
    let mut previous = BTreeMap::new();
    for (key, _) in documents {
        previous.insert(key.to_string(), raw(storage, key)?);
    }
    storage.set(JOURNAL_KEY, &encode(&previous)?)?;

    let mut written = Vec::with_capacity(documents.len());
    for (key, value) in documents {
        if let Err(e) = storage.set(key, value) {
            warn!(key, error = %e, "Sandbox write failed; rolling back");
            roll_back(storage, &previous, &written);
            return Err(e);
        }
        written.push(*key);
    }

    if let Err(e) = storage.set(JOURNAL_KEY, "") {
        warn!(error = %e, "Sandbox journal not cleared; rolling back");
        roll_back(storage, &previous, &written);
        return Err(e);
    }
    Ok(())
}

/// Restore the `written` keys. Whatever cannot be restored now stays in
/// the journal for [`recover`].
fn roll_back<K: KeyValueStorage>(storage: &K, previous: &BTreeMap<String, String>, written: &[&str]) {
    for key in written {
        let value = previous.get(*key).map(String::as_str).unwrap_or_default();
        if let Err(e) = storage.set(key, value) {
            warn!(key, error = %e, "Sandbox rollback incomplete; finishing on next open");
            return;
        }
    }
    if let Err(e) = storage.set(JOURNAL_KEY, "") {
        debug!(error = %e, "Sandbox journal left behind; it restores identical values");
    }
}

/// Finish a rollback an earlier process could not complete.
fn recover<K: KeyValueStorage>(storage: &K) -> ZinicResult<()> {
    let journal = raw(storage, JOURNAL_KEY)?;
    if journal.is_empty() {
        return Ok(());
    }
    let previous: BTreeMap<String, String> =
        serde_json::from_str(&journal).map_err(SyncError::from)?;
    for (key, value) in &previous {
        if raw(storage, key)? != *value {
            storage.set(key, value)?;
        }
    }
    storage.set(JOURNAL_KEY, "")?;
    warn!(keys = previous.len(), "Rolled back an interrupted sandbox commit");
    Ok(())
}

impl<K: KeyValueStorage> SandboxStore<K> {
    /// Open the sandbox persisted in `storage`, seeding example items if a
    /// session exists but no item collection was ever written.
    pub fn open(storage: K) -> ZinicResult<Self> {
        recover(&storage)?;
        let session: Option<SandboxSession> = load(&storage, SESSION_KEY)?;
        let scope = match &session {
            Some(s) => Scope::Tenant(s.tenant.code.clone()),
            None => Scope::Global,
        };

        let mut snapshot = Snapshot::empty(scope);
        snapshot.users = load(&storage, USERS_KEY)?.unwrap_or_default();
        snapshot.requests = load(&storage, REQUESTS_KEY)?.unwrap_or_default();
        snapshot.vendors = load(&storage, VENDORS_KEY)?.unwrap_or_default();
        snapshot.departments = load(&storage, DEPARTMENTS_KEY)?.unwrap_or_default();
        snapshot.items = match load(&storage, ITEMS_KEY)? {
            Some(items) => items,
            None => match &session {
                Some(s) => {
                    let items = seed_items(&s.tenant.code, s.created_at);
                    storage.set(ITEMS_KEY, &encode(&items)?)?;
                    debug!(tenant = %s.tenant.code, "Seeded sandbox items");
                    items
                }
                None => Vec::new(),
            },
        };
        if let Some(s) = &session {
            snapshot.tenants = vec![s.tenant.clone()];
        }

        Ok(Self {
            storage,
            state: Mutex::new(SandboxState { session, snapshot }),
            observers: ObserverSet::new(),
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SandboxState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn persist(&self, session: Option<&SandboxSession>, snapshot: &Snapshot) -> ZinicResult<()> {
        write_all(&self.storage, &documents(session, snapshot)?)
    }

    /// Replace whatever sandbox existed with a fresh one owned by `admin`.
    pub fn provision(&self, session: SandboxSession, admin: User) -> ZinicResult<()> {
        let code = session.tenant.code.clone();
        let mut snapshot = Snapshot::empty(Scope::Tenant(code.clone()));
        snapshot.tenants = vec![session.tenant.clone()];
        snapshot.users = vec![admin];
        snapshot.items = seed_items(&code, session.created_at);

        {
            let mut state = self.lock();
            self.persist(Some(&session), &snapshot)?;
            state.session = Some(session);
            state.snapshot = snapshot.clone();
        }

        info!(tenant = %code, "Sandbox provisioned");
        self.observers.notify(&snapshot);
        Ok(())
    }

    /// Check a sandbox login. Expired sandboxes fail with `SandboxExpired`
    /// before credentials are looked at.
    pub fn authenticate(
        &self,
        code: &TenantCode,
        username: &str,
        secret: &str,
        pepper: Option<&str>,
        now: DateTime<Utc>,
    ) -> ZinicResult<(User, Tenant)> {
        let state = self.lock();
        let session = state
            .session
            .as_ref()
            .filter(|s| s.tenant.code == *code)
            .ok_or_else(|| ZinicError::not_found("sandbox", code.as_str()))?;

        if session.is_expired(now) {
            warn!(tenant = %code, expired_at = %session.expires_at, "Sandbox login after expiry");
            return Err(ZinicError::SandboxExpired {
                code: code.to_string(),
            });
        }

        let user = state
            .snapshot
            .users
            .iter()
            .find(|u| u.tenant == *code && u.username == username)
            .cloned()
            .ok_or_else(|| ZinicError::not_found("user", username))?;

        if !password::verify_secret(secret, &user.secret_hash, pepper)? {
            return Err(ZinicError::unauthorized("credential mismatch"));
        }

        Ok((user, session.tenant.clone()))
    }

    /// Apply changes all-or-nothing, persist, then notify observers.
    pub fn commit(&self, changes: Vec<Change>) -> ZinicResult<()> {
        let snapshot = {
            let mut state = self.lock();
            let mut next = state.snapshot.clone();
            for change in changes {
                next.apply(change)?;
            }
            let session = state.session.clone().map(|mut session| {
                if let Some(tenant) = next.tenant(&session.tenant.code) {
                    session.tenant = tenant.clone();
                }
                session
            });
            self.persist(session.as_ref(), &next)?;
            state.session = session;
            state.snapshot = next.clone();
            next
        };

        debug!(items = snapshot.items.len(), "Sandbox committed");
        self.observers.notify(&snapshot);
        Ok(())
    }

    pub fn session(&self) -> Option<SandboxSession> {
        self.lock().session.clone()
    }

    pub fn snapshot(&self) -> Snapshot {
        self.lock().snapshot.clone()
    }

    pub fn subscribe(&self, observer: impl Fn(&Snapshot) + Send + Sync + 'static) -> Subscription {
        self.observers.subscribe(observer)
    }
}
