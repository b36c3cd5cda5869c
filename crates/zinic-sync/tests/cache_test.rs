//! Integration tests for the tenant data cache against in-memory SurrealDB.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use chrono::{TimeZone, Utc};
use serde_json::json;
use surrealdb::Surreal;
use surrealdb::engine::local::{Db, Mem};
use tokio::sync::{broadcast, mpsc};
use zinic_core::error::{ZinicError, ZinicResult};
use zinic_core::mapper::RowMapping;
use zinic_core::models::item::StockItem;
use zinic_core::models::tenant::{Tenant, TenantCode};
use zinic_core::repository::{Filter, RemoteStore, Row, Table, TableChange, Write};
use zinic_db::SurrealRemoteStore;
use zinic_sync::TenantDataCache;

/// Wraps the real store so reads can be made to fail on demand.
struct FlakyStore {
    inner: SurrealRemoteStore<Db>,
    failing: AtomicBool,
}

impl RemoteStore for FlakyStore {
    async fn select(&self, table: Table, filter: Filter) -> ZinicResult<Vec<Row>> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(ZinicError::RemoteUnavailable("connection reset".into()));
        }
        self.inner.select(table, filter).await
    }

    async fn apply(&self, batch: Vec<Write>) -> ZinicResult<()> {
        self.inner.apply(batch).await
    }

    async fn ping(&self) -> ZinicResult<()> {
        self.inner.ping().await
    }

    fn subscribe(&self) -> broadcast::Receiver<TableChange> {
        self.inner.subscribe()
    }

    async fn watch(&self) -> ZinicResult<()> {
        self.inner.watch().await
    }
}

async fn setup() -> Arc<FlakyStore> {
    setup_shared().await.0
}

/// Seeded store plus the database handle, for building a second client.
async fn setup_shared() -> (Arc<FlakyStore>, Surreal<Db>) {
    let db = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();
    zinic_db::run_migrations(&db).await.unwrap();
    let store = Arc::new(FlakyStore {
        inner: SurrealRemoteStore::new(db.clone()),
        failing: AtomicBool::new(false),
    });

    let mut writes = Vec::new();
    for code in ["GRAND01", "SEAVIEW"] {
        writes.push(Write::Insert {
            table: Table::Hotels,
            row: tenant(code).to_row(),
        });
        writes.push(Write::Insert {
            table: Table::Inventory,
            row: item(&format!("{code}-towel"), code, 20.0).to_row(),
        });
    }
    store.apply(writes).await.unwrap();
    (store, db)
}

fn tenant(code: &str) -> Tenant {
    Tenant {
        code: TenantCode::new(code),
        name: format!("Hotel {code}"),
        is_active: true,
        max_users: 10,
        max_items: 50,
        contact_email: None,
        created_at: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
    }
}

fn item(id: &str, tenant: &str, stock: f64) -> StockItem {
    StockItem {
        id: id.into(),
        tenant: TenantCode::new(tenant),
        name: "Bath Towel".into(),
        category: "Linen".into(),
        unit: "pcs".into(),
        current_stock: stock,
        min_stock_level: 5.0,
        vendor_id: None,
        last_updated: Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap(),
    }
}

async fn add_item(store: &FlakyStore, id: &str, tenant: &str) {
    store
        .apply(vec![Write::Insert {
            table: Table::Inventory,
            row: item(id, tenant, 3.0).to_row(),
        }])
        .await
        .unwrap();
}

#[tokio::test]
async fn tenant_scope_only_holds_its_own_rows() {
    let store = setup().await;
    let cache = TenantDataCache::new(Arc::clone(&store));
    let grand = TenantCode::new("grand01");

    cache.load_scope(&grand, false).await.unwrap();

    assert_eq!(cache.tenants().len(), 1);
    assert_eq!(cache.tenants()[0].code.as_str(), "GRAND01");
    let items = cache.items(&grand);
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].id, "GRAND01-towel");
    assert!(cache.items(&TenantCode::new("SEAVIEW")).is_empty());
}

#[tokio::test]
async fn global_scope_sees_every_tenant() {
    let store = setup().await;
    let cache = TenantDataCache::new(Arc::clone(&store));

    cache.load_scope(&TenantCode::new("HQ"), true).await.unwrap();

    assert!(cache.scope().unwrap().is_global());
    assert_eq!(cache.tenants().len(), 2);
    assert_eq!(cache.items(&TenantCode::new("HQ")).len(), 2);
}

#[tokio::test]
async fn malformed_rows_are_skipped() {
    let store = setup().await;
    let mut bad = item("broken", "GRAND01", 1.0).to_row();
    bad.insert("current_stock".into(), json!(-4));
    store
        .apply(vec![Write::Upsert {
            table: Table::Inventory,
            row: bad,
        }])
        .await
        .unwrap();

    let cache = TenantDataCache::new(Arc::clone(&store));
    let grand = TenantCode::new("GRAND01");
    cache.load_scope(&grand, false).await.unwrap();

    let ids: Vec<String> = cache.items(&grand).into_iter().map(|i| i.id).collect();
    assert_eq!(ids, vec!["GRAND01-towel".to_string()]);
}

#[tokio::test]
async fn failed_refresh_keeps_previous_snapshot() {
    let store = setup().await;
    let cache = TenantDataCache::new(Arc::clone(&store));
    let grand = TenantCode::new("GRAND01");
    cache.load_scope(&grand, false).await.unwrap();

    store.failing.store(true, Ordering::SeqCst);
    let err = cache.refresh().await.unwrap_err();
    assert!(matches!(err, ZinicError::RemoteUnavailable(_)));
    assert_eq!(cache.items(&grand).len(), 1);

    let err = cache
        .load_scope(&TenantCode::new("SEAVIEW"), false)
        .await
        .unwrap_err();
    assert!(matches!(err, ZinicError::RemoteUnavailable(_)));
    assert_eq!(cache.scope(), Some(zinic_sync::Scope::Tenant(grand.clone())));
    assert_eq!(cache.items(&grand)[0].id, "GRAND01-towel");
}

#[tokio::test]
async fn feed_events_trigger_refresh() {
    let store = setup().await;
    let cache = TenantDataCache::new(Arc::clone(&store));
    let grand = TenantCode::new("GRAND01");
    cache.load_scope(&grand, false).await.unwrap();

    let (tx, mut rx) = mpsc::unbounded_channel();
    let _subscription = cache.subscribe(move |snapshot| {
        let _ = tx.send(snapshot.items.len());
    });
    cache.start();
    assert!(cache.is_running());

    add_item(&store, "GRAND01-soap", "GRAND01").await;

    let seen = tokio::time::timeout(Duration::from_secs(5), async {
        while let Some(count) = rx.recv().await {
            if count == 2 {
                return true;
            }
        }
        false
    })
    .await
    .unwrap();
    assert!(seen);
    assert_eq!(cache.items(&grand).len(), 2);

    cache.stop();
    assert!(!cache.is_running());
}

#[tokio::test]
async fn stopped_cache_ignores_the_feed() {
    let store = setup().await;
    let cache = TenantDataCache::new(Arc::clone(&store));
    let grand = TenantCode::new("GRAND01");
    cache.load_scope(&grand, false).await.unwrap();
    cache.start();
    cache.stop();

    add_item(&store, "GRAND01-soap", "GRAND01").await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(cache.items(&grand).len(), 1);
    cache.refresh().await.unwrap();
    assert_eq!(cache.items(&grand).len(), 2);
}

#[tokio::test]
async fn dropped_subscription_is_not_notified() {
    let store = setup().await;
    let cache = TenantDataCache::new(Arc::clone(&store));
    let calls = Arc::new(AtomicUsize::new(0));

    let counter = Arc::clone(&calls);
    let subscription = cache.subscribe(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    cache.load_scope(&TenantCode::new("GRAND01"), false).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    subscription.unsubscribe();
    cache.refresh().await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn clear_forgets_the_scope() {
    let store = setup().await;
    let cache = TenantDataCache::new(Arc::clone(&store));
    let grand = TenantCode::new("GRAND01");
    cache.load_scope(&grand, false).await.unwrap();

    cache.clear();
    assert!(cache.scope().is_none());
    assert!(cache.items(&grand).is_empty());
    cache.refresh().await.unwrap();
    assert!(cache.tenants().is_empty());
}

#[tokio::test]
async fn writes_from_another_client_reach_the_cache() {
    let (store, db) = setup_shared().await;
    let other_client = SurrealRemoteStore::new(db);
    let cache = TenantDataCache::new(Arc::clone(&store));
    let grand = TenantCode::new("GRAND01");
    store.watch().await.unwrap();
    cache.load_scope(&grand, false).await.unwrap();

    let (tx, mut rx) = mpsc::unbounded_channel();
    let _subscription = cache.subscribe(move |snapshot| {
        let _ = tx.send(snapshot.items.len());
    });
    cache.start();

    other_client
        .apply(vec![Write::Insert {
            table: Table::Inventory,
            row: item("GRAND01-soap", "GRAND01", 3.0).to_row(),
        }])
        .await
        .unwrap();

    let seen = tokio::time::timeout(Duration::from_secs(5), async {
        while let Some(count) = rx.recv().await {
            if count == 2 {
                return true;
            }
        }
        false
    })
    .await
    .unwrap();
    assert!(seen);
    assert_eq!(cache.items(&grand).len(), 2);
    cache.stop();
}

#[tokio::test]
async fn overlapping_refreshes_settle_on_the_latest_rows() {
    let store = setup().await;
    let cache = TenantDataCache::new(Arc::clone(&store));
    let grand = TenantCode::new("GRAND01");
    cache.load_scope(&grand, false).await.unwrap();
    let before = cache.items(&grand);

    let (a, b, c) = tokio::join!(cache.refresh(), cache.refresh(), cache.refresh());
    assert!(a.is_ok() && b.is_ok() && c.is_ok());
    assert_eq!(cache.items(&grand), before);

    add_item(&store, "GRAND01-soap", "GRAND01").await;
    let (a, b) = tokio::join!(cache.refresh(), cache.refresh());
    assert!(a.is_ok() && b.is_ok());
    assert_eq!(cache.items(&grand).len(), 2);

    // An older fetch finishing late must not bring back the pre-insert rows.
    cache.refresh().await.unwrap();
    assert_eq!(cache.items(&grand).len(), 2);
}
