//! Integration tests for the SurrealDB remote store.

use std::time::Duration;

use chrono::{TimeZone, Utc};
use serde_json::json;
use surrealdb::Surreal;
use surrealdb::engine::local::{Db, Mem};
use zinic_core::error::ZinicError;
use zinic_core::mapper::RowMapping;
use zinic_core::models::item::StockItem;
use zinic_core::models::tenant::{Tenant, TenantCode};
use zinic_core::repository::{Filter, RemoteStore, Row, Table, Write};
use zinic_db::SurrealRemoteStore;

async fn setup() -> SurrealRemoteStore<Db> {
    SurrealRemoteStore::new(database().await)
}

async fn database() -> Surreal<Db> {
    let db = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();
    zinic_db::run_migrations(&db).await.unwrap();
    db
}

fn item(id: &str, tenant: &str, stock: f64) -> StockItem {
    StockItem {
        id: id.into(),
        tenant: TenantCode::new(tenant),
        name: format!("Item {id}"),
        category: "Linen".into(),
        unit: "pcs".into(),
        current_stock: stock,
        min_stock_level: 5.0,
        vendor_id: None,
        last_updated: Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap(),
    }
}

fn row(value: serde_json::Value) -> Row {
    value.as_object().cloned().unwrap()
}

#[tokio::test]
async fn insert_and_select_round_trip() {
    let store = setup().await;
    let towel = item("itm-1", "GRAND01", 12.0);

    store
        .apply(vec![Write::Insert {
            table: Table::Inventory,
            row: towel.to_row(),
        }])
        .await
        .unwrap();

    let rows = store
        .select(Table::Inventory, Filter::eq("client_id", "GRAND01"))
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["id"], json!("itm-1"));
    assert_eq!(StockItem::from_row(rows[0].clone()).unwrap(), towel);
}

#[tokio::test]
async fn select_partitions_by_tenant() {
    let store = setup().await;
    store
        .apply(vec![
            Write::Insert {
                table: Table::Inventory,
                row: item("itm-1", "GRAND01", 1.0).to_row(),
            },
            Write::Insert {
                table: Table::Inventory,
                row: item("itm-2", "SEAVIEW", 1.0).to_row(),
            },
        ])
        .await
        .unwrap();

    let grand = store
        .select(Table::Inventory, Filter::eq("client_id", "GRAND01"))
        .await
        .unwrap();
    assert_eq!(grand.len(), 1);
    let all = store.select(Table::Inventory, Filter::all()).await.unwrap();
    assert_eq!(all.len(), 2);
    let by_id = store
        .select(Table::Inventory, Filter::by_id("itm-2"))
        .await
        .unwrap();
    assert_eq!(by_id[0]["client_id"], json!("SEAVIEW"));
}

#[tokio::test]
async fn duplicate_insert_is_already_exists() {
    let store = setup().await;
    let write = Write::Insert {
        table: Table::Inventory,
        row: item("itm-1", "GRAND01", 1.0).to_row(),
    };
    store.apply(vec![write.clone()]).await.unwrap();

    let err = store.apply(vec![write]).await.unwrap_err();
    assert!(
        matches!(err, ZinicError::AlreadyExists { .. }),
        "expected AlreadyExists, got {err:?}"
    );
}

#[tokio::test]
async fn failed_batch_leaves_nothing_behind() {
    let store = setup().await;
    let user = |id: &str| {
        row(json!({
            "id": id,
            "client_id": "GRAND01",
            "username": "asha",
            "full_name": "Asha Nair",
            "role": "DEPT_USER",
            "department": "Kitchen",
            "permissions": [],
            "password_hash": "x"
        }))
    };

    // Second row violates the (client_id, username) unique index.
    let result = store
        .apply(vec![
            Write::Insert {
                table: Table::Inventory,
                row: item("itm-1", "GRAND01", 1.0).to_row(),
            },
            Write::Insert {
                table: Table::Users,
                row: user("u-1"),
            },
            Write::Insert {
                table: Table::Users,
                row: user("u-2"),
            },
        ])
        .await;
    assert!(result.is_err(), "duplicate username should be rejected");

    assert!(store.select(Table::Inventory, Filter::all()).await.unwrap().is_empty());
    assert!(store.select(Table::Users, Filter::all()).await.unwrap().is_empty());
}

#[tokio::test]
async fn merge_and_delete_follow_filters() {
    let store = setup().await;
    store
        .apply(vec![
            Write::Insert {
                table: Table::Inventory,
                row: item("itm-1", "GRAND01", 10.0).to_row(),
            },
            Write::Insert {
                table: Table::Inventory,
                row: item("itm-2", "GRAND01", 10.0).to_row(),
            },
        ])
        .await
        .unwrap();

    store
        .apply(vec![Write::Merge {
            table: Table::Inventory,
            filter: Filter::by_id("itm-1"),
            patch: row(json!({ "current_stock": 4.0 })),
        }])
        .await
        .unwrap();
    let merged = StockItem::from_row(
        store
            .select(Table::Inventory, Filter::by_id("itm-1"))
            .await
            .unwrap()
            .remove(0),
    )
    .unwrap();
    assert_eq!(merged.current_stock, 4.0);
    assert_eq!(merged.name, "Item itm-1");

    store
        .apply(vec![Write::Delete {
            table: Table::Inventory,
            filter: Filter::eq("client_id", "GRAND01"),
        }])
        .await
        .unwrap();
    assert!(store.select(Table::Inventory, Filter::all()).await.unwrap().is_empty());
}

#[tokio::test]
async fn upsert_replaces_whole_row() {
    let store = setup().await;
    let mut towel = item("itm-1", "GRAND01", 10.0);
    store
        .apply(vec![Write::Upsert {
            table: Table::Inventory,
            row: towel.to_row(),
        }])
        .await
        .unwrap();

    towel.vendor_id = Some("vnd-1".into());
    towel.current_stock = 3.0;
    store
        .apply(vec![Write::Upsert {
            table: Table::Inventory,
            row: towel.to_row(),
        }])
        .await
        .unwrap();

    let rows = store.select(Table::Inventory, Filter::all()).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(StockItem::from_row(rows[0].clone()).unwrap(), towel);
}

#[tokio::test]
async fn committed_batches_are_announced_once_per_table() {
    let store = setup().await;
    let mut feed = store.subscribe();

    let hotel = Tenant {
        code: TenantCode::new("GRAND01"),
        name: "Grand Hotel".into(),
        is_active: true,
        max_users: 10,
        max_items: 100,
        contact_email: None,
        created_at: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
    };
    store
        .apply(vec![
            Write::Insert {
                table: Table::Hotels,
                row: hotel.to_row(),
            },
            Write::Insert {
                table: Table::Inventory,
                row: item("itm-1", "GRAND01", 1.0).to_row(),
            },
            Write::Insert {
                table: Table::Inventory,
                row: item("itm-2", "GRAND01", 1.0).to_row(),
            },
        ])
        .await
        .unwrap();

    let mut tables = vec![feed.recv().await.unwrap().table, feed.recv().await.unwrap().table];
    tables.sort();
    assert_eq!(tables, vec![Table::Hotels, Table::Inventory]);
    assert!(feed.try_recv().is_err(), "one event per table");

    let stored = Tenant::from_row(
        store
            .select(Table::Hotels, Filter::by_id("GRAND01"))
            .await
            .unwrap()
            .remove(0),
    )
    .unwrap();
    assert_eq!(stored, hotel);
}

#[tokio::test]
async fn failed_batches_are_not_announced() {
    let store = setup().await;
    let write = Write::Insert {
        table: Table::Inventory,
        row: item("itm-1", "GRAND01", 1.0).to_row(),
    };
    store.apply(vec![write.clone()]).await.unwrap();

    let mut feed = store.subscribe();
    assert!(store.apply(vec![write]).await.is_err());
    assert!(feed.try_recv().is_err());
}

#[tokio::test]
async fn ping_succeeds_on_live_connection() {
    let store = setup().await;
    store.ping().await.unwrap();
}

#[tokio::test]
async fn watching_announces_writes_from_other_clients() {
    let db = database().await;
    let watcher = SurrealRemoteStore::new(db.clone());
    let writer = SurrealRemoteStore::new(db);
    watcher.watch().await.unwrap();
    watcher.watch().await.unwrap();
    let mut feed = watcher.subscribe();

    writer
        .apply(vec![Write::Insert {
            table: Table::Inventory,
            row: item("itm-1", "GRAND01", 4.0).to_row(),
        }])
        .await
        .unwrap();

    let change = tokio::time::timeout(Duration::from_secs(5), feed.recv())
        .await
        .expect("live notification")
        .unwrap();
    assert_eq!(change.table, Table::Inventory);

    watcher.unwatch().await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    while feed.try_recv().is_ok() {}
    writer
        .apply(vec![Write::Insert {
            table: Table::Inventory,
            row: item("itm-2", "GRAND01", 4.0).to_row(),
        }])
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(feed.try_recv().is_err());
}

#[tokio::test]
async fn unwatched_store_only_announces_its_own_writes() {
    let db = database().await;
    let idle = SurrealRemoteStore::new(db.clone());
    let writer = SurrealRemoteStore::new(db);
    let mut feed = idle.subscribe();

    writer
        .apply(vec![Write::Insert {
            table: Table::Inventory,
            row: item("itm-1", "GRAND01", 4.0).to_row(),
        }])
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(feed.try_recv().is_err());
}
