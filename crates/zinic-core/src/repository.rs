//! Storage boundary contracts.
//!
//! The remote store is addressed by table and exchanges untyped rows; the
//! [`crate::mapper`] module turns those into entities. Writes are submitted
//! as batches that the store applies atomically. The change feed carries
//! one [`TableChange`] per affected table (no row-level diff), both for
//! batches applied through the store and, once [`RemoteStore::watch`] has
//! run, for writes committed by any other client.

use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value};
use tokio::sync::broadcast;

use crate::error::ZinicResult;

/// A row as the remote store sees it: field name to JSON value.
pub type Row = Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Table {
    Hotels,
    Users,
    Inventory,
    Requests,
    Vendors,
    Departments,
    DemoLeads,
}

impl Table {
    pub const ALL: [Table; 7] = [
        Table::Hotels,
        Table::Users,
        Table::Inventory,
        Table::Requests,
        Table::Vendors,
        Table::Departments,
        Table::DemoLeads,
    ];

    /// Tables whose rows carry a `client_id` owning-tenant column, in
    /// cascade-delete order.
    pub const TENANT_SCOPED: [Table; 5] = [
        Table::Users,
        Table::Inventory,
        Table::Requests,
        Table::Vendors,
        Table::Departments,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Table::Hotels => "hotels",
            Table::Users => "users",
            Table::Inventory => "inventory",
            Table::Requests => "requests",
            Table::Vendors => "vendors",
            Table::Departments => "departments",
            Table::DemoLeads => "demo_leads",
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Conjunction of equality conditions. An empty filter matches every row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    conditions: Vec<(&'static str, Value)>,
}

impl Filter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn eq(field: &'static str, value: impl Into<Value>) -> Self {
        Self::all().and(field, value)
    }

    pub fn by_id(id: impl Into<String>) -> Self {
        Self::eq("id", id.into())
    }

    pub fn and(mut self, field: &'static str, value: impl Into<Value>) -> Self {
        self.conditions.push((field, value.into()));
        self
    }

    pub fn conditions(&self) -> &[(&'static str, Value)] {
        &self.conditions
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Evaluate against a row; used by stores that filter client-side.
    pub fn matches(&self, row: &Row) -> bool {
        self.conditions
            .iter()
            .all(|(field, value)| row.get(*field) == Some(value))
    }
}

/// One write in a batch.
#[derive(Debug, Clone, PartialEq)]
pub enum Write {
    /// Create; fails with `AlreadyExists` if the row's `id` is taken.
    Insert { table: Table, row: Row },
    /// Create or fully replace the row with the same `id`.
    Upsert { table: Table, row: Row },
    /// Merge `patch` into every row matching `filter`, leaving the other
    /// columns as they are.
    Merge {
        table: Table,
        filter: Filter,
        patch: Row,
    },
    /// Remove every row matching `filter`.
    Delete { table: Table, filter: Filter },
}

impl Write {
    pub fn table(&self) -> Table {
        match self {
            Write::Insert { table, .. }
            | Write::Upsert { table, .. }
            | Write::Merge { table, .. }
            | Write::Delete { table, .. } => *table,
        }
    }
}

/// Change-feed event: something in `table` changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableChange {
    pub table: Table,
}

/// Table-scoped access to the remote relational store.
pub trait RemoteStore: Send + Sync {
    fn select(
        &self,
        table: Table,
        filter: Filter,
    ) -> impl Future<Output = ZinicResult<Vec<Row>>> + Send;

    /// Apply all writes or none. Resolves once the store acknowledged.
    fn apply(&self, batch: Vec<Write>) -> impl Future<Output = ZinicResult<()>> + Send;

    /// Cheap round-trip used for connection status.
    fn ping(&self) -> impl Future<Output = ZinicResult<()>> + Send;

    /// Subscribe to the change feed.
    fn subscribe(&self) -> broadcast::Receiver<TableChange>;

    /// Start pushing changes committed by other clients onto the change
    /// feed. Calling it again while already watching does nothing. Stores
    /// without a push channel only announce their own writes.
    fn watch(&self) -> impl Future<Output = ZinicResult<()>> + Send {
        async { Ok(()) }
    }
}

/// Synchronous key-value persistence for whole-collection JSON blobs.
pub trait KeyValueStorage: Send + Sync {
    fn get(&self, key: &str) -> ZinicResult<Option<String>>;
    fn set(&self, key: &str, value: &str) -> ZinicResult<()>;
}

impl<K: KeyValueStorage + ?Sized> KeyValueStorage for Arc<K> {
    fn get(&self, key: &str) -> ZinicResult<Option<String>> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> ZinicResult<()> {
        (**self).set(key, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn filter_matches_every_condition() {
        let row = json!({ "id": "i-1", "client_id": "GRAND01" })
            .as_object()
            .cloned()
            .unwrap();
        assert!(Filter::all().matches(&row));
        assert!(Filter::eq("client_id", "GRAND01").matches(&row));
        assert!(!Filter::eq("client_id", "GRAND01").and("id", "i-2").matches(&row));
    }
}
