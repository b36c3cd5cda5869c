//! SurrealDB implementation of [`RemoteStore`].
//!
//! A write batch is rendered as one `BEGIN ... COMMIT` query. All values
//! travel in a single `$batch` parameter and statements address their
//! slice of it by index (`$batch[2].body`), so no caller-provided text is
//! ever spliced into SurrealQL. Table names come from [`Table`] and filter
//! field names are checked to be plain identifiers.
//!
//! Once a batch commits, one [`TableChange`] per touched table is sent on
//! the change feed. [`RemoteStore::watch`] adds a `LIVE SELECT` per table so
//! writes committed by other clients reach the same feed.

use std::collections::BTreeSet;
use std::sync::Arc;

use futures::StreamExt;
use serde_json::{Value, json};
use surrealdb::{Connection, Surreal};
use tokio::sync::{Mutex, broadcast};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use zinic_core::error::{ZinicError, ZinicResult};
use zinic_core::repository::{Filter, RemoteStore, Row, Table, TableChange, Write};

use crate::error::DbError;

/// Buffered change events per subscriber before it starts lagging.
pub const DEFAULT_FEED_CAPACITY: usize = 256;

#[derive(Clone)]
pub struct SurrealRemoteStore<C: Connection> {
    db: Surreal<C>,
    feed: broadcast::Sender<TableChange>,
    /// One forwarding task per live query.
    watchers: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl<C: Connection> SurrealRemoteStore<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self::with_feed_capacity(db, DEFAULT_FEED_CAPACITY)
    }

    pub fn with_feed_capacity(db: Surreal<C>, capacity: usize) -> Self {
        let (feed, _) = broadcast::channel(capacity.max(1));
        Self {
            db,
            feed,
            watchers: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Kill the live queries opened by [`RemoteStore::watch`]. Batches
    /// applied through this store are still announced.
    pub async fn unwatch(&self) {
        let mut watchers = self.watchers.lock().await;
        if watchers.is_empty() {
            return;
        }
        for handle in watchers.drain(..) {
            handle.abort();
        }
        info!("Stopped watching remote tables");
    }

    async fn exists(&self, table: Table, id: &str) -> ZinicResult<bool> {
        Ok(!self.select(table, Filter::by_id(id)).await?.is_empty())
    }
}

fn is_identifier(field: &str) -> bool {
    !field.is_empty()
        && field
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

/// Render `filter` as a WHERE clause reading its values from `param`
/// (an array aligned with the filter's conditions).
fn where_clause(table: Table, filter: &Filter, param: &str) -> Result<String, DbError> {
    if filter.is_empty() {
        return Ok(String::new());
    }
    let mut parts = Vec::with_capacity(filter.conditions().len());
    for (index, (field, _)) in filter.conditions().iter().enumerate() {
        if !is_identifier(field) {
            return Err(DbError::InvalidField((*field).to_string()));
        }
        if *field == "id" {
            parts.push(format!("id = type::record('{table}', {param}[{index}])"));
        } else {
            parts.push(format!("{field} = {param}[{index}]"));
        }
    }
    Ok(format!(" WHERE {}", parts.join(" AND ")))
}

fn filter_values(filter: &Filter) -> Value {
    Value::Array(filter.conditions().iter().map(|(_, v)| v.clone()).collect())
}

/// Separate the record id from the stored body.
fn split_id(table: Table, row: &Row) -> ZinicResult<(String, Row)> {
    let mut body = row.clone();
    match body.remove("id") {
        Some(Value::String(id)) if !id.is_empty() => Ok((id, body)),
        _ => Err(ZinicError::validation(format!(
            "{table} row is missing a string id"
        ))),
    }
}

/// Put the record key back under `id` as a plain string.
fn restore_id(value: Value) -> Option<Row> {
    let Value::Object(mut row) = value else {
        return None;
    };
    if let Some(Value::String(id)) = row.remove("record_id") {
        row.insert("id".into(), Value::String(id));
    }
    Some(row)
}

impl<C: Connection> RemoteStore for SurrealRemoteStore<C> {
    async fn select(&self, table: Table, filter: Filter) -> ZinicResult<Vec<Row>> {
        let clause = where_clause(table, &filter, "$filter")?;
        let query = format!("SELECT *, meta::id(id) AS record_id OMIT id FROM {table}{clause}");

        let mut result = self
            .db
            .query(query)
            .bind(("filter", filter_values(&filter)))
            .await
            .map_err(DbError::from)?;
        let rows: Vec<Value> = result.take(0).map_err(DbError::from)?;

        debug!(table = %table, rows = rows.len(), "Selected rows");
        Ok(rows.into_iter().filter_map(restore_id).collect())
    }

    async fn apply(&self, batch: Vec<Write>) -> ZinicResult<()> {
        if batch.is_empty() {
            return Ok(());
        }

        // CREATE inside a transaction reports a failed transaction rather
        // than the duplicate, so look for taken ids up front.
        for write in &batch {
            if let Write::Insert { table, row } = write {
                let (id, _) = split_id(*table, row)?;
                if self.exists(*table, &id).await? {
                    return Err(ZinicError::AlreadyExists {
                        entity: table.to_string(),
                        id,
                    });
                }
            }
        }

        let mut statements = vec!["BEGIN TRANSACTION;".to_string()];
        let mut slots = Vec::with_capacity(batch.len());
        let mut touched = BTreeSet::new();

        for (index, write) in batch.iter().enumerate() {
            let slot = format!("$batch[{index}]");
            touched.insert(write.table());
            match write {
                Write::Insert { table, row } => {
                    let (id, body) = split_id(*table, row)?;
                    statements.push(format!(
                        "CREATE type::record('{table}', {slot}.id) CONTENT {slot}.body RETURN NONE;"
                    ));
                    slots.push(json!({ "id": id, "body": body }));
                }
                Write::Upsert { table, row } => {
                    let (id, body) = split_id(*table, row)?;
                    statements.push(format!(
                        "UPSERT type::record('{table}', {slot}.id) CONTENT {slot}.body RETURN NONE;"
                    ));
                    slots.push(json!({ "id": id, "body": body }));
                }
                Write::Merge {
                    table,
                    filter,
                    patch,
                } => {
                    let mut patch = patch.clone();
                    patch.remove("id");
                    let clause = where_clause(*table, filter, &format!("{slot}.filter"))?;
                    statements.push(format!(
                        "UPDATE {table} MERGE {slot}.body{clause} RETURN NONE;"
                    ));
                    slots.push(json!({ "body": patch, "filter": filter_values(filter) }));
                }
                Write::Delete { table, filter } => {
                    let clause = where_clause(*table, filter, &format!("{slot}.filter"))?;
                    statements.push(format!("DELETE {table}{clause} RETURN NONE;"));
                    slots.push(json!({ "filter": filter_values(filter) }));
                }
            }
        }
        statements.push("COMMIT TRANSACTION;".to_string());

        self.db
            .query(statements.join("\n"))
            .bind(("batch", Value::Array(slots)))
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(|e| DbError::from_statement(e.to_string()))?;

        for table in touched {
            debug!(table = %table, "Publishing table change");
            // No receivers is fine: nobody is watching yet.
            let _ = self.feed.send(TableChange { table });
        }
        Ok(())
    }

    async fn ping(&self) -> ZinicResult<()> {
        self.db
            .query("RETURN 1")
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(|e| DbError::Query(e.to_string()))?;
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<TableChange> {
        self.feed.subscribe()
    }

    async fn watch(&self) -> ZinicResult<()> {
        let mut watchers = self.watchers.lock().await;
        if !watchers.is_empty() && watchers.iter().all(|h| !h.is_finished()) {
            return Ok(());
        }
        for handle in watchers.drain(..) {
            handle.abort();
        }

        // Open every live query before forwarding any, so a failure leaves
        // nothing half-watched.
        let mut streams = Vec::with_capacity(Table::ALL.len());
        for table in Table::ALL {
            let stream = self
                .db
                .select::<Vec<surrealdb_types::Value>>(table.as_str())
                .live()
                .await
                .map_err(DbError::from)?;
            streams.push((table, stream));
        }

        for (table, mut stream) in streams {
            let feed = self.feed.clone();
            watchers.push(tokio::spawn(async move {
                while let Some(notification) = stream.next().await {
                    match notification {
                        Ok(_) => {
                            let _ = feed.send(TableChange { table });
                        }
                        Err(e) => warn!(table = %table, error = %e, "Live query notification failed"),
                    }
                }
                debug!(table = %table, "Live query ended");
            }));
        }
        info!(tables = watchers.len(), "Watching remote tables");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn where_clause_addresses_values_by_position() {
        let filter = Filter::eq("client_id", "GRAND01").and("id", "u-1");
        let clause = where_clause(Table::Users, &filter, "$batch[3].filter").unwrap();
        assert_eq!(
            clause,
            " WHERE client_id = $batch[3].filter[0] AND id = type::record('users', $batch[3].filter[1])"
        );
        assert_eq!(where_clause(Table::Users, &Filter::all(), "$f").unwrap(), "");
    }

    #[test]
    fn where_clause_rejects_odd_field_names() {
        let filter = Filter::eq("client_id = 1 OR true", "x");
        assert!(matches!(
            where_clause(Table::Users, &filter, "$f"),
            Err(DbError::InvalidField(_))
        ));
    }

    #[test]
    fn rows_need_a_string_id() {
        let row = json!({ "name": "x" }).as_object().cloned().unwrap();
        assert!(split_id(Table::Inventory, &row).is_err());
        let row = json!({ "id": "i-1", "name": "x" }).as_object().cloned().unwrap();
        let (id, body) = split_id(Table::Inventory, &row).unwrap();
        assert_eq!(id, "i-1");
        assert!(!body.contains_key("id"));
    }
}
