//! Schema definitions and migration runner for SurrealDB.
//!
//! Entity tables are SCHEMALESS: rows are validated by the entity mapper
//! on the way out, so the database only pins the tenant partition column
//! and the uniqueness rules. Record ids are the entity ids (the tenant
//! code for `hotels`).

use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use tracing::info;

use crate::error::DbError;

// -----------------------------------------------------------------------
// Migration tracking
// -----------------------------------------------------------------------

const MIGRATION_TABLE_DDL: &str = "\
DEFINE TABLE IF NOT EXISTS _migration SCHEMAFULL;
DEFINE FIELD IF NOT EXISTS version ON TABLE _migration TYPE int;
DEFINE FIELD IF NOT EXISTS name ON TABLE _migration TYPE string;
DEFINE FIELD IF NOT EXISTS applied_at ON TABLE _migration TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX IF NOT EXISTS idx_migration_version ON TABLE _migration \
    COLUMNS version UNIQUE;
";

#[derive(Debug, SurrealValue)]
struct AppliedVersion {
    version: u32,
}

/// One forward-only schema step.
struct Migration {
    version: u32,
    name: &'static str,
    sql: &'static str,
}

static MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "tenant_tables",
        sql: TENANT_TABLES,
    },
    Migration {
        version: 2,
        name: "demo_leads",
        sql: DEMO_LEADS,
    },
];

// -----------------------------------------------------------------------
// Schema
// -----------------------------------------------------------------------

const TENANT_TABLES: &str = "\
-- =======================================================================
-- Hotels (global scope, id = tenant code)
-- =======================================================================
DEFINE TABLE hotels SCHEMALESS;
DEFINE FIELD name ON TABLE hotels TYPE string;
DEFINE FIELD is_active ON TABLE hotels TYPE bool;

-- =======================================================================
-- Staff
-- =======================================================================
DEFINE TABLE users SCHEMALESS;
DEFINE FIELD client_id ON TABLE users TYPE string;
DEFINE FIELD username ON TABLE users TYPE string;
DEFINE INDEX idx_users_client_username ON TABLE users \
    COLUMNS client_id, username UNIQUE;

-- =======================================================================
-- Stock items
-- =======================================================================
DEFINE TABLE inventory SCHEMALESS;
DEFINE FIELD client_id ON TABLE inventory TYPE string;
DEFINE INDEX idx_inventory_client ON TABLE inventory COLUMNS client_id;

-- =======================================================================
-- Stock requests (lines and consumption logs nested)
-- =======================================================================
DEFINE TABLE requests SCHEMALESS;
DEFINE FIELD client_id ON TABLE requests TYPE string;
DEFINE INDEX idx_requests_client ON TABLE requests COLUMNS client_id;

-- =======================================================================
-- Vendors (invoices nested)
-- =======================================================================
DEFINE TABLE vendors SCHEMALESS;
DEFINE FIELD client_id ON TABLE vendors TYPE string;
DEFINE INDEX idx_vendors_client ON TABLE vendors COLUMNS client_id;

-- =======================================================================
-- Departments
-- =======================================================================
DEFINE TABLE departments SCHEMALESS;
DEFINE FIELD client_id ON TABLE departments TYPE string;
DEFINE FIELD name ON TABLE departments TYPE string;
DEFINE INDEX idx_departments_client_name ON TABLE departments \
    COLUMNS client_id, name UNIQUE;
";

const DEMO_LEADS: &str = "\
-- =======================================================================
-- Demo leads (global scope, client_id = issued sandbox code)
-- =======================================================================
DEFINE TABLE demo_leads SCHEMALESS;
DEFINE FIELD client_id ON TABLE demo_leads TYPE string;
";

// -----------------------------------------------------------------------
// Runner
// -----------------------------------------------------------------------

async fn applied_version<C: Connection>(db: &Surreal<C>) -> Result<u32, DbError> {
    let mut result = db
        .query("SELECT version FROM _migration ORDER BY version DESC LIMIT 1")
        .await?;
    let rows: Vec<AppliedVersion> = result.take(0)?;
    Ok(rows.first().map_or(0, |row| row.version))
}

async fn apply<C: Connection>(db: &Surreal<C>, migration: &Migration) -> Result<(), DbError> {
    info!(version = migration.version, name = migration.name, "Applying migration");

    db.query(migration.sql).await?.check().map_err(|e| {
        DbError::Migration(format!("v{} {}: {e}", migration.version, migration.name))
    })?;
    db.query("CREATE _migration SET version = $version, name = $name")
        .bind(("version", migration.version))
        .bind(("name", migration.name))
        .await?
        .check()
        .map_err(|e| DbError::Migration(format!("recording v{}: {e}", migration.version)))?;
    Ok(())
}

/// Bring the database up to the latest schema version. Returns how many
/// migrations were applied; zero when already current.
pub async fn run_migrations<C: Connection>(db: &Surreal<C>) -> Result<usize, DbError> {
    db.query(MIGRATION_TABLE_DDL)
        .await?
        .check()
        .map_err(|e| DbError::Migration(e.to_string()))?;

    let current = applied_version(db).await?;
    let pending: Vec<&Migration> = MIGRATIONS.iter().filter(|m| m.version > current).collect();
    for migration in &pending {
        apply(db, migration).await?;
    }

    if !pending.is_empty() {
        info!(from = current, applied = pending.len(), "Schema up to date");
    }
    Ok(pending.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_table_is_defined_once() {
        let ddl: String = MIGRATIONS.iter().map(|m| m.sql).collect();
        for table in zinic_core::repository::Table::ALL {
            assert_eq!(
                ddl.matches(&format!("DEFINE TABLE {table} ")).count(),
                1,
                "table {table}"
            );
        }
    }

    #[test]
    fn versions_are_contiguous() {
        for window in MIGRATIONS.windows(2) {
            assert_eq!(window[0].version + 1, window[1].version);
        }
    }
}
