//! Zinic Database: SurrealDB connection management, schema migrations and
//! the SurrealDB-backed [`zinic_core::repository::RemoteStore`].
//!
//! This crate provides:
//! - Connection management ([`DbManager`], [`DbConfig`])
//! - Schema initialization and migrations ([`run_migrations`])
//! - The remote store with its post-commit change feed ([`SurrealRemoteStore`])
//! - Error types ([`DbError`])

mod connection;
mod error;
mod remote;
mod schema;

pub use connection::{DbConfig, DbManager};
pub use error::DbError;
pub use remote::{DEFAULT_FEED_CAPACITY, SurrealRemoteStore};
pub use schema::run_migrations;
