//! Zinic Sync: the tenant data cache, the local sandbox store and the
//! orchestrator that routes every query and mutation to one of them.

pub mod cache;
pub mod config;
pub mod error;
pub mod notify;
pub mod observer;
pub mod orchestrator;
pub mod password;
pub mod reports;
pub mod sandbox;
pub mod snapshot;
pub mod storage;

pub use cache::TenantDataCache;
pub use config::SyncConfig;
pub use error::SyncError;
pub use notify::TracingNotifier;
pub use observer::Subscription;
pub use orchestrator::{AuthOutcome, DbStatus, DemoAccess, NewTenantAdmin, SyncOrchestrator};
pub use sandbox::{SandboxSession, SandboxStore};
pub use snapshot::{Change, Scope, Snapshot};
pub use storage::{FileStorage, MemoryStorage};
