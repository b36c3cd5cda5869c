//! Zinic Server: connects to the shared store, applies migrations and
//! watches it for changes until interrupted. With a bootstrap account
//! configured it also holds a network-wide session, so every remote
//! change refreshes the global snapshot and is logged.

mod config;

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use zinic_core::models::tenant::{CreateTenant, TenantCode};
use zinic_core::repository::RemoteStore;
use zinic_db::{DbManager, SurrealRemoteStore};
use zinic_sync::{DbStatus, FileStorage, NewTenantAdmin, SyncOrchestrator, TracingNotifier};

use crate::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("zinic=info".parse().context("log directive")?),
        )
        .json()
        .init();

    info!("Starting Zinic server...");
    let config = Config::from_env()?;

    let manager = DbManager::connect(&config.db)
        .await
        .context("failed to connect to SurrealDB")?;
    zinic_db::run_migrations(manager.client())
        .await
        .context("failed to apply migrations")?;

    let store = Arc::new(SurrealRemoteStore::with_feed_capacity(
        manager.client().clone(),
        config.sync.feed_capacity,
    ));
    let storage = FileStorage::open(&config.sandbox_dir).with_context(|| {
        format!("cannot open sandbox storage at {}", config.sandbox_dir.display())
    })?;
    let orchestrator =
        SyncOrchestrator::new(Arc::clone(&store), storage, TracingNotifier, config.sync.clone())
            .context("failed to open the sandbox store")?;
    store.watch().await.context("failed to watch remote tables")?;

    if let Some(bootstrap) = &config.bootstrap {
        let created = orchestrator
            .bootstrap_super_tenant(
                CreateTenant {
                    code: TenantCode::new(&bootstrap.code),
                    name: bootstrap.name.clone(),
                    max_users: 50,
                    max_items: 1000,
                    contact_email: None,
                },
                NewTenantAdmin {
                    username: bootstrap.username.clone(),
                    full_name: "Network Administrator".into(),
                    email: None,
                    secret: bootstrap.secret.clone(),
                },
            )
            .await
            .context("failed to bootstrap the super tenant")?;
        if created {
            info!(tenant = %bootstrap.code, "Super tenant created");
        }
    }

    match orchestrator.check_connection().await {
        DbStatus::Connected => info!("Remote store reachable"),
        status => warn!(?status, "Remote store not reachable"),
    }

    let _snapshots = orchestrator.subscribe(|snapshot| {
        info!(
            tenants = snapshot.tenants.len(),
            items = snapshot.items.len(),
            requests = snapshot.requests.len(),
            "Snapshot refreshed"
        );
    });
    if let Some(bootstrap) = &config.bootstrap {
        orchestrator
            .authenticate(&bootstrap.code, &bootstrap.username, &bootstrap.secret)
            .await
            .context("failed to open the network session")?;
    }

    info!("Zinic server ready");
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;

    orchestrator.logout();
    orchestrator.shutdown();
    store.unwatch().await;
    info!("Zinic server stopped.");
    Ok(())
}
