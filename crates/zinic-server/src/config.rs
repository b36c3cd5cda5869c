//! Process configuration read from the environment.

use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result};
use zinic_db::DbConfig;
use zinic_sync::SyncConfig;

/// Super tenant created on first start when `ZINIC_SUPER_SECRET` is set.
#[derive(Debug, Clone)]
pub struct BootstrapConfig {
    pub code: String,
    pub name: String,
    pub username: String,
    pub secret: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub sync: SyncConfig,
    pub sandbox_dir: PathBuf,
    pub bootstrap: Option<BootstrapConfig>,
}

fn var_or(name: &str, default: impl Into<String>) -> String {
    env::var(name).unwrap_or_else(|_| default.into())
}

fn parsed_or<T: std::str::FromStr>(name: &str, default: T) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(raw) => raw
            .parse()
            .with_context(|| format!("{name} has an invalid value: {raw}")),
        Err(_) => Ok(default),
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let defaults = DbConfig::default();
        let db = DbConfig {
            url: var_or("ZINIC_DB_URL", defaults.url),
            namespace: var_or("ZINIC_DB_NAMESPACE", defaults.namespace),
            database: var_or("ZINIC_DB_DATABASE", defaults.database),
            username: var_or("ZINIC_DB_USERNAME", defaults.username),
            password: var_or("ZINIC_DB_PASSWORD", defaults.password),
        };

        let sync_defaults = SyncConfig::default();
        let sync = SyncConfig {
            pepper: env::var("ZINIC_PEPPER").ok().filter(|p| !p.is_empty()),
            sandbox_lifetime_hours: parsed_or(
                "ZINIC_SANDBOX_LIFETIME_HOURS",
                sync_defaults.sandbox_lifetime_hours,
            )?,
            ..sync_defaults
        };

        let sandbox_dir = match env::var("ZINIC_SANDBOX_DIR") {
            Ok(dir) => PathBuf::from(dir),
            Err(_) => env::current_dir()
                .context("cannot resolve the working directory; set ZINIC_SANDBOX_DIR")?
                .join("zinic_sandbox"),
        };

        let bootstrap = env::var("ZINIC_SUPER_SECRET")
            .ok()
            .filter(|s| !s.is_empty())
            .map(|secret| BootstrapConfig {
                code: var_or("ZINIC_SUPER_CODE", "HQ"),
                name: var_or("ZINIC_SUPER_NAME", "Network Headquarters"),
                username: var_or("ZINIC_SUPER_USERNAME", "superadmin"),
                secret,
            });

        Ok(Self {
            db,
            sync,
            sandbox_dir,
            bootstrap,
        })
    }
}
