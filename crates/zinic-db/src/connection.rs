//! Connection to the shared SurrealDB instance every hotel syncs against.

use surrealdb::Surreal;
use surrealdb::engine::remote::ws::{Client, Ws};
use surrealdb::opt::auth::Root;
use tracing::{debug, info};

/// Where the network's shared store lives and how to sign in to it.
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// WebSocket endpoint, `host:port`.
    pub url: String,
    pub namespace: String,
    pub database: String,
    pub username: String,
    pub password: String,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            url: "127.0.0.1:8000".into(),
            namespace: "zinic".into(),
            database: "network".into(),
            username: "root".into(),
            password: "root".into(),
        }
    }
}

/// Signed-in client bound to the network namespace.
#[derive(Clone)]
pub struct DbManager {
    client: Surreal<Client>,
}

impl DbManager {
    pub async fn connect(config: &DbConfig) -> Result<Self, surrealdb::Error> {
        info!(url = %config.url, namespace = %config.namespace, "Opening store connection");

        let client = Surreal::new::<Ws>(config.url.as_str()).await?;
        client
            .signin(Root {
                username: config.username.clone(),
                password: config.password.clone(),
            })
            .await?;
        debug!(username = %config.username, "Signed in");

        client
            .use_ns(config.namespace.as_str())
            .use_db(config.database.as_str())
            .await?;
        info!(database = %config.database, "Store connection ready");

        Ok(Self { client })
    }

    pub fn client(&self) -> &Surreal<Client> {
        &self.client
    }
}
