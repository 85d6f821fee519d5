//! Persistent record storage for the coordination core (spec module D).
//!
//! Every repo talks to Postgres through runtime-checked `sqlx::query`, not
//! the `query!` compile-time macro: the macro needs a live database (or a
//! checked-in query cache) at build time, which this workspace cannot
//! provide in all environments it's vendored into.

pub mod alloc;
pub mod apikey;
pub mod error;
pub mod models;
pub mod namespace;
pub mod node;
pub mod operator;
pub mod preauth;
pub mod route;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::time::Duration;

pub use apikey::ApiKeyRepo;
pub use error::{StoreError, StoreResult};
pub use namespace::NamespaceRepo;
pub use node::{NewNode, NodeRepo};
pub use operator::OperatorRepo;
pub use preauth::PreAuthKeyRepo;
pub use route::RouteRepo;

/// Database connection configuration, read from the environment in the
/// style of the rest of the server's configuration (see `coordinatord::config`).
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout: Duration,
}

impl DatabaseConfig {
    pub fn from_env() -> Result<Self, std::env::VarError> {
        let url = std::env::var("DATABASE_URL")?;
        let max_connections = std::env::var("DB_MAX_CONNECTIONS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(10);
        let min_connections = std::env::var("DB_MIN_CONNECTIONS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(1);
        let connect_timeout_secs: u64 = std::env::var("DB_CONNECTION_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(10);
        Ok(Self {
            url,
            max_connections,
            min_connections,
            connect_timeout: Duration::from_secs(connect_timeout_secs),
        })
    }
}

pub async fn create_pool(config: &DatabaseConfig) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(config.connect_timeout)
        .connect(&config.url)
        .await
}

pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}

pub async fn health_check(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").fetch_one(pool).await.map(|_| ())
}

/// All record repositories, sharing one connection pool. Handed to request
/// state the way the teacher's `AppState` wraps a single `PgPool`.
#[derive(Clone)]
pub struct Store {
    pub namespaces: NamespaceRepo,
    pub nodes: NodeRepo,
    pub pre_auth_keys: PreAuthKeyRepo,
    pub api_keys: ApiKeyRepo,
    pub routes: RouteRepo,
    pub operators: OperatorRepo,
}

impl Store {
    pub fn new(pool: PgPool) -> Self {
        Self {
            namespaces: NamespaceRepo::new(pool.clone()),
            nodes: NodeRepo::new(pool.clone()),
            pre_auth_keys: PreAuthKeyRepo::new(pool.clone()),
            api_keys: ApiKeyRepo::new(pool.clone()),
            routes: RouteRepo::new(pool.clone()),
            operators: OperatorRepo::new(pool),
        }
    }
}
