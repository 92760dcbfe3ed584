//! Persistence layer.
//!
//! ```text
//! ┌─────────────┐
//! │  Handlers   │  (API handlers, account lifecycle)
//! └──────┬──────┘
//!        │  Arc<dyn AccountRepository>, Arc<dyn StoreRepository>
//!        ↓
//! ┌─────────────────────────────┐
//! │ handlers::{Users, Stores}   │  Postgres via sqlx
//! │ memory::InMemoryDatabase    │  process-local dashmap
//! └─────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`handlers`]: repository traits and their Postgres implementations
//! - [`memory`]: the in-memory implementation
//! - [`models`]: records passed across the repository boundary
//! - [`errors`]: storage error classification
//!
//! Which backend is used is decided once at startup by [`Storage::connect`] from
//! [`DatabaseConfig`].

use std::sync::Arc;

use sqlx::{PgPool, postgres::PgPoolOptions};
use tracing::info;

use crate::config::DatabaseConfig;

pub mod errors;
pub mod handlers;
pub mod memory;
pub mod models;

use handlers::{AccountRepository, StoreRepository, Stores, Users};
use memory::InMemoryDatabase;

/// The repositories the application runs against.
#[derive(Clone)]
pub struct Storage {
    pub accounts: Arc<dyn AccountRepository>,
    pub stores: Arc<dyn StoreRepository>,
    /// Set when running against Postgres.
    pub pool: Option<PgPool>,
}

impl Storage {
    /// Ephemeral storage: nothing survives the process.
    pub fn in_memory() -> Self {
        let db = Arc::new(InMemoryDatabase::new());
        Self {
            accounts: db.clone(),
            stores: db,
            pool: None,
        }
    }

    pub fn postgres(pool: PgPool) -> Self {
        Self {
            accounts: Arc::new(Users::new(pool.clone())),
            stores: Arc::new(Stores::new(pool.clone())),
            pool: Some(pool),
        }
    }

    /// Connect to the configured backend, running migrations for Postgres.
    pub async fn connect(config: &DatabaseConfig) -> anyhow::Result<Self> {
        match config {
            DatabaseConfig::Memory => {
                info!("Using in-memory storage; data will be lost on shutdown");
                Ok(Self::in_memory())
            }
            DatabaseConfig::External { url, pool } => {
                info!("Using external database");
                let pg = PgPoolOptions::new()
                    .max_connections(pool.max_connections)
                    .min_connections(pool.min_connections)
                    .acquire_timeout(pool.acquire_timeout)
                    .idle_timeout(pool.idle_timeout)
                    .connect(url)
                    .await?;
                migrator().run(&pg).await?;
                Ok(Self::postgres(pg))
            }
        }
    }
}

/// Get the database migrator
pub fn migrator() -> sqlx::migrate::Migrator {
    sqlx::migrate!("./migrations")
}
