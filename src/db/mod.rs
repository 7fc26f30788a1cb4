//! Postgres pool and schema management.
//!
//! One `Db` backs every component. The store, lease, and outcome submodules
//! hang their operations off it as `impl` blocks, so all mutation runs over
//! the same pool against the same migrated schema.

pub mod lease;
pub mod outcome;
pub mod store;

use std::time::Duration;

use crate::error::Result;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

/// Claim and outcome transactions are short; a small pool goes a long way.
const MAX_CONNECTIONS: u32 = 8;

/// Database handle. Owns the connection pool shared across all modules.
pub struct Db {
    pool: PgPool,
}

impl Db {
    /// Connect and build the shared pool.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .acquire_timeout(Duration::from_secs(5))
            .connect(url)
            .await?;
        Ok(Self { pool })
    }

    /// Apply pending migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    /// Liveness probe against the store.
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// The underlying pool, for embedding callers and tests.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}
