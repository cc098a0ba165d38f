//! Connection pool and schema management.

use deadpool_postgres::{ManagerConfig, Object, Pool, PoolConfig, RecyclingMethod, Runtime};
use radscope_config::DatabaseConfig;
use tokio_postgres::NoTls;

use crate::error::{DbError, Result};

/// Idempotent DDL for every table the repositories use.
pub const SCHEMA_SQL: &str = include_str!("schema.sql");

/// Main database handle. Cheap to clone; clones share the pool.
#[derive(Clone)]
pub struct Database {
    pool: Pool,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let status = self.pool.status();
        f.debug_struct("Database")
            .field("size", &status.size)
            .field("available", &status.available)
            .field("max_size", &status.max_size)
            .finish()
    }
}

impl Database {
    /// Build the pool, check that the server answers and apply the schema
    /// when `run_migrations` is set.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let url = config.url.as_deref().ok_or(DbError::NotConfigured)?;
        let db = Self::from_url(url, config.max_connections)?;
        db.ping().await?;
        if config.run_migrations {
            db.migrate().await?;
        }
        tracing::info!(max_connections = config.max_connections, "Database connected");
        Ok(db)
    }

    /// Build the pool without touching the network.
    pub fn from_url(url: &str, max_connections: usize) -> Result<Self> {
        let mut cfg = deadpool_postgres::Config::new();
        cfg.url = Some(url.to_string());
        cfg.pool = Some(PoolConfig::new(max_connections.max(1)));
        cfg.manager = Some(ManagerConfig { recycling_method: RecyclingMethod::Fast });
        let pool = cfg.create_pool(Some(Runtime::Tokio1), NoTls)?;
        Ok(Self { pool })
    }

    /// Check out a pooled client.
    pub async fn client(&self) -> Result<Object> {
        Ok(self.pool.get().await?)
    }

    pub async fn migrate(&self) -> Result<()> {
        let client = self.client().await?;
        client.batch_execute(SCHEMA_SQL).await?;
        tracing::debug!("Schema applied");
        Ok(())
    }

    pub async fn ping(&self) -> Result<()> {
        let client = self.client().await?;
        client.simple_query("SELECT 1").await?;
        Ok(())
    }
}
