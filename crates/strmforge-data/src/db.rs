//! Pool bootstrap over the sqlx `Any` driver.

use std::time::Duration;

use sqlx::AnyPool;
use sqlx::any::AnyPoolOptions;
use tracing::info;

use strmforge_config::{DatabaseBackend, DatabaseConfig, DatabaseSettings};

use crate::error::Result;
use crate::migrate;

/// Shared database handle carrying the pool and the selected backend.
#[derive(Clone)]
pub struct Database {
    pool: AnyPool,
    backend: DatabaseBackend,
}

impl Database {
    /// Connect to the configured backend and apply the idempotent schema
    /// migration.
    ///
    /// For SQLite the containing directory is created on first use so a
    /// fresh deployment boots without manual steps.
    ///
    /// # Errors
    ///
    /// Returns an error when the directory cannot be created, the pool
    /// cannot connect, or the migration fails.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        sqlx::any::install_default_drivers();

        if let DatabaseSettings::Sqlite(sqlite) = &config.settings
            && let Err(err) = std::fs::create_dir_all(&sqlite.base_dir)
        {
            return Err(sqlx::Error::Io(err).into());
        }

        let pool = AnyPoolOptions::new()
            .max_connections(config.pool.max_open_conns)
            .min_connections(config.pool.max_idle_conns.min(config.pool.max_open_conns))
            .max_lifetime(Duration::from_secs(config.pool.conn_max_lifetime_secs))
            .connect(&config.url())
            .await?;

        let database = Self {
            pool,
            backend: config.backend(),
        };
        migrate::run(&database).await?;
        info!(backend = database.backend.as_str(), "database ready");
        Ok(database)
    }

    /// Access the underlying connection pool.
    #[must_use]
    pub const fn pool(&self) -> &AnyPool {
        &self.pool
    }

    /// Which backend the pool speaks to.
    #[must_use]
    pub const fn backend(&self) -> DatabaseBackend {
        self.backend
    }

    /// Liveness probe used by the health endpoint.
    ///
    /// # Errors
    ///
    /// Returns an error when the database is unreachable.
    pub async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
