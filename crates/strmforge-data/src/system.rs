//! Component-level log rows for notable runtime events.

use chrono::{DateTime, Utc};
use sqlx::{AnyPool, Row, any::AnyRow};

use crate::error::Result;
use crate::time::{from_epoch, to_epoch};

const INSERT_LOG: &str = "
    INSERT INTO system_logs (level, scope, message, created_at)
    VALUES ($1, $2, $3, $4)
";
const SELECT_RECENT: &str =
    "SELECT * FROM system_logs ORDER BY created_at DESC, id DESC LIMIT $1";

/// One persisted system log line.
#[derive(Debug, Clone, serde::Serialize, PartialEq, Eq)]
pub struct SystemLogRow {
    /// Row identifier assigned on insert.
    pub id: i64,
    /// Severity label (`info`, `warn`, `error`).
    pub level: String,
    /// Component that produced the line.
    pub scope: String,
    /// Human-readable detail.
    pub message: String,
    /// When the line was recorded.
    pub created_at: DateTime<Utc>,
}

/// Database-backed store for system log rows.
#[derive(Clone)]
pub struct SystemLogStore {
    pool: AnyPool,
}

impl SystemLogStore {
    /// Construct a store over the shared pool.
    #[must_use]
    pub const fn new(pool: AnyPool) -> Self {
        Self { pool }
    }

    /// Persist one log line.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub async fn record(&self, level: &str, scope: &str, message: &str) -> Result<()> {
        sqlx::query(INSERT_LOG)
            .bind(level)
            .bind(scope)
            .bind(message)
            .bind(to_epoch(Utc::now()))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// List the most recent lines.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn recent(&self, limit: i64) -> Result<Vec<SystemLogRow>> {
        let rows = sqlx::query(SELECT_RECENT)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(map_row).collect()
    }
}

fn map_row(row: &AnyRow) -> Result<SystemLogRow> {
    Ok(SystemLogRow {
        id: row.try_get("id")?,
        level: row.try_get("level")?,
        scope: row.try_get("scope")?,
        message: row.try_get("message")?,
        created_at: from_epoch(row.try_get("created_at")?),
    })
}
