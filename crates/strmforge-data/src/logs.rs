//! Run-record store; exactly one row per execution of one task.

use chrono::Utc;
use sqlx::{AnyPool, Row, any::AnyRow};

use strmforge_core::TaskLog;
use strmforge_events::{RunCounters, RunStatus};

use crate::error::{DataError, Result};
use crate::time::{from_epoch, from_epoch_opt, to_epoch};

const OPEN_LOG: &str = "
    INSERT INTO task_logs (task_id, status, start_time)
    VALUES ($1, 'running', $2)
    RETURNING id
";

const CLOSE_LOG: &str = "
    UPDATE task_logs SET
        status = $2, message = $3, end_time = $4, duration = $4 - start_time,
        total_file = $5, generated_file = $6, skip_file = $7,
        metadata_count = $8, subtitle_count = $9, failed_count = $10
    WHERE id = $1
";

const SELECT_LOG: &str = "SELECT * FROM task_logs WHERE id = $1";
const SELECT_LOGS_FOR_TASK: &str =
    "SELECT * FROM task_logs WHERE task_id = $1 ORDER BY start_time DESC, id DESC LIMIT $2";
const COUNT_RUNNING_FOR_TASK: &str =
    "SELECT COUNT(*) AS running_rows FROM task_logs WHERE task_id = $1 AND status = 'running'";

/// Database-backed store for run records.
#[derive(Clone)]
pub struct TaskLogStore {
    pool: AnyPool,
}

impl TaskLogStore {
    /// Construct a store over the shared pool.
    #[must_use]
    pub const fn new(pool: AnyPool) -> Self {
        Self { pool }
    }

    /// Open a `running` run record and return its identifier.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub async fn open(&self, task_id: i64) -> Result<i64> {
        let row = sqlx::query(OPEN_LOG)
            .bind(task_id)
            .bind(to_epoch(Utc::now()))
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get("id")?)
    }

    /// Close a run record with its terminal status and counters.
    ///
    /// # Errors
    ///
    /// Returns [`DataError::NotFound`] when the record does not exist.
    pub async fn close(
        &self,
        id: i64,
        status: RunStatus,
        message: Option<&str>,
        counters: &RunCounters,
    ) -> Result<()> {
        let outcome = sqlx::query(CLOSE_LOG)
            .bind(id)
            .bind(status.as_str())
            .bind(message)
            .bind(to_epoch(Utc::now()))
            .bind(as_i64(counters.total_file))
            .bind(as_i64(counters.generated_file))
            .bind(as_i64(counters.skip_file))
            .bind(as_i64(counters.metadata_count))
            .bind(as_i64(counters.subtitle_count))
            .bind(as_i64(counters.failed_count))
            .execute(&self.pool)
            .await?;
        if outcome.rows_affected() == 0 {
            return Err(DataError::NotFound {
                entity: "task_log",
                id,
            });
        }
        Ok(())
    }

    /// Fetch one run record.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn get(&self, id: i64) -> Result<Option<TaskLog>> {
        let row = sqlx::query(SELECT_LOG)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(map_log).transpose()
    }

    /// List the most recent run records for one task.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn list_for_task(&self, task_id: i64, limit: i64) -> Result<Vec<TaskLog>> {
        let rows = sqlx::query(SELECT_LOGS_FOR_TASK)
            .bind(task_id)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(map_log).collect()
    }

    /// Count open run records for one task; the invariant keeps this at most
    /// one.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn running_count(&self, task_id: i64) -> Result<i64> {
        let row = sqlx::query(COUNT_RUNNING_FOR_TASK)
            .bind(task_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get("running_rows")?)
    }
}

fn as_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn map_log(row: &AnyRow) -> Result<TaskLog> {
    let status: String = row.try_get("status")?;
    let status = match status.as_str() {
        "running" => RunStatus::Running,
        "completed" => RunStatus::Completed,
        "failed" => RunStatus::Failed,
        "cancelled" => RunStatus::Cancelled,
        other => {
            return Err(DataError::decode(
                "task_logs.status",
                format!("unknown status '{other}'"),
            ));
        }
    };
    Ok(TaskLog {
        id: row.try_get("id")?,
        task_id: row.try_get("task_id")?,
        status,
        message: row.try_get("message")?,
        start_time: from_epoch(row.try_get("start_time")?),
        end_time: from_epoch_opt(row.try_get("end_time")?),
        duration: row.try_get("duration")?,
        total_file: row.try_get("total_file")?,
        generated_file: row.try_get("generated_file")?,
        skip_file: row.try_get("skip_file")?,
        metadata_count: row.try_get("metadata_count")?,
        subtitle_count: row.try_get("subtitle_count")?,
        failed_count: row.try_get("failed_count")?,
    })
}
