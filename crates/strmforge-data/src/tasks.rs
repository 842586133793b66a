//! Task registry store: CRUD, the single-flight CAS, and run statistics.

use chrono::Utc;
use sqlx::{AnyPool, Row, any::AnyRow};
use tracing::debug;

use strmforge_core::{NewTask, Task, TaskStats, TimeRange};

use crate::error::{DataError, Result};
use crate::time::{from_epoch, from_epoch_opt, to_epoch};

const SELECT_TASK: &str = "SELECT * FROM tasks WHERE id = $1";
const SELECT_TASKS: &str = "SELECT * FROM tasks ORDER BY id";
const SELECT_SCHEDULED: &str =
    "SELECT * FROM tasks WHERE enabled = 1 AND cron IS NOT NULL AND cron != '' ORDER BY id";

const INSERT_TASK: &str = "
    INSERT INTO tasks (
        name, media_type, source_path, target_path, file_suffix,
        overwrite, enabled, cron,
        running, last_run_at,
        download_metadata, metadata_extensions,
        download_subtitle, subtitle_extensions,
        created_at, updated_at
    )
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 0, NULL, $9, $10, $11, $12, $13, $13)
    RETURNING id
";

const UPDATE_TASK: &str = "
    UPDATE tasks SET
        name = $2, media_type = $3, source_path = $4, target_path = $5,
        file_suffix = $6, overwrite = $7, enabled = $8, cron = $9,
        download_metadata = $10, metadata_extensions = $11,
        download_subtitle = $12, subtitle_extensions = $13,
        updated_at = $14
    WHERE id = $1
";

const ACQUIRE_RUN: &str =
    "UPDATE tasks SET running = 1, last_run_at = $2, updated_at = $2 WHERE id = $1 AND running = 0";
const RELEASE_RUN: &str = "UPDATE tasks SET running = 0, updated_at = $2 WHERE id = $1";
const RESET_RUNNING_TASKS: &str = "UPDATE tasks SET running = 0, updated_at = $1 WHERE running = 1";
const RESET_ONE_TASK: &str =
    "UPDATE tasks SET running = 0, updated_at = $2 WHERE id = $1 AND running = 1";
const RESET_ONE_TASK_LOGS: &str = "
    UPDATE task_logs
    SET status = 'failed', message = $2, end_time = $3, duration = $3 - start_time
    WHERE task_id = $1 AND status = 'running'
";
const RESET_RUNNING_LOGS: &str = "
    UPDATE task_logs
    SET status = 'failed', message = $1, end_time = $2, duration = $2 - start_time
    WHERE status = 'running'
";

const STATS: &str = "
    SELECT
        COUNT(*) AS total_runs,
        CAST(COALESCE(SUM(CASE WHEN status = 'completed' THEN 1 ELSE 0 END), 0) AS BIGINT)
            AS completed_runs,
        CAST(COALESCE(SUM(CASE WHEN status = 'failed' THEN 1 ELSE 0 END), 0) AS BIGINT)
            AS failed_runs,
        CAST(COALESCE(SUM(CASE WHEN status = 'cancelled' THEN 1 ELSE 0 END), 0) AS BIGINT)
            AS cancelled_runs,
        CAST(COALESCE(SUM(generated_file), 0) AS BIGINT) AS generated_files,
        CAST(COALESCE(SUM(skip_file), 0) AS BIGINT) AS skipped_files,
        CAST(COALESCE(SUM(failed_count), 0) AS BIGINT) AS failed_files
    FROM task_logs
    WHERE start_time >= $1 AND status != 'running'
";

/// Database-backed task registry.
#[derive(Clone)]
pub struct TaskStore {
    pool: AnyPool,
}

impl TaskStore {
    /// Construct a store over the shared pool.
    #[must_use]
    pub const fn new(pool: AnyPool) -> Self {
        Self { pool }
    }

    /// Insert a task and return the stored row.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub async fn create(&self, new: &NewTask) -> Result<Task> {
        let now = to_epoch(Utc::now());
        let row = sqlx::query(INSERT_TASK)
            .bind(&new.name)
            .bind(new.media_type.as_str())
            .bind(&new.source_path)
            .bind(&new.target_path)
            .bind(&new.file_suffix)
            .bind(i64::from(new.overwrite))
            .bind(i64::from(new.enabled))
            .bind(new.cron.as_deref())
            .bind(i64::from(new.download_metadata))
            .bind(new.metadata_extensions.as_deref())
            .bind(i64::from(new.download_subtitle))
            .bind(new.subtitle_extensions.as_deref())
            .bind(now)
            .fetch_one(&self.pool)
            .await?;
        let id: i64 = row.try_get("id")?;
        self.require(id).await
    }

    /// Replace a task's declarative fields, leaving run state untouched.
    ///
    /// # Errors
    ///
    /// Returns [`DataError::NotFound`] when the task does not exist.
    pub async fn update(&self, id: i64, new: &NewTask) -> Result<Task> {
        let now = to_epoch(Utc::now());
        let outcome = sqlx::query(UPDATE_TASK)
            .bind(id)
            .bind(&new.name)
            .bind(new.media_type.as_str())
            .bind(&new.source_path)
            .bind(&new.target_path)
            .bind(&new.file_suffix)
            .bind(i64::from(new.overwrite))
            .bind(i64::from(new.enabled))
            .bind(new.cron.as_deref())
            .bind(i64::from(new.download_metadata))
            .bind(new.metadata_extensions.as_deref())
            .bind(i64::from(new.download_subtitle))
            .bind(new.subtitle_extensions.as_deref())
            .bind(now)
            .execute(&self.pool)
            .await?;
        if outcome.rows_affected() == 0 {
            return Err(DataError::NotFound { entity: "task", id });
        }
        self.require(id).await
    }

    /// Fetch one task.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn get(&self, id: i64) -> Result<Option<Task>> {
        let row = sqlx::query(SELECT_TASK)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(map_task).transpose()
    }

    async fn require(&self, id: i64) -> Result<Task> {
        self.get(id)
            .await?
            .ok_or(DataError::NotFound { entity: "task", id })
    }

    /// List every task ordered by identifier.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn list(&self) -> Result<Vec<Task>> {
        let rows = sqlx::query(SELECT_TASKS).fetch_all(&self.pool).await?;
        rows.iter().map(map_task).collect()
    }

    /// List enabled tasks carrying a cron expression.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn list_scheduled(&self) -> Result<Vec<Task>> {
        let rows = sqlx::query(SELECT_SCHEDULED).fetch_all(&self.pool).await?;
        rows.iter().map(map_task).collect()
    }

    /// Delete a task and cascade into its history and run records.
    ///
    /// # Errors
    ///
    /// Returns an error if any delete fails.
    pub async fn delete(&self, id: i64) -> Result<()> {
        sqlx::query("DELETE FROM file_histories WHERE task_id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        sqlx::query("DELETE FROM task_logs WHERE task_id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        sqlx::query("DELETE FROM tasks WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Compare-and-set admission for one run; stamps `last_run_at` when won.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub async fn acquire_run(&self, id: i64) -> Result<bool> {
        let now = to_epoch(Utc::now());
        let outcome = sqlx::query(ACQUIRE_RUN)
            .bind(id)
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(outcome.rows_affected() == 1)
    }

    /// Unconditionally clear the running flag after a run ends.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub async fn release_run(&self, id: i64) -> Result<()> {
        let now = to_epoch(Utc::now());
        sqlx::query(RELEASE_RUN)
            .bind(id)
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Clear stuck run state after a crash: running flags drop and dangling
    /// `running` run records close as failed.
    ///
    /// # Errors
    ///
    /// Returns an error if either update fails.
    pub async fn reset_runs(&self) -> Result<u64> {
        let now = to_epoch(Utc::now());
        let tasks = sqlx::query(RESET_RUNNING_TASKS)
            .bind(now)
            .execute(&self.pool)
            .await?;
        let logs = sqlx::query(RESET_RUNNING_LOGS)
            .bind("run interrupted by restart")
            .bind(now)
            .execute(&self.pool)
            .await?;
        let reset = tasks.rows_affected() + logs.rows_affected();
        if reset > 0 {
            debug!(reset, "cleared stuck run state");
        }
        Ok(reset)
    }

    /// Clear stuck run state for one task only; the administrative reset
    /// behind `POST /tasks/{id}/reset`.
    ///
    /// # Errors
    ///
    /// Returns an error if either update fails.
    pub async fn reset_task(&self, id: i64) -> Result<u64> {
        let now = to_epoch(Utc::now());
        let tasks = sqlx::query(RESET_ONE_TASK)
            .bind(id)
            .bind(now)
            .execute(&self.pool)
            .await?;
        let logs = sqlx::query(RESET_ONE_TASK_LOGS)
            .bind(id)
            .bind("run state reset by an operator")
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(tasks.rows_affected() + logs.rows_affected())
    }

    /// Aggregate terminal run counters inside the requested window.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn stats(&self, range: TimeRange) -> Result<TaskStats> {
        let cutoff = to_epoch(Utc::now()) - range.window_seconds();
        let row = sqlx::query(STATS)
            .bind(cutoff)
            .fetch_one(&self.pool)
            .await?;
        Ok(TaskStats {
            total_runs: row.try_get("total_runs")?,
            completed_runs: row.try_get("completed_runs")?,
            failed_runs: row.try_get("failed_runs")?,
            cancelled_runs: row.try_get("cancelled_runs")?,
            generated_files: row.try_get("generated_files")?,
            skipped_files: row.try_get("skipped_files")?,
            failed_files: row.try_get("failed_files")?,
        })
    }
}

fn map_task(row: &AnyRow) -> Result<Task> {
    let media_type: String = row.try_get("media_type")?;
    Ok(Task {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        media_type: media_type
            .parse()
            .map_err(|err| DataError::decode("tasks.media_type", err))?,
        source_path: row.try_get("source_path")?,
        target_path: row.try_get("target_path")?,
        file_suffix: row.try_get("file_suffix")?,
        overwrite: row.try_get::<i64, _>("overwrite")? != 0,
        enabled: row.try_get::<i64, _>("enabled")? != 0,
        cron: row.try_get("cron")?,
        running: row.try_get::<i64, _>("running")? != 0,
        last_run_at: from_epoch_opt(row.try_get("last_run_at")?),
        download_metadata: row.try_get::<i64, _>("download_metadata")? != 0,
        metadata_extensions: row.try_get("metadata_extensions")?,
        download_subtitle: row.try_get::<i64, _>("download_subtitle")? != 0,
        subtitle_extensions: row.try_get("subtitle_extensions")?,
        created_at: from_epoch(row.try_get("created_at")?),
        updated_at: from_epoch(row.try_get("updated_at")?),
    })
}
