//! Validation-task store with the system-wide single-flight gate.

use chrono::Utc;
use sqlx::{AnyPool, Row, any::AnyRow};

use strmforge_core::{ValidationStatus, ValidationTask, ValidationType};

use crate::error::{DataError, Result};
use crate::time::{from_epoch, from_epoch_opt, to_epoch};

const CREATE: &str = "
    INSERT INTO validation_tasks (validation_type, status, config, created_at)
    VALUES ($1, 'pending', $2, $3)
    RETURNING id
";

// The NOT EXISTS guard makes the single-flight invariant a property of the
// row store rather than of in-process state.
const TRY_START: &str = "
    UPDATE validation_tasks
    SET status = 'running', started_at = $2
    WHERE id = $1 AND status = 'pending'
      AND NOT EXISTS (SELECT 1 FROM validation_tasks WHERE status = 'running')
";

const SET_TOTAL: &str = "UPDATE validation_tasks SET total_files = $2 WHERE id = $1";

const UPDATE_PROGRESS: &str = "
    UPDATE validation_tasks
    SET processed_files = $2, valid_files = $3, invalid_files = $4, progress = $5
    WHERE id = $1
";

const FINISH: &str = "
    UPDATE validation_tasks
    SET status = $2, message = $3, completed_at = $4
    WHERE id = $1
";

const CANCEL: &str = "
    UPDATE validation_tasks
    SET status = 'cancelled', completed_at = $2
    WHERE id = $1 AND status IN ('pending', 'running')
";

const SELECT_BY_ID: &str = "SELECT * FROM validation_tasks WHERE id = $1";
const SELECT_RUNNING: &str =
    "SELECT * FROM validation_tasks WHERE status = 'running' ORDER BY id LIMIT 1";
const SELECT_RECENT: &str =
    "SELECT * FROM validation_tasks ORDER BY created_at DESC, id DESC LIMIT $1";

/// Database-backed store for validation sweeps.
#[derive(Clone)]
pub struct ValidationStore {
    pool: AnyPool,
}

impl ValidationStore {
    /// Construct a store over the shared pool.
    #[must_use]
    pub const fn new(pool: AnyPool) -> Self {
        Self { pool }
    }

    /// Create a pending sweep.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub async fn create(
        &self,
        validation_type: ValidationType,
        config: Option<&str>,
    ) -> Result<ValidationTask> {
        let row = sqlx::query(CREATE)
            .bind(validation_type.as_str())
            .bind(config)
            .bind(to_epoch(Utc::now()))
            .fetch_one(&self.pool)
            .await?;
        let id: i64 = row.try_get("id")?;
        self.require(id).await
    }

    /// Admit a pending sweep into `running`; loses when any other sweep is
    /// already running.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub async fn try_start(&self, id: i64) -> Result<bool> {
        let outcome = sqlx::query(TRY_START)
            .bind(id)
            .bind(to_epoch(Utc::now()))
            .execute(&self.pool)
            .await?;
        Ok(outcome.rows_affected() == 1)
    }

    /// Record the size of the selected row set.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub async fn set_total(&self, id: i64, total_files: i64) -> Result<()> {
        sqlx::query(SET_TOTAL)
            .bind(id)
            .bind(total_files)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Update the progress counters after a probe.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub async fn update_progress(
        &self,
        id: i64,
        processed_files: i64,
        valid_files: i64,
        invalid_files: i64,
        progress: i64,
    ) -> Result<()> {
        sqlx::query(UPDATE_PROGRESS)
            .bind(id)
            .bind(processed_files)
            .bind(valid_files)
            .bind(invalid_files)
            .bind(progress)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Close a sweep with a terminal status and summary message.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub async fn finish(
        &self,
        id: i64,
        status: ValidationStatus,
        message: Option<&str>,
    ) -> Result<()> {
        sqlx::query(FINISH)
            .bind(id)
            .bind(status.as_str())
            .bind(message)
            .bind(to_epoch(Utc::now()))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Request cancellation of a pending or running sweep.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub async fn cancel(&self, id: i64) -> Result<bool> {
        let outcome = sqlx::query(CANCEL)
            .bind(id)
            .bind(to_epoch(Utc::now()))
            .execute(&self.pool)
            .await?;
        Ok(outcome.rows_affected() == 1)
    }

    /// Fetch one sweep.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn get(&self, id: i64) -> Result<Option<ValidationTask>> {
        let row = sqlx::query(SELECT_BY_ID)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(map_validation).transpose()
    }

    async fn require(&self, id: i64) -> Result<ValidationTask> {
        self.get(id).await?.ok_or(DataError::NotFound {
            entity: "validation_task",
            id,
        })
    }

    /// Fetch the currently running sweep, when any.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn running(&self) -> Result<Option<ValidationTask>> {
        let row = sqlx::query(SELECT_RUNNING)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(map_validation).transpose()
    }

    /// List recent sweeps.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn list(&self, limit: i64) -> Result<Vec<ValidationTask>> {
        let rows = sqlx::query(SELECT_RECENT)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(map_validation).collect()
    }
}

fn map_validation(row: &AnyRow) -> Result<ValidationTask> {
    let validation_type: String = row.try_get("validation_type")?;
    let status: String = row.try_get("status")?;
    Ok(ValidationTask {
        id: row.try_get("id")?,
        validation_type: validation_type
            .parse()
            .map_err(|err| DataError::decode("validation_tasks.validation_type", err))?,
        status: status
            .parse()
            .map_err(|err| DataError::decode("validation_tasks.status", err))?,
        total_files: row.try_get("total_files")?,
        processed_files: row.try_get("processed_files")?,
        valid_files: row.try_get("valid_files")?,
        invalid_files: row.try_get("invalid_files")?,
        progress: row.try_get("progress")?,
        started_at: from_epoch_opt(row.try_get("started_at")?),
        completed_at: from_epoch_opt(row.try_get("completed_at")?),
        config: row.try_get("config")?,
        message: row.try_get("message")?,
        created_at: from_epoch(row.try_get("created_at")?),
    })
}
