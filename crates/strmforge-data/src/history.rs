//! File-history store: one row per produced artifact.
//!
//! `(task_id, target_file_path)` is unique, so re-generation updates the
//! existing row instead of accumulating duplicates across runs.

use chrono::{DateTime, Utc};
use sqlx::{AnyPool, Row, any::AnyRow};

use strmforge_core::{FileCategory, FileHistory, NewFileHistory};

use crate::error::{DataError, Result};
use crate::time::{from_epoch, from_epoch_opt, to_epoch};

const UPSERT_HISTORY: &str = "
    INSERT INTO file_histories (
        task_id, task_log_id, file_name, source_path, source_url,
        target_file_path, file_size, file_type, file_suffix, file_category,
        is_main_file, main_file_id, hash, processing_status,
        created_at, updated_at
    )
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $15)
    ON CONFLICT (task_id, target_file_path) DO UPDATE SET
        task_log_id = excluded.task_log_id,
        file_name = excluded.file_name,
        source_path = excluded.source_path,
        source_url = excluded.source_url,
        file_size = excluded.file_size,
        file_type = excluded.file_type,
        file_suffix = excluded.file_suffix,
        file_category = excluded.file_category,
        is_main_file = excluded.is_main_file,
        main_file_id = excluded.main_file_id,
        hash = excluded.hash,
        processing_status = excluded.processing_status,
        updated_at = excluded.updated_at
    RETURNING id
";

const SELECT_BY_ID: &str = "SELECT * FROM file_histories WHERE id = $1";
const SELECT_BY_HASH: &str =
    "SELECT * FROM file_histories WHERE task_id = $1 AND hash = $2 ORDER BY id LIMIT 1";
const SELECT_BY_TARGET: &str =
    "SELECT * FROM file_histories WHERE task_id = $1 AND target_file_path = $2";
const SELECT_MAINS_IN_DIR: &str = "
    SELECT * FROM file_histories
    WHERE task_id = $1 AND source_path = $2 AND is_main_file = 1
    ORDER BY id
";
const SELECT_COMPANIONS: &str =
    "SELECT * FROM file_histories WHERE main_file_id = $1 ORDER BY id";
const SELECT_INVALID: &str =
    "SELECT * FROM file_histories WHERE is_valid = 0 ORDER BY id";

const MARK_VALIDATED: &str = "
    UPDATE file_histories
    SET is_valid = $2, last_checked_at = $3, validation_message = $4, updated_at = $3
    WHERE id = $1
";

const VALIDATION_BASE: &str = "
    SELECT * FROM file_histories
    WHERE file_suffix = 'strm' AND is_main_file = 1 AND processing_status = 'success'
";

/// Narrowing applied when selecting rows for a validation sweep.
#[derive(Debug, Clone, Default)]
pub struct ValidationSelection {
    /// Only rows never checked or checked before this instant.
    pub checked_before: Option<DateTime<Utc>>,
    /// Only rows belonging to this task.
    pub task_id: Option<i64>,
    /// Only rows whose target path starts with this prefix.
    pub path_prefix: Option<String>,
}

/// Database-backed store for artifact history rows.
#[derive(Clone)]
pub struct HistoryStore {
    pool: AnyPool,
}

impl HistoryStore {
    /// Construct a store over the shared pool.
    #[must_use]
    pub const fn new(pool: AnyPool) -> Self {
        Self { pool }
    }

    /// Insert or refresh the row for `(task, target)` and return its id.
    ///
    /// # Errors
    ///
    /// Returns an error if the upsert fails.
    pub async fn record(&self, new: &NewFileHistory) -> Result<i64> {
        let now = to_epoch(Utc::now());
        let row = sqlx::query(UPSERT_HISTORY)
            .bind(new.task_id)
            .bind(new.task_log_id)
            .bind(&new.file_name)
            .bind(&new.source_path)
            .bind(new.source_url.as_deref())
            .bind(&new.target_file_path)
            .bind(new.file_size)
            .bind(new.file_type.as_deref())
            .bind(&new.file_suffix)
            .bind(new.file_category.as_str())
            .bind(i64::from(new.file_category == FileCategory::Main))
            .bind(new.main_file_id)
            .bind(new.hash.as_deref())
            .bind(new.processing_status.as_str())
            .bind(now)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get("id")?)
    }

    /// Fetch one row.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn get(&self, id: i64) -> Result<Option<FileHistory>> {
        let row = sqlx::query(SELECT_BY_ID)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(map_history).transpose()
    }

    /// Find a row with a matching content fingerprint for one task.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn lookup_by_hash(&self, task_id: i64, hash: &str) -> Result<Option<FileHistory>> {
        let row = sqlx::query(SELECT_BY_HASH)
            .bind(task_id)
            .bind(hash)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(map_history).transpose()
    }

    /// Find the row owning one local target path.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn find_by_target(
        &self,
        task_id: i64,
        target_file_path: &str,
    ) -> Result<Option<FileHistory>> {
        let row = sqlx::query(SELECT_BY_TARGET)
            .bind(task_id)
            .bind(target_file_path)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(map_history).transpose()
    }

    /// List the pointer rows produced from one remote directory; companion
    /// linking matches them by stem.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn list_mains_in_dir(
        &self,
        task_id: i64,
        source_path: &str,
    ) -> Result<Vec<FileHistory>> {
        let rows = sqlx::query(SELECT_MAINS_IN_DIR)
            .bind(task_id)
            .bind(source_path)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(map_history).collect()
    }

    /// List companion rows linked to one pointer row.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn companions_of(&self, main_file_id: i64) -> Result<Vec<FileHistory>> {
        let rows = sqlx::query(SELECT_COMPANIONS)
            .bind(main_file_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(map_history).collect()
    }

    /// Record a probe verdict on one row.
    ///
    /// # Errors
    ///
    /// Returns [`DataError::NotFound`] when the row does not exist.
    pub async fn mark_validated(
        &self,
        id: i64,
        is_valid: bool,
        message: Option<&str>,
    ) -> Result<()> {
        let outcome = sqlx::query(MARK_VALIDATED)
            .bind(id)
            .bind(i64::from(is_valid))
            .bind(to_epoch(Utc::now()))
            .bind(message)
            .execute(&self.pool)
            .await?;
        if outcome.rows_affected() == 0 {
            return Err(DataError::NotFound {
                entity: "file_history",
                id,
            });
        }
        Ok(())
    }

    /// Select the pointer rows a validation sweep should probe.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn select_for_validation(
        &self,
        selection: &ValidationSelection,
    ) -> Result<Vec<FileHistory>> {
        let mut sql = String::from(VALIDATION_BASE);
        let mut index = 1;
        if selection.checked_before.is_some() {
            sql.push_str(&format!(
                " AND (last_checked_at IS NULL OR last_checked_at < ${index})"
            ));
            index += 1;
        }
        if selection.task_id.is_some() {
            sql.push_str(&format!(" AND task_id = ${index}"));
            index += 1;
        }
        if selection.path_prefix.is_some() {
            sql.push_str(&format!(" AND target_file_path LIKE ${index}"));
        }
        sql.push_str(" ORDER BY id");

        let mut query = sqlx::query(&sql);
        if let Some(cutoff) = selection.checked_before {
            query = query.bind(to_epoch(cutoff));
        }
        if let Some(task_id) = selection.task_id {
            query = query.bind(task_id);
        }
        if let Some(prefix) = &selection.path_prefix {
            query = query.bind(format!("{prefix}%"));
        }

        let rows = query.fetch_all(&self.pool).await?;
        rows.iter().map(map_history).collect()
    }

    /// List rows a cleanup pass should remove from disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn invalid_rows(&self) -> Result<Vec<FileHistory>> {
        let rows = sqlx::query(SELECT_INVALID).fetch_all(&self.pool).await?;
        rows.iter().map(map_history).collect()
    }

    /// Delete one row together with its linked companion rows.
    ///
    /// # Errors
    ///
    /// Returns an error if a delete fails.
    pub async fn delete_with_companions(&self, id: i64) -> Result<()> {
        sqlx::query("DELETE FROM file_histories WHERE main_file_id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        sqlx::query("DELETE FROM file_histories WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

fn map_history(row: &AnyRow) -> Result<FileHistory> {
    let category: String = row.try_get("file_category")?;
    let processing: String = row.try_get("processing_status")?;
    Ok(FileHistory {
        id: row.try_get("id")?,
        task_id: row.try_get("task_id")?,
        task_log_id: row.try_get("task_log_id")?,
        file_name: row.try_get("file_name")?,
        source_path: row.try_get("source_path")?,
        source_url: row.try_get("source_url")?,
        target_file_path: row.try_get("target_file_path")?,
        file_size: row.try_get("file_size")?,
        file_type: row.try_get("file_type")?,
        file_suffix: row.try_get("file_suffix")?,
        file_category: category
            .parse()
            .map_err(|err| DataError::decode("file_histories.file_category", err))?,
        is_main_file: row.try_get::<i64, _>("is_main_file")? != 0,
        main_file_id: row.try_get("main_file_id")?,
        hash: row.try_get("hash")?,
        is_valid: row
            .try_get::<Option<i64>, _>("is_valid")?
            .map(|flag| flag != 0),
        last_checked_at: from_epoch_opt(row.try_get("last_checked_at")?),
        validation_message: row.try_get("validation_message")?,
        processing_status: processing
            .parse()
            .map_err(|err| DataError::decode("file_histories.processing_status", err))?,
        created_at: from_epoch(row.try_get("created_at")?),
        updated_at: from_epoch(row.try_get("updated_at")?),
    })
}
