//! Notification outbox store.
//!
//! `failed` is terminal only. A delivery failure with remaining budget
//! returns the row to `pending` with `next_retry_at` in the future, so
//! eligibility is a single predicate over `pending` rows.

use chrono::{DateTime, Utc};
use sqlx::{AnyPool, Row, any::AnyRow};

use strmforge_core::{NotificationEvent, NotificationQueueItem, NotificationStatus};

use crate::error::{DataError, Result};
use crate::time::{from_epoch, from_epoch_opt, to_epoch};

const DEFAULT_PRIORITY: i64 = 5;
const DEFAULT_MAX_RETRIES: i64 = 3;

const ENQUEUE: &str = "
    INSERT INTO notification_queue (
        channel, event, payload, status, priority, retry_count, max_retries,
        created_at, updated_at
    )
    VALUES ($1, $2, $3, 'pending', $4, 0, $5, $6, $6)
    RETURNING id
";

const SELECT_DUE: &str = "
    SELECT * FROM notification_queue
    WHERE status = 'pending' AND (next_retry_at IS NULL OR next_retry_at <= $1)
    ORDER BY priority ASC, created_at ASC, id ASC
    LIMIT $2
";

const CLAIM: &str = "
    UPDATE notification_queue SET status = 'processing', updated_at = $2
    WHERE id = $1 AND status = 'pending'
";

const COMPLETE: &str = "
    UPDATE notification_queue
    SET status = 'completed', processed_at = $2, updated_at = $2, error_message = NULL
    WHERE id = $1
";

const RETRY_LATER: &str = "
    UPDATE notification_queue
    SET status = 'pending', retry_count = retry_count + 1,
        next_retry_at = $2, error_message = $3, updated_at = $4
    WHERE id = $1
";

// Terminal failure: the exhausted retry counter stays at max_retries; only
// scheduled retries increment it.
const FAIL: &str = "
    UPDATE notification_queue
    SET status = 'failed', error_message = $2, updated_at = $3
    WHERE id = $1
";

const RETRY_NOW: &str = "
    UPDATE notification_queue
    SET status = 'pending', next_retry_at = NULL, retry_count = 0, updated_at = $2
    WHERE id = $1 AND status IN ('pending', 'failed')
";

const SELECT_BY_ID: &str = "SELECT * FROM notification_queue WHERE id = $1";
const SELECT_RECENT: &str =
    "SELECT * FROM notification_queue ORDER BY created_at DESC, id DESC LIMIT $1";
const SELECT_RECENT_BY_STATUS: &str = "
    SELECT * FROM notification_queue WHERE status = $1
    ORDER BY created_at DESC, id DESC LIMIT $2
";
const DELETE: &str = "DELETE FROM notification_queue WHERE id = $1";
const STATS: &str = "
    SELECT status, COUNT(*) AS status_rows
    FROM notification_queue GROUP BY status
";

/// Counts by delivery state for the admin surface.
#[derive(Debug, Clone, Copy, Default, serde::Serialize, PartialEq, Eq)]
pub struct QueueStats {
    /// Rows eligible now or waiting on a retry window.
    pub pending: i64,
    /// Rows currently claimed by the worker.
    pub processing: i64,
    /// Rows delivered successfully.
    pub completed: i64,
    /// Rows whose retry budget is exhausted.
    pub failed: i64,
}

/// Database-backed notification outbox.
#[derive(Clone)]
pub struct NotificationStore {
    pool: AnyPool,
}

impl NotificationStore {
    /// Construct a store over the shared pool.
    #[must_use]
    pub const fn new(pool: AnyPool) -> Self {
        Self { pool }
    }

    /// Queue one notification; priority clamps into `1..=10`.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub async fn enqueue(
        &self,
        channel: &str,
        event: NotificationEvent,
        payload: &str,
        priority: Option<i64>,
        max_retries: Option<i64>,
    ) -> Result<i64> {
        let priority = priority.unwrap_or(DEFAULT_PRIORITY).clamp(1, 10);
        let max_retries = max_retries.unwrap_or(DEFAULT_MAX_RETRIES).max(0);
        let row = sqlx::query(ENQUEUE)
            .bind(channel)
            .bind(event.as_str())
            .bind(payload)
            .bind(priority)
            .bind(max_retries)
            .bind(to_epoch(Utc::now()))
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get("id")?)
    }

    /// Claim up to `limit` eligible rows, flipping each `pending →
    /// processing`; rows lost to a concurrent claim are skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if a query fails.
    pub async fn claim_due(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<NotificationQueueItem>> {
        let rows = sqlx::query(SELECT_DUE)
            .bind(to_epoch(now))
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        let mut claimed = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut item = map_item(row)?;
            let outcome = sqlx::query(CLAIM)
                .bind(item.id)
                .bind(to_epoch(now))
                .execute(&self.pool)
                .await?;
            if outcome.rows_affected() == 1 {
                item.status = NotificationStatus::Processing;
                claimed.push(item);
            }
        }
        Ok(claimed)
    }

    /// Record a successful delivery.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub async fn complete(&self, id: i64) -> Result<()> {
        sqlx::query(COMPLETE)
            .bind(id)
            .bind(to_epoch(Utc::now()))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Return a failed delivery to the queue with a future retry window.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub async fn retry_later(
        &self,
        id: i64,
        error: &str,
        next_retry_at: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(RETRY_LATER)
            .bind(id)
            .bind(to_epoch(next_retry_at))
            .bind(error)
            .bind(to_epoch(Utc::now()))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Terminate a delivery whose retry budget is exhausted.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub async fn fail(&self, id: i64, error: &str) -> Result<()> {
        sqlx::query(FAIL)
            .bind(id)
            .bind(error)
            .bind(to_epoch(Utc::now()))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Administrative requeue: reset the retry budget and make the row
    /// eligible immediately.
    ///
    /// # Errors
    ///
    /// Returns [`DataError::NotFound`] when the row does not exist or is
    /// mid-delivery.
    pub async fn retry_now(&self, id: i64) -> Result<()> {
        let outcome = sqlx::query(RETRY_NOW)
            .bind(id)
            .bind(to_epoch(Utc::now()))
            .execute(&self.pool)
            .await?;
        if outcome.rows_affected() == 0 {
            return Err(DataError::NotFound {
                entity: "notification",
                id,
            });
        }
        Ok(())
    }

    /// Fetch one row.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn get(&self, id: i64) -> Result<Option<NotificationQueueItem>> {
        let row = sqlx::query(SELECT_BY_ID)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(map_item).transpose()
    }

    /// List recent rows, optionally narrowed to one status.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn list(
        &self,
        status: Option<NotificationStatus>,
        limit: i64,
    ) -> Result<Vec<NotificationQueueItem>> {
        let rows = match status {
            Some(status) => {
                sqlx::query(SELECT_RECENT_BY_STATUS)
                    .bind(status.as_str())
                    .bind(limit)
                    .fetch_all(&self.pool)
                    .await?
            }
            None => {
                sqlx::query(SELECT_RECENT)
                    .bind(limit)
                    .fetch_all(&self.pool)
                    .await?
            }
        };
        rows.iter().map(map_item).collect()
    }

    /// Delete one row.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub async fn delete(&self, id: i64) -> Result<()> {
        sqlx::query(DELETE).bind(id).execute(&self.pool).await?;
        Ok(())
    }

    /// Aggregate counts by delivery state.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn stats(&self) -> Result<QueueStats> {
        let rows = sqlx::query(STATS).fetch_all(&self.pool).await?;
        let mut stats = QueueStats::default();
        for row in rows {
            let status: String = row.try_get("status")?;
            let count: i64 = row.try_get("status_rows")?;
            match status.as_str() {
                "pending" => stats.pending = count,
                "processing" => stats.processing = count,
                "completed" => stats.completed = count,
                "failed" => stats.failed = count,
                _ => {}
            }
        }
        Ok(stats)
    }
}

fn map_item(row: &AnyRow) -> Result<NotificationQueueItem> {
    let event: String = row.try_get("event")?;
    let status: String = row.try_get("status")?;
    Ok(NotificationQueueItem {
        id: row.try_get("id")?,
        channel: row.try_get("channel")?,
        event: event
            .parse()
            .map_err(|err| DataError::decode("notification_queue.event", err))?,
        payload: row.try_get("payload")?,
        status: status
            .parse()
            .map_err(|err| DataError::decode("notification_queue.status", err))?,
        priority: row.try_get("priority")?,
        retry_count: row.try_get("retry_count")?,
        max_retries: row.try_get("max_retries")?,
        next_retry_at: from_epoch_opt(row.try_get("next_retry_at")?),
        processed_at: from_epoch_opt(row.try_get("processed_at")?),
        error_message: row.try_get("error_message")?,
        created_at: from_epoch(row.try_get("created_at")?),
        updated_at: from_epoch(row.try_get("updated_at")?),
    })
}
