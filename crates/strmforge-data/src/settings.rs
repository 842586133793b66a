//! Runtime-settings store backed by the `configs` table.

use chrono::Utc;
use serde::Serialize;
use serde::de::DeserializeOwned;
use sqlx::{AnyPool, Row};

use crate::error::{DataError, Result};
use crate::time::to_epoch;

const SELECT_VALUE: &str = "SELECT value FROM configs WHERE key = $1";
const UPSERT_VALUE: &str = "
    INSERT INTO configs (key, value, updated_at)
    VALUES ($1, $2, $3)
    ON CONFLICT (key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
";

/// Database-backed store for JSON settings payloads.
#[derive(Clone)]
pub struct SettingsStore {
    pool: AnyPool,
}

impl SettingsStore {
    /// Construct a store over the shared pool.
    #[must_use]
    pub const fn new(pool: AnyPool) -> Self {
        Self { pool }
    }

    /// Fetch the raw JSON payload for one key.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn raw(&self, key: &str) -> Result<Option<String>> {
        let row = sqlx::query(SELECT_VALUE)
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|row| row.try_get("value")).transpose().map_err(Into::into)
    }

    /// Fetch and deserialise the payload for one key.
    ///
    /// # Errors
    ///
    /// Returns [`DataError::Settings`] when the stored payload does not
    /// match the requested shape.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.raw(key).await? {
            Some(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|source| DataError::Settings {
                    key: key.to_string(),
                    source,
                }),
            None => Ok(None),
        }
    }

    /// Serialise and store the payload for one key.
    ///
    /// # Errors
    ///
    /// Returns an error if serialisation or the upsert fails.
    pub async fn set<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let raw = serde_json::to_string(value).map_err(|source| DataError::Settings {
            key: key.to_string(),
            source,
        })?;
        sqlx::query(UPSERT_VALUE)
            .bind(key)
            .bind(raw)
            .bind(to_epoch(Utc::now()))
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
