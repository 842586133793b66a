//! Seed-user store; only the bootstrap admin row is managed here.

use chrono::Utc;
use sqlx::{AnyPool, Row};

use crate::error::Result;
use crate::time::to_epoch;

const SELECT_USER: &str = "SELECT id FROM users WHERE username = $1";
const INSERT_USER: &str = "
    INSERT INTO users (username, password_hash, created_at)
    VALUES ($1, $2, $3)
";

/// Database-backed user store.
#[derive(Clone)]
pub struct UserStore {
    pool: AnyPool,
}

impl UserStore {
    /// Construct a store over the shared pool.
    #[must_use]
    pub const fn new(pool: AnyPool) -> Self {
        Self { pool }
    }

    /// Insert the seed administrator unless the username already exists.
    ///
    /// Returns `true` when a row was inserted.
    ///
    /// # Errors
    ///
    /// Returns an error if a query fails.
    pub async fn ensure_seed(&self, username: &str, password_hash: &str) -> Result<bool> {
        let existing = sqlx::query(SELECT_USER)
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;
        if existing.is_some() {
            return Ok(false);
        }
        sqlx::query(INSERT_USER)
            .bind(username)
            .bind(password_hash)
            .bind(to_epoch(Utc::now()))
            .execute(&self.pool)
            .await?;
        Ok(true)
    }

    /// Fetch the stored password hash for one username.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn password_hash(&self, username: &str) -> Result<Option<String>> {
        let row = sqlx::query("SELECT password_hash FROM users WHERE username = $1")
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|row| row.try_get("password_hash"))
            .transpose()
            .map_err(Into::into)
    }
}
