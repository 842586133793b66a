//! Idempotent schema migration.
//!
//! The rules are additive only: a missing table is created, a missing column
//! is added, nothing is ever dropped. Running the migration against an
//! up-to-date schema is a no-op.

use sqlx::AnyPool;
use tracing::debug;

use strmforge_config::DatabaseBackend;

use crate::db::Database;
use crate::error::Result;

const ID_COLUMN_SQLITE: &str = "id INTEGER PRIMARY KEY AUTOINCREMENT";
const ID_COLUMN_POSTGRES: &str = "id BIGSERIAL PRIMARY KEY";

const TABLES: &[(&str, &str)] = &[
    (
        "users",
        "CREATE TABLE IF NOT EXISTS users (
            {id},
            username TEXT NOT NULL UNIQUE,
            password_hash TEXT NOT NULL,
            created_at BIGINT NOT NULL
        )",
    ),
    (
        "configs",
        "CREATE TABLE IF NOT EXISTS configs (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            updated_at BIGINT NOT NULL
        )",
    ),
    (
        "tasks",
        "CREATE TABLE IF NOT EXISTS tasks (
            {id},
            name TEXT NOT NULL,
            media_type TEXT NOT NULL,
            source_path TEXT NOT NULL,
            target_path TEXT NOT NULL,
            file_suffix TEXT NOT NULL,
            overwrite BIGINT NOT NULL DEFAULT 0,
            enabled BIGINT NOT NULL DEFAULT 1,
            cron TEXT,
            running BIGINT NOT NULL DEFAULT 0,
            last_run_at BIGINT,
            download_metadata BIGINT NOT NULL DEFAULT 0,
            metadata_extensions TEXT,
            download_subtitle BIGINT NOT NULL DEFAULT 0,
            subtitle_extensions TEXT,
            created_at BIGINT NOT NULL,
            updated_at BIGINT NOT NULL
        )",
    ),
    (
        "task_logs",
        "CREATE TABLE IF NOT EXISTS task_logs (
            {id},
            task_id BIGINT NOT NULL,
            status TEXT NOT NULL,
            message TEXT,
            start_time BIGINT NOT NULL,
            end_time BIGINT,
            duration BIGINT,
            total_file BIGINT NOT NULL DEFAULT 0,
            generated_file BIGINT NOT NULL DEFAULT 0,
            skip_file BIGINT NOT NULL DEFAULT 0,
            metadata_count BIGINT NOT NULL DEFAULT 0,
            subtitle_count BIGINT NOT NULL DEFAULT 0,
            failed_count BIGINT NOT NULL DEFAULT 0
        )",
    ),
    (
        "file_histories",
        "CREATE TABLE IF NOT EXISTS file_histories (
            {id},
            task_id BIGINT NOT NULL,
            task_log_id BIGINT,
            file_name TEXT NOT NULL,
            source_path TEXT NOT NULL,
            source_url TEXT,
            target_file_path TEXT NOT NULL,
            file_size BIGINT NOT NULL DEFAULT 0,
            file_type TEXT,
            file_suffix TEXT NOT NULL,
            file_category TEXT NOT NULL,
            is_main_file BIGINT NOT NULL DEFAULT 0,
            main_file_id BIGINT,
            hash TEXT,
            is_valid BIGINT,
            last_checked_at BIGINT,
            processing_status TEXT NOT NULL,
            created_at BIGINT NOT NULL,
            updated_at BIGINT NOT NULL
        )",
    ),
    (
        "notification_queue",
        "CREATE TABLE IF NOT EXISTS notification_queue (
            {id},
            channel TEXT NOT NULL,
            event TEXT NOT NULL,
            payload TEXT NOT NULL,
            status TEXT NOT NULL,
            priority BIGINT NOT NULL DEFAULT 5,
            retry_count BIGINT NOT NULL DEFAULT 0,
            max_retries BIGINT NOT NULL DEFAULT 3,
            next_retry_at BIGINT,
            processed_at BIGINT,
            error_message TEXT,
            created_at BIGINT NOT NULL,
            updated_at BIGINT NOT NULL
        )",
    ),
    (
        "validation_tasks",
        "CREATE TABLE IF NOT EXISTS validation_tasks (
            {id},
            validation_type TEXT NOT NULL,
            status TEXT NOT NULL,
            total_files BIGINT NOT NULL DEFAULT 0,
            processed_files BIGINT NOT NULL DEFAULT 0,
            valid_files BIGINT NOT NULL DEFAULT 0,
            invalid_files BIGINT NOT NULL DEFAULT 0,
            progress BIGINT NOT NULL DEFAULT 0,
            started_at BIGINT,
            completed_at BIGINT,
            config TEXT,
            message TEXT,
            created_at BIGINT NOT NULL
        )",
    ),
    (
        "system_logs",
        "CREATE TABLE IF NOT EXISTS system_logs (
            {id},
            level TEXT NOT NULL,
            scope TEXT NOT NULL,
            message TEXT NOT NULL,
            created_at BIGINT NOT NULL
        )",
    ),
];

// Columns added after the initial release; tolerated as already present.
const ADDED_COLUMNS: &[&str] = &[
    "ALTER TABLE file_histories ADD COLUMN validation_message TEXT",
];

const INDEXES: &[&str] = &[
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_file_histories_task_target
        ON file_histories (task_id, target_file_path)",
    "CREATE INDEX IF NOT EXISTS idx_file_histories_hash
        ON file_histories (task_id, hash)",
    "CREATE INDEX IF NOT EXISTS idx_task_logs_task
        ON task_logs (task_id, start_time)",
    "CREATE INDEX IF NOT EXISTS idx_notification_queue_eligibility
        ON notification_queue (status, priority, created_at)",
    "CREATE INDEX IF NOT EXISTS idx_validation_tasks_status
        ON validation_tasks (status)",
];

/// Apply the additive migration to the connected backend.
///
/// # Errors
///
/// Returns an error when a DDL statement fails for a reason other than a
/// column already existing.
pub async fn run(database: &Database) -> Result<()> {
    let id_column = match database.backend() {
        DatabaseBackend::Sqlite => ID_COLUMN_SQLITE,
        DatabaseBackend::Postgresql => ID_COLUMN_POSTGRES,
    };

    for (table, template) in TABLES {
        let statement = template.replace("{id}", id_column);
        sqlx::query(&statement).execute(database.pool()).await?;
        debug!(table, "ensured table");
    }

    for statement in ADDED_COLUMNS {
        apply_added_column(database.pool(), statement).await?;
    }

    for statement in INDEXES {
        sqlx::query(statement).execute(database.pool()).await?;
    }

    Ok(())
}

async fn apply_added_column(pool: &AnyPool, statement: &str) -> Result<()> {
    match sqlx::query(statement).execute(pool).await {
        Ok(_) => Ok(()),
        Err(err) if column_already_exists(&err) => Ok(()),
        Err(err) => Err(err.into()),
    }
}

fn column_already_exists(err: &sqlx::Error) -> bool {
    let rendered = err.to_string().to_ascii_lowercase();
    rendered.contains("duplicate column") || rendered.contains("already exists")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_table_template_carries_the_id_placeholder_or_its_own_key() {
        for (table, template) in TABLES {
            let has_placeholder = template.contains("{id}");
            let has_text_key = template.contains("PRIMARY KEY");
            assert!(
                has_placeholder || has_text_key,
                "table {table} lacks a primary key definition"
            );
        }
    }

    #[test]
    fn added_columns_target_existing_tables() {
        for statement in ADDED_COLUMNS {
            let table = statement
                .split_whitespace()
                .nth(2)
                .expect("ALTER TABLE <name>");
            assert!(
                TABLES.iter().any(|(name, _)| *name == table),
                "added column targets unknown table {table}"
            );
        }
    }
}
