//! Database and task fixtures.

use tempfile::TempDir;

use strmforge_config::{DatabaseConfig, DatabaseSettings, PoolConfig, SqliteSettings};
use strmforge_core::{MediaType, NewTask};
use strmforge_data::Database;

/// A migrated SQLite database living in a temp directory; dropping the
/// fixture removes the file.
pub struct TestDatabase {
    /// Connected and migrated database handle.
    pub database: Database,
    _dir: TempDir,
}

/// Create a migrated temp-file SQLite database for a test.
///
/// # Panics
///
/// Panics when the temp directory or the database cannot be created;
/// fixtures fail loudly.
pub async fn temp_database() -> TestDatabase {
    let dir = tempfile::tempdir().expect("create temp dir");
    let config = DatabaseConfig {
        settings: DatabaseSettings::Sqlite(SqliteSettings {
            base_dir: dir.path().to_path_buf(),
            name: "strmforge-test.db".to_string(),
        }),
        pool: PoolConfig {
            max_open_conns: 5,
            max_idle_conns: 1,
            conn_max_lifetime_secs: 600,
        },
    };
    let database = Database::connect(&config).await.expect("connect sqlite");
    TestDatabase {
        database,
        _dir: dir,
    }
}

/// A movie task mirroring `/movies` into `target_path` with `mp4,mkv`
/// media extensions; tweak fields per test.
#[must_use]
pub fn sample_task(target_path: &str) -> NewTask {
    NewTask {
        name: "movies".to_string(),
        media_type: MediaType::Movie,
        source_path: "/movies".to_string(),
        target_path: target_path.to_string(),
        file_suffix: "mp4,mkv".to_string(),
        overwrite: false,
        enabled: true,
        cron: None,
        download_metadata: false,
        metadata_extensions: None,
        download_subtitle: false,
        subtitle_extensions: None,
    }
}
