#![forbid(unsafe_code)]
#![deny(
    warnings,
    dead_code,
    unused,
    unused_imports,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::cargo,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::multiple_crate_versions)]

//! Shared data access layer for strmforge: pool bootstrap, idempotent schema
//! migration, and one store per persisted concern.
//!
//! The layer speaks through the sqlx `Any` driver so one set of queries
//! serves both SQLite and PostgreSQL deployments. Timestamps cross the
//! boundary as epoch seconds and become `chrono` values at the store edge;
//! booleans travel as `0`/`1` integers for the same reason.

pub mod db;
pub mod error;
pub mod history;
pub mod logs;
pub mod migrate;
pub mod notifications;
pub mod settings;
pub mod system;
pub mod tasks;
mod time;
pub mod users;
pub mod validation;

pub use db::Database;
pub use error::{DataError, Result as DataResult};
pub use history::{HistoryStore, ValidationSelection};
pub use logs::TaskLogStore;
pub use notifications::{NotificationStore, QueueStats};
pub use settings::SettingsStore;
pub use system::{SystemLogRow, SystemLogStore};
pub use tasks::TaskStore;
pub use users::UserStore;
pub use validation::ValidationStore;
