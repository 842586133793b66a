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

//! Process configuration and typed runtime-settings payloads.
//!
//! Process-level knobs (HTTP port, database selection, logging, JWT, seed
//! user) come from the environment and an optional `.env` file. Settings that
//! operators change at runtime (origin endpoint, strm generation, channel
//! credentials, queue tuning) are serde payloads persisted as JSON rows by
//! the data layer; this crate owns their shapes and defaults.

pub mod error;
pub mod loader;
pub mod model;
pub mod settings;

pub use error::{ConfigError, Result};
pub use model::{
    AppConfig, AuthConfig, DatabaseBackend, DatabaseConfig, DatabaseSettings, HttpConfig,
    LoggingSettings, PoolConfig, PostgresSettings, SeedUser, SqliteSettings,
};
pub use settings::{
    EMBY_SETTINGS_KEY, EmbySettings, ORIGIN_SETTINGS_KEY, OriginSettings, QUEUE_SETTINGS_KEY,
    QueueSettings, STRM_SETTINGS_KEY, StrmSettings, TELEGRAM_SETTINGS_KEY, TelegramSettings,
    VALIDATION_SETTINGS_KEY, ValidationSettings, WEWORK_SETTINGS_KEY, WeworkSettings,
};
