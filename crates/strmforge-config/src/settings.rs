//! Runtime-settings payloads persisted as JSON config rows.
//!
//! # Design
//! - Every struct deserialises from a partial document; absent fields take
//!   the documented default so operators can store minimal rows.
//! - Key constants are the single source of truth for the `configs` table.

use serde::{Deserialize, Serialize};

/// Config-row key holding the origin connection settings.
pub const ORIGIN_SETTINGS_KEY: &str = "origin";
/// Config-row key holding the strm generation settings.
pub const STRM_SETTINGS_KEY: &str = "strm";
/// Config-row key holding the executor/outbox tuning settings.
pub const QUEUE_SETTINGS_KEY: &str = "task_queue";
/// Config-row key holding the Telegram channel credentials.
pub const TELEGRAM_SETTINGS_KEY: &str = "notify.telegram";
/// Config-row key holding the WeWork channel webhook.
pub const WEWORK_SETTINGS_KEY: &str = "notify.wework";
/// Config-row key holding the Emby refresh credentials.
pub const EMBY_SETTINGS_KEY: &str = "notify.emby";
/// Config-row key holding the validation sweep settings.
pub const VALIDATION_SETTINGS_KEY: &str = "validation";

/// Connection and pacing settings for the remote file service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OriginSettings {
    /// Base URL of the origin (scheme + host + optional port).
    pub host: String,
    /// API token sent in the `Authorization` header.
    pub token: String,
    /// Optional host override used when rendering playback URLs.
    #[serde(default)]
    pub domain: Option<String>,
    /// Password forwarded with listing requests for protected paths.
    #[serde(default)]
    pub password: String,
    /// Listing page size.
    #[serde(default = "default_per_page")]
    pub per_page: u32,
    /// Minimum gap between the starts of consecutive origin calls.
    #[serde(default = "default_req_interval_ms")]
    pub req_interval_ms: u64,
    /// Extra attempts after a failed call.
    #[serde(default = "default_req_retry_count")]
    pub req_retry_count: u32,
    /// Pause between retry attempts.
    #[serde(default = "default_req_retry_interval_ms")]
    pub req_retry_interval_ms: u64,
    /// Per-call HTTP timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

const fn default_per_page() -> u32 {
    100
}

const fn default_req_interval_ms() -> u64 {
    200
}

const fn default_req_retry_count() -> u32 {
    3
}

const fn default_req_retry_interval_ms() -> u64 {
    1_000
}

const fn default_timeout_secs() -> u64 {
    30
}

/// Pointer-generation settings shared by every task.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StrmSettings {
    /// Main files smaller than this many MiB are skipped; zero disables.
    #[serde(default)]
    pub min_file_size_mb: u64,
    /// Replace the media extension with `.strm` instead of appending it.
    #[serde(default = "default_true")]
    pub replace_suffix: bool,
    /// Percent-encode path segments in rendered playback URLs.
    #[serde(default = "default_true")]
    pub url_encode: bool,
}

impl Default for StrmSettings {
    fn default() -> Self {
        Self {
            min_file_size_mb: 0,
            replace_suffix: true,
            url_encode: true,
        }
    }
}

const fn default_true() -> bool {
    true
}

/// Executor pool and outbox tuning.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QueueSettings {
    /// Concurrent executor slots; one keeps shared-filesystem deployments safe.
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Outbox polling cadence.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Delay before a failed notification becomes eligible again.
    #[serde(default = "default_retry_interval_secs")]
    pub retry_interval_secs: u64,
    /// Maximum outbox rows claimed per polling batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: i64,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            poll_interval_secs: default_poll_interval_secs(),
            retry_interval_secs: default_retry_interval_secs(),
            batch_size: default_batch_size(),
        }
    }
}

const fn default_workers() -> usize {
    1
}

const fn default_poll_interval_secs() -> u64 {
    30
}

const fn default_retry_interval_secs() -> u64 {
    300
}

const fn default_batch_size() -> i64 {
    50
}

/// Telegram bot credentials and optional message template override.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TelegramSettings {
    /// Bot API token.
    pub bot_token: String,
    /// Destination chat identifier.
    pub chat_id: String,
    /// Bot API host; the public endpoint when absent.
    #[serde(default)]
    pub api_host: Option<String>,
    /// Message template override using `{{.Var}}` placeholders.
    #[serde(default)]
    pub template: Option<String>,
}

/// WeWork group-robot webhook and optional template override.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WeworkSettings {
    /// Full webhook URL including its key parameter.
    pub webhook_url: String,
    /// Message template override using `{{.Var}}` placeholders.
    #[serde(default)]
    pub template: Option<String>,
}

/// Emby server coordinates for library refresh calls.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EmbySettings {
    /// Base URL of the Emby server.
    pub base_url: String,
    /// API key authorised to refresh libraries.
    pub api_key: String,
}

/// Validation sweep settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ValidationSettings {
    /// Per-probe HTTP timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ValidationSettings {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
        }
    }
}
