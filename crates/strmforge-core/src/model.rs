//! Persistent entities and their status enums.
//!
//! # Design
//! - Pure data carriers; persistence mapping lives in `strmforge-data`.
//! - Every status enum round-trips through `as_str`/`FromStr` because the
//!   stores persist them as lowercase text columns.

use anyhow::{Result, anyhow, bail};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use strmforge_events::RunStatus;

/// Library kind a task mirrors; steers downstream media-server grouping.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    /// Feature-film library.
    Movie,
    /// Episodic library.
    Tv,
}

impl MediaType {
    /// Render the media type as its lowercase string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Movie => "movie",
            Self::Tv => "tv",
        }
    }
}

impl FromStr for MediaType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "movie" => Ok(Self::Movie),
            "tv" => Ok(Self::Tv),
            other => Err(anyhow!("invalid media type '{other}'")),
        }
    }
}

/// How a run was started.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RunTrigger {
    /// Fired by the task's cron schedule.
    Cron,
    /// Requested through the API.
    Manual,
    /// Driven by a file-change or mount-change webhook.
    Webhook,
}

impl RunTrigger {
    /// Render the trigger as its lowercase string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Cron => "cron",
            Self::Manual => "manual",
            Self::Webhook => "webhook",
        }
    }
}

/// Category assigned to each produced artifact.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FileCategory {
    /// A `.strm` pointer produced from a media file.
    Main,
    /// A fetched metadata companion (nfo, artwork).
    Metadata,
    /// A fetched subtitle companion.
    Subtitle,
}

impl FileCategory {
    /// Render the category as its lowercase string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Main => "main",
            Self::Metadata => "metadata",
            Self::Subtitle => "subtitle",
        }
    }
}

impl FromStr for FileCategory {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "main" => Ok(Self::Main),
            "metadata" => Ok(Self::Metadata),
            "subtitle" => Ok(Self::Subtitle),
            other => Err(anyhow!("invalid file category '{other}'")),
        }
    }
}

/// Outcome recorded on a history row for one artifact.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingStatus {
    /// Artifact written (or fetched) successfully.
    Success,
    /// Artifact could not be produced; the row carries the error.
    Failed,
    /// Artifact intentionally not rewritten (unchanged or filtered).
    Skipped,
    /// Row created ahead of processing; transient.
    Pending,
}

impl ProcessingStatus {
    /// Render the status as its lowercase string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
            Self::Pending => "pending",
        }
    }
}

impl FromStr for ProcessingStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(Self::Success),
            "failed" => Ok(Self::Failed),
            "skipped" => Ok(Self::Skipped),
            "pending" => Ok(Self::Pending),
            other => Err(anyhow!("invalid processing status '{other}'")),
        }
    }
}

/// Delivery state of a queued notification.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NotificationStatus {
    /// Eligible for delivery (possibly waiting on `next_retry_at`).
    Pending,
    /// Claimed by the outbox worker; transient.
    Processing,
    /// Delivered successfully.
    Completed,
    /// Retry budget exhausted; terminal.
    Failed,
}

impl NotificationStatus {
    /// Render the status as its lowercase string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl FromStr for NotificationStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(anyhow!("invalid notification status '{other}'")),
        }
    }
}

/// Event kind a notification carries.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NotificationEvent {
    /// A run reached `completed`.
    TaskCompleted,
    /// A run reached `failed`.
    TaskFailed,
    /// A validation sweep found invalid pointer files.
    FileInvalid,
}

impl NotificationEvent {
    /// Render the event as its snake-case string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::TaskCompleted => "task_completed",
            Self::TaskFailed => "task_failed",
            Self::FileInvalid => "file_invalid",
        }
    }
}

impl FromStr for NotificationEvent {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "task_completed" => Ok(Self::TaskCompleted),
            "task_failed" => Ok(Self::TaskFailed),
            "file_invalid" => Ok(Self::FileInvalid),
            other => Err(anyhow!("invalid notification event '{other}'")),
        }
    }
}

/// Scope of a validation sweep.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ValidationType {
    /// Probe every main `.strm` history row.
    Full,
    /// Probe rows unchecked for seven days or never checked.
    Incremental,
    /// Probe a selection narrowed by [`ValidationConfig`].
    Manual,
}

impl ValidationType {
    /// Render the type as its lowercase string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Incremental => "incremental",
            Self::Manual => "manual",
        }
    }
}

impl FromStr for ValidationType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "full" => Ok(Self::Full),
            "incremental" => Ok(Self::Incremental),
            "manual" => Ok(Self::Manual),
            other => Err(anyhow!("invalid validation type '{other}'")),
        }
    }
}

/// Lifecycle state of a validation sweep.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ValidationStatus {
    /// Created but not yet admitted (single-flight gate pending).
    Pending,
    /// Probing in progress.
    Running,
    /// Sweep finished.
    Completed,
    /// Sweep aborted on an internal error.
    Failed,
    /// Sweep cancelled by an operator.
    Cancelled,
}

impl ValidationStatus {
    /// Render the status as its lowercase string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl FromStr for ValidationStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(anyhow!("invalid validation status '{other}'")),
        }
    }
}

/// Declarative sync job mirroring one remote subtree into a local library.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Task {
    /// Row identifier assigned on insert.
    pub id: i64,
    /// Display name shown in logs and notifications.
    pub name: String,
    /// Library kind the task feeds.
    pub media_type: MediaType,
    /// Remote absolute path to walk; always starts with `/`.
    pub source_path: String,
    /// Local filesystem root the pointers are written under.
    pub target_path: String,
    /// Comma-separated media extensions without a leading dot (`mp4,mkv`).
    pub file_suffix: String,
    /// Whether existing pointer files are rewritten unconditionally.
    pub overwrite: bool,
    /// Whether the task participates in scheduling and webhooks.
    pub enabled: bool,
    /// Optional cron expression driving scheduled runs.
    pub cron: Option<String>,
    /// Single-flight flag; true while a run is in flight.
    pub running: bool,
    /// Timestamp of the most recent run admission.
    pub last_run_at: Option<DateTime<Utc>>,
    /// Whether metadata companions are fetched alongside pointers.
    pub download_metadata: bool,
    /// Comma-separated metadata suffixes with a leading dot (`.nfo,.jpg`).
    pub metadata_extensions: Option<String>,
    /// Whether subtitle companions are fetched alongside pointers.
    pub download_subtitle: bool,
    /// Comma-separated subtitle suffixes with a leading dot (`.srt,.ass`).
    pub subtitle_extensions: Option<String>,
    /// Row creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last mutation timestamp.
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// Parsed media extension tokens, lowercased, without leading dots.
    #[must_use]
    pub fn suffix_list(&self) -> Vec<String> {
        split_tokens(&self.file_suffix)
    }

    /// Parsed metadata suffixes when companion fetching is enabled.
    #[must_use]
    pub fn metadata_suffixes(&self) -> Option<Vec<String>> {
        if !self.download_metadata {
            return None;
        }
        self.metadata_extensions.as_deref().map(split_tokens)
    }

    /// Parsed subtitle suffixes when companion fetching is enabled.
    #[must_use]
    pub fn subtitle_suffixes(&self) -> Option<Vec<String>> {
        if !self.download_subtitle {
            return None;
        }
        self.subtitle_extensions.as_deref().map(split_tokens)
    }
}

fn split_tokens(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|token| token.trim().to_ascii_lowercase())
        .filter(|token| !token.is_empty())
        .collect()
}

/// Payload accepted when creating or replacing a task.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewTask {
    /// Display name.
    pub name: String,
    /// Library kind.
    pub media_type: MediaType,
    /// Remote absolute path; must start with `/`.
    pub source_path: String,
    /// Local filesystem root.
    pub target_path: String,
    /// Comma-separated media extensions without a leading dot.
    pub file_suffix: String,
    /// Rewrite existing pointers unconditionally.
    #[serde(default)]
    pub overwrite: bool,
    /// Participate in scheduling and webhooks.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Optional cron expression.
    #[serde(default)]
    pub cron: Option<String>,
    /// Fetch metadata companions.
    #[serde(default)]
    pub download_metadata: bool,
    /// Metadata suffixes, dot-prefixed.
    #[serde(default)]
    pub metadata_extensions: Option<String>,
    /// Fetch subtitle companions.
    #[serde(default)]
    pub download_subtitle: bool,
    /// Subtitle suffixes, dot-prefixed.
    #[serde(default)]
    pub subtitle_extensions: Option<String>,
}

const fn default_enabled() -> bool {
    true
}

impl NewTask {
    /// Check the structural invariants before the task reaches a store.
    ///
    /// `file_suffix` entries must be dot-less tokens while the companion
    /// extension lists require the leading dot; the asymmetry is kept for
    /// compatibility with existing deployments.
    ///
    /// # Errors
    ///
    /// Returns an error naming the offending field when an invariant fails.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            bail!("task name must not be empty");
        }
        if !self.source_path.starts_with('/') {
            bail!("source_path must start with '/'");
        }
        if self.target_path.trim().is_empty() {
            bail!("target_path must not be empty");
        }

        let suffixes = split_tokens(&self.file_suffix);
        if suffixes.is_empty() {
            bail!("file_suffix must contain at least one extension");
        }
        for token in &suffixes {
            if token.starts_with('.') {
                bail!("file_suffix entry '{token}' must not carry a leading dot");
            }
        }

        for (field, raw) in [
            ("metadata_extensions", self.metadata_extensions.as_deref()),
            ("subtitle_extensions", self.subtitle_extensions.as_deref()),
        ] {
            if let Some(raw) = raw {
                for token in split_tokens(raw) {
                    if !token.starts_with('.') {
                        bail!("{field} entry '{token}' must carry a leading dot");
                    }
                }
            }
        }

        Ok(())
    }
}

/// One run of one task; exactly one row per execution.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaskLog {
    /// Row identifier assigned on insert.
    pub id: i64,
    /// Task the run belongs to.
    pub task_id: i64,
    /// Current state of the run.
    pub status: RunStatus,
    /// Failure or completion detail.
    pub message: Option<String>,
    /// When the executor opened the run.
    pub start_time: DateTime<Utc>,
    /// When the run reached a terminal state; unset while running.
    pub end_time: Option<DateTime<Utc>>,
    /// Terminal duration in seconds.
    pub duration: Option<i64>,
    /// Main-eligible entries encountered.
    pub total_file: i64,
    /// Pointers written.
    pub generated_file: i64,
    /// Main entries skipped.
    pub skip_file: i64,
    /// Metadata companions encountered.
    pub metadata_count: i64,
    /// Subtitle companions encountered.
    pub subtitle_count: i64,
    /// Entries that recorded a failure.
    pub failed_count: i64,
}

/// One row per produced artifact.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileHistory {
    /// Row identifier assigned on insert.
    pub id: i64,
    /// Task the artifact belongs to.
    pub task_id: i64,
    /// Run that produced the artifact, when known.
    pub task_log_id: Option<i64>,
    /// Remote file name the artifact was derived from.
    pub file_name: String,
    /// Remote directory of the origin file.
    pub source_path: String,
    /// Rendered playback URL written into the pointer.
    pub source_url: Option<String>,
    /// Local path actually written.
    pub target_file_path: String,
    /// Remote size in bytes.
    pub file_size: i64,
    /// Remote type label reported by the origin, when any.
    pub file_type: Option<String>,
    /// Extension of the produced artifact without a leading dot.
    pub file_suffix: String,
    /// Artifact category.
    pub file_category: FileCategory,
    /// Whether the row is the pointer row companions link against.
    pub is_main_file: bool,
    /// Owning pointer row for companion artifacts.
    pub main_file_id: Option<i64>,
    /// Lowercase hex SHA-256 of the written bytes; drives no-op skips.
    pub hash: Option<String>,
    /// Probe verdict; unset until a validation sweep checks the row.
    pub is_valid: Option<bool>,
    /// When the row was last probed.
    pub last_checked_at: Option<DateTime<Utc>>,
    /// Probe failure detail.
    pub validation_message: Option<String>,
    /// Outcome of producing the artifact.
    pub processing_status: ProcessingStatus,
    /// Row creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last mutation timestamp.
    pub updated_at: DateTime<Utc>,
}

/// Insert payload for a history row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewFileHistory {
    /// Task the artifact belongs to.
    pub task_id: i64,
    /// Run that produced the artifact.
    pub task_log_id: Option<i64>,
    /// Remote file name.
    pub file_name: String,
    /// Remote directory of the origin file.
    pub source_path: String,
    /// Rendered playback URL, for pointer rows.
    pub source_url: Option<String>,
    /// Local path written.
    pub target_file_path: String,
    /// Remote size in bytes.
    pub file_size: i64,
    /// Remote type label, when reported.
    pub file_type: Option<String>,
    /// Extension of the produced artifact.
    pub file_suffix: String,
    /// Artifact category.
    pub file_category: FileCategory,
    /// Owning pointer row for companions; must be unset for pointers.
    pub main_file_id: Option<i64>,
    /// Content fingerprint of the written bytes.
    pub hash: Option<String>,
    /// Outcome of producing the artifact.
    pub processing_status: ProcessingStatus,
}

/// Queued notification awaiting delivery by the outbox worker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NotificationQueueItem {
    /// Row identifier assigned on insert.
    pub id: i64,
    /// Delivery channel key (`telegram`, `wework`, `emby`, ...).
    pub channel: String,
    /// Event the payload describes.
    pub event: NotificationEvent,
    /// Opaque JSON payload rendered through the channel template.
    pub payload: String,
    /// Delivery state.
    pub status: NotificationStatus,
    /// Delivery ordering; lower is earlier, 1..=10.
    pub priority: i64,
    /// Failed attempts so far.
    pub retry_count: i64,
    /// Retry budget; the item is attempted at most `max_retries + 1` times.
    pub max_retries: i64,
    /// Earliest next attempt for a previously failed item.
    pub next_retry_at: Option<DateTime<Utc>>,
    /// When delivery succeeded.
    pub processed_at: Option<DateTime<Utc>>,
    /// Detail of the most recent delivery failure.
    pub error_message: Option<String>,
    /// Row creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last mutation timestamp.
    pub updated_at: DateTime<Utc>,
}

/// Background sweep probing historical pointer files against the origin.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ValidationTask {
    /// Row identifier assigned on insert.
    pub id: i64,
    /// Selection scope.
    pub validation_type: ValidationType,
    /// Lifecycle state.
    pub status: ValidationStatus,
    /// Rows selected for probing.
    pub total_files: i64,
    /// Rows probed so far.
    pub processed_files: i64,
    /// Rows whose URL answered 2xx/3xx.
    pub valid_files: i64,
    /// Rows that failed the probe.
    pub invalid_files: i64,
    /// Whole-percent progress, `floor(processed / total * 100)`.
    pub progress: i64,
    /// When probing started.
    pub started_at: Option<DateTime<Utc>>,
    /// When the sweep reached a terminal state.
    pub completed_at: Option<DateTime<Utc>>,
    /// Raw JSON narrowing config for manual sweeps.
    pub config: Option<String>,
    /// Completion or failure summary.
    pub message: Option<String>,
    /// Row creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// Narrowing options honoured by manual validation sweeps.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ValidationConfig {
    /// Restrict probing to one task's rows.
    #[serde(default)]
    pub task_id: Option<i64>,
    /// Restrict probing to targets under this path prefix.
    #[serde(default)]
    pub path_prefix: Option<String>,
}

/// Aggregation window for task statistics.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TimeRange {
    /// Last 24 hours.
    Day,
    /// Last 31 days.
    Month,
    /// Last 366 days.
    Year,
}

impl TimeRange {
    /// Render the range as its lowercase string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Day => "day",
            Self::Month => "month",
            Self::Year => "year",
        }
    }

    /// Window length in seconds.
    #[must_use]
    pub const fn window_seconds(self) -> i64 {
        match self {
            Self::Day => 86_400,
            Self::Month => 31 * 86_400,
            Self::Year => 366 * 86_400,
        }
    }
}

impl FromStr for TimeRange {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "day" => Ok(Self::Day),
            "month" => Ok(Self::Month),
            "year" => Ok(Self::Year),
            other => Err(anyhow!("invalid time range '{other}'")),
        }
    }
}

/// Aggregated run statistics over a [`TimeRange`].
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaskStats {
    /// Runs that reached any terminal state inside the window.
    pub total_runs: i64,
    /// Runs that completed.
    pub completed_runs: i64,
    /// Runs that failed.
    pub failed_runs: i64,
    /// Runs that were cancelled.
    pub cancelled_runs: i64,
    /// Pointers written inside the window.
    pub generated_files: i64,
    /// Main entries skipped inside the window.
    pub skipped_files: i64,
    /// Per-entry failures inside the window.
    pub failed_files: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_new_task() -> NewTask {
        NewTask {
            name: "movies".to_string(),
            media_type: MediaType::Movie,
            source_path: "/movies".to_string(),
            target_path: "/library/movies".to_string(),
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

    #[test]
    fn status_enums_round_trip() {
        for (text, value) in [
            ("movie", MediaType::Movie),
            ("tv", MediaType::Tv),
        ] {
            assert_eq!(text.parse::<MediaType>().unwrap(), value);
            assert_eq!(value.as_str(), text);
        }

        for (text, value) in [
            ("pending", NotificationStatus::Pending),
            ("processing", NotificationStatus::Processing),
            ("completed", NotificationStatus::Completed),
            ("failed", NotificationStatus::Failed),
        ] {
            assert_eq!(text.parse::<NotificationStatus>().unwrap(), value);
            assert_eq!(value.as_str(), text);
        }

        for (text, value) in [
            ("full", ValidationType::Full),
            ("incremental", ValidationType::Incremental),
            ("manual", ValidationType::Manual),
        ] {
            assert_eq!(text.parse::<ValidationType>().unwrap(), value);
            assert_eq!(value.as_str(), text);
        }

        assert!("torrent".parse::<MediaType>().is_err());
        assert!("retrying".parse::<NotificationStatus>().is_err());
    }

    #[test]
    fn new_task_validation_accepts_sane_payloads() {
        sample_new_task().validate().expect("valid task");
    }

    #[test]
    fn new_task_validation_rejects_relative_source() {
        let mut task = sample_new_task();
        task.source_path = "movies".to_string();
        assert!(task.validate().is_err());
    }

    #[test]
    fn new_task_validation_rejects_dotted_media_suffix() {
        let mut task = sample_new_task();
        task.file_suffix = ".mp4,mkv".to_string();
        let error = task.validate().expect_err("leading dot must be rejected");
        assert!(error.to_string().contains("leading dot"));
    }

    #[test]
    fn new_task_validation_requires_dotted_companion_suffixes() {
        let mut task = sample_new_task();
        task.download_metadata = true;
        task.metadata_extensions = Some("nfo,.jpg".to_string());
        assert!(task.validate().is_err());

        task.metadata_extensions = Some(".nfo,.jpg".to_string());
        task.validate().expect("dotted companion suffixes pass");
    }

    #[test]
    fn new_task_validation_rejects_empty_suffix_list() {
        let mut task = sample_new_task();
        task.file_suffix = " , ".to_string();
        assert!(task.validate().is_err());
    }

    #[test]
    fn suffix_lists_parse_and_normalise() {
        let mut task = sample_new_task();
        task.file_suffix = "MP4, mkv ,".to_string();
        task.download_subtitle = true;
        task.subtitle_extensions = Some(".SRT,.ass".to_string());

        let task = Task {
            id: 1,
            name: task.name,
            media_type: task.media_type,
            source_path: task.source_path,
            target_path: task.target_path,
            file_suffix: task.file_suffix,
            overwrite: task.overwrite,
            enabled: task.enabled,
            cron: task.cron,
            running: false,
            last_run_at: None,
            download_metadata: task.download_metadata,
            metadata_extensions: task.metadata_extensions,
            download_subtitle: task.download_subtitle,
            subtitle_extensions: task.subtitle_extensions,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        assert_eq!(task.suffix_list(), vec!["mp4", "mkv"]);
        assert_eq!(
            task.subtitle_suffixes().unwrap(),
            vec![".srt".to_string(), ".ass".to_string()]
        );
        assert!(task.metadata_suffixes().is_none(), "fetch disabled");
    }

    #[test]
    fn time_range_windows_are_ordered() {
        assert!(TimeRange::Day.window_seconds() < TimeRange::Month.window_seconds());
        assert!(TimeRange::Month.window_seconds() < TimeRange::Year.window_seconds());
        assert_eq!("month".parse::<TimeRange>().unwrap(), TimeRange::Month);
    }
}
