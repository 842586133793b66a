//! Payload maps rendered through the channel templates.

use chrono::Utc;
use serde_json::{Map, Value, json};

use strmforge_events::RunSummary;

/// Build the template payload for a run summary.
#[must_use]
pub fn summary_payload(summary: &RunSummary) -> Map<String, Value> {
    let counters = &summary.counters;
    let mut payload = Map::new();
    payload.insert("TaskName".to_string(), json!(summary.task_name));
    payload.insert("EventTime".to_string(), json!(Utc::now().to_rfc3339()));
    payload.insert("Duration".to_string(), json!(summary.duration_seconds));
    payload.insert("Status".to_string(), json!(summary.status.as_str()));
    payload.insert("SourcePath".to_string(), json!(summary.source_path));
    payload.insert("TargetPath".to_string(), json!(summary.target_path));
    payload.insert("TotalFile".to_string(), json!(counters.total_file));
    payload.insert("GeneratedFile".to_string(), json!(counters.generated_file));
    payload.insert("SkipFile".to_string(), json!(counters.skip_file));
    payload.insert("OverwriteFile".to_string(), json!(counters.overwrite_file));
    payload.insert("FailedCount".to_string(), json!(counters.failed_count));
    payload.insert("MetadataCount".to_string(), json!(counters.metadata_count));
    payload.insert(
        "MetadataDownloaded".to_string(),
        json!(counters.metadata_downloaded),
    );
    payload.insert(
        "MetadataSkipped".to_string(),
        json!(counters.metadata_skipped),
    );
    payload.insert("SubtitleCount".to_string(), json!(counters.subtitle_count));
    payload.insert(
        "SubtitleDownloaded".to_string(),
        json!(counters.subtitle_downloaded),
    );
    payload.insert(
        "SubtitleSkipped".to_string(),
        json!(counters.subtitle_skipped),
    );
    payload.insert("OtherSkipped".to_string(), json!(counters.other_skipped));
    payload.insert(
        "ErrorMessage".to_string(),
        json!(summary.error_message.clone().unwrap_or_default()),
    );
    payload
}

/// Build the template payload for a validation outcome.
#[must_use]
pub fn validation_payload(
    total_files: u64,
    valid_files: u64,
    invalid_files: u64,
    main_reason: Option<&str>,
) -> Map<String, Value> {
    let mut payload = Map::new();
    payload.insert("EventTime".to_string(), json!(Utc::now().to_rfc3339()));
    payload.insert("TotalFiles".to_string(), json!(total_files));
    payload.insert("ValidFiles".to_string(), json!(valid_files));
    payload.insert("InvalidFiles".to_string(), json!(invalid_files));
    payload.insert(
        "MainReason".to_string(),
        json!(main_reason.unwrap_or_default()),
    );
    payload
}
