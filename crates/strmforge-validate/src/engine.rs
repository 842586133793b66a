//! The sweep worker and its admission gate.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{info, warn};
use url::Url;

use strmforge_config::{VALIDATION_SETTINGS_KEY, ValidationSettings};
use strmforge_core::{
    FileHistory, ValidationConfig, ValidationStatus, ValidationTask, ValidationType,
};
use strmforge_data::{HistoryStore, SettingsStore, ValidationSelection, ValidationStore};
use strmforge_events::{Event, EventBus};
use strmforge_telemetry::Metrics;

use crate::error::ValidationError;

const INCREMENTAL_WINDOW_DAYS: i64 = 7;
const PROGRESS_LOG_EVERY: i64 = 100;
const CANCEL_POLL_EVERY: i64 = 10;

const MISSING_FILE_MESSAGE: &str = "strm file missing";
const NO_URL_MESSAGE: &str = "no URL in strm";

struct Inner {
    store: ValidationStore,
    history: HistoryStore,
    settings: SettingsStore,
    events: EventBus,
    metrics: Option<Metrics>,
    http: reqwest::Client,
}

/// Handle admitting and tracking validation sweeps.
#[derive(Clone)]
pub struct ValidationEngine {
    inner: Arc<Inner>,
}

impl ValidationEngine {
    /// Construct an engine over the stores and the shared bus.
    ///
    /// The probe client never follows redirects so a literal 3xx answer
    /// counts as valid.
    #[must_use]
    pub fn new(
        store: ValidationStore,
        history: HistoryStore,
        settings: SettingsStore,
        events: EventBus,
    ) -> Self {
        let http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .unwrap_or_default();
        Self {
            inner: Arc::new(Inner {
                store,
                history,
                settings,
                events,
                metrics: None,
                http,
            }),
        }
    }

    /// Attach a metrics registry recording probe outcomes.
    ///
    /// # Panics
    ///
    /// Panics when called after the engine handle has been cloned.
    #[must_use]
    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        Arc::get_mut(&mut self.inner)
            .expect("configure the engine before sharing it")
            .metrics = Some(metrics);
        self
    }

    /// Admit a new sweep and spawn its worker.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::AlreadyRunning`] while another sweep is in
    /// flight.
    pub async fn start(
        &self,
        validation_type: ValidationType,
        config: Option<&ValidationConfig>,
    ) -> Result<ValidationTask, ValidationError> {
        let raw_config = config
            .map(|config| {
                serde_json::to_string(config)
                    .map_err(|err| ValidationError::Config(err.to_string()))
            })
            .transpose()?;

        let created = self
            .inner
            .store
            .create(validation_type, raw_config.as_deref())
            .await?;
        if !self.inner.store.try_start(created.id).await? {
            self.inner
                .store
                .finish(
                    created.id,
                    ValidationStatus::Cancelled,
                    Some("another sweep is already running"),
                )
                .await?;
            return Err(ValidationError::AlreadyRunning);
        }

        let inner = self.inner.clone();
        let id = created.id;
        tokio::spawn(async move {
            if let Err(err) = sweep(&inner, id).await {
                warn!(validation_id = id, error = %err, "validation sweep failed");
                let _ = inner
                    .store
                    .finish(id, ValidationStatus::Failed, Some(&err.to_string()))
                    .await;
            }
        });

        self.inner
            .store
            .get(id)
            .await?
            .ok_or(ValidationError::NotFound { id })
    }

    /// Request cancellation of one sweep; the worker stops at the next
    /// probe boundary.
    ///
    /// # Errors
    ///
    /// Returns an error when the store update fails.
    pub async fn cancel(&self, id: i64) -> Result<bool, ValidationError> {
        Ok(self.inner.store.cancel(id).await?)
    }

    /// Fetch one sweep.
    ///
    /// # Errors
    ///
    /// Returns an error when the query fails.
    pub async fn get(&self, id: i64) -> Result<Option<ValidationTask>, ValidationError> {
        Ok(self.inner.store.get(id).await?)
    }

    /// List recent sweeps.
    ///
    /// # Errors
    ///
    /// Returns an error when the query fails.
    pub async fn list(&self, limit: i64) -> Result<Vec<ValidationTask>, ValidationError> {
        Ok(self.inner.store.list(limit).await?)
    }

    /// Remove invalid artifacts from disk and their rows from history.
    ///
    /// # Errors
    ///
    /// Returns an error when the history store fails.
    pub async fn cleanup(&self) -> Result<crate::cleanup::CleanupReport, ValidationError> {
        crate::cleanup::run(&self.inner.history).await
    }
}

async fn sweep(inner: &Inner, id: i64) -> Result<(), ValidationError> {
    let task = inner
        .store
        .get(id)
        .await?
        .ok_or(ValidationError::NotFound { id })?;

    let selection = selection_for(&task)?;
    let rows = inner.history.select_for_validation(&selection).await?;
    let total = i64::try_from(rows.len()).unwrap_or(i64::MAX);
    inner.store.set_total(id, total).await?;
    let _ = inner.events.publish(Event::ValidationStarted {
        validation_id: id,
        total_files: u64::try_from(total).unwrap_or_default(),
    });
    info!(validation_id = id, total, "validation sweep started");

    let timeout = probe_timeout(inner).await;
    let mut processed = 0_i64;
    let mut valid = 0_i64;
    let mut invalid = 0_i64;
    let mut reasons: HashMap<String, u64> = HashMap::new();
    let mut cancelled = false;

    for row in &rows {
        if processed % CANCEL_POLL_EVERY == 0
            && let Some(current) = inner.store.get(id).await?
            && current.status == ValidationStatus::Cancelled
        {
            cancelled = true;
            break;
        }

        let started = std::time::Instant::now();
        let verdict = probe(inner, row, timeout).await;
        let elapsed_ms = started.elapsed().as_millis();

        match &verdict {
            Ok(()) => {
                valid += 1;
                record_probe(inner, "valid");
            }
            Err(reason) => {
                invalid += 1;
                *reasons.entry(reason.clone()).or_default() += 1;
                record_probe(inner, "invalid");
            }
        }
        let message = verdict.as_ref().err().map(String::as_str);
        if let Err(err) = inner
            .history
            .mark_validated(row.id, verdict.is_ok(), message)
            .await
        {
            warn!(row_id = row.id, error = %err, "failed to persist probe verdict");
        }

        processed += 1;
        let progress = if total == 0 {
            100
        } else {
            processed * 100 / total
        };
        inner
            .store
            .update_progress(id, processed, valid, invalid, progress)
            .await?;
        if processed % PROGRESS_LOG_EVERY == 0 {
            info!(
                validation_id = id,
                processed, total, valid, invalid, "validation sweep progress"
            );
        }
        tracing::debug!(row_id = row.id, elapsed_ms, "probe finished");
    }

    if cancelled {
        info!(validation_id = id, processed, "validation sweep cancelled");
        return Ok(());
    }

    if total == 0 {
        inner.store.update_progress(id, 0, 0, 0, 100).await?;
    }

    let main_reason = reasons
        .iter()
        .max_by_key(|(_, count)| **count)
        .map(|(reason, _)| reason.clone());
    let message = format!("{valid}/{processed} pointers valid");
    inner
        .store
        .finish(id, ValidationStatus::Completed, Some(&message))
        .await?;
    let _ = inner.events.publish(Event::ValidationCompleted {
        validation_id: id,
        total_files: u64::try_from(total).unwrap_or_default(),
        valid_files: u64::try_from(valid).unwrap_or_default(),
        invalid_files: u64::try_from(invalid).unwrap_or_default(),
        main_reason,
    });
    info!(validation_id = id, valid, invalid, "validation sweep completed");
    Ok(())
}

fn selection_for(task: &ValidationTask) -> Result<ValidationSelection, ValidationError> {
    match task.validation_type {
        ValidationType::Full => Ok(ValidationSelection::default()),
        ValidationType::Incremental => Ok(ValidationSelection {
            checked_before: Some(Utc::now() - chrono::Duration::days(INCREMENTAL_WINDOW_DAYS)),
            ..ValidationSelection::default()
        }),
        ValidationType::Manual => {
            let config: ValidationConfig = match task.config.as_deref() {
                Some(raw) => serde_json::from_str(raw)
                    .map_err(|err| ValidationError::Config(err.to_string()))?,
                None => ValidationConfig::default(),
            };
            Ok(ValidationSelection {
                checked_before: None,
                task_id: config.task_id,
                path_prefix: config.path_prefix,
            })
        }
    }
}

async fn probe_timeout(inner: &Inner) -> Duration {
    let settings = match inner
        .settings
        .get::<ValidationSettings>(VALIDATION_SETTINGS_KEY)
        .await
    {
        Ok(Some(settings)) => settings,
        Ok(None) => ValidationSettings::default(),
        Err(err) => {
            warn!(error = %err, "validation settings unreadable; using defaults");
            ValidationSettings::default()
        }
    };
    Duration::from_secs(settings.timeout_secs.max(1))
}

async fn probe(inner: &Inner, row: &FileHistory, timeout: Duration) -> Result<(), String> {
    let path = Path::new(&row.target_file_path);
    if !path.exists() {
        return Err(MISSING_FILE_MESSAGE.to_string());
    }

    let content =
        std::fs::read_to_string(path).map_err(|_| MISSING_FILE_MESSAGE.to_string())?;
    let Some(line) = content
        .lines()
        .map(str::trim)
        .find(|line| line.starts_with("http://") || line.starts_with("https://"))
    else {
        return Err(NO_URL_MESSAGE.to_string());
    };

    let url = Url::parse(line).map_err(|err| format!("invalid URL: {err}"))?;

    let response = inner
        .http
        .head(url)
        .timeout(timeout)
        .send()
        .await
        .map_err(|err| format!("request failed: {err}"))?;
    let status = response.status();
    if status.is_success() || status.is_redirection() {
        Ok(())
    } else {
        Err(format!("status {}", status.as_u16()))
    }
}

fn record_probe(inner: &Inner, outcome: &str) {
    if let Some(metrics) = &inner.metrics {
        metrics.inc_validation_probe(outcome);
    }
}
