//! The polling outbox worker.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use strmforge_config::{QUEUE_SETTINGS_KEY, QueueSettings};
use strmforge_core::NotificationQueueItem;
use strmforge_data::{NotificationStore, SettingsStore};
use strmforge_telemetry::Metrics;

use crate::channel::ChannelProvider;
use crate::error::NotifyError;

/// Single delivery worker per process; claims eligible queue rows on a
/// bounded cadence and walks each through its channel sender.
pub struct OutboxWorker {
    store: NotificationStore,
    settings: SettingsStore,
    provider: Arc<dyn ChannelProvider>,
    metrics: Option<Metrics>,
}

impl OutboxWorker {
    /// Construct a worker over the queue store and a channel provider.
    #[must_use]
    pub fn new(
        store: NotificationStore,
        settings: SettingsStore,
        provider: Arc<dyn ChannelProvider>,
    ) -> Self {
        Self {
            store,
            settings,
            provider,
            metrics: None,
        }
    }

    /// Attach a metrics registry recording delivery outcomes.
    #[must_use]
    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Spawn the polling loop; it finishes its current batch and exits when
    /// `cancel` fires.
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!("outbox worker started");
            loop {
                let queue = self.queue_settings().await;
                let sleep = Duration::from_secs(queue.poll_interval_secs.max(1));
                tokio::select! {
                    () = cancel.cancelled() => break,
                    () = tokio::time::sleep(sleep) => {
                        match self.drain_once(Utc::now()).await {
                            Ok(0) => {}
                            Ok(processed) => debug!(processed, "outbox batch drained"),
                            Err(err) => warn!(error = %err, "outbox batch failed"),
                        }
                    }
                }
            }
            info!("outbox worker stopped");
        })
    }

    /// Claim and deliver one batch of eligible rows; returns how many rows
    /// were attempted.
    ///
    /// # Errors
    ///
    /// Returns an error when the queue store fails; per-row delivery
    /// failures stay on the row.
    pub async fn drain_once(&self, now: DateTime<Utc>) -> Result<usize, NotifyError> {
        let queue = self.queue_settings().await;
        let claimed = self.store.claim_due(now, queue.batch_size).await?;
        if claimed.is_empty() {
            return Ok(0);
        }

        let channels = match self.provider.channels().await {
            Ok(channels) => channels,
            Err(err) => {
                // Rows stay claimable: release every claim back to pending.
                for item in &claimed {
                    self.store
                        .retry_later(item.id, &format!("channel assembly failed: {err:#}"), now)
                        .await?;
                }
                return Ok(claimed.len());
            }
        };

        let attempted = claimed.len();
        for item in claimed {
            let channel = channels.get(&item.channel).cloned();
            let outcome = match channel {
                Some(channel) => match parse_payload(&item) {
                    Ok(payload) => channel
                        .deliver(item.event, &payload)
                        .await
                        .map_err(|err| format!("{err:#}")),
                    Err(detail) => Err(detail),
                },
                None => Err(format!("channel '{}' is not configured", item.channel)),
            };

            match outcome {
                Ok(()) => {
                    self.store.complete(item.id).await?;
                    self.record_delivery(&item.channel, "completed");
                    debug!(id = item.id, channel = %item.channel, "notification delivered");
                }
                Err(detail) => {
                    self.record_delivery(&item.channel, "failed");
                    if item.retry_count < item.max_retries {
                        let next_retry =
                            now + chrono::Duration::seconds(
                                i64::try_from(queue.retry_interval_secs).unwrap_or(300),
                            );
                        warn!(
                            id = item.id,
                            channel = %item.channel,
                            retry_count = item.retry_count + 1,
                            detail = %detail,
                            "delivery failed; scheduled retry"
                        );
                        self.store.retry_later(item.id, &detail, next_retry).await?;
                    } else {
                        warn!(
                            id = item.id,
                            channel = %item.channel,
                            detail = %detail,
                            "delivery failed terminally"
                        );
                        self.store.fail(item.id, &detail).await?;
                    }
                }
            }
        }
        Ok(attempted)
    }

    async fn queue_settings(&self) -> QueueSettings {
        match self.settings.get::<QueueSettings>(QUEUE_SETTINGS_KEY).await {
            Ok(Some(queue)) => queue,
            Ok(None) => QueueSettings::default(),
            Err(err) => {
                warn!(error = %err, "queue settings unreadable; using defaults");
                QueueSettings::default()
            }
        }
    }

    fn record_delivery(&self, channel: &str, outcome: &str) {
        if let Some(metrics) = &self.metrics {
            metrics.inc_outbox_delivery(channel, outcome);
        }
    }
}

fn parse_payload(item: &NotificationQueueItem) -> Result<Map<String, Value>, String> {
    match serde_json::from_str::<Value>(&item.payload) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(format!("payload is not a JSON object: {other}")),
        Err(err) => Err(format!("payload does not parse: {err}")),
    }
}
