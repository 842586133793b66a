//! Bridge from the in-process event bus into durable queue rows.

use serde_json::{Map, Value};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use strmforge_core::NotificationEvent;
use strmforge_data::NotificationStore;
use strmforge_events::{Event, EventBus};

use crate::channel::{EMBY_CHANNEL, SettingsChannelProvider};
use crate::payload::{summary_payload, validation_payload};

// Failure notices jump ahead of routine completion notices.
const FAILURE_PRIORITY: i64 = 3;

/// Subscribes to the bus and enqueues one row per configured channel for
/// every notification-worthy event.
pub struct EventBridge {
    events: EventBus,
    store: NotificationStore,
    provider: SettingsChannelProvider,
}

impl EventBridge {
    /// Construct a bridge over the bus and the queue store.
    #[must_use]
    pub const fn new(
        events: EventBus,
        store: NotificationStore,
        provider: SettingsChannelProvider,
    ) -> Self {
        Self {
            events,
            store,
            provider,
        }
    }

    /// Spawn the bridge loop; exits when `cancel` fires or the bus closes.
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut stream = self.events.subscribe(None);
            info!("notification bridge started");
            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    envelope = stream.next() => {
                        let Some(envelope) = envelope else { break };
                        self.absorb(envelope.event).await;
                    }
                }
            }
            info!("notification bridge stopped");
        })
    }

    async fn absorb(&self, event: Event) {
        match event {
            Event::RunCompleted { summary } => {
                self.enqueue_for_channels(
                    NotificationEvent::TaskCompleted,
                    &summary_payload(&summary),
                    None,
                )
                .await;
            }
            Event::RunFailed { summary } => {
                self.enqueue_for_channels(
                    NotificationEvent::TaskFailed,
                    &summary_payload(&summary),
                    Some(FAILURE_PRIORITY),
                )
                .await;
            }
            Event::ValidationCompleted {
                total_files,
                valid_files,
                invalid_files,
                main_reason,
                ..
            } if invalid_files > 0 => {
                self.enqueue_for_channels(
                    NotificationEvent::FileInvalid,
                    &validation_payload(
                        total_files,
                        valid_files,
                        invalid_files,
                        main_reason.as_deref(),
                    ),
                    Some(FAILURE_PRIORITY),
                )
                .await;
            }
            _ => {}
        }
    }

    async fn enqueue_for_channels(
        &self,
        event: NotificationEvent,
        payload: &Map<String, Value>,
        priority: Option<i64>,
    ) {
        let kinds = match self.provider.configured_kinds().await {
            Ok(kinds) => kinds,
            Err(err) => {
                warn!(error = %err, "channel configuration unreadable; dropping notification");
                return;
            }
        };
        if kinds.is_empty() {
            return;
        }

        let rendered = Value::Object(payload.clone()).to_string();
        for kind in kinds {
            // Emby only consumes completion events; skip the rest up front.
            if kind == EMBY_CHANNEL && event != NotificationEvent::TaskCompleted {
                continue;
            }
            if let Err(err) = self
                .store
                .enqueue(&kind, event, &rendered, priority, None)
                .await
            {
                warn!(error = %err, channel = %kind, "failed to enqueue notification");
            }
        }
    }
}
