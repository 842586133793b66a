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

//! Core event bus for the strmforge platform.
//!
//! The bus provides a typed event enum, sequential identifiers, and support for
//! replaying recent events when subscribers reconnect. Internally it uses
//! `tokio::broadcast` with a bounded buffer; when the channel overflows, the
//! oldest events are dropped, matching the desired backpressure behaviour.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tokio::sync::broadcast::{Receiver, Sender};
use tracing::error;

/// Identifier assigned to each event emitted by the platform.
pub type EventId = u64;

/// Default buffer size for the in-memory replay ring.
const DEFAULT_REPLAY_CAPACITY: usize = 1_024;

/// Typed domain events surfaced across the system.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A sync run was admitted by the executor and opened a run record.
    RunStarted {
        /// Identifier of the task being executed.
        task_id: i64,
        /// Identifier of the run record opened for this execution.
        task_log_id: i64,
        /// Display name of the task.
        task_name: String,
    },
    /// A sync run finished with every directory listed and processed.
    RunCompleted {
        /// Final counters and timings for the run.
        summary: RunSummary,
    },
    /// A sync run aborted before completing its walk.
    RunFailed {
        /// Partial counters and the failure detail for the run.
        summary: RunSummary,
    },
    /// A sync run was cancelled by an operator or a shutdown.
    RunCancelled {
        /// Counters accumulated up to the cancellation point.
        summary: RunSummary,
    },
    /// A validation sweep started probing historical pointer files.
    ValidationStarted {
        /// Identifier of the validation task.
        validation_id: i64,
        /// Number of history rows selected for probing.
        total_files: u64,
    },
    /// A validation sweep finished probing its selection.
    ValidationCompleted {
        /// Identifier of the validation task.
        validation_id: i64,
        /// Number of history rows probed.
        total_files: u64,
        /// Rows whose playback URL answered 2xx/3xx.
        valid_files: u64,
        /// Rows that failed the probe.
        invalid_files: u64,
        /// Most frequent failure reason, when any probe failed.
        main_reason: Option<String>,
    },
    /// Runtime settings were updated.
    SettingsChanged {
        /// Description of the applied configuration change.
        description: String,
    },
    /// System health status changed (degraded or restored components).
    HealthChanged {
        /// Components currently considered degraded.
        degraded: Vec<String>,
    },
}

impl Event {
    /// Machine-friendly discriminator for log and queue consumers.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::RunStarted { .. } => "run_started",
            Self::RunCompleted { .. } => "run_completed",
            Self::RunFailed { .. } => "run_failed",
            Self::RunCancelled { .. } => "run_cancelled",
            Self::ValidationStarted { .. } => "validation_started",
            Self::ValidationCompleted { .. } => "validation_completed",
            Self::SettingsChanged { .. } => "settings_changed",
            Self::HealthChanged { .. } => "health_changed",
        }
    }
}

/// Metadata wrapper around events. Each envelope tracks the event id and
/// emission timestamp.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct EventEnvelope {
    /// Monotonic identifier assigned to the wrapped event.
    pub id: EventId,
    /// Timestamp recording when the envelope was produced.
    pub timestamp: DateTime<Utc>,
    /// Wrapped event payload.
    pub event: Event,
}

/// Terminal and transient states a sync run moves through.
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Run record is open and the walk is in progress.
    Running,
    /// Run finished with every listed entry accounted for.
    Completed,
    /// Run aborted on an unrecoverable error (origin listing failure).
    Failed,
    /// Run was cancelled; artifacts written so far remain on disk.
    Cancelled,
}

impl RunStatus {
    /// Render the status as its lowercase string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Whether the status is terminal for a run record.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Running)
    }
}

/// Per-run counters accumulated by the generator.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct RunCounters {
    /// Main-eligible entries encountered during the walk.
    pub total_file: u64,
    /// `.strm` pointers written this run.
    pub generated_file: u64,
    /// Main entries skipped (unchanged hash or under the size floor).
    pub skip_file: u64,
    /// Main entries that replaced an existing pointer under overwrite.
    pub overwrite_file: u64,
    /// Entries that recorded a per-file failure.
    pub failed_count: u64,
    /// Metadata companions encountered.
    pub metadata_count: u64,
    /// Metadata companions fetched to disk.
    pub metadata_downloaded: u64,
    /// Metadata companions skipped because the target already existed.
    pub metadata_skipped: u64,
    /// Subtitle companions encountered.
    pub subtitle_count: u64,
    /// Subtitle companions fetched to disk.
    pub subtitle_downloaded: u64,
    /// Subtitle companions skipped because the target already existed.
    pub subtitle_skipped: u64,
    /// Entries matching no configured category.
    pub other_skipped: u64,
}

/// Summary emitted when a run reaches a terminal state.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct RunSummary {
    /// Identifier of the task that ran.
    pub task_id: i64,
    /// Identifier of the run record.
    pub task_log_id: i64,
    /// Display name of the task.
    pub task_name: String,
    /// Remote path the run walked.
    pub source_path: String,
    /// Local root the run wrote under.
    pub target_path: String,
    /// Terminal state of the run.
    pub status: RunStatus,
    /// Wall-clock duration of the run in seconds.
    pub duration_seconds: i64,
    /// Counters accumulated during the run.
    pub counters: RunCounters,
    /// Failure or cancellation detail, when present.
    pub error_message: Option<String>,
}

/// Shared event bus built on top of `tokio::broadcast`.
#[derive(Clone)]
pub struct EventBus {
    sender: Sender<EventEnvelope>,
    buffer: Arc<Mutex<VecDeque<EventEnvelope>>>,
    next_id: Arc<std::sync::atomic::AtomicU64>,
    replay_capacity: usize,
}

impl EventBus {
    /// Construct a new bus with the provided broadcast capacity.
    ///
    /// The broadcast channel uses the same capacity as the in-memory replay
    /// buffer, ensuring dropped events impact both structures consistently.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        assert!(capacity > 0, "event bus capacity must be positive");
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            buffer: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            next_id: Arc::new(std::sync::atomic::AtomicU64::new(1)),
            replay_capacity: capacity,
        }
    }

    /// Construct a bus with the default in-memory buffer size.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_REPLAY_CAPACITY)
    }

    /// Publish a new event to the bus, assigning it a sequential identifier.
    ///
    /// # Panics
    ///
    /// Panics if the replay buffer mutex has been poisoned.
    #[must_use]
    pub fn publish(&self, event: Event) -> EventId {
        let id = self
            .next_id
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        let envelope = EventEnvelope {
            id,
            timestamp: Utc::now(),
            event,
        };

        {
            let mut buffer = self.lock_buffer();
            if buffer.len() == self.replay_capacity {
                buffer.pop_front();
            }
            buffer.push_back(envelope.clone());
        }

        let _ = self.sender.send(envelope);
        id
    }

    /// Subscribe to the bus, replaying any buffered events newer than `since_id`.
    ///
    /// # Panics
    ///
    /// Panics if the replay buffer mutex has been poisoned.
    #[must_use]
    pub fn subscribe(&self, since_id: Option<EventId>) -> EventStream {
        let mut backlog = VecDeque::new();
        if let Some(since) = since_id {
            let buffer = self.lock_buffer();
            for item in buffer.iter() {
                if item.id > since {
                    backlog.push_back(item.clone());
                }
            }
        }

        let receiver = self.sender.subscribe();
        EventStream { backlog, receiver }
    }

    /// Return a snapshot of buffered events newer than the supplied identifier.
    ///
    /// # Panics
    ///
    /// Panics if the replay buffer mutex has been poisoned.
    #[must_use]
    pub fn backlog_since(&self, since_id: EventId) -> Vec<EventEnvelope> {
        let buffer = self.lock_buffer();
        buffer
            .iter()
            .filter(|item| item.id > since_id)
            .cloned()
            .collect()
    }

    /// Returns the last assigned identifier, if any events have been published.
    ///
    /// # Panics
    ///
    /// Panics if the replay buffer mutex has been poisoned.
    #[must_use]
    pub fn last_event_id(&self) -> Option<EventId> {
        let buffer = self.lock_buffer();
        buffer.back().map(|event| event.id)
    }

    fn lock_buffer(&self) -> MutexGuard<'_, VecDeque<EventEnvelope>> {
        match self.buffer.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                error!("event buffer mutex poisoned; continuing with recovered guard");
                poisoned.into_inner()
            }
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Stream wrapper that yields events either from the replay backlog or from the
/// live broadcast channel.
pub struct EventStream {
    backlog: VecDeque<EventEnvelope>,
    receiver: Receiver<EventEnvelope>,
}

impl EventStream {
    /// Receive the next event, respecting the replay backlog first.
    pub async fn next(&mut self) -> Option<EventEnvelope> {
        if let Some(event) = self.backlog.pop_front() {
            return Some(event);
        }

        match self.receiver.recv().await {
            Ok(event) => Some(event),
            Err(broadcast::error::RecvError::Lagged(_)) => self.receiver.recv().await.ok(),
            Err(broadcast::error::RecvError::Closed) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::time::Duration;
    use tokio::task;
    use tokio::time::timeout;

    const PUBLISH_TIMEOUT: Duration = Duration::from_secs(1);

    fn sample_summary(task_id: i64, status: RunStatus) -> RunSummary {
        RunSummary {
            task_id,
            task_log_id: task_id * 10,
            task_name: format!("task-{task_id}"),
            source_path: "/movies".to_string(),
            target_path: "/library/movies".to_string(),
            status,
            duration_seconds: 4,
            counters: RunCounters {
                total_file: 3,
                generated_file: 3,
                ..RunCounters::default()
            },
            error_message: None,
        }
    }

    #[test]
    fn event_kinds_cover_all_variants() {
        let events = [
            Event::RunStarted {
                task_id: 1,
                task_log_id: 10,
                task_name: "movies".to_string(),
            },
            Event::RunCompleted {
                summary: sample_summary(1, RunStatus::Completed),
            },
            Event::RunFailed {
                summary: sample_summary(2, RunStatus::Failed),
            },
            Event::RunCancelled {
                summary: sample_summary(3, RunStatus::Cancelled),
            },
            Event::ValidationStarted {
                validation_id: 7,
                total_files: 10,
            },
            Event::ValidationCompleted {
                validation_id: 7,
                total_files: 10,
                valid_files: 7,
                invalid_files: 3,
                main_reason: Some("status 404".to_string()),
            },
            Event::SettingsChanged {
                description: "origin updated".to_string(),
            },
            Event::HealthChanged {
                degraded: vec!["outbox".to_string()],
            },
        ];

        let expected = [
            "run_started",
            "run_completed",
            "run_failed",
            "run_cancelled",
            "validation_started",
            "validation_completed",
            "settings_changed",
            "health_changed",
        ];
        for (event, kind) in events.iter().zip(expected) {
            assert_eq!(event.kind(), kind);
        }
    }

    #[test]
    fn run_status_strings_round_trip_terminality() {
        assert_eq!(RunStatus::Running.as_str(), "running");
        assert!(!RunStatus::Running.is_terminal());
        for status in [RunStatus::Completed, RunStatus::Failed, RunStatus::Cancelled] {
            assert!(status.is_terminal());
        }
    }

    fn sample_progress_event(id: usize) -> Event {
        Event::RunStarted {
            task_id: i64::try_from(id).unwrap_or(0) + 1,
            task_log_id: i64::try_from(id).unwrap_or(0) + 100,
            task_name: format!("task-{id}"),
        }
    }

    #[tokio::test]
    async fn sequential_ids_and_replay() {
        let bus = EventBus::with_capacity(16);

        let mut last_id = 0;
        for i in 0..5 {
            last_id = bus.publish(sample_progress_event(i));
        }
        assert_eq!(last_id, 5);

        let mut stream = bus.subscribe(Some(2));
        let mut received = Vec::new();
        for _ in 0..3 {
            if let Some(event) = stream.next().await {
                received.push(event);
            }
        }

        assert_eq!(received.len(), 3);
        assert_eq!(received.first().unwrap().id, 3);
        assert_eq!(received.last().unwrap().id, 5);
    }

    #[tokio::test]
    async fn load_test_does_not_stall_publishers() {
        let bus = Arc::new(EventBus::with_capacity(512));
        let mut stream = bus.subscribe(None);

        let publisher = {
            let bus = bus.clone();
            task::spawn(async move {
                for i in 0..500 {
                    let publish_bus = bus.clone();
                    timeout(PUBLISH_TIMEOUT, async move {
                        let _ = publish_bus.publish(sample_progress_event(i));
                    })
                    .await
                    .expect("publish timed out");
                }
            })
        };

        let consumer = task::spawn(async move {
            let mut ids = HashSet::new();
            while ids.len() < 500 {
                if let Some(event) = stream.next().await {
                    ids.insert(event.id);
                }
            }
            ids
        });

        publisher.await.expect("publisher task panicked");
        let ids = consumer.await.expect("consumer task panicked");
        assert_eq!(ids.len(), 500);
    }

    #[tokio::test]
    async fn last_event_id_reflects_recent_publish() {
        let bus = EventBus::with_capacity(2);
        assert!(bus.last_event_id().is_none(), "no events published yet");
        let published = bus.publish(sample_progress_event(0));
        assert_eq!(bus.last_event_id(), Some(published));
    }

    #[tokio::test]
    async fn subscribe_without_since_replays_all() {
        let bus = EventBus::with_capacity(4);
        for i in 0..3 {
            let _ = bus.publish(sample_progress_event(i));
        }
        let mut stream = bus.subscribe(Some(0));
        let mut collected = Vec::new();
        for expected_id in 1..=3 {
            collected.push(
                timeout(PUBLISH_TIMEOUT, stream.next())
                    .await
                    .expect("stream stalled")
                    .expect("stream closed"),
            );
            assert_eq!(collected.last().unwrap().id, expected_id);
        }
        assert_eq!(collected.len(), 3);
    }

    #[tokio::test]
    async fn stream_returns_none_after_sender_dropped() {
        let mut stream = {
            let bus = EventBus::with_capacity(1);
            let stream = bus.subscribe(None);
            drop(bus);
            stream
        };
        assert!(
            stream.next().await.is_none(),
            "closing the sender should end the stream"
        );
    }
}
