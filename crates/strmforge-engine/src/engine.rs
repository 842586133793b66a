//! The executor: a bounded worker pool draining run requests with per-task
//! single flight.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::{Semaphore, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use strmforge_config::{ORIGIN_SETTINGS_KEY, OriginSettings, STRM_SETTINGS_KEY, StrmSettings};
use strmforge_core::{FileChangeEvent, OriginClient, RunTrigger, Task, TaskStats, TimeRange};
use strmforge_data::{
    HistoryStore, SettingsStore, SystemLogStore, TaskLogStore, TaskStore,
};
use strmforge_events::{Event, EventBus, RunCounters, RunStatus, RunSummary};
use strmforge_generator::StrmGenerator;
use strmforge_origin::AlistClient;
use strmforge_telemetry::Metrics;

use crate::error::EngineError;

const QUEUE_CAPACITY: usize = 64;
const LOCK_WAIT: Duration = Duration::from_millis(500);

struct RunRequest {
    task_id: i64,
    #[allow(dead_code)]
    trigger: RunTrigger,
    file_event: Option<FileChangeEvent>,
}

/// Stores and shared services the engine runs against.
pub struct EngineDeps {
    /// Task registry.
    pub tasks: TaskStore,
    /// Run-record store.
    pub logs: TaskLogStore,
    /// Artifact history store.
    pub history: HistoryStore,
    /// Runtime settings store.
    pub settings: SettingsStore,
    /// System log store.
    pub system: SystemLogStore,
    /// Shared event bus.
    pub events: EventBus,
}

/// Construction knobs for the executor.
pub struct EngineOptions {
    /// Concurrent run slots; one serialises all runs.
    pub workers: usize,
    /// Metrics registry, when metrics are wired.
    pub metrics: Option<Metrics>,
    /// Fixed origin used instead of settings-built clients; test seam.
    pub origin_override: Option<Arc<dyn OriginClient>>,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            workers: 1,
            metrics: None,
            origin_override: None,
        }
    }
}

struct EngineInner {
    tasks: TaskStore,
    logs: TaskLogStore,
    history: HistoryStore,
    settings: SettingsStore,
    system: SystemLogStore,
    events: EventBus,
    metrics: Option<Metrics>,
    origin_override: Option<Arc<dyn OriginClient>>,
    tx: mpsc::Sender<RunRequest>,
    pending: Mutex<HashSet<i64>>,
    cancels: Mutex<HashMap<i64, CancellationToken>>,
    shutdown: CancellationToken,
}

/// Handle to the running executor.
#[derive(Clone)]
pub struct TaskEngine {
    inner: Arc<EngineInner>,
}

impl TaskEngine {
    /// Start the executor pool and return its handle.
    #[must_use]
    pub fn start(deps: EngineDeps, options: EngineOptions) -> Self {
        let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
        let inner = Arc::new(EngineInner {
            tasks: deps.tasks,
            logs: deps.logs,
            history: deps.history,
            settings: deps.settings,
            system: deps.system,
            events: deps.events,
            metrics: options.metrics,
            origin_override: options.origin_override,
            tx,
            pending: Mutex::new(HashSet::new()),
            cancels: Mutex::new(HashMap::new()),
            shutdown: CancellationToken::new(),
        });
        spawn_dispatcher(inner.clone(), rx, options.workers.max(1));
        Self { inner }
    }

    /// Reconcile persisted run state after a restart: stuck running flags
    /// drop and dangling run records close as failed.
    ///
    /// # Errors
    ///
    /// Returns an error when the registry update fails.
    pub async fn reconcile(&self) -> Result<u64, EngineError> {
        let reset = self.inner.tasks.reset_runs().await?;
        if reset > 0 {
            info!(reset, "recovered stuck run state at startup");
        }
        Ok(reset)
    }

    /// Queue a full run of one task.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::AlreadyQueued`] / [`EngineError::AlreadyRunning`]
    /// when the task already has work in flight, [`EngineError::NotFound`]
    /// when it does not exist.
    pub async fn trigger(&self, task_id: i64, trigger: RunTrigger) -> Result<(), EngineError> {
        let task = self
            .inner
            .tasks
            .get(task_id)
            .await?
            .ok_or(EngineError::NotFound { task_id })?;
        if task.running {
            return Err(EngineError::AlreadyRunning { task_id });
        }
        {
            let mut pending = lock(&self.inner.pending);
            if !pending.insert(task_id) {
                return Err(EngineError::AlreadyQueued { task_id });
            }
        }
        let sent = self
            .inner
            .tx
            .send(RunRequest {
                task_id,
                trigger,
                file_event: None,
            })
            .await;
        if sent.is_err() {
            lock(&self.inner.pending).remove(&task_id);
            return Err(EngineError::QueueClosed);
        }
        self.update_queue_depth();
        debug!(task_id, trigger = trigger.as_str(), "run queued");
        Ok(())
    }

    /// Queue a single-entry change for one task; serialises with full runs
    /// instead of being dropped.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NotFound`] when the task does not exist or
    /// [`EngineError::QueueClosed`] during shutdown.
    pub async fn trigger_event(
        &self,
        task_id: i64,
        event: FileChangeEvent,
    ) -> Result<(), EngineError> {
        if self.inner.tasks.get(task_id).await?.is_none() {
            return Err(EngineError::NotFound { task_id });
        }
        self.inner
            .tx
            .send(RunRequest {
                task_id,
                trigger: RunTrigger::Webhook,
                file_event: Some(event),
            })
            .await
            .map_err(|_| EngineError::QueueClosed)?;
        self.update_queue_depth();
        Ok(())
    }

    /// Cancel an in-flight run; returns whether one was cancelled.
    #[must_use]
    pub fn cancel(&self, task_id: i64) -> bool {
        let cancels = lock(&self.inner.cancels);
        cancels.get(&task_id).is_some_and(|token| {
            token.cancel();
            true
        })
    }

    /// Aggregate run statistics over one window.
    ///
    /// # Errors
    ///
    /// Returns an error when the query fails.
    pub async fn stats(&self, range: TimeRange) -> Result<TaskStats, EngineError> {
        Ok(self.inner.tasks.stats(range).await?)
    }

    /// Begin a graceful shutdown: in-flight runs are cancelled and no new
    /// requests are accepted.
    pub fn shutdown(&self) {
        self.inner.shutdown.cancel();
        let cancels = lock(&self.inner.cancels);
        for token in cancels.values() {
            token.cancel();
        }
    }

    fn update_queue_depth(&self) {
        if let Some(metrics) = &self.inner.metrics {
            let depth = QUEUE_CAPACITY - self.inner.tx.capacity();
            metrics.set_queue_depth(i64::try_from(depth).unwrap_or(i64::MAX));
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            error!("engine mutex poisoned; continuing with recovered guard");
            poisoned.into_inner()
        }
    }
}

fn spawn_dispatcher(inner: Arc<EngineInner>, mut rx: mpsc::Receiver<RunRequest>, workers: usize) {
    tokio::spawn(async move {
        let slots = Arc::new(Semaphore::new(workers));
        info!(workers, "executor started");
        loop {
            tokio::select! {
                () = inner.shutdown.cancelled() => break,
                request = rx.recv() => {
                    let Some(request) = request else { break };
                    let Ok(permit) = slots.clone().acquire_owned().await else { break };
                    let inner = inner.clone();
                    tokio::spawn(async move {
                        execute(&inner, request).await;
                        drop(permit);
                    });
                }
            }
        }
        info!("executor stopped");
    });
}

async fn execute(inner: &EngineInner, request: RunRequest) {
    let task_id = request.task_id;
    lock(&inner.pending).remove(&task_id);

    let admitted = match acquire(inner, &request).await {
        Ok(admitted) => admitted,
        Err(err) => {
            warn!(task_id, error = %err, "run admission failed");
            return;
        }
    };
    if !admitted {
        debug!(task_id, "run dropped; task already running");
        return;
    }

    if let Err(err) = run_admitted(inner, &request).await {
        error!(task_id, error = %err, "run bookkeeping failed");
    }

    if let Err(err) = inner.tasks.release_run(task_id).await {
        error!(task_id, error = %err, "failed to release run flag");
    }
    lock(&inner.cancels).remove(&task_id);
}

async fn acquire(inner: &EngineInner, request: &RunRequest) -> Result<bool, EngineError> {
    if inner.tasks.acquire_run(request.task_id).await? {
        return Ok(true);
    }
    // Webhook-delivered changes serialise behind the current run instead of
    // being dropped.
    if request.file_event.is_none() {
        return Ok(false);
    }
    loop {
        tokio::select! {
            () = inner.shutdown.cancelled() => return Ok(false),
            () = tokio::time::sleep(LOCK_WAIT) => {
                if inner.tasks.acquire_run(request.task_id).await? {
                    return Ok(true);
                }
            }
        }
    }
}

async fn run_admitted(inner: &EngineInner, request: &RunRequest) -> Result<(), EngineError> {
    let task_id = request.task_id;
    let Some(task) = inner.tasks.get(task_id).await? else {
        return Err(EngineError::NotFound { task_id });
    };

    let task_log_id = inner.logs.open(task_id).await?;
    let _ = inner.events.publish(Event::RunStarted {
        task_id,
        task_log_id,
        task_name: task.name.clone(),
    });
    if let Some(metrics) = &inner.metrics {
        metrics.inc_running_tasks();
        metrics.inc_event("run_started");
    }

    let cancel = inner.shutdown.child_token();
    lock(&inner.cancels).insert(task_id, cancel.clone());

    let summary = match build_generator(inner).await {
        Ok(generator) => match &request.file_event {
            Some(event) => generator.apply_file_event(&task, task_log_id, event).await,
            None => generator.run(&task, task_log_id, &cancel).await,
        },
        Err(detail) => {
            warn!(task_id, detail = %detail, "run failed before the walk started");
            failed_summary(&task, task_log_id, detail)
        }
    };

    inner
        .logs
        .close(
            task_log_id,
            summary.status,
            summary.error_message.as_deref(),
            &summary.counters,
        )
        .await?;

    if let Some(metrics) = &inner.metrics {
        metrics.dec_running_tasks();
        metrics.inc_run(summary.status.as_str());
    }

    let event = match summary.status {
        RunStatus::Failed => {
            let detail = summary
                .error_message
                .clone()
                .unwrap_or_else(|| "run failed".to_string());
            if let Err(err) = inner
                .system
                .record("error", "executor", &format!("task {task_id}: {detail}"))
                .await
            {
                warn!(error = %err, "failed to record system log row");
            }
            Event::RunFailed { summary }
        }
        RunStatus::Cancelled => Event::RunCancelled { summary },
        _ => Event::RunCompleted { summary },
    };
    if let Some(metrics) = &inner.metrics {
        metrics.inc_event(event.kind());
    }
    let _ = inner.events.publish(event);
    Ok(())
}

async fn build_generator(inner: &EngineInner) -> Result<StrmGenerator, String> {
    let strm = inner
        .settings
        .get::<StrmSettings>(STRM_SETTINGS_KEY)
        .await
        .map_err(|err| format!("strm settings unreadable: {err}"))?
        .unwrap_or_default();

    let origin: Arc<dyn OriginClient> = match &inner.origin_override {
        Some(origin) => origin.clone(),
        None => {
            let settings = inner
                .settings
                .get::<OriginSettings>(ORIGIN_SETTINGS_KEY)
                .await
                .map_err(|err| format!("origin settings unreadable: {err}"))?
                .ok_or_else(|| "origin settings are not configured".to_string())?;
            Arc::new(
                AlistClient::new(settings)
                    .map_err(|err| format!("origin client construction failed: {err}"))?,
            )
        }
    };

    let mut generator = StrmGenerator::new(origin, inner.history.clone(), strm);
    if let Some(metrics) = &inner.metrics {
        generator = generator.with_metrics(metrics.clone());
    }
    Ok(generator)
}

fn failed_summary(task: &Task, task_log_id: i64, detail: String) -> RunSummary {
    RunSummary {
        task_id: task.id,
        task_log_id,
        task_name: task.name.clone(),
        source_path: task.source_path.clone(),
        target_path: task.target_path.clone(),
        status: RunStatus::Failed,
        duration_seconds: 0,
        counters: RunCounters::default(),
        error_message: Some(detail),
    }
}
