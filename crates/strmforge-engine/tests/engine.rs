//! Executor integration tests over a temp SQLite registry and a scripted
//! origin.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::time::timeout;

use strmforge_core::{
    FileChangeEvent, FileEventKind, OriginClient, RemoteEntry, RunTrigger, Task,
};
use strmforge_data::{
    HistoryStore, SettingsStore, SystemLogStore, TaskLogStore, TaskStore,
};
use strmforge_engine::{EngineDeps, EngineError, EngineOptions, TaskEngine, WebhookDispatcher};
use strmforge_events::{Event, EventBus, RunStatus};
use strmforge_test_support::{ScriptedOrigin, sample_task, temp_database};

const MB: u64 = 1024 * 1024;
const WAIT: Duration = Duration::from_secs(10);

struct Fixture {
    tasks: TaskStore,
    logs: TaskLogStore,
    events: EventBus,
    _db: strmforge_test_support::TestDatabase,
    out: tempfile::TempDir,
}

async fn fixture() -> Fixture {
    let db = temp_database().await;
    Fixture {
        tasks: TaskStore::new(db.database.pool().clone()),
        logs: TaskLogStore::new(db.database.pool().clone()),
        events: EventBus::new(),
        _db: db,
        out: tempfile::tempdir().expect("output dir"),
    }
}

impl Fixture {
    fn deps(&self) -> EngineDeps {
        let pool = self.tasks_pool();
        EngineDeps {
            tasks: self.tasks.clone(),
            logs: self.logs.clone(),
            history: HistoryStore::new(pool.clone()),
            settings: SettingsStore::new(pool.clone()),
            system: SystemLogStore::new(pool),
            events: self.events.clone(),
        }
    }

    fn tasks_pool(&self) -> sqlx::AnyPool {
        self._db.database.pool().clone()
    }

    async fn create_task(&self) -> Task {
        self.tasks
            .create(&sample_task(&self.out.path().to_string_lossy()))
            .await
            .expect("create task")
    }

    fn engine_with(&self, origin: Arc<dyn OriginClient>) -> TaskEngine {
        TaskEngine::start(
            self.deps(),
            EngineOptions {
                origin_override: Some(origin),
                ..EngineOptions::default()
            },
        )
    }
}

fn movie_origin() -> ScriptedOrigin {
    ScriptedOrigin::new("http://origin:5244").with_dir(
        "/movies",
        vec![
            ScriptedOrigin::file("a.mp4", 200 * MB, Some("s1")),
            ScriptedOrigin::file("b.mkv", 500 * MB, Some("s2")),
        ],
    )
}

async fn wait_for_event(
    stream: &mut strmforge_events::EventStream,
    kind: &str,
) -> strmforge_events::Event {
    timeout(WAIT, async {
        loop {
            let envelope = stream.next().await.expect("bus stays open");
            if envelope.event.kind() == kind {
                return envelope.event;
            }
        }
    })
    .await
    .expect("event arrives in time")
}

#[tokio::test]
async fn manual_trigger_runs_to_completion() {
    let fx = fixture().await;
    let task = fx.create_task().await;
    let engine = fx.engine_with(Arc::new(movie_origin()));
    let mut stream = fx.events.subscribe(None);

    engine
        .trigger(task.id, RunTrigger::Manual)
        .await
        .expect("trigger accepted");

    let event = wait_for_event(&mut stream, "run_completed").await;
    let Event::RunCompleted { summary } = event else {
        panic!("expected a completion event");
    };
    assert_eq!(summary.task_id, task.id);
    assert_eq!(summary.counters.generated_file, 2);
    assert!(fx.out.path().join("a.strm").exists());

    let refreshed = fx.tasks.get(task.id).await.expect("get").expect("exists");
    assert!(!refreshed.running, "run flag released");
    assert!(refreshed.last_run_at.is_some());

    let log = fx
        .logs
        .get(summary.task_log_id)
        .await
        .expect("get log")
        .expect("log exists");
    assert_eq!(log.status, RunStatus::Completed);
    assert_eq!(log.generated_file, 2);
    assert_eq!(
        fx.logs.running_count(task.id).await.expect("count"),
        0,
        "no dangling running rows"
    );
}

struct GatedOrigin {
    inner: ScriptedOrigin,
    gate: Arc<Semaphore>,
}

#[async_trait::async_trait]
impl OriginClient for GatedOrigin {
    async fn list(&self, path: &str) -> anyhow::Result<Vec<RemoteEntry>> {
        self.gate.acquire().await.expect("gate open").forget();
        self.inner.list(path).await
    }

    fn playback_url(
        &self,
        source_path: &str,
        name: &str,
        sign: Option<&str>,
        url_encode: bool,
    ) -> String {
        self.inner.playback_url(source_path, name, sign, url_encode)
    }

    async fn fetch(
        &self,
        source_path: &str,
        name: &str,
        sign: Option<&str>,
    ) -> anyhow::Result<Vec<u8>> {
        self.inner.fetch(source_path, name, sign).await
    }
}

#[tokio::test]
async fn busy_tasks_reject_further_triggers() {
    let fx = fixture().await;
    let task = fx.create_task().await;
    let gate = Arc::new(Semaphore::new(0));
    let engine = fx.engine_with(Arc::new(GatedOrigin {
        inner: movie_origin(),
        gate: gate.clone(),
    }));
    let mut stream = fx.events.subscribe(None);

    engine
        .trigger(task.id, RunTrigger::Manual)
        .await
        .expect("first trigger accepted");

    timeout(WAIT, async {
        loop {
            let current = fx.tasks.get(task.id).await.expect("get").expect("exists");
            if current.running {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("run admitted in time");

    let error = engine
        .trigger(task.id, RunTrigger::Manual)
        .await
        .expect_err("busy task rejects");
    assert!(matches!(
        error,
        EngineError::AlreadyRunning { .. } | EngineError::AlreadyQueued { .. }
    ));

    gate.add_permits(16);
    let _ = wait_for_event(&mut stream, "run_completed").await;

    engine
        .trigger(task.id, RunTrigger::Manual)
        .await
        .expect("task admits again after release");
    gate.add_permits(16);
    let _ = wait_for_event(&mut stream, "run_completed").await;
}

#[tokio::test]
async fn missing_origin_settings_fail_the_run() {
    let fx = fixture().await;
    let task = fx.create_task().await;
    let engine = TaskEngine::start(fx.deps(), EngineOptions::default());
    let mut stream = fx.events.subscribe(None);

    engine
        .trigger(task.id, RunTrigger::Manual)
        .await
        .expect("trigger accepted");

    let event = wait_for_event(&mut stream, "run_failed").await;
    let Event::RunFailed { summary } = event else {
        panic!("expected a failure event");
    };
    assert!(
        summary
            .error_message
            .as_deref()
            .is_some_and(|detail| detail.contains("not configured"))
    );

    let log = fx
        .logs
        .get(summary.task_log_id)
        .await
        .expect("get log")
        .expect("log exists");
    assert_eq!(log.status, RunStatus::Failed);
    let refreshed = fx.tasks.get(task.id).await.expect("get").expect("exists");
    assert!(!refreshed.running, "failed runs still release the flag");
}

#[tokio::test]
async fn file_events_apply_single_changes() {
    let fx = fixture().await;
    let task = fx.create_task().await;
    let engine = fx.engine_with(Arc::new(ScriptedOrigin::new("http://origin:5244")));
    let mut stream = fx.events.subscribe(None);

    engine
        .trigger_event(
            task.id,
            FileChangeEvent {
                kind: FileEventKind::Create,
                source_path: "/movies".to_string(),
                name: "fresh.mp4".to_string(),
                new_name: None,
                size: 700 * MB,
                sign: Some("s9".to_string()),
            },
        )
        .await
        .expect("event accepted");

    let event = wait_for_event(&mut stream, "run_completed").await;
    let Event::RunCompleted { summary } = event else {
        panic!("expected a completion event");
    };
    assert_eq!(summary.counters.generated_file, 1);
    assert!(fx.out.path().join("fresh.strm").exists());
}

#[tokio::test]
async fn reconcile_clears_stuck_state_from_a_previous_process() {
    let fx = fixture().await;
    let task = fx.create_task().await;

    assert!(fx.tasks.acquire_run(task.id).await.expect("simulate crash"));
    let _ = fx.logs.open(task.id).await.expect("dangling log");

    let engine = fx.engine_with(Arc::new(movie_origin()));
    let reset = engine.reconcile().await.expect("reconcile");
    assert_eq!(reset, 2);

    let refreshed = fx.tasks.get(task.id).await.expect("get").expect("exists");
    assert!(!refreshed.running);
}

#[tokio::test]
async fn webhook_dispatch_routes_by_source_path_prefix() {
    let fx = fixture().await;
    let movie_task = fx.create_task().await;

    let mut tv = sample_task(&fx.out.path().join("tv").to_string_lossy());
    tv.name = "tv".to_string();
    tv.source_path = "/tv".to_string();
    let _tv_task = fx.tasks.create(&tv).await.expect("create tv task");

    let engine = fx.engine_with(Arc::new(ScriptedOrigin::new("http://origin:5244")));
    let dispatcher = WebhookDispatcher::new(engine, fx.tasks.clone());
    let mut stream = fx.events.subscribe(None);

    let queued = dispatcher
        .dispatch_file_changes(&[FileChangeEvent {
            kind: FileEventKind::Create,
            source_path: "/movies/sub".to_string(),
            name: "c.mp4".to_string(),
            new_name: None,
            size: 900 * MB,
            sign: None,
        }])
        .await
        .expect("dispatch");
    assert_eq!(queued, 1, "only the movies task matches the prefix");

    let event = wait_for_event(&mut stream, "run_completed").await;
    let Event::RunCompleted { summary } = event else {
        panic!("expected a completion event");
    };
    assert_eq!(summary.task_id, movie_task.id);
    assert!(fx.out.path().join("sub/c.strm").exists());
}
