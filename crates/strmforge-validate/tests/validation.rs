//! Validation sweep scenarios against a mocked origin and a temp SQLite
//! history.

use std::time::Duration;

use tokio::time::timeout;

use strmforge_core::{
    FileCategory, NewFileHistory, ProcessingStatus, ValidationConfig, ValidationStatus,
    ValidationType,
};
use strmforge_data::{HistoryStore, SettingsStore, TaskStore, ValidationStore};
use strmforge_events::{Event, EventBus};
use strmforge_test_support::{sample_task, temp_database};
use strmforge_validate::{ValidationEngine, ValidationError};

const WAIT: Duration = Duration::from_secs(15);

struct Fixture {
    history: HistoryStore,
    validations: ValidationStore,
    tasks: TaskStore,
    events: EventBus,
    engine: ValidationEngine,
    _db: strmforge_test_support::TestDatabase,
    out: tempfile::TempDir,
}

async fn fixture() -> Fixture {
    let db = temp_database().await;
    let pool = db.database.pool().clone();
    let history = HistoryStore::new(pool.clone());
    let validations = ValidationStore::new(pool.clone());
    let events = EventBus::new();
    let engine = ValidationEngine::new(
        validations.clone(),
        history.clone(),
        SettingsStore::new(pool.clone()),
        events.clone(),
    );
    Fixture {
        history,
        validations,
        tasks: TaskStore::new(pool),
        events,
        engine,
        _db: db,
        out: tempfile::tempdir().expect("output dir"),
    }
}

impl Fixture {
    async fn seed_pointer(&self, task_id: i64, name: &str, url: &str) -> (i64, std::path::PathBuf) {
        let target = self.out.path().join(name);
        std::fs::write(&target, format!("{url}\n")).expect("write pointer");
        let id = self
            .history
            .record(&NewFileHistory {
                task_id,
                task_log_id: None,
                file_name: name.replace(".strm", ".mp4"),
                source_path: "/movies".to_string(),
                source_url: Some(url.to_string()),
                target_file_path: target.to_string_lossy().into_owned(),
                file_size: 1_000,
                file_type: None,
                file_suffix: "strm".to_string(),
                file_category: FileCategory::Main,
                main_file_id: None,
                hash: Some(format!("hash-{name}")),
                processing_status: ProcessingStatus::Success,
            })
            .await
            .expect("record pointer row");
        (id, target)
    }

    async fn wait_terminal(&self, id: i64) -> strmforge_core::ValidationTask {
        timeout(WAIT, async {
            loop {
                let task = self
                    .validations
                    .get(id)
                    .await
                    .expect("get sweep")
                    .expect("sweep exists");
                if matches!(
                    task.status,
                    ValidationStatus::Completed
                        | ValidationStatus::Failed
                        | ValidationStatus::Cancelled
                ) {
                    return task;
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .expect("sweep reaches a terminal state")
    }
}

#[tokio::test]
async fn full_sweep_counts_valid_and_invalid_pointers() {
    let fx = fixture().await;
    let task = fx
        .tasks
        .create(&sample_task(&fx.out.path().to_string_lossy()))
        .await
        .expect("create task");

    let server = httpmock::MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(httpmock::Method::HEAD).path_includes("/ok/");
            then.status(200);
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(httpmock::Method::HEAD).path_includes("/gone/");
            then.status(404);
        })
        .await;

    for index in 0..7 {
        fx.seed_pointer(
            task.id,
            &format!("ok-{index}.strm"),
            &format!("{}/ok/{index}.mp4", server.base_url()),
        )
        .await;
    }
    for index in 0..2 {
        fx.seed_pointer(
            task.id,
            &format!("gone-{index}.strm"),
            &format!("{}/gone/{index}.mp4", server.base_url()),
        )
        .await;
    }
    // A closed port stands in for an unreachable origin.
    fx.seed_pointer(task.id, "dead.strm", "http://127.0.0.1:1/dead.mp4")
        .await;

    let mut stream = fx.events.subscribe(None);
    let started = fx
        .engine
        .start(ValidationType::Full, None)
        .await
        .expect("sweep admitted");

    let finished = fx.wait_terminal(started.id).await;
    assert_eq!(finished.status, ValidationStatus::Completed);
    assert_eq!(finished.total_files, 10);
    assert_eq!(finished.processed_files, 10);
    assert_eq!(finished.valid_files, 7);
    assert_eq!(finished.invalid_files, 3);
    assert_eq!(finished.progress, 100);
    assert_eq!(
        finished.processed_files,
        finished.valid_files + finished.invalid_files
    );

    let completion = timeout(WAIT, async {
        loop {
            let envelope = stream.next().await.expect("bus open");
            if let Event::ValidationCompleted {
                invalid_files,
                main_reason,
                ..
            } = envelope.event
            {
                return (invalid_files, main_reason);
            }
        }
    })
    .await
    .expect("completion event");
    assert_eq!(completion.0, 3);
    assert_eq!(
        completion.1.as_deref(),
        Some("status 404"),
        "two 404s beat one transport failure"
    );
}

#[tokio::test]
async fn missing_files_and_urlless_pointers_are_invalid() {
    let fx = fixture().await;
    let task = fx
        .tasks
        .create(&sample_task(&fx.out.path().to_string_lossy()))
        .await
        .expect("create task");

    let (missing_id, missing_target) = fx
        .seed_pointer(task.id, "missing.strm", "http://127.0.0.1:1/missing.mp4")
        .await;
    std::fs::remove_file(&missing_target).expect("drop the pointer file");

    let (urlless_id, urlless_target) = fx
        .seed_pointer(task.id, "urlless.strm", "http://127.0.0.1:1/x.mp4")
        .await;
    std::fs::write(&urlless_target, "this file has no link\n").expect("overwrite pointer");

    let started = fx
        .engine
        .start(ValidationType::Full, None)
        .await
        .expect("sweep admitted");
    let finished = fx.wait_terminal(started.id).await;
    assert_eq!(finished.invalid_files, 2);

    let missing = fx
        .history
        .get(missing_id)
        .await
        .expect("get")
        .expect("row exists");
    assert_eq!(missing.is_valid, Some(false));
    assert_eq!(missing.validation_message.as_deref(), Some("strm file missing"));
    assert!(missing.last_checked_at.is_some());

    let urlless = fx
        .history
        .get(urlless_id)
        .await
        .expect("get")
        .expect("row exists");
    assert_eq!(urlless.validation_message.as_deref(), Some("no URL in strm"));
}

#[tokio::test]
async fn only_one_sweep_may_run_at_a_time() {
    let fx = fixture().await;

    let holder = fx
        .validations
        .create(ValidationType::Full, None)
        .await
        .expect("holder sweep");
    assert!(fx
        .validations
        .try_start(holder.id)
        .await
        .expect("hold the gate"));

    let error = fx
        .engine
        .start(ValidationType::Incremental, None)
        .await
        .expect_err("second sweep rejected");
    assert!(matches!(error, ValidationError::AlreadyRunning));

    fx.validations
        .finish(holder.id, ValidationStatus::Completed, None)
        .await
        .expect("release the gate");

    let admitted = fx
        .engine
        .start(ValidationType::Full, None)
        .await
        .expect("gate reopens");
    fx.wait_terminal(admitted.id).await;
}

#[tokio::test]
async fn manual_sweeps_honour_the_path_prefix() {
    let fx = fixture().await;
    let task = fx
        .tasks
        .create(&sample_task(&fx.out.path().to_string_lossy()))
        .await
        .expect("create task");

    std::fs::create_dir_all(fx.out.path().join("keep")).expect("mkdir");
    std::fs::create_dir_all(fx.out.path().join("scan")).expect("mkdir");
    fx.seed_pointer(task.id, "keep/a.strm", "http://127.0.0.1:1/a.mp4")
        .await;
    let (scanned_id, _) = fx
        .seed_pointer(task.id, "scan/b.strm", "http://127.0.0.1:1/b.mp4")
        .await;

    let config = ValidationConfig {
        task_id: None,
        path_prefix: Some(fx.out.path().join("scan").to_string_lossy().into_owned()),
    };
    let started = fx
        .engine
        .start(ValidationType::Manual, Some(&config))
        .await
        .expect("manual sweep admitted");
    let finished = fx.wait_terminal(started.id).await;

    assert_eq!(finished.total_files, 1, "only the prefixed row is selected");
    let scanned = fx
        .history
        .get(scanned_id)
        .await
        .expect("get")
        .expect("row exists");
    assert!(scanned.last_checked_at.is_some());
}

#[tokio::test]
async fn cleanup_removes_invalid_artifacts_and_prunes_empty_dirs() {
    let fx = fixture().await;
    let task = fx
        .tasks
        .create(&sample_task(&fx.out.path().to_string_lossy()))
        .await
        .expect("create task");

    std::fs::create_dir_all(fx.out.path().join("nested")).expect("mkdir");
    let (invalid_id, invalid_target) = fx
        .seed_pointer(task.id, "nested/bad.strm", "http://127.0.0.1:1/bad.mp4")
        .await;
    let (valid_id, valid_target) = fx
        .seed_pointer(task.id, "good.strm", "http://127.0.0.1:1/good.mp4")
        .await;

    fx.history
        .mark_validated(invalid_id, false, Some("status 404"))
        .await
        .expect("mark invalid");
    fx.history
        .mark_validated(valid_id, true, None)
        .await
        .expect("mark valid");

    let report = fx.engine.cleanup().await.expect("cleanup runs");
    assert_eq!(report.removed_files, 1);
    assert_eq!(report.removed_rows, 1);
    assert!(report.pruned_dirs >= 1, "the emptied nested dir is pruned");

    assert!(!invalid_target.exists());
    assert!(valid_target.exists(), "valid artifacts stay in place");
    assert!(fx.history.get(invalid_id).await.expect("get").is_none());
    assert!(fx.history.get(valid_id).await.expect("get").is_some());
    assert!(!fx.out.path().join("nested").exists());
}
