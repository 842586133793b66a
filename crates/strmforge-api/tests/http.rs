//! Route-level tests over an in-memory service stack.

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header::CONTENT_TYPE};
use tower::ServiceExt;

use strmforge_api::{AppState, build_router};
use strmforge_data::{
    HistoryStore, NotificationStore, SettingsStore, SystemLogStore, TaskLogStore, TaskStore,
    ValidationStore,
};
use strmforge_engine::{EngineDeps, EngineOptions, Scheduler, TaskEngine, WebhookDispatcher};
use strmforge_events::EventBus;
use strmforge_telemetry::Metrics;
use strmforge_test_support::{ScriptedOrigin, temp_database};
use strmforge_validate::ValidationEngine;

struct TestStack {
    router: Router,
    tasks: TaskStore,
    _db: strmforge_test_support::TestDatabase,
    _out: tempfile::TempDir,
}

async fn test_stack() -> TestStack {
    let db = temp_database().await;
    let pool = db.database.pool().clone();
    let tasks = TaskStore::new(pool.clone());
    let logs = TaskLogStore::new(pool.clone());
    let history = HistoryStore::new(pool.clone());
    let settings = SettingsStore::new(pool.clone());
    let system = SystemLogStore::new(pool.clone());
    let notifications = NotificationStore::new(pool.clone());
    let validations = ValidationStore::new(pool.clone());
    let events = EventBus::new();

    let engine = TaskEngine::start(
        EngineDeps {
            tasks: tasks.clone(),
            logs: logs.clone(),
            history: history.clone(),
            settings: settings.clone(),
            system: system.clone(),
            events: events.clone(),
        },
        EngineOptions {
            origin_override: Some(Arc::new(ScriptedOrigin::new("http://origin:5244"))),
            ..EngineOptions::default()
        },
    );
    let scheduler = Arc::new(Scheduler::new(engine.clone(), tasks.clone()));
    let dispatcher = Arc::new(WebhookDispatcher::new(engine.clone(), tasks.clone()));
    let validation = ValidationEngine::new(validations, history, settings, events);

    let state = AppState {
        tasks: tasks.clone(),
        logs,
        notifications,
        system,
        engine,
        scheduler,
        dispatcher,
        validation,
        metrics: Metrics::new().expect("metrics registry"),
        database: db.database.clone(),
    };

    TestStack {
        router: build_router(state),
        tasks,
        _db: db,
        _out: tempfile::tempdir().expect("output dir"),
    }
}

fn json_request(method: &str, uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("request builds")
}

fn get_request(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .expect("request builds")
}

fn task_payload(out: &tempfile::TempDir) -> String {
    format!(
        r#"{{
            "name": "movies",
            "media_type": "movie",
            "source_path": "/movies",
            "target_path": "{}",
            "file_suffix": "mp4,mkv",
            "cron": "0 3 * * *"
        }}"#,
        out.path().to_string_lossy().replace('\\', "/")
    )
}

#[tokio::test]
async fn healthz_reports_ok() {
    let stack = test_stack().await;
    let response = stack
        .router
        .clone()
        .oneshot(get_request("/healthz"))
        .await
        .expect("request serves");
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn metrics_render_as_text() {
    let stack = test_stack().await;
    let response = stack
        .router
        .clone()
        .oneshot(get_request("/metrics"))
        .await
        .expect("request serves");
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn task_creation_round_trips() {
    let stack = test_stack().await;
    let payload = task_payload(&stack._out);

    let created = stack
        .router
        .clone()
        .oneshot(json_request("POST", "/api/tasks", &payload))
        .await
        .expect("request serves");
    assert_eq!(created.status(), StatusCode::CREATED);

    let listed = stack
        .router
        .clone()
        .oneshot(get_request("/api/tasks"))
        .await
        .expect("request serves");
    assert_eq!(listed.status(), StatusCode::OK);

    let fetched = stack
        .router
        .clone()
        .oneshot(get_request("/api/tasks/1"))
        .await
        .expect("request serves");
    assert_eq!(fetched.status(), StatusCode::OK);

    let stats = stack
        .router
        .clone()
        .oneshot(get_request("/api/tasks/stats?time_range=month"))
        .await
        .expect("request serves");
    assert_eq!(stats.status(), StatusCode::OK);
}

#[tokio::test]
async fn invalid_task_payloads_are_unprocessable() {
    let stack = test_stack().await;
    let dotted = r#"{
        "name": "movies",
        "media_type": "movie",
        "source_path": "/movies",
        "target_path": "/library",
        "file_suffix": ".mp4"
    }"#;
    let response = stack
        .router
        .clone()
        .oneshot(json_request("POST", "/api/tasks", dotted))
        .await
        .expect("request serves");
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let bad_cron = r#"{
        "name": "movies",
        "media_type": "movie",
        "source_path": "/movies",
        "target_path": "/library",
        "file_suffix": "mp4",
        "cron": "not a cron"
    }"#;
    let response = stack
        .router
        .clone()
        .oneshot(json_request("POST", "/api/tasks", bad_cron))
        .await
        .expect("request serves");
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn executing_a_missing_task_is_not_found() {
    let stack = test_stack().await;
    let response = stack
        .router
        .clone()
        .oneshot(json_request("POST", "/api/tasks/99/execute", "{}"))
        .await
        .expect("request serves");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn executing_a_busy_task_conflicts() {
    let stack = test_stack().await;
    let payload = task_payload(&stack._out);
    let created = stack
        .router
        .clone()
        .oneshot(json_request("POST", "/api/tasks", &payload))
        .await
        .expect("request serves");
    assert_eq!(created.status(), StatusCode::CREATED);

    assert!(stack.tasks.acquire_run(1).await.expect("simulate a run"));

    let response = stack
        .router
        .clone()
        .oneshot(json_request("POST", "/api/tasks/1/execute", "{}"))
        .await
        .expect("request serves");
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let reset = stack
        .router
        .clone()
        .oneshot(json_request("POST", "/api/tasks/1/reset", "{}"))
        .await
        .expect("request serves");
    assert_eq!(reset.status(), StatusCode::OK);

    let refreshed = stack.tasks.get(1).await.expect("get").expect("exists");
    assert!(!refreshed.running, "reset clears the stuck flag");
}

#[tokio::test]
async fn webhook_and_queue_admin_routes_answer() {
    let stack = test_stack().await;

    let mount = stack
        .router
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/webhooks/mount-change",
            r#"{"path": "/movies"}"#,
        ))
        .await
        .expect("request serves");
    assert_eq!(mount.status(), StatusCode::OK);

    let file_change = stack
        .router
        .clone()
        .oneshot(json_request("POST", "/api/webhooks/file-change", "[]"))
        .await
        .expect("request serves");
    assert_eq!(file_change.status(), StatusCode::OK);

    let notifications = stack
        .router
        .clone()
        .oneshot(get_request("/api/notifications?limit=10"))
        .await
        .expect("request serves");
    assert_eq!(notifications.status(), StatusCode::OK);

    let stats = stack
        .router
        .clone()
        .oneshot(get_request("/api/notifications/stats"))
        .await
        .expect("request serves");
    assert_eq!(stats.status(), StatusCode::OK);

    let system = stack
        .router
        .clone()
        .oneshot(get_request("/api/system/logs"))
        .await
        .expect("request serves");
    assert_eq!(system.status(), StatusCode::OK);
}

#[tokio::test]
async fn validation_routes_admit_and_report() {
    let stack = test_stack().await;
    let started = stack
        .router
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/validation",
            r#"{"validation_type": "full"}"#,
        ))
        .await
        .expect("request serves");
    assert_eq!(started.status(), StatusCode::ACCEPTED);

    let listed = stack
        .router
        .clone()
        .oneshot(get_request("/api/validation"))
        .await
        .expect("request serves");
    assert_eq!(listed.status(), StatusCode::OK);
}
