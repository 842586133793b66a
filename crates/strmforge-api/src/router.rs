//! Route table and handlers.

use std::net::SocketAddr;
use std::str::FromStr;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::info;

use strmforge_core::{
    FileChangeEvent, NewTask, NotificationStatus, RunTrigger, TimeRange, ValidationConfig,
    ValidationType,
};
use strmforge_engine::Scheduler;

use crate::error::ApiError;
use crate::state::AppState;

const DEFAULT_LIST_LIMIT: i64 = 50;

/// Assemble the full route table over the shared state.
#[must_use]
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics))
        .route("/api/tasks", get(list_tasks).post(create_task))
        .route("/api/tasks/stats", get(task_stats))
        .route(
            "/api/tasks/{id}",
            get(get_task).put(update_task).delete(delete_task),
        )
        .route("/api/tasks/{id}/execute", post(execute_task))
        .route("/api/tasks/{id}/cancel", post(cancel_task))
        .route("/api/tasks/{id}/reset", post(reset_task))
        .route("/api/tasks/{id}/logs", get(task_logs))
        .route("/api/validation", get(list_validations).post(start_validation))
        .route("/api/validation/cleanup", post(run_cleanup))
        .route("/api/validation/{id}", get(get_validation))
        .route("/api/validation/{id}/cancel", post(cancel_validation))
        .route(
            "/api/notifications",
            get(list_notifications),
        )
        .route("/api/notifications/stats", get(notification_stats))
        .route("/api/notifications/{id}", delete(delete_notification))
        .route("/api/notifications/{id}/retry", post(retry_notification))
        .route("/api/webhooks/file-change", post(file_change_webhook))
        .route("/api/webhooks/mount-change", post(mount_change_webhook))
        .route("/api/system/logs", get(system_logs))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind the listener and serve until the shutdown token fires.
///
/// # Errors
///
/// Returns an error when binding or serving fails.
pub async fn serve(state: AppState, port: u16, shutdown: CancellationToken) -> anyhow::Result<()> {
    let router = build_router(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "API server listening");
    axum::serve(listener, router)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    Ok(())
}

async fn healthz(State(state): State<AppState>) -> impl IntoResponse {
    let database_up = state.database.ping().await.is_ok();
    let snapshot = state.metrics.snapshot();
    let scheduler_entries = state.scheduler.entries().await.len();
    let status = if database_up { "ok" } else { "degraded" };
    Json(json!({
        "status": status,
        "database": database_up,
        "scheduler_entries": scheduler_entries,
        "running_tasks": snapshot.running_tasks,
        "executor_queue_depth": snapshot.executor_queue_depth,
    }))
}

async fn metrics(State(state): State<AppState>) -> Result<String, ApiError> {
    state.metrics.render().map_err(ApiError::Internal)
}

async fn list_tasks(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.tasks.list().await?))
}

async fn create_task(
    State(state): State<AppState>,
    Json(payload): Json<NewTask>,
) -> Result<impl IntoResponse, ApiError> {
    validate_payload(&payload)?;
    let task = state.tasks.create(&payload).await?;
    if task.enabled
        && let Some(expression) = task.cron.as_deref().filter(|cron| !cron.trim().is_empty())
    {
        state.scheduler.add(task.id, expression).await?;
    }
    Ok((StatusCode::CREATED, Json(task)))
}

async fn get_task(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let task = state
        .tasks
        .get(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("task {id} not found")))?;
    Ok(Json(task))
}

async fn update_task(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(payload): Json<NewTask>,
) -> Result<impl IntoResponse, ApiError> {
    validate_payload(&payload)?;
    let task = state.tasks.update(id, &payload).await?;
    state.scheduler.reload(id).await?;
    Ok(Json(task))
}

async fn delete_task(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    if state.tasks.get(id).await?.is_none() {
        return Err(ApiError::NotFound(format!("task {id} not found")));
    }
    state.scheduler.remove(id).await;
    let _ = state.engine.cancel(id);
    state.tasks.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

fn validate_payload(payload: &NewTask) -> Result<(), ApiError> {
    payload
        .validate()
        .map_err(|err| ApiError::Unprocessable(err.to_string()))?;
    if let Some(expression) = payload.cron.as_deref().filter(|cron| !cron.trim().is_empty()) {
        Scheduler::validate_expression(expression)?;
    }
    Ok(())
}

async fn execute_task(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    state.engine.trigger(id, RunTrigger::Manual).await?;
    Ok((StatusCode::ACCEPTED, Json(json!({ "queued": true }))))
}

async fn cancel_task(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    if state.engine.cancel(id) {
        Ok(Json(json!({ "cancelled": true })))
    } else {
        Err(ApiError::NotFound(format!("task {id} has no run in flight")))
    }
}

async fn reset_task(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    if state.tasks.get(id).await?.is_none() {
        return Err(ApiError::NotFound(format!("task {id} not found")));
    }
    let _ = state.engine.cancel(id);
    let reset = state.tasks.reset_task(id).await?;
    Ok(Json(json!({ "reset": reset })))
}

#[derive(Debug, Deserialize)]
struct StatsQuery {
    time_range: Option<String>,
}

async fn task_stats(
    State(state): State<AppState>,
    Query(query): Query<StatsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let range = match query.time_range.as_deref() {
        Some(raw) => TimeRange::from_str(raw)
            .map_err(|err| ApiError::Unprocessable(err.to_string()))?,
        None => TimeRange::Day,
    };
    Ok(Json(state.engine.stats(range).await?))
}

#[derive(Debug, Deserialize)]
struct LogsQuery {
    limit: Option<i64>,
}

async fn task_logs(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(query): Query<LogsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let limit = query.limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, 500);
    Ok(Json(state.logs.list_for_task(id, limit).await?))
}

#[derive(Debug, Deserialize)]
struct StartValidationRequest {
    #[serde(default = "default_validation_type")]
    validation_type: ValidationType,
    #[serde(default)]
    config: Option<ValidationConfig>,
}

const fn default_validation_type() -> ValidationType {
    ValidationType::Full
}

async fn start_validation(
    State(state): State<AppState>,
    Json(payload): Json<StartValidationRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let task = state
        .validation
        .start(payload.validation_type, payload.config.as_ref())
        .await?;
    Ok((StatusCode::ACCEPTED, Json(task)))
}

async fn list_validations(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.validation.list(DEFAULT_LIST_LIMIT).await?))
}

async fn get_validation(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let task = state
        .validation
        .get(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("validation task {id} not found")))?;
    Ok(Json(task))
}

async fn cancel_validation(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    if state.validation.cancel(id).await? {
        Ok(Json(json!({ "cancelled": true })))
    } else {
        Err(ApiError::Conflict(format!(
            "validation task {id} is not cancellable"
        )))
    }
}

async fn run_cleanup(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.validation.cleanup().await?))
}

#[derive(Debug, Deserialize)]
struct NotificationsQuery {
    status: Option<String>,
    limit: Option<i64>,
}

async fn list_notifications(
    State(state): State<AppState>,
    Query(query): Query<NotificationsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let status = query
        .status
        .as_deref()
        .map(NotificationStatus::from_str)
        .transpose()
        .map_err(|err| ApiError::Unprocessable(err.to_string()))?;
    let limit = query.limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, 500);
    Ok(Json(state.notifications.list(status, limit).await?))
}

async fn notification_stats(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.notifications.stats().await?))
}

async fn retry_notification(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    state.notifications.retry_now(id).await?;
    Ok(Json(json!({ "requeued": true })))
}

async fn delete_notification(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    state.notifications.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn file_change_webhook(
    State(state): State<AppState>,
    Json(events): Json<Vec<FileChangeEvent>>,
) -> Result<impl IntoResponse, ApiError> {
    let queued = state.dispatcher.dispatch_file_changes(&events).await?;
    Ok(Json(json!({ "dispatched": queued })))
}

#[derive(Debug, Deserialize)]
struct MountChangeRequest {
    path: String,
}

async fn mount_change_webhook(
    State(state): State<AppState>,
    Json(payload): Json<MountChangeRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let queued = state.dispatcher.dispatch_mount_change(&payload.path).await?;
    Ok(Json(json!({ "dispatched": queued })))
}

#[derive(Debug, Deserialize)]
struct SystemLogsQuery {
    limit: Option<i64>,
}

async fn system_logs(
    State(state): State<AppState>,
    Query(query): Query<SystemLogsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let limit = query.limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, 500);
    Ok(Json(state.system.recent(limit).await?))
}
