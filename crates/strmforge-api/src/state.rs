//! Shared handler state.

use std::sync::Arc;

use strmforge_data::{
    Database, NotificationStore, SystemLogStore, TaskLogStore, TaskStore,
};
use strmforge_engine::{Scheduler, TaskEngine, WebhookDispatcher};
use strmforge_telemetry::Metrics;
use strmforge_validate::ValidationEngine;

/// Handles every route needs; cheap to clone per request.
#[derive(Clone)]
pub struct AppState {
    /// Task registry.
    pub tasks: TaskStore,
    /// Run-record store.
    pub logs: TaskLogStore,
    /// Notification queue store.
    pub notifications: NotificationStore,
    /// System log store.
    pub system: SystemLogStore,
    /// Executor handle.
    pub engine: TaskEngine,
    /// Cron scheduler handle.
    pub scheduler: Arc<Scheduler>,
    /// Webhook dispatcher.
    pub dispatcher: Arc<WebhookDispatcher>,
    /// Validation engine handle.
    pub validation: ValidationEngine,
    /// Metrics registry.
    pub metrics: Metrics,
    /// Database handle used for liveness checks.
    pub database: Database,
}
