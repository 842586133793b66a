//! Error type for engine operations.

/// Failures surfaced by the engine, scheduler, and dispatcher.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The referenced task does not exist.
    #[error("task {task_id} not found")]
    NotFound {
        /// Identifier that missed.
        task_id: i64,
    },
    /// The task already has a run in flight.
    #[error("task {task_id} is already running")]
    AlreadyRunning {
        /// Identifier of the busy task.
        task_id: i64,
    },
    /// An identical run request is already queued.
    #[error("task {task_id} is already queued")]
    AlreadyQueued {
        /// Identifier of the queued task.
        task_id: i64,
    },
    /// A cron expression does not parse.
    #[error("cron expression '{expression}' is invalid: {detail}")]
    InvalidCron {
        /// Raw expression as stored on the task.
        expression: String,
        /// Parser detail.
        detail: String,
    },
    /// The executor channel is closed (shutdown in progress).
    #[error("executor is shut down")]
    QueueClosed,
    /// The data layer failed.
    #[error(transparent)]
    Data(#[from] strmforge_data::DataError),
}
