//! JSON error envelope shared by every handler.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use tracing::error;

use strmforge_data::DataError;
use strmforge_engine::EngineError;
use strmforge_validate::ValidationError;

/// Failures rendered as `{code, message}` JSON envelopes.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The referenced resource does not exist.
    #[error("{0}")]
    NotFound(String),
    /// The request conflicts with in-flight state.
    #[error("{0}")]
    Conflict(String),
    /// The request payload fails validation.
    #[error("{0}")]
    Unprocessable(String),
    /// An internal component failed.
    #[error("internal error")]
    Internal(#[source] anyhow::Error),
}

impl ApiError {
    const fn status(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Unprocessable(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let Self::Internal(source) = &self {
            error!(error = %format!("{source:#}"), "request failed internally");
        }
        let status = self.status();
        let body = Json(json!({
            "code": status.as_u16(),
            "message": self.to_string(),
        }));
        (status, body).into_response()
    }
}

impl From<DataError> for ApiError {
    fn from(value: DataError) -> Self {
        match value {
            DataError::NotFound { entity, id } => Self::NotFound(format!("{entity} {id} not found")),
            other => Self::Internal(other.into()),
        }
    }
}

impl From<EngineError> for ApiError {
    fn from(value: EngineError) -> Self {
        match value {
            EngineError::NotFound { task_id } => Self::NotFound(format!("task {task_id} not found")),
            EngineError::AlreadyRunning { task_id } => {
                Self::Conflict(format!("task {task_id} is already running"))
            }
            EngineError::AlreadyQueued { task_id } => {
                Self::Conflict(format!("task {task_id} is already queued"))
            }
            EngineError::InvalidCron { .. } => Self::Unprocessable(value.to_string()),
            EngineError::QueueClosed => Self::Conflict("executor is shutting down".to_string()),
            EngineError::Data(data) => data.into(),
        }
    }
}

impl From<ValidationError> for ApiError {
    fn from(value: ValidationError) -> Self {
        match value {
            ValidationError::AlreadyRunning => {
                Self::Conflict("a validation sweep is already running".to_string())
            }
            ValidationError::NotFound { id } => {
                Self::NotFound(format!("validation task {id} not found"))
            }
            ValidationError::Config(detail) => Self::Unprocessable(detail),
            ValidationError::Data(data) => data.into(),
        }
    }
}
