//! Error type for validation operations.

/// Failures surfaced by the validation engine.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    /// Another sweep is already running.
    #[error("a validation sweep is already running")]
    AlreadyRunning,
    /// The referenced sweep does not exist.
    #[error("validation task {id} not found")]
    NotFound {
        /// Identifier that missed.
        id: i64,
    },
    /// The manual-sweep config payload does not parse.
    #[error("validation config is invalid: {0}")]
    Config(String),
    /// The data layer failed.
    #[error(transparent)]
    Data(#[from] strmforge_data::DataError),
}
