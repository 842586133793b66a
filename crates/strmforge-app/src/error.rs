//! Top-level error type for the binary.

/// Convenience alias for bootstrap results.
pub type AppResult<T> = std::result::Result<T, AppError>;

/// Failures surfaced while booting or running the application.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Process configuration could not be assembled.
    #[error(transparent)]
    Config(#[from] strmforge_config::ConfigError),
    /// The database could not be prepared.
    #[error(transparent)]
    Data(#[from] strmforge_data::DataError),
    /// The engine failed during startup reconciliation or scheduling.
    #[error(transparent)]
    Engine(#[from] strmforge_engine::EngineError),
    /// Telemetry could not be initialised.
    #[error("telemetry setup failed: {0}")]
    Telemetry(#[source] anyhow::Error),
    /// The seed administrator could not be provisioned.
    #[error("seed user provisioning failed: {0}")]
    Seed(String),
    /// The HTTP server failed.
    #[error("API server failed: {0}")]
    Serve(#[source] anyhow::Error),
}
