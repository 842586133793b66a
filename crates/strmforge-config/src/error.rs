//! Error type for configuration loading and parsing.

/// Convenience alias for configuration results.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Failures surfaced while assembling the process configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required environment variable is absent.
    #[error("missing required environment variable {key}")]
    Missing {
        /// Name of the absent variable.
        key: &'static str,
    },
    /// An environment variable carries an unparsable value.
    #[error("environment variable {key} has invalid value '{value}' (expected {expected})")]
    Invalid {
        /// Name of the offending variable.
        key: &'static str,
        /// Raw value found in the environment.
        value: String,
        /// Human description of the accepted shape.
        expected: &'static str,
    },
}
