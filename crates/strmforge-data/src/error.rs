//! Error type shared by the stores.

/// Convenience alias for data-layer results.
pub type Result<T> = std::result::Result<T, DataError>;

/// Failures surfaced by the data layer.
#[derive(Debug, thiserror::Error)]
pub enum DataError {
    /// The underlying driver reported an error.
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),
    /// A persisted value does not round-trip into its domain type.
    #[error("corrupt row in {context}: {detail}")]
    Decode {
        /// Query or table the row came from.
        context: &'static str,
        /// Human-readable description of the mismatch.
        detail: String,
    },
    /// A settings payload does not deserialise into its typed shape.
    #[error("settings payload for '{key}' is invalid: {source}")]
    Settings {
        /// Config-row key holding the payload.
        key: String,
        /// Underlying JSON error.
        source: serde_json::Error,
    },
    /// A referenced row does not exist.
    #[error("{entity} {id} not found")]
    NotFound {
        /// Entity kind looked up.
        entity: &'static str,
        /// Identifier that missed.
        id: i64,
    },
}

impl DataError {
    /// Build a decode error from any displayable detail.
    #[must_use]
    pub fn decode(context: &'static str, detail: impl std::fmt::Display) -> Self {
        Self::Decode {
            context,
            detail: detail.to_string(),
        }
    }
}
