//! Error type for origin calls.

/// Convenience alias for origin results.
pub type Result<T> = std::result::Result<T, OriginError>;

/// Failures surfaced by the origin adapter.
#[derive(Debug, thiserror::Error)]
pub enum OriginError {
    /// The transport failed or the service answered outside 2xx after the
    /// retry budget was spent.
    #[error("origin unavailable after {attempts} attempts: {detail}")]
    Upstream {
        /// Total attempts made, including the first.
        attempts: u32,
        /// Last HTTP status observed, when the service answered at all.
        status: Option<u16>,
        /// Last transport or status detail.
        detail: String,
    },
    /// The service answered 2xx but reported an application-level failure.
    #[error("origin rejected the request (code {code}): {message}")]
    Api {
        /// Application code carried in the response body.
        code: i64,
        /// Message carried in the response body.
        message: String,
    },
    /// The response body did not match the documented shape.
    #[error("origin response could not be decoded: {0}")]
    Decode(String),
    /// The configured host or a rendered URL is not valid.
    #[error("origin configuration invalid: {0}")]
    Config(String),
}
