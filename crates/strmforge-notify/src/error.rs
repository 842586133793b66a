//! Error type for the notification pipeline.

/// Failures surfaced by the outbox worker and the channel senders.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    /// The queue store failed.
    #[error(transparent)]
    Data(#[from] strmforge_data::DataError),
    /// A channel rejected or failed a delivery.
    #[error("delivery via '{channel}' failed: {detail}")]
    Delivery {
        /// Channel key the delivery targeted.
        channel: String,
        /// Failure detail surfaced to the queue row.
        detail: String,
    },
}
