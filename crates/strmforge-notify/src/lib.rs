#![forbid(unsafe_code)]
#![deny(
    warnings,
    dead_code,
    unused,
    unused_imports,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::cargo,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::multiple_crate_versions)]

//! Notification outbox: the polling delivery worker, the channel senders,
//! and the event-bus bridge that turns run and validation outcomes into
//! queue rows.
//!
//! Delivery is at-least-once: the queue bounds attempts at
//! `max_retries + 1` per row, and the channel senders tolerate repeats.

pub mod bridge;
pub mod channel;
pub mod error;
pub mod payload;
pub mod template;
pub mod worker;

pub use bridge::EventBridge;
pub use channel::{
    ChannelProvider, EmbyChannel, NotificationChannel, SettingsChannelProvider, TelegramChannel,
    WeworkChannel,
};
pub use error::NotifyError;
pub use worker::OutboxWorker;
