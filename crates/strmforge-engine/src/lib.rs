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

//! Task execution engine: the bounded executor pool with per-task single
//! flight, the cron scheduler, and the webhook dispatcher.
//!
//! The database owns run state; the engine reconciles its in-memory pieces
//! (schedule handles, cancellation tokens) against it on startup and keeps
//! the single-flight invariant through the registry's compare-and-set.

pub mod engine;
pub mod error;
pub mod scheduler;
pub mod webhook;

pub use engine::{EngineDeps, EngineOptions, TaskEngine};
pub use error::EngineError;
pub use scheduler::Scheduler;
pub use webhook::WebhookDispatcher;
