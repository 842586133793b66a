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

//! HTTP surface for the pieces that touch the core: task control, run
//! statistics, validation sweeps, outbox administration, the change
//! webhooks, liveness, and metrics.
//!
//! Handlers stay thin; every decision lives in the engine, the validation
//! engine, or the stores.

pub mod error;
pub mod router;
pub mod state;

pub use error::ApiError;
pub use router::{build_router, serve};
pub use state::AppState;
