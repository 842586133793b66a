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

//! Pointer validation: batch HEAD sweeps over historical `.strm` rows and
//! the administrator cleanup of invalid artifacts.
//!
//! At most one sweep runs per process family; the gate lives on the
//! validation-task rows so it also holds across processes sharing a
//! database.

pub mod cleanup;
pub mod engine;
pub mod error;

pub use cleanup::CleanupReport;
pub use engine::ValidationEngine;
pub use error::ValidationError;
