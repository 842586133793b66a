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

//! Pointer-file generation engine.
//!
//! One [`StrmGenerator`] drives one run of one task: it walks the remote
//! tree through the origin seam, classifies every entry, writes `.strm`
//! pointers and companion files with two-phase (temp + rename) writes,
//! keeps the history store current, and folds everything into a
//! [`strmforge_events::RunSummary`] for the executor. Single-entry webhook
//! variants reuse the same per-entry paths without a walk.

mod fsutil;
pub mod service;

pub use service::StrmGenerator;
