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

//! AList-compatible origin adapter.
//!
//! The adapter owns pacing (a global minimum gap between call starts),
//! bounded retries, pagination, playback-URL rendering, and direct
//! downloads. It implements the [`strmforge_core::OriginClient`] seam so the
//! generator never touches HTTP directly.

pub mod client;
pub mod error;

pub use client::AlistClient;
pub use error::{OriginError, Result};
