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
#![allow(unexpected_cfgs)]
#![allow(clippy::multiple_crate_versions)]

//! Domain model and engine-agnostic interfaces shared across the workspace.
//!
//! The crate carries the persistent entities (tasks, run records, file
//! history, the notification queue, validation sweeps), the pure companion
//! classifier, and the [`OriginClient`] seam implemented by the AList
//! adapter.

pub mod classify;
pub mod model;
pub mod origin;

pub use classify::{Classification, classify};
pub use model::{
    FileCategory, FileHistory, MediaType, NewFileHistory, NewTask, NotificationEvent,
    NotificationQueueItem, NotificationStatus, ProcessingStatus, RunTrigger, Task, TaskLog,
    TaskStats, TimeRange, ValidationConfig, ValidationStatus, ValidationTask, ValidationType,
};
pub use origin::{FileChangeEvent, FileEventKind, OriginClient, RemoteEntry};
