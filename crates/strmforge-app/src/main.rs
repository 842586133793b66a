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

//! Binary entrypoint that wires the strmforge services together and blocks
//! until shutdown.

use strmforge_app::bootstrap;
use strmforge_app::error::AppResult;

#[tokio::main]
async fn main() -> AppResult<()> {
    bootstrap::run_app().await
}
