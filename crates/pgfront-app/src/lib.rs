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
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]

//! Process bootstrap wiring for the pgfront façade.
//!
//! Layout: `bootstrap.rs` (dependency construction and server launch),
//! `tasks.rs` (background schema watcher and upload-session sweeper).

/// Application bootstrap and environment loading.
pub mod bootstrap;
/// Background task supervision: schema watcher, upload-session sweeper.
pub mod tasks;

/// Application-level error types.
pub mod error;

pub use bootstrap::run_app;
