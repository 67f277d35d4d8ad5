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

//! Live PostgreSQL schema introspection and hot-reloadable descriptor cache.
//!
//! Layout: `model.rs` (descriptor types), `cache.rs` (atomic pointer-swap
//! cache), `introspector.rs` (catalog queries), `watcher.rs`
//! (`LISTEN`/`NOTIFY`-with-polling-fallback change detection).

pub mod cache;
pub mod error;
pub mod introspector;
pub mod model;
pub mod watcher;

pub use cache::SchemaCache;
pub use error::{IntrospectError, Result};
pub use introspector::SchemaIntrospector;
pub use model::{
    Catalog, ColumnDescriptor, ForeignKeyDescriptor, FunctionDescriptor, ParameterDescriptor,
    ParameterMode, TableDescriptor, Volatility,
};
pub use watcher::{DEFAULT_POLL_INTERVAL, SCHEMA_CHANGE_CHANNEL, SchemaWatcher};
