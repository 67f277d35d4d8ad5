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

//! RLS-scoped transaction wrapper, CRUD/batch engine, and RPC execution
//! engine for the data plane.
//!
//! Every data-plane query passes through [`rls::RlsRepository::with_rls`];
//! the [`crud`] and [`rpc`] modules build the parameterized statements that
//! run inside it. None of these modules ever concatenates request input
//! into SQL text — values are always bound through
//! [`pgfront_query::SqlValue`] placeholders.

pub mod crud;
pub mod error;
pub mod exec;
pub mod rls;
pub mod rows;
pub mod rpc;

pub use error::{DataError, Result as DataResult};
pub use exec::{fetch_all, fetch_optional};
pub use rls::{AdminPool, Identity, Role, RlsRepository};
pub use rows::{row_to_json, rows_to_json};
