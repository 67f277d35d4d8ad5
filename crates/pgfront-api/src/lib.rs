#![allow(unexpected_cfgs)]

//! HTTP surface for the pgfront BaaS façade: dynamic REST/RPC routes over a
//! live catalog, the storage subsystem, and the admin/settings surface.
//!
//! Layout mirrors the services it fronts: [`app`] holds shared request
//! state, [`http`] holds routers/handlers/middleware, [`config`] re-exports
//! the settings backend type, [`bootstrap`]/[`error`] wire up the process
//! entry point, and [`openapi`] publishes the generated document.

pub mod app;
pub mod bootstrap;
pub mod config;
pub mod error;
pub mod http;
pub mod models;
pub mod openapi;

pub use app::state::ApiState;
pub use bootstrap::build_api;
pub use config::SharedConfig;
pub use error::{ApiServerError, ApiServerResult};
pub use http::router::ApiServer;
