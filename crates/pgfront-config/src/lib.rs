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

//! Settings and secrets resolver, plus admin identity (API keys, setup
//! tokens, JWT revocation), for the data-plane façade.
//!
//! `resolve(key)` implements the three-tier contract: an environment
//! variable override, else the encrypted-at-rest DB value, else a built-in
//! default. Secrets share the key space but only ever expose metadata
//! (`{set, overridden}`) except through a privileged decrypt path.

pub mod error;
pub mod jwt;
pub mod model;
pub mod secrets;
pub mod service;
pub mod validate;

pub use error::{ConfigError, ConfigResult};
pub use jwt::Claims;
pub use model::{
    ApiKeyAuth, ApiKeyPatch, ApiKeyRateLimit, AppliedChanges, DashboardUser, Invitation,
    RevokedToken, SecretMetadata, SecretPatch, Setting, SettingPatch, SettingsChange,
    SettingsChangeset, SetupToken,
};
pub use service::{ConfigService, ConfigWatcher, SettingsFacade, SettingsStream};
