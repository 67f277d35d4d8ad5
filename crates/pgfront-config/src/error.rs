//! Error types for the settings/secrets resolver and admin identity service.

use argon2::password_hash::Error as PasswordHashError;
use thiserror::Error;

/// Primary error type for configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Attempted to modify a setting key marked as immutable.
    #[error("immutable setting '{key}' cannot be modified")]
    ImmutableSetting {
        /// Key of the immutable setting.
        key: String,
    },

    /// The caller attempted to write a key that is overridden by an
    /// environment variable; env always wins, so the write is rejected
    /// rather than silently discarded.
    #[error("setting '{key}' is overridden by an environment variable")]
    EnvOverride {
        /// Key that has an active environment override.
        key: String,
    },

    /// Setting value failed validation.
    #[error("invalid value for setting '{key}': {reason}")]
    InvalidValue {
        /// Key that failed validation.
        key: String,
        /// Human-readable validation failure.
        reason: String,
    },

    /// A setup token is missing.
    #[error("no active setup token")]
    SetupTokenMissing,
    /// A setup token has expired.
    #[error("setup token expired")]
    SetupTokenExpired,
    /// A setup token did not match the stored hash.
    #[error("invalid setup token")]
    SetupTokenInvalid,

    /// Failed to hash secret material (API key secret, setup token).
    #[error("failed to hash secret material")]
    SecretHashFailed {
        /// Underlying hashing error.
        detail: PasswordHashError,
    },
    /// Stored secret hash payload could not be parsed.
    #[error("invalid stored password hash")]
    StoredHashInvalid {
        /// Underlying parse error.
        detail: PasswordHashError,
    },

    /// Secret ciphertext could not be decrypted, e.g. due to a master-key
    /// mismatch or corrupted ciphertext.
    #[error("failed to decrypt secret '{key}'")]
    SecretDecryptFailed {
        /// Key of the secret that failed to decrypt.
        key: String,
    },

    /// A LISTEN/NOTIFY payload could not be parsed into a `SettingsChange`.
    #[error("invalid settings notification payload")]
    NotificationPayloadInvalid,

    /// An underlying database operation failed.
    #[error("database operation '{operation}' failed")]
    Database {
        /// Operation identifier, for logging.
        operation: &'static str,
        /// Source database error.
        #[source]
        source: sqlx::Error,
    },

    /// An underlying data-plane operation (via `pgfront-data`) failed.
    #[error("data access operation '{operation}' failed")]
    DataAccess {
        /// Operation identifier, for logging.
        operation: &'static str,
        /// Source error from `pgfront-data`.
        #[source]
        source: pgfront_data::DataError,
    },
}

/// Convenience alias for configuration results.
pub type ConfigResult<T> = Result<T, ConfigError>;
