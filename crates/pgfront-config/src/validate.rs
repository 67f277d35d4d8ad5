//! Validation helpers shared by the settings resolver and admin identity
//! service.

use crate::error::ConfigError;
use crate::model::ApiKeyRateLimit;

/// Maps a dotted setting key (`email.smtp_host`) to the environment
/// variable that overrides it (`PGFRONT_EMAIL_SMTP_HOST`).
#[must_use]
pub fn env_var_name(key: &str) -> String {
    let mut name = String::with_capacity(key.len() + 8);
    name.push_str("PGFRONT_");
    for ch in key.chars() {
        if ch == '.' || ch == '-' {
            name.push('_');
        } else {
            name.push(ch.to_ascii_uppercase());
        }
    }
    name
}

pub(crate) fn validate_api_key_rate_limit(limit: &ApiKeyRateLimit) -> Result<(), ConfigError> {
    if limit.burst == 0 {
        return Err(ConfigError::InvalidValue {
            key: "api_keys.rate_limit.burst".to_string(),
            reason: "must be positive".to_string(),
        });
    }

    if limit.replenish_period.as_secs() == 0 {
        return Err(ConfigError::InvalidValue {
            key: "api_keys.rate_limit.per_seconds".to_string(),
            reason: "must be at least 1 second".to_string(),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn maps_dotted_key_to_env_var_name() {
        assert_eq!(env_var_name("email.smtp_host"), "PGFRONT_EMAIL_SMTP_HOST");
        assert_eq!(env_var_name("storage.max-upload-bytes"), "PGFRONT_STORAGE_MAX_UPLOAD_BYTES");
    }

    #[test]
    fn rejects_zero_burst_rate_limit() {
        let limit = ApiKeyRateLimit {
            burst: 0,
            replenish_period: Duration::from_secs(60),
        };
        assert!(validate_api_key_rate_limit(&limit).is_err());
    }

    #[test]
    fn accepts_valid_rate_limit() {
        let limit = ApiKeyRateLimit {
            burst: 10,
            replenish_period: Duration::from_secs(60),
        };
        assert!(validate_api_key_rate_limit(&limit).is_ok());
    }
}
