//! JWT verification and end-user [`Identity`](pgfront_data::Identity)
//! extraction.
//!
//! Verification itself is delegated entirely to the `jsonwebtoken` crate
//! (HS256, signing secret resolved through the settings layer); this module
//! only maps validated claims onto the RLS identity type and enforces the
//! revocation denylist.

use pgfront_data::{Identity, Role};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::service::{ConfigService, SettingsFacade};

/// Claims expected in an end-user access token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (end-user id).
    pub sub: Option<String>,
    /// RLS role string (`anon`, `authenticated`, `service_role`, or the
    /// deprecated `admin` alias).
    pub role: String,
    /// Expiration, Unix seconds (enforced by `jsonwebtoken` itself).
    pub exp: i64,
    /// Token identifier, checked against the revocation denylist when
    /// present.
    pub jti: Option<String>,
}

/// Verify `token`'s signature and expiry, then resolve it to an
/// [`Identity`], consulting the revocation denylist when the token carries
/// a `jti`.
///
/// # Errors
///
/// Returns an error if the signature/expiry check fails, the `role` claim
/// is not a recognized RLS role, or the token has been revoked.
pub async fn verify(service: &ConfigService, token: &str, hmac_secret: &[u8]) -> Result<Identity, ConfigError> {
    let claims = decode_claims(token, hmac_secret)?;

    if let Some(jti) = &claims.jti {
        if service.is_token_revoked(jti).await? {
            return Err(ConfigError::InvalidValue {
                key: "jwt.jti".to_string(),
                reason: "token has been revoked".to_string(),
            });
        }
    }

    let role = normalize_role(&claims.role).ok_or_else(|| ConfigError::InvalidValue {
        key: "jwt.role".to_string(),
        reason: format!("unrecognized role claim '{}'", claims.role),
    })?;

    Ok(match claims.sub {
        Some(subject) => Identity::authenticated(subject, role),
        None => Identity::anonymous(),
    })
}

fn decode_claims(token: &str, hmac_secret: &[u8]) -> Result<Claims, ConfigError> {
    use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};

    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = true;

    decode::<Claims>(token, &DecodingKey::from_secret(hmac_secret), &validation)
        .map(|data| data.claims)
        .map_err(|_| ConfigError::InvalidValue {
            key: "jwt".to_string(),
            reason: "signature or expiry check failed".to_string(),
        })
}

/// Normalizes the deprecated `admin` role spelling onto `dashboard_admin`'s
/// orthogonal path — but `dashboard_admin` never carries RLS claims, so
/// both map to `None` here; only genuine RLS roles resolve to `Some`.
fn normalize_role(raw: &str) -> Option<Role> {
    match raw {
        "admin" | "dashboard_admin" => None,
        other => Role::parse(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_known_roles() {
        assert_eq!(normalize_role("anon"), Some(Role::Anon));
        assert_eq!(normalize_role("authenticated"), Some(Role::Authenticated));
        assert_eq!(normalize_role("service_role"), Some(Role::ServiceRole));
    }

    #[test]
    fn admin_aliases_never_resolve_to_an_rls_role() {
        assert_eq!(normalize_role("admin"), None);
        assert_eq!(normalize_role("dashboard_admin"), None);
    }

    #[test]
    fn rejects_unknown_roles() {
        assert_eq!(normalize_role("superuser"), None);
    }
}
