//! RLS-scoped transaction wrapper.
//!
//! Every data-plane query is required to pass through [`RlsRepository::with_rls`],
//! the Rust expression of the `withRLS(ctx, request, fn)` contract: open a
//! transaction, bind the caller's claims as transaction-local settings via
//! `set_config`, run the closure, commit on success or roll back on error.
//! `RlsRepository` deliberately exposes no other method — there is no
//! "escape hatch" that lets a handler run SQL against the pool directly.

use anyhow::{Context, Result};
use serde_json::json;
use sqlx::{PgPool, Postgres, Transaction};

/// Canonical RLS role, in the hierarchy `anon < authenticated < service_role`.
///
/// `dashboard_admin` and its deprecated alias `admin` never appear here —
/// they authenticate through `ApiKey`/`SetupToken` and never carry RLS
/// claims, so they cannot be represented by this type. Restricting this to a
/// fixed enum (rather than accepting an arbitrary role string) means the
/// value interpolated into `request.jwt.claims` can never originate from
/// unconstrained request input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Unauthenticated caller.
    Anon,
    /// Authenticated end user.
    Authenticated,
    /// Trusted service-to-service caller, bypasses most RLS policies by
    /// convention of the policies themselves (not by this wrapper).
    ServiceRole,
}

impl Role {
    /// Parse a role string as accepted from a JWT `role` claim or an admin
    /// override, normalizing the deprecated `admin` spelling.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "anon" => Some(Self::Anon),
            "authenticated" => Some(Self::Authenticated),
            "service_role" => Some(Self::ServiceRole),
            _ => None,
        }
    }

    /// The literal written into the `role` field of `request.jwt.claims`.
    #[must_use]
    pub const fn as_claim(self) -> &'static str {
        match self {
            Self::Anon => "anon",
            Self::Authenticated => "authenticated",
            Self::ServiceRole => "service_role",
        }
    }
}

/// The authenticated (or anonymous) caller a request is scoped to.
#[derive(Debug, Clone)]
pub struct Identity {
    /// Resolved RLS role.
    pub role: Role,
    /// Subject claim (`sub`), present iff `role != Role::Anon`.
    pub subject: Option<String>,
}

impl Identity {
    /// The unauthenticated identity.
    #[must_use]
    pub const fn anonymous() -> Self {
        Self {
            role: Role::Anon,
            subject: None,
        }
    }

    /// An authenticated identity carrying a subject claim.
    #[must_use]
    pub const fn authenticated(subject: String, role: Role) -> Self {
        Self {
            role,
            subject: Some(subject),
        }
    }

    fn claims_json(&self) -> String {
        json!({
            "sub": self.subject,
            "role": self.role.as_claim(),
        })
        .to_string()
    }
}

/// Thin repository scoping a transaction to a single caller identity.
///
/// The only public constructor requires a pool and an [`Identity`]; the only
/// public method is [`with_rls`](Self::with_rls). There is no way to obtain a
/// raw connection from this type, so code cannot accidentally run a
/// data-plane query outside of RLS impersonation.
pub struct RlsRepository<'a> {
    pool: &'a PgPool,
    identity: Identity,
}

impl<'a> RlsRepository<'a> {
    /// Scope subsequent queries to `identity` against `pool`.
    #[must_use]
    pub const fn new(pool: &'a PgPool, identity: Identity) -> Self {
        Self { pool, identity }
    }

    /// Open a transaction, bind `request.jwt.claims` for its duration, run
    /// `op`, and commit or roll back depending on the result.
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction cannot be started or committed,
    /// or propagates whatever error `op` returns (after rolling back).
    #[must_use = "the wrapped operation must be awaited for the transaction to run"]
    pub async fn with_rls<T, F>(&self, op: F) -> Result<T>
    where
        F: for<'t> FnOnce(
            &'t mut Transaction<'_, Postgres>,
        ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<T>> + Send + 't>>,
    {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("failed to open RLS-scoped transaction")?;

        let claims = self.identity.claims_json();
        sqlx::query("SELECT set_config('request.jwt.claims', $1, true)")
            .bind(claims)
            .execute(&mut *tx)
            .await
            .context("failed to bind request.jwt.claims")?;

        match op(&mut tx).await {
            Ok(value) => {
                tx.commit().await.context("failed to commit RLS transaction")?;
                tracing::debug!(role = self.identity.role.as_claim(), "rls transaction committed");
                Ok(value)
            }
            Err(error) => {
                // Errors from `op` already carry their own context; rolling
                // back is best-effort and its failure shouldn't mask the
                // original error.
                let _ = tx.rollback().await;
                tracing::debug!(role = self.identity.role.as_claim(), error = %error, "rls transaction rolled back");
                Err(error)
            }
        }
    }
}

/// Connection handle for admin/DDL operations, bypassing RLS entirely.
///
/// Cannot be constructed from a request-scoped [`Identity`] — only from a
/// bare `PgPool` — so a handler cannot silently escalate an end-user request
/// into an RLS-bypassing one.
#[derive(Clone)]
pub struct AdminPool {
    pool: PgPool,
}

impl AdminPool {
    /// Wrap a pool for admin/DDL use. Callers must ensure this pool is never
    /// exposed to ordinary data-plane request handlers.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Borrow the underlying pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_roles_and_rejects_others() {
        assert_eq!(Role::parse("anon"), Some(Role::Anon));
        assert_eq!(Role::parse("authenticated"), Some(Role::Authenticated));
        assert_eq!(Role::parse("service_role"), Some(Role::ServiceRole));
        assert_eq!(Role::parse("dashboard_admin"), None);
        assert_eq!(Role::parse("admin"), None);
    }

    #[test]
    fn anonymous_identity_has_no_subject() {
        let identity = Identity::anonymous();
        assert_eq!(identity.role, Role::Anon);
        assert!(identity.subject.is_none());
    }

    #[test]
    fn claims_json_embeds_role_and_subject() {
        let identity = Identity::authenticated("user-1".to_string(), Role::Authenticated);
        let claims = identity.claims_json();
        assert!(claims.contains("\"sub\":\"user-1\""));
        assert!(claims.contains("\"role\":\"authenticated\""));
    }

    #[test]
    fn anonymous_claims_json_has_null_subject() {
        let claims = Identity::anonymous().claims_json();
        assert!(claims.contains("\"sub\":null"));
        assert!(claims.contains("\"role\":\"anon\""));
    }
}
