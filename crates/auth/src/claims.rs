use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use bizhub_core::{TenantId, UserId};

use crate::Role;

/// A key/value claim attached to a user (e.g. `"Edit Customer" = "True"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserClaim {
    pub key: String,
    pub value: String,
}

impl UserClaim {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// JWT claims model.
///
/// This is the full set of claims BizHub expects once a token has been
/// decoded and its signature verified. Timestamps are unix seconds so the
/// registered `iat`/`exp` claims stay interoperable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwtClaims {
    /// Subject: the user the token was issued for.
    pub sub: UserId,

    /// Tenant context for the token.
    pub tenant_id: TenantId,

    /// Roles held by the user within the tenant.
    #[serde(default)]
    pub roles: Vec<Role>,

    /// Fine-grained claims evaluated by authorization policies.
    #[serde(default)]
    pub claims: Vec<UserClaim>,

    pub iss: String,
    pub aud: String,
    pub iat: i64,
    pub exp: i64,
}

impl JwtClaims {
    pub fn has_role(&self, role: &Role) -> bool {
        self.roles.iter().any(|r| r == role)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenValidationError {
    #[error("token has expired")]
    Expired,

    #[error("invalid token time window (exp <= iat)")]
    InvalidTimeWindow,
}

/// Deterministically validate the lifetime claims.
///
/// Signature, issuer and audience are checked by the token service; this
/// covers the time window only. `iat` is not compared with `now`, so an
/// issuer whose clock runs ahead still produces usable tokens.
pub fn validate_claims(claims: &JwtClaims, now: DateTime<Utc>) -> Result<(), TokenValidationError> {
    let now = now.timestamp();
    if claims.exp <= claims.iat {
        return Err(TokenValidationError::InvalidTimeWindow);
    }
    if now >= claims.exp {
        return Err(TokenValidationError::Expired);
    }
    Ok(())
}
