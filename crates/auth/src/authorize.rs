use serde::Serialize;
use thiserror::Error;

use crate::{PolicyGuard, PolicyRegistry, Principal, Role};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("forbidden: role '{0}' required")]
    MissingRole(String),

    #[error("forbidden: policy '{policy}' requires claim '{claim_key}'")]
    MissingClaim { policy: String, claim_key: String },

    #[error("forbidden: policy '{0}' is not registered")]
    UnknownPolicy(String),
}

/// Role gate.
///
/// - No IO
/// - No panics
/// - Trusts the principal's roles as validated from the token
pub fn require_role(principal: &Principal, role: &Role) -> Result<(), AuthzError> {
    if principal.has_role(role) {
        Ok(())
    } else {
        Err(AuthzError::MissingRole(role.as_str().to_string()))
    }
}

/// Policy gate for routes guarded by a resolved [`PolicyGuard`].
pub fn authorize_policy(principal: &Principal, guard: &PolicyGuard) -> Result<(), AuthzError> {
    guard.check(&principal.claims)
}

/// Outcome of one policy for one principal (for display/audit).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PolicyDecision {
    pub policy: String,
    pub claim_key: String,
    pub required_value: String,
    pub granted: bool,
}

/// Evaluate every registered policy against a principal.
///
/// Answers "which guarded endpoints would let this caller through?".
pub fn explain_policies(principal: &Principal, registry: &PolicyRegistry) -> Vec<PolicyDecision> {
    registry
        .iter()
        .map(|p| PolicyDecision {
            policy: p.name.clone(),
            claim_key: p.claim_key.clone(),
            required_value: p.claim_value.clone(),
            granted: p.is_satisfied_by(&principal.claims),
        })
        .collect()
}
