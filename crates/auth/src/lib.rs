//! `bizhub-auth`: pure authorization boundary (roles, claims, policies, tokens).
//!
//! This crate is decoupled from HTTP and storage.

pub mod authorize;
pub mod claims;
pub mod policy;
pub mod principal;
pub mod roles;
pub mod token;

pub use authorize::{AuthzError, PolicyDecision, authorize_policy, explain_policies, require_role};
pub use claims::{JwtClaims, TokenValidationError, UserClaim, validate_claims};
pub use policy::{Action, Policy, PolicyError, PolicyGuard, PolicyRegistry, Resource};
pub use principal::Principal;
pub use roles::Role;
pub use token::{
    Hs256TokenService, JwtSettings, MAX_ACCESS_TOKEN_MINUTES, TokenError, TokenService, claims_for,
};
