//! Route-level authorization: the Admin role gate and claim-policy guards.
//!
//! Both run after `auth_middleware`, so a missing principal means the router
//! was wired without authentication and the request is refused.

use axum::{
    Extension, Router,
    extract::{Request, State},
    middleware::{self, Next},
    response::{IntoResponse, Response},
};

use bizhub_auth::{PolicyError, PolicyGuard, PolicyRegistry, Role, authorize_policy, require_role};

use crate::app::errors::ApiError;
use crate::context::PrincipalContext;

/// Require role "Admin" for every route of the wrapped router.
pub async fn require_admin(
    principal: Option<Extension<PrincipalContext>>,
    req: Request,
    next: Next,
) -> Response {
    let Some(Extension(principal)) = principal else {
        return ApiError::Unauthorized("missing principal".into()).into_response();
    };

    if let Err(err) = require_role(principal.principal(), &Role::ADMIN) {
        tracing::info!(user_id = %principal.user_id(), "admin gate denied request");
        return ApiError::from(err).into_response();
    }

    next.run(req).await
}

/// Guard the wrapped router with a named policy, resolved against `registry`
/// when the router is built.
pub fn with_policy(router: Router, registry: &PolicyRegistry, policy: &str) -> Result<Router, PolicyError> {
    let guard = registry.guard(policy)?;
    Ok(router.route_layer(middleware::from_fn_with_state(guard, policy_middleware)))
}

async fn policy_middleware(
    State(guard): State<PolicyGuard>,
    principal: Option<Extension<PrincipalContext>>,
    req: Request,
    next: Next,
) -> Response {
    let Some(Extension(principal)) = principal else {
        return ApiError::Unauthorized("missing principal".into()).into_response();
    };

    if let Err(err) = authorize_policy(principal.principal(), &guard) {
        tracing::info!(
            user_id = %principal.user_id(),
            policy = %guard.policy().name,
            "policy denied request"
        );
        return ApiError::from(err).into_response();
    }

    next.run(req).await
}
