use axum::{Router, middleware, routing::get};

use crate::authz;

pub mod roles;
pub mod system;
pub mod users;

/// Base path of the authorization-management surface.
pub const AUTHORIZATION_BASE: &str = "/api/v1/authorization";

/// Router for all authenticated (tenant-scoped) endpoints.
pub fn router() -> Router {
    let management = Router::new()
        .merge(roles::router())
        .merge(users::router())
        .layer(middleware::from_fn(authz::require_admin));

    Router::new()
        .route("/whoami", get(system::whoami))
        .nest(AUTHORIZATION_BASE, management)
}
