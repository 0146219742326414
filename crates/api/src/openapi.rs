//! OpenAPI document generated from handler metadata, served with Swagger UI.

use axum::Router;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;

use crate::app::{dto, routes};

#[derive(OpenApi)]
#[openapi(
    paths(
        routes::system::health,
        routes::system::whoami,
        routes::roles::get_role_by_id,
        routes::roles::get_role_list,
        routes::roles::create_role,
        routes::roles::edit_role,
        routes::roles::delete_role,
        routes::users::manage_user_roles,
        routes::users::update_user_roles,
        routes::users::manage_user_claims,
        routes::users::update_user_claims,
    ),
    components(
        schemas(
            dto::CreateRoleForm,
            dto::EditRoleForm,
            dto::UpdateUserRolesRequest,
            dto::UpdateUserClaimsRequest,
            dto::ClaimDto,
            dto::ErrorBody,
            dto::RoleDto,
            dto::DeletedDto,
            dto::UserRoleDto,
            dto::ManagedUserRolesDto,
            dto::UserClaimDto,
            dto::ManagedUserClaimsDto,
            dto::AssignmentChangesDto,
            dto::PolicyDecisionDto,
            dto::WhoAmIDto,
            dto::RoleEnvelope,
            dto::RoleListEnvelope,
            dto::DeletedEnvelope,
            dto::UserRolesEnvelope,
            dto::UserClaimsEnvelope,
            dto::ChangesEnvelope,
            dto::WhoAmIEnvelope,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Authorization", description = "Role management and per-user role/claim assignment (Admin only)"),
        (name = "System", description = "Health and caller introspection"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

/// Swagger UI at `/swagger-ui`, document at `/api-docs/openapi.json`.
pub fn router() -> Router {
    Router::new().merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_every_management_route() {
        let doc = ApiDoc::openapi();
        let paths: Vec<&str> = doc.paths.paths.keys().map(String::as_str).collect();
        for expected in [
            "/api/v1/authorization/roles",
            "/api/v1/authorization/roles/{id}",
            "/api/v1/authorization/users/{id}/roles",
            "/api/v1/authorization/users/roles",
            "/api/v1/authorization/users/{id}/claims",
            "/api/v1/authorization/users/claims",
            "/health",
            "/whoami",
        ] {
            assert!(paths.contains(&expected), "missing {expected}");
        }
    }

    #[test]
    fn bearer_scheme_is_registered() {
        let doc = ApiDoc::openapi();
        let components = doc.components.expect("components");
        assert!(components.security_schemes.contains_key("bearer_auth"));
        assert!(components.schemas.contains_key("RoleEnvelope"));
    }
}
