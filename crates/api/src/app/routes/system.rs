use std::sync::Arc;

use axum::{Json, extract::Extension, http::StatusCode};

use bizhub_auth::explain_policies;

use crate::app::dto::{ApiResponse, ClaimDto, ErrorBody, WhoAmIDto, WhoAmIEnvelope};
use crate::app::services::AppServices;
use crate::context::{PrincipalContext, TenantContext};

#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Service is up")),
    tag = "System"
)]
pub async fn health() -> StatusCode {
    StatusCode::OK
}

/// Caller identity and the policies it satisfies.
#[utoipa::path(
    get,
    path = "/whoami",
    responses(
        (status = 200, description = "Authenticated caller", body = WhoAmIEnvelope),
        (status = 401, description = "Missing or invalid token", body = ErrorBody),
    ),
    security(("bearer_auth" = [])),
    tag = "System"
)]
pub async fn whoami(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> Json<ApiResponse<WhoAmIDto>> {
    let policies = explain_policies(principal.principal(), services.policies())
        .into_iter()
        .map(Into::into)
        .collect();

    Json(ApiResponse::ok(WhoAmIDto {
        tenant_id: *tenant.tenant_id().as_uuid(),
        user_id: *principal.user_id().as_uuid(),
        roles: principal.roles().iter().map(|r| r.as_str().to_string()).collect(),
        claims: principal.claims().iter().map(ClaimDto::from).collect(),
        policies,
    }))
}
