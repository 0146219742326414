//! Per-user role and claim assignment. Every route sits behind the Admin gate.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, rejection::JsonRejection},
    routing::{get, put},
};

use bizhub_auth::UserClaim;
use bizhub_core::{RoleId, UserId};

use crate::app::dto::{
    ApiResponse, AssignmentChangesDto, ChangesEnvelope, ErrorBody, ManagedUserClaimsDto,
    ManagedUserRolesDto, UpdateUserClaimsRequest, UpdateUserRolesRequest, UserClaimsEnvelope,
    UserRolesEnvelope,
};
use crate::app::errors::ApiError;
use crate::app::services::AppServices;
use crate::context::TenantContext;

pub fn router() -> Router {
    Router::new()
        .route("/users/:id/roles", get(manage_user_roles))
        .route("/users/roles", put(update_user_roles))
        .route("/users/:id/claims", get(manage_user_claims))
        .route("/users/claims", put(update_user_claims))
}

fn parse_user_id(raw: &str) -> Result<UserId, ApiError> {
    Ok(raw.trim().parse::<UserId>()?)
}

fn json_rejection(rejection: JsonRejection) -> ApiError {
    ApiError::Validation(rejection.body_text())
}

#[utoipa::path(
    get,
    path = "/api/v1/authorization/users/{id}/roles",
    params(("id" = String, Path, description = "User id (UUID)")),
    responses(
        (status = 200, description = "Role catalog with the user's assignments", body = UserRolesEnvelope),
        (status = 400, description = "Malformed id", body = ErrorBody),
        (status = 403, description = "Caller is not an Admin", body = ErrorBody),
        (status = 404, description = "No such user", body = ErrorBody),
    ),
    security(("bearer_auth" = [])),
    tag = "Authorization"
)]
pub async fn manage_user_roles(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<ManagedUserRolesDto>>, ApiError> {
    let user_id = parse_user_id(&id)?;
    let view = services.manager.manage_user_roles(tenant.tenant_id(), user_id).await?;
    Ok(Json(ApiResponse::ok(view.into())))
}

#[utoipa::path(
    put,
    path = "/api/v1/authorization/users/roles",
    request_body = UpdateUserRolesRequest,
    responses(
        (status = 200, description = "Role set replaced", body = ChangesEnvelope),
        (status = 400, description = "Malformed body", body = ErrorBody),
        (status = 403, description = "Caller is not an Admin", body = ErrorBody),
        (status = 404, description = "Unknown user or role", body = ErrorBody),
    ),
    security(("bearer_auth" = [])),
    tag = "Authorization"
)]
pub async fn update_user_roles(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    body: Result<Json<UpdateUserRolesRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<AssignmentChangesDto>>, ApiError> {
    let Json(body) = body.map_err(json_rejection)?;
    let role_ids: Vec<RoleId> = body.role_ids.into_iter().map(RoleId::from_uuid).collect();
    let changes = services
        .manager
        .update_user_roles(tenant.tenant_id(), UserId::from_uuid(body.user_id), &role_ids)
        .await?;
    Ok(Json(ApiResponse::ok(changes.into()).with_message("user roles updated")))
}

#[utoipa::path(
    get,
    path = "/api/v1/authorization/users/{id}/claims",
    params(("id" = String, Path, description = "User id (UUID)")),
    responses(
        (status = 200, description = "Claim catalog with the user's values", body = UserClaimsEnvelope),
        (status = 400, description = "Malformed id", body = ErrorBody),
        (status = 403, description = "Caller is not an Admin", body = ErrorBody),
        (status = 404, description = "No such user", body = ErrorBody),
    ),
    security(("bearer_auth" = [])),
    tag = "Authorization"
)]
pub async fn manage_user_claims(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<ManagedUserClaimsDto>>, ApiError> {
    let user_id = parse_user_id(&id)?;
    let view = services.manager.manage_user_claims(tenant.tenant_id(), user_id).await?;
    Ok(Json(ApiResponse::ok(view.into())))
}

#[utoipa::path(
    put,
    path = "/api/v1/authorization/users/claims",
    request_body = UpdateUserClaimsRequest,
    responses(
        (status = 200, description = "Claim set replaced", body = ChangesEnvelope),
        (status = 400, description = "Malformed body or invalid claims", body = ErrorBody),
        (status = 403, description = "Caller is not an Admin", body = ErrorBody),
        (status = 404, description = "No such user", body = ErrorBody),
    ),
    security(("bearer_auth" = [])),
    tag = "Authorization"
)]
pub async fn update_user_claims(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    body: Result<Json<UpdateUserClaimsRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<AssignmentChangesDto>>, ApiError> {
    let Json(body) = body.map_err(json_rejection)?;
    let claims: Vec<UserClaim> = body.claims.into_iter().map(Into::into).collect();
    let changes = services
        .manager
        .update_user_claims(tenant.tenant_id(), UserId::from_uuid(body.user_id), &claims)
        .await?;
    Ok(Json(ApiResponse::ok(changes.into()).with_message("user claims updated")))
}
