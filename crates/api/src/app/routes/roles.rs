//! Role CRUD. Every route sits behind the Admin gate.

use std::sync::Arc;

use axum::{
    Form, Json, Router,
    extract::{Extension, Path, rejection::FormRejection},
    http::StatusCode,
    routing::get,
};

use bizhub_core::RoleId;

use crate::app::dto::{
    ApiResponse, CreateRoleForm, DeletedDto, DeletedEnvelope, EditRoleForm, ErrorBody, RoleDto,
    RoleEnvelope, RoleListEnvelope,
};
use crate::app::errors::ApiError;
use crate::app::services::AppServices;
use crate::context::TenantContext;

pub fn router() -> Router {
    Router::new()
        .route("/roles", get(get_role_list).post(create_role).put(edit_role))
        .route("/roles/:id", get(get_role_by_id).delete(delete_role))
}

fn parse_role_id(raw: &str) -> Result<RoleId, ApiError> {
    Ok(raw.trim().parse::<RoleId>()?)
}

fn form_rejection(rejection: FormRejection) -> ApiError {
    ApiError::Validation(rejection.body_text())
}

#[utoipa::path(
    get,
    path = "/api/v1/authorization/roles/{id}",
    params(("id" = String, Path, description = "Role id (UUID)")),
    responses(
        (status = 200, description = "Role found", body = RoleEnvelope),
        (status = 400, description = "Malformed id", body = ErrorBody),
        (status = 403, description = "Caller is not an Admin", body = ErrorBody),
        (status = 404, description = "No such role", body = ErrorBody),
    ),
    security(("bearer_auth" = [])),
    tag = "Authorization"
)]
pub async fn get_role_by_id(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<RoleDto>>, ApiError> {
    let role_id = parse_role_id(&id)?;
    let role = services.manager.get_role_by_id(tenant.tenant_id(), role_id).await?;
    Ok(Json(ApiResponse::ok(role.into())))
}

#[utoipa::path(
    get,
    path = "/api/v1/authorization/roles",
    responses(
        (status = 200, description = "All roles of the tenant, by name", body = RoleListEnvelope),
        (status = 403, description = "Caller is not an Admin", body = ErrorBody),
    ),
    security(("bearer_auth" = [])),
    tag = "Authorization"
)]
pub async fn get_role_list(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
) -> Result<Json<ApiResponse<Vec<RoleDto>>>, ApiError> {
    let roles = services.manager.get_role_list(tenant.tenant_id()).await?;
    Ok(Json(ApiResponse::ok(roles.into_iter().map(Into::into).collect())))
}

#[utoipa::path(
    post,
    path = "/api/v1/authorization/roles",
    request_body(content = CreateRoleForm, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 201, description = "Role created", body = RoleEnvelope),
        (status = 400, description = "Invalid name", body = ErrorBody),
        (status = 403, description = "Caller is not an Admin", body = ErrorBody),
        (status = 409, description = "Name already taken", body = ErrorBody),
    ),
    security(("bearer_auth" = [])),
    tag = "Authorization"
)]
pub async fn create_role(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    form: Result<Form<CreateRoleForm>, FormRejection>,
) -> Result<(StatusCode, Json<ApiResponse<RoleDto>>), ApiError> {
    let Form(form) = form.map_err(form_rejection)?;
    let role = services.manager.create_role(tenant.tenant_id(), &form.name).await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok(role.into()).with_message("role created")),
    ))
}

#[utoipa::path(
    put,
    path = "/api/v1/authorization/roles",
    request_body(content = EditRoleForm, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 200, description = "Role renamed", body = RoleEnvelope),
        (status = 400, description = "Invalid id or name", body = ErrorBody),
        (status = 403, description = "Caller is not an Admin", body = ErrorBody),
        (status = 404, description = "No such role", body = ErrorBody),
        (status = 409, description = "Name already taken", body = ErrorBody),
    ),
    security(("bearer_auth" = [])),
    tag = "Authorization"
)]
pub async fn edit_role(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    form: Result<Form<EditRoleForm>, FormRejection>,
) -> Result<Json<ApiResponse<RoleDto>>, ApiError> {
    let Form(form) = form.map_err(form_rejection)?;
    let role_id = parse_role_id(&form.id)?;
    let role = services
        .manager
        .edit_role(tenant.tenant_id(), role_id, &form.name)
        .await?;
    Ok(Json(ApiResponse::ok(role.into()).with_message("role updated")))
}

#[utoipa::path(
    delete,
    path = "/api/v1/authorization/roles/{id}",
    params(("id" = String, Path, description = "Role id (UUID)")),
    responses(
        (status = 200, description = "Role deleted", body = DeletedEnvelope),
        (status = 400, description = "Malformed id", body = ErrorBody),
        (status = 403, description = "Caller is not an Admin", body = ErrorBody),
        (status = 404, description = "No such role", body = ErrorBody),
        (status = 409, description = "Role is still assigned to users", body = ErrorBody),
    ),
    security(("bearer_auth" = [])),
    tag = "Authorization"
)]
pub async fn delete_role(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<DeletedDto>>, ApiError> {
    let role_id = parse_role_id(&id)?;
    services.manager.delete_role(tenant.tenant_id(), role_id).await?;
    Ok(Json(
        ApiResponse::ok(DeletedDto { id: *role_id.as_uuid() }).with_message("role deleted"),
    ))
}
