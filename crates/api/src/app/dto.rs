use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use bizhub_auth::{PolicyDecision, UserClaim};
use bizhub_infra::{AssignmentChanges, ManagedUserClaims, ManagedUserRoles, RoleRecord};

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateRoleForm {
    pub name: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct EditRoleForm {
    /// Role id (UUID).
    pub id: String,
    pub name: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateUserRolesRequest {
    pub user_id: Uuid,
    /// Complete desired role set; roles not listed are removed.
    pub role_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ClaimDto {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateUserClaimsRequest {
    pub user_id: Uuid,
    /// Complete desired claim set; claims not listed are removed.
    pub claims: Vec<ClaimDto>,
}

// -------------------------
// Response DTOs
// -------------------------

/// Success envelope shared by every management endpoint.
#[derive(Debug, Serialize, ToSchema)]
#[aliases(
    RoleEnvelope = ApiResponse<RoleDto>,
    RoleListEnvelope = ApiResponse<Vec<RoleDto>>,
    DeletedEnvelope = ApiResponse<DeletedDto>,
    UserRolesEnvelope = ApiResponse<ManagedUserRolesDto>,
    UserClaimsEnvelope = ApiResponse<ManagedUserClaimsDto>,
    ChangesEnvelope = ApiResponse<AssignmentChangesDto>,
    WhoAmIEnvelope = ApiResponse<WhoAmIDto>
)]
pub struct ApiResponse<T> {
    pub succeeded: bool,
    pub message: Option<String>,
    pub data: T,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            succeeded: true,
            message: None,
            data,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorBody {
    /// One of `not_found`, `conflict`, `forbidden`, `validation_error`,
    /// `unauthorized`, `internal_error`.
    pub error: String,
    pub message: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RoleDto {
    pub id: Uuid,
    pub name: String,
}

impl From<RoleRecord> for RoleDto {
    fn from(role: RoleRecord) -> Self {
        Self {
            id: *role.id.as_uuid(),
            name: role.name,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DeletedDto {
    pub id: Uuid,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UserRoleDto {
    pub id: Uuid,
    pub name: String,
    pub has_role: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ManagedUserRolesDto {
    pub user_id: Uuid,
    pub roles: Vec<UserRoleDto>,
}

impl From<ManagedUserRoles> for ManagedUserRolesDto {
    fn from(view: ManagedUserRoles) -> Self {
        Self {
            user_id: *view.user_id.as_uuid(),
            roles: view
                .roles
                .into_iter()
                .map(|r| UserRoleDto {
                    id: *r.id.as_uuid(),
                    name: r.name,
                    has_role: r.has_role,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UserClaimDto {
    pub key: String,
    pub value: Option<String>,
    pub has_claim: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ManagedUserClaimsDto {
    pub user_id: Uuid,
    pub claims: Vec<UserClaimDto>,
}

impl From<ManagedUserClaims> for ManagedUserClaimsDto {
    fn from(view: ManagedUserClaims) -> Self {
        Self {
            user_id: *view.user_id.as_uuid(),
            claims: view
                .claims
                .into_iter()
                .map(|c| UserClaimDto {
                    key: c.key,
                    value: c.value,
                    has_claim: c.has_claim,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AssignmentChangesDto {
    pub added: usize,
    pub removed: usize,
}

impl From<AssignmentChanges> for AssignmentChangesDto {
    fn from(changes: AssignmentChanges) -> Self {
        Self {
            added: changes.added,
            removed: changes.removed,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PolicyDecisionDto {
    pub policy: String,
    pub claim_key: String,
    pub required_value: String,
    pub granted: bool,
}

impl From<PolicyDecision> for PolicyDecisionDto {
    fn from(d: PolicyDecision) -> Self {
        Self {
            policy: d.policy,
            claim_key: d.claim_key,
            required_value: d.required_value,
            granted: d.granted,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct WhoAmIDto {
    pub tenant_id: Uuid,
    pub user_id: Uuid,
    pub roles: Vec<String>,
    pub claims: Vec<ClaimDto>,
    /// Every registered policy and whether this caller satisfies it.
    pub policies: Vec<PolicyDecisionDto>,
}

impl From<&UserClaim> for ClaimDto {
    fn from(claim: &UserClaim) -> Self {
        Self {
            key: claim.key.clone(),
            value: claim.value.clone(),
        }
    }
}

impl From<ClaimDto> for UserClaim {
    fn from(claim: ClaimDto) -> Self {
        UserClaim::new(claim.key, claim.value)
    }
}
