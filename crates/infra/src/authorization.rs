//! Authorization management service.
//!
//! Role CRUD plus per-user role and claim assignment, on top of an
//! [`IdentityStore`]. The caller is expected to have passed the Admin gate
//! already; this layer validates input, maps store failures onto the domain
//! error model and logs every mutation.

use std::collections::{BTreeMap, BTreeSet};

use chrono::Utc;
use serde::Serialize;
use thiserror::Error;
use tracing::{info, instrument};

use bizhub_auth::{PolicyRegistry, Role, TokenError, TokenService, UserClaim, claims_for};
use bizhub_core::{DomainError, RoleId, TenantId, UserId};

use crate::store::{IdentityStore, RoleRecord, SetDiff, StoreError, UserRecord};

/// Longest accepted role name, in characters.
pub const MAX_ROLE_NAME_LEN: usize = 256;

const USER_NAME_EXTRA_CHARS: &str = "-._@+";

#[derive(Debug, Error)]
pub enum ManagementError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// Store failure the caller cannot act on. Never shown to clients verbatim.
    #[error("identity store unavailable: {0}")]
    Store(String),

    #[error(transparent)]
    Token(#[from] TokenError),
}

impl From<StoreError> for ManagementError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => DomainError::not_found(what).into(),
            StoreError::Conflict(msg) => DomainError::conflict(msg).into(),
            StoreError::Validation(msg) => DomainError::validation(msg).into(),
            StoreError::Backend(msg) => ManagementError::Store(msg),
        }
    }
}

/// One catalog role and whether the user holds it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserRoleState {
    pub id: RoleId,
    pub name: String,
    pub has_role: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManagedUserRoles {
    pub user_id: UserId,
    pub roles: Vec<UserRoleState>,
}

/// One catalog claim key and the user's value for it, if any.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserClaimState {
    pub key: String,
    pub value: Option<String>,
    /// The user holds the key with the value the matching policy requires.
    pub has_claim: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManagedUserClaims {
    pub user_id: UserId,
    pub claims: Vec<UserClaimState>,
}

/// How many assignments a replacement added and removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AssignmentChanges {
    pub added: usize,
    pub removed: usize,
}

impl<T> From<&SetDiff<T>> for AssignmentChanges {
    fn from(diff: &SetDiff<T>) -> Self {
        Self {
            added: diff.to_add.len(),
            removed: diff.to_remove.len(),
        }
    }
}

pub struct AuthorizationManager<S> {
    store: S,
    policies: PolicyRegistry,
}

impl<S: IdentityStore> AuthorizationManager<S> {
    pub fn new(store: S, policies: PolicyRegistry) -> Self {
        Self { store, policies }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn policies(&self) -> &PolicyRegistry {
        &self.policies
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, role_id = %role_id), err)]
    pub async fn get_role_by_id(
        &self,
        tenant_id: TenantId,
        role_id: RoleId,
    ) -> Result<RoleRecord, ManagementError> {
        self.store
            .get_role(tenant_id, role_id)
            .await?
            .ok_or_else(|| DomainError::not_found("role").into())
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id), err)]
    pub async fn get_role_list(&self, tenant_id: TenantId) -> Result<Vec<RoleRecord>, ManagementError> {
        Ok(self.store.list_roles(tenant_id).await?)
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id), err)]
    pub async fn create_role(&self, tenant_id: TenantId, name: &str) -> Result<RoleRecord, ManagementError> {
        validate_role_name(name)?;
        let role = self.store.create_role(tenant_id, name).await?;
        info!(role_id = %role.id, role = %role.name, "role created");
        Ok(role)
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, role_id = %role_id), err)]
    pub async fn edit_role(
        &self,
        tenant_id: TenantId,
        role_id: RoleId,
        name: &str,
    ) -> Result<RoleRecord, ManagementError> {
        validate_role_name(name)?;
        let role = self.store.rename_role(tenant_id, role_id, name).await?;
        info!(role = %role.name, "role renamed");
        Ok(role)
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, role_id = %role_id), err)]
    pub async fn delete_role(&self, tenant_id: TenantId, role_id: RoleId) -> Result<(), ManagementError> {
        self.store.delete_role(tenant_id, role_id).await?;
        info!("role deleted");
        Ok(())
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, user_id = %user_id), err)]
    pub async fn manage_user_roles(
        &self,
        tenant_id: TenantId,
        user_id: UserId,
    ) -> Result<ManagedUserRoles, ManagementError> {
        self.require_user(tenant_id, user_id).await?;
        let held = self.store.user_role_ids(tenant_id, user_id).await?;
        let roles = self
            .store
            .list_roles(tenant_id)
            .await?
            .into_iter()
            .map(|role| UserRoleState {
                has_role: held.contains(&role.id),
                id: role.id,
                name: role.name,
            })
            .collect();
        Ok(ManagedUserRoles { user_id, roles })
    }

    /// Replace the user's roles with `role_ids`. Duplicate ids are collapsed.
    #[instrument(skip(self, role_ids), fields(tenant_id = %tenant_id, user_id = %user_id), err)]
    pub async fn update_user_roles(
        &self,
        tenant_id: TenantId,
        user_id: UserId,
        role_ids: &[RoleId],
    ) -> Result<AssignmentChanges, ManagementError> {
        let desired: BTreeSet<RoleId> = role_ids.iter().copied().collect();
        let diff = self.store.replace_user_roles(tenant_id, user_id, &desired).await?;
        let changes = AssignmentChanges::from(&diff);
        info!(added = changes.added, removed = changes.removed, "user roles replaced");
        Ok(changes)
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, user_id = %user_id), err)]
    pub async fn manage_user_claims(
        &self,
        tenant_id: TenantId,
        user_id: UserId,
    ) -> Result<ManagedUserClaims, ManagementError> {
        self.require_user(tenant_id, user_id).await?;
        let held: BTreeMap<String, String> = self
            .store
            .user_claims(tenant_id, user_id)
            .await?
            .into_iter()
            .map(|c| (c.key, c.value))
            .collect();

        let claims = self
            .policies
            .iter()
            .map(|policy| {
                let value = held.get(&policy.claim_key).cloned();
                UserClaimState {
                    has_claim: value.as_deref() == Some(policy.claim_value.as_str()),
                    key: policy.claim_key.clone(),
                    value,
                }
            })
            .collect();
        Ok(ManagedUserClaims { user_id, claims })
    }

    /// Replace the user's claims. Keys must come from the policy table and
    /// may appear once each.
    #[instrument(skip(self, claims), fields(tenant_id = %tenant_id, user_id = %user_id), err)]
    pub async fn update_user_claims(
        &self,
        tenant_id: TenantId,
        user_id: UserId,
        claims: &[UserClaim],
    ) -> Result<AssignmentChanges, ManagementError> {
        let mut desired = BTreeSet::new();
        let mut seen_keys = BTreeSet::new();
        for claim in claims {
            let key = claim.key.trim();
            if key.is_empty() {
                return Err(DomainError::validation("claim key must not be empty").into());
            }
            if !self.policies.is_known_claim_key(key) {
                return Err(DomainError::validation(format!("unknown claim key '{key}'")).into());
            }
            if !seen_keys.insert(key) {
                return Err(DomainError::validation(format!("claim key '{key}' appears more than once")).into());
            }
            let value = claim.value.trim();
            if value.is_empty() {
                return Err(DomainError::validation(format!("claim '{key}' must have a value")).into());
            }
            desired.insert(UserClaim::new(key, value));
        }

        let diff = self.store.replace_user_claims(tenant_id, user_id, &desired).await?;
        let changes = AssignmentChanges::from(&diff);
        info!(added = changes.added, removed = changes.removed, "user claims replaced");
        Ok(changes)
    }

    #[instrument(skip(self, email), fields(tenant_id = %tenant_id), err)]
    pub async fn create_user(
        &self,
        tenant_id: TenantId,
        user_name: &str,
        email: &str,
    ) -> Result<UserRecord, ManagementError> {
        validate_user_name(user_name)?;
        validate_email(email)?;
        let user = self.store.create_user(tenant_id, user_name, email).await?;
        info!(user_id = %user.id, user_name = %user.user_name, "user created");
        Ok(user)
    }

    /// Sign a token carrying the user's current roles and claims.
    #[instrument(skip(self, tokens), fields(tenant_id = %tenant_id, user_id = %user_id), err)]
    pub async fn issue_token(
        &self,
        tenant_id: TenantId,
        user_id: UserId,
        tokens: &dyn TokenService,
    ) -> Result<String, ManagementError> {
        self.require_user(tenant_id, user_id).await?;
        let held = self.store.user_role_ids(tenant_id, user_id).await?;
        let roles = self
            .store
            .list_roles(tenant_id)
            .await?
            .into_iter()
            .filter(|r| held.contains(&r.id))
            .map(|r| Role::new(r.name))
            .collect();
        let claims = self
            .store
            .user_claims(tenant_id, user_id)
            .await?
            .into_iter()
            .collect();

        let jwt = claims_for(tokens.settings(), user_id, tenant_id, roles, claims, Utc::now())?;
        Ok(tokens.issue(&jwt)?)
    }

    async fn require_user(&self, tenant_id: TenantId, user_id: UserId) -> Result<UserRecord, ManagementError> {
        self.store
            .get_user(tenant_id, user_id)
            .await?
            .ok_or_else(|| DomainError::not_found("user").into())
    }
}

fn validate_role_name(name: &str) -> Result<(), DomainError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(DomainError::validation("role name must not be empty"));
    }
    if trimmed.chars().count() > MAX_ROLE_NAME_LEN {
        return Err(DomainError::validation(format!(
            "role name must be at most {MAX_ROLE_NAME_LEN} characters"
        )));
    }
    Ok(())
}

fn validate_user_name(user_name: &str) -> Result<(), DomainError> {
    if user_name.is_empty() {
        return Err(DomainError::validation("user name must not be empty"));
    }
    if let Some(bad) = user_name
        .chars()
        .find(|c| !c.is_ascii_alphanumeric() && !USER_NAME_EXTRA_CHARS.contains(*c))
    {
        return Err(DomainError::validation(format!(
            "user name contains disallowed character '{bad}'"
        )));
    }
    Ok(())
}

fn validate_email(email: &str) -> Result<(), DomainError> {
    let email = email.trim();
    let plausible = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.is_empty()
                && !domain.contains('@')
                && !email.chars().any(char::is_whitespace)
        }
        None => false,
    };
    if plausible {
        Ok(())
    } else {
        Err(DomainError::validation(format!("'{email}' is not a valid email address")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{FaultPoint, InMemoryIdentityStore};
    use bizhub_auth::{Hs256TokenService, JwtSettings};
    use std::sync::Arc;

    struct Fixture {
        manager: AuthorizationManager<Arc<InMemoryIdentityStore>>,
        store: Arc<InMemoryIdentityStore>,
        tenant: TenantId,
        user: UserId,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(InMemoryIdentityStore::new());
        let manager = AuthorizationManager::new(store.clone(), PolicyRegistry::standard());
        let tenant = TenantId::new();
        let user = manager
            .create_user(tenant, "alice", "alice@example.com")
            .await
            .unwrap()
            .id;
        Fixture { manager, store, tenant, user }
    }

    fn is_not_found(err: &ManagementError) -> bool {
        matches!(err, ManagementError::Domain(DomainError::NotFound(_)))
    }

    fn is_conflict(err: &ManagementError) -> bool {
        matches!(err, ManagementError::Domain(DomainError::Conflict(_)))
    }

    fn is_validation(err: &ManagementError) -> bool {
        matches!(err, ManagementError::Domain(DomainError::Validation(_)))
    }

    #[tokio::test]
    async fn manager_rename_then_delete_scenario() {
        let f = fixture().await;
        let role = f.manager.create_role(f.tenant, "Manager").await.unwrap();

        let listed = f.manager.get_role_list(f.tenant).await.unwrap();
        assert_eq!(listed.iter().filter(|r| r.name == "Manager").count(), 1);

        f.manager.edit_role(f.tenant, role.id, "Lead").await.unwrap();
        assert_eq!(f.manager.get_role_by_id(f.tenant, role.id).await.unwrap().name, "Lead");

        f.manager.delete_role(f.tenant, role.id).await.unwrap();
        let err = f.manager.get_role_by_id(f.tenant, role.id).await.unwrap_err();
        assert!(is_not_found(&err));
    }

    #[tokio::test]
    async fn role_name_validation() {
        let f = fixture().await;
        assert!(is_validation(&f.manager.create_role(f.tenant, "   ").await.unwrap_err()));
        let long = "x".repeat(MAX_ROLE_NAME_LEN + 1);
        assert!(is_validation(&f.manager.create_role(f.tenant, &long).await.unwrap_err()));
        assert!(f.manager.create_role(f.tenant, &"x".repeat(MAX_ROLE_NAME_LEN)).await.is_ok());
    }

    #[tokio::test]
    async fn duplicate_role_name_conflicts_without_second_row() {
        let f = fixture().await;
        f.manager.create_role(f.tenant, "Manager").await.unwrap();
        let err = f.manager.create_role(f.tenant, "MANAGER").await.unwrap_err();
        assert!(is_conflict(&err));
        assert_eq!(f.manager.get_role_list(f.tenant).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn deleting_missing_role_is_not_found() {
        let f = fixture().await;
        let err = f.manager.delete_role(f.tenant, RoleId::new()).await.unwrap_err();
        assert!(is_not_found(&err));
    }

    #[tokio::test]
    async fn deleting_assigned_role_conflicts() {
        let f = fixture().await;
        let role = f.manager.create_role(f.tenant, "Manager").await.unwrap();
        f.manager.update_user_roles(f.tenant, f.user, &[role.id]).await.unwrap();
        assert!(is_conflict(&f.manager.delete_role(f.tenant, role.id).await.unwrap_err()));
    }

    #[tokio::test]
    async fn manage_user_roles_flags_held_roles() {
        let f = fixture().await;
        let a = f.manager.create_role(f.tenant, "Alpha").await.unwrap();
        let b = f.manager.create_role(f.tenant, "Beta").await.unwrap();
        f.manager.update_user_roles(f.tenant, f.user, &[b.id, b.id]).await.unwrap();

        let view = f.manager.manage_user_roles(f.tenant, f.user).await.unwrap();
        assert_eq!(
            view.roles,
            vec![
                UserRoleState { id: a.id, name: "Alpha".into(), has_role: false },
                UserRoleState { id: b.id, name: "Beta".into(), has_role: true },
            ]
        );
    }

    #[tokio::test]
    async fn unknown_user_is_not_found_everywhere() {
        let f = fixture().await;
        let ghost = UserId::new();
        assert!(is_not_found(&f.manager.manage_user_roles(f.tenant, ghost).await.unwrap_err()));
        assert!(is_not_found(&f.manager.manage_user_claims(f.tenant, ghost).await.unwrap_err()));
        assert!(is_not_found(&f.manager.update_user_roles(f.tenant, ghost, &[]).await.unwrap_err()));
        assert!(is_not_found(&f.manager.update_user_claims(f.tenant, ghost, &[]).await.unwrap_err()));
    }

    #[tokio::test]
    async fn clearing_roles_only_affects_that_user() {
        let f = fixture().await;
        let bob = f.manager.create_user(f.tenant, "bob", "bob@example.com").await.unwrap().id;
        let role = f.manager.create_role(f.tenant, "Staff").await.unwrap();
        f.manager.update_user_roles(f.tenant, f.user, &[role.id]).await.unwrap();
        f.manager.update_user_roles(f.tenant, bob, &[role.id]).await.unwrap();

        let changes = f.manager.update_user_roles(f.tenant, f.user, &[]).await.unwrap();
        assert_eq!(changes, AssignmentChanges { added: 0, removed: 1 });

        assert!(f.store.user_role_ids(f.tenant, f.user).await.unwrap().is_empty());
        assert_eq!(f.store.user_role_ids(f.tenant, bob).await.unwrap(), [role.id].into());
    }

    #[tokio::test]
    async fn failed_role_replacement_keeps_prior_assignment() {
        let f = fixture().await;
        let a = f.manager.create_role(f.tenant, "A").await.unwrap();
        let b = f.manager.create_role(f.tenant, "B").await.unwrap();
        f.manager.update_user_roles(f.tenant, f.user, &[a.id]).await.unwrap();

        f.store.inject_fault(FaultPoint::AfterAdd);
        let err = f.manager.update_user_roles(f.tenant, f.user, &[b.id]).await.unwrap_err();
        assert!(matches!(err, ManagementError::Store(_)));

        let view = f.manager.manage_user_roles(f.tenant, f.user).await.unwrap();
        let held: Vec<RoleId> = view.roles.iter().filter(|r| r.has_role).map(|r| r.id).collect();
        assert_eq!(held, vec![a.id]);
    }

    #[tokio::test]
    async fn manage_user_claims_reports_full_catalog() {
        let f = fixture().await;
        f.manager
            .update_user_claims(
                f.tenant,
                f.user,
                &[
                    UserClaim::new("Edit Customer", "True"),
                    UserClaim::new("Get All Admin", "False"),
                ],
            )
            .await
            .unwrap();

        let view = f.manager.manage_user_claims(f.tenant, f.user).await.unwrap();
        assert_eq!(view.claims.len(), 15);
        assert_eq!(view.claims[0].key, "Create Customer");

        let edit = view.claims.iter().find(|c| c.key == "Edit Customer").unwrap();
        assert_eq!(edit.value.as_deref(), Some("True"));
        assert!(edit.has_claim);

        let get_all = view.claims.iter().find(|c| c.key == "Get All Admin").unwrap();
        assert_eq!(get_all.value.as_deref(), Some("False"));
        assert!(!get_all.has_claim);

        let untouched = view.claims.iter().find(|c| c.key == "Delete Employee").unwrap();
        assert_eq!(untouched.value, None);
    }

    #[tokio::test]
    async fn claim_updates_are_validated_before_touching_the_store() {
        let f = fixture().await;
        let cases = [
            vec![UserClaim::new("", "True")],
            vec![UserClaim::new("Fly Plane", "True")],
            vec![UserClaim::new("Get Admin", "True"), UserClaim::new("Get Admin", "False")],
            vec![UserClaim::new("Get Admin", " ")],
        ];
        for claims in cases {
            let err = f.manager.update_user_claims(f.tenant, f.user, &claims).await.unwrap_err();
            assert!(is_validation(&err), "{claims:?}");
        }
        assert!(f.store.user_claims(f.tenant, f.user).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn claim_replacement_reports_diff() {
        let f = fixture().await;
        f.manager
            .update_user_claims(f.tenant, f.user, &[UserClaim::new("Get Admin", "True")])
            .await
            .unwrap();
        let changes = f
            .manager
            .update_user_claims(f.tenant, f.user, &[UserClaim::new("Edit Admin", "True")])
            .await
            .unwrap();
        assert_eq!(changes, AssignmentChanges { added: 1, removed: 1 });
    }

    #[tokio::test]
    async fn user_creation_rules() {
        let f = fixture().await;
        assert!(is_validation(&f.manager.create_user(f.tenant, "bad name", "x@example.com").await.unwrap_err()));
        assert!(is_validation(&f.manager.create_user(f.tenant, "carol", "not-an-email").await.unwrap_err()));
        assert!(is_conflict(&f.manager.create_user(f.tenant, "carol", "alice@example.com").await.unwrap_err()));
        assert!(f.manager.create_user(f.tenant, "carol.o-k_1+x@corp", "carol@example.com").await.is_ok());
    }

    #[tokio::test]
    async fn roles_are_isolated_per_tenant() {
        let f = fixture().await;
        let role = f.manager.create_role(f.tenant, "Manager").await.unwrap();
        let other = TenantId::new();
        assert!(f.manager.get_role_list(other).await.unwrap().is_empty());
        assert!(is_not_found(&f.manager.get_role_by_id(other, role.id).await.unwrap_err()));
    }

    #[tokio::test]
    async fn issued_token_carries_roles_and_claims() {
        let f = fixture().await;
        let admin = f.manager.create_role(f.tenant, "Admin").await.unwrap();
        f.manager.update_user_roles(f.tenant, f.user, &[admin.id]).await.unwrap();
        f.manager
            .update_user_claims(f.tenant, f.user, &[UserClaim::new("Get Customer", "True")])
            .await
            .unwrap();

        let tokens = Hs256TokenService::new(JwtSettings::with_secret("test-secret"));
        let token = f.manager.issue_token(f.tenant, f.user, &tokens).await.unwrap();
        let claims = tokens.validate(&token).unwrap();

        assert_eq!(claims.sub, f.user);
        assert_eq!(claims.tenant_id, f.tenant);
        assert!(claims.has_role(&Role::ADMIN));
        assert_eq!(claims.claims, vec![UserClaim::new("Get Customer", "True")]);
    }

    #[tokio::test]
    async fn out_of_range_token_lifetime_is_reported_not_panicked() {
        let f = fixture().await;
        let mut settings = JwtSettings::with_secret("test-secret");
        settings.access_token_expire_minutes = i64::MAX / 2;
        let tokens = Hs256TokenService::new(settings);

        let err = f.manager.issue_token(f.tenant, f.user, &tokens).await.unwrap_err();
        assert!(matches!(err, ManagementError::Token(TokenError::InvalidLifetime(_))));
    }
}
