use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use bizhub_auth::UserClaim;
use bizhub_core::{RoleId, TenantId, UserId};

/// A persisted role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleRecord {
    pub id: RoleId,
    pub name: String,
    /// Uniqueness key (trimmed, upper-cased name).
    pub normalized_name: String,
}

/// A persisted user account (credentials are not stored here).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: UserId,
    pub tenant_id: TenantId,
    pub user_name: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

/// Identity store errors.
///
/// `Backend` covers connectivity and unexpected database failures; callers must
/// not forward its detail to clients.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("identity store failure: {0}")]
    Backend(String),
}

/// Where an injected failure fires inside a replace transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultPoint {
    /// After additions are staged, before removals.
    AfterAdd,
}

/// Additions and removals needed to turn `current` into `desired`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetDiff<T> {
    pub to_add: Vec<T>,
    pub to_remove: Vec<T>,
}

impl<T: Ord + Clone> SetDiff<T> {
    pub fn between(current: &BTreeSet<T>, desired: &BTreeSet<T>) -> Self {
        Self {
            to_add: desired.difference(current).cloned().collect(),
            to_remove: current.difference(desired).cloned().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty()
    }
}

/// Canonical form used for case-insensitive uniqueness of names and emails.
pub fn normalize(value: &str) -> String {
    value.trim().to_uppercase()
}

/// Tenant-scoped identity storage.
///
/// Every operation is scoped by `tenant_id`; rows of another tenant behave as
/// if they did not exist. Replacement operations are all-or-nothing.
#[async_trait::async_trait]
pub trait IdentityStore: Send + Sync {
    async fn get_role(&self, tenant_id: TenantId, role_id: RoleId) -> Result<Option<RoleRecord>, StoreError>;

    /// All roles of the tenant, ordered by name.
    async fn list_roles(&self, tenant_id: TenantId) -> Result<Vec<RoleRecord>, StoreError>;

    /// Fails with `Conflict` if the normalized name is taken.
    async fn create_role(&self, tenant_id: TenantId, name: &str) -> Result<RoleRecord, StoreError>;

    /// Fails with `NotFound` or `Conflict` (another role owns the name).
    async fn rename_role(
        &self,
        tenant_id: TenantId,
        role_id: RoleId,
        name: &str,
    ) -> Result<RoleRecord, StoreError>;

    /// Fails with `NotFound`, or `Conflict` while any user holds the role.
    async fn delete_role(&self, tenant_id: TenantId, role_id: RoleId) -> Result<(), StoreError>;

    /// Fails with `Conflict` if the user name or email is taken.
    async fn create_user(
        &self,
        tenant_id: TenantId,
        user_name: &str,
        email: &str,
    ) -> Result<UserRecord, StoreError>;

    async fn get_user(&self, tenant_id: TenantId, user_id: UserId) -> Result<Option<UserRecord>, StoreError>;

    async fn user_role_ids(&self, tenant_id: TenantId, user_id: UserId) -> Result<BTreeSet<RoleId>, StoreError>;

    /// Replace the user's role set in one transaction.
    ///
    /// Fails with `NotFound` for an unknown user or role id.
    async fn replace_user_roles(
        &self,
        tenant_id: TenantId,
        user_id: UserId,
        role_ids: &BTreeSet<RoleId>,
    ) -> Result<SetDiff<RoleId>, StoreError>;

    async fn user_claims(&self, tenant_id: TenantId, user_id: UserId) -> Result<BTreeSet<UserClaim>, StoreError>;

    /// Replace the user's claim set in one transaction.
    async fn replace_user_claims(
        &self,
        tenant_id: TenantId,
        user_id: UserId,
        claims: &BTreeSet<UserClaim>,
    ) -> Result<SetDiff<UserClaim>, StoreError>;
}

#[async_trait::async_trait]
impl<S> IdentityStore for std::sync::Arc<S>
where
    S: IdentityStore + ?Sized,
{
    async fn get_role(&self, tenant_id: TenantId, role_id: RoleId) -> Result<Option<RoleRecord>, StoreError> {
        (**self).get_role(tenant_id, role_id).await
    }

    async fn list_roles(&self, tenant_id: TenantId) -> Result<Vec<RoleRecord>, StoreError> {
        (**self).list_roles(tenant_id).await
    }

    async fn create_role(&self, tenant_id: TenantId, name: &str) -> Result<RoleRecord, StoreError> {
        (**self).create_role(tenant_id, name).await
    }

    async fn rename_role(
        &self,
        tenant_id: TenantId,
        role_id: RoleId,
        name: &str,
    ) -> Result<RoleRecord, StoreError> {
        (**self).rename_role(tenant_id, role_id, name).await
    }

    async fn delete_role(&self, tenant_id: TenantId, role_id: RoleId) -> Result<(), StoreError> {
        (**self).delete_role(tenant_id, role_id).await
    }

    async fn create_user(
        &self,
        tenant_id: TenantId,
        user_name: &str,
        email: &str,
    ) -> Result<UserRecord, StoreError> {
        (**self).create_user(tenant_id, user_name, email).await
    }

    async fn get_user(&self, tenant_id: TenantId, user_id: UserId) -> Result<Option<UserRecord>, StoreError> {
        (**self).get_user(tenant_id, user_id).await
    }

    async fn user_role_ids(&self, tenant_id: TenantId, user_id: UserId) -> Result<BTreeSet<RoleId>, StoreError> {
        (**self).user_role_ids(tenant_id, user_id).await
    }

    async fn replace_user_roles(
        &self,
        tenant_id: TenantId,
        user_id: UserId,
        role_ids: &BTreeSet<RoleId>,
    ) -> Result<SetDiff<RoleId>, StoreError> {
        (**self).replace_user_roles(tenant_id, user_id, role_ids).await
    }

    async fn user_claims(&self, tenant_id: TenantId, user_id: UserId) -> Result<BTreeSet<UserClaim>, StoreError> {
        (**self).user_claims(tenant_id, user_id).await
    }

    async fn replace_user_claims(
        &self,
        tenant_id: TenantId,
        user_id: UserId,
        claims: &BTreeSet<UserClaim>,
    ) -> Result<SetDiff<UserClaim>, StoreError> {
        (**self).replace_user_claims(tenant_id, user_id, claims).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diff_adds_missing_and_removes_extra() {
        let current: BTreeSet<u8> = [1, 2, 3].into();
        let desired: BTreeSet<u8> = [2, 3, 4, 5].into();
        let diff = SetDiff::between(&current, &desired);
        assert_eq!(diff.to_add, vec![4, 5]);
        assert_eq!(diff.to_remove, vec![1]);
    }

    #[test]
    fn diff_to_empty_removes_everything() {
        let current: BTreeSet<u8> = [7, 9].into();
        let diff = SetDiff::between(&current, &BTreeSet::new());
        assert!(diff.to_add.is_empty());
        assert_eq!(diff.to_remove, vec![7, 9]);
    }

    #[test]
    fn normalize_ignores_case_and_padding() {
        assert_eq!(normalize("  Manager "), normalize("MANAGER"));
    }
}
