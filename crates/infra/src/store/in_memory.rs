use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Mutex, RwLock, RwLockWriteGuard};

use chrono::Utc;

use bizhub_auth::UserClaim;
use bizhub_core::{RoleId, TenantId, UserId};

use super::r#trait::{
    FaultPoint, IdentityStore, RoleRecord, SetDiff, StoreError, UserRecord, normalize,
};

#[derive(Debug, Default, Clone)]
struct TenantIdentities {
    roles: BTreeMap<RoleId, RoleRecord>,
    users: BTreeMap<UserId, UserRecord>,
    user_roles: BTreeMap<UserId, BTreeSet<RoleId>>,
    user_claims: BTreeMap<UserId, BTreeSet<UserClaim>>,
}

impl TenantIdentities {
    fn name_taken(&self, normalized_name: &str, except: Option<RoleId>) -> bool {
        self.roles
            .values()
            .any(|r| r.normalized_name == normalized_name && Some(r.id) != except)
    }

    fn require_user(&self, user_id: UserId) -> Result<(), StoreError> {
        if self.users.contains_key(&user_id) {
            Ok(())
        } else {
            Err(StoreError::NotFound("user".to_string()))
        }
    }
}

/// In-memory identity store.
///
/// Intended for tests/dev. One write lock covers a whole replacement, and
/// changes are staged on a copy that is swapped in only when every step
/// succeeded.
#[derive(Debug, Default)]
pub struct InMemoryIdentityStore {
    tenants: RwLock<HashMap<TenantId, TenantIdentities>>,
    fault: Mutex<Option<FaultPoint>>,
}

impl InMemoryIdentityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm a one-shot failure for the next role or claim replacement.
    pub fn inject_fault(&self, point: FaultPoint) {
        if let Ok(mut fault) = self.fault.lock() {
            *fault = Some(point);
        }
    }

    fn take_fault(&self, point: FaultPoint) -> Result<(), StoreError> {
        let mut fault = self
            .fault
            .lock()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))?;
        if *fault == Some(point) {
            *fault = None;
            return Err(StoreError::Backend(format!("injected fault at {point:?}")));
        }
        Ok(())
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashMap<TenantId, TenantIdentities>>, StoreError> {
        self.tenants
            .write()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))
    }

    fn read_tenant<T>(
        &self,
        tenant_id: TenantId,
        f: impl FnOnce(Option<&TenantIdentities>) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let tenants = self
            .tenants
            .read()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))?;
        f(tenants.get(&tenant_id))
    }
}

#[async_trait::async_trait]
impl IdentityStore for InMemoryIdentityStore {
    async fn get_role(&self, tenant_id: TenantId, role_id: RoleId) -> Result<Option<RoleRecord>, StoreError> {
        self.read_tenant(tenant_id, |t| Ok(t.and_then(|t| t.roles.get(&role_id).cloned())))
    }

    async fn list_roles(&self, tenant_id: TenantId) -> Result<Vec<RoleRecord>, StoreError> {
        self.read_tenant(tenant_id, |t| {
            let mut roles: Vec<RoleRecord> = t.map(|t| t.roles.values().cloned().collect()).unwrap_or_default();
            roles.sort_by(|a, b| a.normalized_name.cmp(&b.normalized_name));
            Ok(roles)
        })
    }

    async fn create_role(&self, tenant_id: TenantId, name: &str) -> Result<RoleRecord, StoreError> {
        let mut tenants = self.write()?;
        let tenant = tenants.entry(tenant_id).or_default();

        let normalized_name = normalize(name);
        if tenant.name_taken(&normalized_name, None) {
            return Err(StoreError::Conflict(format!("role name '{}' is already taken", name.trim())));
        }

        let role = RoleRecord {
            id: RoleId::new(),
            name: name.trim().to_string(),
            normalized_name,
        };
        tenant.roles.insert(role.id, role.clone());
        Ok(role)
    }

    async fn rename_role(
        &self,
        tenant_id: TenantId,
        role_id: RoleId,
        name: &str,
    ) -> Result<RoleRecord, StoreError> {
        let mut tenants = self.write()?;
        let tenant = tenants
            .get_mut(&tenant_id)
            .ok_or_else(|| StoreError::NotFound("role".to_string()))?;
        if !tenant.roles.contains_key(&role_id) {
            return Err(StoreError::NotFound("role".to_string()));
        }

        let normalized_name = normalize(name);
        if tenant.name_taken(&normalized_name, Some(role_id)) {
            return Err(StoreError::Conflict(format!("role name '{}' is already taken", name.trim())));
        }

        let role = tenant
            .roles
            .get_mut(&role_id)
            .ok_or_else(|| StoreError::NotFound("role".to_string()))?;
        role.name = name.trim().to_string();
        role.normalized_name = normalized_name;
        Ok(role.clone())
    }

    async fn delete_role(&self, tenant_id: TenantId, role_id: RoleId) -> Result<(), StoreError> {
        let mut tenants = self.write()?;
        let tenant = tenants
            .get_mut(&tenant_id)
            .ok_or_else(|| StoreError::NotFound("role".to_string()))?;
        if !tenant.roles.contains_key(&role_id) {
            return Err(StoreError::NotFound("role".to_string()));
        }

        let holders = tenant
            .user_roles
            .values()
            .filter(|roles| roles.contains(&role_id))
            .count();
        if holders > 0 {
            return Err(StoreError::Conflict(format!(
                "role is still assigned to {holders} user(s)"
            )));
        }

        tenant.roles.remove(&role_id);
        Ok(())
    }

    async fn create_user(
        &self,
        tenant_id: TenantId,
        user_name: &str,
        email: &str,
    ) -> Result<UserRecord, StoreError> {
        let mut tenants = self.write()?;
        let tenant = tenants.entry(tenant_id).or_default();

        let normalized_user_name = normalize(user_name);
        let normalized_email = normalize(email);
        if tenant.users.values().any(|u| normalize(&u.user_name) == normalized_user_name) {
            return Err(StoreError::Conflict(format!("user name '{user_name}' is already taken")));
        }
        if tenant.users.values().any(|u| normalize(&u.email) == normalized_email) {
            return Err(StoreError::Conflict(format!("email '{email}' is already registered")));
        }

        let user = UserRecord {
            id: UserId::new(),
            tenant_id,
            user_name: user_name.trim().to_string(),
            email: email.trim().to_string(),
            created_at: Utc::now(),
        };
        tenant.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn get_user(&self, tenant_id: TenantId, user_id: UserId) -> Result<Option<UserRecord>, StoreError> {
        self.read_tenant(tenant_id, |t| Ok(t.and_then(|t| t.users.get(&user_id).cloned())))
    }

    async fn user_role_ids(&self, tenant_id: TenantId, user_id: UserId) -> Result<BTreeSet<RoleId>, StoreError> {
        self.read_tenant(tenant_id, |t| {
            let t = t.ok_or_else(|| StoreError::NotFound("user".to_string()))?;
            t.require_user(user_id)?;
            Ok(t.user_roles.get(&user_id).cloned().unwrap_or_default())
        })
    }

    async fn replace_user_roles(
        &self,
        tenant_id: TenantId,
        user_id: UserId,
        role_ids: &BTreeSet<RoleId>,
    ) -> Result<SetDiff<RoleId>, StoreError> {
        let mut tenants = self.write()?;
        let tenant = tenants
            .get_mut(&tenant_id)
            .ok_or_else(|| StoreError::NotFound("user".to_string()))?;
        tenant.require_user(user_id)?;
        if let Some(missing) = role_ids.iter().find(|id| !tenant.roles.contains_key(*id)) {
            return Err(StoreError::NotFound(format!("role {missing}")));
        }

        let current = tenant.user_roles.get(&user_id).cloned().unwrap_or_default();
        let diff = SetDiff::between(&current, role_ids);

        let mut staged = current;
        staged.extend(diff.to_add.iter().copied());
        self.take_fault(FaultPoint::AfterAdd)?;
        for id in &diff.to_remove {
            staged.remove(id);
        }

        tenant.user_roles.insert(user_id, staged);
        Ok(diff)
    }

    async fn user_claims(&self, tenant_id: TenantId, user_id: UserId) -> Result<BTreeSet<UserClaim>, StoreError> {
        self.read_tenant(tenant_id, |t| {
            let t = t.ok_or_else(|| StoreError::NotFound("user".to_string()))?;
            t.require_user(user_id)?;
            Ok(t.user_claims.get(&user_id).cloned().unwrap_or_default())
        })
    }

    async fn replace_user_claims(
        &self,
        tenant_id: TenantId,
        user_id: UserId,
        claims: &BTreeSet<UserClaim>,
    ) -> Result<SetDiff<UserClaim>, StoreError> {
        let mut tenants = self.write()?;
        let tenant = tenants
            .get_mut(&tenant_id)
            .ok_or_else(|| StoreError::NotFound("user".to_string()))?;
        tenant.require_user(user_id)?;

        let current = tenant.user_claims.get(&user_id).cloned().unwrap_or_default();
        let diff = SetDiff::between(&current, claims);

        let mut staged = current;
        staged.extend(diff.to_add.iter().cloned());
        self.take_fault(FaultPoint::AfterAdd)?;
        for claim in &diff.to_remove {
            staged.remove(claim);
        }

        tenant.user_claims.insert(user_id, staged);
        Ok(diff)
    }
}
