use bizhub_core::{TenantId, UserId};

use crate::{JwtClaims, Role, UserClaim};

/// A fully resolved caller for authorization decisions.
///
/// Built from a validated token; nothing here is looked up again from storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub user_id: UserId,
    pub tenant_id: TenantId,
    pub roles: Vec<Role>,
    pub claims: Vec<UserClaim>,
}

impl Principal {
    pub fn has_role(&self, role: &Role) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    pub fn has_claim(&self, key: &str, value: &str) -> bool {
        self.claims.iter().any(|c| c.key == key && c.value == value)
    }
}

impl From<JwtClaims> for Principal {
    fn from(claims: JwtClaims) -> Self {
        Self {
            user_id: claims.sub,
            tenant_id: claims.tenant_id,
            roles: claims.roles,
            claims: claims.claims,
        }
    }
}
