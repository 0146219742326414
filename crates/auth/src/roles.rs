use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Role name as carried in tokens and checked by role gates.
///
/// Comparison is exact (ordinal); the store decides uniqueness separately.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Role(Cow<'static, str>);

impl Role {
    /// Role that gates the whole authorization-management surface.
    pub const ADMIN: Role = Role(Cow::Borrowed("Admin"));

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_constant_matches_runtime_role() {
        assert_eq!(Role::ADMIN, Role::new("Admin".to_string()));
        assert_ne!(Role::ADMIN, Role::new("admin"));
    }
}
