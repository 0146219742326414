//! Static claim-based authorization policies.
//!
//! Every policy requires exactly one `(claim key, claim value)` pair. The table
//! is generated from resources × actions and is fixed at compile time; route
//! guards resolve their policy through [`PolicyRegistry::guard`] at startup so
//! a misspelled name never reaches request handling.

use serde::Serialize;
use thiserror::Error;

use crate::{AuthzError, UserClaim};

/// Claim value every standard policy requires.
pub const GRANTED: &str = "True";

/// Resource families guarded by the standard policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Resource {
    Customer,
    Admin,
    Employee,
}

impl Resource {
    pub const ALL: [Resource; 3] = [Resource::Customer, Resource::Admin, Resource::Employee];

    pub fn as_str(self) -> &'static str {
        match self {
            Resource::Customer => "Customer",
            Resource::Admin => "Admin",
            Resource::Employee => "Employee",
        }
    }
}

/// Actions a policy can cover on a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Action {
    Create,
    Edit,
    Get,
    GetAll,
    Delete,
}

impl Action {
    pub const ALL: [Action; 5] = [
        Action::Create,
        Action::Edit,
        Action::Get,
        Action::GetAll,
        Action::Delete,
    ];

    /// Token used in the policy name (`GetAll`).
    pub fn as_str(self) -> &'static str {
        match self {
            Action::Create => "Create",
            Action::Edit => "Edit",
            Action::Get => "Get",
            Action::GetAll => "GetAll",
            Action::Delete => "Delete",
        }
    }

    /// Token used in the claim key (`Get All`).
    pub fn claim_label(self) -> &'static str {
        match self {
            Action::GetAll => "Get All",
            other => other.as_str(),
        }
    }
}

/// A named rule requiring one claim with one value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Policy {
    pub name: String,
    pub claim_key: String,
    pub claim_value: String,
}

impl Policy {
    pub fn for_resource(action: Action, resource: Resource) -> Self {
        Self {
            name: format!("{}{}", action.as_str(), resource.as_str()),
            claim_key: format!("{} {}", action.claim_label(), resource.as_str()),
            claim_value: GRANTED.to_string(),
        }
    }

    pub fn is_satisfied_by(&self, claims: &[UserClaim]) -> bool {
        claims
            .iter()
            .any(|c| c.key == self.claim_key && c.value == self.claim_value)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PolicyError {
    #[error("unknown authorization policy '{0}'")]
    Unknown(String),
}

/// Registry of every policy the application knows about.
#[derive(Debug, Clone)]
pub struct PolicyRegistry {
    policies: Vec<Policy>,
}

impl PolicyRegistry {
    /// The standard table: {Customer, Admin, Employee} × {Create, Edit, Get, GetAll, Delete}.
    pub fn standard() -> Self {
        let policies = Resource::ALL
            .iter()
            .flat_map(|&resource| {
                Action::ALL
                    .iter()
                    .map(move |&action| Policy::for_resource(action, resource))
            })
            .collect();
        Self { policies }
    }

    pub fn get(&self, name: &str) -> Option<&Policy> {
        self.policies.iter().find(|p| p.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Policy> {
        self.policies.iter()
    }

    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }

    /// Claim keys an administrator can grant, in table order.
    pub fn claim_keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = Vec::with_capacity(self.policies.len());
        for p in &self.policies {
            if !keys.contains(&p.claim_key.as_str()) {
                keys.push(p.claim_key.as_str());
            }
        }
        keys
    }

    pub fn is_known_claim_key(&self, key: &str) -> bool {
        self.policies.iter().any(|p| p.claim_key == key)
    }

    /// Evaluate a policy by name. Unknown names are denied.
    pub fn evaluate(&self, name: &str, claims: &[UserClaim]) -> Result<(), AuthzError> {
        let Some(policy) = self.get(name) else {
            tracing::warn!(policy = name, "denying request guarded by unregistered policy");
            return Err(AuthzError::UnknownPolicy(name.to_string()));
        };
        if policy.is_satisfied_by(claims) {
            Ok(())
        } else {
            Err(AuthzError::MissingClaim {
                policy: policy.name.clone(),
                claim_key: policy.claim_key.clone(),
            })
        }
    }

    /// Resolve a guard for a route. Call at startup.
    pub fn guard(&self, name: &str) -> Result<PolicyGuard, PolicyError> {
        self.get(name)
            .cloned()
            .map(|policy| PolicyGuard { policy })
            .ok_or_else(|| PolicyError::Unknown(name.to_string()))
    }
}

impl Default for PolicyRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

/// A resolved policy attached to a route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyGuard {
    policy: Policy,
}

impl PolicyGuard {
    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    pub fn check(&self, claims: &[UserClaim]) -> Result<(), AuthzError> {
        if self.policy.is_satisfied_by(claims) {
            Ok(())
        } else {
            Err(AuthzError::MissingClaim {
                policy: self.policy.name.clone(),
                claim_key: self.policy.claim_key.clone(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn standard_table_has_fifteen_policies() {
        let registry = PolicyRegistry::standard();
        assert_eq!(registry.len(), 15);
        assert_eq!(registry.claim_keys().len(), 15);
    }

    #[test]
    fn standard_table_names_and_keys() {
        let registry = PolicyRegistry::standard();
        let expected = [
            ("CreateCustomer", "Create Customer"),
            ("EditCustomer", "Edit Customer"),
            ("GetCustomer", "Get Customer"),
            ("GetAllCustomer", "Get All Customer"),
            ("DeleteCustomer", "Delete Customer"),
            ("CreateAdmin", "Create Admin"),
            ("EditAdmin", "Edit Admin"),
            ("GetAdmin", "Get Admin"),
            ("GetAllAdmin", "Get All Admin"),
            ("DeleteAdmin", "Delete Admin"),
            ("CreateEmployee", "Create Employee"),
            ("EditEmployee", "Edit Employee"),
            ("GetEmployee", "Get Employee"),
            ("GetAllEmployee", "Get All Employee"),
            ("DeleteEmployee", "Delete Employee"),
        ];
        let actual: Vec<(&str, &str)> = registry
            .iter()
            .map(|p| (p.name.as_str(), p.claim_key.as_str()))
            .collect();
        assert_eq!(actual, expected);
        assert!(registry.iter().all(|p| p.claim_value == "True"));
    }

    #[test]
    fn every_policy_allows_exact_claim_and_denies_otherwise() {
        let registry = PolicyRegistry::standard();
        for policy in registry.iter() {
            let exact = vec![UserClaim::new(policy.claim_key.clone(), "True")];
            assert_eq!(registry.evaluate(&policy.name, &exact), Ok(()), "{}", policy.name);

            let wrong_value = vec![UserClaim::new(policy.claim_key.clone(), "False")];
            assert!(registry.evaluate(&policy.name, &wrong_value).is_err());

            assert!(registry.evaluate(&policy.name, &[]).is_err());
        }
    }

    #[test]
    fn get_and_get_all_are_distinct() {
        let registry = PolicyRegistry::standard();
        let get_only = vec![UserClaim::new("Get Customer", "True")];
        assert!(registry.evaluate("GetCustomer", &get_only).is_ok());
        assert!(registry.evaluate("GetAllCustomer", &get_only).is_err());
    }

    #[test]
    fn unknown_policy_fails_closed() {
        let registry = PolicyRegistry::standard();
        let everything: Vec<UserClaim> = registry
            .iter()
            .map(|p| UserClaim::new(p.claim_key.clone(), "True"))
            .collect();
        assert_eq!(
            registry.evaluate("EditCustomers", &everything),
            Err(AuthzError::UnknownPolicy("EditCustomers".into()))
        );
    }

    #[test]
    fn guard_resolution_fails_fast_on_typos() {
        let registry = PolicyRegistry::standard();
        assert!(registry.guard("DeleteEmployee").is_ok());
        assert_eq!(
            registry.guard("DeleteEmploye"),
            Err(PolicyError::Unknown("DeleteEmploye".into()))
        );
    }

    proptest! {
        #[test]
        fn claims_without_the_exact_pair_never_pass(
            key in "[A-Za-z ]{0,20}",
            value in "[A-Za-z]{0,8}",
        ) {
            let registry = PolicyRegistry::standard();
            let claims = vec![UserClaim::new(key.clone(), value.clone())];
            for policy in registry.iter() {
                let expected = key == policy.claim_key && value == policy.claim_value;
                prop_assert_eq!(registry.evaluate(&policy.name, &claims).is_ok(), expected);
            }
        }
    }
}
