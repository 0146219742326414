//! Infrastructure layer: identity storage and the authorization management service.

pub mod authorization;
pub mod store;

pub use authorization::{
    AssignmentChanges, AuthorizationManager, ManagedUserClaims, ManagedUserRoles, ManagementError,
    UserClaimState, UserRoleState,
};
pub use store::{
    FaultPoint, IdentityStore, InMemoryIdentityStore, PostgresIdentityStore, RoleRecord, SetDiff,
    StoreError, UserRecord,
};
