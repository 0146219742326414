//! Identity storage boundary.
//!
//! Roles, users and their role/claim assignments, scoped per tenant. The
//! in-memory store backs dev and tests; Postgres backs production.

pub mod in_memory;
pub mod postgres;
pub mod r#trait;

pub use in_memory::InMemoryIdentityStore;
pub use postgres::PostgresIdentityStore;
pub use r#trait::{
    FaultPoint, IdentityStore, RoleRecord, SetDiff, StoreError, UserRecord, normalize,
};
