//! `bizhub-core`: shared domain primitives (ids and the domain error model).
//!
//! This crate carries no infrastructure concerns.

pub mod error;
pub mod id;

pub use error::{DomainError, DomainResult};
pub use id::{RoleId, TenantId, UserId};
