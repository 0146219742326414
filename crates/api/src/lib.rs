//! HTTP API: configuration, routing, authentication and authorization.

pub mod app;
pub mod authz;
pub mod config;
pub mod context;
pub mod middleware;
pub mod openapi;
