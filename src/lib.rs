//! Tollgate - route-keyed authorization service
//!
//! Principals hold a business role and an optional admin role; requests are
//! authorized against a per-route permission table using the union of both.
//! All modules are exposed for integration testing.

pub mod admin_graphql;
pub mod admin_mutations;
pub mod authz;
pub mod entities;
pub mod errors;
pub mod jobs;
pub mod seed;
pub mod settings;
pub mod storage;
pub mod web;
