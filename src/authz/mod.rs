//! Access-control engine: permission resolution, the per-request guard,
//! role/permission management and advisory conflict detection.

pub mod audit;
pub mod conflicts;
pub mod errors;
pub mod guard;
pub mod management;
pub mod path;
pub mod resolver;
pub mod route_cache;
pub mod store;
pub mod templates;
pub mod types;
pub mod web;

pub use errors::AuthzError;
pub use guard::AuthorizationGuard;
pub use management::RoleService;
pub use resolver::effective_permissions;
pub use types::{AuthzRequest, Decision, ReasonCode};
