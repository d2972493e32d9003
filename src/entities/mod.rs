pub mod audit_event;
pub mod job_execution;
pub mod permission;
pub mod role;
pub mod role_permission;
pub mod route;
pub mod user;

pub use audit_event::Entity as AuditEvent;
pub use job_execution::Entity as JobExecution;
pub use permission::Entity as Permission;
pub use role::Entity as Role;
pub use role_permission::Entity as RolePermission;
pub use route::Entity as Route;
pub use user::Entity as User;
