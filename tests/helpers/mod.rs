pub mod builders;
pub mod db;

pub use builders::{PermissionBuilder, RoleBuilder, UserBuilder};
pub use db::TestDb;
