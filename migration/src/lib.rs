pub use sea_orm_migration::prelude::*;

mod m20250301_000001_access_control_schema;
mod m20250301_000002_audit_and_jobs;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250301_000001_access_control_schema::Migration),
            Box::new(m20250301_000002_audit_and_jobs::Migration),
        ]
    }
}

/// Auto-increment primary key sized for the backend: SQLite only treats
/// `INTEGER PRIMARY KEY` as a rowid alias.
pub(crate) fn id_column<T: IntoIden>(backend: sea_orm::DatabaseBackend, col: T) -> ColumnDef {
    match backend {
        sea_orm::DatabaseBackend::Postgres => ColumnDef::new(col)
            .big_integer()
            .not_null()
            .auto_increment()
            .primary_key()
            .to_owned(),
        _ => ColumnDef::new(col)
            .integer()
            .not_null()
            .auto_increment()
            .primary_key()
            .to_owned(),
    }
}
