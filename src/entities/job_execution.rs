use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// One run of a background job, scheduled or triggered from the admin API.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "job_executions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = true)]
    pub id: i64,
    /// e.g. `cleanup_expired_audit_events`
    pub job_name: String,
    pub started_at: i64,
    pub completed_at: Option<i64>,
    pub success: Option<i64>, // 0 = failure, 1 = success, NULL = running
    pub error_message: Option<String>,
    /// Rows purged or otherwise touched by the run
    pub records_processed: Option<i64>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
