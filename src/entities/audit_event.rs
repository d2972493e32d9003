use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "audit_events")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = true)]
    pub id: i64,
    pub action: String,
    pub principal_id: Option<String>,
    pub decision: String, // "ALLOW" | "DENY"
    pub reason_code: String,
    pub resource_path: Option<String>,
    pub resource_method: Option<String>,
    pub required_permission: Option<String>,
    pub latency_ms: i64,
    pub metadata: String, // JSON object
    pub created_at: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
