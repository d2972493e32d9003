use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "routes")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = true)]
    pub id: i64,
    pub path: String,
    pub method: String,
    pub required_permission_id: Option<i64>, // NULL = explicitly public
    pub created_at: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::permission::Entity",
        from = "Column::RequiredPermissionId",
        to = "super::permission::Column::Id"
    )]
    RequiredPermission,
}

impl Related<super::permission::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::RequiredPermission.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
