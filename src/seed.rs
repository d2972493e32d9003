//! Idempotent startup seeding of the permission catalogue and system roles.

use std::collections::BTreeSet;

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};

use crate::authz::errors::AuthzError;
use crate::authz::templates::ROLE_TEMPLATES;
use crate::authz::types::RoleType;
use crate::entities;
use crate::storage;

/// Platform permissions that no template mentions.
const PLATFORM_PERMISSIONS: &[&str] = &[
    "view_roles",
    "manage_roles",
    "manage_users",
    "view_routes",
    "manage_routes",
    "view_audit",
];

struct SystemRole {
    name: &'static str,
    description: &'static str,
    role_type: RoleType,
    is_default: bool,
    /// `None` grants every seeded permission.
    permissions: Option<&'static [&'static str]>,
}

const SYSTEM_ROLES: &[SystemRole] = &[
    SystemRole {
        name: "super_admin",
        description: "Platform administrator with every permission",
        role_type: RoleType::Admin,
        is_default: false,
        permissions: None,
    },
    SystemRole {
        name: "buyer",
        description: "Default business role for new accounts",
        role_type: RoleType::Business,
        is_default: true,
        permissions: Some(&["view_products", "view_orders", "view_reviews"]),
    },
    SystemRole {
        name: "vendor",
        description: "Sells products on the marketplace",
        role_type: RoleType::Business,
        is_default: false,
        permissions: Some(&[
            "view_products",
            "manage_products",
            "view_orders",
            "view_reviews",
        ]),
    },
];

const SYSTEM_ROLE_PRIORITY: i64 = 100;

/// Every permission name seeded at startup.
pub fn seeded_permission_names() -> BTreeSet<&'static str> {
    ROLE_TEMPLATES
        .iter()
        .flat_map(|t| t.permissions.iter().copied())
        .chain(PLATFORM_PERMISSIONS.iter().copied())
        .collect()
}

/// Create missing permissions and system roles. Existing rows are left alone.
pub async fn ensure_system_roles(db: &DatabaseConnection) -> Result<(), AuthzError> {
    let now = Utc::now().timestamp();
    let txn = db.begin().await?;

    let mut created_permissions = 0;
    for name in seeded_permission_names() {
        let exists = entities::Permission::find()
            .filter(entities::permission::Column::Name.eq(name))
            .one(&txn)
            .await?
            .is_some();
        if !exists {
            entities::permission::ActiveModel {
                name: Set(name.to_string()),
                description: Set(None),
                created_at: Set(now),
                ..Default::default()
            }
            .insert(&txn)
            .await?;
            created_permissions += 1;
        }
    }

    let all_permissions = entities::Permission::find().all(&txn).await?;

    let mut created_roles = 0;
    for definition in SYSTEM_ROLES {
        let exists = entities::Role::find()
            .filter(entities::role::Column::Name.eq(definition.name))
            .filter(entities::role::Column::DeletedAt.is_null())
            .one(&txn)
            .await?
            .is_some();
        if exists {
            continue;
        }

        let role = entities::role::ActiveModel {
            name: Set(definition.name.to_string()),
            description: Set(Some(definition.description.to_string())),
            role_type: Set(definition.role_type.as_str().to_string()),
            priority: Set(SYSTEM_ROLE_PRIORITY),
            is_default: Set(i64::from(definition.is_default)),
            is_system: Set(1),
            created_at: Set(now),
            updated_at: Set(now),
            deleted_at: Set(None),
            ..Default::default()
        }
        .insert(&txn)
        .await?;

        let links: Vec<_> = all_permissions
            .iter()
            .filter(|p| {
                definition
                    .permissions
                    .is_none_or(|names| names.contains(&p.name.as_str()))
            })
            .map(|p| entities::role_permission::ActiveModel {
                role_id: Set(role.id),
                permission_id: Set(p.id),
                created_at: Set(now),
            })
            .collect();
        if !links.is_empty() {
            entities::RolePermission::insert_many(links).exec(&txn).await?;
        }
        created_roles += 1;
    }

    txn.commit().await?;

    if created_permissions > 0 || created_roles > 0 {
        tracing::info!(
            permissions = created_permissions,
            roles = created_roles,
            "Seeded system roles and permissions"
        );
    }
    Ok(())
}

/// Id of the default business role, if one is seeded.
pub async fn default_business_role(db: &DatabaseConnection) -> Result<Option<i64>, AuthzError> {
    use entities::role::{Column, Entity};

    Ok(Entity::find()
        .filter(Column::IsDefault.eq(1))
        .filter(Column::RoleType.eq(RoleType::Business.as_str()))
        .filter(Column::DeletedAt.is_null())
        .order_by_desc(Column::IsSystem)
        .order_by_asc(Column::Id)
        .one(db)
        .await?
        .map(|r| r.id))
}

/// Create a user holding the default business role.
pub async fn register_user(
    db: &DatabaseConnection,
    id: &str,
    username: &str,
) -> Result<storage::UserSummary, AuthzError> {
    let business_role_id = default_business_role(db).await?;
    storage::create_user(db, id, username, business_role_id).await
}
