//! sea-orm backed implementations of the principal store and route table,
//! plus user/route administration helpers.

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, Database, DatabaseConnection, EntityTrait,
    IntoActiveModel, ModelTrait, PaginatorTrait, QueryFilter, QueryOrder, Set,
};
use sea_orm_migration::MigratorTrait;
use serde::{Deserialize, Serialize};

use crate::authz::errors::AuthzError;
use crate::authz::path::{normalize_method, normalize_route_path};
use crate::authz::store::{PrincipalStore, RouteTable};
use crate::authz::types::{Page, Permission, Principal, Role, Route};
use crate::entities;
use crate::errors::GateError;
use crate::settings::Database as DbCfg;

/// Connect and bring the schema up to date.
pub async fn init(cfg: &DbCfg) -> Result<DatabaseConnection, GateError> {
    let db = Database::connect(&cfg.url).await?;
    migration::Migrator::up(&db, None).await?;
    Ok(db)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: String,
    pub username: String,
    pub is_banned: bool,
    pub is_suspended: bool,
    pub business_role_id: Option<i64>,
    pub assigned_role_id: Option<i64>,
    pub created_at: i64,
}

impl From<entities::user::Model> for UserSummary {
    fn from(model: entities::user::Model) -> Self {
        Self {
            id: model.id,
            username: model.username,
            is_banned: model.is_banned == 1,
            is_suspended: model.is_suspended == 1,
            business_role_id: model.business_role_id,
            assigned_role_id: model.assigned_role_id,
            created_at: model.created_at,
        }
    }
}

pub fn permission_from_model(model: entities::permission::Model) -> Permission {
    Permission {
        id: model.id,
        name: model.name,
        description: model.description,
    }
}

pub fn role_from_model(
    model: entities::role::Model,
    permissions: Vec<Permission>,
) -> Result<Role, AuthzError> {
    Ok(Role {
        id: model.id,
        role_type: model.role_type.parse()?,
        name: model.name,
        description: model.description,
        priority: model.priority,
        is_default: model.is_default == 1,
        is_system: model.is_system == 1,
        deleted: model.deleted_at.is_some(),
        permissions,
    })
}

/// Permissions linked to a role, ordered by id.
pub async fn role_permissions<C: sea_orm::ConnectionTrait>(
    db: &C,
    role: &entities::role::Model,
) -> Result<Vec<Permission>, AuthzError> {
    let permissions = role
        .find_related(entities::Permission)
        .order_by_asc(entities::permission::Column::Id)
        .all(db)
        .await?;
    Ok(permissions.into_iter().map(permission_from_model).collect())
}

/// Load a live role with its permissions. Missing and soft-deleted roles
/// both yield `None`.
pub async fn load_role_graph(
    db: &DatabaseConnection,
    role_id: i64,
) -> Result<Option<Role>, AuthzError> {
    let Some(model) = entities::Role::find_by_id(role_id).one(db).await? else {
        return Ok(None);
    };
    if model.deleted_at.is_some() {
        return Ok(None);
    }
    let permissions = role_permissions(db, &model).await?;
    Ok(Some(role_from_model(model, permissions)?))
}

async fn load_role_slot(
    db: &DatabaseConnection,
    user_id: &str,
    slot: &str,
    role_id: Option<i64>,
) -> Result<Option<Role>, AuthzError> {
    let Some(role_id) = role_id else {
        return Ok(None);
    };
    let role = load_role_graph(db, role_id).await?;
    if role.is_none() {
        tracing::warn!(user_id, slot, role_id, "Dangling role reference treated as absent");
    }
    Ok(role)
}

#[derive(Clone)]
pub struct SeaPrincipalStore {
    db: DatabaseConnection,
}

impl SeaPrincipalStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl PrincipalStore for SeaPrincipalStore {
    async fn fetch(&self, id: &str) -> Result<Option<Principal>, AuthzError> {
        let Some(user) = entities::User::find_by_id(id.to_string())
            .one(&self.db)
            .await?
        else {
            return Ok(None);
        };

        let business_role =
            load_role_slot(&self.db, &user.id, "business", user.business_role_id).await?;
        let assigned_role =
            load_role_slot(&self.db, &user.id, "admin", user.assigned_role_id).await?;

        Ok(Some(Principal {
            id: user.id,
            is_banned: user.is_banned == 1,
            is_suspended: user.is_suspended == 1,
            business_role,
            assigned_role,
        }))
    }
}

#[derive(Clone)]
pub struct SeaRouteTable {
    db: DatabaseConnection,
}

impl SeaRouteTable {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl RouteTable for SeaRouteTable {
    async fn lookup(&self, path: &str, method: &str) -> Result<Option<Route>, AuthzError> {
        use entities::route::{Column, Entity};

        let Some(model) = Entity::find()
            .filter(Column::Path.eq(path))
            .filter(Column::Method.eq(method))
            .one(&self.db)
            .await?
        else {
            return Ok(None);
        };
        route_from_model(&self.db, model).await.map(Some)
    }
}

async fn route_from_model(
    db: &DatabaseConnection,
    model: entities::route::Model,
) -> Result<Route, AuthzError> {
    let required_permission = match model.required_permission_id {
        None => None,
        Some(permission_id) => Some(
            match entities::Permission::find_by_id(permission_id).one(db).await? {
                Some(permission) => permission_from_model(permission),
                None => {
                    // Fail closed: nobody can hold a permission that does not exist
                    tracing::warn!(
                        path = %model.path,
                        method = %model.method,
                        permission_id,
                        "Route references a missing permission"
                    );
                    Permission {
                        id: permission_id,
                        name: format!("#{permission_id}"),
                        description: None,
                    }
                }
            },
        ),
    };
    Ok(Route {
        path: model.path,
        method: model.method,
        required_permission,
    })
}

pub async fn get_permission_by_name(
    db: &DatabaseConnection,
    name: &str,
) -> Result<Option<Permission>, AuthzError> {
    use entities::permission::{Column, Entity};

    Ok(Entity::find()
        .filter(Column::Name.eq(name))
        .one(db)
        .await?
        .map(permission_from_model))
}

// ============================================================================
// Routes
// ============================================================================

/// Create or replace the route entry for (path, method). `{param}` templates
/// and numeric segments are stored as `:param`/`:id`, the form the guard
/// looks up.
pub async fn upsert_route(
    db: &DatabaseConnection,
    path: &str,
    method: &str,
    required_permission: Option<&str>,
) -> Result<Route, AuthzError> {
    use entities::route::{Column, Entity};

    let path = normalize_route_path(path);
    let method = normalize_method(method);

    let required_permission_id = match required_permission {
        None => None,
        Some(name) => Some(
            get_permission_by_name(db, name)
                .await?
                .ok_or_else(|| AuthzError::NotFound(format!("Permission `{name}`")))?
                .id,
        ),
    };

    let model = match Entity::find()
        .filter(Column::Path.eq(path.as_str()))
        .filter(Column::Method.eq(method.as_str()))
        .one(db)
        .await?
    {
        Some(existing) => {
            let mut active = existing.into_active_model();
            active.required_permission_id = Set(required_permission_id);
            active.update(db).await?
        }
        None => {
            entities::route::ActiveModel {
                path: Set(path.clone()),
                method: Set(method.clone()),
                required_permission_id: Set(required_permission_id),
                created_at: Set(Utc::now().timestamp()),
                ..Default::default()
            }
            .insert(db)
            .await?
        }
    };

    route_from_model(db, model).await
}

pub async fn delete_route(
    db: &DatabaseConnection,
    path: &str,
    method: &str,
) -> Result<bool, AuthzError> {
    use entities::route::{Column, Entity};

    let result = Entity::delete_many()
        .filter(Column::Path.eq(normalize_route_path(path)))
        .filter(Column::Method.eq(normalize_method(method)))
        .exec(db)
        .await?;
    Ok(result.rows_affected > 0)
}

pub async fn list_routes(db: &DatabaseConnection) -> Result<Vec<Route>, AuthzError> {
    use entities::route::{Column, Entity};

    let models = Entity::find()
        .order_by_asc(Column::Path)
        .order_by_asc(Column::Method)
        .all(db)
        .await?;
    let mut routes = Vec::with_capacity(models.len());
    for model in models {
        routes.push(route_from_model(db, model).await?);
    }
    Ok(routes)
}

// ============================================================================
// Users
// ============================================================================

pub async fn create_user(
    db: &DatabaseConnection,
    id: &str,
    username: &str,
    business_role_id: Option<i64>,
) -> Result<UserSummary, AuthzError> {
    let user = entities::user::ActiveModel {
        id: Set(id.to_string()),
        username: Set(username.to_string()),
        is_banned: Set(0),
        is_suspended: Set(0),
        business_role_id: Set(business_role_id),
        assigned_role_id: Set(None),
        created_at: Set(Utc::now().timestamp()),
    };
    Ok(user.insert(db).await?.into())
}

pub async fn get_user(
    db: &DatabaseConnection,
    id: &str,
) -> Result<Option<UserSummary>, AuthzError> {
    Ok(entities::User::find_by_id(id.to_string())
        .one(db)
        .await?
        .map(UserSummary::from))
}

/// Update ban/suspension flags; `None` leaves a flag unchanged.
pub async fn set_user_status(
    db: &DatabaseConnection,
    id: &str,
    banned: Option<bool>,
    suspended: Option<bool>,
) -> Result<UserSummary, AuthzError> {
    let user = entities::User::find_by_id(id.to_string())
        .one(db)
        .await?
        .ok_or_else(|| AuthzError::NotFound(format!("User `{id}`")))?;

    let mut active = user.into_active_model();
    if let Some(banned) = banned {
        active.is_banned = Set(if banned { 1 } else { 0 });
    }
    if let Some(suspended) = suspended {
        active.is_suspended = Set(if suspended { 1 } else { 0 });
    }
    Ok(active.update(db).await?.into())
}

/// Number of users referencing the role in either slot.
pub async fn count_users_with_role<C: sea_orm::ConnectionTrait>(
    db: &C,
    role_id: i64,
) -> Result<u64, AuthzError> {
    Ok(entities::User::find()
        .filter(role_slot_condition(role_id))
        .count(db)
        .await?)
}

/// Users holding the role in either slot; `page` is 1-based.
pub async fn users_with_role(
    db: &DatabaseConnection,
    role_id: i64,
    page: u64,
    limit: u64,
) -> Result<Page<UserSummary>, AuthzError> {
    use entities::user::{Column, Entity};

    let page = page.max(1);
    let limit = limit.clamp(1, 100);
    let paginator = Entity::find()
        .filter(role_slot_condition(role_id))
        .order_by_asc(Column::Username)
        .paginate(db, limit);
    let total = paginator.num_items().await?;
    let items = paginator
        .fetch_page(page - 1)
        .await?
        .into_iter()
        .map(UserSummary::from)
        .collect();

    Ok(Page {
        items,
        total,
        page,
        limit,
    })
}

fn role_slot_condition(role_id: i64) -> Condition {
    use entities::user::Column;

    Condition::any()
        .add(Column::BusinessRoleId.eq(role_id))
        .add(Column::AssignedRoleId.eq(role_id))
}

// ============================================================================
// Audit
// ============================================================================

pub async fn recent_audit_events(
    db: &DatabaseConnection,
    principal_id: Option<&str>,
    limit: u64,
) -> Result<Vec<entities::audit_event::Model>, AuthzError> {
    use entities::audit_event::{Column, Entity};
    use sea_orm::QuerySelect;

    let mut query = Entity::find();
    if let Some(principal_id) = principal_id {
        query = query.filter(Column::PrincipalId.eq(principal_id));
    }
    Ok(query
        .order_by_desc(Column::Id)
        .limit(limit)
        .all(db)
        .await?)
}

pub async fn cleanup_expired_audit_events(
    db: &DatabaseConnection,
    retention_days: u32,
) -> Result<u64, AuthzError> {
    use entities::audit_event::{Column, Entity};

    let cutoff = Utc::now().timestamp() - i64::from(retention_days) * 86_400;
    let result = Entity::delete_many()
        .filter(Column::CreatedAt.lt(cutoff))
        .exec(db)
        .await?;
    Ok(result.rows_affected)
}
