//! Administrative operations over roles, permissions and role assignments.
//!
//! Every successful mutation emits one audit event naming the acting
//! administrator. Multi-row writes run inside a single transaction so readers
//! never observe a partially replaced permission set.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DatabaseTransaction, EntityTrait,
    IntoActiveModel, ModelTrait, PaginatorTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::authz::conflicts::{detect_permission_conflicts, validate_permission_name};
use crate::authz::errors::AuthzError;
use crate::authz::resolver;
use crate::authz::store::{AuditSink, PrincipalStore};
use crate::authz::templates::{find_template, RoleTemplate, ROLE_TEMPLATES};
use crate::authz::types::{
    AuditEvent, EffectivePermissions, Page, Permission, PermissionConflict, Role, RoleType, Route,
};
use crate::entities;
use crate::storage::{self, UserSummary};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRole {
    pub name: String,
    pub description: Option<String>,
    pub role_type: RoleType,
    /// Defaults to 0.
    pub priority: Option<i64>,
}

/// Partial update; `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RolePatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub is_default: Option<bool>,
    pub is_system: Option<bool>,
    pub priority: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssignmentOutcome {
    pub role: Role,
    /// Advisory only; the assignment has already been applied.
    pub conflicts: Vec<PermissionConflict>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TemplateOutcome {
    pub role: Role,
    /// Template permissions that do not exist in this deployment.
    pub skipped_permissions: Vec<String>,
}

#[derive(Clone)]
pub struct RoleService {
    db: DatabaseConnection,
    audit: Arc<dyn AuditSink>,
}

impl RoleService {
    pub fn new(db: DatabaseConnection, audit: Arc<dyn AuditSink>) -> Self {
        Self { db, audit }
    }

    pub fn db(&self) -> &DatabaseConnection {
        &self.db
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Fetch a role, including soft-deleted ones.
    pub async fn get_role(&self, role_id: i64) -> Result<Role, AuthzError> {
        let model = self.find_role_model(role_id).await?;
        let permissions = storage::role_permissions(&self.db, &model).await?;
        storage::role_from_model(model, permissions)
    }

    pub async fn list_roles(&self, include_deleted: bool) -> Result<Vec<Role>, AuthzError> {
        use entities::role::{Column, Entity};

        let mut query = Entity::find();
        if !include_deleted {
            query = query.filter(Column::DeletedAt.is_null());
        }
        let models = query
            .order_by_desc(Column::Priority)
            .order_by_asc(Column::Name)
            .all(&self.db)
            .await?;

        let mut roles = Vec::with_capacity(models.len());
        for model in models {
            let permissions = storage::role_permissions(&self.db, &model).await?;
            roles.push(storage::role_from_model(model, permissions)?);
        }
        Ok(roles)
    }

    pub async fn list_permissions(&self) -> Result<Vec<Permission>, AuthzError> {
        use entities::permission::{Column, Entity};

        Ok(Entity::find()
            .order_by_asc(Column::Name)
            .all(&self.db)
            .await?
            .into_iter()
            .map(storage::permission_from_model)
            .collect())
    }

    pub fn list_templates(&self) -> &'static [RoleTemplate] {
        ROLE_TEMPLATES
    }

    /// Users holding the role in either slot; `page` is 1-based.
    pub async fn get_users_with_role(
        &self,
        role_id: i64,
        page: u64,
        limit: u64,
    ) -> Result<Page<UserSummary>, AuthzError> {
        self.find_role_model(role_id).await?;
        storage::users_with_role(&self.db, role_id, page, limit).await
    }

    /// Resolve ids to names and run the conflict detector.
    pub async fn detect_permission_conflicts(
        &self,
        permission_ids: &[i64],
    ) -> Result<Vec<PermissionConflict>, AuthzError> {
        let permissions = self.resolve_permission_ids(&self.db, permission_ids).await?;
        let names: Vec<&str> = permissions.iter().map(|p| p.name.as_str()).collect();
        Ok(detect_permission_conflicts(&names))
    }

    /// Effective permissions of a stored user, for admin diagnostics.
    pub async fn effective_permissions_for(
        &self,
        user_id: &str,
    ) -> Result<EffectivePermissions, AuthzError> {
        let principal = storage::SeaPrincipalStore::new(self.db.clone())
            .fetch(user_id)
            .await?
            .ok_or_else(|| AuthzError::NotFound(format!("User `{user_id}`")))?;
        Ok(resolver::effective_permissions(&principal))
    }

    // ========================================================================
    // Permissions
    // ========================================================================

    pub async fn create_permission(
        &self,
        actor: &str,
        name: &str,
        description: Option<String>,
    ) -> Result<Permission, AuthzError> {
        validate_permission_name(name)?;
        if storage::get_permission_by_name(&self.db, name).await?.is_some() {
            return Err(AuthzError::InvalidRequest(format!(
                "Permission `{name}` already exists"
            )));
        }

        let model = entities::permission::ActiveModel {
            name: Set(name.to_string()),
            description: Set(description),
            created_at: Set(Utc::now().timestamp()),
            ..Default::default()
        }
        .insert(&self.db)
        .await?;
        let permission = storage::permission_from_model(model);

        self.record(
            actor,
            "permission.create",
            "PERMISSION_CREATED",
            json!({ "permission_id": permission.id, "name": permission.name }),
        );
        Ok(permission)
    }

    // ========================================================================
    // Roles
    // ========================================================================

    pub async fn create_role(&self, actor: &str, input: NewRole) -> Result<Role, AuthzError> {
        let name = input.name.trim();
        if name.is_empty() {
            return Err(AuthzError::InvalidRequest("Role name must not be empty".into()));
        }
        self.ensure_name_available(&self.db, name, None).await?;

        let model = insert_role(
            &self.db,
            name,
            input.description,
            input.role_type,
            input.priority.unwrap_or(0),
        )
        .await?;
        let role = storage::role_from_model(model, Vec::new())?;

        tracing::info!(role_id = role.id, name = %role.name, actor, "Role created");
        self.record(
            actor,
            "role.create",
            "ROLE_CREATED",
            json!({ "role_id": role.id, "name": role.name, "role_type": role.role_type, "priority": role.priority }),
        );
        Ok(role)
    }

    pub async fn update_role(
        &self,
        actor: &str,
        role_id: i64,
        patch: RolePatch,
    ) -> Result<Role, AuthzError> {
        let model = self.find_live_role_model(role_id).await?;

        if model.is_system == 1 {
            let flips_default = patch.is_default.is_some_and(|v| v != (model.is_default == 1));
            let flips_system = patch.is_system.is_some_and(|v| !v);
            let moves_priority = patch.priority.is_some_and(|p| p != model.priority);
            if flips_default || flips_system || moves_priority {
                return Err(AuthzError::InvalidSystemRoleMutation(model.name));
            }
        } else if patch.is_system == Some(true) {
            return Err(AuthzError::InvalidRequest(format!(
                "Role `{}` cannot be promoted to a system role",
                model.name
            )));
        }

        let becomes_default = patch.is_default == Some(true) && model.is_default == 0;
        if becomes_default {
            if model.role_type != RoleType::Business.as_str() {
                return Err(AuthzError::InvalidRequest(format!(
                    "Role `{}` is an admin role and cannot be the default role",
                    model.name
                )));
            }
            if let Some(current) = current_default_role(&self.db, role_id).await? {
                if current.is_system == 1 {
                    return Err(AuthzError::InvalidSystemRoleMutation(current.name));
                }
            }
        }

        let mut changes = serde_json::Map::new();
        let mut active = model.clone().into_active_model();
        if let Some(name) = &patch.name {
            let name = name.trim();
            if name.is_empty() {
                return Err(AuthzError::InvalidRequest("Role name must not be empty".into()));
            }
            self.ensure_name_available(&self.db, name, Some(role_id)).await?;
            active.name = Set(name.to_string());
            changes.insert("name".into(), json!(name));
        }
        if let Some(description) = patch.description {
            changes.insert("description".into(), json!(description));
            active.description = Set(Some(description));
        }
        if let Some(is_default) = patch.is_default {
            active.is_default = Set(i64::from(is_default));
            changes.insert("is_default".into(), json!(is_default));
        }
        if let Some(is_system) = patch.is_system {
            active.is_system = Set(i64::from(is_system));
            changes.insert("is_system".into(), json!(is_system));
        }
        if let Some(priority) = patch.priority {
            active.priority = Set(priority);
            changes.insert("priority".into(), json!(priority));
        }
        let now = Utc::now().timestamp();
        active.updated_at = Set(now);

        // At most one default business role
        let txn = self.db.begin().await?;
        if becomes_default {
            use entities::role::{Column, Entity};

            Entity::update_many()
                .col_expr(Column::IsDefault, Expr::value(0))
                .col_expr(Column::UpdatedAt, Expr::value(now))
                .filter(Column::IsDefault.eq(1))
                .filter(Column::RoleType.eq(RoleType::Business.as_str()))
                .filter(Column::Id.ne(role_id))
                .exec(&txn)
                .await?;
        }
        let model = active.update(&txn).await?;
        txn.commit().await?;

        let permissions = storage::role_permissions(&self.db, &model).await?;
        let role = storage::role_from_model(model, permissions)?;
        self.record(
            actor,
            "role.update",
            "ROLE_UPDATED",
            json!({ "role_id": role_id, "changes": Value::Object(changes) }),
        );
        Ok(role)
    }

    /// Soft-delete a role that no user references.
    pub async fn remove_role(&self, actor: &str, role_id: i64) -> Result<(), AuthzError> {
        let model = self.find_live_role_model(role_id).await?;
        if model.is_system == 1 {
            return Err(AuthzError::InvalidSystemRoleMutation(model.name));
        }

        let txn = self.db.begin().await?;
        let users = storage::count_users_with_role(&txn, role_id).await?;
        if users > 0 {
            txn.rollback().await?;
            return Err(AuthzError::RoleInUse {
                role: model.name,
                users,
            });
        }

        let name = model.name.clone();
        let now = Utc::now().timestamp();
        let mut active = model.into_active_model();
        active.deleted_at = Set(Some(now));
        active.updated_at = Set(now);
        active.update(&txn).await?;
        txn.commit().await?;

        tracing::info!(role_id, name = %name, actor, "Role deleted");
        self.record(
            actor,
            "role.delete",
            "ROLE_DELETED",
            json!({ "role_id": role_id, "name": name }),
        );
        Ok(())
    }

    pub async fn update_role_priority(
        &self,
        actor: &str,
        role_id: i64,
        priority: i64,
    ) -> Result<Role, AuthzError> {
        let model = self.find_live_role_model(role_id).await?;
        if model.is_system == 1 {
            return Err(AuthzError::InvalidSystemRoleMutation(model.name));
        }

        let previous = model.priority;
        let mut active = model.into_active_model();
        active.priority = Set(priority);
        active.updated_at = Set(Utc::now().timestamp());
        let model = active.update(&self.db).await?;

        let permissions = storage::role_permissions(&self.db, &model).await?;
        let role = storage::role_from_model(model, permissions)?;
        self.record(
            actor,
            "role.priority",
            "ROLE_PRIORITY_UPDATED",
            json!({ "role_id": role_id, "from": previous, "to": priority }),
        );
        Ok(role)
    }

    // ========================================================================
    // Role permissions
    // ========================================================================

    /// Replace every permission of the role with `permission_ids`, atomically.
    pub async fn bulk_assign_permissions(
        &self,
        actor: &str,
        role_id: i64,
        permission_ids: &[i64],
    ) -> Result<AssignmentOutcome, AuthzError> {
        let model = self.find_live_role_model(role_id).await?;
        if model.is_system == 1 {
            return Err(AuthzError::InvalidSystemRoleMutation(model.name));
        }
        if permission_ids.is_empty() {
            return Err(AuthzError::InvalidRequest(
                "At least one permission id is required".into(),
            ));
        }

        let txn = self.db.begin().await?;
        let permissions = self.resolve_permission_ids(&txn, permission_ids).await?;
        replace_role_permissions(&txn, role_id, &permissions).await?;

        let mut active = model.into_active_model();
        active.updated_at = Set(Utc::now().timestamp());
        let model = active.update(&txn).await?;
        txn.commit().await?;

        let names: Vec<&str> = permissions.iter().map(|p| p.name.as_str()).collect();
        let conflicts = detect_permission_conflicts(&names);
        for conflict in &conflicts {
            tracing::warn!(
                role_id,
                kind = ?conflict.kind,
                severity = ?conflict.severity,
                "{}",
                conflict.message
            );
        }

        self.record(
            actor,
            "role.permissions.replace",
            "ROLE_PERMISSIONS_REPLACED",
            json!({
                "role_id": role_id,
                "permission_ids": permissions.iter().map(|p| p.id).collect::<Vec<_>>(),
                "conflicts": conflicts.len(),
            }),
        );

        Ok(AssignmentOutcome {
            role: storage::role_from_model(model, permissions)?,
            conflicts,
        })
    }

    pub async fn remove_permission(
        &self,
        actor: &str,
        role_id: i64,
        permission_id: i64,
    ) -> Result<(), AuthzError> {
        use entities::role_permission::{Column, Entity};

        let model = self.find_live_role_model(role_id).await?;

        let txn = self.db.begin().await?;
        let Some(link) = Entity::find_by_id((role_id, permission_id)).one(&txn).await? else {
            return Err(AuthzError::NotFound(format!(
                "Permission {permission_id} on role `{}`",
                model.name
            )));
        };
        let remaining = Entity::find()
            .filter(Column::RoleId.eq(role_id))
            .count(&txn)
            .await?;
        if remaining <= 1 {
            return Err(AuthzError::CannotRemoveLastPermission(model.name));
        }
        link.delete(&txn).await?;
        txn.commit().await?;

        self.record(
            actor,
            "role.permissions.remove",
            "ROLE_PERMISSION_REMOVED",
            json!({ "role_id": role_id, "permission_id": permission_id }),
        );
        Ok(())
    }

    /// Instantiate a catalogue template as a new admin role. Template
    /// permissions missing from this deployment are skipped.
    pub async fn create_from_template(
        &self,
        actor: &str,
        template_id: &str,
        name_override: Option<&str>,
    ) -> Result<TemplateOutcome, AuthzError> {
        use entities::permission::{Column, Entity};

        let template = find_template(template_id)
            .ok_or_else(|| AuthzError::TemplateNotFound(template_id.to_string()))?;
        let name = name_override
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or(template.name);

        let txn = self.db.begin().await?;
        self.ensure_name_available(&txn, name, None).await?;

        let permissions: Vec<Permission> = Entity::find()
            .filter(Column::Name.is_in(template.permissions.iter().copied()))
            .order_by_asc(Column::Id)
            .all(&txn)
            .await?
            .into_iter()
            .map(storage::permission_from_model)
            .collect();
        let skipped_permissions: Vec<String> = template
            .permissions
            .iter()
            .filter(|name| !permissions.iter().any(|p| p.name == **name))
            .map(|name| name.to_string())
            .collect();

        let model = insert_role(
            &txn,
            name,
            Some(template.description.to_string()),
            template.role_type,
            template.priority,
        )
        .await?;
        replace_role_permissions(&txn, model.id, &permissions).await?;
        txn.commit().await?;

        if !skipped_permissions.is_empty() {
            tracing::warn!(
                template = template.id,
                skipped = ?skipped_permissions,
                "Template permissions not found; skipped"
            );
        }

        let role = storage::role_from_model(model, permissions)?;
        self.record(
            actor,
            "role.create_from_template",
            "ROLE_CREATED",
            json!({
                "role_id": role.id,
                "template": template.id,
                "name": role.name,
                "skipped_permissions": skipped_permissions,
            }),
        );
        Ok(TemplateOutcome {
            role,
            skipped_permissions,
        })
    }

    // ========================================================================
    // Principals
    // ========================================================================

    /// Set or clear a user's admin role. Takes effect on the next check.
    pub async fn assign_admin_role(
        &self,
        actor: &str,
        user_id: &str,
        role_id: Option<i64>,
    ) -> Result<UserSummary, AuthzError> {
        self.assign_role_slot(actor, user_id, role_id, RoleType::Admin)
            .await
    }

    /// Set or clear a user's business role.
    pub async fn set_business_role(
        &self,
        actor: &str,
        user_id: &str,
        role_id: Option<i64>,
    ) -> Result<UserSummary, AuthzError> {
        self.assign_role_slot(actor, user_id, role_id, RoleType::Business)
            .await
    }

    pub async fn set_user_status(
        &self,
        actor: &str,
        user_id: &str,
        banned: Option<bool>,
        suspended: Option<bool>,
    ) -> Result<UserSummary, AuthzError> {
        let user = storage::set_user_status(&self.db, user_id, banned, suspended).await?;
        self.record(
            actor,
            "user.status",
            "USER_STATUS_UPDATED",
            json!({ "user_id": user_id, "banned": banned, "suspended": suspended }),
        );
        Ok(user)
    }

    // ========================================================================
    // Routes
    // ========================================================================

    pub async fn upsert_route(
        &self,
        actor: &str,
        path: &str,
        method: &str,
        required_permission: Option<&str>,
    ) -> Result<Route, AuthzError> {
        let route = storage::upsert_route(&self.db, path, method, required_permission).await?;
        self.record(
            actor,
            "route.upsert",
            "ROUTE_UPSERTED",
            json!({
                "path": route.path,
                "method": route.method,
                "required_permission": route.required_permission.as_ref().map(|p| &p.name),
            }),
        );
        Ok(route)
    }

    pub async fn delete_route(
        &self,
        actor: &str,
        path: &str,
        method: &str,
    ) -> Result<(), AuthzError> {
        if !storage::delete_route(&self.db, path, method).await? {
            return Err(AuthzError::NotFound(format!("Route {method} {path}")));
        }
        self.record(
            actor,
            "route.delete",
            "ROUTE_DELETED",
            json!({ "path": path, "method": method }),
        );
        Ok(())
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    async fn assign_role_slot(
        &self,
        actor: &str,
        user_id: &str,
        role_id: Option<i64>,
        slot: RoleType,
    ) -> Result<UserSummary, AuthzError> {
        let user = entities::User::find_by_id(user_id.to_string())
            .one(&self.db)
            .await?
            .ok_or_else(|| AuthzError::NotFound(format!("User `{user_id}`")))?;

        if let Some(role_id) = role_id {
            let role = self.find_live_role_model(role_id).await?;
            if role.role_type != slot.as_str() {
                return Err(AuthzError::InvalidRequest(format!(
                    "Role `{}` is a {} role and cannot fill the {} slot",
                    role.name, role.role_type, slot
                )));
            }
        }

        let mut active = user.into_active_model();
        match slot {
            RoleType::Admin => active.assigned_role_id = Set(role_id),
            RoleType::Business => active.business_role_id = Set(role_id),
        }
        let user: UserSummary = active.update(&self.db).await?.into();

        tracing::info!(user_id, ?role_id, slot = %slot, actor, "Role slot updated");
        self.record(
            actor,
            "user.role",
            "USER_ROLE_ASSIGNED",
            json!({ "user_id": user_id, "slot": slot, "role_id": role_id }),
        );
        Ok(user)
    }

    async fn find_role_model(&self, role_id: i64) -> Result<entities::role::Model, AuthzError> {
        entities::Role::find_by_id(role_id)
            .one(&self.db)
            .await?
            .ok_or_else(|| AuthzError::NotFound(format!("Role {role_id}")))
    }

    async fn find_live_role_model(
        &self,
        role_id: i64,
    ) -> Result<entities::role::Model, AuthzError> {
        let model = self.find_role_model(role_id).await?;
        if model.deleted_at.is_some() {
            return Err(AuthzError::NotFound(format!("Role {role_id}")));
        }
        Ok(model)
    }

    async fn ensure_name_available<C: sea_orm::ConnectionTrait>(
        &self,
        db: &C,
        name: &str,
        except: Option<i64>,
    ) -> Result<(), AuthzError> {
        use entities::role::{Column, Entity};

        let mut query = Entity::find()
            .filter(Column::Name.eq(name))
            .filter(Column::DeletedAt.is_null());
        if let Some(id) = except {
            query = query.filter(Column::Id.ne(id));
        }
        if query.one(db).await?.is_some() {
            return Err(AuthzError::InvalidRequest(format!(
                "Role `{name}` already exists"
            )));
        }
        Ok(())
    }

    /// Load every permission in `ids`, failing with the full list of unknown ids.
    async fn resolve_permission_ids<C: sea_orm::ConnectionTrait>(
        &self,
        db: &C,
        ids: &[i64],
    ) -> Result<Vec<Permission>, AuthzError> {
        use entities::permission::{Column, Entity};

        let wanted: BTreeSet<i64> = ids.iter().copied().collect();
        let found: Vec<Permission> = Entity::find()
            .filter(Column::Id.is_in(wanted.iter().copied()))
            .order_by_asc(Column::Id)
            .all(db)
            .await?
            .into_iter()
            .map(storage::permission_from_model)
            .collect();

        let missing: Vec<i64> = wanted
            .iter()
            .copied()
            .filter(|id| !found.iter().any(|p| p.id == *id))
            .collect();
        if !missing.is_empty() {
            return Err(AuthzError::PermissionsNotFound(missing));
        }
        Ok(found)
    }

    fn record(&self, actor: &str, action: &str, reason_code: &str, metadata: Value) {
        if let Err(e) = self
            .audit
            .emit(AuditEvent::mutation(actor, action, reason_code, metadata))
        {
            tracing::warn!(error = %e, action, "Dropped management audit event");
        }
    }
}

/// The live default business role other than `except`, if any.
async fn current_default_role<C: sea_orm::ConnectionTrait>(
    db: &C,
    except: i64,
) -> Result<Option<entities::role::Model>, AuthzError> {
    use entities::role::{Column, Entity};

    Ok(Entity::find()
        .filter(Column::IsDefault.eq(1))
        .filter(Column::RoleType.eq(RoleType::Business.as_str()))
        .filter(Column::DeletedAt.is_null())
        .filter(Column::Id.ne(except))
        .order_by_desc(Column::IsSystem)
        .one(db)
        .await?)
}

async fn insert_role<C: sea_orm::ConnectionTrait>(
    db: &C,
    name: &str,
    description: Option<String>,
    role_type: RoleType,
    priority: i64,
) -> Result<entities::role::Model, AuthzError> {
    let now = Utc::now().timestamp();
    Ok(entities::role::ActiveModel {
        name: Set(name.to_string()),
        description: Set(description),
        role_type: Set(role_type.as_str().to_string()),
        priority: Set(priority),
        is_default: Set(0),
        is_system: Set(0),
        created_at: Set(now),
        updated_at: Set(now),
        deleted_at: Set(None),
        ..Default::default()
    }
    .insert(db)
    .await?)
}

/// Delete-then-insert the role's permission links on the given transaction.
async fn replace_role_permissions(
    txn: &DatabaseTransaction,
    role_id: i64,
    permissions: &[Permission],
) -> Result<(), AuthzError> {
    use entities::role_permission::{ActiveModel, Column, Entity};

    Entity::delete_many()
        .filter(Column::RoleId.eq(role_id))
        .exec(txn)
        .await?;

    if permissions.is_empty() {
        return Ok(());
    }

    let now = Utc::now().timestamp();
    let rows = permissions.iter().map(|p| ActiveModel {
        role_id: Set(role_id),
        permission_id: Set(p.id),
        created_at: Set(now),
    });
    Entity::insert_many(rows).exec(txn).await?;
    Ok(())
}
