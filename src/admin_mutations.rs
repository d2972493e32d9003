use async_graphql::*;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, QuerySelect};
use std::sync::Arc;

use crate::authz::errors::AuthzError;
use crate::authz::management::{NewRole, RolePatch, RoleService};
use crate::authz::route_cache::CachedRouteTable;
use crate::authz::templates::RoleTemplate;
use crate::authz::types::{self as domain, RoleType};
use crate::jobs;
use crate::seed;
use crate::storage::{self, UserSummary};

/// Shared settings and handles for the admin resolvers
#[derive(Clone)]
pub struct AdminContext {
    pub retention_days: u32,
    /// Invalidated after route mutations when the guard reads through a cache
    pub route_cache: Option<Arc<CachedRouteTable>>,
}

/// Acting administrator for the current request, recorded on audit events
#[derive(Clone, Debug)]
pub struct AdminActor(pub String);

fn authz_error(e: AuthzError) -> Error {
    let code = e.code();
    Error::new(e.to_string()).extend_with(|_, ext| ext.set("code", code))
}

fn role_service<'a>(ctx: &'a Context<'_>) -> Result<&'a RoleService> {
    ctx.data::<RoleService>()
        .map_err(|_| Error::new("Role service not available"))
}

fn actor(ctx: &Context<'_>) -> String {
    ctx.data_opt::<AdminActor>()
        .map(|a| a.0.clone())
        .unwrap_or_else(|| "admin".to_string())
}

// ============================================================================
// Output types
// ============================================================================

#[derive(SimpleObject)]
pub struct PermissionObject {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
}

impl From<domain::Permission> for PermissionObject {
    fn from(p: domain::Permission) -> Self {
        Self {
            id: p.id,
            name: p.name,
            description: p.description,
        }
    }
}

#[derive(SimpleObject)]
pub struct RoleObject {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    /// "business" | "admin"
    pub role_type: String,
    pub priority: i64,
    pub is_default: bool,
    pub is_system: bool,
    pub deleted: bool,
    pub permissions: Vec<PermissionObject>,
}

impl From<domain::Role> for RoleObject {
    fn from(r: domain::Role) -> Self {
        Self {
            id: r.id,
            name: r.name,
            description: r.description,
            role_type: r.role_type.as_str().to_string(),
            priority: r.priority,
            is_default: r.is_default,
            is_system: r.is_system,
            deleted: r.deleted,
            permissions: r.permissions.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(SimpleObject)]
pub struct ConflictObject {
    /// "MISSING_DEPENDENCY" | "REDUNDANT_PERMISSION"
    pub kind: String,
    /// "LOW" | "MEDIUM" | "HIGH"
    pub severity: String,
    pub permission: String,
    pub related: String,
    pub message: String,
}

impl From<domain::PermissionConflict> for ConflictObject {
    fn from(c: domain::PermissionConflict) -> Self {
        Self {
            kind: c.kind.as_str().to_string(),
            severity: c.severity.as_str().to_string(),
            permission: c.permission,
            related: c.related,
            message: c.message,
        }
    }
}

#[derive(SimpleObject)]
pub struct TemplateObject {
    pub id: String,
    pub name: String,
    pub description: String,
    pub role_type: String,
    pub priority: i64,
    pub permissions: Vec<String>,
}

impl From<&RoleTemplate> for TemplateObject {
    fn from(t: &RoleTemplate) -> Self {
        Self {
            id: t.id.to_string(),
            name: t.name.to_string(),
            description: t.description.to_string(),
            role_type: t.role_type.as_str().to_string(),
            priority: t.priority,
            permissions: t.permissions.iter().map(|p| p.to_string()).collect(),
        }
    }
}

#[derive(SimpleObject)]
pub struct UserObject {
    pub id: String,
    pub username: String,
    pub is_banned: bool,
    pub is_suspended: bool,
    pub business_role_id: Option<i64>,
    pub assigned_role_id: Option<i64>,
    pub created_at: i64,
}

impl From<UserSummary> for UserObject {
    fn from(u: UserSummary) -> Self {
        Self {
            id: u.id,
            username: u.username,
            is_banned: u.is_banned,
            is_suspended: u.is_suspended,
            business_role_id: u.business_role_id,
            assigned_role_id: u.assigned_role_id,
            created_at: u.created_at,
        }
    }
}

#[derive(SimpleObject)]
pub struct UsersPage {
    pub items: Vec<UserObject>,
    pub total: u64,
    pub page: u64,
    pub limit: u64,
}

#[derive(SimpleObject)]
pub struct RouteObject {
    pub path: String,
    pub method: String,
    /// Absent for public routes
    pub required_permission: Option<PermissionObject>,
}

impl From<domain::Route> for RouteObject {
    fn from(r: domain::Route) -> Self {
        Self {
            path: r.path,
            method: r.method,
            required_permission: r.required_permission.map(Into::into),
        }
    }
}

#[derive(SimpleObject)]
pub struct EffectivePermissionsObject {
    pub business_permissions: Vec<PermissionObject>,
    pub admin_permissions: Vec<PermissionObject>,
    pub all_unique: Vec<PermissionObject>,
}

#[derive(SimpleObject)]
pub struct AssignmentResult {
    pub role: RoleObject,
    pub conflicts: Vec<ConflictObject>,
}

#[derive(SimpleObject)]
pub struct TemplateResult {
    pub role: RoleObject,
    pub skipped_permissions: Vec<String>,
}

#[derive(SimpleObject)]
pub struct AuditEventObject {
    pub id: i64,
    pub action: String,
    pub principal_id: Option<String>,
    pub decision: String,
    pub reason_code: String,
    pub resource_path: Option<String>,
    pub resource_method: Option<String>,
    pub required_permission: Option<String>,
    pub latency_ms: i64,
    /// JSON object
    pub metadata: String,
    pub created_at: i64,
}

/// Result of triggering a job
#[derive(SimpleObject)]
pub struct JobTriggerResult {
    pub success: bool,
    pub message: String,
    pub job_name: String,
    pub records_processed: Option<u64>,
}

/// Job log entry
#[derive(SimpleObject)]
pub struct JobLog {
    pub id: i64,
    pub job_name: String,
    pub started_at: i64,
    pub completed_at: Option<i64>,
    pub success: Option<i64>,
    pub error_message: Option<String>,
    pub records_processed: Option<i64>,
}

/// Information about an available job
#[derive(SimpleObject)]
pub struct JobInfo {
    pub name: String,
    pub description: String,
    pub schedule: String,
}

// ============================================================================
// Inputs
// ============================================================================

#[derive(InputObject)]
pub struct CreateRoleInput {
    pub name: String,
    pub description: Option<String>,
    /// "business" | "admin"
    pub role_type: String,
    pub priority: Option<i64>,
}

#[derive(InputObject, Default)]
pub struct UpdateRoleInput {
    pub name: Option<String>,
    pub description: Option<String>,
    pub is_default: Option<bool>,
    pub is_system: Option<bool>,
    pub priority: Option<i64>,
}

// ============================================================================
// Queries
// ============================================================================

/// Custom queries for admin operations
#[derive(Default)]
pub struct AdminQuery;

#[Object]
impl AdminQuery {
    async fn roles(
        &self,
        ctx: &Context<'_>,
        #[graphql(default = false)] include_deleted: bool,
    ) -> Result<Vec<RoleObject>> {
        let roles = role_service(ctx)?
            .list_roles(include_deleted)
            .await
            .map_err(authz_error)?;
        Ok(roles.into_iter().map(Into::into).collect())
    }

    async fn role(&self, ctx: &Context<'_>, id: i64) -> Result<RoleObject> {
        Ok(role_service(ctx)?
            .get_role(id)
            .await
            .map_err(authz_error)?
            .into())
    }

    async fn permissions(&self, ctx: &Context<'_>) -> Result<Vec<PermissionObject>> {
        let permissions = role_service(ctx)?
            .list_permissions()
            .await
            .map_err(authz_error)?;
        Ok(permissions.into_iter().map(Into::into).collect())
    }

    async fn role_templates(&self, ctx: &Context<'_>) -> Result<Vec<TemplateObject>> {
        Ok(role_service(ctx)?
            .list_templates()
            .iter()
            .map(Into::into)
            .collect())
    }

    /// Users holding the role in either slot; `page` is 1-based
    async fn users_with_role(
        &self,
        ctx: &Context<'_>,
        role_id: i64,
        #[graphql(default = 1)] page: u64,
        #[graphql(default = 20)] limit: u64,
    ) -> Result<UsersPage> {
        let result = role_service(ctx)?
            .get_users_with_role(role_id, page, limit)
            .await
            .map_err(authz_error)?;
        Ok(UsersPage {
            items: result.items.into_iter().map(Into::into).collect(),
            total: result.total,
            page: result.page,
            limit: result.limit,
        })
    }

    /// Advisory conflict analysis of a candidate permission set
    async fn permission_conflicts(
        &self,
        ctx: &Context<'_>,
        permission_ids: Vec<i64>,
    ) -> Result<Vec<ConflictObject>> {
        let conflicts = role_service(ctx)?
            .detect_permission_conflicts(&permission_ids)
            .await
            .map_err(authz_error)?;
        Ok(conflicts.into_iter().map(Into::into).collect())
    }

    async fn effective_permissions(
        &self,
        ctx: &Context<'_>,
        user_id: String,
    ) -> Result<EffectivePermissionsObject> {
        let effective = role_service(ctx)?
            .effective_permissions_for(&user_id)
            .await
            .map_err(authz_error)?;
        Ok(EffectivePermissionsObject {
            business_permissions: effective
                .business_permissions
                .into_iter()
                .map(Into::into)
                .collect(),
            admin_permissions: effective
                .admin_permissions
                .into_iter()
                .map(Into::into)
                .collect(),
            all_unique: effective.all_unique.into_iter().map(Into::into).collect(),
        })
    }

    async fn user(&self, ctx: &Context<'_>, id: String) -> Result<Option<UserObject>> {
        let user = storage::get_user(role_service(ctx)?.db(), &id)
            .await
            .map_err(authz_error)?;
        Ok(user.map(Into::into))
    }

    async fn routes(&self, ctx: &Context<'_>) -> Result<Vec<RouteObject>> {
        let routes = storage::list_routes(role_service(ctx)?.db())
            .await
            .map_err(authz_error)?;
        Ok(routes.into_iter().map(Into::into).collect())
    }

    /// Most recent audit events, newest first
    async fn audit_events(
        &self,
        ctx: &Context<'_>,
        #[graphql(desc = "Filter by principal id")] principal_id: Option<String>,
        #[graphql(desc = "Limit number of results", default = 100)] limit: u64,
    ) -> Result<Vec<AuditEventObject>> {
        let rows = storage::recent_audit_events(
            role_service(ctx)?.db(),
            principal_id.as_deref(),
            limit.min(1000),
        )
        .await
        .map_err(authz_error)?;

        Ok(rows
            .into_iter()
            .map(|row| AuditEventObject {
                id: row.id,
                action: row.action,
                principal_id: row.principal_id,
                decision: row.decision,
                reason_code: row.reason_code,
                resource_path: row.resource_path,
                resource_method: row.resource_method,
                required_permission: row.required_permission,
                latency_ms: row.latency_ms,
                metadata: row.metadata,
                created_at: row.created_at,
            })
            .collect())
    }

    /// Get recent job executions with optional filtering
    async fn job_logs(
        &self,
        ctx: &Context<'_>,
        #[graphql(desc = "Filter by job name")] job_name: Option<String>,
        #[graphql(desc = "Limit number of results", default = 100)] limit: i64,
        #[graphql(desc = "Only show failed jobs")] only_failures: Option<bool>,
    ) -> Result<Vec<JobLog>> {
        let db = ctx
            .data::<Arc<DatabaseConnection>>()
            .map_err(|_| Error::new("Database connection not available"))?;

        use crate::entities::job_execution::{Column, Entity};

        let mut query = Entity::find();

        if let Some(name) = job_name {
            query = query.filter(Column::JobName.eq(name));
        }

        if let Some(true) = only_failures {
            query = query.filter(Column::Success.eq(0));
        }

        let results = query
            .order_by_desc(Column::StartedAt)
            .limit(limit.max(0) as u64)
            .all(db.as_ref())
            .await
            .map_err(|e| Error::new(format!("Database error: {}", e)))?;

        Ok(results
            .into_iter()
            .map(|model| JobLog {
                id: model.id,
                job_name: model.job_name,
                started_at: model.started_at,
                completed_at: model.completed_at,
                success: model.success,
                error_message: model.error_message,
                records_processed: model.records_processed,
            })
            .collect())
    }

    /// Get list of available jobs that can be triggered
    async fn available_jobs(&self) -> Result<Vec<JobInfo>> {
        Ok(jobs::AVAILABLE_JOBS
            .iter()
            .map(|(name, description, schedule)| JobInfo {
                name: name.to_string(),
                description: description.to_string(),
                schedule: schedule.to_string(),
            })
            .collect())
    }
}

// ============================================================================
// Mutations
// ============================================================================

/// Custom mutations for admin operations
#[derive(Default)]
pub struct AdminMutation;

#[Object]
impl AdminMutation {
    async fn create_permission(
        &self,
        ctx: &Context<'_>,
        name: String,
        description: Option<String>,
    ) -> Result<PermissionObject> {
        Ok(role_service(ctx)?
            .create_permission(&actor(ctx), &name, description)
            .await
            .map_err(authz_error)?
            .into())
    }

    async fn create_role(&self, ctx: &Context<'_>, input: CreateRoleInput) -> Result<RoleObject> {
        let role_type: RoleType = input.role_type.parse().map_err(authz_error)?;
        let new_role = NewRole {
            name: input.name,
            description: input.description,
            role_type,
            priority: input.priority,
        };
        Ok(role_service(ctx)?
            .create_role(&actor(ctx), new_role)
            .await
            .map_err(authz_error)?
            .into())
    }

    async fn update_role(
        &self,
        ctx: &Context<'_>,
        id: i64,
        input: UpdateRoleInput,
    ) -> Result<RoleObject> {
        let patch = RolePatch {
            name: input.name,
            description: input.description,
            is_default: input.is_default,
            is_system: input.is_system,
            priority: input.priority,
        };
        Ok(role_service(ctx)?
            .update_role(&actor(ctx), id, patch)
            .await
            .map_err(authz_error)?
            .into())
    }

    /// Soft-delete a role that no user references
    async fn remove_role(&self, ctx: &Context<'_>, id: i64) -> Result<bool> {
        role_service(ctx)?
            .remove_role(&actor(ctx), id)
            .await
            .map_err(authz_error)?;
        Ok(true)
    }

    async fn update_role_priority(
        &self,
        ctx: &Context<'_>,
        id: i64,
        priority: i64,
    ) -> Result<RoleObject> {
        Ok(role_service(ctx)?
            .update_role_priority(&actor(ctx), id, priority)
            .await
            .map_err(authz_error)?
            .into())
    }

    /// Replace the role's permission set wholesale
    async fn bulk_assign_permissions(
        &self,
        ctx: &Context<'_>,
        role_id: i64,
        permission_ids: Vec<i64>,
    ) -> Result<AssignmentResult> {
        let outcome = role_service(ctx)?
            .bulk_assign_permissions(&actor(ctx), role_id, &permission_ids)
            .await
            .map_err(authz_error)?;
        Ok(AssignmentResult {
            role: outcome.role.into(),
            conflicts: outcome.conflicts.into_iter().map(Into::into).collect(),
        })
    }

    async fn remove_permission(
        &self,
        ctx: &Context<'_>,
        role_id: i64,
        permission_id: i64,
    ) -> Result<bool> {
        role_service(ctx)?
            .remove_permission(&actor(ctx), role_id, permission_id)
            .await
            .map_err(authz_error)?;
        Ok(true)
    }

    async fn create_role_from_template(
        &self,
        ctx: &Context<'_>,
        template_id: String,
        name: Option<String>,
    ) -> Result<TemplateResult> {
        let outcome = role_service(ctx)?
            .create_from_template(&actor(ctx), &template_id, name.as_deref())
            .await
            .map_err(authz_error)?;
        Ok(TemplateResult {
            role: outcome.role.into(),
            skipped_permissions: outcome.skipped_permissions,
        })
    }

    /// Set or clear a user's admin role
    async fn assign_admin_role(
        &self,
        ctx: &Context<'_>,
        user_id: String,
        role_id: Option<i64>,
    ) -> Result<UserObject> {
        Ok(role_service(ctx)?
            .assign_admin_role(&actor(ctx), &user_id, role_id)
            .await
            .map_err(authz_error)?
            .into())
    }

    async fn set_business_role(
        &self,
        ctx: &Context<'_>,
        user_id: String,
        role_id: Option<i64>,
    ) -> Result<UserObject> {
        Ok(role_service(ctx)?
            .set_business_role(&actor(ctx), &user_id, role_id)
            .await
            .map_err(authz_error)?
            .into())
    }

    async fn set_user_status(
        &self,
        ctx: &Context<'_>,
        user_id: String,
        banned: Option<bool>,
        suspended: Option<bool>,
    ) -> Result<UserObject> {
        Ok(role_service(ctx)?
            .set_user_status(&actor(ctx), &user_id, banned, suspended)
            .await
            .map_err(authz_error)?
            .into())
    }

    /// Register a principal under the default business role
    async fn register_user(
        &self,
        ctx: &Context<'_>,
        id: String,
        username: String,
    ) -> Result<UserObject> {
        Ok(seed::register_user(role_service(ctx)?.db(), &id, &username)
            .await
            .map_err(authz_error)?
            .into())
    }

    async fn upsert_route(
        &self,
        ctx: &Context<'_>,
        path: String,
        method: String,
        #[graphql(desc = "Permission name; omit for a public route")] required_permission: Option<
            String,
        >,
    ) -> Result<RouteObject> {
        let route = role_service(ctx)?
            .upsert_route(&actor(ctx), &path, &method, required_permission.as_deref())
            .await
            .map_err(authz_error)?;
        if let Some(cache) = route_cache(ctx) {
            cache.invalidate(&route.path, &route.method);
        }
        Ok(route.into())
    }

    async fn delete_route(&self, ctx: &Context<'_>, path: String, method: String) -> Result<bool> {
        role_service(ctx)?
            .delete_route(&actor(ctx), &path, &method)
            .await
            .map_err(authz_error)?;
        if let Some(cache) = route_cache(ctx) {
            cache.invalidate_all();
        }
        Ok(true)
    }

    /// Manually trigger a background job by name
    async fn trigger_job(&self, ctx: &Context<'_>, job_name: String) -> Result<JobTriggerResult> {
        let db = ctx
            .data::<Arc<DatabaseConnection>>()
            .map_err(|_| Error::new("Database connection not available"))?;
        let retention_days = ctx
            .data_opt::<AdminContext>()
            .map(|c| c.retention_days)
            .unwrap_or(90);

        match jobs::trigger_job_manually(db.as_ref(), &job_name, retention_days).await {
            Ok(count) => Ok(JobTriggerResult {
                success: true,
                message: format!("Job '{}' triggered successfully", job_name),
                job_name,
                records_processed: Some(count),
            }),
            Err(e) => Ok(JobTriggerResult {
                success: false,
                message: format!("Failed to trigger job '{}': {}", job_name, e),
                job_name,
                records_processed: None,
            }),
        }
    }
}

fn route_cache<'a>(ctx: &'a Context<'_>) -> Option<&'a Arc<CachedRouteTable>> {
    ctx.data_opt::<AdminContext>()
        .and_then(|c| c.route_cache.as_ref())
}
