use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use miette::Diagnostic;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum AuthzError {
    #[error("Authentication required")]
    #[diagnostic(
        code(tollgate::authz::unauthenticated),
        help("Requests must carry a verified principal id")
    )]
    Unauthenticated,

    #[error("Principal `{0}` not found")]
    #[diagnostic(code(tollgate::authz::principal_not_found))]
    PrincipalNotFound(String),

    #[error("Account is banned")]
    #[diagnostic(code(tollgate::authz::account_banned))]
    AccountBanned,

    #[error("Missing required permission `{0}`")]
    #[diagnostic(code(tollgate::authz::missing_permission))]
    MissingPermission(String),

    #[error("System role `{0}` cannot be modified this way")]
    #[diagnostic(
        code(tollgate::authz::invalid_system_role_mutation),
        help("System roles cannot be deleted, re-prioritised, have their permissions replaced, or lose their is_default/is_system flags")
    )]
    InvalidSystemRoleMutation(String),

    #[error("Role `{role}` is still referenced by {users} user(s)")]
    #[diagnostic(
        code(tollgate::authz::role_in_use),
        help("Reassign or clear the role on every user before deleting it")
    )]
    RoleInUse { role: String, users: u64 },

    #[error("Permissions not found: {0:?}")]
    #[diagnostic(
        code(tollgate::authz::permissions_not_found),
        help("Every permission id must refer to an existing permission")
    )]
    PermissionsNotFound(Vec<i64>),

    #[error("Cannot remove the last permission of role `{0}`")]
    #[diagnostic(
        code(tollgate::authz::cannot_remove_last_permission),
        help("Assign a replacement permission first, or use bulk assignment to replace the set")
    )]
    CannotRemoveLastPermission(String),

    #[error("Role template `{0}` not found")]
    #[diagnostic(
        code(tollgate::authz::template_not_found),
        help("List the catalogue with the `roleTemplates` admin query")
    )]
    TemplateNotFound(String),

    #[error("Invalid permission name `{0}`")]
    #[diagnostic(
        code(tollgate::authz::invalid_permission_name),
        help("Permission names follow `action_resource`: lowercase letters, digits and underscores, e.g. `manage_products`")
    )]
    InvalidPermissionName(String),

    #[error("{0}")]
    #[diagnostic(code(tollgate::authz::invalid_request))]
    InvalidRequest(String),

    #[error("{0} not found")]
    #[diagnostic(code(tollgate::authz::not_found))]
    NotFound(String),

    #[error("Store unavailable: {0}")]
    #[diagnostic(
        code(tollgate::authz::store_unavailable),
        help("The backing database could not be reached; retries are the caller's responsibility")
    )]
    StoreUnavailable(#[from] sea_orm::DbErr),
}

impl AuthzError {
    /// Stable machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            AuthzError::Unauthenticated => "UNAUTHENTICATED",
            AuthzError::PrincipalNotFound(_) => "PRINCIPAL_NOT_FOUND",
            AuthzError::AccountBanned => "ACCOUNT_BANNED",
            AuthzError::MissingPermission(_) => "MISSING_PERMISSION",
            AuthzError::InvalidSystemRoleMutation(_) => "INVALID_SYSTEM_ROLE_MUTATION",
            AuthzError::RoleInUse { .. } => "ROLE_IN_USE",
            AuthzError::PermissionsNotFound(_) => "PERMISSIONS_NOT_FOUND",
            AuthzError::CannotRemoveLastPermission(_) => "CANNOT_REMOVE_LAST_PERMISSION",
            AuthzError::TemplateNotFound(_) => "TEMPLATE_NOT_FOUND",
            AuthzError::InvalidPermissionName(_) => "INVALID_PERMISSION_NAME",
            AuthzError::InvalidRequest(_) => "INVALID_REQUEST",
            AuthzError::NotFound(_) => "NOT_FOUND",
            AuthzError::StoreUnavailable(_) => "STORE_UNAVAILABLE",
        }
    }
}

impl IntoResponse for AuthzError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AuthzError::Unauthenticated | AuthzError::PrincipalNotFound(_) => (
                StatusCode::UNAUTHORIZED,
                "Authentication required".to_string(),
            ),
            // Never echo which permission was missing or what the caller holds
            AuthzError::AccountBanned | AuthzError::MissingPermission(_) => {
                (StatusCode::FORBIDDEN, "Insufficient permissions".to_string())
            }
            AuthzError::InvalidSystemRoleMutation(_)
            | AuthzError::PermissionsNotFound(_)
            | AuthzError::CannotRemoveLastPermission(_)
            | AuthzError::InvalidPermissionName(_)
            | AuthzError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            AuthzError::TemplateNotFound(_) | AuthzError::NotFound(_) => {
                (StatusCode::NOT_FOUND, self.to_string())
            }
            AuthzError::RoleInUse { .. } => (StatusCode::CONFLICT, self.to_string()),
            AuthzError::StoreUnavailable(_) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "Authorization store unavailable".to_string(),
            ),
        };
        let body = json!({ "error": message, "code": self.code() });
        (status, Json(body)).into_response()
    }
}
