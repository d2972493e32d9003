use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use crate::authz::errors::AuthzError;

/// A named capability, e.g. `manage_products`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Permission {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
}

/// Which authority track a role belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoleType {
    Business,
    Admin,
}

impl RoleType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoleType::Business => "business",
            RoleType::Admin => "admin",
        }
    }
}

impl fmt::Display for RoleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RoleType {
    type Err = AuthzError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "business" => Ok(RoleType::Business),
            "admin" => Ok(RoleType::Admin),
            other => Err(AuthzError::InvalidRequest(format!(
                "unknown role type `{other}` (expected \"business\" or \"admin\")"
            ))),
        }
    }
}

/// A role together with the permissions linked to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub role_type: RoleType,
    /// Tie-break convention only; system roles use >= 100.
    pub priority: i64,
    pub is_default: bool,
    pub is_system: bool,
    pub deleted: bool,
    pub permissions: Vec<Permission>,
}

/// Read projection of a user for authorization purposes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: String,
    pub is_banned: bool,
    pub is_suspended: bool,
    pub business_role: Option<Role>,
    pub assigned_role: Option<Role>,
}

/// Entry of the route authorization table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    pub path: String,
    pub method: String,
    /// `None` marks an explicitly public route.
    pub required_permission: Option<Permission>,
}

/// Output of the permission resolver.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectivePermissions {
    pub business_permissions: Vec<Permission>,
    pub admin_permissions: Vec<Permission>,
    /// Union of both tracks, deduplicated by permission id, first-seen order.
    pub all_unique: Vec<Permission>,
}

impl EffectivePermissions {
    pub fn contains_id(&self, id: i64) -> bool {
        self.all_unique.iter().any(|p| p.id == id)
    }

    pub fn contains_name(&self, name: &str) -> bool {
        self.all_unique.iter().any(|p| p.name == name)
    }

    pub fn names(&self) -> Vec<String> {
        self.all_unique.iter().map(|p| p.name.clone()).collect()
    }

    pub fn ids(&self) -> HashSet<i64> {
        self.all_unique.iter().map(|p| p.id).collect()
    }
}

/// One request to authorize.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthzRequest {
    /// Verified principal id; `None` means the caller is not authenticated.
    #[serde(default)]
    pub principal_id: Option<String>,
    /// Raw request path, possibly with a query string.
    pub path: String,
    pub method: String,
    /// Route template already matched by the HTTP layer, e.g. `/api/products/{id}`.
    #[serde(default)]
    pub matched_route: Option<String>,
}

impl AuthzRequest {
    pub fn new(principal_id: Option<&str>, method: &str, path: &str) -> Self {
        Self {
            principal_id: principal_id.map(str::to_string),
            path: path.to_string(),
            method: method.to_string(),
            matched_route: None,
        }
    }

    pub fn with_matched_route(mut self, template: &str) -> Self {
        self.matched_route = Some(template.to_string());
        self
    }
}

/// Reason attached to every terminal guard outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReasonCode {
    Unauthenticated,
    PrincipalNotFound,
    AccountBanned,
    UnmappedRoute,
    PublicRoute,
    PermissionGranted,
    MissingPermission,
}

impl ReasonCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReasonCode::Unauthenticated => "UNAUTHENTICATED",
            ReasonCode::PrincipalNotFound => "PRINCIPAL_NOT_FOUND",
            ReasonCode::AccountBanned => "ACCOUNT_BANNED",
            ReasonCode::UnmappedRoute => "UNMAPPED_ROUTE",
            ReasonCode::PublicRoute => "PUBLIC_ROUTE",
            ReasonCode::PermissionGranted => "PERMISSION_GRANTED",
            ReasonCode::MissingPermission => "MISSING_PERMISSION",
        }
    }
}

impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tagged result of the guard pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Decision {
    Allow {
        reason: ReasonCode,
    },
    Deny {
        reason: ReasonCode,
        /// Only set for `MISSING_PERMISSION`; the held set is never exposed here.
        #[serde(skip_serializing_if = "Option::is_none")]
        required_permission: Option<String>,
    },
}

impl Decision {
    pub fn allow(reason: ReasonCode) -> Self {
        Decision::Allow { reason }
    }

    pub fn deny(reason: ReasonCode) -> Self {
        Decision::Deny {
            reason,
            required_permission: None,
        }
    }

    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow { .. })
    }

    pub fn reason(&self) -> ReasonCode {
        match self {
            Decision::Allow { reason } | Decision::Deny { reason, .. } => *reason,
        }
    }

    pub fn verdict(&self) -> Verdict {
        if self.is_allowed() {
            Verdict::Allow
        } else {
            Verdict::Deny
        }
    }

    /// Convert a denial into the user-safe error surfaced to callers.
    pub fn into_result(self) -> Result<(), AuthzError> {
        match self {
            Decision::Allow { .. } => Ok(()),
            Decision::Deny {
                reason,
                required_permission,
            } => Err(match reason {
                ReasonCode::Unauthenticated => AuthzError::Unauthenticated,
                ReasonCode::PrincipalNotFound => AuthzError::PrincipalNotFound(String::new()),
                ReasonCode::AccountBanned => AuthzError::AccountBanned,
                _ => AuthzError::MissingPermission(required_permission.unwrap_or_default()),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verdict {
    Allow,
    Deny,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Allow => "ALLOW",
            Verdict::Deny => "DENY",
        }
    }
}

/// Security audit record for decisions and administrative mutations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    /// `authorize` for guard decisions, `role.*`/`user.*`/`route.*` for mutations.
    pub action: String,
    pub principal_id: Option<String>,
    pub decision: Verdict,
    pub reason_code: String,
    pub resource_path: Option<String>,
    pub resource_method: Option<String>,
    pub required_permission: Option<String>,
    pub latency_ms: u64,
    pub metadata: Value,
}

impl AuditEvent {
    /// Audit record for a successful administrative mutation.
    pub fn mutation(actor: &str, action: &str, reason_code: &str, metadata: Value) -> Self {
        Self {
            action: action.to_string(),
            principal_id: Some(actor.to_string()),
            decision: Verdict::Allow,
            reason_code: reason_code.to_string(),
            resource_path: None,
            resource_method: None,
            required_permission: None,
            latency_ms: 0,
            metadata,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConflictKind {
    MissingDependency,
    RedundantPermission,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl ConflictKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictKind::MissingDependency => "MISSING_DEPENDENCY",
            ConflictKind::RedundantPermission => "REDUNDANT_PERMISSION",
        }
    }
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "LOW",
            Severity::Medium => "MEDIUM",
            Severity::High => "HIGH",
        }
    }
}

/// Advisory finding from the conflict detector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionConflict {
    pub kind: ConflictKind,
    pub severity: Severity,
    /// The permission that triggered the rule.
    pub permission: String,
    /// The permission it depends on or overlaps with.
    pub related: String,
    pub message: String,
}

/// Page of results from a paginated admin query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u64,
    pub limit: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decision_serialization() {
        let deny = Decision::Deny {
            reason: ReasonCode::MissingPermission,
            required_permission: Some("manage_users".into()),
        };
        assert_eq!(
            serde_json::to_value(&deny).unwrap(),
            json!({
                "decision": "DENY",
                "reason": "MISSING_PERMISSION",
                "required_permission": "manage_users"
            })
        );

        let allow = Decision::allow(ReasonCode::PublicRoute);
        assert_eq!(
            serde_json::to_value(&allow).unwrap(),
            json!({ "decision": "ALLOW", "reason": "PUBLIC_ROUTE" })
        );
    }

    #[test]
    fn test_role_type_parse() {
        assert_eq!("admin".parse::<RoleType>().unwrap(), RoleType::Admin);
        assert_eq!("business".parse::<RoleType>().unwrap(), RoleType::Business);
        assert!("superuser".parse::<RoleType>().is_err());
    }

    #[test]
    fn test_denial_into_result() {
        let err = Decision::deny(ReasonCode::AccountBanned)
            .into_result()
            .unwrap_err();
        assert_eq!(err.code(), "ACCOUNT_BANNED");
        assert!(Decision::allow(ReasonCode::UnmappedRoute).into_result().is_ok());
    }
}
