//! Advisory static analysis over permission names following `action_resource`.
//!
//! Rules:
//! - `delete_<r>` without `view_<r>`: missing dependency, medium severity
//! - `manage_<r>` without `view_<r>`: missing dependency, high severity
//! - `manage_<r>` together with `view_<r>`: redundant, since manage covers view
//!
//! Findings never block assignment.

use std::collections::{BTreeSet, HashSet};

use crate::authz::errors::AuthzError;
use crate::authz::types::{ConflictKind, PermissionConflict, Severity};

/// Split a permission name into `(action, resource)` at the first underscore.
pub fn split_action_resource(name: &str) -> Option<(&str, &str)> {
    let (action, resource) = name.split_once('_')?;
    if action.is_empty() || resource.is_empty() {
        return None;
    }
    Some((action, resource))
}

/// Enforce the `action_resource` naming convention for new permissions.
pub fn validate_permission_name(name: &str) -> Result<(), AuthzError> {
    let well_formed = name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        && name.chars().next().is_some_and(|c| c.is_ascii_lowercase())
        && split_action_resource(name).is_some_and(|(_, resource)| !resource.starts_with('_'))
        && !name.ends_with('_');

    if well_formed {
        Ok(())
    } else {
        Err(AuthzError::InvalidPermissionName(name.to_string()))
    }
}

/// Run every rule over the given permission names. Output is sorted by
/// resource, then rule, so results are stable across calls.
pub fn detect_permission_conflicts<S: AsRef<str>>(names: &[S]) -> Vec<PermissionConflict> {
    let held: HashSet<&str> = names.iter().map(AsRef::as_ref).collect();

    // Names that do not follow the convention are ignored
    let resources: BTreeSet<&str> = held
        .iter()
        .filter_map(|name| split_action_resource(name).map(|(_, resource)| resource))
        .collect();

    let mut conflicts = Vec::new();
    for resource in resources {
        let view = format!("view_{resource}");
        let manage = format!("manage_{resource}");
        let delete = format!("delete_{resource}");
        let has_view = held.contains(view.as_str());

        if held.contains(delete.as_str()) && !has_view {
            conflicts.push(PermissionConflict {
                kind: ConflictKind::MissingDependency,
                severity: Severity::Medium,
                message: format!("`{delete}` is granted without `{view}`"),
                permission: delete,
                related: view.clone(),
            });
        }

        if held.contains(manage.as_str()) {
            if has_view {
                conflicts.push(PermissionConflict {
                    kind: ConflictKind::RedundantPermission,
                    severity: Severity::Low,
                    message: format!("`{manage}` already covers `{view}`"),
                    permission: manage,
                    related: view,
                });
            } else {
                conflicts.push(PermissionConflict {
                    kind: ConflictKind::MissingDependency,
                    severity: Severity::High,
                    message: format!("`{manage}` is granted without `{view}`"),
                    permission: manage,
                    related: view,
                });
            }
        }
    }
    conflicts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delete_without_view() {
        let conflicts = detect_permission_conflicts(&["delete_products"]);
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].kind, ConflictKind::MissingDependency);
        assert_eq!(conflicts[0].severity, Severity::Medium);
        assert_eq!(conflicts[0].related, "view_products");
    }

    #[test]
    fn test_manage_without_view_is_high() {
        let conflicts = detect_permission_conflicts(&["manage_orders"]);
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].kind, ConflictKind::MissingDependency);
        assert_eq!(conflicts[0].severity, Severity::High);
    }

    #[test]
    fn test_manage_with_view_is_redundant() {
        let conflicts = detect_permission_conflicts(&["manage_products", "view_products"]);
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].kind, ConflictKind::RedundantPermission);
        assert_eq!(conflicts[0].permission, "manage_products");
    }

    #[test]
    fn test_independent_permissions() {
        assert!(detect_permission_conflicts(&["view_products", "view_orders"]).is_empty());
        assert!(detect_permission_conflicts::<&str>(&[]).is_empty());
    }

    #[test]
    fn test_delete_with_view_is_clean() {
        assert!(detect_permission_conflicts(&["delete_reviews", "view_reviews"]).is_empty());
    }

    #[test]
    fn test_multiple_resources_sorted() {
        let conflicts =
            detect_permission_conflicts(&["manage_users", "delete_orders", "legacy", "view_users"]);
        let kinds: Vec<_> = conflicts
            .iter()
            .map(|c| (c.permission.as_str(), c.kind))
            .collect();
        assert_eq!(
            kinds,
            vec![
                ("delete_orders", ConflictKind::MissingDependency),
                ("manage_users", ConflictKind::RedundantPermission),
            ]
        );
    }

    #[test]
    fn test_validate_permission_name() {
        assert!(validate_permission_name("manage_products").is_ok());
        assert!(validate_permission_name("view_order_items").is_ok());
        assert!(validate_permission_name("manage_v2_api").is_ok());
        assert!(validate_permission_name("products").is_err());
        assert!(validate_permission_name("Manage_products").is_err());
        assert!(validate_permission_name("_products").is_err());
        assert!(validate_permission_name("manage_").is_err());
        assert!(validate_permission_name("manage__x").is_err());
        assert!(validate_permission_name("manage-products").is_err());
        assert!(validate_permission_name("").is_err());
    }

    #[test]
    fn test_split_action_resource() {
        assert_eq!(
            split_action_resource("view_order_items"),
            Some(("view", "order_items"))
        );
        assert_eq!(split_action_resource("products"), None);
    }
}
