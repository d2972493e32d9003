//! Merges a principal's business and admin role graphs into one effective set.

use std::collections::HashSet;

use crate::authz::types::{EffectivePermissions, Permission, Principal, Role};

/// Compute the effective permissions of `principal`.
///
/// Works only on the already-loaded role graphs; no lookups are made. A
/// soft-deleted role is treated the same as an empty slot.
pub fn effective_permissions(principal: &Principal) -> EffectivePermissions {
    let business_permissions = live_permissions(principal.business_role.as_ref());
    let admin_permissions = live_permissions(principal.assigned_role.as_ref());

    let mut seen = HashSet::with_capacity(business_permissions.len() + admin_permissions.len());
    let all_unique = business_permissions
        .iter()
        .chain(admin_permissions.iter())
        .filter(|p| seen.insert(p.id))
        .cloned()
        .collect();

    EffectivePermissions {
        business_permissions,
        admin_permissions,
        all_unique,
    }
}

fn live_permissions(role: Option<&Role>) -> Vec<Permission> {
    match role {
        Some(role) if !role.deleted => role.permissions.clone(),
        _ => Vec::new(),
    }
}
