mod helpers;

use std::sync::Arc;

use helpers::{PermissionBuilder, RoleBuilder, TestDb, UserBuilder};
use tollgate::authz::audit::MemoryAuditSink;
use tollgate::authz::management::{NewRole, RolePatch, RoleService};
use tollgate::authz::types::{ConflictKind, RoleType, Severity};
use tollgate::authz::AuthzError;

fn service(db: &TestDb) -> (RoleService, MemoryAuditSink) {
    let audit = MemoryAuditSink::new();
    let service = RoleService::new(db.connection().clone(), Arc::new(audit.clone()));
    (service, audit)
}

async fn permissions(db: &TestDb, names: &[&str]) -> Vec<i64> {
    let mut ids = Vec::new();
    for name in names {
        ids.push(PermissionBuilder::new(name).create(db.connection()).await.id);
    }
    ids
}

#[tokio::test]
async fn test_bulk_assign_replaces_permission_set() {
    let db = TestDb::new().await;
    let (service, audit) = service(&db);
    let ids = permissions(
        &db,
        &["view_products", "manage_products", "view_orders", "view_users", "view_reviews"],
    )
    .await;

    let role = RoleBuilder::new("vendor_plus")
        .with_permissions(&[ids[3], ids[4]])
        .create(db.connection())
        .await;
    UserBuilder::new("u1")
        .with_business_role(role.id)
        .create(db.connection())
        .await;

    let outcome = service
        .bulk_assign_permissions("admin-1", role.id, &ids[..3])
        .await
        .expect("bulk assign");
    let assigned: Vec<i64> = outcome.role.permissions.iter().map(|p| p.id).collect();
    assert_eq!(assigned, ids[..3].to_vec());

    // The resolver sees exactly the replacement set
    let effective = service.effective_permissions_for("u1").await.unwrap();
    let mut held: Vec<i64> = effective.ids().into_iter().collect();
    held.sort();
    assert_eq!(held, ids[..3].to_vec());

    let events = audit.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].action, "role.permissions.replace");
    assert_eq!(events[0].principal_id.as_deref(), Some("admin-1"));
}

#[tokio::test]
async fn test_bulk_assign_reports_conflicts() {
    let db = TestDb::new().await;
    let (service, _audit) = service(&db);
    let ids = permissions(&db, &["manage_products", "delete_orders"]).await;
    let role = RoleBuilder::new("editor").create(db.connection()).await;

    let outcome = service
        .bulk_assign_permissions("admin", role.id, &ids)
        .await
        .unwrap();

    assert_eq!(outcome.conflicts.len(), 2);
    assert!(outcome
        .conflicts
        .iter()
        .all(|c| c.kind == ConflictKind::MissingDependency));
    let orders = outcome
        .conflicts
        .iter()
        .find(|c| c.permission == "delete_orders")
        .expect("delete_orders conflict");
    assert_eq!(orders.severity, Severity::Medium);
    assert_eq!(orders.related, "view_orders");
    let products = outcome
        .conflicts
        .iter()
        .find(|c| c.permission == "manage_products")
        .expect("manage_products conflict");
    assert_eq!(products.severity, Severity::High);
}

#[tokio::test]
async fn test_bulk_assign_unknown_ids_leaves_role_unchanged() {
    let db = TestDb::new().await;
    let (service, audit) = service(&db);
    let ids = permissions(&db, &["view_products", "view_orders"]).await;
    let role = RoleBuilder::new("reader")
        .with_permissions(&[ids[0]])
        .create(db.connection())
        .await;

    let err = service
        .bulk_assign_permissions("admin", role.id, &[ids[1], 999, 1000])
        .await
        .unwrap_err();
    match err {
        AuthzError::PermissionsNotFound(missing) => assert_eq!(missing, vec![999, 1000]),
        other => panic!("unexpected error: {other:?}"),
    }

    let role = service.get_role(role.id).await.unwrap();
    let held: Vec<i64> = role.permissions.iter().map(|p| p.id).collect();
    assert_eq!(held, vec![ids[0]]);
    assert!(audit.is_empty());
}

#[tokio::test]
async fn test_bulk_assign_rejects_system_role_and_empty_set() {
    let db = TestDb::new().await;
    let (service, _audit) = service(&db);
    let ids = permissions(&db, &["view_products"]).await;
    let system = RoleBuilder::new("super_admin")
        .admin()
        .system()
        .create(db.connection())
        .await;
    let custom = RoleBuilder::new("custom").create(db.connection()).await;

    let err = service
        .bulk_assign_permissions("admin", system.id, &ids)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "INVALID_SYSTEM_ROLE_MUTATION");

    let err = service
        .bulk_assign_permissions("admin", custom.id, &[])
        .await
        .unwrap_err();
    assert_eq!(err.code(), "INVALID_REQUEST");
}

#[tokio::test]
async fn test_system_role_mutations_rejected() {
    let db = TestDb::new().await;
    let (service, _audit) = service(&db);
    let buyer = RoleBuilder::new("buyer")
        .system()
        .default_role()
        .create(db.connection())
        .await;

    let err = service.remove_role("admin", buyer.id).await.unwrap_err();
    assert!(matches!(err, AuthzError::InvalidSystemRoleMutation(_)));

    let err = service
        .update_role(
            "admin",
            buyer.id,
            RolePatch {
                is_default: Some(false),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AuthzError::InvalidSystemRoleMutation(_)));

    let err = service
        .update_role_priority("admin", buyer.id, 5)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthzError::InvalidSystemRoleMutation(_)));

    // Descriptive edits are still allowed
    let updated = service
        .update_role(
            "admin",
            buyer.id,
            RolePatch {
                description: Some("Everyone who shops".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert!(updated.is_default);
    assert!(updated.is_system);
    assert_eq!(updated.description.as_deref(), Some("Everyone who shops"));
}

#[tokio::test]
async fn test_roles_cannot_be_promoted_to_system() {
    let db = TestDb::new().await;
    let (service, audit) = service(&db);
    let role = RoleBuilder::new("support").admin().create(db.connection()).await;

    let err = service
        .update_role(
            "admin",
            role.id,
            RolePatch {
                is_system: Some(true),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.code(), "INVALID_REQUEST");
    assert!(!service.get_role(role.id).await.unwrap().is_system);
    assert!(audit.is_empty());

    // The role stays removable
    service.remove_role("admin", role.id).await.unwrap();
}

#[tokio::test]
async fn test_single_default_business_role() {
    let db = TestDb::new().await;
    let (service, _audit) = service(&db);
    let shopper = RoleBuilder::new("shopper")
        .default_role()
        .create(db.connection())
        .await;
    let member = RoleBuilder::new("member").create(db.connection()).await;
    let support = RoleBuilder::new("support").admin().create(db.connection()).await;

    let default = RolePatch {
        is_default: Some(true),
        ..Default::default()
    };

    let updated = service
        .update_role("admin", member.id, default.clone())
        .await
        .unwrap();
    assert!(updated.is_default);
    assert!(!service.get_role(shopper.id).await.unwrap().is_default);
    assert_eq!(
        tollgate::seed::default_business_role(db.connection())
            .await
            .unwrap(),
        Some(member.id)
    );

    let err = service
        .update_role("admin", support.id, default)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "INVALID_REQUEST");
    assert!(!service.get_role(support.id).await.unwrap().is_default);
}

#[tokio::test]
async fn test_system_default_role_keeps_default() {
    let db = TestDb::new().await;
    let (service, _audit) = service(&db);
    let buyer = RoleBuilder::new("buyer")
        .system()
        .default_role()
        .create(db.connection())
        .await;
    let member = RoleBuilder::new("member").create(db.connection()).await;

    let err = service
        .update_role(
            "admin",
            member.id,
            RolePatch {
                is_default: Some(true),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AuthzError::InvalidSystemRoleMutation(name) if name == "buyer"));
    assert!(service.get_role(buyer.id).await.unwrap().is_default);
    assert!(!service.get_role(member.id).await.unwrap().is_default);
}

#[tokio::test]
async fn test_remove_role_in_use() {
    let db = TestDb::new().await;
    let (service, audit) = service(&db);
    let role = RoleBuilder::new("support").admin().create(db.connection()).await;
    UserBuilder::new("u1")
        .with_admin_role(role.id)
        .create(db.connection())
        .await;
    UserBuilder::new("u2")
        .with_admin_role(role.id)
        .create(db.connection())
        .await;

    let err = service.remove_role("admin", role.id).await.unwrap_err();
    match err {
        AuthzError::RoleInUse { users, .. } => assert_eq!(users, 2),
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(!service.get_role(role.id).await.unwrap().deleted);
    assert!(audit.is_empty());

    // Once the last holder is moved off, removal goes through
    for user in ["u1", "u2"] {
        service.assign_admin_role("admin", user, None).await.unwrap();
    }
    service.remove_role("admin", role.id).await.unwrap();
    assert!(service.get_role(role.id).await.unwrap().deleted);
}

#[tokio::test]
async fn test_remove_role_soft_deletes() {
    let db = TestDb::new().await;
    let (service, audit) = service(&db);
    let role = RoleBuilder::new("temp").create(db.connection()).await;

    service.remove_role("admin", role.id).await.unwrap();

    assert!(service.get_role(role.id).await.unwrap().deleted);
    assert!(service.list_roles(false).await.unwrap().is_empty());
    assert_eq!(service.list_roles(true).await.unwrap().len(), 1);
    assert_eq!(audit.events()[0].action, "role.delete");

    // Further mutations treat the role as gone
    let err = service.remove_role("admin", role.id).await.unwrap_err();
    assert_eq!(err.code(), "NOT_FOUND");
}

#[tokio::test]
async fn test_remove_last_permission_rejected() {
    let db = TestDb::new().await;
    let (service, audit) = service(&db);
    let ids = permissions(&db, &["view_products", "view_orders"]).await;
    let role = RoleBuilder::new("single")
        .with_permissions(&[ids[0]])
        .create(db.connection())
        .await;

    let err = service
        .remove_permission("admin", role.id, ids[0])
        .await
        .unwrap_err();
    assert!(matches!(err, AuthzError::CannotRemoveLastPermission(_)));

    let role = service.get_role(role.id).await.unwrap();
    assert_eq!(role.permissions.len(), 1);
    assert!(audit.is_empty());

    let err = service
        .remove_permission("admin", role.id, ids[1])
        .await
        .unwrap_err();
    assert_eq!(err.code(), "NOT_FOUND");
}

#[tokio::test]
async fn test_remove_permission() {
    let db = TestDb::new().await;
    let (service, _audit) = service(&db);
    let ids = permissions(&db, &["view_products", "view_orders"]).await;
    let role = RoleBuilder::new("pair")
        .with_permissions(&ids)
        .create(db.connection())
        .await;

    service
        .remove_permission("admin", role.id, ids[1])
        .await
        .unwrap();

    let role = service.get_role(role.id).await.unwrap();
    let held: Vec<&str> = role.permissions.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(held, vec!["view_products"]);
}

#[tokio::test]
async fn test_create_from_template_skips_missing_permissions() {
    let db = TestDb::new().await;
    let (service, audit) = service(&db);
    permissions(&db, &["view_users", "view_orders", "view_products"]).await;

    let outcome = service
        .create_from_template("admin", "customer-support", None)
        .await
        .unwrap();

    assert_eq!(outcome.role.name, "Customer Support");
    assert_eq!(outcome.role.role_type, RoleType::Admin);
    let mut held: Vec<&str> = outcome
        .role
        .permissions
        .iter()
        .map(|p| p.name.as_str())
        .collect();
    held.sort();
    assert_eq!(held, vec!["view_orders", "view_products", "view_users"]);
    assert_eq!(
        outcome.skipped_permissions,
        vec!["manage_tickets".to_string(), "view_reviews".to_string()]
    );
    assert_eq!(audit.len(), 1);

    // Same name again collides with the live role
    let err = service
        .create_from_template("admin", "customer-support", None)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "INVALID_REQUEST");

    let renamed = service
        .create_from_template("admin", "customer-support", Some("Support Tier 2"))
        .await
        .unwrap();
    assert_eq!(renamed.role.name, "Support Tier 2");
}

#[tokio::test]
async fn test_create_from_unknown_template() {
    let db = TestDb::new().await;
    let (service, _audit) = service(&db);

    let err = service
        .create_from_template("admin", "janitor", None)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthzError::TemplateNotFound(ref id) if id == "janitor"));
    assert!(service.list_roles(true).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_create_role_and_priority() {
    let db = TestDb::new().await;
    let (service, audit) = service(&db);

    let role = service
        .create_role(
            "admin",
            NewRole {
                name: "wholesaler".to_string(),
                description: None,
                role_type: RoleType::Business,
                priority: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(role.priority, 0);
    assert!(!role.is_system);

    let role = service
        .update_role_priority("admin", role.id, 42)
        .await
        .unwrap();
    assert_eq!(role.priority, 42);

    let err = service
        .create_role(
            "admin",
            NewRole {
                name: "wholesaler".to_string(),
                description: None,
                role_type: RoleType::Admin,
                priority: None,
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.code(), "INVALID_REQUEST");

    let actions: Vec<String> = audit.events().into_iter().map(|e| e.action).collect();
    assert_eq!(actions, vec!["role.create", "role.priority"]);
}

#[tokio::test]
async fn test_create_permission_enforces_naming() {
    let db = TestDb::new().await;
    let (service, _audit) = service(&db);

    let permission = service
        .create_permission("admin", "manage_coupons", None)
        .await
        .unwrap();
    assert_eq!(permission.name, "manage_coupons");

    for bad in ["Manage_Coupons", "coupons", "manage_", "_coupons"] {
        let err = service
            .create_permission("admin", bad, None)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_PERMISSION_NAME", "{bad}");
    }

    let err = service
        .create_permission("admin", "manage_coupons", None)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "INVALID_REQUEST");
}

#[tokio::test]
async fn test_assign_admin_role_checks_type() {
    let db = TestDb::new().await;
    let (service, _audit) = service(&db);
    let business = RoleBuilder::new("buyer").create(db.connection()).await;
    let admin = RoleBuilder::new("moderator").admin().create(db.connection()).await;
    UserBuilder::new("u1")
        .with_business_role(business.id)
        .create(db.connection())
        .await;

    let err = service
        .assign_admin_role("admin", "u1", Some(business.id))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "INVALID_REQUEST");

    let user = service
        .assign_admin_role("admin", "u1", Some(admin.id))
        .await
        .unwrap();
    assert_eq!(user.assigned_role_id, Some(admin.id));

    let user = service.assign_admin_role("admin", "u1", None).await.unwrap();
    assert_eq!(user.assigned_role_id, None);

    let err = service
        .assign_admin_role("admin", "nobody", Some(admin.id))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "NOT_FOUND");
}

#[tokio::test]
async fn test_users_with_role_pagination() {
    let db = TestDb::new().await;
    let (service, _audit) = service(&db);
    let role = RoleBuilder::new("buyer").create(db.connection()).await;
    for i in 0..5 {
        UserBuilder::new(&format!("u{i}"))
            .with_business_role(role.id)
            .create(db.connection())
            .await;
    }
    UserBuilder::new("other").create(db.connection()).await;

    let first = service.get_users_with_role(role.id, 1, 2).await.unwrap();
    assert_eq!(first.total, 5);
    assert_eq!(first.items.len(), 2);
    assert_eq!(first.items[0].username, "user-u0");

    let last = service.get_users_with_role(role.id, 3, 2).await.unwrap();
    assert_eq!(last.items.len(), 1);
    assert_eq!(last.items[0].username, "user-u4");

    let err = service.get_users_with_role(9999, 1, 10).await.unwrap_err();
    assert_eq!(err.code(), "NOT_FOUND");
}

#[tokio::test]
async fn test_detect_conflicts_by_ids() {
    let db = TestDb::new().await;
    let (service, _audit) = service(&db);
    let ids = permissions(&db, &["view_products", "manage_products"]).await;

    let conflicts = service.detect_permission_conflicts(&ids).await.unwrap();
    assert_eq!(conflicts.len(), 1);
    assert_eq!(conflicts[0].kind, ConflictKind::RedundantPermission);
    assert_eq!(conflicts[0].severity, Severity::Low);

    let err = service
        .detect_permission_conflicts(&[ids[0], 77])
        .await
        .unwrap_err();
    assert!(matches!(err, AuthzError::PermissionsNotFound(ref missing) if missing == &vec![77]));
}
