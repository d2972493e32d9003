mod helpers;

use std::sync::Arc;
use std::time::Duration;

use async_graphql::Request;
use helpers::db::seed_route;
use helpers::{PermissionBuilder, TestDb, UserBuilder};
use serde_json::json;
use tollgate::admin_graphql::{build_admin_schema, AdminSchema};
use tollgate::admin_mutations::{AdminActor, AdminContext};
use tollgate::authz::audit::MemoryAuditSink;
use tollgate::authz::route_cache::CachedRouteTable;
use tollgate::authz::store::RouteTable;
use tollgate::authz::RoleService;
use tollgate::seed;
use tollgate::storage::SeaRouteTable;

struct Admin {
    schema: AdminSchema,
    audit: MemoryAuditSink,
    cache: Arc<CachedRouteTable>,
}

fn admin(db: &TestDb) -> Admin {
    let audit = MemoryAuditSink::new();
    let cache = Arc::new(CachedRouteTable::new(
        Arc::new(SeaRouteTable::new(db.connection().clone())),
        Duration::from_secs(300),
    ));
    let schema = build_admin_schema(
        db.connection().clone(),
        RoleService::new(db.connection().clone(), Arc::new(audit.clone())),
        AdminContext {
            retention_days: 30,
            route_cache: Some(cache.clone()),
        },
    );
    Admin {
        schema,
        audit,
        cache,
    }
}

async fn run(schema: &AdminSchema, query: &str) -> serde_json::Value {
    let response = schema
        .execute(Request::new(query).data(AdminActor("ops@example.com".to_string())))
        .await;
    assert!(response.errors.is_empty(), "{:?}", response.errors);
    response.data.into_json().unwrap()
}

#[tokio::test]
async fn test_seeded_roles_are_listed() {
    let db = TestDb::new().await;
    seed::ensure_system_roles(db.connection()).await.unwrap();
    // Seeding twice is a no-op
    seed::ensure_system_roles(db.connection()).await.unwrap();
    let admin = admin(&db);

    let data = run(&admin.schema, "{ roles { name roleType isSystem isDefault } }").await;
    let roles = data["roles"].as_array().unwrap();
    assert_eq!(roles.len(), 3);
    let buyer = roles.iter().find(|r| r["name"] == "buyer").unwrap();
    assert_eq!(buyer["isDefault"], json!(true));
    assert_eq!(buyer["roleType"], json!("business"));
}

#[tokio::test]
async fn test_template_and_bulk_assign_mutations() {
    let db = TestDb::new().await;
    let conn = db.connection();
    PermissionBuilder::new("view_orders").create(conn).await;
    let delete = PermissionBuilder::new("delete_orders").create(conn).await;
    let admin = admin(&db);

    let data = run(
        &admin.schema,
        r#"mutation { createRoleFromTemplate(templateId: "finance-analyst") {
            role { id name permissions { name } }
            skippedPermissions
        } }"#,
    )
    .await;
    let created = &data["createRoleFromTemplate"];
    assert_eq!(created["role"]["name"], json!("Finance Analyst"));
    assert_eq!(
        created["skippedPermissions"],
        json!(["view_payouts", "view_reports"])
    );
    let role_id = created["role"]["id"].as_i64().unwrap();

    let data = run(
        &admin.schema,
        &format!(
            "mutation {{ bulkAssignPermissions(roleId: {role_id}, permissionIds: [{}]) {{
                role {{ permissions {{ id }} }}
                conflicts {{ kind severity permission }}
            }} }}",
            delete.id
        ),
    )
    .await;
    let conflicts = data["bulkAssignPermissions"]["conflicts"].as_array().unwrap();
    assert_eq!(conflicts.len(), 1);
    assert_eq!(conflicts[0]["kind"], json!("MISSING_DEPENDENCY"));
    assert_eq!(conflicts[0]["severity"], json!("MEDIUM"));

    let events = admin.audit.events();
    assert_eq!(events.len(), 2);
    assert!(events
        .iter()
        .all(|e| e.principal_id.as_deref() == Some("ops@example.com")));
}

#[tokio::test]
async fn test_errors_carry_codes() {
    let db = TestDb::new().await;
    let admin = admin(&db);

    let response = admin
        .schema
        .execute(r#"mutation { createRoleFromTemplate(templateId: "nope") { role { id } } }"#)
        .await;
    assert_eq!(response.errors.len(), 1);
    let extensions = response.errors[0].extensions.as_ref().unwrap();
    assert_eq!(
        extensions.get("code"),
        Some(&async_graphql::Value::from("TEMPLATE_NOT_FOUND"))
    );
}

#[tokio::test]
async fn test_route_mutations_invalidate_cache() {
    let db = TestDb::new().await;
    let conn = db.connection();
    PermissionBuilder::new("view_products").create(conn).await;
    seed_route(conn, "GET", "/api/products", None).await;
    let admin = admin(&db);

    let cached = admin.cache.lookup("/api/products", "GET").await.unwrap().unwrap();
    assert!(cached.required_permission.is_none());
    assert_eq!(admin.cache.len(), 1);

    run(
        &admin.schema,
        r#"mutation { upsertRoute(path: "/api/products", method: "get", requiredPermission: "view_products") { path method } }"#,
    )
    .await;
    assert!(admin.cache.is_empty());

    let fresh = admin.cache.lookup("/api/products", "GET").await.unwrap().unwrap();
    assert_eq!(
        fresh.required_permission.map(|p| p.name).as_deref(),
        Some("view_products")
    );

    let data = run(
        &admin.schema,
        r#"mutation { deleteRoute(path: "/api/products", method: "GET") }"#,
    )
    .await;
    assert_eq!(data["deleteRoute"], json!(true));
    assert!(admin.cache.is_empty());
}

#[tokio::test]
async fn test_effective_permissions_and_user_queries() {
    let db = TestDb::new().await;
    seed::ensure_system_roles(db.connection()).await.unwrap();
    let admin = admin(&db);

    run(
        &admin.schema,
        r#"mutation { registerUser(id: "u-1", username: "alice") { id businessRoleId } }"#,
    )
    .await;
    UserBuilder::new("u-2").create(db.connection()).await;

    let data = run(
        &admin.schema,
        r#"{ effectivePermissions(userId: "u-1") { allUnique { name } adminPermissions { name } } }"#,
    )
    .await;
    let names: Vec<&str> = data["effectivePermissions"]["allUnique"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["view_orders", "view_products", "view_reviews"]);
    assert_eq!(
        data["effectivePermissions"]["adminPermissions"],
        json!([])
    );

    let data = run(&admin.schema, r#"{ user(id: "u-2") { username businessRoleId } }"#).await;
    assert_eq!(data["user"]["businessRoleId"], json!(null));
}

#[tokio::test]
async fn test_trigger_job_and_logs() {
    let db = TestDb::new().await;
    let admin = admin(&db);

    let data = run(
        &admin.schema,
        r#"mutation { triggerJob(jobName: "cleanup_expired_audit_events") { success recordsProcessed } }"#,
    )
    .await;
    assert_eq!(data["triggerJob"]["success"], json!(true));
    assert_eq!(data["triggerJob"]["recordsProcessed"], json!(0));

    let data = run(&admin.schema, "{ jobLogs { jobName success } }").await;
    assert_eq!(
        data["jobLogs"],
        json!([{ "jobName": "cleanup_expired_audit_events", "success": 1 }])
    );

    let data = run(
        &admin.schema,
        r#"mutation { triggerJob(jobName: "rotate_keys") { success } }"#,
    )
    .await;
    assert_eq!(data["triggerJob"]["success"], json!(false));
}
