use chrono::Utc;
use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait, Set};
use tollgate::authz::types::RoleType;
use tollgate::entities;
use tollgate::storage::{self, UserSummary};

/// Builder for creating test permissions
pub struct PermissionBuilder {
    name: String,
    description: Option<String>,
}

impl PermissionBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            description: None,
        }
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }

    pub async fn create(self, db: &DatabaseConnection) -> entities::permission::Model {
        entities::permission::ActiveModel {
            name: Set(self.name),
            description: Set(self.description),
            created_at: Set(Utc::now().timestamp()),
            ..Default::default()
        }
        .insert(db)
        .await
        .expect("Failed to create test permission")
    }
}

/// Builder for creating test roles. Writes rows directly so system roles
/// can be set up the way seeding creates them.
pub struct RoleBuilder {
    name: String,
    role_type: RoleType,
    priority: i64,
    is_default: bool,
    is_system: bool,
    permission_ids: Vec<i64>,
}

impl RoleBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            role_type: RoleType::Business,
            priority: 0,
            is_default: false,
            is_system: false,
            permission_ids: Vec::new(),
        }
    }

    pub fn admin(mut self) -> Self {
        self.role_type = RoleType::Admin;
        self
    }

    pub fn system(mut self) -> Self {
        self.is_system = true;
        self.priority = self.priority.max(100);
        self
    }

    pub fn default_role(mut self) -> Self {
        self.is_default = true;
        self
    }

    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_permissions(mut self, ids: &[i64]) -> Self {
        self.permission_ids.extend_from_slice(ids);
        self
    }

    pub async fn create(self, db: &DatabaseConnection) -> entities::role::Model {
        let now = Utc::now().timestamp();
        let role = entities::role::ActiveModel {
            name: Set(self.name),
            description: Set(None),
            role_type: Set(self.role_type.as_str().to_string()),
            priority: Set(self.priority),
            is_default: Set(i64::from(self.is_default)),
            is_system: Set(i64::from(self.is_system)),
            created_at: Set(now),
            updated_at: Set(now),
            deleted_at: Set(None),
            ..Default::default()
        }
        .insert(db)
        .await
        .expect("Failed to create test role");

        if !self.permission_ids.is_empty() {
            let links = self
                .permission_ids
                .iter()
                .map(|&permission_id| entities::role_permission::ActiveModel {
                    role_id: Set(role.id),
                    permission_id: Set(permission_id),
                    created_at: Set(now),
                });
            entities::RolePermission::insert_many(links)
                .exec(db)
                .await
                .expect("Failed to link test role permissions");
        }

        role
    }
}

/// Builder for creating test principals
pub struct UserBuilder {
    id: String,
    username: String,
    business_role_id: Option<i64>,
    assigned_role_id: Option<i64>,
    banned: bool,
    suspended: bool,
}

impl UserBuilder {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            username: format!("user-{id}"),
            business_role_id: None,
            assigned_role_id: None,
            banned: false,
            suspended: false,
        }
    }

    pub fn with_business_role(mut self, role_id: i64) -> Self {
        self.business_role_id = Some(role_id);
        self
    }

    pub fn with_admin_role(mut self, role_id: i64) -> Self {
        self.assigned_role_id = Some(role_id);
        self
    }

    pub fn banned(mut self) -> Self {
        self.banned = true;
        self
    }

    pub fn suspended(mut self) -> Self {
        self.suspended = true;
        self
    }

    pub async fn create(self, db: &DatabaseConnection) -> UserSummary {
        let user = storage::create_user(db, &self.id, &self.username, self.business_role_id)
            .await
            .expect("Failed to create test user");

        if let Some(role_id) = self.assigned_role_id {
            entities::user::ActiveModel {
                id: Set(user.id.clone()),
                assigned_role_id: Set(Some(role_id)),
                ..Default::default()
            }
            .update(db)
            .await
            .expect("Failed to assign test admin role");
        }

        if self.banned || self.suspended {
            storage::set_user_status(db, &user.id, Some(self.banned), Some(self.suspended))
                .await
                .expect("Failed to update user flags");
        }

        storage::get_user(db, &user.id)
            .await
            .expect("Failed to get created user")
            .expect("User not found")
    }
}
