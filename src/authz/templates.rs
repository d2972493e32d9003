use serde::Serialize;

use crate::authz::types::RoleType;

/// Named permission bundle that can be instantiated as a role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RoleTemplate {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub role_type: RoleType,
    pub priority: i64,
    pub permissions: &'static [&'static str],
}

pub const ROLE_TEMPLATES: &[RoleTemplate] = &[
    RoleTemplate {
        id: "customer-support",
        name: "Customer Support",
        description: "Handles tickets and reads customer, order and catalogue data",
        role_type: RoleType::Admin,
        priority: 10,
        permissions: &[
            "view_users",
            "view_orders",
            "manage_tickets",
            "view_products",
            "view_reviews",
        ],
    },
    RoleTemplate {
        id: "content-moderator",
        name: "Content Moderator",
        description: "Moderates reviews and product listings",
        role_type: RoleType::Admin,
        priority: 20,
        permissions: &[
            "view_products",
            "view_reviews",
            "manage_reviews",
            "delete_reviews",
            "view_users",
        ],
    },
    RoleTemplate {
        id: "catalog-manager",
        name: "Catalog Manager",
        description: "Maintains products, attributes and features",
        role_type: RoleType::Admin,
        priority: 30,
        permissions: &[
            "view_products",
            "manage_products",
            "view_attributes",
            "manage_attributes",
            "view_features",
            "manage_features",
        ],
    },
    RoleTemplate {
        id: "kyc-reviewer",
        name: "KYC Reviewer",
        description: "Reviews vendor verification submissions",
        role_type: RoleType::Admin,
        priority: 40,
        permissions: &["view_users", "view_kyc", "manage_kyc"],
    },
    RoleTemplate {
        id: "finance-analyst",
        name: "Finance Analyst",
        description: "Read-only access to orders, payouts and reports",
        role_type: RoleType::Admin,
        priority: 30,
        permissions: &["view_orders", "view_payouts", "view_reports"],
    },
];

pub fn find_template(id: &str) -> Option<&'static RoleTemplate> {
    ROLE_TEMPLATES.iter().find(|t| t.id == id)
}
