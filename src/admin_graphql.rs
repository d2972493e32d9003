use async_graphql::EmptySubscription;
use async_graphql_axum::{GraphQLRequest, GraphQLResponse};
use axum::{
    extract::State,
    http::HeaderMap,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::admin_mutations::{AdminActor, AdminContext, AdminMutation, AdminQuery};
use crate::authz::management::RoleService;

pub type AdminSchema = async_graphql::Schema<AdminQuery, AdminMutation, EmptySubscription>;

/// Header naming the acting administrator on admin requests
pub const ADMIN_ACTOR_HEADER: &str = "x-admin-actor";

/// Build the admin GraphQL schema over the role service and job runner
pub fn build_admin_schema(
    db: DatabaseConnection,
    roles: RoleService,
    context: AdminContext,
) -> AdminSchema {
    async_graphql::Schema::build(AdminQuery, AdminMutation, EmptySubscription)
        .data(Arc::new(db))
        .data(roles)
        .data(context)
        .finish()
}

#[derive(Clone)]
pub struct AdminState {
    pub schema: AdminSchema,
}

/// Admin GraphQL POST handler
async fn graphql_handler(
    State(state): State<Arc<AdminState>>,
    headers: HeaderMap,
    req: GraphQLRequest,
) -> GraphQLResponse {
    let mut req = req.into_inner();
    if let Some(actor) = headers
        .get(ADMIN_ACTOR_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.trim().is_empty())
    {
        req = req.data(AdminActor(actor.trim().to_string()));
    }
    state.schema.execute(req).await.into()
}

/// GraphQL playground (GraphiQL) handler
async fn playground() -> impl IntoResponse {
    axum::response::Html(
        async_graphql::http::GraphiQLSource::build()
            .endpoint("/admin/graphql")
            .finish(),
    )
}

/// Create the admin API router
pub fn router(schema: AdminSchema) -> Router {
    let state = Arc::new(AdminState { schema });

    Router::new()
        .route("/admin/graphql", post(graphql_handler))
        .route("/admin/playground", get(playground))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
