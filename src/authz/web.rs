use std::sync::Arc;

use axum::extract::{MatchedPath, Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;

use crate::authz::guard::AuthorizationGuard;
use crate::authz::types::{AuthzRequest, Decision};

pub const DEFAULT_PRINCIPAL_HEADER: &str = "x-principal-id";

#[derive(Clone)]
pub struct AuthzHttpState {
    pub guard: Arc<AuthorizationGuard>,
    /// Header carrying the already-verified principal id.
    pub principal_header: Arc<str>,
}

impl AuthzHttpState {
    pub fn new(guard: Arc<AuthorizationGuard>) -> Self {
        Self {
            guard,
            principal_header: Arc::from(DEFAULT_PRINCIPAL_HEADER),
        }
    }

    pub fn with_principal_header(mut self, header: &str) -> Self {
        self.principal_header = Arc::from(header.to_ascii_lowercase());
        self
    }
}

#[derive(Debug, Serialize)]
pub struct CheckResponse {
    pub allowed: bool,
    #[serde(flatten)]
    pub decision: Decision,
}

pub fn router(state: AuthzHttpState) -> Router {
    Router::new()
        .route("/v1/check", post(handle_check))
        .route("/healthz", get(health))
        .with_state(state)
}

/// Run the guard on its own task so a disconnecting caller cannot cancel the
/// check halfway and lose the audit event.
async fn run_detached(guard: Arc<AuthorizationGuard>, request: AuthzRequest) -> Response {
    match tokio::spawn(async move { guard.authorize(&request).await }).await {
        Ok(Ok(decision)) => Json(CheckResponse {
            allowed: decision.is_allowed(),
            decision,
        })
        .into_response(),
        Ok(Err(e)) => e.into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Authorization task failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn handle_check(
    State(state): State<AuthzHttpState>,
    Json(req): Json<AuthzRequest>,
) -> impl IntoResponse {
    run_detached(state.guard, req).await
}

async fn health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

/// Middleware guarding the routes it wraps. Use with
/// `axum::middleware::from_fn_with_state`; the matched route template is
/// forwarded so the guard does not need to guess placeholders.
pub async fn require_authorization(
    State(state): State<AuthzHttpState>,
    request: Request,
    next: Next,
) -> Response {
    let principal_id = request
        .headers()
        .get(state.principal_header.as_ref())
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let path = request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or_else(|| request.uri().path())
        .to_string();
    let authz_request = AuthzRequest {
        principal_id,
        path,
        method: request.method().as_str().to_string(),
        matched_route: request
            .extensions()
            .get::<MatchedPath>()
            .map(|m| m.as_str().to_string()),
    };

    let guard = state.guard.clone();
    match tokio::spawn(async move { guard.authorize(&authz_request).await }).await {
        Ok(Ok(decision)) => match decision.into_result() {
            Ok(()) => next.run(request).await,
            Err(denied) => denied.into_response(),
        },
        Ok(Err(e)) => e.into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Authorization task failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
