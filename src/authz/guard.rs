//! Per-request authorization pipeline.
//!
//! Steps run in order and stop at the first terminal outcome:
//!
//! 1. no principal id -> deny `UNAUTHENTICATED`
//! 2. principal not found -> deny `PRINCIPAL_NOT_FOUND`
//! 3. banned -> deny `ACCOUNT_BANNED`
//! 4. suspended -> warning only, continue
//! 5. normalize the resource path
//! 6. no route row -> allow (unmapped routes are public)
//! 7. route without required permission -> allow
//! 8. required permission held -> allow, otherwise deny `MISSING_PERMISSION`
//!
//! Every terminal outcome emits exactly one audit event. Store failures are
//! returned to the caller and are not audited.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::{json, Map, Value};

use crate::authz::errors::AuthzError;
use crate::authz::path::{normalize_method, normalize_path};
use crate::authz::resolver;
use crate::authz::store::{AuditSink, PrincipalStore, RouteTable};
use crate::authz::types::{AuditEvent, AuthzRequest, Decision, ReasonCode};

pub const DEFAULT_SLOW_CHECK_THRESHOLD: Duration = Duration::from_millis(500);

#[derive(Clone)]
pub struct AuthorizationGuard {
    principals: Arc<dyn PrincipalStore>,
    routes: Arc<dyn RouteTable>,
    audit: Arc<dyn AuditSink>,
    slow_check_threshold: Duration,
}

/// Terminal result of the pipeline plus the audit-only detail.
struct Outcome {
    decision: Decision,
    required_permission: Option<String>,
    metadata: Map<String, Value>,
}

impl Outcome {
    fn new(decision: Decision, metadata: Map<String, Value>) -> Self {
        Self {
            decision,
            required_permission: None,
            metadata,
        }
    }
}

impl AuthorizationGuard {
    pub fn new(
        principals: Arc<dyn PrincipalStore>,
        routes: Arc<dyn RouteTable>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            principals,
            routes,
            audit,
            slow_check_threshold: DEFAULT_SLOW_CHECK_THRESHOLD,
        }
    }

    pub fn with_slow_check_threshold(mut self, threshold: Duration) -> Self {
        self.slow_check_threshold = threshold;
        self
    }

    /// Decide whether `request` may proceed.
    pub async fn authorize(&self, request: &AuthzRequest) -> Result<Decision, AuthzError> {
        let started = Instant::now();
        let path = normalize_path(&request.path, request.matched_route.as_deref());
        let method = normalize_method(&request.method);

        let outcome = match self.evaluate(request, &path, &method).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(
                    error = %e,
                    principal_id = request.principal_id.as_deref().unwrap_or("-"),
                    %path,
                    %method,
                    "Authorization check failed"
                );
                return Err(e);
            }
        };

        let latency = started.elapsed();
        if latency > self.slow_check_threshold {
            tracing::warn!(
                latency_ms = latency.as_millis() as u64,
                threshold_ms = self.slow_check_threshold.as_millis() as u64,
                %path,
                %method,
                "Slow authorization check"
            );
        }

        self.record(request, &path, &method, &outcome, latency);
        Ok(outcome.decision)
    }

    async fn evaluate(
        &self,
        request: &AuthzRequest,
        path: &str,
        method: &str,
    ) -> Result<Outcome, AuthzError> {
        let mut metadata = Map::new();
        metadata.insert("raw_path".into(), json!(request.path));

        let Some(principal_id) = request.principal_id.as_deref().filter(|id| !id.is_empty())
        else {
            return Ok(Outcome::new(
                Decision::deny(ReasonCode::Unauthenticated),
                metadata,
            ));
        };

        let Some(principal) = self.principals.fetch(principal_id).await? else {
            return Ok(Outcome::new(
                Decision::deny(ReasonCode::PrincipalNotFound),
                metadata,
            ));
        };

        if principal.is_banned {
            return Ok(Outcome::new(
                Decision::deny(ReasonCode::AccountBanned),
                metadata,
            ));
        }

        if principal.is_suspended {
            tracing::warn!(principal_id, %path, %method, "Suspended principal accessing resource");
            metadata.insert("suspended".into(), json!(true));
        }

        let Some(route) = self.routes.lookup(path, method).await? else {
            tracing::debug!(%path, %method, "No route entry; allowing");
            return Ok(Outcome::new(
                Decision::allow(ReasonCode::UnmappedRoute),
                metadata,
            ));
        };

        let Some(required) = route.required_permission else {
            return Ok(Outcome::new(
                Decision::allow(ReasonCode::PublicRoute),
                metadata,
            ));
        };

        let effective = resolver::effective_permissions(&principal);
        if effective.contains_id(required.id) {
            return Ok(Outcome {
                decision: Decision::allow(ReasonCode::PermissionGranted),
                required_permission: Some(required.name),
                metadata,
            });
        }

        metadata.insert("available_permissions".into(), json!(effective.names()));
        metadata.insert(
            "business_role".into(),
            json!(principal.business_role.as_ref().map(|r| &r.name)),
        );
        metadata.insert(
            "admin_role".into(),
            json!(principal.assigned_role.as_ref().map(|r| &r.name)),
        );
        Ok(Outcome {
            decision: Decision::Deny {
                reason: ReasonCode::MissingPermission,
                required_permission: Some(required.name.clone()),
            },
            required_permission: Some(required.name),
            metadata,
        })
    }

    fn record(
        &self,
        request: &AuthzRequest,
        path: &str,
        method: &str,
        outcome: &Outcome,
        latency: Duration,
    ) {
        let event = AuditEvent {
            action: "authorize".to_string(),
            principal_id: request.principal_id.clone(),
            decision: outcome.decision.verdict(),
            reason_code: outcome.decision.reason().as_str().to_string(),
            resource_path: Some(path.to_string()),
            resource_method: Some(method.to_string()),
            required_permission: outcome.required_permission.clone(),
            latency_ms: latency.as_millis() as u64,
            metadata: Value::Object(outcome.metadata.clone()),
        };
        if let Err(e) = self.audit.emit(event) {
            tracing::warn!(error = %e, %path, %method, "Dropped authorization audit event");
        }
    }
}
