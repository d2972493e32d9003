//! Collaborators the guard depends on.

use async_trait::async_trait;
use thiserror::Error;

use crate::authz::errors::AuthzError;
use crate::authz::types::{AuditEvent, Principal, Route};

/// Loads principals with both role graphs populated.
#[async_trait]
pub trait PrincipalStore: Send + Sync {
    /// `Ok(None)` means the principal does not exist; storage failures are `Err`.
    async fn fetch(&self, id: &str) -> Result<Option<Principal>, AuthzError>;
}

/// Route authorization table keyed by (normalized path, method).
#[async_trait]
pub trait RouteTable: Send + Sync {
    async fn lookup(&self, path: &str, method: &str) -> Result<Option<Route>, AuthzError>;
}

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("audit channel is full")]
    Full,
    #[error("audit sink is closed")]
    Closed,
}

/// Security audit sink. `emit` must return promptly; any I/O happens elsewhere.
pub trait AuditSink: Send + Sync {
    fn emit(&self, event: AuditEvent) -> Result<(), AuditError>;

    /// Short label used when reporting emission failures.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}
