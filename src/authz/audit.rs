//! Audit sinks. Emission never blocks the caller: sinks either log inline or
//! hand the event to a bounded channel drained by a background task.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use sea_orm::{ActiveModelTrait, DatabaseConnection, Set};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::authz::store::{AuditError, AuditSink};
use crate::authz::types::AuditEvent;
use crate::entities;

/// Writes each event as a structured log line.
#[derive(Debug, Default, Clone)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn emit(&self, event: AuditEvent) -> Result<(), AuditError> {
        tracing::info!(
            target: "tollgate::audit",
            action = %event.action,
            principal_id = event.principal_id.as_deref().unwrap_or("-"),
            decision = event.decision.as_str(),
            reason = %event.reason_code,
            path = event.resource_path.as_deref().unwrap_or("-"),
            method = event.resource_method.as_deref().unwrap_or("-"),
            required_permission = event.required_permission.as_deref().unwrap_or("-"),
            latency_ms = event.latency_ms,
            metadata = %event.metadata,
            "audit"
        );
        Ok(())
    }

    fn name(&self) -> &'static str {
        "tracing"
    }
}

/// Persists events into `audit_events` from a background task.
pub struct DatabaseAuditSink {
    tx: mpsc::Sender<AuditEvent>,
}

impl DatabaseAuditSink {
    /// Spawn the writer task. Must be called inside a Tokio runtime.
    pub fn spawn(db: DatabaseConnection, capacity: usize) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<AuditEvent>(capacity.max(1));
        let handle = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                if let Err(e) = insert_audit_event(&db, &event).await {
                    tracing::warn!(error = %e, action = %event.action, "Failed to persist audit event");
                }
            }
            tracing::debug!("Audit writer stopped");
        });
        (Self { tx }, handle)
    }
}

impl AuditSink for DatabaseAuditSink {
    fn emit(&self, event: AuditEvent) -> Result<(), AuditError> {
        self.tx.try_send(event).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => AuditError::Full,
            mpsc::error::TrySendError::Closed(_) => AuditError::Closed,
        })
    }

    fn name(&self) -> &'static str {
        "database"
    }
}

pub async fn insert_audit_event(
    db: &DatabaseConnection,
    event: &AuditEvent,
) -> Result<(), sea_orm::DbErr> {
    let row = entities::audit_event::ActiveModel {
        action: Set(event.action.clone()),
        principal_id: Set(event.principal_id.clone()),
        decision: Set(event.decision.as_str().to_string()),
        reason_code: Set(event.reason_code.clone()),
        resource_path: Set(event.resource_path.clone()),
        resource_method: Set(event.resource_method.clone()),
        required_permission: Set(event.required_permission.clone()),
        latency_ms: Set(event.latency_ms as i64),
        metadata: Set(event.metadata.to_string()),
        created_at: Set(Utc::now().timestamp()),
        ..Default::default()
    };
    row.insert(db).await?;
    Ok(())
}

/// Fans each event out to several sinks; succeeds if any sink accepted it.
/// Every per-sink failure is logged and counted, even when another sink
/// accepted the event.
pub struct FanoutAuditSink {
    sinks: Vec<Arc<dyn AuditSink>>,
    failures: AtomicU64,
}

impl FanoutAuditSink {
    pub fn new(sinks: Vec<Arc<dyn AuditSink>>) -> Self {
        Self {
            sinks,
            failures: AtomicU64::new(0),
        }
    }

    /// Number of per-sink emissions that failed since construction.
    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }
}

impl AuditSink for FanoutAuditSink {
    fn emit(&self, event: AuditEvent) -> Result<(), AuditError> {
        let mut last_err = None;
        let mut accepted = false;
        for sink in &self.sinks {
            match sink.emit(event.clone()) {
                Ok(()) => accepted = true,
                Err(e) => {
                    self.failures.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(
                        sink = sink.name(),
                        error = %e,
                        action = %event.action,
                        "Audit sink dropped event"
                    );
                    last_err = Some(e);
                }
            }
        }
        match last_err {
            Some(e) if !accepted => Err(e),
            _ => Ok(()),
        }
    }
}

/// Keeps events in memory; handy for embedding and tests.
#[derive(Debug, Default, Clone)]
pub struct MemoryAuditSink {
    events: Arc<Mutex<Vec<AuditEvent>>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.events.lock().map(|events| events.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AuditSink for MemoryAuditSink {
    fn emit(&self, event: AuditEvent) -> Result<(), AuditError> {
        self.events
            .lock()
            .map_err(|_| AuditError::Closed)?
            .push(event);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
