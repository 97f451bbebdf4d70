//! # Audit Sink
//!
//! Cancel and refund are money-relevant reversals; each successful one is
//! recorded as an [`AuditEvent`] after its transaction commits.
//!
//! The default [`TracingAuditSink`] writes events on the `audit` target so
//! they can be routed separately from operational logs.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    CancelSale,
    RefundSale,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::CancelSale => "CANCEL_SALE",
            AuditAction::RefundSale => "REFUND_SALE",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent {
    pub action: AuditAction,
    pub tenant_id: String,
    pub actor: String,
    pub sale_id: String,
    pub reason: String,
    pub at: DateTime<Utc>,
    /// Action-specific facts (leases released, tickets refunded, restocked SKUs).
    pub details: serde_json::Value,
}

/// Where audit events go.
pub trait AuditSink: Send + Sync {
    fn record(&self, event: &AuditEvent);
}

/// Logs events on the `audit` tracing target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, event: &AuditEvent) {
        info!(
            target: "audit",
            action = event.action.as_str(),
            tenant = %event.tenant_id,
            actor = %event.actor,
            sale_id = %event.sale_id,
            reason = %event.reason,
            at = %event.at,
            details = %event.details,
            "audit event"
        );
    }
}

/// Keeps events in memory; for tests and embedding callers that forward
/// them elsewhere.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).clone()
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, event: &AuditEvent) {
        let mut events = self.events.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        events.push(event.clone());
    }
}
