/// Append-only audit trail for recovery attempts.
///
/// Exactly one event is recorded per request. A sink failure is returned to
/// the caller; the orchestrator treats it as fatal for the request.
pub mod sinks;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::error::AuditError;
use crate::outcome::ResultCode;

pub use sinks::{JsonLinesAuditSink, MemoryAuditSink, TracingAuditSink};

/// One audit record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub event_id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// `deviceId:userId` of the requester.
    pub subject_id: String,
    pub request_id: String,
    pub key_id: Option<String>,
    /// Agent that processed the request.
    pub agent_id: String,
    pub outcome: ResultCode,
    pub message: String,
}

impl AuditEvent {
    pub fn new(
        subject_id: impl Into<String>,
        request_id: impl Into<String>,
        key_id: Option<String>,
        agent_id: impl Into<String>,
        outcome: ResultCode,
        message: impl Into<String>,
    ) -> Self {
        Self {
            event_id: Uuid::now_v7(),
            timestamp: Utc::now(),
            subject_id: subject_id.into(),
            request_id: request_id.into(),
            key_id,
            agent_id: agent_id.into(),
            outcome,
            message: message.into(),
        }
    }
}

/// Durable destination for audit events. Implementations must accept
/// concurrent appends.
pub trait AuditSink: Send + Sync {
    fn append(&self, event: &AuditEvent) -> Result<(), AuditError>;
}

#[derive(Clone)]
pub struct AuditTrail {
    sink: Arc<dyn AuditSink>,
}

impl AuditTrail {
    pub fn new(sink: Arc<dyn AuditSink>) -> Self {
        Self { sink }
    }

    pub fn record(&self, event: AuditEvent) -> Result<(), AuditError> {
        self.sink.append(&event)?;
        debug!(
            event_id = %event.event_id,
            request_id = %event.request_id,
            outcome = ?event.outcome,
            "Audit event recorded"
        );
        Ok(())
    }
}
