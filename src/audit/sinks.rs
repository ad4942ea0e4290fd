/// Audit sink implementations.
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tracing::info;

use super::{AuditEvent, AuditSink};
use crate::error::AuditError;

/// Keeps events in memory. Can be switched into a failing mode to simulate
/// an unavailable audit store.
#[derive(Default)]
pub struct MemoryAuditSink {
    events: Mutex<Vec<AuditEvent>>,
    failing: AtomicBool,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

impl AuditSink for MemoryAuditSink {
    fn append(&self, event: &AuditEvent) -> Result<(), AuditError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(AuditError::Rejected("audit store unavailable".into()));
        }
        self.events.lock().push(event.clone());
        Ok(())
    }
}

/// Appends one JSON object per line, synced to disk before `append` returns.
pub struct JsonLinesAuditSink {
    path: PathBuf,
    file: Mutex<File>,
}

impl JsonLinesAuditSink {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, AuditError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AuditSink for JsonLinesAuditSink {
    fn append(&self, event: &AuditEvent) -> Result<(), AuditError> {
        let mut line = serde_json::to_vec(event)?;
        line.push(b'\n');

        let mut file = self.file.lock();
        file.write_all(&line)?;
        file.flush()?;
        file.sync_data()?;
        Ok(())
    }
}

/// Emits each event as a structured log line on the `audit` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn append(&self, event: &AuditEvent) -> Result<(), AuditError> {
        info!(
            target: "audit",
            event_id = %event.event_id,
            timestamp = %event.timestamp.to_rfc3339(),
            subject_id = %event.subject_id,
            request_id = %event.request_id,
            key_id = event.key_id.as_deref().unwrap_or("-"),
            agent_id = %event.agent_id,
            outcome = ?event.outcome,
            result_code = event.outcome.value(),
            "{}",
            event.message
        );
        Ok(())
    }
}
