//! engine::audit
//!
//! Audit trail of what a replacement job changed or could not change.
//!
//! # Event Categories
//!
//! - `GroupCommitted`: one language/version of a clone node was committed
//! - `RewriteUnresolved`: a reference had no counterpart in the clone
//! - `JobCompleted`: a job run finished
//! - `JobFailed`: a job run aborted
//!
//! Every event names the store, so records from several stores can share
//! one sink.
//!
//! # Sinks
//!
//! - [`TracingAudit`]: emits on the `relink::audit` tracing target
//! - [`MemoryAudit`]: collects events in memory
//! - [`JsonlAudit`]: appends one JSON object per line to a file

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};

use super::JobReport;
use crate::core::types::{Fingerprint, Language, NodeId, NodePath, UtcTimestamp, Version};

/// An audit record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditEvent {
    /// Edits to one language/version of a node were committed.
    GroupCommitted {
        store: String,
        node: NodeId,
        path: NodePath,
        language: Language,
        version: Version,
        /// Number of references pointed at their clone counterpart.
        rewritten: usize,
        /// Hash of the committed field content.
        fingerprint: Fingerprint,
        timestamp: UtcTimestamp,
    },

    /// A reference target had no counterpart in the clone.
    RewriteUnresolved {
        store: String,
        source_path: NodePath,
        /// Where the counterpart was expected under the copy root.
        expected_path: String,
        target: NodeId,
        timestamp: UtcTimestamp,
    },

    /// A job run finished.
    JobCompleted {
        job: String,
        store: String,
        report: JobReport,
        timestamp: UtcTimestamp,
    },

    /// A job run aborted.
    JobFailed {
        job: String,
        store: String,
        reason: String,
        timestamp: UtcTimestamp,
    },
}

impl AuditEvent {
    /// Create a GroupCommitted event.
    pub fn group_committed(
        store: impl Into<String>,
        node: NodeId,
        path: NodePath,
        language: Language,
        version: Version,
        rewritten: usize,
        fingerprint: Fingerprint,
    ) -> Self {
        AuditEvent::GroupCommitted {
            store: store.into(),
            node,
            path,
            language,
            version,
            rewritten,
            fingerprint,
            timestamp: UtcTimestamp::now(),
        }
    }

    /// Create a RewriteUnresolved event.
    pub fn rewrite_unresolved(
        store: impl Into<String>,
        source_path: NodePath,
        expected_path: impl Into<String>,
        target: NodeId,
    ) -> Self {
        AuditEvent::RewriteUnresolved {
            store: store.into(),
            source_path,
            expected_path: expected_path.into(),
            target,
            timestamp: UtcTimestamp::now(),
        }
    }

    /// Create a JobCompleted event.
    pub fn job_completed(job: impl Into<String>, store: impl Into<String>, report: JobReport) -> Self {
        AuditEvent::JobCompleted {
            job: job.into(),
            store: store.into(),
            report,
            timestamp: UtcTimestamp::now(),
        }
    }

    /// Create a JobFailed event.
    pub fn job_failed(
        job: impl Into<String>,
        store: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        AuditEvent::JobFailed {
            job: job.into(),
            store: store.into(),
            reason: reason.into(),
            timestamp: UtcTimestamp::now(),
        }
    }

    /// Get the event type name.
    pub fn event_type(&self) -> &'static str {
        match self {
            AuditEvent::GroupCommitted { .. } => "group_committed",
            AuditEvent::RewriteUnresolved { .. } => "rewrite_unresolved",
            AuditEvent::JobCompleted { .. } => "job_completed",
            AuditEvent::JobFailed { .. } => "job_failed",
        }
    }
}

/// Receives audit records.
pub trait AuditSink: Send + Sync {
    fn record(&self, event: AuditEvent);
}

/// Emits audit records as tracing events.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAudit;

impl AuditSink for TracingAudit {
    fn record(&self, event: AuditEvent) {
        match &event {
            AuditEvent::GroupCommitted {
                store,
                path,
                language,
                version,
                rewritten,
                ..
            } => tracing::info!(
                target: "relink::audit",
                store = %store,
                node = %path,
                language = %language,
                version = %version,
                rewritten,
                "relinked references"
            ),
            AuditEvent::RewriteUnresolved {
                store,
                source_path,
                expected_path,
                ..
            } => tracing::info!(
                target: "relink::audit",
                store = %store,
                source = %source_path,
                expected = %expected_path,
                "reference left unresolved"
            ),
            AuditEvent::JobCompleted { job, store, report, .. } => tracing::info!(
                target: "relink::audit",
                job = %job,
                store = %store,
                nodes = report.nodes_visited,
                groups = report.groups_committed,
                rewritten = report.rewritten,
                unresolved = report.unresolved,
                "job completed"
            ),
            AuditEvent::JobFailed {
                job, store, reason, ..
            } => tracing::info!(
                target: "relink::audit",
                job = %job,
                store = %store,
                reason = %reason,
                "job failed"
            ),
        }
    }
}

/// Collects audit records in memory.
///
/// Clones share the same buffer.
#[derive(Debug, Clone, Default)]
pub struct MemoryAudit {
    events: Arc<Mutex<Vec<AuditEvent>>>,
}

impl MemoryAudit {
    pub fn new() -> Self {
        Self::default()
    }

    /// All events recorded so far.
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Events of one type.
    pub fn events_of(&self, event_type: &str) -> Vec<AuditEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.event_type() == event_type)
            .collect()
    }
}

impl AuditSink for MemoryAudit {
    fn record(&self, event: AuditEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}

/// Appends audit records to a JSON-lines file.
#[derive(Debug)]
pub struct JsonlAudit {
    file: Mutex<File>,
}

impl JsonlAudit {
    /// Open `path` for appending, creating it if needed.
    pub fn open(path: &Path) -> std::io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }
}

impl AuditSink for JsonlAudit {
    fn record(&self, event: AuditEvent) {
        let line = match serde_json::to_string(&event) {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!("failed to serialize audit event: {}", e);
                return;
            }
        };
        let mut file = self.file.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(e) = writeln!(file, "{line}") {
            tracing::warn!("failed to append audit event: {}", e);
        }
    }
}

/// Forwards every record to several sinks.
pub struct FanoutAudit {
    sinks: Vec<Arc<dyn AuditSink>>,
}

impl FanoutAudit {
    pub fn new(sinks: Vec<Arc<dyn AuditSink>>) -> Self {
        Self { sinks }
    }
}

impl AuditSink for FanoutAudit {
    fn record(&self, event: AuditEvent) {
        for sink in &self.sinks {
            sink.record(event.clone());
        }
    }
}
