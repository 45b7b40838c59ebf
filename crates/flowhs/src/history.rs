//! Flow history trail.
//!
//! Phase actions and the reconciler produce [`HistoryEntry`] values without
//! touching any sink. The saga stamps them into [`HistoryRecord`]s through
//! its [`HistoryRecorder`], which keeps the trail of the running operation
//! and forwards every record to the configured [`HistorySink`].

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use flowhs_types::FlowId;
use log::warn;
use serde::{Deserialize, Serialize};

use crate::audit::{AuditCategory, AuditOutcome, AuditRecord};
use crate::audit_log;

/// Whether an entry reports progress or a problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryKind {
    Action,
    Error,
}

/// An unstamped history entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub kind: HistoryKind,
    pub title: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub details: String,
}

impl HistoryEntry {
    pub fn action(title: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            kind: HistoryKind::Action,
            title: title.into(),
            details: details.into(),
        }
    }

    pub fn error(title: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            kind: HistoryKind::Error,
            title: title.into(),
            details: details.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.kind == HistoryKind::Error
    }
}

impl fmt::Display for HistoryEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.details.is_empty() {
            write!(f, "{}", self.title)
        } else {
            write!(f, "{}: {}", self.title, self.details)
        }
    }
}

/// A history entry as persisted: owned by a flow and ordered by `sequence`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub flow_id: FlowId,
    /// Position in the operation's trail, starting at 0.
    pub sequence: u64,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub entry: HistoryEntry,
}

/// Append-only destination for history records.
pub trait HistorySink: Send + Sync {
    fn append(&self, record: HistoryRecord);
}

/// Keeps every record in memory, grouped by flow.
#[derive(Debug, Default)]
pub struct InMemoryHistorySink {
    records: Mutex<HashMap<FlowId, Vec<HistoryRecord>>>,
}

impl InMemoryHistorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the records of one flow in append order.
    pub fn entries_for(&self, flow_id: &FlowId) -> Vec<HistoryRecord> {
        match self.records.lock() {
            Ok(records) => records.get(flow_id).cloned().unwrap_or_default(),
            Err(poisoned) => poisoned
                .into_inner()
                .get(flow_id)
                .cloned()
                .unwrap_or_default(),
        }
    }

    /// Returns the number of records across all flows.
    pub fn len(&self) -> usize {
        match self.records.lock() {
            Ok(records) => records.values().map(Vec::len).sum(),
            Err(poisoned) => poisoned.into_inner().values().map(Vec::len).sum(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl HistorySink for InMemoryHistorySink {
    fn append(&self, record: HistoryRecord) {
        let mut records = match self.records.lock() {
            Ok(records) => records,
            Err(poisoned) => {
                warn!("History sink lock poisoned, recovering");
                poisoned.into_inner()
            }
        };
        records.entry(record.flow_id.clone()).or_default().push(record);
    }
}

/// Writes every record as an audit log line.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogHistorySink;

impl HistorySink for LogHistorySink {
    fn append(&self, record: HistoryRecord) {
        let outcome = match record.entry.kind {
            HistoryKind::Action => AuditOutcome::Success,
            HistoryKind::Error => AuditOutcome::Failure,
        };
        let mut audit = AuditRecord::new(AuditCategory::History, "FlowHistory", &record.entry.title)
            .with_outcome(outcome)
            .with_object_id(record.flow_id.as_str())
            .with_object_type("flow")
            .with_correlation_id(record.flow_id.as_str())
            .with_details(serde_json::json!({
                "sequence": record.sequence,
                "details": record.entry.details,
            }));
        if record.entry.is_error() {
            audit = audit.with_error(record.entry.details.clone());
        }
        audit_log!(audit);
    }
}

/// Stamps entries for one flow operation and forwards them to a sink.
pub struct HistoryRecorder {
    flow_id: FlowId,
    sink: Arc<dyn HistorySink>,
    trail: Vec<HistoryRecord>,
}

impl HistoryRecorder {
    pub fn new(flow_id: FlowId, sink: Arc<dyn HistorySink>) -> Self {
        Self {
            flow_id,
            sink,
            trail: Vec::new(),
        }
    }

    /// Appends one entry.
    pub fn record(&mut self, entry: HistoryEntry) {
        let record = HistoryRecord {
            flow_id: self.flow_id.clone(),
            sequence: self.trail.len() as u64,
            timestamp: Utc::now(),
            entry,
        };
        self.sink.append(record.clone());
        self.trail.push(record);
    }

    /// Appends entries in order.
    pub fn record_all(&mut self, entries: impl IntoIterator<Item = HistoryEntry>) {
        for entry in entries {
            self.record(entry);
        }
    }

    /// Returns the trail recorded so far.
    pub fn trail(&self) -> &[HistoryRecord] {
        &self.trail
    }

    /// Hands over the trail, leaving the recorder empty.
    pub fn take_trail(&mut self) -> Vec<HistoryRecord> {
        std::mem::take(&mut self.trail)
    }
}

impl fmt::Debug for HistoryRecorder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HistoryRecorder")
            .field("flow_id", &self.flow_id)
            .field("records", &self.trail.len())
            .finish()
    }
}
