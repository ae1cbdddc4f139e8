//! Append-only audit trail for task execution.
//!
//! Every sink is fire-and-forget: recording must never fail the
//! operation being audited, so write errors are logged and swallowed.

use std::collections::VecDeque;
use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::clog_warn;
use crate::error::Result;

/// A single audit trail entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub timestamp: DateTime<Utc>,
    pub task_id: String,
    #[serde(rename = "event_type")]
    pub event: String,
    pub data: serde_json::Value,
}

/// Records audit events for a task.
pub trait AuditSink: Send + Sync {
    /// Record one event. Must not fail; sinks swallow their own errors.
    fn record(&self, task_id: &str, event: &str, data: serde_json::Value);
}

/// Writes one JSONL file per task under a log directory.
pub struct JsonlAudit {
    log_dir: PathBuf,
}

impl JsonlAudit {
    /// Create a sink writing under `log_dir`, creating it if needed.
    pub fn new(log_dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&log_dir)?;
        Ok(Self { log_dir })
    }

    fn trail_path(&self, task_id: &str) -> PathBuf {
        self.log_dir.join(format!("{}.jsonl", task_id))
    }

    /// Read back the full audit trail for a task. Returns an empty list
    /// when no trail exists; malformed lines are skipped.
    pub fn read_trail(&self, task_id: &str) -> Result<Vec<AuditEvent>> {
        let path = self.trail_path(task_id);
        if !path.exists() {
            return Ok(Vec::new());
        }

        let file = std::fs::File::open(path)?;
        let mut events = Vec::new();
        for line in BufReader::new(file).lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(&line) {
                Ok(event) => events.push(event),
                Err(err) => clog_warn!("Skipping malformed audit line for {}: {}", task_id, err),
            }
        }
        Ok(events)
    }

    fn append(&self, event: &AuditEvent) -> Result<()> {
        let line = serde_json::to_string(event)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.trail_path(&event.task_id))?;
        writeln!(file, "{}", line)?;
        Ok(())
    }
}

impl AuditSink for JsonlAudit {
    fn record(&self, task_id: &str, event: &str, data: serde_json::Value) {
        let event = AuditEvent {
            timestamp: Utc::now(),
            task_id: task_id.to_string(),
            event: event.to_string(),
            data,
        };
        if let Err(err) = self.append(&event) {
            clog_warn!("Failed to record audit event for {}: {}", task_id, err);
        }
    }
}

/// Discards everything.
pub struct NullAudit;

impl AuditSink for NullAudit {
    fn record(&self, _task_id: &str, _event: &str, _data: serde_json::Value) {}
}

/// In-memory sink for tests.
pub struct MemoryAudit {
    events: Mutex<VecDeque<AuditEvent>>,
}

impl MemoryAudit {
    pub fn new() -> Self {
        Self {
            events: Mutex::new(VecDeque::new()),
        }
    }

    /// All recorded events in order.
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events
            .lock()
            .map(|events| events.iter().cloned().collect())
            .unwrap_or_default()
    }
}

impl Default for MemoryAudit {
    fn default() -> Self {
        Self::new()
    }
}

impl AuditSink for MemoryAudit {
    fn record(&self, task_id: &str, event: &str, data: serde_json::Value) {
        if let Ok(mut events) = self.events.lock() {
            events.push_back(AuditEvent {
                timestamp: Utc::now(),
                task_id: task_id.to_string(),
                event: event.to_string(),
                data,
            });
        }
    }
}
