//! Append-only record of what each apply step did to the destination.
//!
//! One JSON object per line. Events are flushed as they happen, so a step
//! that fails halfway still leaves a record of every item it created.

use crate::error::{Result, ResultExt};
use crate::model::EntityKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Created,
    Skipped,
    Closed,
    MilestoneUnresolved,
    NoteAppended,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub timestamp: DateTime<Utc>,
    pub step: String,
    pub kind: EntityKind,
    pub action: AuditAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iid: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Audit trail for one invocation.
///
/// Every event is also kept in memory for the step summaries.
#[derive(Debug)]
pub struct AuditLog {
    path: Option<PathBuf>,
    file: Option<File>,
    step: String,
    events: Vec<AuditEvent>,
}

impl AuditLog {
    /// Open `path` for appending, creating it if needed.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating audit directory {}", parent.display()))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("opening audit log {}", path.display()))?;
        Ok(Self {
            path: Some(path.to_path_buf()),
            file: Some(file),
            step: String::new(),
            events: Vec::new(),
        })
    }

    /// An audit log that is never written to disk.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            path: None,
            file: None,
            step: String::new(),
            events: Vec::new(),
        }
    }

    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Step name attached to subsequent events.
    pub fn set_step(&mut self, step: &str) {
        step.clone_into(&mut self.step);
    }

    pub fn record(
        &mut self,
        kind: EntityKind,
        action: AuditAction,
        iid: Option<u64>,
        id: Option<u64>,
        detail: Option<String>,
    ) -> Result<()> {
        let event = AuditEvent {
            timestamp: Utc::now(),
            step: self.step.clone(),
            kind,
            action,
            iid,
            id,
            detail,
        };
        if let Some(file) = self.file.as_mut() {
            let line = serde_json::to_string(&event)?;
            writeln!(file, "{line}").context("writing audit event")?;
            file.flush().context("flushing audit log")?;
        }
        self.events.push(event);
        Ok(())
    }

    #[must_use]
    pub fn events(&self) -> &[AuditEvent] {
        &self.events
    }

    /// Number of recorded events with the given action.
    #[must_use]
    pub fn count(&self, action: AuditAction) -> usize {
        self.events.iter().filter(|e| e.action == action).count()
    }
}
