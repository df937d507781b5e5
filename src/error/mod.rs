//! Error types and handling for `gitlab_transfer`.
//!
//! # Design
//!
//! - Uses `thiserror` for derive-based error types
//! - Tracker collaborator failures keep their [`TrackerError`] as the source
//! - Every variant carries enough context (entity kind, IID/ID, step) to
//!   resume a migration by hand
//! - Provides structured JSON output and grouped exit codes

mod context;
mod structured;

pub use context::{OptionExt, ResultExt};
pub use structured::{ErrorCode, StructuredError};

use crate::model::EntityKind;
use crate::model::collection::DuplicateKey;
use crate::tracker::TrackerError;
use std::path::PathBuf;
use thiserror::Error;

/// Primary error type for `gitlab_transfer` operations.
#[derive(Error, Debug)]
pub enum TransferError {
    // === Tracker Errors ===
    /// The tracker could not be reached or rejected the credentials.
    #[error("Cannot connect to {host}: {source}")]
    Connection {
        host: String,
        #[source]
        source: TrackerError,
    },

    /// The tracker answered but a listing or read call failed.
    #[error("Failed to {operation} ({kind}): {source}")]
    Query {
        kind: EntityKind,
        operation: String,
        #[source]
        source: TrackerError,
    },

    /// The tracker rejected a create or edit call.
    #[error("Failed to {operation} {kind} {} {key}: {source}", kind.key_name())]
    Write {
        kind: EntityKind,
        key: u64,
        operation: String,
        #[source]
        source: TrackerError,
    },

    /// No visible project matched the configured name.
    #[error("Project '{name}' not found on {host}")]
    ProjectNotFound { name: String, host: String },

    // === Data Integrity Errors ===
    /// Two members of one collection share an IID or ID.
    #[error("Data integrity violation in {origin}: {source}")]
    DuplicateKey {
        origin: String,
        #[source]
        source: DuplicateKey,
    },

    /// Notes reference an issue IID with no destination issue.
    #[error("Issue IID {iid} has notes but no destination issue")]
    UnresolvedIssue { iid: u64 },

    // === Staging Errors ===
    /// A staging artifact does not exist.
    #[error("Staging artifact '{artifact}' missing at '{}'", path.display())]
    ArtifactMissing { artifact: String, path: PathBuf },

    /// A staging artifact exists but cannot be decoded.
    #[error("Staging artifact '{artifact}' at '{}' is malformed: {reason}", path.display())]
    ArtifactMalformed {
        artifact: String,
        path: PathBuf,
        reason: String,
    },

    // === Orchestration Errors ===
    /// A step word outside the known command set.
    #[error("Unknown step: {word}")]
    UnknownStep { word: String },

    /// A step ran before the step that produces its input.
    #[error("Step '{step}' cannot run yet: {reason}")]
    StepOutOfOrder { step: String, reason: String },

    /// A step failed; later steps were not run.
    #[error("Step '{step}' failed: {source}")]
    StepFailed {
        step: String,
        #[source]
        source: Box<TransferError>,
    },

    // === Configuration Errors ===
    /// Configuration file error or a missing setting.
    #[error("Configuration error: {0}")]
    Config(String),

    // === I/O Errors ===
    /// File system I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML parsing error.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    // === Wrapped errors ===
    /// Error with additional context.
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl TransferError {
    /// Classify a failed listing or read call.
    ///
    /// Transport and authentication failures become [`Self::Connection`];
    /// anything else the tracker reports is a [`Self::Query`] failure.
    #[must_use]
    pub fn query(
        host: &str,
        kind: EntityKind,
        operation: impl Into<String>,
        source: TrackerError,
    ) -> Self {
        if source.is_connection() {
            Self::Connection {
                host: host.to_string(),
                source,
            }
        } else {
            Self::Query {
                kind,
                operation: operation.into(),
                source,
            }
        }
    }

    #[must_use]
    pub fn write(
        kind: EntityKind,
        key: u64,
        operation: impl Into<String>,
        source: TrackerError,
    ) -> Self {
        Self::Write {
            kind,
            key,
            operation: operation.into(),
            source,
        }
    }

    #[must_use]
    pub fn duplicate(origin: impl Into<String>, source: DuplicateKey) -> Self {
        Self::DuplicateKey {
            origin: origin.into(),
            source,
        }
    }

    /// Strip [`Self::StepFailed`] wrappers down to the error that caused them.
    #[must_use]
    pub fn root(&self) -> &Self {
        match self {
            Self::StepFailed { source, .. } => source.root(),
            other => other,
        }
    }

    /// Can the operator fix this without code changes?
    #[must_use]
    pub fn is_user_recoverable(&self) -> bool {
        matches!(
            self.root(),
            Self::Connection { .. }
                | Self::ProjectNotFound { .. }
                | Self::DuplicateKey { .. }
                | Self::UnresolvedIssue { .. }
                | Self::ArtifactMissing { .. }
                | Self::ArtifactMalformed { .. }
                | Self::UnknownStep { .. }
                | Self::StepOutOfOrder { .. }
                | Self::Config(_)
        )
    }

    /// Human-friendly suggestion for fixing this error.
    #[must_use]
    pub fn suggestion(&self) -> Option<&'static str> {
        match self.root() {
            Self::Connection { .. } => {
                Some("Check the host URL, token and network access for this side")
            }
            Self::Write { .. } => Some(
                "Inspect the destination project; milestones and issues already created are skipped on re-run, notes are not",
            ),
            Self::ProjectNotFound { .. } => {
                Some("Run 'glt dprojlist' to see the projects visible to the token")
            }
            Self::DuplicateKey { .. } => {
                Some("Remove or renumber the duplicate entry, then run the step again")
            }
            Self::UnresolvedIssue { .. } => {
                Some("Run 'putissues' before 'putissuenotes' in the same invocation")
            }
            Self::ArtifactMissing { .. } => {
                Some("Run 'glt pullsave' on the source side and copy every staging file")
            }
            Self::ArtifactMalformed { .. } => Some("Fix the hand edit or re-run 'glt pullsave'"),
            Self::UnknownStep { .. } => Some(
                "Valid steps: suserlist, duserlist, sprojlist, dprojlist, pullsave, readsrc, setdestproj, putmile, putissues, putissuenotes",
            ),
            Self::StepOutOfOrder { .. } => {
                Some("Typical apply order: readsrc setdestproj putmile putissues putissuenotes")
            }
            _ => None,
        }
    }

    /// Exit code for this error's category.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        StructuredError::from_error(self).code.exit_code()
    }
}

/// Result type using `TransferError`.
pub type Result<T> = std::result::Result<T, TransferError>;
