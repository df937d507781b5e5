//! Structured error output.
//!
//! Provides machine-parseable error information with:
//! - Error codes for categorization
//! - Hints for the operator
//! - Retryability flags
//! - Context for resuming a migration by hand

use crate::error::TransferError;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// Machine-readable error codes.
///
/// These codes are stable and can be used for programmatic error handling.
/// Format: `SCREAMING_SNAKE_CASE` for easy parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    // === Tracker Errors (exit code 2) ===
    /// Tracker unreachable or credentials rejected
    TrackerUnreachable,
    /// Listing or read call failed
    TrackerQueryFailed,
    /// Create or edit call rejected
    TrackerWriteFailed,
    /// Named project not visible on the tracker
    ProjectNotFound,

    // === Integrity Errors (exit code 3) ===
    /// Two members of a collection share a key
    DuplicateKey,
    /// Notes reference an issue that was not replayed
    UnresolvedIssue,

    // === Staging Errors (exit code 4) ===
    /// Staging file not found
    ArtifactMissing,
    /// Staging file cannot be decoded
    ArtifactMalformed,

    // === Orchestration Errors (exit code 5) ===
    /// Step word not recognized
    UnknownStep,
    /// Step run before its prerequisite
    StepOutOfOrder,

    // === Config Errors (exit code 7) ===
    /// Configuration error
    ConfigError,

    // === I/O Errors (exit code 8) ===
    /// File I/O error
    IoError,
    /// JSON serialization error
    JsonError,
    /// YAML parsing error
    YamlError,

    // === Internal Errors (exit code 1) ===
    /// Unexpected internal error
    InternalError,
}

impl ErrorCode {
    /// Get the string representation for JSON output.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            // Tracker
            Self::TrackerUnreachable => "TRACKER_UNREACHABLE",
            Self::TrackerQueryFailed => "TRACKER_QUERY_FAILED",
            Self::TrackerWriteFailed => "TRACKER_WRITE_FAILED",
            Self::ProjectNotFound => "PROJECT_NOT_FOUND",
            // Integrity
            Self::DuplicateKey => "DUPLICATE_KEY",
            Self::UnresolvedIssue => "UNRESOLVED_ISSUE",
            // Staging
            Self::ArtifactMissing => "ARTIFACT_MISSING",
            Self::ArtifactMalformed => "ARTIFACT_MALFORMED",
            // Orchestration
            Self::UnknownStep => "UNKNOWN_STEP",
            Self::StepOutOfOrder => "STEP_OUT_OF_ORDER",
            // Config
            Self::ConfigError => "CONFIG_ERROR",
            // I/O
            Self::IoError => "IO_ERROR",
            Self::JsonError => "JSON_ERROR",
            Self::YamlError => "YAML_ERROR",
            // Internal
            Self::InternalError => "INTERNAL_ERROR",
        }
    }

    /// Whether running the same steps again might succeed.
    ///
    /// Nothing is retried automatically; this only tells the operator
    /// that the failure may be transient.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::TrackerUnreachable | Self::TrackerQueryFailed)
    }

    /// Get the exit code for this error category.
    ///
    /// Exit codes are grouped by error category:
    /// - 1: Internal/unknown errors
    /// - 2: Tracker errors
    /// - 3: Data integrity errors
    /// - 4: Staging errors
    /// - 5: Orchestration errors
    /// - 7: Config errors
    /// - 8: I/O errors
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::TrackerUnreachable
            | Self::TrackerQueryFailed
            | Self::TrackerWriteFailed
            | Self::ProjectNotFound => 2,
            Self::DuplicateKey | Self::UnresolvedIssue => 3,
            Self::ArtifactMissing | Self::ArtifactMalformed => 4,
            Self::UnknownStep | Self::StepOutOfOrder => 5,
            Self::ConfigError => 7,
            Self::IoError | Self::JsonError | Self::YamlError => 8,
            Self::InternalError => 1,
        }
    }
}

/// Structured error for machine-parseable output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredError {
    /// Machine-readable error code
    pub code: ErrorCode,
    /// Human-readable error message
    pub message: String,
    /// Optional hint for fixing the error
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    /// Whether the operation can be retried
    pub retryable: bool,
    /// Additional context data
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<Value>,
}

impl StructuredError {
    /// Create a new structured error from a `TransferError`.
    #[must_use]
    pub fn from_error(err: &TransferError) -> Self {
        let (code, mut context) = Self::extract_code_and_context(err.root());

        if let TransferError::StepFailed { step, .. } = err {
            let ctx = context.get_or_insert_with(|| json!({}));
            if let Some(map) = ctx.as_object_mut() {
                map.insert("step".to_string(), json!(step));
            }
        }

        Self {
            code,
            message: err.to_string(),
            hint: err.suggestion().map(ToString::to_string),
            retryable: code.is_retryable(),
            context,
        }
    }

    /// Serialize to JSON value.
    #[must_use]
    pub fn to_json(&self) -> Value {
        json!({
            "error": {
                "code": self.code.as_str(),
                "message": self.message,
                "hint": self.hint,
                "retryable": self.retryable,
                "context": self.context,
            }
        })
    }

    /// Format for human-readable output.
    #[must_use]
    pub fn to_human(&self, color: bool) -> String {
        let mut output = String::new();

        if color {
            output.push_str("\x1b[31mError:\x1b[0m ");
        } else {
            output.push_str("Error: ");
        }

        output.push_str(&self.message);

        if let Some(hint) = &self.hint {
            output.push('\n');
            if color {
                output.push_str("\x1b[33mHint:\x1b[0m ");
            } else {
                output.push_str("Hint: ");
            }
            output.push_str(hint);
        }

        output
    }

    fn extract_code_and_context(err: &TransferError) -> (ErrorCode, Option<Value>) {
        match err {
            TransferError::Connection { host, .. } => {
                (ErrorCode::TrackerUnreachable, Some(json!({"host": host})))
            }
            TransferError::Query {
                kind, operation, ..
            } => (
                ErrorCode::TrackerQueryFailed,
                Some(json!({"kind": kind, "operation": operation})),
            ),
            TransferError::Write {
                kind,
                key,
                operation,
                ..
            } => (
                ErrorCode::TrackerWriteFailed,
                Some(json!({
                    "kind": kind,
                    "key": key,
                    "key_name": kind.key_name(),
                    "operation": operation,
                })),
            ),
            TransferError::ProjectNotFound { name, host } => (
                ErrorCode::ProjectNotFound,
                Some(json!({"name": name, "host": host})),
            ),
            TransferError::DuplicateKey { origin, source } => (
                ErrorCode::DuplicateKey,
                Some(json!({"origin": origin, "kind": source.kind, "key": source.key})),
            ),
            TransferError::UnresolvedIssue { iid } => {
                (ErrorCode::UnresolvedIssue, Some(json!({"iid": iid})))
            }
            TransferError::ArtifactMissing { artifact, path } => (
                ErrorCode::ArtifactMissing,
                Some(json!({"artifact": artifact, "path": path.display().to_string()})),
            ),
            TransferError::ArtifactMalformed {
                artifact,
                path,
                reason,
            } => (
                ErrorCode::ArtifactMalformed,
                Some(json!({
                    "artifact": artifact,
                    "path": path.display().to_string(),
                    "reason": reason,
                })),
            ),
            TransferError::UnknownStep { word } => {
                (ErrorCode::UnknownStep, Some(json!({"word": word})))
            }
            TransferError::StepOutOfOrder { step, reason } => (
                ErrorCode::StepOutOfOrder,
                Some(json!({"step": step, "reason": reason})),
            ),
            TransferError::Config(_) => (ErrorCode::ConfigError, None),
            TransferError::Io(_) => (ErrorCode::IoError, None),
            TransferError::Json(_) => (ErrorCode::JsonError, None),
            TransferError::Yaml(_) => (ErrorCode::YamlError, None),
            TransferError::WithContext { context, .. } => {
                (ErrorCode::InternalError, Some(json!({"context": context})))
            }
            TransferError::StepFailed { source, .. } => Self::extract_code_and_context(source),
            TransferError::Other(_) => (ErrorCode::InternalError, None),
        }
    }
}
