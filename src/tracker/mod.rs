//! The issue-tracker collaborator.
//!
//! [`Tracker`] is the only seam between the migration engine and a remote
//! tracker instance. Every call is synchronous and issued one at a time.
//! Reads take `&self`; creates and edits take `&mut self`.

pub mod gitlab;
pub mod memory;

pub use gitlab::GitLabClient;
pub use memory::InMemoryTracker;

use crate::model::{Issue, Milestone, Note, Project, User};
use thiserror::Error;

/// Failure reported by a tracker call.
#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("cannot reach {url}: {reason}")]
    Unreachable { url: String, reason: String },

    #[error("credentials rejected by {url}")]
    Unauthorized { url: String },

    #[error("{url} not found")]
    NotFound { url: String },

    #[error("{url} returned HTTP {status}: {message}")]
    Api {
        url: String,
        status: u16,
        message: String,
    },

    #[error("unexpected response from {url}: {reason}")]
    Decode { url: String, reason: String },
}

impl TrackerError {
    /// Transport and authentication failures, as opposed to a rejected call.
    #[must_use]
    pub const fn is_connection(&self) -> bool {
        matches!(self, Self::Unreachable { .. } | Self::Unauthorized { .. })
    }
}

pub type TrackerResult<T> = std::result::Result<T, TrackerError>;

/// Fields sent when creating a milestone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMilestone {
    pub title: String,
    pub description: Option<String>,
    pub due_date: Option<String>,
    pub start_date: Option<String>,
}

impl From<&Milestone> for NewMilestone {
    fn from(milestone: &Milestone) -> Self {
        Self {
            title: milestone.title.clone(),
            description: milestone.description.clone(),
            due_date: milestone.due_date.clone(),
            start_date: milestone.start_date.clone(),
        }
    }
}

/// Fields sent when creating an issue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewIssue {
    pub title: String,
    pub description: Option<String>,
    /// Comma-separated label names.
    pub labels: String,
    /// Destination milestone ID, already translated from the source IID.
    pub milestone_id: Option<u64>,
    pub assignee_id: u64,
}

/// State transition requested by an issue edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateEvent {
    Leave,
    Close,
}

impl StateEvent {
    /// Value of the `state_event` request parameter, if any.
    #[must_use]
    pub const fn as_param(&self) -> Option<&'static str> {
        match self {
            Self::Leave => None,
            Self::Close => Some("close"),
        }
    }
}

/// Operations the migration consumes from a tracker instance.
///
/// Milestones and issues are scoped to a project by its ID. Notes are
/// addressed through their owning issue.
pub trait Tracker {
    /// Base URL, used in error messages and logs.
    fn host(&self) -> &str;

    fn list_users(&self) -> TrackerResult<Vec<User>>;

    /// Projects visible to the configured credentials, in listing order.
    fn list_projects(&self) -> TrackerResult<Vec<Project>>;

    /// All milestones of a project. An empty project yields an empty list.
    fn list_milestones(&self, project_id: u64) -> TrackerResult<Vec<Milestone>>;

    fn create_milestone(
        &mut self,
        project_id: u64,
        milestone: &NewMilestone,
    ) -> TrackerResult<Milestone>;

    /// All issues of a project, open and closed.
    fn list_issues(&self, project_id: u64) -> TrackerResult<Vec<Issue>>;

    /// Fetch one issue by its global ID.
    fn get_issue(&self, project_id: u64, id: u64) -> TrackerResult<Issue>;

    fn create_issue(&mut self, project_id: u64, issue: &NewIssue) -> TrackerResult<Issue>;

    fn edit_issue(
        &mut self,
        project_id: u64,
        issue: &Issue,
        event: StateEvent,
    ) -> TrackerResult<Issue>;

    fn list_notes(&self, project_id: u64, issue: &Issue) -> TrackerResult<Vec<Note>>;

    fn create_note(&mut self, project_id: u64, issue: &Issue, body: &str) -> TrackerResult<Note>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::State;

    #[test]
    fn connection_errors_are_classified() {
        let unreachable = TrackerError::Unreachable {
            url: "https://dst".to_string(),
            reason: "connection refused".to_string(),
        };
        assert!(unreachable.is_connection());
        let missing = TrackerError::NotFound {
            url: "https://dst/api/v4/projects/9".to_string(),
        };
        assert!(!missing.is_connection());
    }

    #[test]
    fn new_milestone_copies_descriptive_fields() {
        let milestone = Milestone {
            iid: 2,
            id: 40,
            title: "v2".to_string(),
            description: Some("second".to_string()),
            state: State::Closed,
            due_date: Some("2024-06-01".to_string()),
            start_date: None,
        };
        let new = NewMilestone::from(&milestone);
        assert_eq!(new.title, "v2");
        assert_eq!(new.description.as_deref(), Some("second"));
        assert_eq!(new.due_date.as_deref(), Some("2024-06-01"));
    }

    #[test]
    fn state_event_params() {
        assert_eq!(StateEvent::Close.as_param(), Some("close"));
        assert_eq!(StateEvent::Leave.as_param(), None);
    }
}
