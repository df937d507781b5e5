//! Cross-reference rewriting between source IIDs and destination IDs.

use super::TranslationTable;
use crate::error::{Result, TransferError};
use crate::model::{Issue, IssueNotes, Note, SortedSet};
use crate::tracker::NewIssue;

/// A create request for one issue, plus any milestone it could not carry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssueRequest {
    pub request: NewIssue,
    /// Source milestone IID referenced by the issue but absent from the table.
    pub unresolved_milestone: Option<u64>,
}

/// Build the destination create request for `issue`.
///
/// The milestone reference is a source IID and is replaced by the
/// destination milestone ID. A reference missing from `milestones` is
/// dropped and reported in [`IssueRequest::unresolved_milestone`].
#[must_use]
pub fn issue_request(issue: &Issue, milestones: &TranslationTable, assignee_id: u64) -> IssueRequest {
    let milestone_id = issue.milestone_iid.and_then(|iid| milestones.get(iid));
    let unresolved_milestone = issue.milestone_iid.filter(|_| milestone_id.is_none());

    IssueRequest {
        request: NewIssue {
            title: issue.title.clone(),
            description: issue.description.clone(),
            labels: issue.label_string(),
            milestone_id,
            assignee_id,
        },
        unresolved_milestone,
    }
}

/// Staged notes of one source issue and the destination issue they go to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NoteTarget<'a> {
    pub iid: u64,
    pub id: u64,
    pub notes: &'a SortedSet<Note>,
}

/// Destination issue for every issue IID that has notes, ascending.
///
/// Fails on the first IID missing from `issues`, before anything is written.
pub fn resolve_note_targets<'a>(
    notes: &'a IssueNotes,
    issues: &TranslationTable,
) -> Result<Vec<NoteTarget<'a>>> {
    notes
        .iter()
        .map(|(&iid, staged)| {
            issues
                .get(iid)
                .map(|id| NoteTarget {
                    iid,
                    id,
                    notes: staged,
                })
                .ok_or(TransferError::UnresolvedIssue { iid })
        })
        .collect()
}
