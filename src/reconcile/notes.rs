//! Note replay.
//!
//! Notes have no reconciliation step: every staged note is appended to the
//! destination issue found through the issue translation table. Running the
//! replay twice appends every note twice.

use super::TranslationTable;
use super::rewrite::{NoteTarget, resolve_note_targets};
use crate::audit::{AuditAction, AuditLog};
use crate::error::{Result, TransferError};
use crate::model::{EntityKind, IssueNotes};
use crate::tracker::Tracker;
use crate::util::progress::ProgressTracker;
use serde::Serialize;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NoteOptions {
    /// Leave out notes the source tracker generated itself.
    pub skip_system: bool,
    pub show_progress: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NotesReport {
    pub appended: usize,
    pub skipped_system: usize,
    /// `(issue IID, destination issue ID, notes appended)` per issue.
    pub issues: Vec<(u64, u64, usize)>,
}

/// Append every staged note to its destination issue.
///
/// All issue IIDs are resolved before the first note is written; an IID
/// missing from `issues` fails with [`TransferError::UnresolvedIssue`] and
/// nothing is appended.
pub fn apply_notes(
    tracker: &mut dyn Tracker,
    project_id: u64,
    notes: &IssueNotes,
    issues: &TranslationTable,
    options: NoteOptions,
    audit: &mut AuditLog,
) -> Result<NotesReport> {
    let targets = resolve_note_targets(notes, issues)?;
    let host = tracker.host().to_string();
    let total: usize = notes.values().map(|set| set.len()).sum();
    let progress = ProgressTracker::with_visibility(
        u64::try_from(total).unwrap_or(u64::MAX),
        "Appending notes",
        options.show_progress,
    );
    let mut report = NotesReport::default();
    let mut position = 0usize;

    for NoteTarget { iid, id, notes: staged } in targets {
        let destination = tracker.get_issue(project_id, id).map_err(|err| {
            TransferError::query(&host, EntityKind::Issue, format!("fetch destination issue ID {id}"), err)
        })?;
        let mut appended = 0usize;

        for note in staged {
            position += 1;
            progress.set_message(format!("note {position}/{total}, issue IID={iid}"));
            progress.inc(1);
            if options.skip_system && note.system {
                debug!(iid, note = note.id, "skipping system note");
                report.skipped_system += 1;
                continue;
            }
            let created = tracker
                .create_note(project_id, &destination, &note.body)
                .map_err(|err| TransferError::write(EntityKind::Note, note.id, "append", err))?;
            debug!(iid, source_note = note.id, note = created.id, "appended note");
            audit.record(
                EntityKind::Note,
                AuditAction::NoteAppended,
                Some(iid),
                Some(created.id),
                Some(format!("source note ID {}", note.id)),
            )?;
            appended += 1;
        }

        info!(iid, id, count = appended, "notes appended");
        report.appended += appended;
        report.issues.push((iid, id, appended));
    }

    progress.finish_and_clear();
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Note, SortedSet};
    use crate::tracker::{InMemoryTracker, NewIssue};

    fn note(id: u64, body: &str, system: bool) -> Note {
        Note {
            id,
            body: body.to_string(),
            author: None,
            system,
        }
    }

    fn setup() -> (InMemoryTracker, u64, TranslationTable) {
        let mut tracker = InMemoryTracker::new("https://dst");
        let project = tracker.add_project("core");
        let issue = tracker
            .create_issue(
                project.id,
                &NewIssue {
                    title: "bug".to_string(),
                    description: None,
                    labels: String::new(),
                    milestone_id: None,
                    assignee_id: 1,
                },
            )
            .unwrap();
        let mut table = TranslationTable::new(EntityKind::Issue);
        table.insert(3, issue.id);
        (tracker, project.id, table)
    }

    #[test]
    fn notes_are_appended_in_id_order() {
        let (mut tracker, project_id, table) = setup();
        let mut notes = IssueNotes::new();
        notes.insert(
            3,
            SortedSet::try_from_iter([note(20, "second", false), note(10, "first", false)])
                .unwrap(),
        );
        let mut audit = AuditLog::in_memory();

        let report = apply_notes(
            &mut tracker,
            project_id,
            &notes,
            &table,
            NoteOptions::default(),
            &mut audit,
        )
        .unwrap();

        assert_eq!(report.appended, 2);
        let bodies: Vec<String> = tracker
            .notes(project_id, 1)
            .into_iter()
            .map(|n| n.body)
            .collect();
        assert_eq!(bodies, vec!["first", "second"]);
        assert_eq!(audit.count(AuditAction::NoteAppended), 2);
    }

    #[test]
    fn system_notes_can_be_skipped() {
        let (mut tracker, project_id, table) = setup();
        let mut notes = IssueNotes::new();
        notes.insert(
            3,
            SortedSet::try_from_iter([note(1, "added ~bug label", true), note(2, "lgtm", false)])
                .unwrap(),
        );
        let options = NoteOptions {
            skip_system: true,
            show_progress: false,
        };
        let mut audit = AuditLog::in_memory();

        let report =
            apply_notes(&mut tracker, project_id, &notes, &table, options, &mut audit).unwrap();
        assert_eq!(report.appended, 1);
        assert_eq!(report.skipped_system, 1);
        assert_eq!(tracker.notes(project_id, 1).len(), 1);
    }

    #[test]
    fn unresolved_issue_writes_nothing() {
        let (mut tracker, project_id, table) = setup();
        let mut notes = IssueNotes::new();
        notes.insert(3, SortedSet::try_from_iter([note(1, "a", false)]).unwrap());
        notes.insert(8, SortedSet::try_from_iter([note(2, "b", false)]).unwrap());
        let writes_before = tracker.write_count();
        let mut audit = AuditLog::in_memory();

        let err = apply_notes(
            &mut tracker,
            project_id,
            &notes,
            &table,
            NoteOptions::default(),
            &mut audit,
        )
        .unwrap_err();
        assert!(matches!(err, TransferError::UnresolvedIssue { iid: 8 }));
        assert_eq!(tracker.write_count(), writes_before);
    }
}
