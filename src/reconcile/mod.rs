//! Skip-or-create reconciliation of milestones and issues.
//!
//! For every source item, in IID order, the destination snapshot is searched
//! for the same IID. A match is skipped and its destination ID recorded; a
//! miss is created and the new ID recorded. The resulting
//! [`TranslationTable`] maps source IIDs to destination IDs and drives every
//! later cross-reference rewrite.
//!
//! The destination snapshot is listed once per pass. Creating an item never
//! changes what later items are compared against.

pub mod notes;
pub mod rewrite;

pub use notes::{NoteOptions, NotesReport, apply_notes};
pub use rewrite::{IssueRequest, issue_request};

use crate::audit::{AuditAction, AuditLog};
use crate::error::{Result, TransferError};
use crate::model::{EntityKind, Identified, Issue, Keyed, Milestone, SortedSet};
use crate::tracker::{NewMilestone, StateEvent, Tracker};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, info, warn};

/// Source IID to destination ID for one entity kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TranslationTable {
    kind: EntityKind,
    entries: BTreeMap<u64, u64>,
}

impl TranslationTable {
    #[must_use]
    pub fn new(kind: EntityKind) -> Self {
        Self {
            kind,
            entries: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    pub fn insert(&mut self, iid: u64, id: u64) {
        self.entries.insert(iid, id);
    }

    #[must_use]
    pub fn get(&self, iid: u64) -> Option<u64> {
        self.entries.get(&iid).copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `(iid, id)` pairs in ascending IID order.
    pub fn iter(&self) -> impl Iterator<Item = (u64, u64)> + '_ {
        self.entries.iter().map(|(iid, id)| (*iid, *id))
    }
}

impl fmt::Display for TranslationTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (iid, id) in self.iter() {
            writeln!(f, "{} IID={iid} -> ID={id}", self.kind)?;
        }
        Ok(())
    }
}

/// What happened to one source item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    Created { iid: u64, id: u64 },
    Skipped { iid: u64, id: u64 },
}

impl Outcome {
    #[must_use]
    pub const fn iid(&self) -> u64 {
        match self {
            Self::Created { iid, .. } | Self::Skipped { iid, .. } => *iid,
        }
    }

    #[must_use]
    pub const fn is_created(&self) -> bool {
        matches!(self, Self::Created { .. })
    }
}

/// Result of one reconciliation pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub kind: EntityKind,
    pub table: TranslationTable,
    pub outcomes: Vec<Outcome>,
    /// Source IIDs of items closed after creation.
    pub closed: Vec<u64>,
    /// `(issue IID, milestone IID)` references with no destination milestone.
    pub unresolved_milestones: Vec<(u64, u64)>,
}

impl ReconcileReport {
    #[must_use]
    pub fn created(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_created()).count()
    }

    #[must_use]
    pub fn skipped(&self) -> usize {
        self.outcomes.len() - self.created()
    }
}

/// Destination writes for one reconciliation pass.
pub trait Replay<T> {
    /// Create `item` at the destination and return its new ID.
    fn create(&mut self, item: &T, audit: &mut AuditLog) -> Result<u64>;

    /// Follow-up writes for an item that is already created and recorded.
    fn after_create(&mut self, _item: &T, _id: u64, _audit: &mut AuditLog) -> Result<()> {
        Ok(())
    }
}

impl<T, F> Replay<T> for F
where
    F: FnMut(&T, &mut AuditLog) -> Result<u64>,
{
    fn create(&mut self, item: &T, audit: &mut AuditLog) -> Result<u64> {
        self(item, audit)
    }
}

/// Reconcile `source` against one destination snapshot.
///
/// `replay` creates every source item whose IID is absent from
/// `destination`. The `created` event is recorded before
/// [`Replay::after_create`] runs, so an item whose follow-up write fails is
/// still in the audit trail. The first failure aborts the pass; items created
/// before it stay created.
pub fn reconcile<T, R>(
    source: &SortedSet<T>,
    destination: &SortedSet<T>,
    audit: &mut AuditLog,
    replay: &mut R,
) -> Result<ReconcileReport>
where
    T: Keyed + Identified,
    R: Replay<T>,
{
    let mut table = TranslationTable::new(T::KIND);
    let mut outcomes = Vec::with_capacity(source.len());

    for item in source {
        let iid = item.key();
        if let Some(existing) = destination.get(iid) {
            info!(kind = %T::KIND, iid, id = existing.id(), title = existing.title(), "skipping existing");
            audit.record(
                T::KIND,
                AuditAction::Skipped,
                Some(iid),
                Some(existing.id()),
                None,
            )?;
            table.insert(iid, existing.id());
            outcomes.push(Outcome::Skipped {
                iid,
                id: existing.id(),
            });
        } else {
            let id = replay.create(item, audit)?;
            info!(kind = %T::KIND, iid, id, title = item.title(), "created");
            audit.record(T::KIND, AuditAction::Created, Some(iid), Some(id), None)?;
            table.insert(iid, id);
            outcomes.push(Outcome::Created { iid, id });
            replay.after_create(item, id, audit)?;
        }
    }

    for (iid, id) in table.iter() {
        debug!(kind = %T::KIND, iid, id, "translation");
    }

    Ok(ReconcileReport {
        kind: T::KIND,
        table,
        outcomes,
        closed: Vec::new(),
        unresolved_milestones: Vec::new(),
    })
}

fn destination_snapshot<T: Keyed>(listing: Vec<T>, origin: &str) -> Result<SortedSet<T>> {
    SortedSet::try_from_iter(listing).map_err(|err| TransferError::duplicate(origin, err))
}

/// Replay milestones into the destination project.
///
/// Closed source milestones are created open and left open.
pub fn apply_milestones(
    tracker: &mut dyn Tracker,
    project_id: u64,
    source: &SortedSet<Milestone>,
    audit: &mut AuditLog,
) -> Result<ReconcileReport> {
    let host = tracker.host().to_string();
    let listing = tracker.list_milestones(project_id).map_err(|err| {
        TransferError::query(&host, EntityKind::Milestone, "list destination milestones", err)
    })?;
    let destination = destination_snapshot(listing, "destination milestone listing")?;
    debug!(project = project_id, existing = destination.len(), "destination milestones");

    let mut create = |milestone: &Milestone, _: &mut AuditLog| -> Result<u64> {
        if milestone.state.is_closed() {
            debug!(iid = milestone.iid, "source milestone closed; destination stays open");
        }
        tracker
            .create_milestone(project_id, &NewMilestone::from(milestone))
            .map(|created| created.id)
            .map_err(|err| TransferError::write(EntityKind::Milestone, milestone.iid, "create", err))
    };
    reconcile(source, &destination, audit, &mut create)
}

/// Replay issues into the destination project.
///
/// Milestone references are rewritten through `milestones`. An issue whose
/// source is closed is closed right after creation.
pub fn apply_issues(
    tracker: &mut dyn Tracker,
    project_id: u64,
    source: &SortedSet<Issue>,
    milestones: &TranslationTable,
    assignee_id: u64,
    audit: &mut AuditLog,
) -> Result<ReconcileReport> {
    let host = tracker.host().to_string();
    let listing = tracker.list_issues(project_id).map_err(|err| {
        TransferError::query(&host, EntityKind::Issue, "list destination issues", err)
    })?;
    let destination = destination_snapshot(listing, "destination issue listing")?;
    debug!(project = project_id, existing = destination.len(), "destination issues");

    let mut replay = IssueReplay {
        tracker,
        project_id,
        milestones,
        assignee_id,
        created: None,
        closed: Vec::new(),
        unresolved: Vec::new(),
    };
    let mut report = reconcile(source, &destination, audit, &mut replay)?;
    report.closed = replay.closed;
    report.unresolved_milestones = replay.unresolved;
    Ok(report)
}

struct IssueReplay<'a> {
    tracker: &'a mut dyn Tracker,
    project_id: u64,
    milestones: &'a TranslationTable,
    assignee_id: u64,
    /// The issue returned by the last create, consumed by `after_create`.
    created: Option<Issue>,
    closed: Vec<u64>,
    unresolved: Vec<(u64, u64)>,
}

impl Replay<Issue> for IssueReplay<'_> {
    fn create(&mut self, issue: &Issue, audit: &mut AuditLog) -> Result<u64> {
        let IssueRequest {
            request,
            unresolved_milestone,
        } = issue_request(issue, self.milestones, self.assignee_id);
        if let Some(milestone_iid) = unresolved_milestone {
            warn!(
                iid = issue.iid,
                milestone_iid, "milestone has no destination ID; creating issue without it"
            );
            audit.record(
                EntityKind::Issue,
                AuditAction::MilestoneUnresolved,
                Some(issue.iid),
                None,
                Some(format!("milestone IID {milestone_iid}")),
            )?;
            self.unresolved.push((issue.iid, milestone_iid));
        }

        let created = self
            .tracker
            .create_issue(self.project_id, &request)
            .map_err(|err| TransferError::write(EntityKind::Issue, issue.iid, "create", err))?;
        Ok(self.created.insert(created).id)
    }

    fn after_create(&mut self, issue: &Issue, id: u64, audit: &mut AuditLog) -> Result<()> {
        let Some(created) = self.created.take() else {
            return Ok(());
        };
        if !issue.state.is_closed() {
            return Ok(());
        }
        self.tracker
            .edit_issue(self.project_id, &created, StateEvent::Close)
            .map_err(|err| TransferError::write(EntityKind::Issue, issue.iid, "close", err))?;
        info!(iid = issue.iid, id, "closed");
        audit.record(
            EntityKind::Issue,
            AuditAction::Closed,
            Some(issue.iid),
            Some(id),
            None,
        )?;
        self.closed.push(issue.iid);
        Ok(())
    }
}
