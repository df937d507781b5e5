//! Transfer orchestrator.
//!
//! A [`Transfer`] runs a sequence of [`Step`]s against one source and one
//! destination tracker. Pull steps read the source and write the staging
//! artifacts; apply steps load those artifacts and replay them into the
//! destination, milestones before issues before notes.
//!
//! Trackers are connected on first use, so a run made of staging steps
//! needs no network access. Execution stops at the first failing step and
//! nothing already applied is undone.

mod output;
mod pull;

pub use output::{DataSummary, Listed, StepOutput};
pub use pull::{find_project, pull, resolve_project};

use crate::audit::AuditLog;
use crate::config::{Endpoint, Side, TransferConfig};
use crate::error::{Result, TransferError};
use crate::model::{EntityKind, Project, ProjectData};
use crate::reconcile::{
    NoteOptions, TranslationTable, apply_issues, apply_milestones, apply_notes,
};
use crate::staging;
use crate::tracker::{GitLabClient, Tracker};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, info_span, warn};

/// One command word of a transfer run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Step {
    SourceUsers,
    DestinationUsers,
    SourceProjects,
    DestinationProjects,
    PullSave,
    ReadSource,
    SetDestinationProject,
    PutMilestones,
    PutIssues,
    PutIssueNotes,
}

impl Step {
    pub const ALL: [Self; 10] = [
        Self::SourceUsers,
        Self::DestinationUsers,
        Self::SourceProjects,
        Self::DestinationProjects,
        Self::PullSave,
        Self::ReadSource,
        Self::SetDestinationProject,
        Self::PutMilestones,
        Self::PutIssues,
        Self::PutIssueNotes,
    ];

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::SourceUsers => "suserlist",
            Self::DestinationUsers => "duserlist",
            Self::SourceProjects => "sprojlist",
            Self::DestinationProjects => "dprojlist",
            Self::PullSave => "pullsave",
            Self::ReadSource => "readsrc",
            Self::SetDestinationProject => "setdestproj",
            Self::PutMilestones => "putmile",
            Self::PutIssues => "putissues",
            Self::PutIssueNotes => "putissuenotes",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Step {
    type Err = TransferError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|step| step.as_str() == s)
            .ok_or_else(|| TransferError::UnknownStep {
                word: s.to_string(),
            })
    }
}

/// Parse whitespace-delimited command words.
///
/// Every word is checked before any step runs.
pub fn parse_steps<I, S>(words: I) -> Result<Vec<Step>>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut steps = Vec::new();
    for word in words {
        for part in word.as_ref().split_whitespace() {
            steps.push(part.parse()?);
        }
    }
    Ok(steps)
}

/// Opens a tracker for one side.
pub type Connector = Box<dyn FnMut(Side, &Endpoint) -> Result<Box<dyn Tracker>>>;

/// Connector for GitLab REST endpoints.
#[must_use]
pub fn gitlab_connector(timeout: Duration) -> Connector {
    Box::new(move |_side: Side, endpoint: &Endpoint| {
        let client = GitLabClient::connect(endpoint, timeout).map_err(|source| {
            TransferError::Connection {
                host: endpoint.host.clone(),
                source,
            }
        })?;
        Ok(Box::new(client) as Box<dyn Tracker>)
    })
}

fn connected<'a>(
    slot: &'a mut Option<Box<dyn Tracker>>,
    connector: &mut Connector,
    config: &TransferConfig,
    side: Side,
) -> Result<&'a mut dyn Tracker> {
    let tracker = match slot.take() {
        Some(tracker) => tracker,
        None => {
            let endpoint = config.endpoint(side)?;
            info!(%side, host = %endpoint.host, "connecting");
            connector(side, &endpoint)?
        }
    };
    Ok(slot.insert(tracker).as_mut())
}

fn open_audit<'a>(slot: &'a mut Option<AuditLog>, path: &Path) -> Result<&'a mut AuditLog> {
    let log = match slot.take() {
        Some(log) => log,
        None => AuditLog::open(path)?,
    };
    Ok(slot.insert(log))
}

fn out_of_order(step: Step, reason: &str) -> TransferError {
    TransferError::StepOutOfOrder {
        step: step.as_str().to_string(),
        reason: reason.to_string(),
    }
}

/// Orchestrator state for one invocation.
///
/// Holds the source data set, the resolved destination project and the
/// translation tables produced by earlier steps.
pub struct Transfer {
    config: TransferConfig,
    connector: Connector,
    source: Option<Box<dyn Tracker>>,
    destination: Option<Box<dyn Tracker>>,
    data: Option<ProjectData>,
    destination_project: Option<Project>,
    milestones: Option<TranslationTable>,
    issues: Option<TranslationTable>,
    audit: Option<AuditLog>,
    show_progress: bool,
}

impl fmt::Debug for Transfer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transfer")
            .field("config", &self.config)
            .field("source_connected", &self.source.is_some())
            .field("destination_connected", &self.destination.is_some())
            .field("destination_project", &self.destination_project)
            .field("milestones", &self.milestones)
            .field("issues", &self.issues)
            .finish_non_exhaustive()
    }
}

impl Transfer {
    #[must_use]
    pub fn new(config: TransferConfig, connector: Connector) -> Self {
        Self {
            config,
            connector,
            source: None,
            destination: None,
            data: None,
            destination_project: None,
            milestones: None,
            issues: None,
            audit: None,
            show_progress: false,
        }
    }

    /// Use `audit` instead of opening the configured audit file.
    #[must_use]
    pub fn with_audit(mut self, audit: AuditLog) -> Self {
        self.audit = Some(audit);
        self
    }

    #[must_use]
    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    #[must_use]
    pub fn config(&self) -> &TransferConfig {
        &self.config
    }

    #[must_use]
    pub fn data(&self) -> Option<&ProjectData> {
        self.data.as_ref()
    }

    #[must_use]
    pub fn destination_project(&self) -> Option<&Project> {
        self.destination_project.as_ref()
    }

    #[must_use]
    pub fn milestone_table(&self) -> Option<&TranslationTable> {
        self.milestones.as_ref()
    }

    #[must_use]
    pub fn issue_table(&self) -> Option<&TranslationTable> {
        self.issues.as_ref()
    }

    #[must_use]
    pub fn audit(&self) -> Option<&AuditLog> {
        self.audit.as_ref()
    }

    /// Run `steps` in order, handing each result to `emit`.
    ///
    /// Stops at the first failure, which is returned wrapped in
    /// [`TransferError::StepFailed`].
    pub fn run<F>(&mut self, steps: &[Step], mut emit: F) -> Result<()>
    where
        F: FnMut(Step, &StepOutput) -> Result<()>,
    {
        for &step in steps {
            let _span = info_span!("step", step = step.as_str()).entered();
            let output = self
                .execute(step)
                .map_err(|source| TransferError::StepFailed {
                    step: step.as_str().to_string(),
                    source: Box::new(source),
                })?;
            emit(step, &output)?;
        }
        Ok(())
    }

    /// Run a single step.
    pub fn execute(&mut self, step: Step) -> Result<StepOutput> {
        info!(step = step.as_str(), "starting step");
        match step {
            Step::SourceUsers => self.list_users(Side::Source),
            Step::DestinationUsers => self.list_users(Side::Destination),
            Step::SourceProjects => self.list_projects(Side::Source),
            Step::DestinationProjects => self.list_projects(Side::Destination),
            Step::PullSave => self.pull_save(),
            Step::ReadSource => self.read_source(),
            Step::SetDestinationProject => self.set_destination_project(),
            Step::PutMilestones => self.put_milestones(),
            Step::PutIssues => self.put_issues(),
            Step::PutIssueNotes => self.put_issue_notes(),
        }
    }

    fn tracker(&mut self, side: Side) -> Result<&mut dyn Tracker> {
        let slot = match side {
            Side::Source => &mut self.source,
            Side::Destination => &mut self.destination,
        };
        connected(slot, &mut self.connector, &self.config, side)
    }

    fn list_users(&mut self, side: Side) -> Result<StepOutput> {
        let tracker = self.tracker(side)?;
        let users = tracker.list_users().map_err(|err| {
            TransferError::query(tracker.host(), EntityKind::User, format!("list {side} users"), err)
        })?;
        Ok(StepOutput::Users { side, users })
    }

    fn list_projects(&mut self, side: Side) -> Result<StepOutput> {
        let tracker = self.tracker(side)?;
        let projects = tracker.list_projects().map_err(|err| {
            TransferError::query(
                tracker.host(),
                EntityKind::Project,
                format!("list {side} projects"),
                err,
            )
        })?;
        Ok(StepOutput::Projects { side, projects })
    }

    fn pull_save(&mut self) -> Result<StepOutput> {
        let name = self.config.project_name(Side::Source)?.to_string();
        let show_progress = self.show_progress;
        let tracker = self.tracker(Side::Source)?;
        let data = pull(&*tracker, &name, show_progress)?;

        let prefix = self.config.source_prefix.clone();
        let manifest = staging::save(&data, &prefix)?;
        info!(prefix = %prefix.display(), "staged source data");

        let summary = DataSummary::of(&data);
        self.data = Some(data);
        Ok(StepOutput::Pulled {
            prefix,
            summary,
            manifest,
        })
    }

    fn read_source(&mut self) -> Result<StepOutput> {
        let prefix = self.config.destination_prefix.clone();
        let loaded = staging::load(&prefix)?;
        for artifact in &loaded.edited {
            warn!(%artifact, "artifact edited since it was staged");
        }
        let summary = DataSummary::of(&loaded.data);
        let edited = loaded.edited.iter().map(ToString::to_string).collect();

        self.data = Some(loaded.data);
        self.milestones = None;
        self.issues = None;
        Ok(StepOutput::Loaded {
            prefix,
            summary,
            edited,
        })
    }

    fn set_destination_project(&mut self) -> Result<StepOutput> {
        let name = self.config.project_name(Side::Destination)?.to_string();
        let tracker = self.tracker(Side::Destination)?;
        let project = resolve_project(&*tracker, &name)?;
        self.destination_project = Some(project.clone());
        Ok(StepOutput::DestinationProject { project })
    }

    fn require_apply_inputs(&self, step: Step) -> Result<u64> {
        if self.data.is_none() {
            return Err(out_of_order(step, "no staged data loaded; run 'readsrc' first"));
        }
        self.destination_project
            .as_ref()
            .map(|p| p.id)
            .ok_or_else(|| out_of_order(step, "no destination project; run 'setdestproj' first"))
    }

    fn put_milestones(&mut self) -> Result<StepOutput> {
        let project_id = self.require_apply_inputs(Step::PutMilestones)?;
        let Self {
            config,
            connector,
            destination,
            data,
            audit,
            ..
        } = &mut *self;
        let tracker = connected(destination, connector, config, Side::Destination)?;
        let audit = open_audit(audit, &config.audit_path)?;
        audit.set_step(Step::PutMilestones.as_str());
        let Some(data) = data.as_ref() else {
            return Err(out_of_order(Step::PutMilestones, "no staged data loaded"));
        };

        let report = apply_milestones(tracker, project_id, &data.milestones, audit)?;
        info!(
            created = report.created(),
            skipped = report.skipped(),
            "milestones reconciled"
        );
        self.milestones = Some(report.table.clone());
        Ok(StepOutput::Reconciled(report))
    }

    fn put_issues(&mut self) -> Result<StepOutput> {
        let project_id = self.require_apply_inputs(Step::PutIssues)?;
        let assignee_id = self.config.assignee()?;
        if self.milestones.is_none() {
            warn!("no milestone translation table; milestone references will be dropped");
        }
        let empty = TranslationTable::new(EntityKind::Milestone);
        let Self {
            config,
            connector,
            destination,
            data,
            milestones,
            audit,
            ..
        } = &mut *self;
        let tracker = connected(destination, connector, config, Side::Destination)?;
        let audit = open_audit(audit, &config.audit_path)?;
        audit.set_step(Step::PutIssues.as_str());
        let Some(data) = data.as_ref() else {
            return Err(out_of_order(Step::PutIssues, "no staged data loaded"));
        };
        let milestones = milestones.as_ref().unwrap_or(&empty);

        let report = apply_issues(
            tracker,
            project_id,
            &data.issues,
            milestones,
            assignee_id,
            audit,
        )?;
        info!(
            created = report.created(),
            skipped = report.skipped(),
            closed = report.closed.len(),
            "issues reconciled"
        );
        self.issues = Some(report.table.clone());
        Ok(StepOutput::Reconciled(report))
    }

    fn put_issue_notes(&mut self) -> Result<StepOutput> {
        let project_id = self.require_apply_inputs(Step::PutIssueNotes)?;
        let options = NoteOptions {
            skip_system: self.config.skip_system_notes,
            show_progress: self.show_progress,
        };
        let Self {
            config,
            connector,
            destination,
            data,
            issues,
            audit,
            ..
        } = &mut *self;
        let Some(issues) = issues.as_ref() else {
            return Err(out_of_order(
                Step::PutIssueNotes,
                "no issue translation table; run 'putissues' first",
            ));
        };
        let tracker = connected(destination, connector, config, Side::Destination)?;
        let audit = open_audit(audit, &config.audit_path)?;
        audit.set_step(Step::PutIssueNotes.as_str());
        let Some(data) = data.as_ref() else {
            return Err(out_of_order(Step::PutIssueNotes, "no staged data loaded"));
        };

        let report = apply_notes(tracker, project_id, &data.notes, issues, options, audit)?;
        info!(
            appended = report.appended,
            skipped_system = report.skipped_system,
            "notes replayed"
        );
        Ok(StepOutput::NotesAppended(report))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::AuditAction;
    use crate::config::SideConfig;
    use crate::model::{Issue, Milestone, Note, State};
    use crate::tracker::InMemoryTracker;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn side(host: &str, project: &str) -> SideConfig {
        SideConfig {
            host: Some(host.to_string()),
            token: Some("t".to_string()),
            project: Some(project.to_string()),
            insecure_tls: false,
        }
    }

    fn config(prefix: PathBuf) -> TransferConfig {
        TransferConfig {
            source: side("https://src", "core"),
            destination: side("https://dst", "core-copy"),
            assignee_id: Some(42),
            source_prefix: prefix.clone(),
            destination_prefix: prefix,
            ..TransferConfig::default()
        }
    }

    fn connector(source: &InMemoryTracker, destination: &InMemoryTracker) -> Connector {
        let source = source.clone();
        let destination = destination.clone();
        Box::new(move |side: Side, _: &Endpoint| {
            let tracker: Box<dyn Tracker> = match side {
                Side::Source => Box::new(source.clone()),
                Side::Destination => Box::new(destination.clone()),
            };
            Ok(tracker)
        })
    }

    fn seeded_source() -> InMemoryTracker {
        let source = InMemoryTracker::new("https://src");
        let core = source.add_project("core");
        source.seed_milestone(
            core.id,
            Milestone {
                iid: 1,
                id: 11,
                title: "v1".to_string(),
                description: None,
                state: State::Closed,
                due_date: None,
                start_date: None,
            },
        );
        source.seed_issue(
            core.id,
            Issue {
                iid: 1,
                id: 21,
                title: "bug".to_string(),
                description: None,
                labels: Default::default(),
                state: State::Closed,
                milestone_iid: Some(1),
            },
        );
        source.seed_note(
            core.id,
            1,
            Note {
                id: 31,
                body: "seen it".to_string(),
                author: None,
                system: false,
            },
        );
        source
    }

    #[test]
    fn step_words_round_trip() {
        for step in Step::ALL {
            assert_eq!(step.as_str().parse::<Step>().unwrap(), step);
        }
    }

    #[test]
    fn parse_steps_splits_and_rejects_unknown_words() {
        let steps = parse_steps(["readsrc setdestproj", "putmile"]).unwrap();
        assert_eq!(
            steps,
            vec![Step::ReadSource, Step::SetDestinationProject, Step::PutMilestones]
        );
        let err = parse_steps(["readsrc", "putmilestones"]).unwrap_err();
        assert!(matches!(err, TransferError::UnknownStep { ref word } if word == "putmilestones"));
    }

    #[test]
    fn pull_then_apply_replays_everything() {
        let dir = TempDir::new().unwrap();
        let prefix = dir.path().join("stage");
        let source = seeded_source();
        let destination = InMemoryTracker::new("https://dst");
        let copy = destination.add_project("core-copy");

        let mut pull_side =
            Transfer::new(config(prefix.clone()), connector(&source, &destination));
        pull_side.run(&[Step::PullSave], |_, _| Ok(())).unwrap();

        let mut apply_side = Transfer::new(config(prefix), connector(&source, &destination))
            .with_audit(AuditLog::in_memory());
        let steps = parse_steps(["readsrc setdestproj putmile putissues putissuenotes"]).unwrap();
        let mut seen = Vec::new();
        apply_side
            .run(&steps, |step, _| {
                seen.push(step);
                Ok(())
            })
            .unwrap();
        assert_eq!(seen, steps);

        let milestones = destination.milestones(copy.id);
        assert_eq!(milestones.len(), 1);
        assert_eq!(milestones[0].state, State::Open);
        let issues = destination.issues(copy.id);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].state, State::Closed);
        assert_eq!(issues[0].milestone_iid, Some(milestones[0].iid));
        assert_eq!(destination.assignee(issues[0].id), Some(42));
        assert_eq!(destination.notes(copy.id, issues[0].iid).len(), 1);

        assert_eq!(
            apply_side.milestone_table().unwrap().get(1),
            Some(milestones[0].id)
        );
        let audit = apply_side.audit().unwrap();
        assert_eq!(audit.count(AuditAction::Created), 2);
        assert_eq!(audit.count(AuditAction::Closed), 1);
        assert_eq!(audit.count(AuditAction::NoteAppended), 1);
    }

    #[test]
    fn apply_before_load_is_out_of_order() {
        let dir = TempDir::new().unwrap();
        let source = InMemoryTracker::new("https://src");
        let destination = InMemoryTracker::new("https://dst");
        let mut transfer = Transfer::new(
            config(dir.path().join("stage")),
            connector(&source, &destination),
        )
        .with_audit(AuditLog::in_memory());

        let err = transfer
            .run(&[Step::PutMilestones], |_, _| Ok(()))
            .unwrap_err();
        assert!(matches!(err, TransferError::StepFailed { ref step, .. } if step == "putmile"));
        assert!(matches!(err.root(), TransferError::StepOutOfOrder { .. }));
        assert_eq!(destination.write_count(), 0);
    }

    #[test]
    fn notes_before_issues_is_out_of_order() {
        let dir = TempDir::new().unwrap();
        let prefix = dir.path().join("stage");
        let source = seeded_source();
        let destination = InMemoryTracker::new("https://dst");
        destination.add_project("core-copy");

        let mut transfer = Transfer::new(config(prefix), connector(&source, &destination))
            .with_audit(AuditLog::in_memory());
        let steps = parse_steps(["pullsave readsrc setdestproj putissuenotes"]).unwrap();
        let err = transfer.run(&steps, |_, _| Ok(())).unwrap_err();
        assert!(matches!(err.root(), TransferError::StepOutOfOrder { step, .. } if step == "putissuenotes"));
    }

    #[test]
    fn issues_without_milestone_table_drop_references() {
        let dir = TempDir::new().unwrap();
        let prefix = dir.path().join("stage");
        let source = seeded_source();
        let destination = InMemoryTracker::new("https://dst");
        let copy = destination.add_project("core-copy");

        let mut transfer = Transfer::new(config(prefix), connector(&source, &destination))
            .with_audit(AuditLog::in_memory());
        let steps = parse_steps(["pullsave", "readsrc", "setdestproj", "putissues"]).unwrap();
        transfer.run(&steps, |_, _| Ok(())).unwrap();

        let issues = destination.issues(copy.id);
        assert_eq!(issues[0].milestone_iid, None);
        let audit = transfer.audit().unwrap();
        assert_eq!(audit.count(AuditAction::MilestoneUnresolved), 1);
    }

    #[test]
    fn staging_steps_never_connect() {
        let dir = TempDir::new().unwrap();
        let prefix = dir.path().join("stage");
        let source = seeded_source();
        let destination = InMemoryTracker::new("https://dst");
        Transfer::new(config(prefix.clone()), connector(&source, &destination))
            .run(&[Step::PullSave], |_, _| Ok(()))
            .unwrap();

        let unusable: Connector = Box::new(|side: Side, _: &Endpoint| {
            Err(TransferError::Config(format!("{side} should not connect")))
        });
        let mut transfer = Transfer::new(config(prefix), unusable);
        let output = transfer.execute(Step::ReadSource).unwrap();
        assert!(matches!(output, StepOutput::Loaded { ref summary, .. } if summary.notes == 1));
    }

    #[test]
    fn missing_destination_settings_fail_on_connect() {
        let dir = TempDir::new().unwrap();
        let mut cfg = config(dir.path().join("stage"));
        cfg.destination.token = None;
        let source = InMemoryTracker::new("https://src");
        let destination = InMemoryTracker::new("https://dst");
        let mut transfer = Transfer::new(cfg, connector(&source, &destination));

        let err = transfer.execute(Step::DestinationUsers).unwrap_err();
        assert!(err.to_string().contains("destination.token"));
        assert!(transfer.execute(Step::SourceUsers).is_ok());
    }
}
