//! Pull phase: read one project from the source tracker into a [`ProjectData`].

use crate::error::{Result, TransferError};
use crate::model::{EntityKind, IssueNotes, Keyed, Project, ProjectData, SortedSet};
use crate::tracker::Tracker;
use crate::util::progress::ProgressTracker;
use regex::Regex;
use tracing::{debug, info};

/// Pick the project called `name` out of a listing.
///
/// An exact name match wins. Otherwise `name` is tried as a regular
/// expression that must match the whole project name. The first match in
/// listing order is returned.
pub fn find_project(mut projects: Vec<Project>, name: &str, host: &str) -> Result<Project> {
    if let Some(position) = projects.iter().position(|p| p.name == name) {
        return Ok(projects.swap_remove(position));
    }

    let found = match Regex::new(&format!("^(?:{name})$")) {
        Ok(pattern) => projects.into_iter().find(|p| pattern.is_match(&p.name)),
        Err(err) => {
            debug!(name, error = %err, "project name is not a pattern");
            None
        }
    };

    found.ok_or_else(|| TransferError::ProjectNotFound {
        name: name.to_string(),
        host: host.to_string(),
    })
}

/// Resolve `name` against the projects visible on `tracker`.
pub fn resolve_project(tracker: &dyn Tracker, name: &str) -> Result<Project> {
    let host = tracker.host();
    let projects = tracker
        .list_projects()
        .map_err(|err| TransferError::query(host, EntityKind::Project, "list projects", err))?;
    let project = find_project(projects, name, host)?;
    info!(project = project.id, name = %project.name, %host, "found project");
    Ok(project)
}

fn sorted<T: Keyed>(listing: Vec<T>, origin: impl Into<String>) -> Result<SortedSet<T>> {
    SortedSet::try_from_iter(listing).map_err(|err| TransferError::duplicate(origin, err))
}

/// Query project, users, milestones, issues and then the notes of every
/// issue, stopping at the first failure.
pub fn pull(tracker: &dyn Tracker, project_name: &str, show_progress: bool) -> Result<ProjectData> {
    let host = tracker.host();
    let project = resolve_project(tracker, project_name)?;
    let project_id = project.id;

    let users = tracker
        .list_users()
        .map_err(|err| TransferError::query(host, EntityKind::User, "list source users", err))?;
    debug!(count = users.len(), "pulled users");

    let milestones = tracker.list_milestones(project_id).map_err(|err| {
        TransferError::query(host, EntityKind::Milestone, "list source milestones", err)
    })?;
    let milestones = sorted(milestones, "source milestone listing")?;
    info!(project = project_id, count = milestones.len(), "pulled milestones");

    let issues = tracker.list_issues(project_id).map_err(|err| {
        TransferError::query(host, EntityKind::Issue, "list source issues", err)
    })?;
    let issues = sorted(issues, "source issue listing")?;
    info!(project = project_id, count = issues.len(), "pulled issues");

    let progress = ProgressTracker::with_visibility(
        u64::try_from(issues.len()).unwrap_or(u64::MAX),
        "Pulling notes",
        show_progress,
    );
    let mut notes = IssueNotes::new();
    for issue in &issues {
        progress.set_message(format!("issue IID={}", issue.iid));
        let listing = tracker.list_notes(project_id, issue).map_err(|err| {
            TransferError::query(
                host,
                EntityKind::Note,
                format!("list notes of source issue IID {}", issue.iid),
                err,
            )
        })?;
        progress.inc(1);
        if listing.is_empty() {
            continue;
        }
        let set = sorted(listing, format!("notes of source issue IID {}", issue.iid))?;
        debug!(iid = issue.iid, count = set.len(), "pulled notes");
        notes.insert(issue.iid, set);
    }
    progress.finish_and_clear();

    let data = ProjectData {
        project,
        users,
        milestones,
        issues,
        notes,
    };
    info!(project = project_id, notes = data.note_count(), "pull complete");
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Issue, Milestone, Note, State};
    use crate::tracker::InMemoryTracker;

    fn project(id: u64, name: &str) -> Project {
        Project {
            id,
            name: name.to_string(),
            ..Project::default()
        }
    }

    #[test]
    fn exact_name_beats_pattern() {
        let projects = vec![project(1, "core-tools"), project(2, "core")];
        let found = find_project(projects, "core", "h").unwrap();
        assert_eq!(found.id, 2);
    }

    #[test]
    fn pattern_must_match_whole_name() {
        let projects = vec![project(1, "web-core"), project(2, "core-api"), project(3, "core-db")];
        let found = find_project(projects.clone(), "core-.*", "h").unwrap();
        assert_eq!(found.id, 2);
        let err = find_project(projects, "core", "h").unwrap_err();
        assert!(matches!(err, TransferError::ProjectNotFound { .. }));
    }

    #[test]
    fn invalid_pattern_is_not_found() {
        let err = find_project(vec![project(1, "a")], "a(", "https://src").unwrap_err();
        assert!(err.to_string().contains("https://src"));
    }

    #[test]
    fn pull_collects_everything_in_key_order() {
        let tracker = InMemoryTracker::new("https://src");
        let core = tracker.add_project("core");
        tracker.add_user("Ada", "ada");
        for iid in [2, 1] {
            tracker.seed_milestone(
                core.id,
                Milestone {
                    iid,
                    id: 100 + iid,
                    title: format!("v{iid}"),
                    description: None,
                    state: State::Open,
                    due_date: None,
                    start_date: None,
                },
            );
        }
        for iid in [1, 2] {
            tracker.seed_issue(
                core.id,
                Issue {
                    iid,
                    id: 200 + iid,
                    title: format!("issue {iid}"),
                    description: None,
                    labels: Default::default(),
                    state: State::Open,
                    milestone_iid: None,
                },
            );
        }
        tracker.seed_note(
            core.id,
            2,
            Note {
                id: 7,
                body: "hello".to_string(),
                author: None,
                system: false,
            },
        );

        let data = pull(&tracker, "core", false).unwrap();
        assert_eq!(data.project.id, core.id);
        assert_eq!(data.users.len(), 1);
        assert_eq!(data.milestones.keys().collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(data.issues.len(), 2);
        assert_eq!(data.notes.keys().copied().collect::<Vec<_>>(), vec![2]);
    }

    #[test]
    fn unreachable_source_is_a_connection_error() {
        let tracker = InMemoryTracker::new("https://src");
        tracker.add_project("core");
        tracker.set_unreachable(true);
        let err = pull(&tracker, "core", false).unwrap_err();
        assert!(matches!(err, TransferError::Connection { .. }));
    }
}
