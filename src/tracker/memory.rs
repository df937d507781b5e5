//! In-process tracker.
//!
//! Behaves like a tracker instance for the calls the migration makes:
//! IIDs are assigned per project, IDs globally, and listings come back in
//! creation order. Clones share state, so a test can hand one clone to the
//! engine and inspect the result through another.

use super::{NewIssue, NewMilestone, StateEvent, Tracker, TrackerError, TrackerResult};
use crate::model::{Issue, Milestone, Note, Project, State, User};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

const FIRST_ID: u64 = 1000;

#[derive(Debug, Default)]
struct ProjectState {
    project: Project,
    milestones: Vec<Milestone>,
    issues: Vec<Issue>,
    notes: BTreeMap<u64, Vec<Note>>,
}

impl ProjectState {
    fn next_milestone_iid(&self) -> u64 {
        self.milestones.iter().map(|m| m.iid).max().unwrap_or(0) + 1
    }

    fn next_issue_iid(&self) -> u64 {
        self.issues.iter().map(|i| i.iid).max().unwrap_or(0) + 1
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    users: Vec<User>,
    projects: Vec<ProjectState>,
    assignees: BTreeMap<u64, u64>,
    next_id: u64,
    writes: usize,
    fail_writes_after: Option<usize>,
    unreachable: bool,
}

/// A [`Tracker`] held entirely in memory.
#[derive(Debug, Clone)]
pub struct InMemoryTracker {
    host: String,
    state: Rc<RefCell<MemoryState>>,
}

impl InMemoryTracker {
    #[must_use]
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            state: Rc::new(RefCell::new(MemoryState {
                next_id: FIRST_ID,
                ..MemoryState::default()
            })),
        }
    }

    fn allocate_id(state: &mut MemoryState) -> u64 {
        let id = state.next_id;
        state.next_id += 1;
        id
    }

    /// Register a project and return it with its assigned ID.
    pub fn add_project(&self, name: &str) -> Project {
        let mut state = self.state.borrow_mut();
        let project = Project {
            id: Self::allocate_id(&mut state),
            name: name.to_string(),
            path_with_namespace: Some(format!("group/{name}")),
            ..Project::default()
        };
        state.projects.push(ProjectState {
            project: project.clone(),
            ..ProjectState::default()
        });
        project
    }

    pub fn add_user(&self, name: &str, username: &str) -> User {
        let mut state = self.state.borrow_mut();
        let user = User {
            id: Self::allocate_id(&mut state),
            name: name.to_string(),
            username: Some(username.to_string()),
        };
        state.users.push(user.clone());
        user
    }

    /// Store a milestone exactly as given, IID and ID included.
    pub fn seed_milestone(&self, project_id: u64, milestone: Milestone) {
        let mut state = self.state.borrow_mut();
        state.next_id = state.next_id.max(milestone.id + 1);
        if let Some(project) = state
            .projects
            .iter_mut()
            .find(|p| p.project.id == project_id)
        {
            project.milestones.push(milestone);
        }
    }

    /// Store an issue exactly as given, IID and ID included.
    pub fn seed_issue(&self, project_id: u64, issue: Issue) {
        let mut state = self.state.borrow_mut();
        state.next_id = state.next_id.max(issue.id + 1);
        if let Some(project) = state
            .projects
            .iter_mut()
            .find(|p| p.project.id == project_id)
        {
            project.issues.push(issue);
        }
    }

    /// Store a note on the issue with the given IID.
    pub fn seed_note(&self, project_id: u64, issue_iid: u64, note: Note) {
        let mut state = self.state.borrow_mut();
        state.next_id = state.next_id.max(note.id + 1);
        if let Some(project) = state
            .projects
            .iter_mut()
            .find(|p| p.project.id == project_id)
        {
            project.notes.entry(issue_iid).or_default().push(note);
        }
    }

    /// Let `count` more creates or edits succeed, then reject every write.
    pub fn fail_writes_after(&self, count: usize) {
        let mut state = self.state.borrow_mut();
        state.fail_writes_after = Some(state.writes + count);
    }

    /// Make every call fail as if the host could not be reached.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.state.borrow_mut().unreachable = unreachable;
    }

    /// Number of successful creates and edits so far.
    #[must_use]
    pub fn write_count(&self) -> usize {
        self.state.borrow().writes
    }

    #[must_use]
    pub fn milestones(&self, project_id: u64) -> Vec<Milestone> {
        self.with_project(project_id, |p| p.milestones.clone())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn issues(&self, project_id: u64) -> Vec<Issue> {
        self.with_project(project_id, |p| p.issues.clone())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn notes(&self, project_id: u64, issue_iid: u64) -> Vec<Note> {
        self.with_project(project_id, |p| {
            p.notes.get(&issue_iid).cloned().unwrap_or_default()
        })
        .unwrap_or_default()
    }

    /// Assignee recorded when the issue with this ID was created.
    #[must_use]
    pub fn assignee(&self, issue_id: u64) -> Option<u64> {
        self.state.borrow().assignees.get(&issue_id).copied()
    }

    fn with_project<R>(&self, project_id: u64, f: impl FnOnce(&ProjectState) -> R) -> Option<R> {
        let state = self.state.borrow();
        state
            .projects
            .iter()
            .find(|p| p.project.id == project_id)
            .map(f)
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v4{path}", self.host)
    }

    fn check_reachable(&self, path: &str) -> TrackerResult<()> {
        if self.state.borrow().unreachable {
            return Err(TrackerError::Unreachable {
                url: self.url(path),
                reason: "connection refused".to_string(),
            });
        }
        Ok(())
    }

    fn read<R>(
        &self,
        project_id: u64,
        path: &str,
        f: impl FnOnce(&ProjectState) -> TrackerResult<R>,
    ) -> TrackerResult<R> {
        self.check_reachable(path)?;
        let state = self.state.borrow();
        let project = state
            .projects
            .iter()
            .find(|p| p.project.id == project_id)
            .ok_or_else(|| TrackerError::NotFound {
                url: self.url(&format!("/projects/{project_id}")),
            })?;
        f(project)
    }

    /// One destination write. `f` receives the ID the new record gets; the
    /// counter only advances when `allocates_id` is set and `f` succeeds.
    fn write<R>(
        &mut self,
        project_id: u64,
        path: &str,
        allocates_id: bool,
        f: impl FnOnce(&mut ProjectState, u64) -> TrackerResult<R>,
    ) -> TrackerResult<R> {
        self.check_reachable(path)?;
        let url = self.url(path);
        let mut state = self.state.borrow_mut();
        if state.fail_writes_after.is_some_and(|limit| state.writes >= limit) {
            return Err(TrackerError::Api {
                url,
                status: 500,
                message: "injected write failure".to_string(),
            });
        }
        let MemoryState {
            projects,
            next_id,
            writes,
            ..
        } = &mut *state;
        let project = projects
            .iter_mut()
            .find(|p| p.project.id == project_id)
            .ok_or(TrackerError::NotFound { url })?;
        let result = f(project, *next_id)?;
        if allocates_id {
            *next_id += 1;
        }
        *writes += 1;
        Ok(result)
    }
}

impl Tracker for InMemoryTracker {
    fn host(&self) -> &str {
        &self.host
    }

    fn list_users(&self) -> TrackerResult<Vec<User>> {
        self.check_reachable("/users")?;
        Ok(self.state.borrow().users.clone())
    }

    fn list_projects(&self) -> TrackerResult<Vec<Project>> {
        self.check_reachable("/projects")?;
        Ok(self
            .state
            .borrow()
            .projects
            .iter()
            .map(|p| p.project.clone())
            .collect())
    }

    fn list_milestones(&self, project_id: u64) -> TrackerResult<Vec<Milestone>> {
        let path = format!("/projects/{project_id}/milestones");
        self.read(project_id, &path, |p| Ok(p.milestones.clone()))
    }

    fn create_milestone(
        &mut self,
        project_id: u64,
        milestone: &NewMilestone,
    ) -> TrackerResult<Milestone> {
        let path = format!("/projects/{project_id}/milestones");
        self.write(project_id, &path, true, |p, id| {
            let created = Milestone {
                iid: p.next_milestone_iid(),
                id,
                title: milestone.title.clone(),
                description: milestone.description.clone(),
                state: State::Open,
                due_date: milestone.due_date.clone(),
                start_date: milestone.start_date.clone(),
            };
            p.milestones.push(created.clone());
            Ok(created)
        })
    }

    fn list_issues(&self, project_id: u64) -> TrackerResult<Vec<Issue>> {
        let path = format!("/projects/{project_id}/issues");
        self.read(project_id, &path, |p| Ok(p.issues.clone()))
    }

    fn get_issue(&self, project_id: u64, id: u64) -> TrackerResult<Issue> {
        let path = format!("/projects/{project_id}/issues?id={id}");
        let url = self.url(&path);
        self.read(project_id, &path, |p| {
            p.issues
                .iter()
                .find(|i| i.id == id)
                .cloned()
                .ok_or(TrackerError::NotFound { url })
        })
    }

    fn create_issue(&mut self, project_id: u64, issue: &NewIssue) -> TrackerResult<Issue> {
        let path = format!("/projects/{project_id}/issues");
        let url = self.url(&path);
        let created = self.write(project_id, &path, true, |p, id| {
            let milestone_iid = match issue.milestone_id {
                Some(milestone_id) => Some(
                    p.milestones
                        .iter()
                        .find(|m| m.id == milestone_id)
                        .map(|m| m.iid)
                        .ok_or_else(|| TrackerError::Api {
                            url,
                            status: 400,
                            message: format!("milestone {milestone_id} does not exist"),
                        })?,
                ),
                None => None,
            };
            let created = Issue {
                iid: p.next_issue_iid(),
                id,
                title: issue.title.clone(),
                description: issue.description.clone(),
                labels: issue
                    .labels
                    .split(',')
                    .map(str::trim)
                    .filter(|l| !l.is_empty())
                    .map(ToString::to_string)
                    .collect(),
                state: State::Open,
                milestone_iid,
            };
            p.issues.push(created.clone());
            Ok(created)
        })?;
        self.state
            .borrow_mut()
            .assignees
            .insert(created.id, issue.assignee_id);
        Ok(created)
    }

    fn edit_issue(
        &mut self,
        project_id: u64,
        issue: &Issue,
        event: StateEvent,
    ) -> TrackerResult<Issue> {
        let path = format!("/projects/{project_id}/issues/{}", issue.iid);
        let url = self.url(&path);
        self.write(project_id, &path, false, |p, _| {
            let stored = p
                .issues
                .iter_mut()
                .find(|i| i.iid == issue.iid)
                .ok_or(TrackerError::NotFound { url })?;
            if event == StateEvent::Close {
                stored.state = State::Closed;
            }
            Ok(stored.clone())
        })
    }

    fn list_notes(&self, project_id: u64, issue: &Issue) -> TrackerResult<Vec<Note>> {
        let path = format!("/projects/{project_id}/issues/{}/notes", issue.iid);
        self.read(project_id, &path, |p| {
            Ok(p.notes.get(&issue.iid).cloned().unwrap_or_default())
        })
    }

    fn create_note(&mut self, project_id: u64, issue: &Issue, body: &str) -> TrackerResult<Note> {
        let path = format!("/projects/{project_id}/issues/{}/notes", issue.iid);
        let url = self.url(&path);
        self.write(project_id, &path, true, |p, id| {
            if !p.issues.iter().any(|i| i.iid == issue.iid) {
                return Err(TrackerError::NotFound { url });
            }
            let note = Note {
                id,
                body: body.to_string(),
                author: None,
                system: false,
            };
            p.notes.entry(issue.iid).or_default().push(note.clone());
            Ok(note)
        })
    }
}
