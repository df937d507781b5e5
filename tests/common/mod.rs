#![allow(dead_code)]

use gitlab_transfer::model::{Issue, IssueNotes, Milestone, Note, Project, ProjectData, SortedSet, State, User};
use std::sync::Once;
use std::time::Instant;
use tracing::info;

pub mod cli;

static INIT: Once = Once::new();

pub fn init_test_logging() {
    INIT.call_once(|| {
        gitlab_transfer::logging::init_test_logging();
    });
}

pub struct TestLogGuard {
    name: String,
    start: Instant,
}

impl TestLogGuard {
    fn new(name: &str) -> Self {
        init_test_logging();
        info!("{name}: starting");
        Self {
            name: name.to_string(),
            start: Instant::now(),
        }
    }
}

impl Drop for TestLogGuard {
    fn drop(&mut self) {
        info!(
            "{}: assertions passed (elapsed {:?})",
            self.name,
            self.start.elapsed()
        );
    }
}

pub fn test_log(name: &str) -> TestLogGuard {
    TestLogGuard::new(name)
}

pub fn milestone(iid: u64, id: u64, title: &str, state: State) -> Milestone {
    Milestone {
        iid,
        id,
        title: title.to_string(),
        description: Some(format!("{title} scope")),
        state,
        due_date: None,
        start_date: None,
    }
}

pub fn issue(iid: u64, id: u64, title: &str, state: State, milestone_iid: Option<u64>) -> Issue {
    Issue {
        iid,
        id,
        title: title.to_string(),
        description: Some(format!("{title} details")),
        labels: ["bug".to_string(), "backend".to_string()].into_iter().collect(),
        state,
        milestone_iid,
    }
}

pub fn note(id: u64, body: &str) -> Note {
    Note {
        id,
        body: body.to_string(),
        author: Some(User {
            id: 3,
            name: "Ada".to_string(),
            username: Some("ada".to_string()),
        }),
        system: false,
    }
}

/// A small data set: two milestones, three issues, notes on two of them.
pub fn sample_data() -> ProjectData {
    let milestones = SortedSet::try_from_iter([
        milestone(1, 11, "v1", State::Open),
        milestone(2, 12, "v2", State::Closed),
    ])
    .expect("unique milestones");
    let issues = SortedSet::try_from_iter([
        issue(1, 21, "crash on start", State::Open, Some(1)),
        issue(2, 22, "slow sync", State::Closed, Some(2)),
        issue(3, 23, "typo", State::Open, None),
    ])
    .expect("unique issues");
    let mut notes = IssueNotes::new();
    notes.insert(
        1,
        SortedSet::try_from_iter([note(101, "repro attached"), note(102, "fixed on main")])
            .expect("unique notes"),
    );
    notes.insert(
        3,
        SortedSet::try_from_iter([note(103, "trivial")]).expect("unique notes"),
    );

    ProjectData {
        project: Project {
            id: 7,
            name: "core".to_string(),
            path_with_namespace: Some("tools/core".to_string()),
            ..Project::default()
        },
        users: vec![User {
            id: 3,
            name: "Ada".to_string(),
            username: Some("ada".to_string()),
        }],
        milestones,
        issues,
        notes,
    }
}
