//! What each step hands back to the caller for display.

use crate::config::Side;
use crate::model::{Project, ProjectData, User};
use crate::reconcile::{NotesReport, ReconcileReport};
use crate::staging::Manifest;
use serde::Serialize;
use std::path::PathBuf;

/// One milestone or issue in a listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Listed {
    pub iid: u64,
    pub id: u64,
    pub title: String,
    /// Notes staged for this issue; always zero for milestones.
    pub notes: usize,
}

/// Overview of a pulled or loaded data set.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataSummary {
    pub project: Project,
    pub users: usize,
    pub milestones: Vec<Listed>,
    pub issues: Vec<Listed>,
    pub notes: usize,
}

impl DataSummary {
    #[must_use]
    pub fn of(data: &ProjectData) -> Self {
        Self {
            project: data.project.clone(),
            users: data.users.len(),
            milestones: data
                .milestones
                .iter()
                .map(|m| Listed {
                    iid: m.iid,
                    id: m.id,
                    title: m.title.clone(),
                    notes: 0,
                })
                .collect(),
            issues: data
                .issues
                .iter()
                .map(|i| Listed {
                    iid: i.iid,
                    id: i.id,
                    title: i.title.clone(),
                    notes: data.notes.get(&i.iid).map_or(0, |set| set.len()),
                })
                .collect(),
            notes: data.note_count(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum StepOutput {
    Users {
        side: Side,
        users: Vec<User>,
    },
    Projects {
        side: Side,
        projects: Vec<Project>,
    },
    Pulled {
        prefix: PathBuf,
        summary: DataSummary,
        manifest: Manifest,
    },
    Loaded {
        prefix: PathBuf,
        summary: DataSummary,
        /// Artifacts changed since they were written.
        edited: Vec<String>,
    },
    DestinationProject {
        project: Project,
    },
    Reconciled(ReconcileReport),
    NotesAppended(NotesReport),
}
