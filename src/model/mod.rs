//! Core data types for `gitlab_transfer`.
//!
//! This module defines the entities pulled from one tracker and replayed into
//! another:
//! - `Project` - The project both sides are scoped to
//! - `User` - Read-only tracker accounts
//! - `Milestone` - Project-scoped milestones, keyed by IID
//! - `Issue` - Project-scoped issues, keyed by IID
//! - `Note` - Discussion notes on an issue, keyed by ID
//!
//! Every milestone and issue carries two numbers: the IID, a sequence number
//! unique only within its project, and the ID, assigned globally by the
//! owning tracker instance. Only the IID survives a migration.

pub mod collection;

pub use collection::{IssueNotes, Keyed, SortedSet};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

#[allow(clippy::trivially_copy_pass_by_ref)]
const fn is_false(b: &bool) -> bool {
    !*b
}

/// Entity kinds, used for error reporting, logging and the audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Project,
    User,
    Milestone,
    Issue,
    Note,
}

impl EntityKind {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Project => "project",
            Self::User => "user",
            Self::Milestone => "milestone",
            Self::Issue => "issue",
            Self::Note => "note",
        }
    }

    /// Name of the number used to key this kind inside its collection.
    #[must_use]
    pub const fn key_name(&self) -> &'static str {
        match self {
            Self::Milestone | Self::Issue => "IID",
            Self::Project | Self::User | Self::Note => "ID",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Open/closed lifecycle shared by milestones and issues.
///
/// Staged as `"open"` / `"closed"`. Parsing also accepts the values the
/// tracker API reports (`opened`, `reopened`, `active`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum State {
    #[default]
    Open,
    Closed,
}

impl State {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Closed => "closed",
        }
    }

    #[must_use]
    pub const fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for State {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "open" | "opened" | "reopened" | "active" => Ok(Self::Open),
            "closed" => Ok(Self::Closed),
            other => Err(format!(
                "invalid state '{other}': expected one of open, opened, reopened, active, closed"
            )),
        }
    }
}

impl Serialize for State {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for State {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        value.parse().map_err(serde::de::Error::custom)
    }
}

/// The project a data set belongs to.
///
/// Only `id` and `name` are interpreted. Namespace, visibility and any other
/// field the tracker reports are carried through staging untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Project {
    pub id: u64,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path_with_namespace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visibility: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A tracker account. Users are listed, never remapped.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub id: u64,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

/// A project milestone.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Milestone {
    /// Project-scoped sequence number.
    pub iid: u64,
    /// Identifier assigned by the owning tracker instance.
    pub id: u64,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub state: State,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
}

/// A project issue.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Issue {
    /// Project-scoped sequence number.
    pub iid: u64,
    /// Identifier assigned by the owning tracker instance.
    pub id: u64,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Unordered label set; kept sorted for stable staging output.
    #[serde(default, skip_serializing_if = "std::collections::BTreeSet::is_empty")]
    pub labels: std::collections::BTreeSet<String>,
    #[serde(default)]
    pub state: State,
    /// IID of the referenced milestone, never its ID.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub milestone_iid: Option<u64>,
}

impl Issue {
    /// Labels in the comma-separated form the tracker's create call takes.
    #[must_use]
    pub fn label_string(&self) -> String {
        self.labels
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// A discussion note attached to an issue.
///
/// Notes have no IID; their global ID increases with creation time and is
/// used to order them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Note {
    pub id: u64,
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<User>,
    /// Generated by the tracker (label changes, mentions) rather than a person.
    #[serde(default, skip_serializing_if = "is_false")]
    pub system: bool,
}

/// Global identifier accessor shared by milestones and issues.
pub trait Identified {
    fn id(&self) -> u64;
    fn title(&self) -> &str;
}

impl Identified for Milestone {
    fn id(&self) -> u64 {
        self.id
    }

    fn title(&self) -> &str {
        &self.title
    }
}

impl Identified for Issue {
    fn id(&self) -> u64 {
        self.id
    }

    fn title(&self) -> &str {
        &self.title
    }
}

/// One side's complete data set: what a pull produces and staging persists.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProjectData {
    pub project: Project,
    pub users: Vec<User>,
    pub milestones: SortedSet<Milestone>,
    pub issues: SortedSet<Issue>,
    pub notes: IssueNotes,
}

impl ProjectData {
    /// Total number of notes across all issues.
    #[must_use]
    pub fn note_count(&self) -> usize {
        self.notes.values().map(SortedSet::len).sum()
    }
}
