//! Staging codec: one side's data set as a fixed set of JSON files.
//!
//! For a prefix `P` the artifacts are `P_project.json`, `P_users.json`,
//! `P_milestones.json`, `P_issues.json` and `P_inotes.json`, plus an
//! optional `P_manifest.json` with per-artifact SHA256 digests.
//!
//! Files are pretty-printed so an operator can inspect or edit them between
//! pull and apply. Milestones and issues are written in IID order, notes
//! grouped by issue IID (ascending) and sorted by note ID.
//!
//! Reading rejects a repeated IID or ID as a data-integrity error instead of
//! keeping one of the copies. A missing manifest is fine; a digest mismatch
//! is logged as an edited artifact.

use crate::error::{Result, ResultExt, TransferError};
use crate::model::{
    EntityKind, Issue, IssueNotes, Milestone, Note, Project, ProjectData, SortedSet, User,
};
use crate::util::sha256_hex;
use chrono::{DateTime, Utc};
use serde::de::{DeserializeOwned, MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::ffi::OsString;
use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// One named staging file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Artifact {
    Project,
    Users,
    Milestones,
    Issues,
    IssueNotes,
    Manifest,
}

impl Artifact {
    /// The five data artifacts, in read order.
    pub const DATA: [Self; 5] = [
        Self::Project,
        Self::Users,
        Self::Milestones,
        Self::Issues,
        Self::IssueNotes,
    ];

    /// File name suffix after the prefix and underscore.
    #[must_use]
    pub const fn suffix(&self) -> &'static str {
        match self {
            Self::Project => "project",
            Self::Users => "users",
            Self::Milestones => "milestones",
            Self::Issues => "issues",
            Self::IssueNotes => "inotes",
            Self::Manifest => "manifest",
        }
    }

    #[must_use]
    pub const fn kind(&self) -> Option<EntityKind> {
        match self {
            Self::Project => Some(EntityKind::Project),
            Self::Users => Some(EntityKind::User),
            Self::Milestones => Some(EntityKind::Milestone),
            Self::Issues => Some(EntityKind::Issue),
            Self::IssueNotes => Some(EntityKind::Note),
            Self::Manifest => None,
        }
    }

    /// Path of this artifact for `prefix`.
    #[must_use]
    pub fn path(&self, prefix: &Path) -> PathBuf {
        let mut name = OsString::from(prefix.as_os_str());
        name.push("_");
        name.push(self.suffix());
        name.push(".json");
        PathBuf::from(name)
    }
}

impl fmt::Display for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.suffix())
    }
}

/// Digest and record count of one artifact as written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactDigest {
    pub sha256: String,
    pub records: usize,
}

/// Contents of `P_manifest.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub version: String,
    pub written_at: DateTime<Utc>,
    /// Keyed by artifact suffix.
    pub artifacts: BTreeMap<String, ArtifactDigest>,
}

/// A data set read back from staging.
#[derive(Debug, Clone)]
pub struct Loaded {
    pub data: ProjectData,
    pub manifest: Option<Manifest>,
    /// Artifacts whose content no longer matches the manifest digest.
    pub edited: Vec<Artifact>,
}

fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
    let mut bytes = serde_json::to_vec_pretty(value)?;
    bytes.push(b'\n');
    Ok(bytes)
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating staging directory {}", parent.display()))?;
    }
    let temp_path = path.with_extension("json.tmp");
    fs::write(&temp_path, bytes)
        .with_context(|| format!("writing {}", temp_path.display()))?;
    fs::rename(&temp_path, path)
        .with_context(|| format!("renaming {} to {}", temp_path.display(), path.display()))?;
    debug!(path = %path.display(), bytes = bytes.len(), "wrote artifact");
    Ok(())
}

/// Write every artifact of `data` under `prefix`, then the manifest.
pub fn save(data: &ProjectData, prefix: &Path) -> Result<Manifest> {
    let encoded = [
        (Artifact::Project, encode(&data.project)?, 1),
        (Artifact::Users, encode(&data.users)?, data.users.len()),
        (
            Artifact::Milestones,
            encode(&data.milestones)?,
            data.milestones.len(),
        ),
        (Artifact::Issues, encode(&data.issues)?, data.issues.len()),
        (Artifact::IssueNotes, encode(&data.notes)?, data.note_count()),
    ];

    let mut artifacts = BTreeMap::new();
    for (artifact, bytes, records) in &encoded {
        write_atomic(&artifact.path(prefix), bytes)?;
        artifacts.insert(
            artifact.suffix().to_string(),
            ArtifactDigest {
                sha256: sha256_hex(bytes),
                records: *records,
            },
        );
    }

    let manifest = Manifest {
        version: env!("CARGO_PKG_VERSION").to_string(),
        written_at: Utc::now(),
        artifacts,
    };
    write_atomic(&Artifact::Manifest.path(prefix), &encode(&manifest)?)?;
    info!(prefix = %prefix.display(), "staged project data");
    Ok(manifest)
}

fn read_artifact(artifact: Artifact, prefix: &Path) -> Result<(PathBuf, Vec<u8>)> {
    let path = artifact.path(prefix);
    match fs::read(&path) {
        Ok(bytes) => Ok((path, bytes)),
        Err(err) if err.kind() == ErrorKind::NotFound => Err(TransferError::ArtifactMissing {
            artifact: artifact.to_string(),
            path,
        }),
        Err(err) => Err(err).with_context(|| format!("reading {}", path.display())),
    }
}

fn decode<T: DeserializeOwned>(artifact: Artifact, path: &Path, bytes: &[u8]) -> Result<T> {
    serde_json::from_slice(bytes).map_err(|err| {
        let kind = artifact.kind().map_or("manifest", |k| k.as_str());
        TransferError::ArtifactMalformed {
            artifact: artifact.to_string(),
            path: path.to_path_buf(),
            reason: format!("{kind} records: {err}"),
        }
    })
}

fn origin(path: &Path) -> String {
    format!("staged artifact {}", path.display())
}

fn into_sorted<T: crate::model::Keyed>(items: Vec<T>, path: &Path) -> Result<SortedSet<T>> {
    SortedSet::try_from_iter(items).map_err(|err| TransferError::duplicate(origin(path), err))
}

/// Raw bytes of each data artifact with the path they were read from.
type StagedFiles = BTreeMap<Artifact, (PathBuf, Vec<u8>)>;

/// `P_inotes.json` entries in file order, duplicate keys kept.
struct NoteEntries(Vec<(u64, Vec<Note>)>);

impl<'de> Deserialize<'de> for NoteEntries {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct EntriesVisitor;

        impl<'de> Visitor<'de> for EntriesVisitor {
            type Value = NoteEntries;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("an object mapping issue IIDs to arrays of notes")
            }

            fn visit_map<A: MapAccess<'de>>(
                self,
                mut map: A,
            ) -> std::result::Result<Self::Value, A::Error> {
                let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some(iid) = map.next_key::<u64>()? {
                    entries.push((iid, map.next_value::<Vec<Note>>()?));
                }
                Ok(NoteEntries(entries))
            }
        }

        deserializer.deserialize_map(EntriesVisitor)
    }
}

/// Issues with an empty note list get no entry.
fn into_issue_notes(entries: NoteEntries, path: &Path) -> Result<IssueNotes> {
    let mut notes = IssueNotes::new();
    let mut seen = BTreeSet::new();
    for (iid, list) in entries.0 {
        if !seen.insert(iid) {
            return Err(TransferError::duplicate(
                origin(path),
                crate::model::collection::DuplicateKey {
                    kind: EntityKind::Issue,
                    key: iid,
                },
            ));
        }
        if list.is_empty() {
            debug!(iid, path = %path.display(), "dropping empty note list");
            continue;
        }
        notes.insert(iid, into_sorted(list, path)?);
    }
    Ok(notes)
}

fn check_manifest(prefix: &Path, raw: &StagedFiles) -> (Option<Manifest>, Vec<Artifact>) {
    let path = Artifact::Manifest.path(prefix);
    let bytes = match fs::read(&path) {
        Ok(bytes) => bytes,
        Err(err) => {
            if err.kind() != ErrorKind::NotFound {
                warn!(path = %path.display(), error = %err, "cannot read staging manifest");
            }
            return (None, Vec::new());
        }
    };
    let manifest: Manifest = match serde_json::from_slice(&bytes) {
        Ok(manifest) => manifest,
        Err(err) => {
            warn!(path = %path.display(), error = %err, "ignoring malformed staging manifest");
            return (None, Vec::new());
        }
    };

    let mut edited = Vec::new();
    for (artifact, (path, bytes)) in raw {
        let Some(expected) = manifest.artifacts.get(artifact.suffix()) else {
            continue;
        };
        if expected.sha256 != sha256_hex(bytes) {
            warn!(
                artifact = %artifact,
                path = %path.display(),
                "artifact changed since it was staged"
            );
            edited.push(*artifact);
        }
    }
    (Some(manifest), edited)
}

fn staged(raw: &StagedFiles, artifact: Artifact) -> Result<(&Path, &[u8])> {
    raw.get(&artifact)
        .map(|(path, bytes)| (path.as_path(), bytes.as_slice()))
        .ok_or_else(|| TransferError::ArtifactMissing {
            artifact: artifact.to_string(),
            path: PathBuf::new(),
        })
}

/// Read and validate every artifact under `prefix`.
///
/// Nothing is returned unless all five data artifacts exist and decode.
pub fn load(prefix: &Path) -> Result<Loaded> {
    let mut raw = StagedFiles::new();
    for artifact in Artifact::DATA {
        raw.insert(artifact, read_artifact(artifact, prefix)?);
    }

    let (path, bytes) = staged(&raw, Artifact::Project)?;
    let project: Project = decode(Artifact::Project, path, bytes)?;

    let (path, bytes) = staged(&raw, Artifact::Users)?;
    let users: Vec<User> = decode(Artifact::Users, path, bytes)?;

    let (path, bytes) = staged(&raw, Artifact::Milestones)?;
    let milestones = into_sorted(decode::<Vec<Milestone>>(Artifact::Milestones, path, bytes)?, path)?;

    let (path, bytes) = staged(&raw, Artifact::Issues)?;
    let issues = into_sorted(decode::<Vec<Issue>>(Artifact::Issues, path, bytes)?, path)?;

    let (path, bytes) = staged(&raw, Artifact::IssueNotes)?;
    let notes = into_issue_notes(decode::<NoteEntries>(Artifact::IssueNotes, path, bytes)?, path)?;

    let known: BTreeSet<u64> = issues.keys().collect();
    for iid in notes.keys().filter(|iid| !known.contains(iid)) {
        warn!(iid, "staged notes reference an issue missing from the issues artifact");
    }

    let (manifest, edited) = check_manifest(prefix, &raw);
    let data = ProjectData {
        project,
        users,
        milestones,
        issues,
        notes,
    };
    info!(
        prefix = %prefix.display(),
        milestones = data.milestones.len(),
        issues = data.issues.len(),
        notes = data.note_count(),
        "loaded staged project data"
    );
    Ok(Loaded {
        data,
        manifest,
        edited,
    })
}
