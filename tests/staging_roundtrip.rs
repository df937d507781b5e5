//! Staging artifacts written by `save` and read back by `load`.

mod common;

use gitlab_transfer::TransferError;
use gitlab_transfer::model::{ProjectData, SortedSet, State};
use gitlab_transfer::staging::{self, Artifact};
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

use common::{milestone, sample_data};

fn staged(data: &ProjectData) -> (TempDir, PathBuf) {
    let dir = TempDir::new().unwrap();
    let prefix = dir.path().join("stage");
    staging::save(data, &prefix).unwrap();
    (dir, prefix)
}

#[test]
fn milestone_sets_round_trip_in_iid_order() {
    let _log = common::test_log("milestone_sets_round_trip_in_iid_order");
    for n in [0_u64, 1, 100] {
        // Insert in descending order; the set sorts on construction.
        let milestones = SortedSet::try_from_iter(
            (1..=n)
                .rev()
                .map(|iid| milestone(iid, 1000 + iid, &format!("m{iid}"), State::Open)),
        )
        .unwrap();
        let data = ProjectData {
            milestones,
            ..sample_data()
        };

        let (_dir, prefix) = staged(&data);
        let loaded = staging::load(&prefix).unwrap();

        assert_eq!(loaded.data.milestones, data.milestones, "n = {n}");
        assert_eq!(
            loaded.data.milestones.keys().collect::<Vec<_>>(),
            (1..=n).collect::<Vec<_>>()
        );
    }
}

#[test]
fn full_data_set_round_trips() {
    let _log = common::test_log("full_data_set_round_trips");
    let data = sample_data();
    let (_dir, prefix) = staged(&data);
    let loaded = staging::load(&prefix).unwrap();

    assert_eq!(loaded.data, data);
    assert!(loaded.manifest.is_some());
    assert!(loaded.edited.is_empty());
}

#[test]
fn duplicate_issue_iid_is_rejected() {
    let _log = common::test_log("duplicate_issue_iid_is_rejected");
    let (_dir, prefix) = staged(&sample_data());
    let path = Artifact::Issues.path(&prefix);
    let mut issues: Vec<serde_json::Value> =
        serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    let mut copy = issues[0].clone();
    copy["title"] = serde_json::json!("same iid, other title");
    issues.push(copy);
    fs::write(&path, serde_json::to_string_pretty(&issues).unwrap()).unwrap();

    let err = staging::load(&prefix).unwrap_err();
    assert!(matches!(err, TransferError::DuplicateKey { .. }), "{err}");
    assert_eq!(err.exit_code(), 3);
}

#[test]
fn duplicate_note_id_within_an_issue_is_rejected() {
    let (_dir, prefix) = staged(&sample_data());
    let path = Artifact::IssueNotes.path(&prefix);
    fs::write(
        &path,
        r#"{"1": [{"id": 5, "body": "a"}, {"id": 5, "body": "b"}]}"#,
    )
    .unwrap();

    let err = staging::load(&prefix).unwrap_err();
    assert!(matches!(err, TransferError::DuplicateKey { .. }), "{err}");
}

#[test]
fn empty_note_lists_are_dropped_on_load() {
    let (_dir, prefix) = staged(&sample_data());
    fs::write(
        Artifact::IssueNotes.path(&prefix),
        r#"{"1": [{"id": 5, "body": "a"}], "2": []}"#,
    )
    .unwrap();

    let loaded = staging::load(&prefix).unwrap();
    assert_eq!(loaded.data.notes.keys().copied().collect::<Vec<_>>(), vec![1]);
}

#[test]
fn repeated_issue_key_is_rejected_even_when_empty() {
    let (_dir, prefix) = staged(&sample_data());
    fs::write(
        Artifact::IssueNotes.path(&prefix),
        r#"{"2": [], "2": [{"id": 5, "body": "a"}]}"#,
    )
    .unwrap();

    let err = staging::load(&prefix).unwrap_err();
    assert!(matches!(err, TransferError::DuplicateKey { .. }), "{err}");
}

#[test]
fn missing_artifact_is_named() {
    let _log = common::test_log("missing_artifact_is_named");
    let (_dir, prefix) = staged(&sample_data());
    fs::remove_file(Artifact::Milestones.path(&prefix)).unwrap();

    let err = staging::load(&prefix).unwrap_err();
    match &err {
        TransferError::ArtifactMissing { artifact, path } => {
            assert_eq!(artifact, "milestones");
            assert_eq!(path, &Artifact::Milestones.path(&prefix));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(err.exit_code(), 4);
}

#[test]
fn malformed_artifact_names_artifact_and_kind() {
    let (_dir, prefix) = staged(&sample_data());
    fs::write(Artifact::Issues.path(&prefix), "[{\"iid\": \"one\"}]").unwrap();

    let err = staging::load(&prefix).unwrap_err();
    match &err {
        TransferError::ArtifactMalformed {
            artifact, reason, ..
        } => {
            assert_eq!(artifact, "issues");
            assert!(reason.starts_with("issue records"), "{reason}");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn unknown_issue_state_is_malformed() {
    let (_dir, prefix) = staged(&sample_data());
    let path = Artifact::Issues.path(&prefix);
    let edited = fs::read_to_string(&path)
        .unwrap()
        .replace("\"closed\"", "\"archived\"");
    fs::write(&path, edited).unwrap();

    let err = staging::load(&prefix).unwrap_err();
    assert!(matches!(err, TransferError::ArtifactMalformed { .. }), "{err}");
}

#[test]
fn hand_edit_is_reported_but_accepted() {
    let _log = common::test_log("hand_edit_is_reported_but_accepted");
    let (_dir, prefix) = staged(&sample_data());
    let path = Artifact::Milestones.path(&prefix);
    let edited = fs::read_to_string(&path).unwrap().replace("v1 scope", "v1 (trimmed)");
    fs::write(&path, edited).unwrap();

    let loaded = staging::load(&prefix).unwrap();
    assert_eq!(loaded.edited, vec![Artifact::Milestones]);
    assert_eq!(
        loaded.data.milestones.get(1).unwrap().description.as_deref(),
        Some("v1 (trimmed)")
    );
}

#[test]
fn missing_manifest_is_fine() {
    let (_dir, prefix) = staged(&sample_data());
    fs::remove_file(Artifact::Manifest.path(&prefix)).unwrap();

    let loaded = staging::load(&prefix).unwrap();
    assert!(loaded.manifest.is_none());
    assert!(loaded.edited.is_empty());
}

#[test]
fn project_extra_fields_survive_staging() {
    let mut data = sample_data();
    data.project
        .extra
        .insert("star_count".to_string(), serde_json::json!(12));
    let (_dir, prefix) = staged(&data);

    let loaded = staging::load(&prefix).unwrap();
    assert_eq!(loaded.data.project.extra["star_count"], 12);
}
