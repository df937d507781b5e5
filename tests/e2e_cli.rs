mod common;

use common::cli::{GltWorkspace, run_glt};
use gitlab_transfer::staging::{self, Artifact};
use serde_json::Value;
use std::fs;

fn staged_workspace() -> GltWorkspace {
    let workspace = GltWorkspace::new();
    staging::save(&common::sample_data(), &workspace.prefix()).expect("stage sample data");
    workspace
}

fn error_json(stderr: &str) -> Value {
    let start = stderr.find('{').expect("json on stderr");
    let end = stderr.rfind('}').expect("json on stderr");
    serde_json::from_str(&stderr[start..=end]).expect("parse error json")
}

#[test]
fn e2e_readsrc_lists_staged_data() {
    let _log = common::test_log("e2e_readsrc_lists_staged_data");
    let workspace = staged_workspace();
    let prefix = workspace.prefix();

    let run = run_glt(&workspace, ["readsrc", "--dest-prefix", prefix.to_str().unwrap()]);
    assert!(run.status.success(), "readsrc failed: {}", run.stderr);
    assert!(run.stdout.contains("Found Project: core, ID=7"), "{}", run.stdout);
    assert!(run.stdout.contains("IID=1, Title=crash on start, Notes=2"));
    assert!(run.stdout.contains("IID=2, Title=slow sync, Notes=0"));
    assert!(run.stdout.contains("IID=2, Title=v2"));
}

#[test]
fn e2e_prefix_comes_from_project_config() {
    let workspace = staged_workspace();
    fs::write(
        workspace.root.join("glt.yaml"),
        "staging:\n  destination-prefix: stage\n",
    )
    .unwrap();

    let run = run_glt(&workspace, ["readsrc"]);
    assert!(run.status.success(), "readsrc failed: {}", run.stderr);
    assert!(run.stdout.contains("Read stage_*.json"), "{}", run.stdout);
}

#[test]
fn e2e_json_output_is_one_object_per_step() {
    let workspace = staged_workspace();
    let prefix = workspace.prefix();

    let run = run_glt(
        &workspace,
        ["--json", "readsrc", "--dest-prefix", prefix.to_str().unwrap()],
    );
    assert!(run.status.success(), "readsrc failed: {}", run.stderr);
    let lines: Vec<&str> = run.stdout.lines().collect();
    assert_eq!(lines.len(), 1);
    let value: Value = serde_json::from_str(lines[0]).unwrap();
    assert_eq!(value["step"], "readsrc");
    assert_eq!(value["output"]["result"], "loaded");
    assert_eq!(value["output"]["summary"]["notes"], 3);
}

#[test]
fn e2e_missing_artifact_exits_with_staging_code() {
    let _log = common::test_log("e2e_missing_artifact_exits_with_staging_code");
    let workspace = staged_workspace();
    let prefix = workspace.prefix();
    fs::remove_file(Artifact::IssueNotes.path(&prefix)).unwrap();

    let run = run_glt(&workspace, ["readsrc", "--dest-prefix", prefix.to_str().unwrap()]);
    assert_eq!(run.code(), Some(4), "stderr: {}", run.stderr);
    let error = error_json(&run.stderr);
    assert_eq!(error["error"]["code"], "ARTIFACT_MISSING");
    assert_eq!(error["error"]["context"]["step"], "readsrc");
    assert!(run.stdout.is_empty());
}

#[test]
fn e2e_apply_before_load_is_out_of_order() {
    let workspace = GltWorkspace::new();

    let run = run_glt(&workspace, ["putmile"]);
    assert_eq!(run.code(), Some(5), "stderr: {}", run.stderr);
    let error = error_json(&run.stderr);
    assert_eq!(error["error"]["code"], "STEP_OUT_OF_ORDER");
    assert!(!workspace.root.join("sourceProjectData_audit.jsonl").exists());
}

#[test]
fn e2e_unknown_step_runs_nothing() {
    let workspace = staged_workspace();
    let prefix = workspace.prefix();

    let run = run_glt(
        &workspace,
        ["readsrc", "putmilestones", "--dest-prefix", prefix.to_str().unwrap()],
    );
    assert_eq!(run.code(), Some(5), "stderr: {}", run.stderr);
    let error = error_json(&run.stderr);
    assert_eq!(error["error"]["code"], "UNKNOWN_STEP");
    assert!(run.stdout.is_empty(), "{}", run.stdout);
}

#[test]
fn e2e_missing_destination_settings_is_config_error() {
    let workspace = staged_workspace();
    let prefix = workspace.prefix();

    let run = run_glt(
        &workspace,
        ["readsrc", "setdestproj", "--dest-prefix", prefix.to_str().unwrap()],
    );
    assert_eq!(run.code(), Some(7), "stderr: {}", run.stderr);
    let error = error_json(&run.stderr);
    assert_eq!(error["error"]["code"], "CONFIG_ERROR");
    assert!(run.stdout.contains("Found Project: core"));
}
