//! End-to-end CLI workflow tests.
//!
//! Each test runs the `lanes` binary as a subprocess in an isolated temp
//! directory.

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use std::path::Path;
use tempfile::TempDir;

// ---------------------------------------------------------------------------
// Test Harness
// ---------------------------------------------------------------------------

fn lanes(dir: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("lanes"));
    cmd.current_dir(dir);
    cmd.env("LANES_LOG", "error");
    cmd.env_remove("LANES_FORMAT");
    cmd
}

fn init(dir: &Path) {
    lanes(dir).args(["init"]).assert().success();
}

fn json_of(cmd: &mut Command) -> Value {
    let output = cmd.output().expect("command should not crash");
    assert!(
        output.status.success(),
        "command failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("valid JSON on stdout")
}

/// Create a ticket and return its key.
fn create(dir: &Path, summary: &str, extra: &[&str]) -> String {
    let mut args = vec!["create", "--summary", summary, "--json"];
    args.extend_from_slice(extra);
    let json = json_of(lanes(dir).args(&args));
    json["key"].as_str().expect("key field").to_string()
}

fn status_of(dir: &Path, key: &str) -> String {
    let json = json_of(lanes(dir).args(["show", key, "--json"]));
    json["status"].as_str().expect("status field").to_string()
}

// ---------------------------------------------------------------------------
// Setup
// ---------------------------------------------------------------------------

#[test]
fn commands_outside_a_project_report_not_initialized() {
    let dir = TempDir::new().unwrap();
    lanes(dir.path())
        .args(["board", "--json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("E1001"));
}

#[test]
fn init_twice_requires_force() {
    let dir = TempDir::new().unwrap();
    init(dir.path());
    assert!(dir.path().join(".lanes/config.toml").exists());
    assert!(dir.path().join(".lanes/lanes.db").exists());

    lanes(dir.path())
        .args(["init"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));
    lanes(dir.path()).args(["init", "--force"]).assert().success();
}

#[test]
fn keys_are_numbered_with_the_configured_prefix() {
    let dir = TempDir::new().unwrap();
    lanes(dir.path())
        .args(["init", "--project", "SHOP", "--prefix", "SH"])
        .assert()
        .success();
    assert_eq!(create(dir.path(), "First", &[]), "SH-1");
    assert_eq!(create(dir.path(), "Second", &[]), "SH-2");
}

// ---------------------------------------------------------------------------
// Workflow
// ---------------------------------------------------------------------------

#[test]
fn finishing_last_child_completes_parent() {
    let dir = TempDir::new().unwrap();
    init(dir.path());
    let story = create(dir.path(), "Story", &["-t", "story", "--status", "in-progress"]);
    let task = create(
        dir.path(),
        "Task",
        &["--status", "in-progress", "--parent", &story],
    );

    let json = json_of(lanes(dir.path()).args(["move", &task, "done", "--json"]));
    let changes = json["changes"].as_array().expect("changes");
    assert_eq!(changes.len(), 2);
    assert_eq!(changes[1]["key"], story.as_str());
    assert_eq!(changes[1]["cascaded"], true);

    assert_eq!(status_of(dir.path(), &story), "done");
}

#[test]
fn parent_cannot_finish_before_children() {
    let dir = TempDir::new().unwrap();
    init(dir.path());
    let story = create(dir.path(), "Story", &["--status", "in-progress"]);
    create(dir.path(), "Done child", &["--status", "done", "--parent", &story]);
    let open = create(
        dir.path(),
        "Open child",
        &["--status", "in-progress", "--parent", &story],
    );

    lanes(dir.path())
        .args(["move", &story, "done"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("E2003"))
        .stderr(predicate::str::contains(open.as_str()));

    assert_eq!(status_of(dir.path(), &story), "in-progress");
}

#[test]
fn moving_child_back_pulls_parent_back() {
    let dir = TempDir::new().unwrap();
    init(dir.path());
    let feature = create(dir.path(), "Feature", &["-t", "feature", "--status", "review"]);
    let task = create(dir.path(), "Task", &["--status", "review", "--parent", &feature]);
    create(dir.path(), "Sibling", &["--status", "done", "--parent", &feature]);

    lanes(dir.path())
        .args(["move", &task, "todo"])
        .assert()
        .success()
        .stdout(predicate::str::contains(format!("{feature}\treview\ttodo")));

    assert_eq!(status_of(dir.path(), &feature), "todo");
}

#[test]
fn duplicate_key_is_rejected() {
    let dir = TempDir::new().unwrap();
    init(dir.path());
    create(dir.path(), "First", &[]);

    lanes(dir.path())
        .args(["create", "--summary", "Clash", "--key", "PRJ-1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("E2005"));

    let board = json_of(lanes(dir.path()).args(["board", "--json"]));
    let total: usize = board["columns"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["tickets"].as_array().unwrap().len())
        .sum();
    assert_eq!(total, 1);
}

#[test]
fn board_lists_tickets_by_column() {
    let dir = TempDir::new().unwrap();
    init(dir.path());
    create(dir.path(), "Write docs", &["--status", "todo"]);
    create(dir.path(), "Ship release", &["--status", "review"]);

    lanes(dir.path())
        .args(["board"])
        .assert()
        .success()
        .stdout(predicate::str::contains("todo\tPRJ-1\ttask\tWrite docs"))
        .stdout(predicate::str::contains("review\tPRJ-2\ttask\tShip release"));
}

#[test]
fn update_reparents_and_check_reports_violation() {
    let dir = TempDir::new().unwrap();
    init(dir.path());
    let epic = create(dir.path(), "Epic", &["-t", "epic", "--status", "review"]);
    let task = create(dir.path(), "Task", &["--status", "todo"]);

    lanes(dir.path())
        .args(["check"])
        .assert()
        .success();

    lanes(dir.path())
        .args(["update", &task, "--parent", &epic])
        .assert()
        .success();

    lanes(dir.path())
        .args(["check"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("status violations: 1"));

    lanes(dir.path())
        .args(["check", "--no-fail", "--json"])
        .assert()
        .success();
}

#[test]
fn update_refuses_cycles() {
    let dir = TempDir::new().unwrap();
    init(dir.path());
    let epic = create(dir.path(), "Epic", &["-t", "epic"]);
    let story = create(dir.path(), "Story", &["-t", "story", "--parent", &epic]);

    lanes(dir.path())
        .args(["update", &epic, "--parent", &story])
        .assert()
        .failure()
        .stderr(predicate::str::contains("E2004"));
}

#[test]
fn delete_detaches_or_cascades() {
    let dir = TempDir::new().unwrap();
    init(dir.path());
    let epic = create(dir.path(), "Epic", &["-t", "epic"]);
    let story = create(dir.path(), "Story", &["-t", "story", "--parent", &epic]);
    let other = create(dir.path(), "Other epic", &["-t", "epic"]);
    create(dir.path(), "Other story", &["-t", "story", "--parent", &other]);

    lanes(dir.path()).args(["delete", &epic]).assert().success();
    let shown = json_of(lanes(dir.path()).args(["show", &story, "--json"]));
    assert!(shown.get("parent").is_none());

    let json = json_of(lanes(dir.path()).args(["delete", &other, "--cascade", "--json"]));
    assert_eq!(json["removed"].as_array().unwrap().len(), 2);

    lanes(dir.path())
        .args(["show", &other])
        .assert()
        .failure()
        .stderr(predicate::str::contains("E2001"));
}

#[test]
fn completions_are_generated() {
    let dir = TempDir::new().unwrap();
    lanes(dir.path())
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("lanes"));
}
