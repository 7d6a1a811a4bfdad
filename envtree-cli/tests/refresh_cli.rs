use std::fs;
use std::path::Path;
use std::process::Command;

use assert_cmd::prelude::*;
use predicates::prelude::*;
use predicates::str::contains;
use tempfile::TempDir;

fn envtree_cmd(root: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("envtree"));
    cmd.env("ENVTREE_CONFIG", root.join("config.yaml"))
        .env_remove("RUST_LOG");
    cmd
}

fn init_root() -> TempDir {
    let root = TempDir::new().expect("root");
    fs::write(
        root.path().join("config.yaml"),
        "clone_dir: clone\nenvironments_dir: environments\nenv_metadata_dir: metadata\ncache_dir: cache\n",
    )
    .expect("config");
    for dir in [
        "metadata",
        "environments",
        "clone/modules/apache/master/code",
        "clone/hostgroups/aimon/master/code",
    ] {
        fs::create_dir_all(root.path().join(dir)).expect("mkdir");
    }
    fs::write(
        root.path().join("metadata/prod.yaml"),
        "notifications: ops@example.org\ndefault: master\n",
    )
    .expect("declaration");
    root
}

#[test]
fn refresh_json_reports_created_environment() {
    let root = init_root();
    let output = envtree_cmd(root.path())
        .args(["refresh", "--json"])
        .output()
        .expect("run envtree");
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).expect("json report");
    assert_eq!(report["delta"]["new"], serde_json::json!(["prod"]));
    assert_eq!(report["environments"][0]["action"], "created");
    assert_eq!(report["environments"][0]["committed"], true);
    assert_eq!(report["lease_seconds"], 3);

    let link = root.path().join("environments/prod/modules/apache");
    assert!(predicate::path::is_symlink().eval(&link));
    assert!(predicate::path::is_file().eval(&root.path().join("cache/inventory.yaml")));
}

#[test]
fn status_reflects_refresh() {
    let root = init_root();
    envtree_cmd(root.path())
        .arg("status")
        .assert()
        .success()
        .stdout(contains("prod").and(contains("NEW")));

    envtree_cmd(root.path()).arg("refresh").assert().success();

    let output = envtree_cmd(root.path())
        .args(["status", "--json"])
        .output()
        .expect("run envtree");
    assert!(output.status.success());
    let status: serde_json::Value = serde_json::from_slice(&output.stdout).expect("json status");
    assert_eq!(status["summary"]["pending"], 0);
    assert_eq!(status["environments"][0]["status"], "notchanged");
    assert_eq!(
        status["summary"]["mandatory_branches"],
        serde_json::json!(["master", "qa"])
    );
}

#[test]
fn dry_run_changes_nothing() {
    let root = init_root();
    envtree_cmd(root.path())
        .args(["refresh", "--dry-run"])
        .assert()
        .success()
        .stdout(contains("[dry-run]").and(contains("'prod' created")));

    assert!(predicate::path::missing().eval(&root.path().join("environments/prod")));
    assert!(predicate::path::missing().eval(&root.path().join("cache/inventory.yaml")));
}

#[test]
fn explicit_delta_file_drives_refresh() {
    let root = init_root();
    envtree_cmd(root.path()).arg("refresh").assert().success();

    let delta = root.path().join("delta.yaml");
    fs::write(&delta, "modules:\n  new: [nginx]\n  deleted: [apache]\n").expect("delta");
    let output = envtree_cmd(root.path())
        .args(["refresh", "--json", "--delta"])
        .arg(&delta)
        .output()
        .expect("run envtree");
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).expect("json report");
    assert_eq!(report["environments"][0]["action"], "refreshed");
    // notchanged * (0.2 * 1 + 0.1 * 1) rounds up to 1.
    assert_eq!(report["lease_seconds"], 3);
    let env = root.path().join("environments/prod");
    assert!(predicate::path::is_symlink().eval(&env.join("modules/nginx")));
    assert!(predicate::path::missing().eval(&env.join("modules/apache")));
}

#[test]
fn missing_settings_fail_with_context() {
    let root = TempDir::new().expect("root");
    envtree_cmd(root.path())
        .arg("status")
        .assert()
        .failure()
        .stderr(contains("failed to load settings"));
}
