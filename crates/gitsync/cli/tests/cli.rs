use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;

const MANIFEST: &str = r#"
organizations:
  - id: 00000000-0000-4000-8000-000000000001
    name: Acme
roles:
  - id: 00000000-0000-4000-8000-000000000002
    name: Operators
    organization_id: 00000000-0000-4000-8000-000000000001
"#;

fn gitsync() -> Command {
    let mut cmd = Command::cargo_bin("gitsync").unwrap();
    cmd.env_remove("GITSYNC_CONFIG").env("RUST_LOG", "warn");
    cmd
}

fn write_manifest(dir: &Path, name: &str, body: &str) -> std::path::PathBuf {
    let path = dir.join(name);
    fs::write(&path, body).unwrap();
    path
}

#[test]
fn validate_reports_differences_and_fails() {
    let dir = tempfile::tempdir().unwrap();
    let manifest = write_manifest(dir.path(), "manifest.yaml", MANIFEST);

    gitsync()
        .arg("validate")
        .arg(&manifest)
        .assert()
        .failure()
        .stdout(predicate::str::contains("2 difference(s):"))
        .stdout(predicate::str::contains("would create Organization 'Acme'"))
        .stdout(predicate::str::contains("would create Role 'Operators'"));
}

#[test]
fn commit_prints_the_report() {
    let dir = tempfile::tempdir().unwrap();
    let manifest = write_manifest(dir.path(), "manifest.yaml", MANIFEST);

    gitsync()
        .args(["--workspace", "acme", "commit"])
        .arg(&manifest)
        .assert()
        .success()
        .stdout(predicate::str::contains("created 2, updated 0"));
}

#[test]
fn plan_renders_json() {
    let dir = tempfile::tempdir().unwrap();
    let manifest = write_manifest(dir.path(), "manifest.yaml", MANIFEST);

    let output = gitsync()
        .arg("plan")
        .arg(&manifest)
        .args(["--format", "json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let plan: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let queue = plan["queue"].as_array().unwrap();
    assert_eq!(queue.len(), 2);
    assert_eq!(queue[0]["op"], "upsert");
    assert_eq!(queue[0]["kind"], "organization");
    assert_eq!(queue[1]["kind"], "role");
}

#[test]
fn empty_json_manifest_is_in_sync() {
    let dir = tempfile::tempdir().unwrap();
    let manifest = write_manifest(dir.path(), "manifest.json", "{}");

    gitsync()
        .arg("validate")
        .arg(&manifest)
        .assert()
        .success()
        .stdout(predicate::str::contains("manifest is in sync"));
}

#[test]
fn unparsable_manifest_names_the_file() {
    let dir = tempfile::tempdir().unwrap();
    let manifest = write_manifest(dir.path(), "broken.yaml", "organizations: [{");

    gitsync()
        .arg("validate")
        .arg(&manifest)
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to parse manifest"))
        .stderr(predicate::str::contains("broken.yaml"));
}

#[test]
fn postgres_config_without_feature_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let manifest = write_manifest(dir.path(), "manifest.yaml", MANIFEST);
    let config = write_manifest(
        dir.path(),
        "gitsync.yaml",
        "storage:\n  type: postgres\n  url: postgres://localhost/gitsync\n",
    );

    let assert = gitsync()
        .arg("--config")
        .arg(&config)
        .arg("validate")
        .arg(&manifest)
        .assert()
        .failure();
    if cfg!(not(feature = "postgres")) {
        assert.stderr(predicate::str::contains("not compiled in"));
    }
}
