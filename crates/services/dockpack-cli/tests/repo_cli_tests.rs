use assert_cmd::Command;
use predicates::str::contains;
use tempfile::TempDir;

#[test]
fn repo_list_is_empty_for_fresh_workspace() {
    let workspace = TempDir::new().expect("failed to create temp dir");

    let mut cmd = Command::cargo_bin("dockpack").expect("binary not found");
    cmd.env("DOCKPACK_WORKSPACE_DIR", workspace.path())
        .arg("repo")
        .arg("list")
        .assert()
        .success()
        .stdout("");
}

#[test]
fn repo_status_reports_unlocked_for_unknown_repo() {
    let workspace = TempDir::new().expect("failed to create temp dir");

    let mut cmd = Command::cargo_bin("dockpack").expect("binary not found");
    cmd.env("DOCKPACK_WORKSPACE_DIR", workspace.path())
        .arg("repo")
        .arg("status")
        .arg("demo")
        .assert()
        .success()
        .stdout(contains("demo: does not exist, unlocked, no cache"));
}

#[test]
fn repo_status_reports_existence_lock_and_cache_for_known_repo() {
    let workspace = TempDir::new().expect("failed to create temp dir");
    std::fs::create_dir_all(workspace.path().join("demo")).expect("failed to create repo dir");
    std::fs::write(workspace.path().join("demo").join(".dockpack_lock"), b"")
        .expect("failed to create lock marker");
    std::fs::write(workspace.path().join("demo_cache.tar"), b"0123456789")
        .expect("failed to create cache tarball");

    let mut cmd = Command::cargo_bin("dockpack").expect("binary not found");
    cmd.env("DOCKPACK_WORKSPACE_DIR", workspace.path())
        .arg("repo")
        .arg("status")
        .arg("demo")
        .assert()
        .success()
        .stdout(contains("demo: exists, locked, cache present (10 bytes)"));
}

#[test]
fn repo_status_rejects_invalid_repo_name() {
    let workspace = TempDir::new().expect("failed to create temp dir");

    let mut cmd = Command::cargo_bin("dockpack").expect("binary not found");
    cmd.env("DOCKPACK_WORKSPACE_DIR", workspace.path())
        .arg("repo")
        .arg("status")
        .arg("../escape")
        .assert()
        .failure();
}
