use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn uplift(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("uplift").unwrap();
    cmd.env_remove("UPLIFT_UNSUPPORTED")
        .env("UPLIFT_DB", dir.path().join("audit.db"));
    cmd
}

#[test]
fn rerun_refused_without_unsupported_gate() {
    let dir = TempDir::new().unwrap();
    uplift(&dir)
        .args(["rerun", "FirstBoot"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("UPLIFT_UNSUPPORTED"));

    // The refused command must not have touched the audit store.
    assert!(!dir.path().join("audit.db").exists());
}

#[test]
fn rerun_rejects_unsupported_phase_before_opening_the_store() {
    let dir = TempDir::new().unwrap();
    uplift(&dir)
        .env("UPLIFT_UNSUPPORTED", "1")
        .args(["rerun", "RpmUpgrade"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot be rerun"));
}

#[test]
fn rerun_requires_a_prior_execution() {
    let dir = TempDir::new().unwrap();
    uplift(&dir)
        .env("UPLIFT_UNSUPPORTED", "1")
        .args(["rerun", "FirstBoot"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no prior execution"));
}

#[test]
fn rerun_rejects_unknown_phase() {
    let dir = TempDir::new().unwrap();
    uplift(&dir)
        .env("UPLIFT_UNSUPPORTED", "1")
        .args(["rerun", "NotAPhase"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid phase"));
}

#[test]
fn phases_lists_execution_order() {
    let dir = TempDir::new().unwrap();
    let assert = uplift(&dir).arg("phases").assert().success();
    let stdout = String::from_utf8(assert.get_output().stdout.clone()).unwrap();

    let facts = stdout.find("facts").unwrap();
    let rpm = stdout.find("rpm_upgrade").unwrap();
    let first_boot = stdout.find("first_boot").unwrap();
    assert!(facts < rpm && rpm < first_boot, "phases out of order:\n{stdout}");
}

#[test]
fn status_with_empty_store() {
    let dir = TempDir::new().unwrap();
    uplift(&dir)
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("No executions recorded"));
}
