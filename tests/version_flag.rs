use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn prints_version() {
    Command::cargo_bin("treehole")
        .expect("binary built")
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn prints_help() {
    Command::cargo_bin("treehole")
        .expect("binary built")
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("treehole"))
        .stdout(predicate::str::contains("--version"))
        .stdout(predicate::str::contains("--offline"))
        .stdout(predicate::str::contains("--base-url"));
}

#[test]
fn rejects_unknown_flags() {
    Command::cargo_bin("treehole")
        .expect("binary built")
        .arg("--frobnicate")
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("unknown argument"));
}

#[test]
fn base_url_needs_a_value() {
    Command::cargo_bin("treehole")
        .expect("binary built")
        .arg("--base-url")
        .assert()
        .failure()
        .stderr(predicate::str::contains("requires a value"));
}
