//! Integration tests for the buildlog-triage CLI
//!
//! These tests run the binary against small transcripts written to a
//! temporary directory and check both output modes.

use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::cargo;
use predicates::prelude::*;
use tempfile::TempDir;

/// Helper function to create a buildlog-triage command
fn triage() -> assert_cmd::Command {
    assert_cmd::Command::new(cargo::cargo_bin!("buildlog-triage"))
}

/// Helper to write a transcript into the temporary directory
fn write_log(dir: &Path, name: &str, lines: &[&str]) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, lines.join("\n")).expect("Failed to write log");
    path
}

const BANNER_RULE: &str =
    "+------------------------------------------------------------------------+";

#[test]
fn test_sbuild_install_deps_failure_human() {
    let temp = TempDir::new().unwrap();
    let log = write_log(
        temp.path(),
        "build.log",
        &[
            "sbuild starting",
            BANNER_RULE,
            "| Install package build dependencies (apt-based resolver)                 |",
            BANNER_RULE,
            "",
            "Reading package lists...",
            "E: Unable to locate package librust-missing-dev",
        ],
    );

    triage()
        .arg("sbuild")
        .arg(&log)
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "Section: install package build dependencies (apt-based resolver)",
        ))
        .stdout(predicate::str::contains("Problem [apt-package-unknown]"))
        .stdout(predicate::str::contains("librust-missing-dev"));
}

#[test]
fn test_sbuild_update_failure_json() {
    let temp = TempDir::new().unwrap();
    let log = write_log(
        temp.path(),
        "build.log",
        &[
            BANNER_RULE,
            "| Update chroot                                                            |",
            BANNER_RULE,
            "Get:1 http://deb.example sid InRelease",
            "E: Failed to fetch http://deb.example/InRelease  Connection failed",
        ],
    );

    triage()
        .arg("sbuild")
        .arg(&log)
        .arg("--json")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"kind\": \"apt-file-fetch-failure\""))
        .stdout(predicate::str::contains("\"section\": \"update chroot\""))
        .stdout(predicate::str::contains("http://deb.example/InRelease"));
}

#[test]
fn test_sbuild_no_failure() {
    let temp = TempDir::new().unwrap();
    let log = write_log(temp.path(), "build.log", &["everything went fine"]);

    triage()
        .arg("sbuild")
        .arg(&log)
        .assert()
        .success()
        .stdout(predicate::str::contains("No recognizable failure found."));
}

#[test]
fn test_autopkgtest_timed_out_json() {
    let temp = TempDir::new().unwrap();
    let log = write_log(
        temp.path(),
        "test.log",
        &[
            "autopkgtest [10:20:30]: @@@@@@@@@@@@@@@@@@@@ summary",
            "unit                 FAIL timed out",
        ],
    );

    triage()
        .arg("autopkgtest")
        .arg(&log)
        .arg("--json")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"kind\": \"timed-out\""))
        .stdout(predicate::str::contains("\"testname\": \"unit\""));
}

#[test]
fn test_autopkgtest_testbed_failure_human() {
    let temp = TempDir::new().unwrap();
    let log = write_log(
        temp.path(),
        "test.log",
        &[
            "autopkgtest [10:20:30]: ERROR: testbed failure: sent `copy', got `timeout', expected `ok...'",
        ],
    );

    triage()
        .arg("autopkgtest")
        .arg(&log)
        .assert()
        .success()
        .stdout(predicate::str::contains("Problem [testbed-failure]"));
}

#[test]
fn test_missing_file_is_an_error() {
    triage()
        .arg("sbuild")
        .arg("/nonexistent/build.log")
        .assert()
        .failure()
        .stderr(predicate::str::contains("error:"));
}
