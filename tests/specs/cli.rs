//! ndmd command-line behavior.

use crate::prelude::*;
use assert_cmd::Command;

#[test]
fn version_flag_prints_and_exits_zero() {
    let assert = Command::new(ndmd_path()).arg("--version").assert().success();
    let out = String::from_utf8_lossy(&assert.get_output().stdout).into_owned();
    assert!(out.contains("ndmd"), "got: {out}");
}

#[test]
fn help_shows_usage() {
    let assert = Command::new(ndmd_path()).arg("--help").assert().success();
    let out = String::from_utf8_lossy(&assert.get_output().stdout).into_owned();
    assert!(out.contains("USAGE"), "got: {out}");
}

#[test]
fn unknown_argument_fails() {
    let assert = Command::new(ndmd_path()).arg("--bogus").assert().failure();
    let err = String::from_utf8_lossy(&assert.get_output().stderr).into_owned();
    assert!(err.contains("unknown argument"), "got: {err}");
}

#[test]
fn test_config_dumps_json() {
    let dir = tempfile::tempdir().unwrap();
    let conf = write_daemon_config(dir.path(), 10999);

    let assert = Command::new(ndmd_path())
        .arg("-t")
        .arg("-c")
        .arg(&conf)
        .assert()
        .success();
    let output = assert.get_output().stdout.clone();

    let dump: serde_json::Value = serde_json::from_slice(&output).unwrap();
    assert_eq!(
        dump["resources"]["daemon"]["spec-ndmd"]["values"]["port"]["int"],
        serde_json::json!(10999)
    );
    // configured passwords are stored hashed, and dumped hashed
    let stored = dump["resources"]["director"][DIRECTOR_NAME]["values"]["password"]["password"]
        .as_str()
        .unwrap();
    assert_eq!(stored.len(), 32);
    assert_ne!(stored, TEST_PASSWORD);
    assert_eq!(
        stored,
        format!("{:x}", md5::compute(TEST_PASSWORD.as_bytes()))
    );
}

#[test]
fn test_config_rejects_broken_files() {
    let dir = tempfile::tempdir().unwrap();
    let conf = dir.path().join("broken.conf");
    std::fs::write(&conf, "Daemon { Frobnicate = yes }\n").unwrap();

    let assert = Command::new(ndmd_path())
        .arg("-t")
        .arg("-c")
        .arg(&conf)
        .assert()
        .failure();
    let err = String::from_utf8_lossy(&assert.get_output().stderr).into_owned();
    assert!(err.contains("Frobnicate"), "got: {err}");
}
