// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

fn args(list: &[&str]) -> Vec<String> {
    std::iter::once("wrap_tar")
        .chain(list.iter().copied())
        .map(String::from)
        .collect()
}

#[test]
fn backup_argv() {
    let ccb = Ccb::from_args(&args(&[
        "-d", "2", "-c", "-B", "tar", "-I", "#3", "-E", "HIST=y", "-E", "FILESYSTEM=/srv",
    ]))
    .unwrap();
    assert_eq!(ccb.op, Operation::Backup);
    assert_eq!(ccb.bu_type.as_deref(), Some("tar"));
    assert_eq!(ccb.debug, 2);
    assert_eq!(ccb.index_name.as_deref(), Some("#3"));
    assert_eq!(ccb.hist, HistMode::Full);
    assert_eq!(ccb.backup_root, "/srv");
    assert!(ccb.files.is_empty());
}

#[test]
fn recover_argv_with_file_triples() {
    let ccb = Ccb::from_args(&args(&[
        "-x", "-I", "#3", "etc/hosts", "@42", "/tmp/restore/hosts", "var/log", "@-", "/tmp/restore/log",
    ]))
    .unwrap();
    assert_eq!(ccb.op, Operation::Recover);
    assert_eq!(ccb.files.len(), 2);
    assert_eq!(
        ccb.files[0],
        RecoveryFile {
            original_name: "etc/hosts".to_string(),
            fhinfo: Some(42),
            save_to_name: "/tmp/restore/hosts".to_string(),
        }
    );
    assert_eq!(ccb.files[1].fhinfo, None);
}

#[parameterized(
    hist_dirs = { &["-t", "-E", "HIST_TYPE=d"], HistMode::Dirs },
    hist_files = { &["-t", "-E", "HIST_TYPE=f"], HistMode::Files },
    hist_off = { &["-c", "-E", "HIST=n"], HistMode::Off },
    hist_on = { &["-c", "-E", "HIST=Y"], HistMode::Full },
)]
fn hist_modes(list: &[&str], expect: HistMode) {
    let ccb = Ccb::from_args(&args(list)).unwrap();
    assert_eq!(ccb.hist, expect);
}

#[test]
fn direct_and_default_root() {
    let ccb = Ccb::from_args(&args(&["-x", "-E", "DIRECT=y"])).unwrap();
    assert!(ccb.direct);
    assert_eq!(ccb.backup_root, "/");
}

#[test]
fn opaque_options_pass_through() {
    let ccb = Ccb::from_args(&args(&["-c", "-o", "compress", "-o", "exclude=.cache"])).unwrap();
    assert_eq!(ccb.opts, vec!["compress", "exclude=.cache"]);
    assert_eq!(ccb.find_env("NOPE"), None);
}

#[parameterized(
    no_op = { &["-B", "tar"] },
    conflict = { &["-c", "-x"] },
    dangling = { &["-c", "-B"] },
    bad_env = { &["-c", "-E", "HISTy"] },
    bad_triple_count = { &["-x", "orig", "@1"] },
    triple_without_at = { &["-x", "orig", "42", "dest"] },
)]
fn rejects(list: &[&str]) {
    assert!(Ccb::from_args(&args(list)).is_err());
}

#[test]
fn image_by_path_opens_for_read_on_recover() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("image.bin");
    std::fs::write(&path, b"payload").unwrap();

    let mut ccb = Ccb::from_args(&args(&["-x", "-f", path.to_str().unwrap()])).unwrap();
    ccb.open_image().unwrap();
    assert!(ccb.data_conn.is_some());
}

#[test]
fn index_by_path_appends() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("index.txt");

    let mut ccb = Ccb::from_args(&args(&["-x", "-I", path.to_str().unwrap()])).unwrap();
    ccb.open_index().unwrap();
    ccb.index
        .as_mut()
        .map(|w| w.write_all(b"DR 0 1\n"))
        .transpose()
        .unwrap();
    drop(ccb);

    assert_eq!(std::fs::read_to_string(&path).unwrap(), "DR 0 1\n");
}

#[test]
fn missing_open_targets_error() {
    let mut ccb = Ccb::from_args(&args(&["-x", "-f", "/nonexistent/dir/image"])).unwrap();
    assert!(matches!(ccb.open_image(), Err(CcbError::Open { .. })));
}
