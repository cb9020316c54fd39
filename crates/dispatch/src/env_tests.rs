// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn paths_derive_from_name_and_workdir() {
    let env = DaemonEnv::new("ndmd-a", Path::new("/var/lib/ndm"));
    assert_eq!(
        env.console_path(),
        PathBuf::from("/var/lib/ndm/ndmd-a.conmsg")
    );
    assert_eq!(env.trace_path(), PathBuf::from("/var/lib/ndm/ndmd-a.trace"));
}

#[test]
fn trace_writes_only_when_enabled() {
    let dir = tempfile::tempdir().unwrap();
    let env = DaemonEnv::new("t", dir.path());

    env.trace_write("dropped\n");
    assert!(!env.trace_path().exists());

    env.set_trace(true);
    env.trace_write("kept\n");
    let content = std::fs::read_to_string(env.trace_path()).unwrap();
    assert_eq!(content, "kept\n");

    env.set_trace(false);
    env.trace_write("dropped again\n");
    let content = std::fs::read_to_string(env.trace_path()).unwrap();
    assert_eq!(content, "kept\n");
}

#[test]
fn console_write_is_append_only() {
    let dir = tempfile::tempdir().unwrap();
    let env = DaemonEnv::new("c", dir.path());

    env.console_write("first");
    env.console_write("second");
    let content = std::fs::read_to_string(env.console_path()).unwrap();
    assert_eq!(content, "first\nsecond\n");
    assert!(env.take_console_pending());
}
