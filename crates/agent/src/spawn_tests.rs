// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::io::Read;

fn read_all_blocking(fd: OwnedFd) -> Vec<u8> {
    use std::os::fd::AsRawFd;
    // undo O_NONBLOCK for a simple drain
    let _ = fcntl(fd.as_raw_fd(), FcntlArg::F_SETFL(OFlag::empty()));
    let mut file = std::fs::File::from(fd);
    let mut out = Vec::new();
    let _ = file.read_to_end(&mut out);
    out
}

#[test]
fn wrap_pipe_arrives_on_fd_three() {
    let mut spawned = pipe_fork_exec(
        "echo wrapped >&3",
        [FdSpec::DevNull, FdSpec::DevNull, FdSpec::DevNull],
    )
    .unwrap();
    let status = spawned.child.wait().unwrap();
    assert!(status.success());

    let wrap = read_all_blocking(spawned.from_wrap);
    assert_eq!(wrap, b"wrapped\n");
}

#[test]
fn output_pipe_captures_stdout_and_stderr_separately() {
    let mut spawned = pipe_fork_exec(
        "echo out; echo err >&2",
        [FdSpec::DevNull, FdSpec::OutputPipe, FdSpec::OutputPipe],
    )
    .unwrap();
    spawned.child.wait().unwrap();

    assert_eq!(
        read_all_blocking(spawned.from_stdout.take().unwrap()),
        b"out\n"
    );
    assert_eq!(
        read_all_blocking(spawned.from_stderr.take().unwrap()),
        b"err\n"
    );
}

#[test]
fn input_pipe_feeds_child_stdin() {
    use std::io::Write as _;
    use std::os::fd::AsRawFd;

    let mut spawned = pipe_fork_exec(
        "cat",
        [FdSpec::InputPipe, FdSpec::OutputPipe, FdSpec::DevNull],
    )
    .unwrap();

    let stdin = spawned.to_stdin.take().unwrap();
    let _ = fcntl(stdin.as_raw_fd(), FcntlArg::F_SETFL(OFlag::empty()));
    let mut writer = std::fs::File::from(stdin);
    writer.write_all(b"echoed through cat").unwrap();
    drop(writer);

    spawned.child.wait().unwrap();
    assert_eq!(
        read_all_blocking(spawned.from_stdout.take().unwrap()),
        b"echoed through cat"
    );
}

#[test]
fn inherited_descriptor_lands_in_the_slot() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.txt");
    let file = std::fs::File::create(&path).unwrap();

    let mut spawned = pipe_fork_exec(
        "echo into-file",
        [
            FdSpec::DevNull,
            FdSpec::Inherit(OwnedFd::from(file)),
            FdSpec::DevNull,
        ],
    )
    .unwrap();
    spawned.child.wait().unwrap();

    assert_eq!(std::fs::read_to_string(&path).unwrap(), "into-file\n");
}

#[test]
fn failing_command_reports_exit_status() {
    let mut spawned = pipe_fork_exec(
        "exit 7",
        [FdSpec::DevNull, FdSpec::DevNull, FdSpec::DevNull],
    )
    .unwrap();
    let status = spawned.child.wait().unwrap();
    assert_eq!(status.code(), Some(7));
}
