// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use nix::fcntl::{fcntl, FcntlArg, OFlag};
use std::os::fd::{AsRawFd, OwnedFd};

fn nonblocking_pipe() -> (OwnedFd, std::io::PipeWriter) {
    let (reader, writer) = std::io::pipe().unwrap();
    let fd = OwnedFd::from(reader);
    fcntl(fd.as_raw_fd(), FcntlArg::F_SETFL(OFlag::O_NONBLOCK)).unwrap();
    (fd, writer)
}

#[test]
fn push_and_consume_track_indices() {
    let mut ch = Chan::new("test");
    assert_eq!(ch.push(b"hello"), 5);
    assert_eq!(ch.n_ready(), 5);
    assert_eq!(ch.ready(), b"hello");

    ch.consume(2);
    assert_eq!(ch.ready(), b"llo");

    ch.consume(3);
    assert_eq!(ch.n_ready(), 0);
    // fully drained channels rewind to the front
    assert_eq!(ch.beg_ix, 0);
    assert_eq!(ch.end_ix, 0);
}

#[test]
fn compress_reclaims_consumed_space() {
    let mut ch = Chan::new("test");
    ch.push(b"abcdef");
    ch.consume(4);
    let before = ch.beg_ix;
    assert!(before > 0);

    ch.compress();
    assert_eq!(ch.beg_ix, 0);
    assert_eq!(ch.ready(), b"ef");
}

#[test]
fn fill_reads_nonblocking_and_sees_eof() {
    use std::io::Write as _;

    let (fd, mut writer) = nonblocking_pipe();
    let mut ch = Chan::new("test");
    ch.attach(fd);

    // nothing yet: would-block is "did nothing"
    assert!(!ch.fill());

    writer.write_all(b"data").unwrap();
    assert!(ch.fill());
    assert_eq!(ch.ready(), b"data");
    assert!(!ch.eof);

    drop(writer);
    assert!(ch.fill());
    assert!(ch.eof);
    // buffered bytes are still readable after EOF
    assert_eq!(ch.ready(), b"data");
}

#[test]
fn drain_writes_ready_bytes() {
    use std::io::Read as _;

    let (reader, writer) = std::io::pipe().unwrap();
    let fd = OwnedFd::from(writer);
    fcntl(fd.as_raw_fd(), FcntlArg::F_SETFL(OFlag::O_NONBLOCK)).unwrap();

    let mut ch = Chan::new("test");
    ch.attach(fd);
    ch.push(b"outbound");
    assert!(ch.drain());
    assert_eq!(ch.n_ready(), 0);

    ch.close();
    let mut got = Vec::new();
    let mut reader = std::fs::File::from(OwnedFd::from(reader));
    reader.read_to_end(&mut got).unwrap();
    assert_eq!(got, b"outbound");
}

#[test]
fn cleanup_resets_everything() {
    let mut ch = Chan::new("test");
    ch.push(b"junk");
    ch.cleanup();
    assert_eq!(ch.n_ready(), 0);
    assert!(ch.eof);
    assert!(!ch.has_fd());
}
