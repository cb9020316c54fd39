// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::ccb::Operation;
use std::fs::File;
use std::io::Write as _;
use std::os::fd::OwnedFd;
use std::sync::{Arc, Mutex};

fn recover_ccb(iobuf: usize) -> Ccb {
    let args: Vec<String> = ["wrap_test", "-x"].iter().map(|s| s.to_string()).collect();
    let ccb = Ccb::from_args(&args).unwrap();
    assert_eq!(ccb.op, Operation::Recover);
    ccb.with_iobuf(iobuf)
}

/// Inspectable index channel.
#[derive(Clone)]
struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl SharedBuf {
    fn new() -> Self {
        Self(Arc::new(Mutex::new(Vec::new())))
    }

    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl std::io::Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

fn file_source(data: &[u8]) -> File {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("image.bin");
    std::fs::write(&path, data).unwrap();
    // keep the dir alive by leaking it; the File handle outlives the test
    std::mem::forget(dir);
    File::open(path).unwrap()
}

#[test]
fn file_mode_seek_and_pass_extracts_exact_range() {
    let data = pattern(4096);
    let mut ccb = recover_ccb(1024);
    ccb.data_conn = Some(file_source(&data));

    ccb.reco_seek(100, 50, 50).unwrap();
    assert_eq!(ccb.data_conn_mode, DataConnMode::File);
    assert_eq!(ccb.have_off, 100);
    assert!(ccb.have_len >= 50);

    let mut out = Vec::new();
    ccb.reco_pass(&mut out, 50, 50).unwrap();
    assert_eq!(out, &data[100..150]);
}

#[test]
fn chunked_pass_with_refills_preserves_the_stream() {
    let data = pattern(8192);
    // tiny buffer forces mid-window refills and compaction
    let mut ccb = recover_ccb(256);
    ccb.data_conn = Some(file_source(&data));

    ccb.reco_seek(10, 3000, 100).unwrap();
    let mut out = Vec::new();
    ccb.reco_pass(&mut out, 3000, 100).unwrap();
    assert_eq!(out.len(), 3000);
    assert_eq!(out, &data[10..3010]);
    assert!(ccb.have_len <= 256, "buffer overran its capacity");
}

#[test]
fn backward_seek_discards_and_repositions() {
    let data = pattern(4096);
    let mut ccb = recover_ccb(512);
    ccb.data_conn = Some(file_source(&data));

    let mut out = Vec::new();
    ccb.reco_seek(2000, 100, 100).unwrap();
    ccb.reco_pass(&mut out, 100, 100).unwrap();
    assert_eq!(out, &data[2000..2100]);

    out.clear();
    ccb.reco_seek(0, 100, 100).unwrap();
    ccb.reco_pass(&mut out, 100, 100).unwrap();
    assert_eq!(out, &data[0..100]);
}

#[test]
fn pipe_mode_issues_data_read_upstream() {
    let (reader, mut writer) = std::io::pipe().unwrap();
    let index = SharedBuf::new();

    let mut ccb = recover_ccb(65536);
    ccb.data_conn = Some(File::from(OwnedFd::from(reader)));
    ccb.index = Some(Box::new(index.clone()));

    // formatter wants [100, 150); nothing buffered yet
    ccb.want_off = 100;
    ccb.want_len = 50;
    ccb.reco_align_to_wanted().unwrap();

    assert_eq!(ccb.data_conn_mode, DataConnMode::Pipe);
    assert_eq!(index.contents(), "DR 100 50\n");
    assert_eq!(ccb.have_len, 0);
    assert_eq!(ccb.reading_off, 100);
    assert_eq!(ccb.reading_len, 50);
    assert_eq!(ccb.last_read_off, 100);
    assert_eq!(ccb.last_read_len, 50);

    // aligning again must not re-issue the request
    ccb.reco_align_to_wanted().unwrap();
    assert_eq!(index.contents(), "DR 100 50\n");

    // upstream answers with 50 bytes
    let payload = pattern(50);
    writer.write_all(&payload).unwrap();
    ccb.reco_must_have(50).unwrap();

    assert_eq!(ccb.have_off, 100);
    assert_eq!(ccb.have_len, 50);
    assert_eq!(
        &ccb.iobuf[ccb.have_start..ccb.have_start + 50],
        &payload[..]
    );
}

#[test]
fn pipe_without_index_channel_is_fatal() {
    let (reader, _writer) = std::io::pipe().unwrap();
    let mut ccb = recover_ccb(4096);
    ccb.data_conn = Some(File::from(OwnedFd::from(reader)));

    ccb.want_off = 0;
    ccb.want_len = 10;
    assert_eq!(
        ccb.reco_align_to_wanted(),
        Err(RecoError::NoIndexPipe)
    );
    // the error is sticky
    assert_eq!(ccb.reco_must_have(1), Err(RecoError::NoIndexPipe));
}

#[test]
fn eof_on_data_connection_is_fatal() {
    let (reader, writer) = std::io::pipe().unwrap();
    let index = SharedBuf::new();
    let mut ccb = recover_ccb(4096);
    ccb.data_conn = Some(File::from(OwnedFd::from(reader)));
    ccb.index = Some(Box::new(index));

    drop(writer);
    assert_eq!(ccb.reco_seek(0, 10, 10), Err(RecoError::Eof));
}

#[test]
fn consume_resets_expect_sentinel_when_drained() {
    let data = pattern(512);
    let mut ccb = recover_ccb(512);
    ccb.data_conn = Some(file_source(&data));

    ccb.reco_seek(0, 16, 16).unwrap();
    let mut out = Vec::new();
    ccb.reco_pass(&mut out, 16, 16).unwrap();

    assert_eq!(ccb.have_len, 0);
    assert_eq!(ccb.expect_len, 0);
    assert_eq!(ccb.expect_off, u64::MAX);
}
