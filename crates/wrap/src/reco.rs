// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Recovery streamer: aligning the image stream to formatter seeks.
//!
//! Five windows describe the state, all as (offset, length) over the
//! backup image: `have` (bytes in the buffer), `want` (what the
//! formatter asked for), `reading` (requested upstream, not yet
//! arrived), `last_read` (the previous upstream request, kept for
//! retransmission), and `expect` = `have` followed by `reading`.
//!
//! Invariants: `expect.off == have.off` and `expect.len == have.len +
//! reading.len` whenever data is in flight; `reading.off == have.off +
//! have.len` while `reading.len > 0`; `have.len` never exceeds the
//! buffer. An empty `expect` parks `expect.off` at `u64::MAX`.

use std::io::{Read, Seek, SeekFrom, Write};
use std::os::unix::fs::{FileTypeExt, MetadataExt};

use thiserror::Error;
use tracing::trace;

use crate::ccb::{Ccb, DataConnMode};
use crate::msg::{self, WrapMsg};

/// Compact the buffer when the tail has less room than this.
const COMPACT_THRESHOLD: usize = 512;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RecoError {
    #[error("EOF on data connection")]
    Eof,

    #[error("errno {errno} on data connection")]
    Io { errno: i32 },

    #[error("data connection is a pipe but no index channel is open")]
    NoIndexPipe,

    #[error("unsupported data connection type {0:#o}")]
    UnsupportedDataConn(u32),

    #[error("streamer invariant violated: {0}")]
    Botched(&'static str),

    #[error("no data connection open")]
    NoDataConn,
}

impl Ccb {
    fn fail(&mut self, err: RecoError) -> RecoError {
        if self.error.is_none() {
            self.error = Some(err.clone());
        }
        err
    }

    fn check_error(&self) -> Result<(), RecoError> {
        match &self.error {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }

    /// The formatter wants `[want_off, want_off+want_len)`; block until
    /// at least `must_have` bytes of it are buffered.
    pub fn reco_seek(
        &mut self,
        want_off: u64,
        want_len: u64,
        must_have: usize,
    ) -> Result<(), RecoError> {
        self.check_error()?;
        self.want_off = want_off;
        self.want_len = want_len;
        self.reco_must_have(must_have)
    }

    /// Widen the want window to `length` and pump until that much is
    /// actually buffered.
    pub fn reco_must_have(&mut self, length: usize) -> Result<(), RecoError> {
        if self.want_len < length as u64 {
            self.want_len = length as u64;
        }
        self.reco_align_to_wanted()?;
        while self.have_len < length {
            self.check_error()?;
            self.reco_align_to_wanted()?;
            self.reco_receive()?;
        }
        Ok(())
    }

    /// Copy `length` stream bytes to `out` in chunks of `block`.
    pub fn reco_pass(
        &mut self,
        out: &mut dyn Write,
        mut length: u64,
        block: usize,
    ) -> Result<(), RecoError> {
        while length > 0 {
            self.check_error()?;
            let cnt = (block as u64).min(length) as usize;
            if self.have_len < cnt {
                self.reco_must_have(cnt)?;
            }
            let write = out.write_all(&self.iobuf[self.have_start..self.have_start + cnt]);
            if let Err(e) = write {
                let errno = e.raw_os_error().unwrap_or(0);
                return Err(self.fail(RecoError::Io { errno }));
            }
            length -= cnt as u64;
            self.reco_consume(cnt);
        }
        Ok(())
    }

    /// Walk the state machine until the buffer start lines up with the
    /// want window (issuing an upstream read when nothing is in flight).
    pub fn reco_align_to_wanted(&mut self) -> Result<(), RecoError> {
        loop {
            self.check_error()?;

            if self.have_off == self.want_off {
                if self.expect_len < self.want_len && self.reading_len == 0 {
                    self.reco_issue_read()?;
                }
                return Ok(());
            }

            if self.have_len > 0 {
                let unwanted = if self.have_off < self.want_off {
                    let distance = self.want_off - self.have_off;
                    (distance as usize).min(self.have_len)
                } else {
                    // wholly unwanted window
                    self.have_len
                };
                self.reco_consume(unwanted);
                continue;
            }

            if self.expect_len > 0 {
                self.reco_receive()?;
                continue;
            }

            self.reco_issue_read()?;
        }
    }

    /// Pull bytes off the data connection into the buffer tail,
    /// compacting first when the tail is nearly full and the front has
    /// already been consumed.
    pub fn reco_receive(&mut self) -> Result<(), RecoError> {
        self.check_error()?;

        if self.have_len == 0 {
            self.have_start = 0;
        }
        let mut tail_room = self.iobuf.len() - (self.have_start + self.have_len);
        if tail_room < COMPACT_THRESHOLD && self.have_start > 0 {
            self.iobuf
                .copy_within(self.have_start..self.have_start + self.have_len, 0);
            self.have_start = 0;
            tail_room = self.iobuf.len() - self.have_len;
        }

        let n_read = tail_room.min(self.reading_len as usize);
        if n_read == 0 {
            return Err(self.fail(RecoError::Botched("receive with nothing in flight")));
        }

        let Some(conn) = self.data_conn.as_mut() else {
            return Err(self.fail(RecoError::NoDataConn));
        };
        let end = self.have_start + self.have_len;
        match conn.read(&mut self.iobuf[end..end + n_read]) {
            Ok(0) => Err(self.fail(RecoError::Eof)),
            Ok(n) => {
                self.have_len += n;
                self.reading_off += n as u64;
                self.reading_len -= n as u64;
                trace!(n, have_len = self.have_len, "reco receive");
                Ok(())
            }
            Err(e) => {
                let errno = e.raw_os_error().unwrap_or(0);
                Err(self.fail(RecoError::Io { errno }))
            }
        }
    }

    /// Hand `length` bytes at the buffer start to the consumer.
    pub fn reco_consume(&mut self, length: usize) {
        debug_assert!(self.have_len >= length);
        let aligned = self.have_off == self.want_off;

        self.have_off += length as u64;
        self.have_len -= length;
        self.have_start += length;
        self.expect_off = self.expect_off.wrapping_add(length as u64);
        self.expect_len -= length as u64;

        // when the consumer takes wanted bytes, the want window follows,
        // so a mid-window refill does not discard the remainder
        if aligned {
            self.want_off += length as u64;
            self.want_len = self.want_len.saturating_sub(length as u64);
        }

        if self.expect_len == 0 {
            debug_assert_eq!(self.have_len, 0);
            self.expect_off = u64::MAX;
        }
    }

    /// Request the uncovered part of the want window from the data
    /// source: an lseek for file sources, a `DR` line upstream for pipe
    /// sources. First use discovers which kind the descriptor is.
    pub fn reco_issue_read(&mut self) -> Result<(), RecoError> {
        if self.reading_len != 0 {
            return Err(self.fail(RecoError::Botched("issue_read while reading")));
        }

        if self.data_conn_mode == DataConnMode::Unknown {
            let Some(conn) = self.data_conn.as_ref() else {
                return Err(self.fail(RecoError::NoDataConn));
            };
            let meta = match conn.metadata() {
                Ok(m) => m,
                Err(e) => {
                    let errno = e.raw_os_error().unwrap_or(0);
                    return Err(self.fail(RecoError::Io { errno }));
                }
            };
            let ftype = meta.file_type();
            if ftype.is_fifo() {
                if self.index.is_none() {
                    return Err(self.fail(RecoError::NoIndexPipe));
                }
                self.data_conn_mode = DataConnMode::Pipe;
            } else if ftype.is_file() {
                self.data_conn_mode = DataConnMode::File;
            } else {
                return Err(self.fail(RecoError::UnsupportedDataConn(meta.mode())));
            }
        }

        let off = self.want_off + self.have_len as u64;
        let len = self.want_len - self.have_len as u64;
        if len == 0 {
            return Err(self.fail(RecoError::Botched("issue_read of nothing")));
        }

        self.last_read_off = off;
        self.last_read_len = len;

        match self.data_conn_mode {
            DataConnMode::File => {
                let Some(conn) = self.data_conn.as_mut() else {
                    return Err(self.fail(RecoError::NoDataConn));
                };
                let seek = conn.seek(SeekFrom::Start(off));
                if let Err(e) = seek {
                    let errno = e.raw_os_error().unwrap_or(0);
                    return Err(self.fail(RecoError::Io { errno }));
                }
            }
            DataConnMode::Pipe => {
                let Some(index) = self.index.as_mut() else {
                    return Err(self.fail(RecoError::NoIndexPipe));
                };
                let line = msg::format(&WrapMsg::DataRead {
                    offset: off,
                    length: len,
                });
                let write = index
                    .write_all(line.as_bytes())
                    .and_then(|()| index.flush());
                if let Err(e) = write {
                    let errno = e.raw_os_error().unwrap_or(0);
                    return Err(self.fail(RecoError::Io { errno }));
                }
            }
            DataConnMode::Unknown => {
                return Err(self.fail(RecoError::Botched("mode still unknown")));
            }
        }

        self.reading_off = self.last_read_off;
        self.reading_len = self.last_read_len;
        if self.have_len == 0 {
            // empty buffer now fronts the requested range
            self.have_off = self.reading_off;
            self.have_start = 0;
            self.expect_off = self.reading_off;
            self.expect_len = self.reading_len;
        } else {
            self.expect_len += len;
        }
        trace!(off, len, mode = ?self.data_conn_mode, "issued read");
        Ok(())
    }
}

#[cfg(test)]
#[path = "reco_tests.rs"]
mod tests;
