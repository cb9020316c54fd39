// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Ring-structured byte channel between a descriptor and the pumps.
//!
//! `data[beg_ix..end_ix]` holds ready bytes; the tail after `end_ix` is
//! available. Filling and draining are non-blocking: would-block means
//! the quantum did nothing on this channel and moves on.

use std::fs::File;
use std::io::{Read, Write};
use std::os::fd::OwnedFd;

use tracing::trace;

/// Default channel buffer size.
pub const CHAN_BUF: usize = 64 * 1024;

pub struct Chan {
    pub name: &'static str,
    pub data: Vec<u8>,
    pub beg_ix: usize,
    pub end_ix: usize,
    pub eof: bool,
    fd: Option<File>,
}

impl Chan {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            data: vec![0; CHAN_BUF],
            beg_ix: 0,
            end_ix: 0,
            eof: false,
            fd: None,
        }
    }

    /// Attach a descriptor; the caller has already set O_NONBLOCK.
    pub fn attach(&mut self, fd: OwnedFd) {
        self.fd = Some(File::from(fd));
        self.eof = false;
    }

    pub fn has_fd(&self) -> bool {
        self.fd.is_some()
    }

    /// Bytes ready for the consumer.
    pub fn n_ready(&self) -> usize {
        self.end_ix - self.beg_ix
    }

    /// Room left at the tail for the producer.
    pub fn n_avail(&self) -> usize {
        self.data.len() - self.end_ix
    }

    pub fn ready(&self) -> &[u8] {
        &self.data[self.beg_ix..self.end_ix]
    }

    /// Move the ready region to the front of the buffer.
    pub fn compress(&mut self) {
        if self.beg_ix == 0 {
            return;
        }
        let len = self.n_ready();
        self.data.copy_within(self.beg_ix..self.end_ix, 0);
        self.beg_ix = 0;
        self.end_ix = len;
    }

    /// Queue bytes produced locally (tests, loopback paths). Returns how
    /// many fit.
    pub fn push(&mut self, bytes: &[u8]) -> usize {
        if self.n_avail() < bytes.len() {
            self.compress();
        }
        let n = self.n_avail().min(bytes.len());
        self.data[self.end_ix..self.end_ix + n].copy_from_slice(&bytes[..n]);
        self.end_ix += n;
        n
    }

    /// Take up to `n` ready bytes.
    pub fn consume(&mut self, n: usize) {
        let n = n.min(self.n_ready());
        self.beg_ix += n;
        if self.beg_ix == self.end_ix {
            self.beg_ix = 0;
            self.end_ix = 0;
        }
    }

    /// Non-blocking fill from the attached descriptor. Returns true when
    /// bytes arrived or EOF was discovered.
    pub fn fill(&mut self) -> bool {
        if self.eof || self.fd.is_none() {
            return false;
        }
        if self.n_avail() == 0 {
            self.compress();
            if self.n_avail() == 0 {
                return false;
            }
        }

        let end = self.end_ix;
        let cap = self.data.len();
        let Some(fd) = self.fd.as_mut() else {
            return false;
        };
        match fd.read(&mut self.data[end..cap]) {
            Ok(0) => {
                trace!(chan = self.name, "eof");
                self.eof = true;
                self.fd = None;
                true
            }
            Ok(n) => {
                self.end_ix += n;
                trace!(chan = self.name, n, "fill");
                true
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => false,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => false,
            Err(e) => {
                trace!(chan = self.name, err = %e, "fill error, treating as eof");
                self.eof = true;
                self.fd = None;
                true
            }
        }
    }

    /// Non-blocking drain of the ready bytes into the attached
    /// descriptor. Returns true when bytes moved or the peer vanished.
    pub fn drain(&mut self) -> bool {
        if self.n_ready() == 0 || self.fd.is_none() {
            return false;
        }
        let span = self.beg_ix..self.end_ix;
        let Some(fd) = self.fd.as_mut() else {
            return false;
        };
        match fd.write(&self.data[span]) {
            Ok(0) => false,
            Ok(n) => {
                self.consume(n);
                true
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => false,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => false,
            Err(e) => {
                trace!(chan = self.name, err = %e, "drain error, dropping peer");
                self.fd = None;
                self.eof = true;
                true
            }
        }
    }

    /// Detach and close the descriptor; consumers see EOF once the
    /// buffered bytes are gone.
    pub fn close(&mut self) {
        self.fd = None;
        self.eof = true;
    }

    /// Reset to the freshly-created state.
    pub fn cleanup(&mut self) {
        self.close();
        self.beg_ix = 0;
        self.end_ix = 0;
    }
}

#[cfg(test)]
#[path = "chan_tests.rs"]
mod tests;
