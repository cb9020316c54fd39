// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Minimal RFC 3164 writer to `/dev/log`.
//!
//! Messages are split on newlines into chunks of at most 1023 bytes and
//! sent as one datagram each. A missing syslog socket (containers,
//! tests) degrades to a no-op.

use std::os::unix::net::UnixDatagram;

use parking_lot::Mutex;

/// syslog(3) chunk ceiling.
pub const SYSLOG_CHUNK: usize = 1023;

const LOG_DAEMON: u8 = 3 << 3;

/// Severities mirroring syslog(3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Err = 3,
    Warning = 4,
    Notice = 5,
    Info = 6,
    Debug = 7,
}

pub struct Syslog {
    tag: String,
    sock: Mutex<Option<UnixDatagram>>,
}

impl Syslog {
    pub fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_string(),
            sock: Mutex::new(None),
        }
    }

    /// Send `body`, chunked per the syslog limit.
    pub fn log(&self, severity: Severity, body: &str) {
        for line in body.split('\n') {
            if line.is_empty() {
                continue;
            }
            let mut rest = line.as_bytes();
            while !rest.is_empty() {
                let take = rest.len().min(SYSLOG_CHUNK);
                self.send_chunk(severity, &rest[..take]);
                rest = &rest[take..];
            }
        }
    }

    fn send_chunk(&self, severity: Severity, chunk: &[u8]) {
        let mut guard = self.sock.lock();
        if guard.is_none() {
            let sock = UnixDatagram::unbound().ok();
            *guard = sock;
        }
        let Some(sock) = guard.as_ref() else { return };

        let pri = LOG_DAEMON | severity as u8;
        let mut datagram = format!("<{}>{}: ", pri, self.tag).into_bytes();
        datagram.extend_from_slice(chunk);
        if sock.send_to(&datagram, "/dev/log").is_err() {
            // no syslogd here; drop quietly and retry next time
            *guard = None;
        }
    }
}

#[cfg(test)]
#[path = "syslog_tests.rs"]
mod tests;
