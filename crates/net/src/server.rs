// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Thread-pool connection server.
//!
//! Binds every resolved listen address, polls across the listeners, and
//! hands each accepted connection to the bounded work queue as a
//! [`BSock`]. The accept loop itself never does protocol work.

use std::net::TcpListener;
use std::os::fd::AsFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use tracing::{debug, error, info};

use ndm_core::WorkQueue;

use crate::addr::{self, Family};
use crate::bsock::{BSock, BsockError};

/// Poll granularity of the accept loop; also the shutdown latency bound.
const ACCEPT_POLL_MS: u16 = 500;

#[derive(Debug)]
pub struct ConnServer {
    listeners: Vec<TcpListener>,
    quit: Arc<AtomicBool>,
}

impl ConnServer {
    /// Resolve and bind every listen address for `host` (wildcards when
    /// empty) at `port_spec`.
    pub fn bind(host: Option<&str>, family: Family, port_spec: &str) -> Result<Self, BsockError> {
        let endpoints = addr::resolve_addresses(host, family, port_spec)?;
        let mut listeners = Vec::new();
        for ep in &endpoints {
            match TcpListener::bind(ep.addr) {
                Ok(l) => {
                    l.set_nonblocking(true)?;
                    info!(addr = %ep.addr, "listening");
                    listeners.push(l);
                }
                Err(e) => {
                    // dual-stack kernels refuse the second wildcard bind
                    debug!(addr = %ep.addr, err = %e, "bind skipped");
                }
            }
        }
        if listeners.is_empty() {
            return Err(BsockError::Io(std::io::Error::new(
                std::io::ErrorKind::AddrNotAvailable,
                format!("no listen address bound for port {}", port_spec),
            )));
        }
        Ok(Self {
            listeners,
            quit: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Bind an explicit address list (the config's listen blocks).
    pub fn bind_list(addrs: &[std::net::SocketAddr]) -> Result<Self, BsockError> {
        let mut listeners = Vec::new();
        for addr in addrs {
            match TcpListener::bind(addr) {
                Ok(l) => {
                    l.set_nonblocking(true)?;
                    info!(%addr, "listening");
                    listeners.push(l);
                }
                Err(e) => debug!(%addr, err = %e, "bind skipped"),
            }
        }
        if listeners.is_empty() {
            return Err(BsockError::Io(std::io::Error::new(
                std::io::ErrorKind::AddrNotAvailable,
                "no configured listen address bound",
            )));
        }
        Ok(Self {
            listeners,
            quit: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Flag shared with the accept loop; setting it stops `run` within
    /// one poll interval.
    pub fn quit_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.quit)
    }

    pub fn local_ports(&self) -> Vec<u16> {
        self.listeners
            .iter()
            .filter_map(|l| l.local_addr().ok())
            .map(|a| a.port())
            .collect()
    }

    /// Accept until the quit flag is set, feeding connections into the
    /// worker pool.
    pub fn run(&self, pool: &WorkQueue<BSock>) {
        while !self.quit.load(Ordering::Relaxed) {
            let mut fds: Vec<PollFd> = self
                .listeners
                .iter()
                .map(|l| PollFd::new(l.as_fd(), PollFlags::POLLIN))
                .collect();
            match poll(&mut fds, PollTimeout::from(ACCEPT_POLL_MS)) {
                Ok(0) => continue,
                Ok(_) => {}
                Err(nix::errno::Errno::EINTR) => continue,
                Err(e) => {
                    error!(err = %e, "accept poll failed");
                    return;
                }
            }
            let ready: Vec<bool> = fds
                .iter()
                .map(|fd| {
                    fd.revents()
                        .is_some_and(|r| r.contains(PollFlags::POLLIN))
                })
                .collect();
            for (listener, ready) in self.listeners.iter().zip(ready) {
                if !ready {
                    continue;
                }
                match listener.accept() {
                    Ok((stream, peer)) => {
                        let _ = stream.set_nonblocking(false);
                        let sock =
                            BSock::from_stream(stream, "client", &peer.ip().to_string(), peer.port());
                        if let Err(e) = pool.add(sock, false) {
                            error!(err = %e, "connection dropped: pool closed");
                            return;
                        }
                    }
                    Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {}
                    Err(e) => error!(err = %e, "accept failed"),
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "server_tests.rs"]
mod tests;
