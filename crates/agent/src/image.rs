// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The image stream: the bulk-data TCP endpoint of a session.
//!
//! Raw bytes, no framing; framing belongs to the control connections.
//! The endpoint either listens for the peer (backup target connects in)
//! or dials out, then moves bytes between the socket and its channel
//! buffer each quantum, in whichever direction the operation set.

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};

use thiserror::Error;
use tracing::{debug, trace};

use crate::chan::Chan;

/// Accept progress, inspected by the agent's LISTEN state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectStatus {
    /// Still waiting for the peer.
    Listen,
    /// Peer accepted; stream is live.
    Accepted,
    /// accept() failed; the session is not recoverable.
    Botched,
    /// Not listening at all.
    Idle,
}

/// Transfer direction relative to the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamMode {
    /// Recover: network bytes flow into the channel.
    Read,
    /// Backup: channel bytes flow out to the network.
    Write,
}

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub struct ImageStream {
    listener: Option<TcpListener>,
    stream: Option<TcpStream>,
    status: ConnectStatus,
    pub mode: Option<StreamMode>,
    pub chan: Chan,
}

impl Default for ImageStream {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageStream {
    pub fn new() -> Self {
        Self {
            listener: None,
            stream: None,
            status: ConnectStatus::Idle,
            mode: None,
            chan: Chan::new("image-stream"),
        }
    }

    /// Bind and listen for the peer; accept happens during the quantum.
    pub fn listen(&mut self, addr: SocketAddr) -> Result<SocketAddr, ImageError> {
        let listener = TcpListener::bind(addr)?;
        listener.set_nonblocking(true)?;
        let local = listener.local_addr()?;
        debug!(%local, "image stream listening");
        self.listener = Some(listener);
        self.status = ConnectStatus::Listen;
        Ok(local)
    }

    /// Dial the peer directly (the connect-mode data connection).
    pub fn connect(&mut self, addr: SocketAddr) -> Result<(), ImageError> {
        let stream = TcpStream::connect(addr)?;
        stream.set_nonblocking(true)?;
        self.stream = Some(stream);
        self.status = ConnectStatus::Accepted;
        Ok(())
    }

    /// One accept attempt; updates and returns the status.
    pub fn poll_accept(&mut self) -> ConnectStatus {
        if self.status != ConnectStatus::Listen {
            return self.status;
        }
        let Some(listener) = self.listener.as_ref() else {
            self.status = ConnectStatus::Botched;
            return self.status;
        };
        match listener.accept() {
            Ok((stream, peer)) => {
                debug!(%peer, "image stream accepted");
                if stream.set_nonblocking(true).is_err() {
                    self.status = ConnectStatus::Botched;
                    return self.status;
                }
                self.stream = Some(stream);
                self.listener = None;
                self.status = ConnectStatus::Accepted;
                self.status
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => ConnectStatus::Listen,
            Err(e) => {
                debug!(err = %e, "image stream accept botched");
                self.listener = None;
                self.status = ConnectStatus::Botched;
                self.status
            }
        }
    }

    pub fn status(&self) -> ConnectStatus {
        self.status
    }

    /// Set the transfer direction at operation start.
    pub fn start(&mut self, mode: StreamMode) {
        self.mode = Some(mode);
    }

    /// Non-blocking byte movement between socket and channel for one
    /// quantum. Returns true when anything moved.
    pub fn tick(&mut self) -> bool {
        let Some(mode) = self.mode else {
            return false;
        };
        let Some(stream) = self.stream.as_mut() else {
            return false;
        };
        let mut moved = false;
        match mode {
            StreamMode::Read => {
                if self.chan.eof {
                    return false;
                }
                if self.chan.n_avail() == 0 {
                    self.chan.compress();
                }
                let end = self.chan.end_ix;
                let cap = self.chan.data.len();
                if end < cap {
                    match stream.read(&mut self.chan.data[end..cap]) {
                        Ok(0) => {
                            trace!("image stream eof");
                            self.chan.eof = true;
                            moved = true;
                        }
                        Ok(n) => {
                            self.chan.end_ix += n;
                            moved = true;
                        }
                        Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {}
                        Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
                        Err(e) => {
                            debug!(err = %e, "image stream read error");
                            self.chan.eof = true;
                            moved = true;
                        }
                    }
                }
            }
            StreamMode::Write => {
                if self.chan.n_ready() > 0 {
                    let span = self.chan.beg_ix..self.chan.end_ix;
                    match stream.write(&self.chan.data[span]) {
                        Ok(n) if n > 0 => {
                            self.chan.consume(n);
                            moved = true;
                        }
                        Ok(_) => {}
                        Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {}
                        Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
                        Err(e) => {
                            debug!(err = %e, "image stream write error");
                            self.chan.eof = true;
                            moved = true;
                        }
                    }
                }
            }
        }
        moved
    }

    /// Shut the endpoint down; buffered bytes are gone with it.
    pub fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(std::net::Shutdown::Both);
        }
        self.listener = None;
        self.status = ConnectStatus::Idle;
        self.mode = None;
        self.chan.cleanup();
    }
}

#[cfg(test)]
#[path = "image_tests.rs"]
mod tests;
