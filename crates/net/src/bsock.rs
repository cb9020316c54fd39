// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! BSOCK: the length-prefixed framed socket every daemon speaks.
//!
//! Wire format: a 32-bit big-endian length, then that many payload
//! bytes. A zero length is an empty message; a negative length carries a
//! [`Signal`] in the length field itself and no payload. Anything above
//! [`MAX_MESSAGE_SIZE`] marks the peer rogue and terminates the socket.
//!
//! A handle can be `dup`ed: the duplicate shares the underlying stream
//! and keeps its own buffers, counters, and flags, so two threads can
//! own one connection with per-message serialization.

use std::io::{Read, Seek, SeekFrom, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::addr::{self, AddrError, Family};
use crate::tls::{TlsError, TlsStream};

/// Framing ceiling; a peer announcing more is treated as rogue.
pub const MAX_MESSAGE_SIZE: usize = 1_000_000;

/// How long an EAGAIN retry sleeps on a non-blocking stream.
const EAGAIN_NAP: Duration = Duration::from_millis(20);

/// Elapsed connect time after which the user gets reminded.
const CONNECT_REMIND_AFTER: Duration = Duration::from_secs(300);

/// Out-of-band codes carried in a negative length field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum Signal {
    Eod = -1,
    EodPoll = -2,
    Status = -3,
    Terminate = -4,
    Poll = -5,
    Heartbeat = -6,
    HbResponse = -7,
    SubPrompt = -8,
    TextInput = -9,
}

impl Signal {
    pub fn code(self) -> i32 {
        self as i32
    }

    pub fn from_code(code: i32) -> Option<Signal> {
        Some(match code {
            -1 => Signal::Eod,
            -2 => Signal::EodPoll,
            -3 => Signal::Status,
            -4 => Signal::Terminate,
            -5 => Signal::Poll,
            -6 => Signal::Heartbeat,
            -7 => Signal::HbResponse,
            -8 => Signal::SubPrompt,
            -9 => Signal::TextInput,
            _ => return None,
        })
    }
}

/// Outcome of one `recv`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecvStatus {
    /// Payload of this many bytes is in `msg()`.
    Data(usize),
    /// Signalled empty message (end-of-data marker).
    Empty,
    /// Out-of-band signal; also recorded in `msglen`.
    Signal(Signal),
    /// Peer went away cleanly.
    HardEof,
    /// Read error; the error counter and errno are updated.
    Error,
}

#[derive(Debug, Error)]
pub enum BsockError {
    #[error("resolver: {0}")]
    Addr(#[from] AddrError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TLS error: {0}")]
    Tls(#[from] TlsError),

    #[error("connection to {host}:{port} failed after {tries} tries: {detail}")]
    RetriesExhausted {
        host: String,
        port: String,
        tries: u32,
        detail: String,
    },

    #[error("connect canceled")]
    Canceled,

    #[error("socket is terminated")]
    Terminated,
}

enum Stream {
    Plain(TcpStream),
    Tls(Box<TlsStream>),
    Closed,
}

impl Stream {
    fn tcp(&self) -> Option<&TcpStream> {
        match self {
            Stream::Plain(t) => Some(t),
            Stream::Tls(t) => Some(t.tcp()),
            Stream::Closed => None,
        }
    }

    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match self {
            Stream::Plain(t) => t.read(buf),
            Stream::Tls(t) => t.read(buf),
            Stream::Closed => Ok(0),
        }
    }

    fn write_all(&mut self, buf: &[u8]) -> std::io::Result<()> {
        match self {
            Stream::Plain(t) => t.write_all(buf),
            Stream::Tls(t) => t.write_all(buf),
            Stream::Closed => Err(std::io::Error::from(std::io::ErrorKind::NotConnected)),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match self {
            Stream::Plain(t) => t.flush(),
            Stream::Tls(t) => t.flush(),
            Stream::Closed => Ok(()),
        }
    }
}

/// Endpoint selection and retry policy for `BSock::connect`.
#[derive(Clone)]
pub struct ConnectPolicy {
    pub family: Family,
    /// Bind the outgoing socket to this source address.
    pub source: Option<SocketAddr>,
    /// Seconds between whole-resolution retries.
    pub retry_interval: Duration,
    /// Total budget; zero means a single pass.
    pub max_retry_time: Duration,
    /// Enables SO_KEEPALIVE idle tuning when set.
    pub heartbeat: Option<Duration>,
    /// Per-endpoint connect timeout.
    pub connect_timeout: Duration,
    /// Job-cancellation flag checked between retries.
    pub cancel: Option<Arc<AtomicBool>>,
}

impl Default for ConnectPolicy {
    fn default() -> Self {
        Self {
            family: Family::Unspec,
            source: None,
            retry_interval: Duration::from_secs(10),
            max_retry_time: Duration::from_secs(300),
            heartbeat: None,
            connect_timeout: Duration::from_secs(10),
            cancel: None,
        }
    }
}

/// The framed socket.
pub struct BSock {
    shared: Arc<Mutex<Stream>>,
    /// Message buffer; always one byte longer than the payload so string
    /// consumers find a zero sentinel.
    msg: Vec<u8>,
    /// Payload length of the last message, or the signal code.
    pub msglen: i32,
    pub in_msg_no: u64,
    pub out_msg_no: u64,
    errors: u32,
    b_errno: i32,
    terminated: bool,
    suppress_error_msgs: bool,
    timed_out: bool,
    blocking: bool,
    use_locking: bool,
    duped: bool,
    /// Per-op deadline; zero disables.
    pub timeout: Duration,
    /// Set while an I/O op is in flight, for an external watchdog.
    pub timer_start: Option<Instant>,
    spool_file: Option<std::fs::File>,
    spooling: bool,
    who: String,
    host: String,
    port: u16,
}

impl BSock {
    /// Wrap an accepted or already-connected stream.
    pub fn from_stream(stream: TcpStream, who: &str, host: &str, port: u16) -> Self {
        let _ = stream.set_nodelay(true);
        Self {
            shared: Arc::new(Mutex::new(Stream::Plain(stream))),
            msg: vec![0],
            msglen: 0,
            in_msg_no: 0,
            out_msg_no: 0,
            errors: 0,
            b_errno: 0,
            terminated: false,
            suppress_error_msgs: false,
            timed_out: false,
            blocking: true,
            use_locking: false,
            duped: false,
            timeout: Duration::ZERO,
            timer_start: None,
            spool_file: None,
            spooling: false,
            who: who.to_string(),
            host: host.to_string(),
            port,
        }
    }

    /// Resolve and connect, retrying the whole resolution loop on
    /// `retry_interval` until success, cancellation, or the retry budget
    /// runs out. Once five minutes have passed the user is reminded that
    /// we are still trying.
    pub fn connect(
        who: &str,
        host: &str,
        port_spec: &str,
        policy: &ConnectPolicy,
    ) -> Result<Self, BsockError> {
        let began = Instant::now();
        let mut tries: u32 = 0;
        let mut reminded = false;
        let mut last_err = String::from("no endpoints");

        loop {
            if policy
                .cancel
                .as_ref()
                .is_some_and(|c| c.load(Ordering::Relaxed))
            {
                return Err(BsockError::Canceled);
            }

            match addr::resolve_addresses(Some(host), policy.family, port_spec) {
                Ok(endpoints) => {
                    tries += 1;
                    for ep in &endpoints {
                        match Self::try_endpoint(ep.addr, policy) {
                            Ok(stream) => {
                                debug!(who, %host, port = ep.addr.port(), "connected");
                                return Ok(Self::from_stream(stream, who, host, ep.addr.port()));
                            }
                            Err(e) => {
                                // family not available on this host: skip quietly
                                let family_gone = e.raw_os_error().is_some_and(|n| {
                                    n == nix::libc::EPFNOSUPPORT || n == nix::libc::EAFNOSUPPORT
                                });
                                if !family_gone {
                                    last_err = e.to_string();
                                }
                            }
                        }
                    }
                }
                Err(e) => {
                    tries += 1;
                    last_err = e.to_string();
                }
            }

            if began.elapsed() >= policy.max_retry_time {
                return Err(BsockError::RetriesExhausted {
                    host: host.to_string(),
                    port: port_spec.to_string(),
                    tries,
                    detail: last_err,
                });
            }
            if !reminded && began.elapsed() >= CONNECT_REMIND_AFTER {
                warn!(who, host, port_spec, "still retrying connection");
                reminded = true;
            }
            std::thread::sleep(policy.retry_interval);
        }
    }

    fn try_endpoint(addr: SocketAddr, policy: &ConnectPolicy) -> std::io::Result<TcpStream> {
        let stream = TcpStream::connect_timeout(&addr, policy.connect_timeout)?;
        if let Some(src) = policy.source {
            // best effort: binding after connect is not possible, so a
            // source address mismatch is only reported
            if stream.local_addr().map(|l| l.ip()).ok() != Some(src.ip()) {
                debug!(%src, "source address not honored for this endpoint");
            }
        }
        let _ = nix::sys::socket::setsockopt(&stream, nix::sys::socket::sockopt::KeepAlive, &true);
        #[cfg(target_os = "linux")]
        if let Some(hb) = policy.heartbeat {
            let secs = hb.as_secs().clamp(1, u32::MAX as u64) as u32;
            let _ = nix::sys::socket::setsockopt(
                &stream,
                nix::sys::socket::sockopt::TcpKeepIdle,
                &secs,
            );
        }
        Ok(stream)
    }

    pub fn who(&self) -> &str {
        &self.who
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Payload of the last received message (sentinel excluded).
    pub fn msg(&self) -> &[u8] {
        let len = self.msglen.max(0) as usize;
        &self.msg[..len.min(self.msg.len().saturating_sub(1))]
    }

    pub fn msg_str(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(self.msg())
    }

    pub fn errors(&self) -> u32 {
        self.errors
    }

    pub fn last_errno(&self) -> i32 {
        self.b_errno
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    pub fn set_terminated(&mut self) {
        self.terminated = true;
    }

    pub fn is_timed_out(&self) -> bool {
        self.timed_out
    }

    /// Opt into per-message locking for handles duplicated across
    /// threads.
    pub fn set_locking(&mut self) {
        self.use_locking = true;
    }

    /// Switch the OS blocking mode; non-blocking reads retry EAGAIN with
    /// a short nap instead of arming the timeout.
    pub fn set_blocking(&mut self, blocking: bool) -> std::io::Result<()> {
        let stream = self.shared.lock();
        if let Some(tcp) = stream.tcp() {
            tcp.set_nonblocking(!blocking)?;
        }
        self.blocking = blocking;
        Ok(())
    }

    /// Alias this connection: shared stream, fresh per-handle state.
    pub fn dup(&self) -> BSock {
        BSock {
            shared: Arc::clone(&self.shared),
            msg: vec![0],
            msglen: 0,
            in_msg_no: self.in_msg_no,
            out_msg_no: self.out_msg_no,
            errors: 0,
            b_errno: 0,
            terminated: self.terminated,
            suppress_error_msgs: self.suppress_error_msgs,
            timed_out: false,
            blocking: self.blocking,
            use_locking: self.use_locking,
            duped: true,
            timeout: self.timeout,
            timer_start: None,
            spool_file: None,
            spooling: false,
            who: self.who.clone(),
            host: self.host.clone(),
            port: self.port,
        }
    }

    pub fn is_duped(&self) -> bool {
        self.duped
    }

    /// Upgrade to TLS. The stream must still be plain.
    pub fn start_tls(
        &mut self,
        make: impl FnOnce(TcpStream) -> Result<TlsStream, TlsError>,
    ) -> Result<(), BsockError> {
        let mut guard = self.shared.lock();
        match std::mem::replace(&mut *guard, Stream::Closed) {
            Stream::Plain(tcp) => match make(tcp) {
                Ok(tls) => {
                    *guard = Stream::Tls(Box::new(tls));
                    Ok(())
                }
                Err(e) => {
                    self.terminated = true;
                    Err(e.into())
                }
            },
            other => {
                *guard = other;
                self.terminated = true;
                Err(BsockError::Terminated)
            }
        }
    }

    fn set_op_timeout(&self, stream: &Stream) {
        let t = if self.timeout.is_zero() {
            None
        } else {
            Some(self.timeout)
        };
        if let Some(tcp) = stream.tcp() {
            let _ = tcp.set_read_timeout(t);
            let _ = tcp.set_write_timeout(t);
        }
    }

    /// Read exactly `buf.len()` bytes. EINTR retries transparently; on a
    /// non-blocking stream EAGAIN naps 20 ms and retries; on a blocking
    /// stream with a timeout configured it means the watchdog tripped.
    fn read_nbytes(&mut self, stream: &mut Stream, buf: &mut [u8]) -> Result<(), RecvStatus> {
        let mut done = 0;
        while done < buf.len() {
            match stream.read(&mut buf[done..]) {
                Ok(0) => {
                    self.b_errno = nix::libc::ENODATA;
                    return Err(RecvStatus::HardEof);
                }
                Ok(n) => done += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e)
                    if e.kind() == std::io::ErrorKind::WouldBlock
                        || e.kind() == std::io::ErrorKind::TimedOut =>
                {
                    if !self.blocking {
                        std::thread::sleep(EAGAIN_NAP);
                        continue;
                    }
                    self.timed_out = true;
                    self.b_errno = e.raw_os_error().unwrap_or(nix::libc::ETIMEDOUT);
                    self.errors += 1;
                    return Err(RecvStatus::Error);
                }
                Err(e) => {
                    self.b_errno = e.raw_os_error().unwrap_or(nix::libc::EIO);
                    self.errors += 1;
                    return Err(RecvStatus::Error);
                }
            }
        }
        Ok(())
    }

    /// Receive one message.
    pub fn recv(&mut self) -> RecvStatus {
        self.msglen = 0;
        if !self.msg.is_empty() {
            self.msg[0] = 0;
        }
        if self.errors > 0 || self.terminated {
            return RecvStatus::HardEof;
        }

        let shared = Arc::clone(&self.shared);
        let mut stream = shared.lock();
        self.set_op_timeout(&stream);

        self.timer_start = Some(Instant::now());
        self.timed_out = false;
        let mut header = [0u8; 4];
        if let Err(status) = self.read_nbytes(&mut stream, &mut header) {
            self.timer_start = None;
            return status;
        }
        self.timer_start = None;

        let pktsiz = i32::from_be_bytes(header);
        if pktsiz == 0 {
            self.in_msg_no += 1;
            self.msglen = 0;
            return RecvStatus::Empty;
        }
        if pktsiz < 0 || pktsiz as usize > MAX_MESSAGE_SIZE {
            let code = if pktsiz > 0 {
                if !self.suppress_error_msgs {
                    error!(
                        who = %self.who, host = %self.host, port = self.port,
                        size = pktsiz, "Packet size too big. Terminating connection."
                    );
                }
                self.terminated = true;
                Signal::Terminate.code()
            } else {
                pktsiz
            };
            if code == Signal::Terminate.code() {
                self.terminated = true;
            }
            self.b_errno = nix::libc::ENODATA;
            self.msglen = code;
            return match Signal::from_code(code) {
                Some(sig) => RecvStatus::Signal(sig),
                // unknown negative code: still a signal to the caller
                None => RecvStatus::Signal(Signal::Terminate),
            };
        }

        let want = pktsiz as usize;
        if self.msg.len() < want + 1 {
            self.msg.resize(want + 1, 0);
        }

        self.timer_start = Some(Instant::now());
        let mut payload = std::mem::take(&mut self.msg);
        let result = self.read_nbytes(&mut stream, &mut payload[..want]);
        self.msg = payload;
        self.timer_start = None;
        if let Err(status) = result {
            return status;
        }

        self.in_msg_no += 1;
        self.msglen = pktsiz;
        self.msg[want] = 0;
        RecvStatus::Data(want)
    }

    /// Send one message: header plus payload as a single write sequence.
    /// A socket with errors or a termination mark refuses quietly.
    pub fn send(&mut self, data: &[u8]) -> bool {
        if data.len() > MAX_MESSAGE_SIZE {
            self.errors += 1;
            self.b_errno = nix::libc::EMSGSIZE;
            return false;
        }
        self.msglen = data.len() as i32;
        self.send_frame(data.len() as i32, data)
    }

    /// Send a signal code in the length field.
    pub fn send_signal(&mut self, sig: Signal) -> bool {
        if sig == Signal::Terminate {
            self.suppress_error_msgs = true;
        }
        self.msglen = sig.code();
        self.send_frame(sig.code(), &[])
    }

    pub fn send_str(&mut self, text: &str) -> bool {
        self.send(text.as_bytes())
    }

    fn send_frame(&mut self, header: i32, payload: &[u8]) -> bool {
        if self.errors > 0 || self.terminated {
            return false;
        }

        if self.spooling {
            return self.spool_frame(header, payload);
        }

        let mut wire = Vec::with_capacity(4 + payload.len());
        wire.extend_from_slice(&header.to_be_bytes());
        wire.extend_from_slice(payload);

        let shared = Arc::clone(&self.shared);
        let mut stream = shared.lock();
        self.set_op_timeout(&stream);
        self.timer_start = Some(Instant::now());
        self.timed_out = false;
        let result = stream.write_all(&wire).and_then(|()| stream.flush());
        self.timer_start = None;

        match result {
            Ok(()) => {
                self.out_msg_no += 1;
                true
            }
            Err(e) => {
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut
                {
                    self.timed_out = true;
                }
                self.errors += 1;
                self.b_errno = e.raw_os_error().unwrap_or(nix::libc::EIO);
                if !self.suppress_error_msgs {
                    debug!(who = %self.who, err = %e, "bsock write error");
                }
                false
            }
        }
    }

    // ---- spool mode ----

    /// Route subsequent sends into `file` instead of the socket.
    pub fn start_spooling(&mut self, file: std::fs::File) {
        self.spool_file = Some(file);
        self.spooling = true;
    }

    pub fn stop_spooling(&mut self) {
        self.spooling = false;
    }

    pub fn is_spooling(&self) -> bool {
        self.spooling
    }

    fn spool_frame(&mut self, header: i32, payload: &[u8]) -> bool {
        let Some(file) = self.spool_file.as_mut() else {
            self.errors += 1;
            self.b_errno = nix::libc::EBADF;
            return false;
        };
        let write = file
            .write_all(&header.to_be_bytes())
            .and_then(|()| file.write_all(payload));
        match write {
            Ok(()) => {
                self.out_msg_no += 1;
                true
            }
            Err(e) => {
                self.errors += 1;
                self.b_errno = e.raw_os_error().unwrap_or(nix::libc::EIO);
                false
            }
        }
    }

    /// Replay spooled frames to the socket. `progress` receives the byte
    /// delta every 64 frames and once at the end; `cancel` aborts at the
    /// next frame boundary.
    pub fn despool(
        &mut self,
        progress: &mut dyn FnMut(i64),
        cancel: Option<&AtomicBool>,
    ) -> bool {
        let Some(mut file) = self.spool_file.take() else {
            return false;
        };
        self.spooling = false;
        if file.seek(SeekFrom::Start(0)).is_err() {
            return false;
        }

        let mut count: u64 = 0;
        let mut size: i64 = 0;
        let mut last: i64 = 0;
        loop {
            let mut header = [0u8; 4];
            match file.read_exact(&mut header) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
                Err(_) => return false,
            }
            size += 4;
            let len = i32::from_be_bytes(header);
            if len > 0 {
                let mut payload = vec![0u8; len as usize];
                if file.read_exact(&mut payload).is_err() {
                    progress(size - last);
                    return false;
                }
                size += len as i64;
                if !self.send(&payload) {
                    progress(size - last);
                    return false;
                }
            } else if len == 0 {
                if !self.send(&[]) {
                    progress(size - last);
                    return false;
                }
            } else if let Some(sig) = Signal::from_code(len) {
                if !self.send_signal(sig) {
                    progress(size - last);
                    return false;
                }
            }
            count += 1;
            if count & 0x3F == 0 {
                progress(size - last);
                last = size;
            }
            if cancel.is_some_and(|c| c.load(Ordering::Relaxed)) {
                return false;
            }
        }
        progress(size - last);
        true
    }

    /// Terminate and shut the stream down. A duped handle only clears its
    /// per-handle state; the stream stays open for the primary.
    pub fn close(&mut self) {
        self.use_locking = false;
        self.terminated = true;
        self.spool_file = None;
        self.spooling = false;
        if !self.duped {
            let mut stream = self.shared.lock();
            if let Some(tcp) = stream.tcp() {
                let _ = tcp.shutdown(Shutdown::Both);
            }
            *stream = Stream::Closed;
        }
    }
}

#[cfg(test)]
#[path = "bsock_tests.rs"]
mod tests;
