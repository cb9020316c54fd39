// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The data-agent control block and its state machine.
//!
//! ```text
//! IDLE → LISTEN → CONNECTED → ACTIVE → HALTED → IDLE
//!          └────────→ HALTED[CONNECT_ERROR]
//! IDLE | CONNECTED → ACTIVE   (start_backup / start_recover[_fh])
//! ```
//!
//! Each quantum dispatches by state; ACTIVE runs the stderr, wrap, and
//! image pumps in that fixed order so a final log line and a success
//! transition from the same tick arrive in that order. Every other
//! transition attempt is a programming error and says so.

use nix::sys::signal::{kill, Signal as UnixSignal};
use nix::unistd::Pid;
use thiserror::Error;
use tracing::{debug, warn};

use ndm_core::collect::Sequence;
use ndm_wrap::{WrapError, WrapMsg};

use crate::chan::Chan;
use crate::command::format_command;
use crate::fhist::{FileHistory, FileStatV9};
use crate::image::{ConnectStatus, ImageStream, StreamMode};
use crate::spawn::{pipe_fork_exec, FdSpec};

/// Grace given to the formatter before SIGTERM at halt.
const HALT_GRACE: std::time::Duration = std::time::Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Idle,
    Listen,
    Connected,
    Active,
    Halted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    None,
    Backup,
    Recover,
    RecoverFilehist,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HaltReason {
    Na,
    Successful,
    Aborted,
    ConnectError,
    InternalError,
}

/// One recovery-name entry (what to restore, where to).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NlistEntry {
    pub original_path: String,
    pub fh_info: Option<u64>,
    pub destination_path: String,
}

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("invalid transition: {event} while {state:?}")]
    BotchedState {
        state: State,
        event: &'static str,
    },

    #[error("spawn failed: {0}")]
    Spawn(std::io::Error),

    #[error("image stream: {0}")]
    Image(#[from] crate::image::ImageError),
}

/// Where a recovery DATA_READ goes: a co-located mover is invoked
/// directly, a TCP peer gets the notification upstream.
pub enum MoverLink {
    /// Tape agent in this process; the callback performs the read and
    /// reports success.
    Local(Box<dyn FnMut(u64, u64) -> bool + Send>),
    /// Remote peer over the image stream.
    Tcp,
    /// Connection kind that cannot serve reads.
    Unsupported,
}

/// Upstream notifications toward the control agent.
pub trait ControlLink: Send {
    /// Forward one formatter log line.
    fn log_normal(&mut self, text: &str);
    /// Debug-level chatter (command lines, malformed wrap lines).
    fn log_debug(&mut self, text: &str);
    /// The one-shot halt notification.
    fn notify_data_halted(&mut self, reason: HaltReason);
    /// Ask the peer to send `[offset, offset+length)` of the image.
    fn notify_data_read(&mut self, offset: u64, length: u64);
}

pub struct DataAgent {
    state: State,
    operation: Op,
    halt_reason: HaltReason,
    /// Selects the `wrap_<bu_type>` binary.
    pub bu_type: String,
    pub log_level: u32,
    pub env_tab: Sequence<(String, String)>,
    pub nlist_tab: Sequence<NlistEntry>,
    child: Option<std::process::Child>,
    error_chan: Chan,
    wrap_chan: Chan,
    image_chan: Chan,
    pub image_stream: ImageStream,
    pub mover: MoverLink,
    pub enable_hist: bool,
    /// Byte budget for the current history pass; only consulted when
    /// `enable_hist` is set.
    pub pass_resid: u64,
    pub bytes_processed: u64,
    notify_pending: bool,
    warned_unimplemented: bool,
}

impl Default for DataAgent {
    fn default() -> Self {
        Self::new()
    }
}

impl DataAgent {
    pub fn new() -> Self {
        Self {
            state: State::Idle,
            operation: Op::None,
            halt_reason: HaltReason::Na,
            bu_type: String::new(),
            log_level: 0,
            env_tab: Sequence::new(),
            nlist_tab: Sequence::new(),
            child: None,
            error_chan: Chan::new("formatter-error"),
            wrap_chan: Chan::new("formatter-wrap"),
            image_chan: Chan::new("formatter-image"),
            image_stream: ImageStream::new(),
            mover: MoverLink::Tcp,
            enable_hist: false,
            pass_resid: 0,
            bytes_processed: 0,
            notify_pending: false,
            warned_unimplemented: false,
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn operation(&self) -> Op {
        self.operation
    }

    pub fn halt_reason(&self) -> HaltReason {
        self.halt_reason
    }

    pub fn notify_pending(&self) -> bool {
        self.notify_pending
    }

    pub fn formatter_pid(&self) -> Option<u32> {
        self.child.as_ref().map(std::process::Child::id)
    }

    fn guard(&self, allowed: &[State], event: &'static str) -> Result<(), AgentError> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(AgentError::BotchedState {
                state: self.state,
                event,
            })
        }
    }

    // ---- transitions ----

    /// IDLE → LISTEN: open the image-stream listener.
    pub fn data_listen(&mut self, addr: std::net::SocketAddr) -> Result<std::net::SocketAddr, AgentError> {
        self.guard(&[State::Idle], "data_listen")?;
        let local = self.image_stream.listen(addr)?;
        self.state = State::Listen;
        self.halt_reason = HaltReason::Na;
        Ok(local)
    }

    /// IDLE → CONNECTED: dial the peer directly.
    pub fn data_connect(&mut self, addr: std::net::SocketAddr) -> Result<(), AgentError> {
        self.guard(&[State::Idle], "data_connect")?;
        self.image_stream.connect(addr)?;
        self.state = State::Connected;
        self.halt_reason = HaltReason::Na;
        Ok(())
    }

    pub fn start_backup(&mut self) -> Result<(), AgentError> {
        self.guard(&[State::Idle, State::Connected], "start_backup")?;
        let cmd = format_command(
            &self.bu_type,
            Op::Backup,
            self.log_level,
            &self.env_tab,
            &self.nlist_tab,
        );
        self.spawn_formatter(&cmd, Op::Backup)?;
        self.image_stream.start(StreamMode::Write);
        self.state = State::Active;
        self.operation = Op::Backup;
        Ok(())
    }

    pub fn start_recover(&mut self) -> Result<(), AgentError> {
        self.guard(&[State::Idle, State::Connected], "start_recover")?;
        let cmd = format_command(
            &self.bu_type,
            Op::Recover,
            self.log_level,
            &self.env_tab,
            &self.nlist_tab,
        );
        self.spawn_formatter(&cmd, Op::Recover)?;
        self.image_stream.start(StreamMode::Read);
        self.state = State::Active;
        self.operation = Op::Recover;
        Ok(())
    }

    pub fn start_recover_filehist(&mut self) -> Result<(), AgentError> {
        self.guard(&[State::Idle, State::Connected], "start_recover_filehist")?;
        let cmd = format_command(
            &self.bu_type,
            Op::RecoverFilehist,
            self.log_level,
            &self.env_tab,
            &self.nlist_tab,
        );
        self.spawn_formatter(&cmd, Op::RecoverFilehist)?;
        self.image_stream.start(StreamMode::Read);
        self.state = State::Active;
        self.operation = Op::RecoverFilehist;
        Ok(())
    }

    fn spawn_formatter(&mut self, cmd: &str, op: Op) -> Result<(), AgentError> {
        debug!(cmd, "formatter command");
        let fdmap = match op {
            // backup: image flows out of the formatter's stdout
            Op::Backup => [FdSpec::DevNull, FdSpec::OutputPipe, FdSpec::OutputPipe],
            // recover: image flows into the formatter's stdin
            _ => [FdSpec::InputPipe, FdSpec::DevNull, FdSpec::OutputPipe],
        };
        let spawned = pipe_fork_exec(cmd, fdmap).map_err(AgentError::Spawn)?;
        let crate::spawn::Spawned {
            child,
            to_stdin,
            from_stdout,
            from_stderr,
            from_wrap,
        } = spawned;

        if let Some(fd) = from_stderr {
            self.error_chan.attach(fd);
        }
        if let Some(fd) = from_stdout {
            self.image_chan.attach(fd);
        }
        if let Some(fd) = to_stdin {
            self.image_chan.attach(fd);
        }
        self.wrap_chan.attach(from_wrap);

        self.child = Some(child);
        Ok(())
    }

    /// ACTIVE (any) → HALTED[ABORTED].
    pub fn abort(&mut self, fh: &mut dyn FileHistory) {
        self.halt(HaltReason::Aborted, fh);
    }

    /// Record the halt, flush history, close the plumbing, and give the
    /// formatter its grace period before SIGTERM. The notification goes
    /// out with the next `send_notice`.
    pub fn halt(&mut self, reason: HaltReason, fh: &mut dyn FileHistory) {
        debug!(?reason, "data agent halt");
        self.state = State::Halted;
        self.halt_reason = reason;
        self.notify_pending = true;

        fh.flush();

        self.image_stream.close();
        self.image_chan.cleanup();
        self.error_chan.cleanup();
        self.wrap_chan.cleanup();

        if let Some(mut child) = self.child.take() {
            match child.try_wait() {
                Ok(Some(_)) => {}
                _ => {
                    std::thread::sleep(HALT_GRACE);
                    if let Ok(None) = child.try_wait() {
                        let _ = kill(Pid::from_raw(child.id() as i32), UnixSignal::SIGTERM);
                    }
                    let _ = child.wait();
                }
            }
        }
    }

    /// HALTED → IDLE: decommission the agent for the next operation.
    pub fn stop(&mut self) -> Result<(), AgentError> {
        self.guard(&[State::Halted], "stop")?;
        self.state = State::Idle;
        self.operation = Op::None;
        self.halt_reason = HaltReason::Na;
        self.env_tab.clear();
        self.nlist_tab.clear();
        self.bytes_processed = 0;
        self.enable_hist = false;
        self.pass_resid = 0;
        self.warned_unimplemented = false;
        self.bu_type.clear();
        Ok(())
    }

    // ---- quantum ----

    /// One cooperative tick. Returns whether anything happened.
    pub fn quantum(&mut self, control: &mut dyn ControlLink, fh: &mut dyn FileHistory) -> bool {
        let mut did_something = false;

        match self.state {
            State::Idle | State::Halted | State::Connected => {}
            State::Listen => match self.image_stream.poll_accept() {
                ConnectStatus::Listen => {}
                ConnectStatus::Accepted => {
                    self.state = State::Connected;
                    self.halt_reason = HaltReason::Na;
                    did_something = true;
                }
                ConnectStatus::Botched | ConnectStatus::Idle => {
                    self.halt(HaltReason::ConnectError, fh);
                    did_something = true;
                }
            },
            State::Active => {
                // fd readiness work first, then the pumps in fixed order
                did_something |= self.error_chan.fill();
                did_something |= self.wrap_chan.fill();
                did_something |= self.image_stream.tick();
                let is_backup = self.operation == Op::Backup;
                if is_backup {
                    did_something |= self.image_chan.fill();
                } else {
                    did_something |= self.image_chan.drain();
                    // all incoming image bytes delivered: close the
                    // formatter's stdin so it can finish
                    if self.image_chan.eof
                        && self.image_chan.n_ready() == 0
                        && self.image_chan.has_fd()
                    {
                        self.image_chan.close();
                        did_something = true;
                    }
                }

                did_something |= self.quantum_stderr(control);
                did_something |= self.quantum_wrap(control, fh);
                did_something |= self.quantum_image(fh);
            }
        }

        self.send_notice(control);
        did_something
    }

    /// Drain the one-shot halt notification.
    pub fn send_notice(&mut self, control: &mut dyn ControlLink) {
        if !self.notify_pending {
            return;
        }
        self.notify_pending = false;
        if self.state == State::Halted {
            control.notify_data_halted(self.halt_reason);
        }
    }

    /// stderr pump: every complete line goes upstream as a normal log
    /// message; a partial line at EOF gets a synthetic newline so the
    /// residue is reported exactly once.
    fn quantum_stderr(&mut self, control: &mut dyn ControlLink) -> bool {
        let mut did_something = false;
        loop {
            match take_line(&mut self.error_chan) {
                LineStep::Line(line) => {
                    control.log_normal(&line);
                    did_something = true;
                }
                LineStep::Again => did_something = true,
                LineStep::Blocked => return did_something,
            }
        }
    }

    /// wrap pump: complete lines go through the WRAP parser and fan out
    /// to logging, file history, or data-read handling. EOF on this
    /// channel during a recover is the success signal.
    fn quantum_wrap(&mut self, control: &mut dyn ControlLink, fh: &mut dyn FileHistory) -> bool {
        let is_recover = matches!(self.operation, Op::Recover | Op::RecoverFilehist);
        let mut did_something = false;
        loop {
            match take_line(&mut self.wrap_chan) {
                LineStep::Line(line) => {
                    self.wrap_in(&line, control, fh);
                    did_something = true;
                    if self.state != State::Active {
                        return true;
                    }
                }
                LineStep::Again => did_something = true,
                LineStep::Blocked => break,
            }
        }
        if self.wrap_chan.n_ready() == 0 && self.wrap_chan.eof && is_recover {
            self.halt(HaltReason::Successful, fh);
            return true;
        }
        did_something
    }

    /// image pump: directional copy between the formatter image channel
    /// and the image stream, bounded by the receiver's space and (in
    /// history mode) the pass budget.
    fn quantum_image(&mut self, fh: &mut dyn FileHistory) -> bool {
        if self.operation == Op::None {
            return false;
        }
        let enable_hist = self.enable_hist;
        let mut did_something = false;
        loop {
            let pass_resid = self.pass_resid;
            let is_backup = self.operation == Op::Backup;
            let step = {
                let (from, to) = if is_backup {
                    (&mut self.image_chan, &mut self.image_stream.chan)
                } else {
                    (&mut self.image_stream.chan, &mut self.image_chan)
                };

                let n_ready = from.n_ready();
                if n_ready == 0 {
                    if from.eof {
                        to.eof = true;
                        if to.n_ready() == 0 && is_backup {
                            CopyStep::BackupDone
                        } else {
                            CopyStep::Blocked
                        }
                    } else {
                        CopyStep::Blocked
                    }
                } else {
                    if to.n_avail() == 0 {
                        to.compress();
                    }
                    let mut n_copy = n_ready.min(to.n_avail());
                    if enable_hist {
                        n_copy = n_copy.min(pass_resid as usize);
                    }
                    if n_copy == 0 {
                        CopyStep::Blocked
                    } else {
                        let span = from.beg_ix..from.beg_ix + n_copy;
                        let dst = to.end_ix;
                        to.data[dst..dst + n_copy].copy_from_slice(&from.data[span]);
                        from.consume(n_copy);
                        to.end_ix += n_copy;
                        CopyStep::Copied(n_copy)
                    }
                }
            };
            match step {
                CopyStep::Copied(n) => {
                    self.bytes_processed += n as u64;
                    if enable_hist {
                        self.pass_resid -= n as u64;
                    }
                    did_something = true;
                }
                CopyStep::BackupDone => {
                    // both sides drained: the backup image is complete
                    self.halt(HaltReason::Successful, fh);
                    return true;
                }
                CopyStep::Blocked => return did_something,
            }
        }
    }

    /// One parsed WRAP line from the formatter.
    fn wrap_in(&mut self, line: &str, control: &mut dyn ControlLink, fh: &mut dyn FileHistory) {
        let msg = match ndm_wrap::msg::parse(line) {
            Ok(m) => m,
            Err(WrapError::UnknownFstatSelector(sel)) => {
                // forward-compatible stat additions: note and move on
                debug!(line, sel = %sel, "wrap line with unknown stat selector");
                return;
            }
            Err(e) => {
                debug!(line, err = %e, "malformed wrap line");
                return;
            }
        };

        match msg {
            WrapMsg::Log(text) => {
                control.log_normal(&format!("WRAP: {}", text));
            }
            WrapMsg::AddFile {
                path,
                fhinfo,
                fstat,
            } => {
                let v9 = FileStatV9::from_wrap(&fstat, fhinfo);
                fh.add_file(&v9, &path);
            }
            WrapMsg::AddDirent {
                dir_fileno,
                name,
                fileno,
                ..
            } => {
                fh.add_dir(dir_fileno, &name, fileno);
            }
            WrapMsg::AddNode { fhinfo, fstat } => {
                let v9 = FileStatV9::from_wrap(&fstat, fhinfo);
                fh.add_node(&v9);
            }
            WrapMsg::DataRead { offset, length } => {
                self.handle_data_read(offset, length, control, fh);
            }
            WrapMsg::AddEnv { .. } | WrapMsg::DataStats(_) | WrapMsg::RecoveryResult { .. } => {
                if !self.warned_unimplemented {
                    self.warned_unimplemented = true;
                    control.log_debug(&format!("unimplemented wrap: {}", line));
                }
            }
        }
    }

    fn handle_data_read(
        &mut self,
        offset: u64,
        length: u64,
        control: &mut dyn ControlLink,
        fh: &mut dyn FileHistory,
    ) {
        match &mut self.mover {
            MoverLink::Local(read) => {
                if !read(offset, length) {
                    control.log_normal("local mover read failed");
                    self.halt(HaltReason::InternalError, fh);
                }
            }
            MoverLink::Tcp => control.notify_data_read(offset, length),
            MoverLink::Unsupported => {
                warn!("data read on an unsupported connection kind");
                self.halt(HaltReason::InternalError, fh);
            }
        }
    }
}

enum CopyStep {
    Copied(usize),
    BackupDone,
    Blocked,
}

enum LineStep {
    /// A complete line (newline stripped).
    Line(String),
    /// Buffer was reshaped (compressed / synthetic newline); go again.
    Again,
    /// No complete line and no EOF work to do.
    Blocked,
}

/// Extract one newline-terminated line from a channel, with the
/// compress-and-synthesize behavior for a partial line at EOF.
fn take_line(ch: &mut Chan) -> LineStep {
    let n_ready = ch.n_ready();
    if n_ready == 0 {
        return LineStep::Blocked;
    }

    let ready = ch.ready();
    if let Some(pos) = ready.iter().position(|&b| b == b'\n') {
        let line = String::from_utf8_lossy(&ready[..pos]).into_owned();
        ch.consume(pos + 1);
        return LineStep::Line(line);
    }

    if !ch.eof {
        return LineStep::Blocked;
    }

    // residual content with no newline at EOF
    if ch.end_ix >= ch.data.len() {
        if ch.beg_ix != 0 {
            ch.compress();
            return LineStep::Again;
        }
        // one huge message: lose the last byte to make room
        ch.end_ix -= 1;
    }
    ch.data[ch.end_ix] = b'\n';
    ch.end_ix += 1;
    LineStep::Again
}

#[cfg(test)]
#[path = "dacb_tests.rs"]
mod tests;
