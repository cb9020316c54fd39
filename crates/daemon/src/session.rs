// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! One data-agent session: the quantum driver plus the upstream links.
//!
//! The control connection is shared between the request handler (which
//! keeps receiving) and the session (which sends notifications), so the
//! session talks through a locked `dup` of the socket. File history and
//! log lines travel upstream as text lines in the same connection.

use std::time::Duration;

use tracing::debug;

use ndm_agent::{ControlLink, DataAgent, FileHistory, FileStatV9, HaltReason, State};
use ndm_net::BSock;
use ndm_wrap::msg as wrapmsg;
use ndm_wrap::{Fstat, WrapMsg};

/// Backoff when a quantum did nothing.
const IDLE_NAP: Duration = Duration::from_millis(2);

/// Upstream side of a session: notifications and log lines to the
/// control agent over a duplicated, locking socket handle.
pub struct DirectorLink {
    bs: BSock,
    job: String,
}

impl DirectorLink {
    pub fn new(control: &BSock, job: &str) -> Self {
        let mut bs = control.dup();
        bs.set_locking();
        Self {
            bs,
            job: job.to_string(),
        }
    }

    fn send_line(&mut self, line: &str) {
        if !self.bs.send_str(line) {
            debug!(job = %self.job, line, "control link send failed");
        }
    }
}

impl ControlLink for DirectorLink {
    fn log_normal(&mut self, text: &str) {
        let line = format!("Jmsg Job={} type=info level=0 {}", self.job, text);
        self.send_line(&line);
    }

    fn log_debug(&mut self, text: &str) {
        let line = format!("Jmsg Job={} type=debug level=0 {}", self.job, text);
        self.send_line(&line);
    }

    fn notify_data_halted(&mut self, reason: HaltReason) {
        let tag = match reason {
            HaltReason::Na => "na",
            HaltReason::Successful => "successful",
            HaltReason::Aborted => "aborted",
            HaltReason::ConnectError => "connect_error",
            HaltReason::InternalError => "internal_error",
        };
        self.send_line(&format!("3000 data halted Job={} reason={}", self.job, tag));
    }

    fn notify_data_read(&mut self, offset: u64, length: u64) {
        self.send_line(&format!(
            "notify read Job={} offset={} length={}",
            self.job, offset, length
        ));
    }
}

/// File-history sink that relays entries upstream as `Hist <wrap-line>`
/// records, batching until flush.
pub struct ForwardingHistory {
    bs: BSock,
    job: String,
    pending: Vec<String>,
    pub forwarded: u64,
}

impl ForwardingHistory {
    pub fn new(control: &BSock, job: &str) -> Self {
        let mut bs = control.dup();
        bs.set_locking();
        Self {
            bs,
            job: job.to_string(),
            pending: Vec::new(),
            forwarded: 0,
        }
    }

    fn v9_to_fstat(fstat: &FileStatV9) -> Fstat {
        Fstat {
            ftype: Some(fstat.ftype),
            mode: fstat.mode,
            links: fstat.links,
            size: fstat.size,
            uid: fstat.uid,
            gid: fstat.gid,
            atime: fstat.atime,
            mtime: fstat.mtime,
            ctime: fstat.ctime,
            fileno: fstat.node,
        }
    }
}

impl FileHistory for ForwardingHistory {
    fn add_file(&mut self, fstat: &FileStatV9, path: &str) {
        let line = wrapmsg::format(&WrapMsg::AddFile {
            path: path.to_string(),
            fhinfo: fstat.fh_info,
            fstat: Self::v9_to_fstat(fstat),
        });
        self.pending.push(line);
    }

    fn add_dir(&mut self, dir_fileno: u64, name: &str, fileno: u64) {
        let line = wrapmsg::format(&WrapMsg::AddDirent {
            dir_fileno,
            name: name.to_string(),
            fileno,
            fhinfo: None,
        });
        self.pending.push(line);
    }

    fn add_node(&mut self, fstat: &FileStatV9) {
        let line = wrapmsg::format(&WrapMsg::AddNode {
            fhinfo: fstat.fh_info,
            fstat: Self::v9_to_fstat(fstat),
        });
        self.pending.push(line);
    }

    fn flush(&mut self) {
        for line in self.pending.drain(..) {
            let wire = format!("Hist Job={} {}", self.job, line.trim_end());
            if self.bs.send_str(&wire) {
                self.forwarded += 1;
            }
        }
    }
}

/// Drive a session to completion: quanta until the agent halts and the
/// notification has gone out.
pub fn run_session(
    agent: &mut DataAgent,
    control: &mut DirectorLink,
    fh: &mut ForwardingHistory,
) -> HaltReason {
    loop {
        let did_something = agent.quantum(control, fh);
        if agent.state() == State::Halted && !agent.notify_pending() {
            return agent.halt_reason();
        }
        if !did_something {
            std::thread::sleep(IDLE_NAP);
        }
    }
}
