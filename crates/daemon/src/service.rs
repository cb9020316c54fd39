// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Control-connection service.
//!
//! Each accepted connection is handled on a pool worker: Hello +
//! CRAM-MD5 against a configured Director, then a line-command loop.
//! Heartbeats are answered transparently; `Jmsg` lines feed the message
//! router; `data …` commands configure and run one data-agent session.

use std::sync::Arc;

use tracing::{debug, info, warn};

use ndm_agent::{DataAgent, NlistEntry, State};
use ndm_core::{MessageType, Sequence};
use ndm_dispatch::{dispatch, DaemonEnv};
use ndm_net::auth::{hello_server, Authenticator, TlsNeed};
use ndm_net::{BSock, RecvStatus, Signal, TlsContext};

use crate::lifecycle::DaemonConfig;
use crate::session::{run_session, DirectorLink, ForwardingHistory};

/// Shared service context for every connection.
pub struct ServiceCtx {
    pub config: DaemonConfig,
    pub env: DaemonEnv,
    /// Server-side TLS material when the Daemon resource enables it.
    pub tls: Option<TlsContext>,
}

impl ServiceCtx {
    /// The TLS need this daemon announces during authentication.
    pub fn local_tls_need(&self) -> TlsNeed {
        let daemon = self.config.config.single("daemon");
        let require = daemon
            .and_then(|d| d.bool_value("tlsrequire"))
            .unwrap_or(false);
        let enable = daemon
            .and_then(|d| d.bool_value("tlsenable"))
            .unwrap_or(false);
        if require {
            TlsNeed::Required
        } else if enable && self.tls.is_some() {
            TlsNeed::Ok
        } else {
            TlsNeed::None
        }
    }
}

/// Authenticate and serve one control connection to completion.
pub fn handle_control(ctx: &Arc<ServiceCtx>, mut bs: BSock) {
    let Some(director) = ctx.config.config.by_type("director").next() else {
        warn!("control connection refused: no Director configured");
        bs.close();
        return;
    };
    let password = director.str_value("password").unwrap_or_default();
    let auth = Authenticator::new(password, &ctx.config.name, ctx.local_tls_need());

    let (peer, remote_need) = match hello_server(&mut bs, &auth) {
        Ok(result) => result,
        Err(e) => {
            warn!(err = %e, "control authentication failed");
            bs.close();
            return;
        }
    };
    if peer != director.name {
        warn!(peer, expected = %director.name, "unknown director name");
        bs.close();
        return;
    }

    // both sides at least willing: wrap the connection now
    if auth.local_need >= TlsNeed::Ok && remote_need >= TlsNeed::Ok {
        let Some(tls) = ctx.tls.as_ref() else {
            warn!("TLS negotiated but no server material loaded");
            bs.close();
            return;
        };
        if let Err(e) = bs.start_tls(|tcp| tls.accept(tcp)) {
            warn!(err = %e, "TLS session start failed");
            bs.close();
            return;
        }
    }
    info!(peer, "control connection authenticated");

    let mut pending = PendingJob::default();
    loop {
        match bs.recv() {
            RecvStatus::Data(_) => {
                let line = bs.msg_str().trim_end_matches(['\n', '\0']).to_string();
                if !command(ctx, &mut bs, &mut pending, &line) {
                    break;
                }
            }
            RecvStatus::Signal(Signal::Heartbeat) => {
                bs.send_signal(Signal::HbResponse);
            }
            RecvStatus::Signal(Signal::Terminate) | RecvStatus::HardEof => break,
            RecvStatus::Signal(_) | RecvStatus::Empty => {}
            RecvStatus::Error => break,
        }
    }
    bs.close();
    debug!(peer, "control connection closed");
}

/// Accumulated `data env` / `data nlist` state before a start command.
#[derive(Default)]
struct PendingJob {
    job: String,
    bu_type: String,
    env: Vec<(String, String)>,
    nlist: Vec<NlistEntry>,
}

/// One command line; false ends the connection.
fn command(ctx: &Arc<ServiceCtx>, bs: &mut BSock, pending: &mut PendingJob, line: &str) -> bool {
    debug!(line, "control command");
    let mut words = line.split_whitespace();
    match words.next() {
        Some("quit") => {
            bs.send_str("1000 OK quit\n");
            false
        }
        Some("status") => {
            bs.send_str(&format!(
                "ndmd {} version {}\n",
                ctx.config.name,
                env!("CARGO_PKG_VERSION")
            ));
            bs.send_str("data state=idle\n");
            bs.send_signal(Signal::Eod);
            true
        }
        Some("Jmsg") => {
            // Jmsg Job=<name> type=<t> level=<n> <body>
            let rest: Vec<&str> = words.collect();
            let mut ty = MessageType::Info;
            let mut level = 0i64;
            let mut body_at = 0;
            for (i, w) in rest.iter().enumerate() {
                if let Some(v) = w.strip_prefix("type=") {
                    ty = MessageType::from_token(v).unwrap_or(MessageType::Info);
                } else if let Some(v) = w.strip_prefix("level=") {
                    level = v.parse().unwrap_or(0);
                } else if !w.contains('=') {
                    body_at = i;
                    break;
                }
            }
            let body = rest[body_at..].join(" ");
            dispatch(&ctx.env, None, ty, level, &body);
            true
        }
        Some("data") => data_command(ctx, bs, pending, &mut words),
        Some(other) => {
            bs.send_str(&format!("1999 unknown command {}\n", other));
            true
        }
        None => true,
    }
}

fn data_command(
    ctx: &Arc<ServiceCtx>,
    bs: &mut BSock,
    pending: &mut PendingJob,
    words: &mut std::str::SplitWhitespace<'_>,
) -> bool {
    match words.next() {
        Some("job") => {
            // data job <name> type=<bu_type>
            pending.job = words.next().unwrap_or("job").to_string();
            for w in words {
                if let Some(v) = w.strip_prefix("type=") {
                    pending.bu_type = v.to_string();
                }
            }
            bs.send_str("1000 OK job\n");
            true
        }
        Some("env") => {
            // data env NAME=VALUE
            for w in words {
                if let Some((n, v)) = w.split_once('=') {
                    pending.env.push((n.to_string(), v.to_string()));
                }
            }
            bs.send_str("1000 OK env\n");
            true
        }
        Some("nlist") => {
            // data nlist ORIG @fhinfo DEST
            let orig = words.next();
            let fh = words.next();
            let dest = words.next();
            match (orig, fh, dest) {
                (Some(orig), Some(fh), Some(dest)) if fh.starts_with('@') => {
                    let fh_info = match &fh[1..] {
                        "-" => None,
                        n => n.parse().ok(),
                    };
                    pending.nlist.push(NlistEntry {
                        original_path: orig.to_string(),
                        fh_info,
                        destination_path: dest.to_string(),
                    });
                    bs.send_str("1000 OK nlist\n");
                }
                _ => {
                    bs.send_str("1999 bad nlist\n");
                }
            }
            true
        }
        Some(cmd @ ("backup" | "recover" | "recover_filehist")) => {
            run_data_session(ctx, bs, pending, cmd);
            true
        }
        _ => {
            bs.send_str("1999 bad data command\n");
            true
        }
    }
}

/// Listen for the image stream, report the port, and run the session to
/// completion on this worker.
fn run_data_session(ctx: &Arc<ServiceCtx>, bs: &mut BSock, pending: &mut PendingJob, cmd: &str) {
    let mut agent = DataAgent::new();
    agent.bu_type = if pending.bu_type.is_empty() {
        "tar".to_string()
    } else {
        pending.bu_type.clone()
    };
    agent.log_level = ctx.config.debug_level;
    agent.env_tab = pending.env.drain(..).collect::<Sequence<_>>();
    agent.nlist_tab = std::mem::take(&mut pending.nlist)
        .into_iter()
        .collect::<Sequence<_>>();

    let job = if pending.job.is_empty() {
        "adhoc".to_string()
    } else {
        pending.job.clone()
    };

    let local = match agent.data_listen(std::net::SocketAddr::from(([0, 0, 0, 0], 0))) {
        Ok(addr) => addr,
        Err(e) => {
            bs.send_str(&format!("1999 listen failed: {}\n", e));
            return;
        }
    };
    bs.send_str(&format!("1000 OK DATA listen={}\n", local.port()));

    let start = match cmd {
        "backup" => wait_connected(&mut agent, bs).and_then(|()| {
            agent.start_backup().map_err(|e| e.to_string())
        }),
        "recover" => wait_connected(&mut agent, bs).and_then(|()| {
            agent.start_recover().map_err(|e| e.to_string())
        }),
        _ => wait_connected(&mut agent, bs).and_then(|()| {
            agent.start_recover_filehist().map_err(|e| e.to_string())
        }),
    };
    if let Err(e) = start {
        bs.send_str(&format!("1999 start failed: {}\n", e));
        return;
    }

    let mut control = DirectorLink::new(bs, &job);
    let mut fh = ForwardingHistory::new(bs, &job);
    let reason = run_session(&mut agent, &mut control, &mut fh);
    info!(job, ?reason, files = fh.forwarded, "session finished");
    let _ = agent.stop();
}

/// Spin the LISTEN state until the peer's image connection arrives.
fn wait_connected(agent: &mut DataAgent, bs: &mut BSock) -> Result<(), String> {
    // the notification drain needs a control link even while listening
    let mut control = DirectorLink::new(bs, "pending");
    let mut sink = ndm_agent::RecordingHistory::new();
    let deadline = std::time::Instant::now() + std::time::Duration::from_secs(60);
    loop {
        agent.quantum(&mut control, &mut sink);
        match agent.state() {
            State::Connected => return Ok(()),
            State::Halted => return Err("image connection failed".to_string()),
            _ => {}
        }
        if std::time::Instant::now() > deadline {
            return Err("image connection timed out".to_string());
        }
        std::thread::sleep(std::time::Duration::from_millis(5));
    }
}

#[cfg(test)]
#[path = "service_tests.rs"]
mod tests;
