// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The routing pipeline.
//!
//! `dispatch` fans one typed message out to every destination whose
//! type bit is set. `ABORT` and `ERROR_TERM` short-circuit to stdout
//! (and syslog for `ABORT`) before normal routing so catastrophic
//! diagnostics survive a corrupted resource, and end by invoking the
//! abort capability. Mail destinations batch into per-job temp files
//! delivered by [`close_msg`] under the status predicate.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{Local, TimeZone};
use parking_lot::Mutex;
use tracing::debug;

use ndm_core::{DestCode, DestSpec, JobStatus, MessageType, MsgsSpec};

use crate::env::DaemonEnv;
use crate::mailer::{self, MAIL_FILE_GUARD};
use crate::queue::JobCtx;
use crate::syslog::Severity;

/// Interpretation of the `mtime` parameter: `0` now with prefix, `1`
/// now without prefix, anything else an explicit unix time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mtime {
    Now,
    NoPrefix,
    At(i64),
}

impl Mtime {
    pub fn from_code(code: i64) -> Mtime {
        match code {
            0 => Mtime::Now,
            1 => Mtime::NoPrefix,
            t => Mtime::At(t),
        }
    }
}

struct ResState {
    in_use: u32,
    closing: bool,
}

struct MailBatch {
    path: PathBuf,
    file: File,
    max_line_len: usize,
}

#[derive(Default)]
struct DestState {
    file: Option<File>,
    mail: Option<MailBatch>,
}

/// Live messages resource: the parsed spec plus per-destination runtime
/// state (open handles, mail batches). One instance per job, plus the
/// daemon-wide one.
pub struct Messages {
    pub spec: MsgsSpec,
    /// Mailer override from the resource's MailCommand directive.
    pub mail_command: Option<String>,
    state: Mutex<ResState>,
    dests: Vec<Mutex<DestState>>,
}

impl Messages {
    pub fn new(spec: MsgsSpec) -> Arc<Self> {
        let dests = spec.dests.iter().map(|_| Mutex::default()).collect();
        Arc::new(Self {
            spec,
            mail_command: None,
            state: Mutex::new(ResState {
                in_use: 0,
                closing: false,
            }),
            dests,
        })
    }

    pub fn with_mail_command(spec: MsgsSpec, mail_command: Option<String>) -> Arc<Self> {
        let mut m = Self {
            dests: spec.dests.iter().map(|_| Mutex::default()).collect(),
            spec,
            mail_command: None,
            state: Mutex::new(ResState {
                in_use: 0,
                closing: false,
            }),
        };
        m.mail_command = mail_command;
        Arc::new(m)
    }

    /// Fast-path reject filter.
    pub fn wants(&self, ty: MessageType) -> bool {
        self.spec.send.contains(ty)
    }

    fn begin_use(&self) -> bool {
        let mut st = self.state.lock();
        if st.closing {
            return false;
        }
        st.in_use += 1;
        true
    }

    fn end_use(&self) {
        let mut st = self.state.lock();
        st.in_use = st.in_use.saturating_sub(1);
    }

    /// Mark closing and wait for in-flight emitters to drain.
    fn begin_close(&self) {
        loop {
            {
                let mut st = self.state.lock();
                st.closing = true;
                if st.in_use == 0 {
                    return;
                }
            }
            std::thread::yield_now();
        }
    }
}

fn stamp(mtime: Mtime) -> String {
    match mtime {
        Mtime::NoPrefix => String::new(),
        Mtime::Now => format!("{} ", Local::now().format("%d-%b-%Y %H:%M")),
        Mtime::At(t) => match Local.timestamp_opt(t, 0).single() {
            Some(dt) => format!("{} ", dt.format("%d-%b-%Y %H:%M")),
            None => String::new(),
        },
    }
}

fn severity_prefix(ty: MessageType) -> String {
    let label = ty.severity_label();
    if label.is_empty() {
        String::new()
    } else {
        format!("{}: ", label)
    }
}

fn format_line(env: &DaemonEnv, job: Option<&JobCtx>, ty: MessageType, mtime: Mtime, body: &str) -> String {
    let job_part = match job {
        Some(j) => format!("JobId {}: ", j.id),
        None => String::new(),
    };
    format!(
        "{}{}: {}{}{}",
        stamp(mtime),
        env.my_name,
        job_part,
        severity_prefix(ty),
        body.trim_end_matches('\n')
    )
}

/// A destination failed to deliver: report on stdout and syslog with a
/// timestamp, never back through dispatch.
pub fn delivery_error(env: &DaemonEnv, detail: &str) {
    let line = format!("{}Message delivery ERROR: {}", stamp(Mtime::Now), detail);
    println!("{}", line);
    env.syslog.log(Severity::Err, &line);
}

/// Route one message. `mtime` uses the raw code convention (`0` now,
/// `1` suppress prefix, else unix time).
pub fn dispatch(env: &DaemonEnv, job: Option<&JobCtx>, ty: MessageType, mtime: i64, body: &str) {
    if let Some(hook) = &env.global_hook {
        hook(ty, mtime, body);
        return;
    }

    let mtime = Mtime::from_code(mtime);
    let mut printed_stdout = false;

    // catastrophic diagnostics bypass the resource entirely, first
    if matches!(ty, MessageType::Abort | MessageType::ErrorTerm) {
        println!("{}: {}{}", env.my_name, severity_prefix(ty), body.trim_end());
        printed_stdout = true;
        if ty == MessageType::Abort {
            env.syslog.log(Severity::Err, body);
        }
    }

    let msgs = job
        .and_then(|j| j.msgs.clone())
        .or_else(|| env.default_msgs.read().clone());

    match msgs {
        None => {
            if !printed_stdout {
                println!("{}", format_line(env, job, ty, mtime, body));
            }
            env.syslog.log(severity_of(ty), body);
        }
        Some(msgs) => {
            if !msgs.begin_use() {
                // shutting down: never re-enter a closing resource
                if !printed_stdout {
                    println!("{}", format_line(env, job, ty, mtime, body));
                }
                env.syslog.log(severity_of(ty), body);
            } else {
                if msgs.wants(ty) {
                    for (ix, dest) in msgs.spec.dests.iter().enumerate() {
                        if dest.types.contains(ty) {
                            deliver(env, job, &msgs, ix, dest, ty, mtime, body, printed_stdout);
                        }
                    }
                }
                msgs.end_use();
            }
        }
    }

    if env.trace_enabled() && ty == MessageType::Debug {
        env.trace_write(&format!("{}\n", format_line(env, job, ty, mtime, body)));
    }

    match ty {
        MessageType::Abort => env.abort.abort(),
        MessageType::ErrorTerm => env.abort.error_term(),
        _ => {}
    }
}

fn severity_of(ty: MessageType) -> Severity {
    match ty {
        MessageType::Abort | MessageType::ErrorTerm | MessageType::Fatal | MessageType::Error => {
            Severity::Err
        }
        MessageType::Warning | MessageType::Security => Severity::Warning,
        MessageType::Mount | MessageType::Alert => Severity::Notice,
        MessageType::Debug => Severity::Debug,
        _ => Severity::Info,
    }
}

#[allow(clippy::too_many_arguments)]
fn deliver(
    env: &DaemonEnv,
    job: Option<&JobCtx>,
    msgs: &Messages,
    dest_ix: usize,
    dest: &DestSpec,
    ty: MessageType,
    mtime: Mtime,
    body: &str,
    already_on_stdout: bool,
) {
    let line = format_line(env, job, ty, mtime, body);
    match dest.code {
        DestCode::Stdout => {
            if !already_on_stdout {
                println!("{}", line);
            }
        }
        DestCode::Stderr => {
            eprintln!("{}", line);
        }
        DestCode::Console => {
            env.console_write(&line);
        }
        DestCode::Syslog => {
            env.syslog.log(severity_of(ty), body);
        }
        DestCode::File | DestCode::Append => {
            write_file_dest(env, msgs, dest_ix, dest, &line);
        }
        DestCode::Mail | DestCode::MailOnError | DestCode::MailOnSuccess => {
            append_mail_batch(env, job, msgs, dest_ix, dest, &line);
        }
        DestCode::Operator => {
            let cmd = mailer::mail_command_line(
                dest.mail_command
                    .as_deref()
                    .or(msgs.mail_command.as_deref()),
                &dest.targets,
            );
            let subject = format!("{}: intervention needed", env.my_name);
            let mut body_reader = std::io::Cursor::new(format!("{}\n", line).into_bytes());
            if let Err(e) = mailer::send_mail(&cmd, &subject, &mut body_reader) {
                delivery_error(env, &format!("operator mail: {}", e));
            }
        }
        DestCode::Director => {
            if let Some(j) = job {
                let mut link = j.director.lock();
                if let Some(bs) = link.as_mut() {
                    if bs.errors() == 0 {
                        let mtime_code = match mtime {
                            Mtime::Now => 0,
                            Mtime::NoPrefix => 1,
                            Mtime::At(t) => t,
                        };
                        let wire = format!(
                            "Jmsg Job={} type={} level={} {}",
                            j.name,
                            ty.token(),
                            mtime_code,
                            body
                        );
                        bs.send_str(&wire);
                    }
                }
            }
        }
        DestCode::Catalog => {
            let (Some(catalog), Some(j)) = (env.catalog.as_ref(), job) else {
                debug!("catalog destination with no catalog hook or job");
                return;
            };
            let escaped = catalog.escape(body.trim_end());
            let cmd = format!(
                "INSERT INTO Log (JobId, Time, LogText) VALUES ({}, NOW(), '{}')",
                j.id, escaped
            );
            if !catalog.query(&cmd) {
                delivery_error(env, "catalog Log insert failed");
            }
        }
    }
}

fn write_file_dest(
    env: &DaemonEnv,
    msgs: &Messages,
    dest_ix: usize,
    dest: &DestSpec,
    line: &str,
) {
    let Some(path) = dest.targets.first() else {
        return;
    };
    let mut st = msgs.dests[dest_ix].lock();
    if st.file.is_none() {
        let mut opts = OpenOptions::new();
        if dest.code == DestCode::File {
            opts.write(true).create(true).truncate(true);
        } else {
            opts.append(true).create(true);
        }
        match opts.open(path) {
            Ok(f) => st.file = Some(f),
            Err(e) => {
                delivery_error(env, &format!("cannot open {}: {}", path, e));
                return;
            }
        }
    }
    let write = |f: &mut File| -> std::io::Result<()> {
        f.write_all(line.as_bytes())?;
        f.write_all(b"\n")
    };
    let failed = st.file.as_mut().map(write).map(|r| r.is_err());
    if failed == Some(true) {
        // the file may have been rotated away; reopen once
        st.file = None;
        let reopened = OpenOptions::new().append(true).create(true).open(path);
        match reopened {
            Ok(mut f) => {
                if write(&mut f).is_err() {
                    delivery_error(env, &format!("write to {} failed twice", path));
                }
                st.file = Some(f);
            }
            Err(e) => delivery_error(env, &format!("reopen of {} failed: {}", path, e)),
        }
    }
}

fn append_mail_batch(
    env: &DaemonEnv,
    job: Option<&JobCtx>,
    msgs: &Messages,
    dest_ix: usize,
    dest: &DestSpec,
    line: &str,
) {
    let mut st = msgs.dests[dest_ix].lock();
    if st.mail.is_none() {
        let job_tag = job.map(|j| j.name.as_str()).unwrap_or("daemon");
        let addr_tag: String = dest
            .targets
            .first()
            .map(String::as_str)
            .unwrap_or("nobody")
            .chars()
            .map(|c| if c == '/' || c.is_whitespace() { '_' } else { c })
            .collect();
        let path = env
            .workdir
            .join(format!("{}.{}.{}.mail", env.my_name, job_tag, addr_tag));
        match OpenOptions::new().write(true).create(true).truncate(true).open(&path) {
            Ok(file) => {
                st.mail = Some(MailBatch {
                    path,
                    file,
                    max_line_len: 0,
                });
            }
            Err(e) => {
                delivery_error(env, &format!("cannot create mail batch file: {}", e));
                return;
            }
        }
    }
    if let Some(batch) = st.mail.as_mut() {
        batch.max_line_len = batch.max_line_len.max(line.len());
        let _ = batch.file.write_all(line.as_bytes());
        let _ = batch.file.write_all(b"\n");
    }
}

/// End-of-job flush: deliver or discard every mail batch according to
/// the destination kind and the job's terminal status, then drop the
/// temp files through the unlink guard.
pub fn close_msg(env: &DaemonEnv, job: Option<&JobCtx>, status: JobStatus) {
    let Some(msgs) = job
        .and_then(|j| j.msgs.clone())
        .or_else(|| env.default_msgs.read().clone())
    else {
        return;
    };

    msgs.begin_close();

    for (ix, dest) in msgs.spec.dests.iter().enumerate() {
        let batch = {
            let mut st = msgs.dests[ix].lock();
            st.mail.take()
        };
        let Some(batch) = batch else { continue };

        let wants_delivery = match dest.code {
            DestCode::Mail => true,
            DestCode::MailOnError => status.is_mail_on_error(),
            DestCode::MailOnSuccess => status.is_mail_on_success(),
            _ => false,
        };

        if wants_delivery {
            let cmd = mailer::mail_command_line(
                dest.mail_command
                    .as_deref()
                    .or(msgs.mail_command.as_deref()),
                &dest.targets,
            );
            let job_name = job.map(|j| j.name.as_str()).unwrap_or("daemon");
            let subject = format!("{}: {} messages", env.my_name, job_name);
            drop(batch.file);
            match File::open(&batch.path) {
                Ok(mut reader) => {
                    if let Err(e) = mailer::send_mail(&cmd, &subject, &mut reader) {
                        delivery_error(env, &format!("mail to {:?}: {}", dest.targets, e));
                    }
                }
                Err(e) => delivery_error(env, &format!("mail batch reopen: {}", e)),
            }
            if let Err(e) = mailer::safer_unlink(&batch.path, MAIL_FILE_GUARD) {
                delivery_error(env, &format!("batch unlink: {}", e));
            }
        } else {
            drop(batch.file);
            let _ = mailer::safer_unlink(&batch.path, MAIL_FILE_GUARD);
        }
    }

    // close file destinations as well
    for st in &msgs.dests {
        st.lock().file = None;
    }

    let mut state = msgs.state.lock();
    state.closing = false;
}

#[cfg(test)]
#[path = "dispatch_tests.rs"]
mod tests;
