// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process-scoped dispatch state, factored into one handle.
//!
//! The daemon name, working directory, console and trace sinks, the
//! daemon-wide messages resource, and the external hooks (catalog,
//! abort) all live here and are passed explicitly instead of sitting in
//! globals.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::debug;

use crate::dispatch::Messages;
use crate::syslog::Syslog;

/// Catalog hooks the dispatcher calls for CATALOG destinations. The
/// database itself lives outside this system.
pub trait Catalog: Send + Sync {
    /// Escape a string for embedding in a query.
    fn escape(&self, src: &str) -> String;
    /// Run one statement; false is a delivery error.
    fn query(&self, cmd: &str) -> bool;
}

/// What catastrophic messages do to the process. `ABORT` deliberately
/// crashes for a core dump; tests install a recorder instead.
pub trait AbortHandler: Send + Sync + 'static {
    fn abort(&self) {
        std::process::abort();
    }

    fn error_term(&self) {
        std::process::exit(1);
    }
}

/// Production handler: real abort, real exit.
pub struct ProcessAbort;
impl AbortHandler for ProcessAbort {}

type GlobalHook =
    dyn Fn(ndm_core::MessageType, i64, &str) + Send + Sync;

pub struct DaemonEnv {
    pub my_name: String,
    pub workdir: PathBuf,
    /// Daemon-wide messages resource used when a job has none.
    pub default_msgs: RwLock<Option<Arc<Messages>>>,
    /// Console log handle, lazily opened, rwlock-guarded.
    console: RwLock<Option<File>>,
    console_pending: AtomicBool,
    /// Trace file sink for debug output when enabled.
    trace: Mutex<Option<File>>,
    trace_enabled: AtomicBool,
    pub syslog: Syslog,
    pub catalog: Option<Arc<dyn Catalog>>,
    pub abort: Box<dyn AbortHandler>,
    /// When set, dispatch forwards here and does nothing else.
    pub global_hook: Option<Box<GlobalHook>>,
    /// Queue for messages emitted without a job context.
    pub daemon_queue: Mutex<std::collections::VecDeque<crate::queue::QueuedMsg>>,
}

impl DaemonEnv {
    pub fn new(my_name: &str, workdir: &Path) -> Self {
        Self {
            my_name: my_name.to_string(),
            workdir: workdir.to_path_buf(),
            default_msgs: RwLock::new(None),
            console: RwLock::new(None),
            console_pending: AtomicBool::new(false),
            trace: Mutex::new(None),
            trace_enabled: AtomicBool::new(false),
            syslog: Syslog::new(my_name),
            catalog: None,
            abort: Box::new(ProcessAbort),
            global_hook: None,
            daemon_queue: Mutex::new(std::collections::VecDeque::new()),
        }
    }

    pub fn console_path(&self) -> PathBuf {
        self.workdir.join(format!("{}.conmsg", self.my_name))
    }

    pub fn trace_path(&self) -> PathBuf {
        self.workdir.join(format!("{}.trace", self.my_name))
    }

    /// Append one line to the console log; sets the pending flag the
    /// console reader polls.
    pub fn console_write(&self, line: &str) {
        let mut guard = self.console.write();
        if guard.is_none() {
            match OpenOptions::new()
                .create(true)
                .append(true)
                .open(self.console_path())
            {
                Ok(f) => *guard = Some(f),
                Err(e) => {
                    debug!(err = %e, "console log open failed");
                    return;
                }
            }
        }
        if let Some(f) = guard.as_mut() {
            let _ = f.write_all(line.as_bytes());
            let _ = f.write_all(b"\n");
        }
        self.console_pending.store(true, Ordering::Release);
    }

    /// Drain the console-pending flag (single observer).
    pub fn take_console_pending(&self) -> bool {
        self.console_pending.swap(false, Ordering::AcqRel)
    }

    pub fn set_trace(&self, enabled: bool) {
        self.trace_enabled.store(enabled, Ordering::Release);
        if !enabled {
            *self.trace.lock() = None;
        }
    }

    pub fn trace_enabled(&self) -> bool {
        self.trace_enabled.load(Ordering::Acquire)
    }

    /// Append to the trace file when tracing is on.
    pub fn trace_write(&self, text: &str) {
        if !self.trace_enabled() {
            return;
        }
        let mut guard = self.trace.lock();
        if guard.is_none() {
            *guard = OpenOptions::new()
                .create(true)
                .append(true)
                .open(self.trace_path())
                .ok();
        }
        if let Some(f) = guard.as_mut() {
            let _ = f.write_all(text.as_bytes());
        }
    }
}

#[cfg(test)]
#[path = "env_tests.rs"]
mod tests;
