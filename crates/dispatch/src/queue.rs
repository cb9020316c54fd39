// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-job message queueing for re-entrant contexts.
//!
//! Watchdog callbacks, jobless emitters, and anything that fires while
//! the queue itself is being drained cannot deliver inline; they park
//! `{type, mtime, body}` items here and `dequeue_messages` forwards them
//! through the normal pipeline at the next safe point, in order.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use ndm_core::{JobStatus, MessageType};
use ndm_net::BSock;

use crate::dispatch::{dispatch, Messages};
use crate::env::DaemonEnv;

/// One parked message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedMsg {
    pub ty: MessageType,
    pub mtime: i64,
    pub body: String,
}

/// Per-job dispatch context.
pub struct JobCtx {
    pub name: String,
    pub id: u64,
    pub status: Mutex<JobStatus>,
    /// Job-level messages resource; the daemon-wide one applies when
    /// absent.
    pub msgs: Option<Arc<Messages>>,
    /// Link back to the director for DIRECTOR destinations.
    pub director: Mutex<Option<BSock>>,
    queue: Mutex<VecDeque<QueuedMsg>>,
    dequeuing: AtomicBool,
}

impl JobCtx {
    pub fn new(name: &str, id: u64) -> Self {
        Self {
            name: name.to_string(),
            id,
            status: Mutex::new(JobStatus::Running),
            msgs: None,
            director: Mutex::new(None),
            queue: Mutex::new(VecDeque::new()),
            dequeuing: AtomicBool::new(false),
        }
    }

    pub fn with_msgs(mut self, msgs: Arc<Messages>) -> Self {
        self.msgs = Some(msgs);
        self
    }

    pub fn queued(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn set_status(&self, status: JobStatus) {
        *self.status.lock() = status;
    }
}

/// Park a message for later delivery. Queues on the job when one is
/// given, on the daemon queue otherwise.
pub fn queue_msg(
    env: &DaemonEnv,
    job: Option<&JobCtx>,
    ty: MessageType,
    mtime: i64,
    body: &str,
) {
    let item = QueuedMsg {
        ty,
        mtime,
        body: body.to_string(),
    };
    match job {
        Some(j) => j.queue.lock().push_back(item),
        None => env.daemon_queue.lock().push_back(item),
    }
}

/// Drain parked messages through the normal dispatch pipeline, in
/// enqueue order. Messages queued *while* draining (the `dequeuing`
/// flag) are delivered by the next call rather than recursing.
pub fn dequeue_messages(env: &DaemonEnv, job: Option<&JobCtx>) {
    if let Some(j) = job {
        if j.dequeuing.swap(true, Ordering::AcqRel) {
            return;
        }
        loop {
            let item = j.queue.lock().pop_front();
            match item {
                Some(m) => dispatch(env, job, m.ty, m.mtime, &m.body),
                None => break,
            }
        }
        j.dequeuing.store(false, Ordering::Release);
    }

    loop {
        let item = env.daemon_queue.lock().pop_front();
        match item {
            Some(m) => dispatch(env, None, m.ty, m.mtime, &m.body),
            None => break,
        }
    }
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;
