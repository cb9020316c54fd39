// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bounded worker pool for connection servicing.
//!
//! Workers are started on demand: queueing work spawns a thread only
//! when nobody is idle and the pool is below its cap. An idle worker
//! waits two seconds for more work and then exits, so a quiet daemon
//! drops back to zero threads. `shutdown` wakes everybody and blocks
//! until the live-worker count reaches zero.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use thiserror::Error;
use tracing::trace;

/// Idle workers give up after this long without work.
const IDLE_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WorkqError {
    #[error("work queue is shut down")]
    Invalid,
}

struct State<T> {
    queue: VecDeque<T>,
    quit: bool,
    valid: bool,
    num_workers: usize,
    idle_workers: usize,
}

struct Inner<T> {
    state: Mutex<State<T>>,
    work: Condvar,
    engine: Box<dyn Fn(T) + Send + Sync>,
    max_workers: usize,
}

/// Handle to a worker pool. Clones share the pool.
pub struct WorkQueue<T: Send + 'static> {
    inner: Arc<Inner<T>>,
}

impl<T: Send + 'static> Clone for WorkQueue<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Send + 'static> WorkQueue<T> {
    pub fn new<F>(max_workers: usize, engine: F) -> Self
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State {
                    queue: VecDeque::new(),
                    quit: false,
                    valid: true,
                    num_workers: 0,
                    idle_workers: 0,
                }),
                work: Condvar::new(),
                engine: Box::new(engine),
                max_workers,
            }),
        }
    }

    /// Queue one item; `priority` items go to the head. Wakes an idle
    /// worker, or spawns one when none is idle and the cap allows.
    pub fn add(&self, item: T, priority: bool) -> Result<(), WorkqError> {
        let mut state = self.inner.state.lock();
        if !state.valid {
            return Err(WorkqError::Invalid);
        }
        if priority {
            state.queue.push_front(item);
        } else {
            state.queue.push_back(item);
        }

        if state.idle_workers > 0 {
            self.inner.work.notify_all();
        } else if state.num_workers < self.inner.max_workers {
            state.num_workers += 1;
            let inner = Arc::clone(&self.inner);
            std::thread::spawn(move || worker(inner));
        }
        Ok(())
    }

    /// Number of live worker threads.
    pub fn workers(&self) -> usize {
        self.inner.state.lock().num_workers
    }

    /// Items waiting (not counting ones already in an engine).
    pub fn pending(&self) -> usize {
        self.inner.state.lock().queue.len()
    }

    /// Stop accepting work, wake every waiter, and block until all
    /// workers have exited. Queued items still present are drained by the
    /// workers before they quit.
    pub fn shutdown(&self) -> Result<(), WorkqError> {
        let mut state = self.inner.state.lock();
        if !state.valid {
            return Err(WorkqError::Invalid);
        }
        state.valid = false;
        state.quit = true;
        if state.num_workers > 0 {
            self.inner.work.notify_all();
            while state.num_workers > 0 {
                self.inner.work.wait(&mut state);
            }
        }
        Ok(())
    }
}

fn worker<T: Send + 'static>(inner: Arc<Inner<T>>) {
    trace!("workq worker start");
    let mut state = inner.state.lock();
    loop {
        let mut timed_out = false;
        while state.queue.is_empty() && !state.quit {
            state.idle_workers += 1;
            let result = inner.work.wait_for(&mut state, IDLE_TIMEOUT);
            state.idle_workers -= 1;
            if result.timed_out() {
                timed_out = true;
                break;
            }
        }

        if let Some(item) = state.queue.pop_front() {
            drop(state);
            (inner.engine)(item);
            state = inner.state.lock();
        }

        if state.queue.is_empty() && state.quit {
            state.num_workers -= 1;
            if state.num_workers == 0 {
                // wake the shutdown waiter
                inner.work.notify_all();
            }
            trace!("workq worker quit");
            return;
        }
        if state.queue.is_empty() && timed_out {
            state.num_workers -= 1;
            trace!("workq worker idle exit");
            return;
        }
    }
}

#[cfg(test)]
#[path = "workq_tests.rs"]
mod tests;
