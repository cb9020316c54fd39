// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! ndm-dispatch: the operational message router.
//!
//! Every daemon routes its typed messages (job progress, errors, mount
//! requests, …) through one [`dispatch`] pipeline to the destinations a
//! messages resource configured: files, batched mail, the console log,
//! syslog, an operator pipe, the director link, the catalog, or the
//! process streams. Batched mail is flushed at job close with a
//! status-conditional predicate.

pub mod dispatch;
pub mod env;
pub mod mailer;
pub mod queue;
pub mod syslog;

pub use dispatch::{close_msg, dispatch, Messages, Mtime};
pub use env::{AbortHandler, Catalog, DaemonEnv, ProcessAbort};
pub use queue::{dequeue_messages, queue_msg, JobCtx, QueuedMsg};
