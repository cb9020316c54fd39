// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! ndm-agent: the data-agent pipeline.
//!
//! A [`DataAgent`] spawns a format subprocess (tar-like), shuttles image
//! bytes between the network image stream and the subprocess, drains
//! the subprocess's stderr and WRAP control pipes one line at a time,
//! and emits file-history events toward the control agent. The whole
//! thing runs as a cooperative quantum: one `tick` per scheduling turn,
//! never blocking.

pub mod chan;
pub mod command;
pub mod dacb;
pub mod fhist;
pub mod image;
pub mod spawn;

pub use chan::Chan;
pub use dacb::{AgentError, ControlLink, DataAgent, HaltReason, MoverLink, NlistEntry, Op, State};
pub use fhist::{FileHistory, FileStatV9, HistEntry, RecordingHistory};
pub use image::{ConnectStatus, ImageStream, StreamMode};
pub use spawn::{pipe_fork_exec, FdSpec, Spawned};
