// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! ndm-core: shared substrate for the ndm daemons.
//!
//! Canonical-string and base64 codecs, message typing, the support
//! containers, and the bounded work queue. Everything here is plain
//! synchronous code usable from any daemon thread.

pub mod base64;
pub mod collect;
pub mod cstr;
pub mod msg;
pub mod workq;

pub use collect::{LinkId, LinkList, NodeId, PathTree, RbTree, Sequence, TiePolicy};
pub use cstr::CstrError;
pub use msg::{DestCode, DestSpec, JobStatus, MessageType, MsgsSpec, TypeSet};
pub use workq::{WorkQueue, WorkqError};
