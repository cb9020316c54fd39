// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! ndm-wrap: the format-subprocess side of the data pipeline.
//!
//! The WRAP text protocol on the auxiliary pipe (one tagged line per
//! message), the command control block digested from the subprocess
//! argv, and the recovery streamer that aligns the incoming image
//! stream to the seek requests a format program makes while restoring.

pub mod ccb;
pub mod msg;
pub mod reco;

pub use ccb::{Ccb, CcbError, DataConnMode, HistMode, Operation, RecoveryFile};
pub use msg::{DataStats, DataStatus, FileType, Fstat, WrapError, WrapMsg};
pub use reco::RecoError;
