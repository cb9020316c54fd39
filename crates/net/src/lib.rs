// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! ndm-net: the shared connection layer.
//!
//! Address resolution, the length-prefixed BSOCK transport with its
//! signal codes and spool mode, the TLS wrapper, CRAM-MD5 mutual
//! authentication, and the thread-pool connection server.

pub mod addr;
pub mod auth;
pub mod bsock;
pub mod server;
pub mod tls;

pub use addr::{resolve_addresses, AddrError, AddrTag, Endpoint, Family};
pub use auth::{AuthError, Authenticator, TlsNeed};
pub use bsock::{BSock, BsockError, ConnectPolicy, RecvStatus, Signal};
pub use server::ConnServer;
pub use tls::{TlsContext, TlsError, VerifyPeer};
