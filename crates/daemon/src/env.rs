// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the daemon crate.

use std::path::PathBuf;

/// Configuration file: NDM_CONF > /etc/ndm/ndmd.conf
pub fn config_path() -> PathBuf {
    match std::env::var("NDM_CONF") {
        Ok(p) => PathBuf::from(p),
        Err(_) => PathBuf::from("/etc/ndm/ndmd.conf"),
    }
}

/// Log filter override for the tracing subscriber.
pub fn log_filter() -> Option<String> {
    std::env::var("NDM_LOG").ok()
}
