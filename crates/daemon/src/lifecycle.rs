// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon startup: configuration digestion, the exclusive lock file,
//! and logging initialization.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use fs2::FileExt;
use thiserror::Error;
use tracing::info;

use ndm_config::{parse_file, Config, ParseError};
use ndm_dispatch::{DaemonEnv, Messages};
use ndm_net::{TlsContext, TlsError, VerifyPeer};

use crate::resources::daemon_tables;

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("config: {0}")]
    Parse(#[from] ParseError),

    #[error("TLS material: {0}")]
    Tls(#[from] TlsError),

    #[error("no Daemon resource in {0}")]
    NoDaemon(PathBuf),

    #[error("cannot create working directory {path}: {detail}")]
    Workdir { path: PathBuf, detail: String },

    #[error("another instance holds {0}")]
    Locked(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Digested daemon settings, plus the raw resource set for later
/// lookups (directors, messages).
pub struct DaemonConfig {
    pub name: String,
    pub workdir: PathBuf,
    pub port: u16,
    pub listen: Vec<String>,
    pub max_connections: usize,
    pub heartbeat: Option<Duration>,
    pub debug_level: u32,
    pub config: Config,
}

impl DaemonConfig {
    /// Parse and digest a config file.
    pub fn load(path: &Path) -> Result<Self, LifecycleError> {
        let config = parse_file(path, &daemon_tables())?;
        let daemon = config
            .single("daemon")
            .ok_or_else(|| LifecycleError::NoDaemon(path.to_path_buf()))?;

        let name = daemon.name.clone();
        let workdir = PathBuf::from(
            daemon
                .str_value("workingdirectory")
                .unwrap_or("/var/lib/ndm"),
        );
        let port = daemon.u64_value("port").unwrap_or(10000) as u16;
        let listen = match daemon.get("listen") {
            Some(ndm_config::Value::Addresses(addrs)) => addrs.clone(),
            _ => Vec::new(),
        };
        let heartbeat = match daemon.u64_value("heartbeatinterval") {
            Some(0) | None => None,
            Some(secs) => Some(Duration::from_secs(secs)),
        };

        Ok(Self {
            name,
            workdir,
            port,
            listen,
            max_connections: daemon.u64_value("maximumconnections").unwrap_or(10) as usize,
            heartbeat,
            debug_level: daemon.u64_value("debuglevel").unwrap_or(0) as u32,
            config,
        })
    }

    pub fn lock_path(&self) -> PathBuf {
        self.workdir.join(format!("{}.pid", self.name))
    }

    pub fn log_path(&self) -> PathBuf {
        self.workdir.join(format!("{}.log", self.name))
    }

    /// Create the working directory and take the exclusive daemon lock;
    /// the pid goes into the lock file for operators.
    pub fn acquire_lock(&self) -> Result<File, LifecycleError> {
        std::fs::create_dir_all(&self.workdir).map_err(|e| LifecycleError::Workdir {
            path: self.workdir.clone(),
            detail: e.to_string(),
        })?;
        let path = self.lock_path();
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&path)?;
        file.try_lock_exclusive()
            .map_err(|_| LifecycleError::Locked(path.clone()))?;
        file.set_len(0)?;
        writeln!(file, "{}", std::process::id())?;
        info!(path = %path.display(), "daemon lock acquired");
        Ok(file)
    }

    /// Load the server TLS material when the Daemon resource enables TLS.
    /// Directors with a TLS Allowed CN list narrow peer acceptance.
    pub fn build_tls(&self) -> Result<Option<TlsContext>, LifecycleError> {
        let Some(daemon) = self.config.single("daemon") else {
            return Ok(None);
        };
        if !daemon.bool_value("tlsenable").unwrap_or(false) {
            return Ok(None);
        }
        let (Some(cert), Some(key)) = (
            daemon.str_value("tlscertificate"),
            daemon.str_value("tlskey"),
        ) else {
            return Ok(None);
        };
        let ca = daemon.str_value("tlscacertificatefile").map(PathBuf::from);

        let mut allowed: Vec<String> = Vec::new();
        for dir in self.config.by_type("director") {
            if let Some(ndm_config::Value::StrList(cns)) = dir.get("tlsallowedcn") {
                allowed.extend(cns.iter().cloned());
            }
        }
        let verify = if allowed.is_empty() {
            VerifyPeer::ChainOnly
        } else {
            VerifyPeer::AllowedCommonNames(allowed)
        };

        let ctx = TlsContext::server(
            Path::new(cert),
            Path::new(key),
            ca.as_deref(),
            verify,
        )?;
        Ok(Some(ctx))
    }

    /// Build the dispatch environment: daemon-wide messages resource
    /// selected by the Daemon's Messages directive (or the first one in
    /// the file).
    pub fn build_dispatch_env(&self) -> DaemonEnv {
        let env = DaemonEnv::new(&self.name, &self.workdir);

        let daemon = self.config.single("daemon");
        let msgs_res = daemon
            .and_then(|d| d.str_value("messages"))
            .and_then(|name| self.config.get("messages", name))
            .or_else(|| self.config.by_type("messages").next());

        if let Some(res) = msgs_res {
            let mail_command = res.str_value("mailcommand").map(str::to_string);
            let msgs: Arc<Messages> =
                Messages::with_mail_command(res.dests.clone(), mail_command);
            *env.default_msgs.write() = Some(msgs);
        }
        env
    }
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
