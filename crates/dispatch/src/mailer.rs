// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Mailer pipes and the guarded unlink for batch files.

use std::io::{Read, Write};
use std::path::Path;
use std::process::{Command, Stdio};

use regex::Regex;
use thiserror::Error;
use tracing::debug;

/// Built-in mailer when no mail command is configured. Recipients are
/// appended.
pub const DEFAULT_MAIL_COMMAND: &str = "/usr/lib/sendmail -F Bacula";

/// Batch files must match this before `safer_unlink` will remove them.
pub const MAIL_FILE_GUARD: &str = r".+\.mail$";

#[derive(Debug, Error)]
pub enum MailError {
    #[error("mailer spawn failed: {0}")]
    Spawn(std::io::Error),

    #[error("mailer write failed: {0}")]
    Write(std::io::Error),

    #[error("mailer exited with status {0}")]
    Exit(i32),
}

/// Full command line for a destination: configured command or the
/// default, recipients appended.
pub fn mail_command_line(configured: Option<&str>, recipients: &[String]) -> String {
    let base = configured.unwrap_or(DEFAULT_MAIL_COMMAND);
    let mut cmd = base.to_string();
    for r in recipients {
        cmd.push(' ');
        cmd.push_str(r);
    }
    cmd
}

/// Pipe `subject` and `body` through the mailer command.
pub fn send_mail(command: &str, subject: &str, body: &mut dyn Read) -> Result<(), MailError> {
    debug!(command, "spawning mailer");
    let mut child = Command::new("/bin/sh")
        .arg("-c")
        .arg(command)
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map_err(MailError::Spawn)?;

    if let Some(stdin) = child.stdin.as_mut() {
        stdin
            .write_all(format!("Subject: {}\n\n", subject).as_bytes())
            .map_err(MailError::Write)?;
        std::io::copy(body, stdin).map_err(MailError::Write)?;
    }
    drop(child.stdin.take());

    let status = child.wait().map_err(MailError::Spawn)?;
    if status.success() {
        Ok(())
    } else {
        Err(MailError::Exit(status.code().unwrap_or(-1)))
    }
}

/// Unlink `path` only when its file name matches `pattern`; a reused or
/// mangled configured path must never take an unrelated file with it.
pub fn safer_unlink(path: &Path, pattern: &str) -> std::io::Result<()> {
    let Ok(re) = Regex::new(pattern) else {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "bad unlink guard pattern",
        ));
    };
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();
    if re.is_match(name) {
        std::fs::remove_file(path)
    } else {
        Err(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            format!("refusing to unlink {}: name fails guard", path.display()),
        ))
    }
}

#[cfg(test)]
#[path = "mailer_tests.rs"]
mod tests;
