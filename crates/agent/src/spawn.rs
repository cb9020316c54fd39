// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pipe/fork/exec helper for the format subprocess.
//!
//! Takes an fd-map for the child's stdin/stdout/stderr — each slot is
//! an inherited descriptor or one of the pipe/dev-null sentinels — and
//! always tunnels the WRAP control pipe to the child as descriptor 3.
//! The command runs under `/bin/sh -c`. Every other descriptor is
//! close-on-exec (the standard library marks everything it creates), so
//! the child starts with exactly the plumbing the map describes.

#![allow(unsafe_code)]

use std::os::fd::{AsRawFd, OwnedFd};
use std::os::unix::process::CommandExt;
use std::process::{Child, Command, Stdio};

use nix::fcntl::{fcntl, FcntlArg, OFlag};
use tracing::debug;

/// One slot of the child's standard descriptor map.
pub enum FdSpec {
    /// Child inherits this descriptor.
    Inherit(OwnedFd),
    /// Pipe the child reads; the parent end comes back as a writer.
    InputPipe,
    /// Pipe the child writes; the parent end comes back as a reader.
    OutputPipe,
    /// `/dev/null`.
    DevNull,
}

/// A spawned format subprocess and the parent pipe ends.
pub struct Spawned {
    pub child: Child,
    /// Parent write end when stdin was `InputPipe`.
    pub to_stdin: Option<OwnedFd>,
    /// Parent read end when stdout was `OutputPipe`.
    pub from_stdout: Option<OwnedFd>,
    /// Parent read end when stderr was `OutputPipe`.
    pub from_stderr: Option<OwnedFd>,
    /// Parent read end of the WRAP pipe (child fd 3).
    pub from_wrap: OwnedFd,
}

fn set_nonblocking(fd: &OwnedFd) -> std::io::Result<()> {
    fcntl(fd.as_raw_fd(), FcntlArg::F_SETFL(OFlag::O_NONBLOCK))
        .map(|_| ())
        .map_err(std::io::Error::from)
}

/// Spawn `cmd` via `/bin/sh -c` with the given descriptor map plus the
/// WRAP pipe on fd 3. Parent pipe ends come back non-blocking, ready
/// for the quantum pumps.
pub fn pipe_fork_exec(cmd: &str, fdmap: [FdSpec; 3]) -> std::io::Result<Spawned> {
    debug!(cmd, "spawning format subprocess");

    let (wrap_reader, wrap_writer) = std::io::pipe()?;
    let wrap_child = OwnedFd::from(wrap_writer);

    let mut command = Command::new("/bin/sh");
    command.arg("-c").arg(cmd);

    let [stdin_spec, stdout_spec, stderr_spec] = fdmap;
    command.stdin(stdio_for(stdin_spec)?);
    command.stdout(stdio_for(stdout_spec)?);
    command.stderr(stdio_for(stderr_spec)?);

    let wrap_raw = wrap_child.as_raw_fd();
    // SAFETY: the pre_exec closure runs between fork and exec; dup2 is
    // async-signal-safe and the source descriptor outlives the closure
    // (held by `wrap_child` in the parent).
    unsafe {
        command.pre_exec(move || {
            // the duplicate is implicitly not close-on-exec
            if nix::libc::dup2(wrap_raw, 3) < 0 {
                return Err(std::io::Error::last_os_error());
            }
            Ok(())
        });
    }

    let mut child = command.spawn()?;
    drop(wrap_child);

    let to_stdin = child.stdin.take().map(OwnedFd::from);
    let from_stdout = child.stdout.take().map(OwnedFd::from);
    let from_stderr = child.stderr.take().map(OwnedFd::from);
    let from_wrap = OwnedFd::from(wrap_reader);

    for fd in [&to_stdin, &from_stdout, &from_stderr]
        .into_iter()
        .flatten()
    {
        set_nonblocking(fd)?;
    }
    set_nonblocking(&from_wrap)?;

    Ok(Spawned {
        child,
        to_stdin,
        from_stdout,
        from_stderr,
        from_wrap,
    })
}

fn stdio_for(spec: FdSpec) -> std::io::Result<Stdio> {
    Ok(match spec {
        FdSpec::Inherit(fd) => Stdio::from(fd),
        FdSpec::InputPipe | FdSpec::OutputPipe => Stdio::piped(),
        FdSpec::DevNull => Stdio::null(),
    })
}

#[cfg(test)]
#[path = "spawn_tests.rs"]
mod tests;
