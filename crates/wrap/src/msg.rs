// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The WRAP line codec.
//!
//! One newline-terminated line per message: a two-character tag, a
//! space, then whitespace-separated fields with string values escaped
//! as canonical strings. `parse(format(m)) == m` for every kind.

use std::fmt::Write as _;

use thiserror::Error;

use ndm_core::cstr::{self, CstrError};

/// Marker for "no file-history cookie" (`@-` on the wire).
pub const INVALID_FHINFO: u64 = u64::MAX;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WrapError {
    #[error("empty or truncated message")]
    Truncated,

    #[error("unknown message tag \"{0}\"")]
    UnknownTag(String),

    #[error("bad token at \"{0}\"")]
    BadToken(String),

    /// Distinct from [`BadToken`](Self::BadToken) so callers can choose
    /// to tolerate forward-compatible stat additions.
    #[error("unknown fstat selector \"{0}\"")]
    UnknownFstatSelector(String),

    #[error("unknown file type character '{0}'")]
    UnknownFileType(char),

    #[error("node message without a fileno")]
    MissingFileno,

    #[error("string field: {0}")]
    Cstr(#[from] CstrError),
}

/// File type characters of the `f` selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    Dir,
    Fifo,
    CharDev,
    BlockDev,
    Regular,
    Symlink,
    Socket,
    Registry,
    Other,
}

impl FileType {
    pub fn code(self) -> char {
        match self {
            FileType::Dir => 'd',
            FileType::Fifo => 'p',
            FileType::CharDev => 'c',
            FileType::BlockDev => 'b',
            FileType::Regular => '-',
            FileType::Symlink => 'l',
            FileType::Socket => 's',
            FileType::Registry => 'R',
            FileType::Other => 'o',
        }
    }

    pub fn from_code(c: char) -> Result<FileType, WrapError> {
        Ok(match c {
            'd' => FileType::Dir,
            'p' => FileType::Fifo,
            'c' => FileType::CharDev,
            'b' => FileType::BlockDev,
            '-' => FileType::Regular,
            'l' => FileType::Symlink,
            's' => FileType::Socket,
            'R' => FileType::Registry,
            'o' => FileType::Other,
            other => return Err(WrapError::UnknownFileType(other)),
        })
    }
}

/// File attributes; absent fields were not on the wire.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Fstat {
    pub ftype: Option<FileType>,
    /// Low twelve permission bits, octal on the wire.
    pub mode: Option<u16>,
    pub links: Option<u32>,
    pub size: Option<u64>,
    pub uid: Option<u32>,
    pub gid: Option<u32>,
    pub atime: Option<u32>,
    pub mtime: Option<u32>,
    pub ctime: Option<u32>,
    pub fileno: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataStatus {
    Running,
    DoneOk,
    DoneFailed,
}

impl DataStatus {
    fn code(self) -> char {
        match self {
            DataStatus::Running => 'r',
            DataStatus::DoneOk => 'd',
            DataStatus::DoneFailed => 'f',
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataStats {
    pub status: DataStatus,
    pub bytes_written: Option<u64>,
    pub est_time_remaining: Option<u64>,
    pub est_bytes_remaining: Option<u64>,
}

/// One WRAP message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WrapMsg {
    /// `Lx` free-text log line.
    Log(String),
    /// `HF` add a file to the history.
    AddFile {
        path: String,
        fhinfo: Option<u64>,
        fstat: Fstat,
    },
    /// `HD` add a directory entry.
    AddDirent {
        dir_fileno: u64,
        name: String,
        fileno: u64,
        fhinfo: Option<u64>,
    },
    /// `HN` add a node; `fstat.fileno` is mandatory.
    AddNode { fhinfo: Option<u64>, fstat: Fstat },
    /// `DE` environment update.
    AddEnv { name: String, value: String },
    /// `DR` data-read request during recovery.
    DataRead { offset: u64, length: u64 },
    /// `DS` periodic transfer statistics.
    DataStats(DataStats),
    /// `RR` per-file recovery result.
    RecoveryResult { errno: i32, path: String },
}

// ---- parsing ----

/// Parse one line (trailing newline optional).
pub fn parse(line: &str) -> Result<WrapMsg, WrapError> {
    let line = line.trim_end_matches('\n');
    if line.len() < 2 {
        return Err(WrapError::Truncated);
    }
    let (tag, rest) = line.split_at(2);
    let rest = rest.strip_prefix(' ').unwrap_or(rest);
    match tag {
        "Lx" => Ok(WrapMsg::Log(decode_str(rest.trim_end())?)),
        "HF" => parse_add_file(rest),
        "HD" => parse_add_dirent(rest),
        "HN" => parse_add_node(rest),
        "DE" => parse_add_env(rest),
        "DR" => parse_data_read(rest),
        "DS" => parse_data_stats(rest),
        "RR" => parse_recovery_result(rest),
        other => Err(WrapError::UnknownTag(other.to_string())),
    }
}

fn decode_str(token: &str) -> Result<String, WrapError> {
    let bytes = cstr::decode(token)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn tokens(rest: &str) -> impl Iterator<Item = &str> {
    // multiple spaces collapse, trailing space ignored
    rest.split(' ').filter(|t| !t.is_empty())
}

fn parse_u64(tok: &str) -> Result<u64, WrapError> {
    tok.parse().map_err(|_| WrapError::BadToken(tok.to_string()))
}

fn parse_fhinfo(tok: &str) -> Result<Option<u64>, WrapError> {
    let rest = &tok[1..];
    if rest == "-" {
        return Ok(None);
    }
    parse_u64(rest).map(Some)
}

fn parse_fstat_token(tok: &str, fstat: &mut Fstat) -> Result<(), WrapError> {
    let bad = || WrapError::BadToken(tok.to_string());
    let mut chars = tok.chars();
    match chars.next().ok_or_else(bad)? {
        's' => fstat.size = Some(parse_u64(&tok[1..])?),
        'i' => fstat.fileno = Some(parse_u64(&tok[1..])?),
        'm' => {
            fstat.mode =
                Some(u16::from_str_radix(&tok[1..], 8).map_err(|_| bad())? & 0o7777)
        }
        'l' => fstat.links = Some(tok[1..].parse().map_err(|_| bad())?),
        'u' => fstat.uid = Some(tok[1..].parse().map_err(|_| bad())?),
        'g' => fstat.gid = Some(tok[1..].parse().map_err(|_| bad())?),
        't' => match chars.next() {
            Some('a') => fstat.atime = Some(tok[2..].parse().map_err(|_| bad())?),
            Some('m') => fstat.mtime = Some(tok[2..].parse().map_err(|_| bad())?),
            Some('c') => fstat.ctime = Some(tok[2..].parse().map_err(|_| bad())?),
            _ => return Err(WrapError::UnknownFstatSelector(tok.to_string())),
        },
        'f' => {
            let c = chars.next().ok_or_else(bad)?;
            fstat.ftype = Some(FileType::from_code(c)?);
        }
        _ => return Err(WrapError::UnknownFstatSelector(tok.to_string())),
    }
    Ok(())
}

fn parse_add_file(rest: &str) -> Result<WrapMsg, WrapError> {
    let mut toks = tokens(rest);
    let path = decode_str(toks.next().ok_or(WrapError::Truncated)?)?;
    let mut fhinfo = None;
    let mut fstat = Fstat::default();
    for tok in toks {
        if tok.starts_with('@') {
            fhinfo = parse_fhinfo(tok)?;
        } else {
            parse_fstat_token(tok, &mut fstat)?;
        }
    }
    Ok(WrapMsg::AddFile {
        path,
        fhinfo,
        fstat,
    })
}

fn parse_add_dirent(rest: &str) -> Result<WrapMsg, WrapError> {
    let mut toks = tokens(rest);
    let dir_fileno = parse_u64(toks.next().ok_or(WrapError::Truncated)?)?;
    let name = decode_str(toks.next().ok_or(WrapError::Truncated)?)?;
    let fileno = parse_u64(toks.next().ok_or(WrapError::Truncated)?)?;
    let mut fhinfo = None;
    if let Some(tok) = toks.next() {
        if !tok.starts_with('@') {
            return Err(WrapError::BadToken(tok.to_string()));
        }
        fhinfo = parse_fhinfo(tok)?;
    }
    if let Some(extra) = toks.next() {
        return Err(WrapError::BadToken(extra.to_string()));
    }
    Ok(WrapMsg::AddDirent {
        dir_fileno,
        name,
        fileno,
        fhinfo,
    })
}

fn parse_add_node(rest: &str) -> Result<WrapMsg, WrapError> {
    let mut toks = tokens(rest);
    let fileno_tok = toks.next().ok_or(WrapError::Truncated)?;
    let mut fstat = Fstat {
        fileno: Some(parse_u64(fileno_tok)?),
        ..Default::default()
    };
    let mut fhinfo = None;
    for tok in toks {
        if tok.starts_with('@') {
            fhinfo = parse_fhinfo(tok)?;
        } else {
            parse_fstat_token(tok, &mut fstat)?;
        }
    }
    if fstat.fileno.is_none() {
        return Err(WrapError::MissingFileno);
    }
    Ok(WrapMsg::AddNode { fhinfo, fstat })
}

fn parse_add_env(rest: &str) -> Result<WrapMsg, WrapError> {
    let mut toks = tokens(rest);
    let name = decode_str(toks.next().ok_or(WrapError::Truncated)?)?;
    let value = decode_str(toks.next().ok_or(WrapError::Truncated)?)?;
    Ok(WrapMsg::AddEnv { name, value })
}

fn parse_data_read(rest: &str) -> Result<WrapMsg, WrapError> {
    let mut toks = tokens(rest);
    let offset = parse_u64(toks.next().ok_or(WrapError::Truncated)?)?;
    let length = parse_u64(toks.next().ok_or(WrapError::Truncated)?)?;
    Ok(WrapMsg::DataRead { offset, length })
}

fn parse_data_stats(rest: &str) -> Result<WrapMsg, WrapError> {
    let mut status = None;
    let mut stats = DataStats {
        status: DataStatus::Running,
        bytes_written: None,
        est_time_remaining: None,
        est_bytes_remaining: None,
    };
    for tok in tokens(rest) {
        if let Some(code) = tok.strip_prefix('s') {
            status = Some(match code {
                "r" => DataStatus::Running,
                "d" => DataStatus::DoneOk,
                "f" => DataStatus::DoneFailed,
                _ => return Err(WrapError::BadToken(tok.to_string())),
            });
        } else if let Some(n) = tok.strip_prefix("et") {
            stats.est_time_remaining = Some(parse_u64(n)?);
        } else if let Some(n) = tok.strip_prefix("eb") {
            stats.est_bytes_remaining = Some(parse_u64(n)?);
        } else if let Some(n) = tok.strip_prefix('w') {
            stats.bytes_written = Some(parse_u64(n)?);
        } else {
            return Err(WrapError::BadToken(tok.to_string()));
        }
    }
    stats.status = status.ok_or(WrapError::Truncated)?;
    Ok(WrapMsg::DataStats(stats))
}

fn parse_recovery_result(rest: &str) -> Result<WrapMsg, WrapError> {
    let mut toks = tokens(rest);
    let errno_tok = toks.next().ok_or(WrapError::Truncated)?;
    let errno: i32 = errno_tok
        .parse()
        .map_err(|_| WrapError::BadToken(errno_tok.to_string()))?;
    let path = decode_str(toks.next().ok_or(WrapError::Truncated)?)?;
    Ok(WrapMsg::RecoveryResult { errno, path })
}

// ---- formatting ----

fn push_fstat(out: &mut String, fstat: &Fstat, suppress_fileno: bool) {
    if let Some(t) = fstat.ftype {
        let _ = write!(out, " f{}", t.code());
    }
    if let Some(m) = fstat.mode {
        let _ = write!(out, " m{:04o}", m);
    }
    if let Some(l) = fstat.links {
        let _ = write!(out, " l{}", l);
    }
    if let Some(s) = fstat.size {
        let _ = write!(out, " s{}", s);
    }
    if let Some(u) = fstat.uid {
        let _ = write!(out, " u{}", u);
    }
    if let Some(g) = fstat.gid {
        let _ = write!(out, " g{}", g);
    }
    if let Some(t) = fstat.atime {
        let _ = write!(out, " ta{}", t);
    }
    if let Some(t) = fstat.mtime {
        let _ = write!(out, " tm{}", t);
    }
    if let Some(t) = fstat.ctime {
        let _ = write!(out, " tc{}", t);
    }
    if !suppress_fileno {
        if let Some(i) = fstat.fileno {
            let _ = write!(out, " i{}", i);
        }
    }
}

fn push_fhinfo(out: &mut String, fhinfo: Option<u64>) {
    if let Some(fh) = fhinfo {
        let _ = write!(out, " @{}", fh);
    }
}

/// Format one message as its wire line, newline included.
pub fn format(msg: &WrapMsg) -> String {
    let mut out = String::new();
    match msg {
        WrapMsg::Log(text) => {
            let _ = write!(out, "Lx {}", cstr::encode(text.as_bytes()));
        }
        WrapMsg::AddFile {
            path,
            fhinfo,
            fstat,
        } => {
            let _ = write!(out, "HF {}", cstr::encode(path.as_bytes()));
            push_fhinfo(&mut out, *fhinfo);
            push_fstat(&mut out, fstat, false);
        }
        WrapMsg::AddDirent {
            dir_fileno,
            name,
            fileno,
            fhinfo,
        } => {
            let _ = write!(
                out,
                "HD {} {} {}",
                dir_fileno,
                cstr::encode(name.as_bytes()),
                fileno
            );
            push_fhinfo(&mut out, *fhinfo);
        }
        WrapMsg::AddNode { fhinfo, fstat } => {
            match fstat.fileno {
                Some(fileno) => {
                    let _ = write!(out, "HN {}", fileno);
                }
                None => out.push_str("HN 0000000000"),
            }
            push_fhinfo(&mut out, *fhinfo);
            push_fstat(&mut out, fstat, true);
        }
        WrapMsg::AddEnv { name, value } => {
            let _ = write!(
                out,
                "DE {} {}",
                cstr::encode(name.as_bytes()),
                cstr::encode(value.as_bytes())
            );
        }
        WrapMsg::DataRead { offset, length } => {
            let _ = write!(out, "DR {} {}", offset, length);
        }
        WrapMsg::DataStats(stats) => {
            let _ = write!(out, "DS s{}", stats.status.code());
            if let Some(w) = stats.bytes_written {
                let _ = write!(out, " w{}", w);
            }
            if let Some(et) = stats.est_time_remaining {
                let _ = write!(out, " et{}", et);
            }
            if let Some(eb) = stats.est_bytes_remaining {
                let _ = write!(out, " eb{}", eb);
            }
        }
        WrapMsg::RecoveryResult { errno, path } => {
            let _ = write!(out, "RR {} {}", errno, cstr::encode(path.as_bytes()));
        }
    }
    out.push('\n');
    out
}

#[cfg(test)]
#[path = "msg_tests.rs"]
mod tests;
