// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Command control block: the digested argv of a format subprocess.
//!
//! `wrap_tar`-style programs are started as
//! `wrap_<type> [-d N] {-c|-x|-t} [-B type] [-I file|#fd] [-f file|#fd|-]
//! [-E NAME=VALUE …] [-o OPT …] [ORIG @fhinfo DEST …]`; this module
//! parses that into a [`Ccb`], interprets the recognized env options,
//! and opens the index/data channels. The recovery-streamer state also
//! lives here (see [`crate::reco`] for the algorithms).

use std::fs::File;
use std::io::Write;

use thiserror::Error;
use tracing::debug;

use crate::reco::RecoError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Operation {
    #[default]
    None,
    /// `-c`
    Backup,
    /// `-x`
    Recover,
    /// `-t`
    RecoverFilehist,
}

/// File-history mode selected by the `HIST`/`HIST_TYPE` env options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HistMode {
    #[default]
    Off,
    /// `y`: full dir/node history
    Full,
    /// `d`: directory entries only
    Dirs,
    /// `f`: path-based file entries
    Files,
}

/// Discovered kind of the data connection (fstat of the descriptor).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DataConnMode {
    #[default]
    Unknown,
    Pipe,
    File,
}

/// One `ORIG @fhinfo DEST` recovery triple.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveryFile {
    /// Path relative to the backup root.
    pub original_name: String,
    pub fhinfo: Option<u64>,
    /// Path relative to the live file system.
    pub save_to_name: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CcbError {
    #[error("missing operation flag (-c, -x or -t)")]
    NoOperation,

    #[error("conflicting operation flags")]
    ConflictingOperations,

    #[error("option {0} needs an argument")]
    MissingArgument(String),

    #[error("bad -E option \"{0}\", expected NAME=VALUE")]
    BadEnv(String),

    #[error("unknown option \"{0}\"")]
    UnknownOption(String),

    #[error("recovery file list must be ORIG @fhinfo DEST triples")]
    BadFileTriple,

    #[error("bad fhinfo token \"{0}\"")]
    BadFhinfo(String),

    #[error("cannot open {name}: {detail}")]
    Open { name: String, detail: String },
}

/// Parsed argv plus the live recovery-streamer state.
pub struct Ccb {
    pub progname: String,
    pub op: Operation,
    /// `-B`
    pub bu_type: Option<String>,
    /// `-d`
    pub debug: u32,
    /// `-E` pairs in order.
    pub env: Vec<(String, String)>,
    /// `-o` opaque options.
    pub opts: Vec<String>,
    /// `-I`
    pub index_name: Option<String>,
    /// `-f`
    pub image_name: Option<String>,
    pub files: Vec<RecoveryFile>,

    // interpretations of the env
    pub hist: HistMode,
    pub direct: bool,
    pub backup_root: String,

    // channels
    pub index: Option<Box<dyn Write + Send>>,
    pub data_conn: Option<File>,
    pub data_conn_mode: DataConnMode,

    // recovery windows (offsets into the backup image)
    pub iobuf: Vec<u8>,
    pub have_start: usize,
    pub have_off: u64,
    pub have_len: usize,
    pub want_off: u64,
    pub want_len: u64,
    pub reading_off: u64,
    pub reading_len: u64,
    pub last_read_off: u64,
    pub last_read_len: u64,
    pub expect_off: u64,
    pub expect_len: u64,
    pub error: Option<RecoError>,
}

impl Ccb {
    /// Digest argv (`args[0]` is the program name).
    pub fn from_args(args: &[String]) -> Result<Self, CcbError> {
        let mut ccb = Ccb::empty(args.first().map(String::as_str).unwrap_or("wrap"));

        let mut positional: Vec<String> = Vec::new();
        let mut it = args.iter().skip(1);
        while let Some(arg) = it.next() {
            let mut need = |flag: &str| -> Result<String, CcbError> {
                it.next()
                    .cloned()
                    .ok_or_else(|| CcbError::MissingArgument(flag.to_string()))
            };
            match arg.as_str() {
                "-c" => ccb.set_op(Operation::Backup)?,
                "-x" => ccb.set_op(Operation::Recover)?,
                "-t" => ccb.set_op(Operation::RecoverFilehist)?,
                "-B" => ccb.bu_type = Some(need("-B")?),
                "-d" => {
                    let v = need("-d")?;
                    ccb.debug = v
                        .parse()
                        .map_err(|_| CcbError::MissingArgument("-d".to_string()))?;
                }
                "-I" => ccb.index_name = Some(need("-I")?),
                "-f" => ccb.image_name = Some(need("-f")?),
                "-E" => {
                    let pair = need("-E")?;
                    let (name, value) = pair
                        .split_once('=')
                        .ok_or_else(|| CcbError::BadEnv(pair.clone()))?;
                    ccb.env.push((name.to_string(), value.to_string()));
                }
                "-o" => ccb.opts.push(need("-o")?),
                other if other.starts_with('-') && other.len() > 1 => {
                    return Err(CcbError::UnknownOption(other.to_string()))
                }
                other => positional.push(other.to_string()),
            }
        }

        if ccb.op == Operation::None {
            return Err(CcbError::NoOperation);
        }

        if !positional.is_empty() {
            if positional.len() % 3 != 0 {
                return Err(CcbError::BadFileTriple);
            }
            for triple in positional.chunks(3) {
                let fh_tok = &triple[1];
                let fhinfo = match fh_tok.strip_prefix('@') {
                    Some("-") => None,
                    Some(n) => Some(
                        n.parse()
                            .map_err(|_| CcbError::BadFhinfo(fh_tok.clone()))?,
                    ),
                    None => return Err(CcbError::BadFileTriple),
                };
                ccb.files.push(RecoveryFile {
                    original_name: triple[0].clone(),
                    fhinfo,
                    save_to_name: triple[2].clone(),
                });
            }
        }

        ccb.interpret_env();
        Ok(ccb)
    }

    fn empty(progname: &str) -> Self {
        Self {
            progname: progname.to_string(),
            op: Operation::None,
            bu_type: None,
            debug: 0,
            env: Vec::new(),
            opts: Vec::new(),
            index_name: None,
            image_name: None,
            files: Vec::new(),
            hist: HistMode::Off,
            direct: false,
            backup_root: "/".to_string(),
            index: None,
            data_conn: None,
            data_conn_mode: DataConnMode::Unknown,
            iobuf: Vec::new(),
            have_start: 0,
            have_off: 0,
            have_len: 0,
            want_off: 0,
            want_len: 0,
            reading_off: 0,
            reading_len: 0,
            last_read_off: 0,
            last_read_len: 0,
            expect_off: u64::MAX,
            expect_len: 0,
            error: None,
        }
    }

    fn set_op(&mut self, op: Operation) -> Result<(), CcbError> {
        if self.op != Operation::None && self.op != op {
            return Err(CcbError::ConflictingOperations);
        }
        self.op = op;
        Ok(())
    }

    /// Apply the recognized env options; everything else is opaque
    /// pass-through for the format program.
    fn interpret_env(&mut self) {
        for (name, value) in &self.env {
            match name.as_str() {
                "HIST" => {
                    self.hist = match value.chars().next() {
                        Some('y') | Some('Y') => HistMode::Full,
                        _ => HistMode::Off,
                    }
                }
                "HIST_TYPE" => {
                    self.hist = match value.chars().next() {
                        Some('y') | Some('Y') => HistMode::Full,
                        Some('d') | Some('D') => HistMode::Dirs,
                        Some('f') | Some('F') => HistMode::Files,
                        _ => self.hist,
                    }
                }
                "DIRECT" => self.direct = value.starts_with('y') || value.starts_with('Y'),
                "FILESYSTEM" | "PREFIX" => self.backup_root = value.clone(),
                _ => debug!(name, value, "opaque env option"),
            }
        }
    }

    pub fn find_env(&self, name: &str) -> Option<&str> {
        self.env
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Size the recovery buffer. Must happen before the first seek.
    pub fn with_iobuf(mut self, capacity: usize) -> Self {
        self.iobuf = vec![0; capacity];
        self
    }

    /// Open the index channel named by `-I` (`#N` adopts inherited
    /// descriptor N, otherwise a path is created/appended).
    pub fn open_index(&mut self) -> Result<(), CcbError> {
        let Some(name) = self.index_name.clone() else {
            return Ok(());
        };
        let writer: Box<dyn Write + Send> = if let Some(fd) = parse_fd_name(&name) {
            Box::new(adopt_fd(fd).map_err(|e| CcbError::Open {
                name: name.clone(),
                detail: e.to_string(),
            })?)
        } else {
            Box::new(
                std::fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(&name)
                    .map_err(|e| CcbError::Open {
                        name: name.clone(),
                        detail: e.to_string(),
                    })?,
            )
        };
        self.index = Some(writer);
        Ok(())
    }

    /// Open the data connection named by `-f`. `-` means stdin for
    /// recovery and stdout for backup; `#N` adopts descriptor N.
    pub fn open_image(&mut self) -> Result<(), CcbError> {
        let Some(name) = self.image_name.clone() else {
            return Ok(());
        };
        let file = if name == "-" {
            let fd = match self.op {
                Operation::Backup => 1,
                _ => 0,
            };
            adopt_fd(fd)
        } else if let Some(fd) = parse_fd_name(&name) {
            adopt_fd(fd)
        } else {
            match self.op {
                Operation::Backup => std::fs::OpenOptions::new()
                    .create(true)
                    .write(true)
                    .truncate(true)
                    .open(&name),
                _ => File::open(&name),
            }
        };
        self.data_conn = Some(file.map_err(|e| CcbError::Open {
            name: name.clone(),
            detail: e.to_string(),
        })?);
        Ok(())
    }
}

fn parse_fd_name(name: &str) -> Option<i32> {
    name.strip_prefix('#').and_then(|n| n.parse().ok())
}

/// Adopt an inherited descriptor as a `File`. The descriptor comes from
/// our own spawn contract (fd 3 = wrap pipe, 0/1 = data), so ownership
/// is genuinely ours; this is the one place the subprocess side needs
/// `from_raw_fd`.
#[allow(unsafe_code)]
fn adopt_fd(fd: i32) -> std::io::Result<File> {
    use std::os::fd::FromRawFd;
    if fd < 0 {
        return Err(std::io::Error::from(std::io::ErrorKind::InvalidInput));
    }
    // SAFETY: fd numbers come from the spawn fd-map contract and are not
    // otherwise owned by this process's std handles.
    Ok(unsafe { File::from_raw_fd(fd) })
}

#[cfg(test)]
#[path = "ccb_tests.rs"]
mod tests;
