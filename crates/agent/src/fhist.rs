// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! File-history translation and delivery hooks.
//!
//! WRAP stat records become v9-shaped file stats here before going to
//! the control agent. The sink is a trait so the daemon can forward to
//! its control connection while tests record.

use ndm_wrap::{FileType, Fstat};

/// v9-shaped file stat: the concrete record shipped to the control
/// agent, all optionality preserved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStatV9 {
    pub ftype: FileType,
    pub mode: Option<u16>,
    pub size: Option<u64>,
    pub links: Option<u32>,
    pub uid: Option<u32>,
    pub gid: Option<u32>,
    pub atime: Option<u32>,
    pub mtime: Option<u32>,
    pub ctime: Option<u32>,
    pub node: Option<u64>,
    pub fh_info: Option<u64>,
}

impl FileStatV9 {
    /// Translate a WRAP stat plus its fhinfo cookie. A missing type maps
    /// to `Other`; the link count comes from the dedicated nlinks field.
    pub fn from_wrap(fstat: &Fstat, fh_info: Option<u64>) -> Self {
        Self {
            ftype: fstat.ftype.unwrap_or(FileType::Other),
            mode: fstat.mode,
            size: fstat.size,
            links: fstat.links,
            uid: fstat.uid,
            gid: fstat.gid,
            atime: fstat.atime,
            mtime: fstat.mtime,
            ctime: fstat.ctime,
            node: fstat.fileno,
            fh_info,
        }
    }
}

/// Where translated history goes. `flush` marks a delivery boundary
/// (end of job or buffer pressure).
pub trait FileHistory: Send {
    fn add_file(&mut self, fstat: &FileStatV9, path: &str);
    fn add_dir(&mut self, dir_fileno: u64, name: &str, fileno: u64);
    fn add_node(&mut self, fstat: &FileStatV9);
    fn flush(&mut self);
}

/// Entry recorded by the in-memory sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HistEntry {
    File { fstat: FileStatV9, path: String },
    Dir {
        dir_fileno: u64,
        name: String,
        fileno: u64,
    },
    Node { fstat: FileStatV9 },
}

/// Arrival-order history sink; the control agent reads `take_flushed`
/// after each flush boundary.
#[derive(Default)]
pub struct RecordingHistory {
    entries: Vec<HistEntry>,
    flushed: usize,
}

impl RecordingHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[HistEntry] {
        &self.entries
    }

    /// Entries made visible by the last flush.
    pub fn flushed(&self) -> &[HistEntry] {
        &self.entries[..self.flushed]
    }
}

impl FileHistory for RecordingHistory {
    fn add_file(&mut self, fstat: &FileStatV9, path: &str) {
        self.entries.push(HistEntry::File {
            fstat: *fstat,
            path: path.to_string(),
        });
    }

    fn add_dir(&mut self, dir_fileno: u64, name: &str, fileno: u64) {
        self.entries.push(HistEntry::Dir {
            dir_fileno,
            name: name.to_string(),
            fileno,
        });
    }

    fn add_node(&mut self, fstat: &FileStatV9) {
        self.entries.push(HistEntry::Node { fstat: *fstat });
    }

    fn flush(&mut self) {
        self.flushed = self.entries.len();
    }
}

#[cfg(test)]
#[path = "fhist_tests.rs"]
mod tests;
