// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Message typing shared by the config parser and the dispatcher.
//!
//! A message carries one [`MessageType`]; a destination carries a
//! [`TypeSet`] of the types it accepts. The config layer parses
//! destination specs ([`DestSpec`]) out of a messages resource, the
//! dispatch layer turns them into live destinations.

use serde::{Deserialize, Serialize};

/// Severity/category of one dispatched message.
///
/// `Abort` and `ErrorTerm` are the catastrophic pair: both print to
/// stdout ahead of normal routing, and `Abort` ends the process with a
/// deliberate crash for a core dump.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Abort,
    Debug,
    Fatal,
    Error,
    Warning,
    Info,
    Saved,
    NotSaved,
    Skipped,
    Mount,
    ErrorTerm,
    Terminate,
    Restored,
    Security,
    Alert,
    VolMgmt,
}

impl MessageType {
    /// All types a destination's type list may name.
    pub const ALL: [MessageType; 16] = [
        MessageType::Abort,
        MessageType::Debug,
        MessageType::Fatal,
        MessageType::Error,
        MessageType::Warning,
        MessageType::Info,
        MessageType::Saved,
        MessageType::NotSaved,
        MessageType::Skipped,
        MessageType::Mount,
        MessageType::ErrorTerm,
        MessageType::Terminate,
        MessageType::Restored,
        MessageType::Security,
        MessageType::Alert,
        MessageType::VolMgmt,
    ];

    fn bit(self) -> u32 {
        1 << (self as u32)
    }

    /// Config token for this type, as written in a destination type list.
    pub fn token(self) -> &'static str {
        match self {
            MessageType::Abort => "abort",
            MessageType::Debug => "debug",
            MessageType::Fatal => "fatal",
            MessageType::Error => "error",
            MessageType::Warning => "warning",
            MessageType::Info => "info",
            MessageType::Saved => "saved",
            MessageType::NotSaved => "notsaved",
            MessageType::Skipped => "skipped",
            MessageType::Mount => "mount",
            MessageType::ErrorTerm => "errorterm",
            MessageType::Terminate => "terminate",
            MessageType::Restored => "restored",
            MessageType::Security => "security",
            MessageType::Alert => "alert",
            MessageType::VolMgmt => "volmgmt",
        }
    }

    /// Reverse of [`token`](Self::token); case-insensitive.
    pub fn from_token(tok: &str) -> Option<MessageType> {
        let lower = tok.to_ascii_lowercase();
        MessageType::ALL.iter().copied().find(|t| t.token() == lower)
    }

    /// Severity label used in message prefixes ("Error", "Fatal error", …).
    pub fn severity_label(self) -> &'static str {
        match self {
            MessageType::Abort => "ABORTING due to ERROR",
            MessageType::Debug => "DEBUG",
            MessageType::Fatal => "Fatal error",
            MessageType::Error => "Error",
            MessageType::Warning => "Warning",
            MessageType::Security => "Security violation",
            MessageType::ErrorTerm => "ERROR TERMINATION",
            _ => "",
        }
    }
}

/// Bitset over [`MessageType`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TypeSet(u32);

impl TypeSet {
    pub const EMPTY: TypeSet = TypeSet(0);

    /// The union of every concrete type.
    pub fn all() -> TypeSet {
        MessageType::ALL
            .iter()
            .fold(TypeSet::EMPTY, |s, &t| s.with(t))
    }

    pub fn with(self, t: MessageType) -> TypeSet {
        TypeSet(self.0 | t.bit())
    }

    pub fn insert(&mut self, t: MessageType) {
        self.0 |= t.bit();
    }

    pub fn remove(&mut self, t: MessageType) {
        self.0 &= !t.bit();
    }

    pub fn contains(self, t: MessageType) -> bool {
        self.0 & t.bit() != 0
    }

    pub fn union(self, other: TypeSet) -> TypeSet {
        TypeSet(self.0 | other.0)
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

/// Destination kind of one entry in a messages resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DestCode {
    Syslog,
    Mail,
    File,
    Append,
    Stdout,
    Stderr,
    Director,
    Operator,
    Console,
    MailOnError,
    MailOnSuccess,
    Catalog,
}

impl DestCode {
    /// Whether this kind takes a comma-separated recipient list before `=`.
    pub fn is_addressed(self) -> bool {
        matches!(
            self,
            DestCode::Mail
                | DestCode::MailOnError
                | DestCode::MailOnSuccess
                | DestCode::Director
                | DestCode::Operator
        )
    }

    /// Whether this kind takes a single file path before the type list.
    pub fn is_file_backed(self) -> bool {
        matches!(self, DestCode::File | DestCode::Append)
    }

    pub fn token(self) -> &'static str {
        match self {
            DestCode::Syslog => "syslog",
            DestCode::Mail => "mail",
            DestCode::File => "file",
            DestCode::Append => "append",
            DestCode::Stdout => "stdout",
            DestCode::Stderr => "stderr",
            DestCode::Director => "director",
            DestCode::Operator => "operator",
            DestCode::Console => "console",
            DestCode::MailOnError => "mailonerror",
            DestCode::MailOnSuccess => "mailonsuccess",
            DestCode::Catalog => "catalog",
        }
    }

    pub fn from_token(tok: &str) -> Option<DestCode> {
        let lower = tok.to_ascii_lowercase();
        [
            DestCode::Syslog,
            DestCode::Mail,
            DestCode::File,
            DestCode::Append,
            DestCode::Stdout,
            DestCode::Stderr,
            DestCode::Director,
            DestCode::Operator,
            DestCode::Console,
            DestCode::MailOnError,
            DestCode::MailOnSuccess,
            DestCode::Catalog,
        ]
        .into_iter()
        .find(|c| c.token() == lower)
    }
}

/// One parsed destination of a messages resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DestSpec {
    pub code: DestCode,
    pub types: TypeSet,
    /// Recipients (addressed kinds) or the single path (file-backed kinds).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub targets: Vec<String>,
    /// Mailer command override for the mail/operator kinds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mail_command: Option<String>,
}

impl DestSpec {
    pub fn new(code: DestCode) -> Self {
        Self {
            code,
            types: TypeSet::EMPTY,
            targets: Vec::new(),
            mail_command: None,
        }
    }
}

/// A parsed messages resource: the ordered destinations plus the union
/// bitset used as the fast reject filter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MsgsSpec {
    pub name: String,
    pub dests: Vec<DestSpec>,
    pub send: TypeSet,
}

impl MsgsSpec {
    pub fn push(&mut self, dest: DestSpec) {
        self.send = self.send.union(dest.types);
        self.dests.push(dest);
    }
}

/// Terminal status of a job, as the mail predicates see it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Running,
    Ok,
    Warnings,
    ErrorTerminated,
    Canceled,
}

impl JobStatus {
    /// Does a MAIL_ON_ERROR destination deliver for this status?
    pub fn is_mail_on_error(self) -> bool {
        !matches!(self, JobStatus::Ok)
    }

    /// Does a MAIL_ON_SUCCESS destination deliver for this status?
    pub fn is_mail_on_success(self) -> bool {
        !matches!(self, JobStatus::ErrorTerminated | JobStatus::Canceled)
    }
}

#[cfg(test)]
#[path = "msg_tests.rs"]
mod tests;
