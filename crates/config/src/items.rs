// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Item tables: the per-resource-type descriptors that drive the parser.
//!
//! Each resource type is a static table of [`ItemDef`]s. The parser
//! dispatches on [`ItemKind`] to produce one typed [`Value`] per item;
//! resource references stay by-name until the second pass checks them.

use serde::{Deserialize, Serialize};

use ndm_core::MsgsSpec;

/// Item must be present or parsing fails.
pub const ITEM_REQUIRED: u32 = 1 << 0;
/// Apply `default` when absent.
pub const ITEM_DEFAULT: u32 = 1 << 1;

/// One directive a resource type accepts.
pub struct ItemDef {
    /// Table name, lowercase, no spaces (`"maximumvolumesize"`).
    pub name: &'static str,
    pub kind: ItemKind,
    pub flags: u32,
    pub default: Option<&'static str>,
}

impl ItemDef {
    pub const fn new(name: &'static str, kind: ItemKind) -> Self {
        Self {
            name,
            kind,
            flags: 0,
            default: None,
        }
    }

    pub const fn required(mut self) -> Self {
        self.flags |= ITEM_REQUIRED;
        self
    }

    pub const fn with_default(mut self, default: &'static str) -> Self {
        self.flags |= ITEM_DEFAULT;
        self.default = Some(default);
        self
    }
}

/// Typed handler selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemKind {
    /// Resource name (also the instance key).
    Name,
    Str,
    /// Directory path; `$VAR` and `~` expand unless the value starts
    /// with `|`.
    Dir,
    /// Stored as the MD5 hex digest of the configured string.
    Password,
    Int32,
    PInt32,
    Int64,
    Size32,
    Size64,
    Speed,
    Time,
    Bool,
    /// Set this bit in the resource's bitfield when true.
    Bit(u32),
    /// Listen/connect address block list.
    Addresses,
    /// Comma-separated list of strings.
    StrList,
    /// Reference to one resource of the named type (resolved pass 2).
    Res(&'static str),
    /// References to many resources of the named type (resolved pass 2).
    ResList(&'static str),
    /// One message-destination kind; repeated lines accumulate into the
    /// resource's destination list.
    Dest(ndm_core::DestCode),
    /// Tape label format enum.
    Label,
}

/// Tape label formats understood by the storage side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelFormat {
    Ndm,
    Ansi,
    Ibm,
}

impl LabelFormat {
    pub fn from_token(tok: &str) -> Option<LabelFormat> {
        Some(match tok.to_ascii_lowercase().as_str() {
            "ndm" | "native" => LabelFormat::Ndm,
            "ansi" => LabelFormat::Ansi,
            "ibm" => LabelFormat::Ibm,
            _ => return None,
        })
    }
}

/// One parsed value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Value {
    Str(String),
    /// MD5 hex digest of the configured password.
    Password(String),
    Int(i64),
    Size(u64),
    Speed(u64),
    /// Seconds.
    Time(u64),
    Bool(bool),
    Bits(u32),
    /// Resolved socket addresses, as strings for the dump.
    Addresses(Vec<String>),
    /// By-name reference, verified in pass 2.
    ResRef(String),
    ResList(Vec<String>),
    StrList(Vec<String>),
    Msgs(MsgsSpec),
    Label(LabelFormat),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) | Value::Password(s) | Value::ResRef(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            Value::Size(n) | Value::Speed(n) | Value::Time(n) => i64::try_from(*n).ok(),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::Size(n) | Value::Speed(n) | Value::Time(n) => Some(*n),
            Value::Int(n) => u64::try_from(*n).ok(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_msgs(&self) -> Option<&MsgsSpec> {
        match self {
            Value::Msgs(m) => Some(m),
            _ => None,
        }
    }
}

/// Normalize a directive name for table lookup: case folded, spaces and
/// dashes dropped, so `Maximum Volume Size` matches `maximumvolumesize`.
pub fn fold_name(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_whitespace() && *c != '-' && *c != '_')
        .map(|c| c.to_ascii_lowercase())
        .collect()
}
