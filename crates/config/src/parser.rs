// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Two-pass resource parser.
//!
//! Pass 1 lexes `Type { key = value; … }` blocks against the caller's
//! item tables, applying defaults and checking required items as each
//! block closes. Pass 2 walks the finished set and verifies that every
//! resource reference names a resource that exists. Errors carry the
//! file and line; all of them are fatal to the load.

use indexmap::IndexMap;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::addrs::{self, AddrsError};
use crate::items::{fold_name, ItemDef, ItemKind, LabelFormat, Value, ITEM_DEFAULT, ITEM_REQUIRED};
use crate::lex::{LexError, Lexer, Tok};
use crate::msgs::{self, MsgsError};
use crate::value;

use ndm_core::MsgsSpec;

/// One resource type a daemon understands.
pub struct ResourceTable {
    /// Folded type name (`"daemon"`, `"messages"`, …).
    pub type_name: &'static str,
    pub items: &'static [ItemDef],
    /// Default port for address blocks in this resource.
    pub default_port: &'static str,
}

/// One parsed resource instance.
#[derive(Debug, Clone, Serialize)]
pub struct Resource {
    pub type_name: String,
    pub name: String,
    pub values: IndexMap<String, Value>,
    /// Accumulated bit items.
    pub bits: u32,
    /// Accumulated message destinations (empty for other types).
    #[serde(skip_serializing_if = "msgs_is_empty")]
    pub dests: MsgsSpec,
}

fn msgs_is_empty(m: &MsgsSpec) -> bool {
    m.dests.is_empty()
}

impl Resource {
    pub fn get(&self, item: &str) -> Option<&Value> {
        self.values.get(&fold_name(item))
    }

    pub fn str_value(&self, item: &str) -> Option<&str> {
        self.get(item).and_then(Value::as_str)
    }

    pub fn u64_value(&self, item: &str) -> Option<u64> {
        self.get(item).and_then(Value::as_u64)
    }

    pub fn bool_value(&self, item: &str) -> Option<bool> {
        self.get(item).and_then(Value::as_bool)
    }
}

/// The full parsed configuration: type → name → resource, both levels in
/// file order.
#[derive(Debug, Default, Serialize)]
pub struct Config {
    pub resources: IndexMap<String, IndexMap<String, Resource>>,
}

impl Config {
    pub fn get(&self, type_name: &str, name: &str) -> Option<&Resource> {
        self.resources.get(&fold_name(type_name))?.get(name)
    }

    pub fn by_type(&self, type_name: &str) -> impl Iterator<Item = &Resource> {
        self.resources
            .get(&fold_name(type_name))
            .into_iter()
            .flat_map(|m| m.values())
    }

    /// The only resource of a type, when the config declares exactly one.
    pub fn single(&self, type_name: &str) -> Option<&Resource> {
        let all = self.resources.get(&fold_name(type_name))?;
        if all.len() == 1 {
            all.values().next()
        } else {
            None
        }
    }

    pub fn dump_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("{file}:{line}: {source}")]
    Lex {
        file: String,
        line: u32,
        source: LexError,
    },

    #[error("{file}:{line}: {detail}")]
    Syntax {
        file: String,
        line: u32,
        detail: String,
    },

    #[error("{file}:{line}: unknown resource type \"{type_name}\"")]
    UnknownResourceType {
        file: String,
        line: u32,
        type_name: String,
    },

    #[error("{file}:{line}: unknown directive \"{item}\" in {type_name}")]
    UnknownItem {
        file: String,
        line: u32,
        item: String,
        type_name: String,
    },

    #[error("{file}:{line}: bad value for \"{item}\": {detail}")]
    BadValue {
        file: String,
        line: u32,
        item: String,
        detail: String,
    },

    #[error("{file}:{line}: duplicate {type_name} resource \"{name}\"")]
    Duplicate {
        file: String,
        line: u32,
        type_name: String,
        name: String,
    },

    #[error("{file}: {type_name} \"{name}\" is missing required directive \"{item}\"")]
    MissingRequired {
        file: String,
        type_name: String,
        name: String,
        item: String,
    },

    #[error("{file}: {type_name} \"{name}\": reference to unknown {target_type} \"{target}\"")]
    Unresolved {
        file: String,
        type_name: String,
        name: String,
        target_type: String,
        target: String,
    },

    #[error("cannot read {file}: {detail}")]
    Io { file: String, detail: String },
}

/// Parse a configuration file against the daemon's tables.
pub fn parse_file(path: &std::path::Path, tables: &[ResourceTable]) -> Result<Config, ParseError> {
    let file = path.display().to_string();
    let bytes = std::fs::read(path).map_err(|e| ParseError::Io {
        file: file.clone(),
        detail: e.to_string(),
    })?;
    parse_bytes(&bytes, tables, &file)
}

/// Parse configuration text (tests and embedded defaults).
pub fn parse_string(src: &str, tables: &[ResourceTable]) -> Result<Config, ParseError> {
    parse_bytes(src.as_bytes(), tables, "<string>")
}

fn parse_bytes(bytes: &[u8], tables: &[ResourceTable], file: &str) -> Result<Config, ParseError> {
    let lex = Lexer::from_bytes(bytes).map_err(|source| ParseError::Lex {
        file: file.to_string(),
        line: 1,
        source,
    })?;
    let mut p = Parser {
        toks: TokStream { lex, peeked: None },
        tables,
        file: file.to_string(),
        config: Config::default(),
    };
    p.run_pass1()?;
    p.run_pass2()?;
    Ok(p.config)
}

struct TokStream<'a> {
    lex: Lexer<'a>,
    peeked: Option<Tok>,
}

impl TokStream<'_> {
    fn next(&mut self) -> Result<Tok, LexError> {
        match self.peeked.take() {
            Some(t) => Ok(t),
            None => self.lex.next_token(),
        }
    }

    fn push_back(&mut self, tok: Tok) {
        self.peeked = Some(tok);
    }

    fn line(&self) -> u32 {
        self.lex.line()
    }
}

struct Parser<'a> {
    toks: TokStream<'a>,
    tables: &'a [ResourceTable],
    file: String,
    config: Config,
}

impl Parser<'_> {
    fn lex_err(&self, source: LexError) -> ParseError {
        ParseError::Lex {
            file: self.file.clone(),
            line: self.toks.line(),
            source,
        }
    }

    fn syntax(&self, detail: impl Into<String>) -> ParseError {
        ParseError::Syntax {
            file: self.file.clone(),
            line: self.toks.line(),
            detail: detail.into(),
        }
    }

    fn bad_value(&self, item: &str, detail: impl Into<String>) -> ParseError {
        ParseError::BadValue {
            file: self.file.clone(),
            line: self.toks.line(),
            item: item.to_string(),
            detail: detail.into(),
        }
    }

    fn next(&mut self) -> Result<Tok, ParseError> {
        self.toks.next().map_err(|e| self.lex_err(e))
    }

    fn next_skipping_eols(&mut self) -> Result<Tok, ParseError> {
        loop {
            let tok = self.next()?;
            if tok != Tok::Eol {
                return Ok(tok);
            }
        }
    }

    // ---- pass 1 ----

    fn run_pass1(&mut self) -> Result<(), ParseError> {
        loop {
            match self.next_skipping_eols()? {
                Tok::Eof => return Ok(()),
                Tok::Ident(type_name) => self.parse_resource(&type_name)?,
                other => return Err(self.syntax(format!("expected resource type, got {:?}", other))),
            }
        }
    }

    fn parse_resource(&mut self, raw_type: &str) -> Result<(), ParseError> {
        let folded = fold_name(raw_type);
        let table = self
            .tables
            .iter()
            .find(|t| t.type_name == folded)
            .ok_or_else(|| ParseError::UnknownResourceType {
                file: self.file.clone(),
                line: self.toks.line(),
                type_name: raw_type.to_string(),
            })?;

        match self.next_skipping_eols()? {
            Tok::Bob => {}
            other => return Err(self.syntax(format!("expected '{{', got {:?}", other))),
        }

        let mut res = Resource {
            type_name: table.type_name.to_string(),
            name: String::new(),
            values: IndexMap::new(),
            bits: 0,
            dests: MsgsSpec::default(),
        };

        loop {
            match self.next_skipping_eols()? {
                Tok::Eob => break,
                Tok::Ident(first) => self.parse_directive(table, &mut res, first)?,
                Tok::Eof => return Err(self.syntax("unexpected end of file inside resource")),
                other => return Err(self.syntax(format!("expected directive, got {:?}", other))),
            }
        }

        self.finish_resource(table, res)
    }

    /// A directive name may span several bare words (`Maximum Volume
    /// Size`); collect up to the `=`.
    fn parse_directive(
        &mut self,
        table: &ResourceTable,
        res: &mut Resource,
        first: String,
    ) -> Result<(), ParseError> {
        let mut name = first;
        loop {
            match self.next()? {
                Tok::Equals => break,
                Tok::Ident(more) | Tok::Number(more) => {
                    name.push(' ');
                    name.push_str(&more);
                }
                other => {
                    return Err(self.syntax(format!(
                        "expected '=' after \"{}\", got {:?}",
                        name, other
                    )))
                }
            }
        }

        let folded = fold_name(&name);
        let item = table
            .items
            .iter()
            .find(|i| i.name == folded)
            .ok_or_else(|| ParseError::UnknownItem {
                file: self.file.clone(),
                line: self.toks.line(),
                item: name.clone(),
                type_name: table.type_name.to_string(),
            })?;

        self.store_item(table, res, item, &name)
    }

    fn store_item(
        &mut self,
        table: &ResourceTable,
        res: &mut Resource,
        item: &ItemDef,
        display: &str,
    ) -> Result<(), ParseError> {
        match item.kind {
            ItemKind::Name => {
                let v = self.one_token_value(display)?;
                res.name = v.clone();
                res.values.insert(item.name.to_string(), Value::Str(v));
                self.scan_to_eol()?;
            }
            ItemKind::Str => {
                let v = self.one_token_value(display)?;
                res.values.insert(item.name.to_string(), Value::Str(v));
                self.scan_to_eol()?;
            }
            ItemKind::Dir => {
                let v = self.one_token_value(display)?;
                let expanded = expand_directory(&v);
                res.values
                    .insert(item.name.to_string(), Value::Str(expanded));
                self.scan_to_eol()?;
            }
            ItemKind::Password => {
                let v = self.one_token_value(display)?;
                let digest = format!("{:x}", md5::compute(v.as_bytes()));
                res.values
                    .insert(item.name.to_string(), Value::Password(digest));
                self.scan_to_eol()?;
            }
            ItemKind::Int32 | ItemKind::Int64 | ItemKind::PInt32 => {
                let phrase = self.phrase_to_eol(display)?;
                let n: i64 = phrase
                    .trim()
                    .parse()
                    .map_err(|_| self.bad_value(display, format!("expected integer, got \"{}\"", phrase)))?;
                if item.kind == ItemKind::PInt32 && n < 0 {
                    return Err(self.bad_value(display, "expected a positive integer"));
                }
                if matches!(item.kind, ItemKind::Int32 | ItemKind::PInt32)
                    && (n > i64::from(u32::MAX) || n < i64::from(i32::MIN))
                {
                    return Err(self.bad_value(display, "integer out of 32-bit range"));
                }
                res.values.insert(item.name.to_string(), Value::Int(n));
            }
            ItemKind::Size32 | ItemKind::Size64 => {
                let phrase = self.phrase_to_eol(display)?;
                let n = value::parse_size(&phrase)
                    .ok_or_else(|| self.bad_value(display, format!("expected a size, got \"{}\"", phrase)))?;
                if item.kind == ItemKind::Size32 && n > u64::from(u32::MAX) {
                    return Err(self.bad_value(display, "size exceeds 32 bits"));
                }
                res.values.insert(item.name.to_string(), Value::Size(n));
            }
            ItemKind::Speed => {
                let phrase = self.phrase_to_eol(display)?;
                let n = value::parse_speed(&phrase)
                    .ok_or_else(|| self.bad_value(display, format!("expected a speed, got \"{}\"", phrase)))?;
                res.values.insert(item.name.to_string(), Value::Speed(n));
            }
            ItemKind::Time => {
                let phrase = self.phrase_to_eol(display)?;
                let n = value::parse_time(&phrase)
                    .ok_or_else(|| self.bad_value(display, format!("expected a duration, got \"{}\"", phrase)))?;
                res.values.insert(item.name.to_string(), Value::Time(n));
            }
            ItemKind::Bool => {
                let v = self.one_token_value(display)?;
                let b = value::parse_bool(&v)
                    .ok_or_else(|| self.bad_value(display, format!("expected yes/no, got \"{}\"", v)))?;
                res.values.insert(item.name.to_string(), Value::Bool(b));
                self.scan_to_eol()?;
            }
            ItemKind::Bit(mask) => {
                let v = self.one_token_value(display)?;
                let b = value::parse_bool(&v)
                    .ok_or_else(|| self.bad_value(display, format!("expected yes/no, got \"{}\"", v)))?;
                if b {
                    res.bits |= mask;
                } else {
                    res.bits &= !mask;
                }
                self.scan_to_eol()?;
            }
            ItemKind::Addresses => {
                let eps = addrs::parse_addresses(&mut self.toks.lex, table.default_port)
                    .map_err(|e| self.addrs_err(display, e))?;
                res.values.insert(
                    item.name.to_string(),
                    Value::Addresses(eps.iter().map(|e| e.addr.to_string()).collect()),
                );
                self.scan_to_eol()?;
            }
            ItemKind::Res(_) => {
                let v = self.one_token_value(display)?;
                res.values.insert(item.name.to_string(), Value::ResRef(v));
                self.scan_to_eol()?;
            }
            ItemKind::ResList(_) | ItemKind::StrList => {
                let mut names = Vec::new();
                loop {
                    match self.next()? {
                        Tok::Eol | Tok::Eof => break,
                        Tok::Eob => {
                            self.toks.push_back(Tok::Eob);
                            break;
                        }
                        Tok::Comma => {}
                        Tok::Ident(v) | Tok::Quoted(v) | Tok::Number(v) => names.push(v),
                        other => {
                            return Err(self.syntax(format!("bad reference list token {:?}", other)))
                        }
                    }
                }
                let value = if item.kind == ItemKind::StrList {
                    Value::StrList(names)
                } else {
                    Value::ResList(names)
                };
                res.values.insert(item.name.to_string(), value);
            }
            ItemKind::Dest(code) => {
                let (dest, hit_eob) = msgs::parse_dest(&mut self.toks.lex, code)
                    .map_err(|e| self.msgs_err(display, e))?;
                res.dests.push(dest);
                if hit_eob {
                    self.toks.push_back(Tok::Eob);
                }
            }
            ItemKind::Label => {
                let v = self.one_token_value(display)?;
                let label = LabelFormat::from_token(&v)
                    .ok_or_else(|| self.bad_value(display, format!("unknown label format \"{}\"", v)))?;
                res.values.insert(item.name.to_string(), Value::Label(label));
                self.scan_to_eol()?;
            }
        }
        Ok(())
    }

    fn addrs_err(&self, item: &str, e: AddrsError) -> ParseError {
        self.bad_value(item, e.to_string())
    }

    fn msgs_err(&self, item: &str, e: MsgsError) -> ParseError {
        self.bad_value(item, e.to_string())
    }

    fn one_token_value(&mut self, item: &str) -> Result<String, ParseError> {
        match self.next()? {
            Tok::Ident(v) | Tok::Quoted(v) | Tok::Number(v) => Ok(v),
            other => Err(self.bad_value(item, format!("expected a value, got {:?}", other))),
        }
    }

    /// Join value tokens up to end of line (`10 G`, `1 day 2 hours`).
    fn phrase_to_eol(&mut self, item: &str) -> Result<String, ParseError> {
        let mut phrase = String::new();
        loop {
            match self.next()? {
                Tok::Eol | Tok::Eof => break,
                Tok::Eob => {
                    self.toks.push_back(Tok::Eob);
                    break;
                }
                Tok::Ident(v) | Tok::Quoted(v) | Tok::Number(v) => {
                    if !phrase.is_empty() {
                        phrase.push(' ');
                    }
                    phrase.push_str(&v);
                }
                other => return Err(self.bad_value(item, format!("unexpected {:?}", other))),
            }
        }
        if phrase.is_empty() {
            return Err(self.bad_value(item, "missing value"));
        }
        Ok(phrase)
    }

    /// Ignore anything else on the line, the way the original scanner
    /// does after a completed directive.
    fn scan_to_eol(&mut self) -> Result<(), ParseError> {
        loop {
            match self.next()? {
                Tok::Eol | Tok::Eof => return Ok(()),
                Tok::Eob => {
                    self.toks.push_back(Tok::Eob);
                    return Ok(());
                }
                _ => {}
            }
        }
    }

    fn finish_resource(&mut self, table: &ResourceTable, mut res: Resource) -> Result<(), ParseError> {
        // defaults, then required checks
        for item in table.items {
            if res.values.contains_key(item.name) {
                continue;
            }
            if item.flags & ITEM_DEFAULT != 0 {
                if let Some(default) = item.default {
                    let v = default_value(item, default).map_err(|detail| ParseError::BadValue {
                        file: self.file.clone(),
                        line: self.toks.line(),
                        item: item.name.to_string(),
                        detail,
                    })?;
                    res.values.insert(item.name.to_string(), v);
                }
                continue;
            }
            if item.flags & ITEM_REQUIRED != 0 {
                return Err(ParseError::MissingRequired {
                    file: self.file.clone(),
                    type_name: res.type_name,
                    name: res.name,
                    item: item.name.to_string(),
                });
            }
        }

        if res.name.is_empty() {
            return Err(ParseError::MissingRequired {
                file: self.file.clone(),
                type_name: res.type_name,
                name: "<unnamed>".to_string(),
                item: "name".to_string(),
            });
        }

        res.dests.name = res.name.clone();
        debug!(type_name = %res.type_name, name = %res.name, "parsed resource");

        let by_name = self
            .config
            .resources
            .entry(res.type_name.clone())
            .or_default();
        if by_name.contains_key(&res.name) {
            return Err(ParseError::Duplicate {
                file: self.file.clone(),
                line: self.toks.line(),
                type_name: res.type_name,
                name: res.name,
            });
        }
        by_name.insert(res.name.clone(), res);
        Ok(())
    }

    // ---- pass 2 ----

    fn run_pass2(&mut self) -> Result<(), ParseError> {
        let mut missing: Option<ParseError> = None;
        for (_, by_name) in &self.config.resources {
            for (_, res) in by_name {
                let table = match self.tables.iter().find(|t| t.type_name == res.type_name) {
                    Some(t) => t,
                    None => continue,
                };
                for item in table.items {
                    let target_type = match item.kind {
                        ItemKind::Res(t) | ItemKind::ResList(t) => t,
                        _ => continue,
                    };
                    let targets: Vec<&str> = match res.values.get(item.name) {
                        Some(Value::ResRef(n)) => vec![n.as_str()],
                        Some(Value::ResList(ns)) => ns.iter().map(String::as_str).collect(),
                        _ => continue,
                    };
                    for target in targets {
                        if self.config.get(target_type, target).is_none() {
                            missing = Some(ParseError::Unresolved {
                                file: self.file.clone(),
                                type_name: res.type_name.clone(),
                                name: res.name.clone(),
                                target_type: target_type.to_string(),
                                target: target.to_string(),
                            });
                        }
                    }
                }
            }
        }
        match missing {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

fn default_value(item: &ItemDef, default: &str) -> Result<Value, String> {
    Ok(match item.kind {
        ItemKind::Name | ItemKind::Str | ItemKind::Dir => Value::Str(default.to_string()),
        ItemKind::Password => Value::Password(format!("{:x}", md5::compute(default.as_bytes()))),
        ItemKind::Int32 | ItemKind::Int64 | ItemKind::PInt32 => Value::Int(
            default
                .parse()
                .map_err(|_| format!("bad default integer \"{}\"", default))?,
        ),
        ItemKind::Size32 | ItemKind::Size64 => Value::Size(
            value::parse_size(default).ok_or_else(|| format!("bad default size \"{}\"", default))?,
        ),
        ItemKind::Speed => Value::Speed(
            value::parse_speed(default)
                .ok_or_else(|| format!("bad default speed \"{}\"", default))?,
        ),
        ItemKind::Time => Value::Time(
            value::parse_time(default)
                .ok_or_else(|| format!("bad default duration \"{}\"", default))?,
        ),
        ItemKind::Bool => Value::Bool(
            value::parse_bool(default).ok_or_else(|| format!("bad default bool \"{}\"", default))?,
        ),
        ItemKind::Label => Value::Label(
            LabelFormat::from_token(default)
                .ok_or_else(|| format!("bad default label \"{}\"", default))?,
        ),
        _ => return Err(format!("item \"{}\" cannot carry a default", item.name)),
    })
}

/// `$VAR` and leading `~` expansion for directory items, skipped when the
/// value is a program (`|…`).
fn expand_directory(raw: &str) -> String {
    if raw.starts_with('|') {
        return raw.to_string();
    }
    let mut out = String::with_capacity(raw.len());
    let with_home = if let Some(rest) = raw.strip_prefix('~') {
        match std::env::var("HOME") {
            Ok(home) => format!("{}{}", home, rest),
            Err(_) => raw.to_string(),
        }
    } else {
        raw.to_string()
    };

    let mut chars = with_home.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '$' {
            out.push(c);
            continue;
        }
        let mut var = String::new();
        while let Some(&n) = chars.peek() {
            if n.is_ascii_alphanumeric() || n == '_' {
                var.push(n);
                chars.next();
            } else {
                break;
            }
        }
        if var.is_empty() {
            out.push('$');
        } else {
            match std::env::var(&var) {
                Ok(v) => out.push_str(&v),
                Err(_) => {
                    out.push('$');
                    out.push_str(&var);
                }
            }
        }
    }
    out
}

#[cfg(test)]
#[path = "parser_tests.rs"]
mod tests;
