// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Message-destination grammar.
//!
//! Three shapes, keyed by the destination kind:
//!
//! ```text
//! console = all, !skipped                 # listed
//! mail = ops@x, oncall@x = error, fatal   # addressed
//! append = "/var/log/ndm.log" = all       # file-backed
//! ```
//!
//! Type tokens may carry a leading `!` to remove a type; `all` expands
//! to the union of every concrete type.

use thiserror::Error;

use ndm_core::{DestCode, DestSpec, MessageType, TypeSet};

use crate::lex::{LexError, Lexer, Tok};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MsgsError {
    #[error("lex error: {0}")]
    Lex(#[from] LexError),

    #[error("unknown message type \"{0}\"")]
    UnknownType(String),

    #[error("destination {0} needs a recipient before the type list")]
    MissingTarget(&'static str),

    #[error("destination {0} needs a file path before the type list")]
    MissingPath(&'static str),

    #[error("unexpected token in destination: {0:?}")]
    Unexpected(Tok),
}

/// Parse everything after `<code> =` up to (and consuming) the EOL.
/// Returns the destination plus whether the line was terminated by the
/// resource's closing brace (which the caller still has to handle).
pub fn parse_dest(lex: &mut Lexer<'_>, code: DestCode) -> Result<(DestSpec, bool), MsgsError> {
    let mut dest = DestSpec::new(code);

    if code.is_addressed() {
        parse_targets(lex, &mut dest)?;
        if dest.targets.is_empty() {
            return Err(MsgsError::MissingTarget(code.token()));
        }
    } else if code.is_file_backed() {
        match lex.next_token()? {
            Tok::Quoted(p) | Tok::Ident(p) => dest.targets.push(p),
            other => return Err(MsgsError::Unexpected(other)),
        }
        match lex.next_token()? {
            Tok::Equals => {}
            other => return Err(MsgsError::Unexpected(other)),
        }
    }

    let (types, hit_eob) = parse_type_list(lex)?;
    dest.types = types;
    Ok((dest, hit_eob))
}

/// Recipients up to the `=` that starts the type list.
fn parse_targets(lex: &mut Lexer<'_>, dest: &mut DestSpec) -> Result<(), MsgsError> {
    loop {
        match lex.next_token()? {
            Tok::Equals => return Ok(()),
            Tok::Comma => {}
            Tok::Ident(t) | Tok::Quoted(t) | Tok::Number(t) => dest.targets.push(t),
            other => return Err(MsgsError::Unexpected(other)),
        }
    }
}

/// Comma-separated type tokens up to EOL/EOF, or the closing brace of
/// the resource (reported to the caller).
fn parse_type_list(lex: &mut Lexer<'_>) -> Result<(TypeSet, bool), MsgsError> {
    let mut set = TypeSet::EMPTY;
    loop {
        match lex.next_token()? {
            Tok::Eol | Tok::Eof => return Ok((set, false)),
            Tok::Eob => return Ok((set, true)),
            Tok::Comma => {}
            Tok::Ident(tok) => apply_type_token(&mut set, &tok)?,
            other => return Err(MsgsError::Unexpected(other)),
        }
    }
}

pub(crate) fn apply_type_token(set: &mut TypeSet, tok: &str) -> Result<(), MsgsError> {
    let (remove, name) = match tok.strip_prefix('!') {
        Some(rest) => (true, rest),
        None => (false, tok),
    };
    if name.eq_ignore_ascii_case("all") {
        if remove {
            *set = TypeSet::EMPTY;
        } else {
            *set = set.union(TypeSet::all());
        }
        return Ok(());
    }
    let ty = MessageType::from_token(name).ok_or_else(|| MsgsError::UnknownType(name.into()))?;
    if remove {
        set.remove(ty);
    } else {
        set.insert(ty);
    }
    Ok(())
}

#[cfg(test)]
#[path = "msgs_tests.rs"]
mod tests;
