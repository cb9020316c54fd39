// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Address block parsing:
//!
//! ```text
//! Addresses = {
//!   ip   = { addr = 192.168.1.10; port = 9103 }
//!   ipv6 = { addr = ::1 }
//!   ip   = { addr = backup.example.com; port = ndmp }
//! }
//! ```
//!
//! `ip` resolves for both families, `ipv4`/`ipv6` narrow it. A missing
//! port falls back to the caller's default. The merged list is
//! de-duplicated in resolver order.

use thiserror::Error;

use ndm_net::{resolve_addresses, AddrError, Endpoint, Family};

use crate::lex::{LexError, Lexer, Tok};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AddrsError {
    #[error("lex error: {0}")]
    Lex(#[from] LexError),

    #[error("resolver: {0}")]
    Addr(#[from] AddrError),

    #[error("expected ip, ipv4 or ipv6, got \"{0}\"")]
    BadFamily(String),

    #[error("expected addr or port, got \"{0}\"")]
    BadKey(String),

    #[error("unexpected token in address block: {0:?}")]
    Unexpected(Tok),
}

/// Parse the block after `=`, resolving every entry.
pub fn parse_addresses(
    lex: &mut Lexer<'_>,
    default_port: &str,
) -> Result<Vec<Endpoint>, AddrsError> {
    expect(lex, Tok::Bob)?;
    let mut out: Vec<Endpoint> = Vec::new();

    loop {
        match skip_eols(lex)? {
            Tok::Eob => break,
            Tok::Ident(fam) => {
                let family = match fam.to_ascii_lowercase().as_str() {
                    "ip" => Family::Unspec,
                    "ipv4" => Family::V4,
                    "ipv6" => Family::V6,
                    _ => return Err(AddrsError::BadFamily(fam)),
                };
                let mut tok = lex.next_token()?;
                if tok == Tok::Equals {
                    tok = lex.next_token()?;
                }
                if tok != Tok::Bob {
                    return Err(AddrsError::Unexpected(tok));
                }
                let (host, port) = parse_entry(lex)?;
                let port = port.unwrap_or_else(|| default_port.to_string());
                for ep in resolve_addresses(host.as_deref(), family, &port)? {
                    if !out.iter().any(|e| e.addr == ep.addr) {
                        out.push(ep);
                    }
                }
            }
            other => return Err(AddrsError::Unexpected(other)),
        }
    }
    Ok(out)
}

/// Inside one `{ addr = …; port = … }` entry.
fn parse_entry(lex: &mut Lexer<'_>) -> Result<(Option<String>, Option<String>), AddrsError> {
    let mut host = None;
    let mut port = None;
    loop {
        match skip_eols(lex)? {
            Tok::Eob => return Ok((host, port)),
            Tok::Ident(key) => {
                expect(lex, Tok::Equals)?;
                let value = match lex.next_token()? {
                    Tok::Ident(v) | Tok::Number(v) | Tok::Quoted(v) => v,
                    other => return Err(AddrsError::Unexpected(other)),
                };
                match key.to_ascii_lowercase().as_str() {
                    "addr" => host = Some(value),
                    "port" => port = Some(value),
                    _ => return Err(AddrsError::BadKey(key)),
                }
            }
            other => return Err(AddrsError::Unexpected(other)),
        }
    }
}

fn skip_eols(lex: &mut Lexer<'_>) -> Result<Tok, AddrsError> {
    loop {
        let tok = lex.next_token()?;
        if tok != Tok::Eol {
            return Ok(tok);
        }
    }
}

fn expect(lex: &mut Lexer<'_>, want: Tok) -> Result<(), AddrsError> {
    let got = skip_eols(lex)?;
    if got == want {
        Ok(())
    } else {
        Err(AddrsError::Unexpected(got))
    }
}

#[cfg(test)]
#[path = "addrs_tests.rs"]
mod tests;
