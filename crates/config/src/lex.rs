// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Lexer for the resource configuration format.
//!
//! Line-oriented: `#` comments run to end of line, `;` and newline both
//! terminate a statement (both surface as [`Tok::Eol`]). A UTF-8 BOM at
//! the start of the stream is skipped; a UTF-16 BOM is fatal since the
//! rest of the file would be unreadable anyway.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Tok {
    Eof,
    Eol,
    /// `{`
    Bob,
    /// `}`
    Eob,
    Equals,
    Comma,
    /// Bare word (identifier or name position decided by the parser).
    Ident(String),
    /// All-digit token.
    Number(String),
    /// Double-quoted string, escapes already applied.
    Quoted(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LexError {
    #[error("UTF-16 byte order mark; config files must be UTF-8")]
    Utf16Bom,

    #[error("unterminated quoted string starting at line {0}")]
    UnterminatedString(u32),

    #[error("invalid byte {byte:#04x} at line {line}")]
    InvalidByte { byte: u8, line: u32 },
}

pub struct Lexer<'a> {
    src: &'a [u8],
    pos: usize,
    line: u32,
}

impl<'a> Lexer<'a> {
    pub fn new(src: &'a str) -> Result<Self, LexError> {
        Self::from_bytes(src.as_bytes())
    }

    /// Raw-byte entry point: config files come off disk untyped, and the
    /// UTF-16 BOM check has to see the original bytes.
    pub fn from_bytes(bytes: &'a [u8]) -> Result<Self, LexError> {
        let mut pos = 0;
        if bytes.starts_with(&[0xEF, 0xBB, 0xBF]) {
            pos = 3;
        } else if bytes.starts_with(&[0xFF, 0xFE]) || bytes.starts_with(&[0xFE, 0xFF]) {
            return Err(LexError::Utf16Bom);
        }
        Ok(Self {
            src: bytes,
            pos,
            line: 1,
        })
    }

    /// Current line, for error reporting.
    pub fn line(&self) -> u32 {
        self.line
    }

    fn peek(&self) -> Option<u8> {
        self.src.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let c = self.peek()?;
        self.pos += 1;
        if c == b'\n' {
            self.line += 1;
        }
        Some(c)
    }

    /// Next token. `Eof` repeats forever at the end.
    pub fn next_token(&mut self) -> Result<Tok, LexError> {
        loop {
            let Some(c) = self.peek() else {
                return Ok(Tok::Eof);
            };
            match c {
                b' ' | b'\t' | b'\r' => {
                    self.bump();
                }
                b'#' => {
                    while let Some(c) = self.peek() {
                        if c == b'\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                b'\n' | b';' => {
                    self.bump();
                    return Ok(Tok::Eol);
                }
                b'{' => {
                    self.bump();
                    return Ok(Tok::Bob);
                }
                b'}' => {
                    self.bump();
                    return Ok(Tok::Eob);
                }
                b'=' => {
                    self.bump();
                    return Ok(Tok::Equals);
                }
                b',' => {
                    self.bump();
                    return Ok(Tok::Comma);
                }
                b'"' => return self.quoted(),
                _ if is_word_byte(c) => return Ok(self.word()),
                _ => {
                    return Err(LexError::InvalidByte {
                        byte: c,
                        line: self.line,
                    })
                }
            }
        }
    }

    fn quoted(&mut self) -> Result<Tok, LexError> {
        let start_line = self.line;
        self.bump(); // opening quote
        let mut out = String::new();
        loop {
            match self.bump() {
                None | Some(b'\n') => return Err(LexError::UnterminatedString(start_line)),
                Some(b'"') => return Ok(Tok::Quoted(out)),
                Some(b'\\') => match self.bump() {
                    Some(b'n') => out.push('\n'),
                    Some(b't') => out.push('\t'),
                    Some(b'"') => out.push('"'),
                    Some(b'\\') => out.push('\\'),
                    Some(other) => {
                        out.push('\\');
                        out.push(other as char);
                    }
                    None => return Err(LexError::UnterminatedString(start_line)),
                },
                Some(other) => out.push(other as char),
            }
        }
    }

    fn word(&mut self) -> Tok {
        let start = self.pos;
        while self.peek().is_some_and(is_word_byte) {
            self.pos += 1;
        }
        let text = String::from_utf8_lossy(&self.src[start..self.pos]).into_owned();
        if text.bytes().all(|b| b.is_ascii_digit()) {
            Tok::Number(text)
        } else {
            Tok::Ident(text)
        }
    }
}

fn is_word_byte(c: u8) -> bool {
    // bare words: everything printable except the structural characters
    c > b' '
        && c != b'"'
        && c != b'#'
        && c != b'{'
        && c != b'}'
        && c != b'='
        && c != b','
        && c != b';'
        && c != 0x7F
}

#[cfg(test)]
#[path = "lex_tests.rs"]
mod tests;
