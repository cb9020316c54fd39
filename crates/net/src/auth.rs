// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! CRAM-MD5 mutual authentication over an established BSOCK.
//!
//! The challenger sends `auth cram-md5 <chal> ssl=<need>` (keyword
//! `cram-md5c` for the compatible-base64 variant), the responder returns
//! the base64 of HMAC-MD5(key=password, msg=chal), and the challenger
//! accepts either base64 flavor. The `ssl=` fields cross-announce TLS
//! need; a side requiring TLS against a side announcing none fails the
//! handshake outright. Failures cost the peer a penalty sleep.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rand::Rng;
use thiserror::Error;
use tracing::debug;

use ndm_core::base64::bin_to_base64;

use crate::bsock::{BSock, RecvStatus};

/// Penalty slept on an authentication failure before reporting it.
pub const AUTH_PENALTY: Duration = Duration::from_secs(5);

/// Timer for the Hello exchange on the director-connect path.
pub const HELLO_TIMEOUT: Duration = Duration::from_secs(15);

/// TLS requirement announced in the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TlsNeed {
    None = 0,
    Ok = 1,
    Required = 2,
}

impl TlsNeed {
    pub fn code(self) -> i32 {
        self as i32
    }

    pub fn from_code(code: i32) -> TlsNeed {
        match code {
            1 => TlsNeed::Ok,
            2 => TlsNeed::Required,
            _ => TlsNeed::None,
        }
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("socket error during authentication")]
    Socket,

    #[error("malformed challenge: {0}")]
    BadChallenge(String),

    #[error("authorization failed")]
    Rejected,

    #[error("TLS requirement mismatch: local {local:?}, remote {remote:?}")]
    TlsNeedMismatch { local: TlsNeed, remote: TlsNeed },

    #[error("unexpected hello: {0}")]
    BadHello(String),
}

/// The shared CRAM key for a configured password: both sides key the
/// HMAC with the MD5 hex digest the config layer stores, never the
/// clear text.
pub fn hashed_password(plain: &str) -> String {
    format!("{:x}", md5::compute(plain.as_bytes()))
}

/// HMAC-MD5 (RFC 2104 with MD5 as the hash).
pub fn hmac_md5(text: &[u8], key: &[u8]) -> [u8; 16] {
    let mut k = [0u8; 64];
    if key.len() > 64 {
        k[..16].copy_from_slice(&md5::compute(key).0);
    } else {
        k[..key.len()].copy_from_slice(key);
    }
    let mut inner = Vec::with_capacity(64 + text.len());
    let mut outer = Vec::with_capacity(64 + 16);
    for b in k {
        inner.push(b ^ 0x36);
    }
    inner.extend_from_slice(text);
    let inner_digest = md5::compute(&inner);
    for b in k {
        outer.push(b ^ 0x5C);
    }
    outer.extend_from_slice(&inner_digest.0);
    md5::compute(&outer).0
}

/// Both roles of the handshake, parameterized by the shared password.
#[derive(Clone)]
pub struct Authenticator {
    /// Shared secret (already hashed upstream when it came from config).
    pub password: String,
    pub local_need: TlsNeed,
    /// Send the `cram-md5c` keyword and standards base64.
    pub compatible: bool,
    /// Host tag baked into challenges.
    pub my_name: String,
    /// Failure sleep; tests shrink it.
    pub penalty: Duration,
}

impl Authenticator {
    pub fn new(password: &str, my_name: &str, local_need: TlsNeed) -> Self {
        Self {
            password: password.to_string(),
            local_need,
            compatible: true,
            my_name: my_name.to_string(),
            penalty: AUTH_PENALTY,
        }
    }

    fn build_challenge(&self) -> String {
        let mut rng = rand::rng();
        let u1: u32 = rng.random();
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as u32)
            .unwrap_or(0);
        let u2: u32 = rng.random::<u32>() ^ now;
        format!("<{}.{}@{}>", u1, u2, self.my_name)
    }

    /// Challenger role: issue the challenge, verify the response, reply
    /// with the verdict. The remote TLS need arrives with the peer's own
    /// counter-challenge, not here.
    pub fn challenge(&self, bs: &mut BSock) -> Result<(), AuthError> {
        let chal = self.build_challenge();
        let keyword = if self.compatible {
            "auth cram-md5c"
        } else {
            "auth cram-md5"
        };
        let line = format!("{} {} ssl={}\n", keyword, chal, self.local_need.code());
        if !bs.send_str(&line) {
            return Err(AuthError::Socket);
        }

        if !matches!(bs.recv(), RecvStatus::Data(_)) {
            std::thread::sleep(self.penalty);
            return Err(AuthError::Socket);
        }
        let got = bs.msg_str().trim_end_matches(['\n', '\0']).to_string();

        let digest = hmac_md5(chal.as_bytes(), self.password.as_bytes());
        let want_compat = bin_to_base64(&digest, true);
        let want_legacy = bin_to_base64(&digest, false);
        let ok = got == want_compat || got == want_legacy;

        if ok {
            if !bs.send_str("1000 OK auth\n") {
                return Err(AuthError::Socket);
            }
            Ok(())
        } else {
            debug!(peer = bs.who(), "cram-md5 response mismatch");
            let _ = bs.send_str("1999 Authorization failed.\n");
            std::thread::sleep(self.penalty);
            Err(AuthError::Rejected)
        }
    }

    /// Responder role: read the challenge, answer it, read the verdict.
    /// Returns the remote TLS need.
    pub fn respond(&self, bs: &mut BSock) -> Result<TlsNeed, AuthError> {
        if !matches!(bs.recv(), RecvStatus::Data(_)) {
            std::thread::sleep(self.penalty);
            return Err(AuthError::Socket);
        }
        let line = bs.msg_str().trim_end_matches(['\n', '\0']).to_string();

        let (chal, remote_need, compatible) = parse_challenge(&line).ok_or_else(|| {
            let _ = bs.send_str("1999 Authorization failed.\n");
            std::thread::sleep(self.penalty);
            AuthError::BadChallenge(line.clone())
        })?;

        self.check_needs(remote_need)?;

        let digest = hmac_md5(chal.as_bytes(), self.password.as_bytes());
        let reply = bin_to_base64(&digest, compatible);
        if !bs.send_str(&reply) {
            return Err(AuthError::Socket);
        }

        if !matches!(bs.recv(), RecvStatus::Data(_)) {
            std::thread::sleep(self.penalty);
            return Err(AuthError::Socket);
        }
        if bs.msg_str().starts_with("1000 OK auth") {
            Ok(remote_need)
        } else {
            std::thread::sleep(self.penalty);
            Err(AuthError::Rejected)
        }
    }

    /// Cross-check the announced needs: one side requiring TLS against a
    /// side announcing none is a hard failure.
    pub fn check_needs(&self, remote: TlsNeed) -> Result<(), AuthError> {
        let local = self.local_need;
        let clash = (local == TlsNeed::Required && remote == TlsNeed::None)
            || (remote == TlsNeed::Required && local == TlsNeed::None);
        if clash {
            Err(AuthError::TlsNeedMismatch { local, remote })
        } else {
            Ok(())
        }
    }

    /// Mutual authentication, inbound side: challenge first, then answer
    /// the peer's counter-challenge.
    pub fn authenticate_inbound(&self, bs: &mut BSock) -> Result<TlsNeed, AuthError> {
        self.challenge(bs)?;
        self.respond(bs)
    }

    /// Mutual authentication, outbound side: answer first, then issue our
    /// own challenge.
    pub fn authenticate_outbound(&self, bs: &mut BSock) -> Result<TlsNeed, AuthError> {
        let remote = self.respond(bs)?;
        self.challenge(bs)?;
        Ok(remote)
    }
}

fn parse_challenge(line: &str) -> Option<(String, TlsNeed, bool)> {
    let rest = line.strip_prefix("auth ")?;
    let (compatible, rest) = if let Some(r) = rest.strip_prefix("cram-md5c ") {
        (true, r)
    } else if let Some(r) = rest.strip_prefix("cram-md5 ") {
        (false, r)
    } else {
        return None;
    };
    let mut parts = rest.split_whitespace();
    let chal = parts.next()?.to_string();
    let need = match parts.next().and_then(|t| t.strip_prefix("ssl=")) {
        Some(n) => TlsNeed::from_code(n.parse().ok()?),
        None => TlsNeed::None,
    };
    Some((chal, need, compatible))
}

/// Client side of the director-connect path: `Hello <name> calling`,
/// mutual CRAM-MD5, then the `1000 OK:` banner, all under the hello
/// timer.
pub fn hello_client(bs: &mut BSock, auth: &Authenticator) -> Result<TlsNeed, AuthError> {
    let saved = bs.timeout;
    bs.timeout = HELLO_TIMEOUT;
    let result = (|| {
        if !bs.send_str(&format!("Hello {} calling\n", auth.my_name)) {
            return Err(AuthError::Socket);
        }
        let remote = auth.authenticate_outbound(bs)?;
        if !matches!(bs.recv(), RecvStatus::Data(_)) {
            return Err(AuthError::Socket);
        }
        let banner = bs.msg_str().to_string();
        if banner.starts_with("1000 OK:") {
            Ok(remote)
        } else {
            Err(AuthError::BadHello(banner))
        }
    })();
    bs.timeout = saved;
    result
}

/// Server side: read the Hello, run mutual CRAM-MD5, send the banner.
/// Returns the announced peer name and its TLS need.
pub fn hello_server(
    bs: &mut BSock,
    auth: &Authenticator,
) -> Result<(String, TlsNeed), AuthError> {
    let saved = bs.timeout;
    bs.timeout = HELLO_TIMEOUT;
    let result = (|| {
        if !matches!(bs.recv(), RecvStatus::Data(_)) {
            return Err(AuthError::Socket);
        }
        let hello = bs.msg_str().trim_end_matches(['\n', '\0']).to_string();
        let peer = hello
            .strip_prefix("Hello ")
            .and_then(|r| r.strip_suffix(" calling"))
            .ok_or_else(|| AuthError::BadHello(hello.clone()))?
            .to_string();

        let remote = auth.authenticate_inbound(bs)?;
        if !bs.send_str(&format!("1000 OK: {}\n", auth.my_name)) {
            return Err(AuthError::Socket);
        }
        Ok((peer, remote))
    })();
    bs.timeout = saved;
    result
}

#[cfg(test)]
#[path = "auth_tests.rs"]
mod tests;
