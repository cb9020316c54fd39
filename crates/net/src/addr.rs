// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Dual-stack address resolution.
//!
//! Turns a host + family + port specification into an ordered,
//! de-duplicated endpoint list the connect and bind paths walk in order.
//! An empty host means the wildcard address for the requested family (or
//! both). Ports are decimal or `/etc/services` names.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, ToSocketAddrs};
use std::str::FromStr;

use thiserror::Error;

/// Requested address family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Family {
    V4,
    V6,
    Unspec,
}

/// How the config layer classified an address entry; used when merging
/// directive-level entries over defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddrTag {
    Default,
    Single,
    SinglePort,
    SingleAddr,
    Multiple,
}

/// One resolved endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Endpoint {
    pub addr: SocketAddr,
    pub tag: AddrTag,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AddrError {
    #[error("cannot resolve port or service \"{0}\"")]
    BadPort(String),

    #[error("cannot resolve hostname \"{host}\": {detail}")]
    Unresolvable { host: String, detail: String },

    #[error("address family of \"{0}\" not requested")]
    WrongFamily(String),
}

/// Parse a port spec: a decimal in (0, 65535), else an `/etc/services`
/// tcp service name.
pub fn resolve_port(spec: &str) -> Result<u16, AddrError> {
    if spec.chars().all(|c| c.is_ascii_digit()) && !spec.is_empty() {
        return match spec.parse::<u32>() {
            Ok(n) if n > 0 && n < 65536 => Ok(n as u16),
            _ => Err(AddrError::BadPort(spec.to_string())),
        };
    }
    service_port(spec).ok_or_else(|| AddrError::BadPort(spec.to_string()))
}

fn service_port(name: &str) -> Option<u16> {
    let body = std::fs::read_to_string("/etc/services").ok()?;
    for line in body.lines() {
        let line = line.split('#').next().unwrap_or("");
        let mut fields = line.split_whitespace();
        let svc = fields.next()?;
        let portproto = match fields.next() {
            Some(p) => p,
            None => continue,
        };
        let (port, proto) = portproto.split_once('/')?;
        if proto != "tcp" {
            continue;
        }
        if svc == name || fields.any(|alias| alias == name) {
            return port.parse().ok();
        }
    }
    None
}

fn matches_family(ip: &IpAddr, family: Family) -> bool {
    match family {
        Family::V4 => ip.is_ipv4(),
        Family::V6 => ip.is_ipv6(),
        Family::Unspec => true,
    }
}

fn push_unique(list: &mut Vec<Endpoint>, addr: SocketAddr, tag: AddrTag) {
    if !list.iter().any(|e| e.addr == addr) {
        list.push(Endpoint { addr, tag });
    }
}

/// Resolve `host` (wildcard when empty/absent) at `port_spec` for the
/// requested family. The result is ordered, de-duplicated on (family,
/// sockaddr), and never partial: any failure returns the error alone.
pub fn resolve_addresses(
    host: Option<&str>,
    family: Family,
    port_spec: &str,
) -> Result<Vec<Endpoint>, AddrError> {
    let port = resolve_port(port_spec)?;
    let mut out = Vec::new();

    let host = host.unwrap_or("").trim();
    if host.is_empty() {
        if matches!(family, Family::V4 | Family::Unspec) {
            push_unique(
                &mut out,
                SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port),
                AddrTag::Multiple,
            );
        }
        if matches!(family, Family::V6 | Family::Unspec) {
            push_unique(
                &mut out,
                SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), port),
                AddrTag::Multiple,
            );
        }
        return Ok(out);
    }

    // literal addresses first, then the resolver
    if let Ok(v4) = Ipv4Addr::from_str(host) {
        if !matches_family(&IpAddr::V4(v4), family) {
            return Err(AddrError::WrongFamily(host.to_string()));
        }
        push_unique(
            &mut out,
            SocketAddr::new(IpAddr::V4(v4), port),
            AddrTag::Multiple,
        );
        return Ok(out);
    }
    let bare = host.trim_start_matches('[').trim_end_matches(']');
    if let Ok(v6) = Ipv6Addr::from_str(bare) {
        if !matches_family(&IpAddr::V6(v6), family) {
            return Err(AddrError::WrongFamily(host.to_string()));
        }
        push_unique(
            &mut out,
            SocketAddr::new(IpAddr::V6(v6), port),
            AddrTag::Multiple,
        );
        return Ok(out);
    }

    let resolved = (host, port)
        .to_socket_addrs()
        .map_err(|e| AddrError::Unresolvable {
            host: host.to_string(),
            detail: e.to_string(),
        })?;
    for sa in resolved {
        if matches_family(&sa.ip(), family) {
            push_unique(&mut out, sa, AddrTag::Multiple);
        }
    }
    if out.is_empty() {
        return Err(AddrError::Unresolvable {
            host: host.to_string(),
            detail: "no addresses for requested family".to_string(),
        });
    }
    Ok(out)
}

#[cfg(test)]
#[path = "addr_tests.rs"]
mod tests;
