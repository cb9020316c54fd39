// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[parameterized(
    min = { "1", 1 },
    common = { "9103", 9103 },
    max = { "65535", 65535 },
)]
fn decimal_ports(spec: &str, expect: u16) {
    assert_eq!(resolve_port(spec).unwrap(), expect);
}

#[parameterized(
    zero = { "0" },
    too_big = { "65536" },
    junk = { "no-such-service-xyzzy" },
    empty = { "" },
)]
fn bad_ports(spec: &str) {
    assert!(matches!(resolve_port(spec), Err(AddrError::BadPort(_))));
}

#[test]
fn wildcard_unspec_returns_both_families() {
    let eps = resolve_addresses(None, Family::Unspec, "9103").unwrap();
    assert_eq!(eps.len(), 2);
    assert!(eps[0].addr.is_ipv4());
    assert_eq!(eps[0].addr.port(), 9103);
    assert!(eps[1].addr.is_ipv6());
}

#[test]
fn wildcard_v6_only() {
    let eps = resolve_addresses(Some(""), Family::V6, "9103").unwrap();
    assert_eq!(eps.len(), 1);
    assert!(eps[0].addr.is_ipv6());
}

#[test]
fn literal_v4() {
    let eps = resolve_addresses(Some("192.168.1.10"), Family::Unspec, "9102").unwrap();
    assert_eq!(eps.len(), 1);
    assert_eq!(eps[0].addr.to_string(), "192.168.1.10:9102");
    assert_eq!(eps[0].tag, AddrTag::Multiple);
}

#[test]
fn literal_v6_with_and_without_brackets() {
    for host in ["::1", "[::1]"] {
        let eps = resolve_addresses(Some(host), Family::Unspec, "9102").unwrap();
        assert_eq!(eps.len(), 1);
        assert!(eps[0].addr.is_ipv6());
    }
}

#[test]
fn literal_rejected_when_family_mismatches() {
    let err = resolve_addresses(Some("127.0.0.1"), Family::V6, "9102").unwrap_err();
    assert!(matches!(err, AddrError::WrongFamily(_)));
}

#[test]
fn localhost_resolves_and_dedupes() {
    let eps = resolve_addresses(Some("localhost"), Family::Unspec, "9101").unwrap();
    assert!(!eps.is_empty());
    for (i, a) in eps.iter().enumerate() {
        for b in &eps[i + 1..] {
            assert_ne!(a.addr, b.addr, "duplicate endpoint survived");
        }
    }
}

#[test]
fn unresolvable_host_is_an_error_not_a_partial_list() {
    let err =
        resolve_addresses(Some("no-such-host.invalid."), Family::Unspec, "9101").unwrap_err();
    assert!(matches!(err, AddrError::Unresolvable { .. }));
}
