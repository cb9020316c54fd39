// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use proptest::prelude::*;
use yare::parameterized;

#[test]
fn encode_escapes_space_and_marker() {
    let enc = encode(b"a b%c");
    assert_eq!(enc, "a%20b%25c");
    assert_eq!(enc.len(), 9);
    assert_eq!(decode(&enc).unwrap(), b"a b%c");
}

#[parameterized(
    empty = { b"", "" },
    plain = { b"plain-token_42", "plain-token_42" },
    newline = { b"a\nb", "a%0Ab" },
    nul = { b"\x00", "%00" },
    high = { b"\xFF\x7F", "%FF%7F" },
    tilde = { b"~", "~" },
)]
fn encode_cases(input: &[u8], expect: &str) {
    assert_eq!(encode(input), expect);
}

#[test]
fn decode_rejects_truncated_escape() {
    assert_eq!(decode("abc%2"), Err(CstrError::Truncated(3)));
    assert_eq!(decode("%"), Err(CstrError::Truncated(0)));
}

#[test]
fn decode_rejects_bad_hex() {
    assert_eq!(decode("%zz"), Err(CstrError::BadHex(0)));
    assert_eq!(decode("x%4g"), Err(CstrError::BadHex(1)));
}

#[test]
fn decode_accepts_lowercase_hex() {
    assert_eq!(decode("%2f").unwrap(), b"/");
}

proptest! {
    #[test]
    fn round_trip(bytes in proptest::collection::vec(any::<u8>(), 0..512)) {
        let enc = encode(&bytes);
        prop_assert_eq!(decode(&enc).unwrap(), bytes);
    }

    #[test]
    fn encoded_is_whitespace_free(bytes in proptest::collection::vec(any::<u8>(), 0..512)) {
        let enc = encode(&bytes);
        for (i, c) in enc.bytes().enumerate() {
            prop_assert!(c > b' ' && c <= 0x7E, "byte {:#04x} at {}", c, i);
        }
    }
}
