// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn compatible_matches_rfc_vectors() {
    assert_eq!(bin_to_base64(b"", true), "");
    assert_eq!(bin_to_base64(b"f", true), "Zg");
    assert_eq!(bin_to_base64(b"fo", true), "Zm8");
    assert_eq!(bin_to_base64(b"foo", true), "Zm9v");
    assert_eq!(bin_to_base64(b"foobar", true), "Zm9vYmFy");
}

#[test]
fn compatible_round_trips_through_decode() {
    let data: Vec<u8> = (0u8..=255).collect();
    let enc = bin_to_base64(&data, true);
    assert_eq!(base64_to_bin(&enc).unwrap(), data);
}

#[test]
fn decode_tolerates_padding() {
    assert_eq!(base64_to_bin("Zg==").unwrap(), b"f");
    assert_eq!(base64_to_bin("Zm8=").unwrap(), b"fo");
}

#[test]
fn legacy_matches_compatible_for_low_ascii_whole_groups() {
    // Bytes below 0x80 in multiples of three see no sign extension and no
    // partial tail, so the flavors agree.
    assert_eq!(bin_to_base64(b"foo", false), bin_to_base64(b"foo", true));
    assert_eq!(
        bin_to_base64(b"foobar", false),
        bin_to_base64(b"foobar", true)
    );
}

#[test]
fn legacy_diverges_on_partial_tail() {
    // One input byte leaves two residual bits: the standards flavor
    // left-aligns them, the legacy flavor emits them low-aligned.
    let compat = bin_to_base64(b"f", true);
    let legacy = bin_to_base64(b"f", false);
    assert_eq!(compat, "Zg");
    assert_eq!(legacy, "ZC");
}

#[test]
fn decode_rejects_garbage() {
    assert!(base64_to_bin("not base64 at all!").is_none());
}
