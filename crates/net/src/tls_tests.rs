// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

/// Build a minimal DER fragment: AttributeTypeAndValue with the CN OID
/// and a UTF8String value, surrounded by junk.
fn der_with_cn(cn: &str) -> Vec<u8> {
    let mut der = vec![0x30, 0x82, 0x01, 0x00, 0xAA, 0xBB];
    der.extend_from_slice(&[0x06, 0x03, 0x55, 0x04, 0x03]);
    der.push(0x0C);
    der.push(cn.len() as u8);
    der.extend_from_slice(cn.as_bytes());
    der.extend_from_slice(&[0xDE, 0xAD]);
    der
}

#[test]
fn extracts_common_name() {
    let der = der_with_cn("backup-sd.example.com");
    assert_eq!(subject_common_names(&der), vec!["backup-sd.example.com"]);
}

#[test]
fn extracts_multiple_common_names() {
    let mut der = der_with_cn("first");
    der.extend_from_slice(&der_with_cn("second"));
    assert_eq!(subject_common_names(&der), vec!["first", "second"]);
}

#[test]
fn no_cn_yields_empty() {
    assert!(subject_common_names(&[0x30, 0x03, 0x02, 0x01, 0x01]).is_empty());
}

#[test]
fn printable_string_accepted() {
    let mut der = vec![0x06, 0x03, 0x55, 0x04, 0x03, 0x13, 0x04];
    der.extend_from_slice(b"host");
    assert_eq!(subject_common_names(&der), vec!["host"]);
}

#[test]
fn missing_cert_files_error_cleanly() {
    let err = TlsContext::client(
        Path::new("/nonexistent/ca.pem"),
        None,
        None,
        VerifyPeer::ChainOnly,
    )
    .unwrap_err();
    assert!(matches!(err, TlsError::CertificateNotFound(_)));
}
