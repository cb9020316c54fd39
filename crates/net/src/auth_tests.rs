// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::bsock::BSock;
use std::net::{TcpListener, TcpStream};

fn socket_pair() -> (BSock, BSock) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let client = TcpStream::connect(addr).unwrap();
    let (server, _) = listener.accept().unwrap();
    (
        BSock::from_stream(client, "client", "127.0.0.1", addr.port()),
        BSock::from_stream(server, "server", "127.0.0.1", addr.port()),
    )
}

fn quick_auth(password: &str, name: &str) -> Authenticator {
    let mut a = Authenticator::new(password, name, TlsNeed::None);
    a.penalty = Duration::from_millis(10);
    a
}

#[test]
fn hmac_md5_golden() {
    // RFC 2202 test case 2: key "Jefe", data "what do ya want for nothing?"
    let digest = hmac_md5(b"what do ya want for nothing?", b"Jefe");
    assert_eq!(
        digest,
        [
            0x75, 0x0c, 0x78, 0x3e, 0x6a, 0xb0, 0xb5, 0x03, 0xea, 0xa8, 0x6e, 0x31, 0x0a, 0x5d,
            0xb7, 0x38
        ]
    );
}

#[test]
fn parse_challenge_variants() {
    let (chal, need, compat) = parse_challenge("auth cram-md5c <1.2@h> ssl=2").unwrap();
    assert_eq!(chal, "<1.2@h>");
    assert_eq!(need, TlsNeed::Required);
    assert!(compat);

    let (chal, need, compat) = parse_challenge("auth cram-md5 <1.2@h> ssl=0").unwrap();
    assert_eq!(chal, "<1.2@h>");
    assert_eq!(need, TlsNeed::None);
    assert!(!compat);

    // old peers omit the ssl field
    let (_, need, _) = parse_challenge("auth cram-md5 <1.2@h>").unwrap();
    assert_eq!(need, TlsNeed::None);

    assert!(parse_challenge("ehlo nope").is_none());
}

#[test]
fn matching_passwords_authenticate() {
    let (mut client, mut server) = socket_pair();
    let server_auth = quick_auth("secret", "sd");
    let client_auth = quick_auth("secret", "fd");

    let t = std::thread::spawn(move || server_auth.authenticate_inbound(&mut server).is_ok());
    let client_ok = client_auth.authenticate_outbound(&mut client).is_ok();
    assert!(t.join().unwrap());
    assert!(client_ok);
}

#[test]
fn mismatched_passwords_fail_both_sides() {
    let (mut client, mut server) = socket_pair();
    let server_auth = quick_auth("secret", "sd");
    let client_auth = quick_auth("wrong", "fd");

    let t = std::thread::spawn(move || server_auth.authenticate_inbound(&mut server).is_err());
    let client_failed = client_auth.authenticate_outbound(&mut client).is_err();
    assert!(t.join().unwrap());
    assert!(client_failed);
}

#[test]
fn legacy_base64_response_accepted() {
    let (mut client, mut server) = socket_pair();
    let mut server_auth = quick_auth("secret", "sd");
    server_auth.compatible = false; // challenges with "auth cram-md5"
    let client_auth = quick_auth("secret", "fd");

    let t = std::thread::spawn(move || server_auth.challenge(&mut server).is_ok());
    // the responder answers a non-compatible challenge in legacy flavor
    let need = client_auth.respond(&mut client);
    assert!(t.join().unwrap());
    assert_eq!(need.unwrap(), TlsNeed::None);
}

#[test]
fn tls_need_clash_is_rejected() {
    let mut required = quick_auth("pw", "a");
    required.local_need = TlsNeed::Required;
    assert!(matches!(
        required.check_needs(TlsNeed::None),
        Err(AuthError::TlsNeedMismatch { .. })
    ));
    assert!(required.check_needs(TlsNeed::Ok).is_ok());
    assert!(required.check_needs(TlsNeed::Required).is_ok());
}

#[test]
fn hello_exchange_end_to_end() {
    let (mut client, mut server) = socket_pair();
    let server_auth = quick_auth("pw", "backup-dir");
    let client_auth = quick_auth("pw", "client-fd");

    let t = std::thread::spawn(move || hello_server(&mut server, &server_auth));
    let client_ok = hello_client(&mut client, &client_auth);
    let (peer, _need) = t.join().unwrap().unwrap();
    assert_eq!(peer, "client-fd");
    assert!(client_ok.is_ok());
}

#[test]
fn hello_server_rejects_garbage_greeting() {
    let (mut client, mut server) = socket_pair();
    let server_auth = quick_auth("pw", "dir");

    let t = std::thread::spawn(move || hello_server(&mut server, &server_auth));
    client.send_str("GET / HTTP/1.1\n");
    assert!(matches!(t.join().unwrap(), Err(AuthError::BadHello(_))));
}
