// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::io::{Read as _, Write as _};

#[test]
fn listen_accept_and_read() {
    let mut img = ImageStream::new();
    let local = img
        .listen("127.0.0.1:0".parse().unwrap())
        .unwrap();
    assert_eq!(img.poll_accept(), ConnectStatus::Listen);

    let mut peer = std::net::TcpStream::connect(local).unwrap();
    // accept may need a beat
    let mut status = ConnectStatus::Listen;
    for _ in 0..100 {
        status = img.poll_accept();
        if status == ConnectStatus::Accepted {
            break;
        }
        std::thread::sleep(std::time::Duration::from_millis(5));
    }
    assert_eq!(status, ConnectStatus::Accepted);

    img.start(StreamMode::Read);
    peer.write_all(b"image-bytes").unwrap();
    peer.flush().unwrap();

    let mut got = false;
    for _ in 0..100 {
        if img.tick() {
            got = true;
            break;
        }
        std::thread::sleep(std::time::Duration::from_millis(5));
    }
    assert!(got);
    assert_eq!(img.chan.ready(), b"image-bytes");

    drop(peer);
    for _ in 0..100 {
        img.tick();
        if img.chan.eof {
            break;
        }
        std::thread::sleep(std::time::Duration::from_millis(5));
    }
    assert!(img.chan.eof);
}

#[test]
fn write_mode_sends_channel_bytes() {
    let mut img = ImageStream::new();
    let local = img.listen("127.0.0.1:0".parse().unwrap()).unwrap();
    let peer = std::net::TcpStream::connect(local).unwrap();

    for _ in 0..100 {
        if img.poll_accept() == ConnectStatus::Accepted {
            break;
        }
        std::thread::sleep(std::time::Duration::from_millis(5));
    }
    img.start(StreamMode::Write);
    img.chan.push(b"backup-data");

    while img.chan.n_ready() > 0 {
        img.tick();
    }
    img.close();

    let mut got = Vec::new();
    let mut peer = peer;
    peer.read_to_end(&mut got).unwrap();
    assert_eq!(got, b"backup-data");
}

#[test]
fn close_resets_state() {
    let mut img = ImageStream::new();
    img.listen("127.0.0.1:0".parse().unwrap()).unwrap();
    img.close();
    assert_eq!(img.status(), ConnectStatus::Idle);
    assert_eq!(img.poll_accept(), ConnectStatus::Idle);
}
