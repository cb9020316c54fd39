//! Live daemon behavior over the control protocol.

use crate::prelude::*;
use ndm_net::auth::{hello_client, Authenticator, TlsNeed};
use ndm_net::{BSock, RecvStatus, Signal};
use std::time::Duration;

#[test]
fn authenticates_and_answers_status() {
    let dir = tempfile::tempdir().unwrap();
    let daemon = start_daemon(dir.path(), None);

    let mut bs = control_connection(daemon.port);
    assert!(bs.send_str("status"));

    let mut lines = Vec::new();
    loop {
        match bs.recv() {
            RecvStatus::Data(_) => lines.push(bs.msg_str().into_owned()),
            RecvStatus::Signal(Signal::Eod) => break,
            other => panic!("unexpected {:?}", other),
        }
    }
    assert!(lines.iter().any(|l| l.contains("spec-ndmd")));

    bs.send_str("quit");
    assert!(matches!(bs.recv(), RecvStatus::Data(_)));
}

#[test]
fn wrong_password_is_rejected_for_both_sides() {
    let dir = tempfile::tempdir().unwrap();
    let daemon = start_daemon(dir.path(), None);

    let stream = std::net::TcpStream::connect(("127.0.0.1", daemon.port)).unwrap();
    let mut bs = BSock::from_stream(stream, DIRECTOR_NAME, "127.0.0.1", daemon.port);
    let mut auth = Authenticator::new("not-the-password", DIRECTOR_NAME, TlsNeed::None);
    auth.penalty = Duration::from_millis(50);
    assert!(hello_client(&mut bs, &auth).is_err());
}

#[test]
fn heartbeats_get_responses() {
    let dir = tempfile::tempdir().unwrap();
    let daemon = start_daemon(dir.path(), None);

    let mut bs = control_connection(daemon.port);
    for _ in 0..3 {
        bs.send_signal(Signal::Heartbeat);
        assert_eq!(bs.recv(), RecvStatus::Signal(Signal::HbResponse));
    }
    bs.send_str("quit");
    let _ = bs.recv();
}

#[test]
fn jmsg_lands_in_the_configured_log_destination() {
    let dir = tempfile::tempdir().unwrap();
    let daemon = start_daemon(dir.path(), None);

    let mut bs = control_connection(daemon.port);
    bs.send_str("Jmsg Job=spec type=warning level=0 volume nearly full");
    bs.send_str("quit");
    let _ = bs.recv();
    drop(bs);

    // the append destination receives the routed line
    let log = dir.path().join("routed.log");
    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    loop {
        if let Ok(content) = std::fs::read_to_string(&log) {
            if content.contains("volume nearly full") {
                assert!(content.contains("Warning: "));
                break;
            }
        }
        assert!(std::time::Instant::now() < deadline, "message never routed");
        std::thread::sleep(Duration::from_millis(25));
    }
}

#[test]
fn second_daemon_refuses_the_held_lock() {
    let dir = tempfile::tempdir().unwrap();
    let daemon = start_daemon(dir.path(), None);

    // second instance on the same workdir: lock refused, fast exit
    let conf = dir.path().join("ndmd.conf");
    let output = std::process::Command::new(ndmd_path())
        .arg("-c")
        .arg(&conf)
        .output()
        .unwrap();
    assert!(!output.status.success());
    let err = String::from_utf8_lossy(&output.stderr);
    assert!(err.contains("another instance"), "got: {err}");

    drop(daemon);
}
