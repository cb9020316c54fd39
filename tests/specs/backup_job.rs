//! A whole backup job through the real daemon: authenticate, configure,
//! start, receive the image stream, observe history and the halt.

use crate::prelude::*;
use ndm_net::RecvStatus;
use std::io::Read as _;

fn install_fake_formatter() -> tempfile::TempDir {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempfile::tempdir().unwrap();
    let script = dir.path().join("wrap_fake");
    std::fs::write(
        &script,
        "#!/bin/sh\n\
         echo \"Lx starting\" >&3\n\
         echo \"HF /etc/hostname @42 f- m0644 s7 i1234\" >&3\n\
         printf 'SPEC-IMAGE-BYTES'\n",
    )
    .unwrap();
    std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
    dir
}

#[test]
fn backup_job_end_to_end() {
    let formatter_dir = install_fake_formatter();
    let dir = tempfile::tempdir().unwrap();
    let daemon = start_daemon(dir.path(), Some(formatter_dir.path()));

    let mut bs = control_connection(daemon.port);

    bs.send_str("data job spec-backup type=fake");
    assert!(matches!(bs.recv(), RecvStatus::Data(_)));
    assert!(bs.msg_str().starts_with("1000 OK"));

    bs.send_str("data env HIST=n");
    assert!(matches!(bs.recv(), RecvStatus::Data(_)));

    bs.send_str("data backup");
    assert!(matches!(bs.recv(), RecvStatus::Data(_)));
    let reply = bs.msg_str().into_owned();
    assert!(reply.starts_with("1000 OK DATA"), "got: {reply}");
    let port: u16 = reply
        .trim()
        .rsplit_once("listen=")
        .map(|(_, p)| p.parse().unwrap())
        .unwrap();

    // play the mover: take the image stream
    let mut image = std::net::TcpStream::connect(("127.0.0.1", port)).unwrap();
    let mut payload = Vec::new();
    image.read_to_end(&mut payload).unwrap();
    assert_eq!(payload, b"SPEC-IMAGE-BYTES");

    // collect session traffic until the halt notification
    let mut saw_wrap_log = false;
    let mut saw_history = false;
    let mut halt_line = String::new();
    while halt_line.is_empty() {
        match bs.recv() {
            RecvStatus::Data(_) => {
                let line = bs.msg_str().into_owned();
                if line.contains("WRAP: starting") {
                    saw_wrap_log = true;
                }
                if line.starts_with("Hist ") && line.contains("/etc/hostname") {
                    saw_history = true;
                }
                if line.contains("data halted") {
                    halt_line = line;
                }
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    assert!(saw_wrap_log, "formatter log line never arrived");
    assert!(saw_history, "file history never arrived");
    assert!(
        halt_line.contains("reason=successful"),
        "got: {halt_line}"
    );

    bs.send_str("quit");
    let _ = bs.recv();
}
