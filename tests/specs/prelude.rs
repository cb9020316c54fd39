//! Shared helpers for the spec suite.

use std::path::{Path, PathBuf};
use std::process::{Child, Command};
use std::time::{Duration, Instant};

use ndm_net::auth::{hashed_password, hello_client, Authenticator, TlsNeed};
use ndm_net::BSock;

pub const TEST_PASSWORD: &str = "spec-password";
pub const DIRECTOR_NAME: &str = "spec-dir";

pub fn ndmd_path() -> PathBuf {
    assert_cmd::cargo::cargo_bin("ndmd")
}

/// Reserve a port by binding and releasing it.
pub fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

/// Write a minimal daemon config into `dir` and return its path.
pub fn write_daemon_config(dir: &Path, port: u16) -> PathBuf {
    let conf = dir.join("ndmd.conf");
    let body = format!(
        "Daemon {{\n  Name = spec-ndmd\n  Working Directory = \"{workdir}\"\n  Port = {port}\n  Messages = Std\n}}\n\
         Director {{\n  Name = {dirname}\n  Password = \"{password}\"\n}}\n\
         Messages {{\n  Name = Std\n  append = \"{log}\" = all\n}}\n",
        workdir = dir.display(),
        port = port,
        dirname = DIRECTOR_NAME,
        password = TEST_PASSWORD,
        log = dir.join("routed.log").display(),
    );
    std::fs::write(&conf, body).unwrap();
    conf
}

pub struct DaemonUnderTest {
    pub child: Child,
    pub port: u16,
}

impl Drop for DaemonUnderTest {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// Start ndmd against a fresh config; waits for the control port.
pub fn start_daemon(dir: &Path, extra_path: Option<&Path>) -> DaemonUnderTest {
    let port = free_port();
    let conf = write_daemon_config(dir, port);

    let mut cmd = Command::new(ndmd_path());
    cmd.arg("-c").arg(&conf);
    if let Some(p) = extra_path {
        let old = std::env::var("PATH").unwrap_or_default();
        cmd.env("PATH", format!("{}:{}", p.display(), old));
    }
    let child = cmd.spawn().unwrap();

    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        if std::net::TcpStream::connect(("127.0.0.1", port)).is_ok() {
            break;
        }
        assert!(Instant::now() < deadline, "ndmd never opened its port");
        std::thread::sleep(Duration::from_millis(25));
    }

    DaemonUnderTest { child, port }
}

/// Connect and authenticate a control connection.
pub fn control_connection(port: u16) -> BSock {
    let stream = std::net::TcpStream::connect(("127.0.0.1", port)).unwrap();
    let mut bs = BSock::from_stream(stream, DIRECTOR_NAME, "127.0.0.1", port);
    let mut auth = Authenticator::new(&hashed_password(TEST_PASSWORD), DIRECTOR_NAME, TlsNeed::None);
    auth.penalty = Duration::from_millis(50);
    hello_client(&mut bs, &auth).expect("authentication failed");
    bs
}
