// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! TLS wrapper around an established BSOCK stream.
//!
//! rustls drives the record layer; this module owns PEM loading, the
//! timed handshake and two-phase shutdown, and the peer-identity policy:
//! hostname matching rides on rustls' own subjectAltName verification,
//! while an allowed-CN list is checked post-handshake against the
//! certificate subject.

use std::io::{BufReader, Read, Write};
use std::net::TcpStream;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use rustls::{ClientConfig, ClientConnection, RootCertStore, ServerConfig, ServerConnection};
use rustls_pki_types::{CertificateDer, PrivateKeyDer, ServerName};
use thiserror::Error;
use tracing::debug;

/// Handshake budget (the 10 s select loop of the session-start path).
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Two-phase shutdown budget.
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Error)]
pub enum TlsError {
    #[error("certificate file not found: {0}")]
    CertificateNotFound(PathBuf),

    #[error("failed to parse certificate: {0}")]
    CertificateParseFailed(String),

    #[error("no private keys found in {0}")]
    NoPrivateKeysFound(PathBuf),

    #[error("TLS configuration error: {0}")]
    ConfigurationError(String),

    #[error("TLS handshake failed: {0}")]
    Handshake(String),

    #[error("peer certificate rejected: {0}")]
    PeerVerification(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Peer-identity policy applied after the handshake.
#[derive(Debug, Clone, Default)]
pub enum VerifyPeer {
    /// Trust whatever the trust chain said (server side without client
    /// certs, or pre-verified callers).
    #[default]
    ChainOnly,
    /// Accept only certificates whose subject CN is in this list.
    AllowedCommonNames(Vec<String>),
}

/// Loaded certificate material, reusable across connections.
#[derive(Debug)]
pub struct TlsContext {
    client: Option<Arc<ClientConfig>>,
    server: Option<Arc<ServerConfig>>,
    pub verify: VerifyPeer,
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, TlsError> {
    let file = std::fs::File::open(path)
        .map_err(|_| TlsError::CertificateNotFound(path.to_path_buf()))?;
    let mut reader = BufReader::new(file);
    let certs: Result<Vec<_>, _> = rustls_pemfile::certs(&mut reader).collect();
    certs.map_err(|e| TlsError::CertificateParseFailed(e.to_string()))
}

fn load_key(path: &Path) -> Result<PrivateKeyDer<'static>, TlsError> {
    let file = std::fs::File::open(path)
        .map_err(|_| TlsError::CertificateNotFound(path.to_path_buf()))?;
    let mut reader = BufReader::new(file);
    rustls_pemfile::private_key(&mut reader)
        .map_err(|e| TlsError::CertificateParseFailed(e.to_string()))?
        .ok_or_else(|| TlsError::NoPrivateKeysFound(path.to_path_buf()))
}

impl TlsContext {
    /// Client-side context: CA bundle plus optional client cert pair.
    pub fn client(
        ca_path: &Path,
        cert_path: Option<&Path>,
        key_path: Option<&Path>,
        verify: VerifyPeer,
    ) -> Result<Self, TlsError> {
        let mut roots = RootCertStore::empty();
        for cert in load_certs(ca_path)? {
            roots
                .add(cert)
                .map_err(|e| TlsError::CertificateParseFailed(e.to_string()))?;
        }

        let builder = ClientConfig::builder().with_root_certificates(roots);
        let config = match (cert_path, key_path) {
            (Some(cert), Some(key)) => builder
                .with_client_auth_cert(load_certs(cert)?, load_key(key)?)
                .map_err(|e| TlsError::ConfigurationError(e.to_string()))?,
            _ => builder.with_no_client_auth(),
        };

        Ok(Self {
            client: Some(Arc::new(config)),
            server: None,
            verify,
        })
    }

    /// Server-side context: certificate pair plus optional CA bundle for
    /// requiring client certificates.
    pub fn server(
        cert_path: &Path,
        key_path: &Path,
        ca_path: Option<&Path>,
        verify: VerifyPeer,
    ) -> Result<Self, TlsError> {
        let certs = load_certs(cert_path)?;
        let key = load_key(key_path)?;

        let config = match ca_path {
            Some(ca) => {
                let mut roots = RootCertStore::empty();
                for cert in load_certs(ca)? {
                    roots
                        .add(cert)
                        .map_err(|e| TlsError::CertificateParseFailed(e.to_string()))?;
                }
                let verifier = rustls::server::WebPkiClientVerifier::builder(Arc::new(roots))
                    .build()
                    .map_err(|e| TlsError::ConfigurationError(e.to_string()))?;
                ServerConfig::builder()
                    .with_client_cert_verifier(verifier)
                    .with_single_cert(certs, key)
            }
            None => ServerConfig::builder()
                .with_no_client_auth()
                .with_single_cert(certs, key),
        }
        .map_err(|e| TlsError::ConfigurationError(e.to_string()))?;

        Ok(Self {
            client: None,
            server: Some(Arc::new(config)),
            verify,
        })
    }

    /// Run the client handshake on `tcp` for `server_name`, under the
    /// handshake timer, then apply the peer policy.
    pub fn connect(&self, tcp: TcpStream, server_name: &str) -> Result<TlsStream, TlsError> {
        let config = self
            .client
            .clone()
            .ok_or_else(|| TlsError::ConfigurationError("no client config".into()))?;
        let name = ServerName::try_from(server_name.to_string())
            .map_err(|e| TlsError::Handshake(e.to_string()))?;
        let mut conn = ClientConnection::new(config, name)
            .map_err(|e| TlsError::Handshake(e.to_string()))?;
        let tcp = drive_handshake(&mut Conn::Client(&mut conn), tcp)?;
        self.check_peer(conn.peer_certificates())?;
        Ok(TlsStream::Client(rustls::StreamOwned::new(conn, tcp)))
    }

    /// Run the server handshake on an accepted `tcp`, under the handshake
    /// timer, then apply the peer policy.
    pub fn accept(&self, tcp: TcpStream) -> Result<TlsStream, TlsError> {
        let config = self
            .server
            .clone()
            .ok_or_else(|| TlsError::ConfigurationError("no server config".into()))?;
        let mut conn = ServerConnection::new(config)
            .map_err(|e| TlsError::Handshake(e.to_string()))?;
        let tcp = drive_handshake(&mut Conn::Server(&mut conn), tcp)?;
        self.check_peer(conn.peer_certificates())?;
        Ok(TlsStream::Server(rustls::StreamOwned::new(conn, tcp)))
    }

    fn check_peer(&self, certs: Option<&[CertificateDer<'_>]>) -> Result<(), TlsError> {
        let VerifyPeer::AllowedCommonNames(allowed) = &self.verify else {
            return Ok(());
        };
        let Some(cert) = certs.and_then(|c| c.first()) else {
            return Err(TlsError::PeerVerification(
                "peer presented no certificate".into(),
            ));
        };
        let names = subject_common_names(cert.as_ref());
        if names.iter().any(|n| allowed.iter().any(|a| a == n)) {
            Ok(())
        } else {
            Err(TlsError::PeerVerification(format!(
                "subject CN {:?} not in allowed list",
                names
            )))
        }
    }
}

enum Conn<'a> {
    Client(&'a mut ClientConnection),
    Server(&'a mut ServerConnection),
}

/// Drive the handshake record exchange with the handshake timeout set on
/// the socket, restoring blocking mode afterwards.
fn drive_handshake(conn: &mut Conn<'_>, tcp: TcpStream) -> Result<TcpStream, TlsError> {
    tcp.set_read_timeout(Some(HANDSHAKE_TIMEOUT))?;
    tcp.set_write_timeout(Some(HANDSHAKE_TIMEOUT))?;
    let mut tcp = tcp;
    loop {
        let handshaking = match conn {
            Conn::Client(c) => {
                if !c.is_handshaking() {
                    false
                } else {
                    c.complete_io(&mut tcp)
                        .map_err(|e| TlsError::Handshake(e.to_string()))?;
                    c.is_handshaking()
                }
            }
            Conn::Server(s) => {
                if !s.is_handshaking() {
                    false
                } else {
                    s.complete_io(&mut tcp)
                        .map_err(|e| TlsError::Handshake(e.to_string()))?;
                    s.is_handshaking()
                }
            }
        };
        if !handshaking {
            break;
        }
    }
    tcp.set_read_timeout(None)?;
    tcp.set_write_timeout(None)?;
    Ok(tcp)
}

/// Established TLS stream, either role.
pub enum TlsStream {
    Client(rustls::StreamOwned<ClientConnection, TcpStream>),
    Server(rustls::StreamOwned<ServerConnection, TcpStream>),
}

impl TlsStream {
    pub fn tcp(&self) -> &TcpStream {
        match self {
            TlsStream::Client(s) => &s.sock,
            TlsStream::Server(s) => &s.sock,
        }
    }

    /// Two-phase shutdown: queue our close_notify, flush it, then wait
    /// (bounded) for the peer's.
    pub fn shutdown(&mut self) -> Result<(), TlsError> {
        let _ = self.tcp().set_read_timeout(Some(SHUTDOWN_TIMEOUT));
        match self {
            TlsStream::Client(s) => s.conn.send_close_notify(),
            TlsStream::Server(s) => s.conn.send_close_notify(),
        }
        let _ = self.flush();
        let mut sink = [0u8; 512];
        loop {
            match self.read(&mut sink) {
                Ok(0) => break,
                Ok(_) => continue,
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
                Err(e) => {
                    debug!(err = %e, "tls shutdown read");
                    break;
                }
            }
        }
        Ok(())
    }
}

impl Read for TlsStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match self {
            TlsStream::Client(s) => s.read(buf),
            TlsStream::Server(s) => s.read(buf),
        }
    }
}

impl Write for TlsStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match self {
            TlsStream::Client(s) => s.write(buf),
            TlsStream::Server(s) => s.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match self {
            TlsStream::Client(s) => s.flush(),
            TlsStream::Server(s) => s.flush(),
        }
    }
}

/// Extract subject common names from a DER certificate.
///
/// A full X.509 decode is not needed for the allow-list check: the
/// subject CN attribute is the value following the id-at-commonName OID
/// (2.5.4.3, DER `06 03 55 04 03`) inside an AttributeTypeAndValue, and
/// the value is a UTF8String/PrintableString/IA5String TLV.
pub fn subject_common_names(der: &[u8]) -> Vec<String> {
    const OID_CN: [u8; 5] = [0x06, 0x03, 0x55, 0x04, 0x03];
    let mut names = Vec::new();
    let mut i = 0;
    while i + OID_CN.len() + 2 <= der.len() {
        if der[i..i + OID_CN.len()] != OID_CN {
            i += 1;
            continue;
        }
        let vpos = i + OID_CN.len();
        let tag = der[vpos];
        // UTF8String, PrintableString, IA5String, T61String
        if matches!(tag, 0x0C | 0x13 | 0x16 | 0x14) && vpos + 1 < der.len() {
            let len = der[vpos + 1] as usize;
            // long-form lengths do not occur for sane CNs
            if len < 0x80 && vpos + 2 + len <= der.len() {
                if let Ok(s) = std::str::from_utf8(&der[vpos + 2..vpos + 2 + len]) {
                    names.push(s.to_string());
                }
            }
        }
        i = vpos;
    }
    names
}

#[cfg(test)]
#[path = "tls_tests.rs"]
mod tests;
