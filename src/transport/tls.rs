//! TLS transport, feature-gated on `tls`.
//!
//! Wraps a `TcpTransport` with a `rustls` session and steps the record
//! layer by hand -- `step()` pumps ciphertext through the socket without
//! blocking, the same non-blocking contract `cwh_tls_handshake` /
//! `cwh_tls_read` / `cwh_tls_write` describe, just split into explicit
//! read/write/process calls instead of mbedTLS's single blocking call.

use std::io::{self, Read, Write};
use std::sync::Arc;

use rustls::{AllowAnyAuthenticatedClient, ClientConfig, ClientSession, NoClientAuth, RootCertStore, ServerConfig, ServerSession, Session};
use webpki::DNSNameRef;

use crate::error::{Error, Result};
use crate::reactor::RawFd;
use crate::transport::{TcpTransport, Transport};

struct NoVerify;

impl rustls::ServerCertVerifier for NoVerify {
    fn verify_server_cert(
        &self,
        _roots: &rustls::RootCertStore,
        _presented_certs: &[rustls::Certificate],
        _dns_name: DNSNameRef,
        _ocsp: &[u8],
    ) -> std::result::Result<rustls::ServerCertVerified, rustls::TLSError> {
        Ok(rustls::ServerCertVerified::assertion())
    }
}

/// TLS connection configuration; mirrors the knobs in the wire contract
/// (`verify_peer`, custom roots, minimum version is fixed by `rustls`
/// itself to TLS 1.2+).
pub struct TlsConfig {
    pub verify_peer: bool,
}

impl Default for TlsConfig {
    fn default() -> TlsConfig {
        TlsConfig { verify_peer: true }
    }
}

pub struct TlsTransport {
    tcp: TcpTransport,
    session: ClientSession,
}

impl TlsTransport {
    pub fn wrap(tcp: TcpTransport, host: &str, config: &TlsConfig) -> Result<TlsTransport> {
        let mut client_config = ClientConfig::new();
        if config.verify_peer {
            client_config
                .root_store
                .add_server_trust_anchors(&webpki_roots::TLS_SERVER_ROOTS);
        } else {
            client_config
                .dangerous()
                .set_certificate_verifier(Arc::new(NoVerify));
        }
        let dns_name = DNSNameRef::try_from_ascii_str(host).map_err(|_| Error::SslInit)?;
        let session = ClientSession::new(&Arc::new(client_config), dns_name);
        Ok(TlsTransport { tcp: tcp, session: session })
    }

    /// Drive handshake and buffered record-layer I/O as far as it can go
    /// without blocking. Call again once the reactor reports the
    /// underlying socket ready in the direction `wants_read`/`wants_write`
    /// asked for.
    pub fn step(&mut self) -> Result<()> {
        while self.session.wants_write() {
            let mut sink = SocketAdapter(&mut self.tcp);
            match self.session.write_tls(&mut sink) {
                Ok(0) => break,
                Ok(_) => {}
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(_) => return Err(Error::SslHandshake),
            }
        }
        if self.session.wants_read() {
            let mut source = SocketAdapter(&mut self.tcp);
            match self.session.read_tls(&mut source) {
                Ok(0) => {}
                Ok(_) => {
                    self.session
                        .process_new_packets()
                        .map_err(|_| Error::SslCertVerify)?;
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {}
                Err(e) => return Err(Error::Io(e)),
            }
        }
        Ok(())
    }
}

impl Transport for TlsTransport {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        match self.session.read(buf) {
            Ok(0) if !self.session.is_handshaking() => Err(Error::NetConnectionClosed),
            Ok(n) => Ok(n),
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                Err(Error::Io(io::Error::new(io::ErrorKind::WouldBlock, "tls handshake in progress")))
            }
            Err(e) => Err(Error::Io(e)),
        }
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        self.session.write(buf).map_err(Error::Io)
    }

    fn raw_fd(&self) -> RawFd {
        self.tcp.raw_fd()
    }

    fn is_ready(&self) -> bool {
        !self.session.is_handshaking()
    }
}

/// Server-side TLS configuration: identity plus an optional client-cert
/// root store. When `client_ca_roots` is set, the handshake requires
/// and verifies a client certificate chaining to one of those roots
/// (spec.md §4.6: "the verified subject is exposed to the handler").
pub struct TlsServerConfig {
    pub cert_chain: Vec<rustls::Certificate>,
    pub private_key: rustls::PrivateKey,
    pub client_ca_roots: Option<RootCertStore>,
}

pub struct TlsServerTransport {
    tcp: TcpTransport,
    session: ServerSession,
}

impl TlsServerTransport {
    pub fn wrap(tcp: TcpTransport, config: &TlsServerConfig) -> Result<TlsServerTransport> {
        let client_auth = match config.client_ca_roots {
            Some(ref roots) => AllowAnyAuthenticatedClient::new(roots.clone()),
            None => NoClientAuth::new(),
        };
        let mut server_config = ServerConfig::new(client_auth);
        server_config
            .set_single_cert(config.cert_chain.clone(), config.private_key.clone())
            .map_err(|_| Error::SslInit)?;
        let session = ServerSession::new(&Arc::new(server_config));
        Ok(TlsServerTransport { tcp: tcp, session: session })
    }

    /// Same non-blocking record-layer pump as [`TlsTransport::step`].
    pub fn step(&mut self) -> Result<()> {
        while self.session.wants_write() {
            let mut sink = SocketAdapter(&mut self.tcp);
            match self.session.write_tls(&mut sink) {
                Ok(0) => break,
                Ok(_) => {}
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(_) => return Err(Error::SslHandshake),
            }
        }
        if self.session.wants_read() {
            let mut source = SocketAdapter(&mut self.tcp);
            match self.session.read_tls(&mut source) {
                Ok(0) => {}
                Ok(_) => {
                    self.session
                        .process_new_packets()
                        .map_err(|_| Error::SslCertVerify)?;
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {}
                Err(e) => return Err(Error::Io(e)),
            }
        }
        Ok(())
    }

    /// The verified peer certificate chain, if client-cert auth was
    /// configured and the handshake completed.
    pub fn peer_certificates(&self) -> Option<Vec<rustls::Certificate>> {
        self.session.get_peer_certificates()
    }
}

impl Transport for TlsServerTransport {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        match self.session.read(buf) {
            Ok(0) if !self.session.is_handshaking() => Err(Error::NetConnectionClosed),
            Ok(n) => Ok(n),
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                Err(Error::Io(io::Error::new(io::ErrorKind::WouldBlock, "tls handshake in progress")))
            }
            Err(e) => Err(Error::Io(e)),
        }
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        self.session.write(buf).map_err(Error::Io)
    }

    fn raw_fd(&self) -> RawFd {
        self.tcp.raw_fd()
    }

    fn is_ready(&self) -> bool {
        !self.session.is_handshaking()
    }
}

/// Adapts `TcpTransport`'s `Result<usize, Error>` read/write to the
/// `io::Read`/`io::Write` that `rustls`'s `read_tls`/`write_tls` expect.
struct SocketAdapter<'a>(&'a mut TcpTransport);

impl<'a> io::Read for SocketAdapter<'a> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.0.read(buf) {
            Ok(n) => Ok(n),
            Err(Error::Io(e)) => Err(e),
            Err(Error::NetConnectionClosed) => Ok(0),
            Err(_) => Err(io::Error::new(io::ErrorKind::Other, "transport read error")),
        }
    }
}

impl<'a> io::Write for SocketAdapter<'a> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.0.write(buf) {
            Ok(n) => Ok(n),
            Err(Error::Io(e)) => Err(e),
            Err(_) => Err(io::Error::new(io::ErrorKind::Other, "transport write error")),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
