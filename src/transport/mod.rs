//! Byte-stream transport: a plain, non-blocking TCP socket or (behind
//! the `tls` feature) a `rustls`-wrapped one, both driven by the reactor
//! rather than hidden inside an async runtime.

use std::io::{self, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::reactor::RawFd;

#[cfg(feature = "tls")]
pub mod tls;

/// True if `err` represents "would block" rather than a real failure --
/// the normal outcome of a non-blocking read/write on an idle socket.
pub fn would_block(err: &Error) -> bool {
    match *err {
        Error::Io(ref e) => e.kind() == io::ErrorKind::WouldBlock,
        _ => false,
    }
}

/// A non-blocking, readable/writable byte stream registrable with the
/// reactor. Implementors never block; a read/write that cannot complete
/// immediately returns `Error::Io` wrapping `io::ErrorKind::WouldBlock`.
pub trait Transport {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;
    fn write(&mut self, buf: &[u8]) -> Result<usize>;
    fn raw_fd(&self) -> RawFd;
    /// True once the handshake (if any) has completed and application
    /// data can flow; plain TCP is always ready.
    fn is_ready(&self) -> bool {
        true
    }
}

/// A plain TCP transport. DNS resolution happens synchronously through
/// `std::net::ToSocketAddrs` before the non-blocking connect -- a
/// documented blocking point (see the design notes); everything after
/// that is non-blocking.
pub struct TcpTransport {
    stream: TcpStream,
}

impl TcpTransport {
    pub fn connect(host: &str, port: u16, timeout: Option<Duration>) -> Result<TcpTransport> {
        let addr = (host, port)
            .to_socket_addrs()
            .map_err(|_| Error::NetDnsLookup)?
            .next()
            .ok_or(Error::NetDnsLookup)?;

        let stream = match timeout {
            Some(t) => TcpStream::connect_timeout(&addr, t).map_err(|_| Error::NetSocketConnect)?,
            None => TcpStream::connect(addr).map_err(|_| Error::NetSocketConnect)?,
        };
        stream.set_nonblocking(true).map_err(|e| crate::reactor::io_error("set_nonblocking", e))?;
        stream.set_nodelay(true).ok();
        Ok(TcpTransport { stream: stream })
    }

    pub fn from_stream(stream: TcpStream) -> Result<TcpTransport> {
        stream.set_nonblocking(true).map_err(|e| crate::reactor::io_error("set_nonblocking", e))?;
        Ok(TcpTransport { stream: stream })
    }

    pub fn peer_addr(&self) -> Result<std::net::SocketAddr> {
        self.stream.peer_addr().map_err(Error::Io)
    }
}

impl Transport for TcpTransport {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        match self.stream.read(buf) {
            Ok(0) => Err(Error::NetConnectionClosed),
            Ok(n) => Ok(n),
            Err(e) => Err(Error::Io(e)),
        }
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        self.stream.write(buf).map_err(Error::Io)
    }

    #[cfg(unix)]
    fn raw_fd(&self) -> RawFd {
        use std::os::unix::io::AsRawFd;
        self.stream.as_raw_fd()
    }

    #[cfg(windows)]
    fn raw_fd(&self) -> RawFd {
        use std::os::windows::io::AsRawSocket;
        self.stream.as_raw_socket()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::ErrorKind;

    #[test]
    fn would_block_matches_only_that_kind() {
        let wb = Error::Io(io::Error::new(ErrorKind::WouldBlock, "x"));
        let other = Error::Io(io::Error::new(ErrorKind::Other, "x"));
        assert!(would_block(&wb));
        assert!(!would_block(&other));
        assert!(!would_block(&Error::NetTimeout));
    }
}
