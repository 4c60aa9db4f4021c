//! The HTTP/1.x server: a non-blocking accept loop producing
//! [`connection::Connection`] state machines, driven the same way
//! `client::Context` is -- the caller registers file descriptors with a
//! reactor and steps them on readiness. The listening socket itself is
//! just another non-blocking fd the caller polls for read-readiness and
//! drains via [`Server::accept`].

pub mod config;
pub mod connection;
pub mod route;
pub mod websocket;

use std::net::{SocketAddr, TcpListener, ToSocketAddrs};
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::reactor::RawFd;
use crate::transport::TcpTransport;
#[cfg(feature = "tls")]
use crate::transport::tls::{TlsServerConfig, TlsServerTransport};

pub use self::config::Config;
pub use self::connection::{Connection, ServerTransport};
pub use self::route::{Handler, HandlerRequest, HandlerResponse, Router, WsHandler};

/// A bound, listening, non-blocking TCP socket plus the router and
/// config every accepted connection is built from. Not `Sync`, like
/// [`crate::client::Client`] -- one `Server` belongs to one reactor
/// thread; a multi-threaded listener means one `Server` per thread,
/// each with its own accepted connections (`SO_REUSEPORT` or a shared
/// dup'd listener fd, left to the caller).
pub struct Server {
    listener: TcpListener,
    router: Arc<Router>,
    config: Arc<Config>,
    #[cfg(feature = "tls")]
    tls: Option<Arc<TlsServerConfig>>,
}

impl Server {
    /// Bind and start listening. The listener is set non-blocking
    /// immediately; `accept()` never blocks the caller.
    pub fn bind<A: ToSocketAddrs>(addr: A, router: Router, config: Arc<Config>) -> Result<Server> {
        let listener = TcpListener::bind(addr).map_err(Error::Io)?;
        listener.set_nonblocking(true).map_err(Error::Io)?;
        Ok(Server {
            listener: listener,
            router: Arc::new(router),
            config: config,
            #[cfg(feature = "tls")]
            tls: None,
        })
    }

    /// Terminate every accepted connection in TLS, per spec.md §4.6.
    #[cfg(feature = "tls")]
    pub fn with_tls(mut self, tls: TlsServerConfig) -> Server {
        self.tls = Some(Arc::new(tls));
        self
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener.local_addr().map_err(Error::Io)
    }

    /// Register this with a reactor for `Interest::READ`; call
    /// `accept()` on every readiness notification until it returns
    /// `None`.
    pub fn raw_fd(&self) -> RawFd {
        #[cfg(unix)]
        {
            use std::os::unix::io::AsRawFd;
            self.listener.as_raw_fd()
        }
        #[cfg(windows)]
        {
            use std::os::windows::io::AsRawSocket;
            self.listener.as_raw_socket()
        }
    }

    /// Accept one pending connection without blocking. `Ok(None)` means
    /// the accept queue is currently empty -- park until the reactor
    /// reports this fd readable again. The returned `Connection` starts
    /// in its read state; the caller registers `connection.raw_fd()`
    /// with the reactor and drives it via `step()`.
    pub fn accept(&self) -> Result<Option<Connection>> {
        match self.listener.accept() {
            Ok((stream, _peer)) => {
                let tcp = TcpTransport::from_stream(stream)?;
                let transport = self.wrap_transport(tcp)?;
                Ok(Some(Connection::new(transport, self.router.clone(), &self.config)))
            }
            Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(Error::Io(e)),
        }
    }

    #[cfg(feature = "tls")]
    fn wrap_transport(&self, tcp: TcpTransport) -> Result<ServerTransport> {
        match self.tls {
            Some(ref cfg) => Ok(ServerTransport::Tls(TlsServerTransport::wrap(tcp, cfg)?)),
            None => Ok(ServerTransport::Tcp(tcp)),
        }
    }

    #[cfg(not(feature = "tls"))]
    fn wrap_transport(&self, tcp: TcpTransport) -> Result<ServerTransport> {
        Ok(ServerTransport::Tcp(tcp))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn bind_picks_an_ephemeral_port_and_accepts_nothing_yet() {
        let server = Server::bind("127.0.0.1:0", Router::new(), Config::new().done()).unwrap();
        assert!(server.local_addr().unwrap().port() > 0);
        assert!(server.accept().unwrap().is_none());
    }

    #[test]
    fn accepts_a_connecting_client() {
        let server = Server::bind("127.0.0.1:0", Router::new(), Config::new().done()).unwrap();
        let addr = server.local_addr().unwrap();
        let _client = std::net::TcpStream::connect(addr).unwrap();
        // the accept queue is filled asynchronously by the kernel; poll briefly
        for _ in 0..50 {
            if let Some(conn) = server.accept().unwrap() {
                assert!(!conn.is_terminal());
                return;
            }
            std::thread::sleep(std::time::Duration::from_millis(10));
        }
        panic!("connection never appeared in the accept queue");
    }
}
