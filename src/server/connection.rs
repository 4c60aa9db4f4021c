//! Per-connection server state machine:
//! `Reading -> Dispatching -> Writing -> (keep-alive) Reading | Terminal`,
//! with an upgrade path into `WsOpen` for WebSocket connections.
//!
//! The server-side analogue of `client::context::Context`: same
//! mem::replace-to-`Void` sentinel while deciding the next state, same
//! non-blocking read/write loop driven by the reactor. Dispatch itself
//! (`Router::dispatch`) is synchronous, so there is no separate
//! "Dispatching" state to park in -- it runs inline between a completed
//! read and the response write.

use std::mem;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::reactor::RawFd;
use crate::server::config::Config;
use crate::server::route::{HandlerRequest, Router};
use crate::server::websocket::check_upgrade;
use crate::transport::{would_block, Transport};
use crate::transport::TcpTransport;
#[cfg(feature = "tls")]
use crate::transport::tls::TlsServerTransport;
use crate::websocket::{self, Role};
use crate::wire::serialize::ResponseBuilder;
use crate::wire::{Parsed, Request};

pub enum ServerTransport {
    Tcp(TcpTransport),
    #[cfg(feature = "tls")]
    Tls(TlsServerTransport),
}

impl Transport for ServerTransport {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        match *self {
            ServerTransport::Tcp(ref mut t) => t.read(buf),
            #[cfg(feature = "tls")]
            ServerTransport::Tls(ref mut t) => t.read(buf),
        }
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        match *self {
            ServerTransport::Tcp(ref mut t) => t.write(buf),
            #[cfg(feature = "tls")]
            ServerTransport::Tls(ref mut t) => t.write(buf),
        }
    }

    fn raw_fd(&self) -> RawFd {
        match *self {
            ServerTransport::Tcp(ref t) => t.raw_fd(),
            #[cfg(feature = "tls")]
            ServerTransport::Tls(ref t) => t.raw_fd(),
        }
    }

    fn is_ready(&self) -> bool {
        match *self {
            ServerTransport::Tcp(ref t) => t.is_ready(),
            #[cfg(feature = "tls")]
            ServerTransport::Tls(ref t) => t.is_ready(),
        }
    }
}

enum State {
    Reading,
    Writing { written: usize, next: NextAfterWrite },
    WsOpen,
    Terminal,
    Void,
}

enum NextAfterWrite {
    KeepAlive,
    Close,
    StartWs,
}

/// A request detached from its parser buffer, plus the bits of it the
/// connection state machine needs that aren't part of `HandlerRequest`
/// (the keep-alive disposition, and the computed `Sec-WebSocket-Accept`
/// when the request qualifies for upgrade).
struct ParsedRequest {
    req: HandlerRequest,
    keep_alive: bool,
    ws_accept: Option<String>,
}

impl ParsedRequest {
    fn from_request(req: &Request<'_>) -> ParsedRequest {
        let ws_accept = if req.method_str() == "GET" {
            check_upgrade(req.headers()).map(|u| u.accept)
        } else {
            None
        };
        ParsedRequest {
            req: HandlerRequest {
                method: req.method,
                path: req.path().to_string(),
                query: req.query().map(|q| q.to_string()),
                headers: req.headers().map(|(k, v)| (k.to_string(), String::from_utf8_lossy(v).into_owned())).collect(),
                body: req.body().to_vec(),
            },
            keep_alive: req.is_keep_alive(),
            ws_accept: ws_accept,
        }
    }
}

pub struct Connection {
    transport: ServerTransport,
    router: Arc<Router>,
    read_buf: Vec<u8>,
    read_len: usize,
    max_request_size: usize,
    write_buf: Vec<u8>,
    state: State,
    ws: Option<(websocket::Connection, crate::server::route::WsHandler)>,
}

impl Connection {
    pub fn new(transport: ServerTransport, router: Arc<Router>, config: &Config) -> Connection {
        Connection {
            transport: transport,
            router: router,
            read_buf: vec![0u8; config.read_buffer_size],
            read_len: 0,
            max_request_size: config.max_request_size,
            write_buf: Vec::new(),
            state: State::Reading,
            ws: None,
        }
    }

    pub fn raw_fd(&self) -> RawFd {
        self.transport.raw_fd()
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.state, State::Terminal)
    }

    /// Drive as far as possible without blocking. Returns `Ok(())` when
    /// parked on I/O or the connection reached a stable state; an `Err`
    /// means the caller should close the socket (the connection's own
    /// failure semantics -- 400/500/write-error -- have already been
    /// written out where possible before the error is returned).
    pub fn step(&mut self) -> Result<()> {
        loop {
            match mem::replace(&mut self.state, State::Void) {
                State::Reading => match self.do_read()? {
                    Some(next) => self.state = next,
                    None => return Ok(()),
                },
                State::Writing { written, next } => match self.do_write(written, next)? {
                    Some(next_state) => self.state = next_state,
                    None => return Ok(()),
                },
                State::WsOpen => match self.do_ws()? {
                    Some(next) => self.state = next,
                    None => return Ok(()),
                },
                State::Terminal => {
                    self.state = State::Terminal;
                    return Ok(());
                }
                State::Void => unreachable!("state left in transient Void"),
            }
        }
    }

    fn do_read(&mut self) -> Result<Option<State>> {
        if self.read_len == self.read_buf.len() {
            if self.read_buf.len() >= self.max_request_size {
                self.write_buf = simple_response(400, "Bad Request", false);
                return Ok(Some(State::Writing { written: 0, next: NextAfterWrite::Close }));
            }
            let grow = (self.read_buf.len() * 2).min(self.max_request_size);
            self.read_buf.resize(grow, 0);
        }
        match self.transport.read(&mut self.read_buf[self.read_len..]) {
            Ok(0) => Err(Error::NetConnectionClosed),
            Ok(n) => {
                self.read_len += n;
                match Request::parse(&mut self.read_buf[..self.read_len]) {
                    Ok(Parsed::Incomplete) => {
                        self.state = State::Reading;
                        Ok(None)
                    }
                    Ok(Parsed::Complete(req, consumed)) => {
                        // Detach everything the dispatch needs into owned
                        // data before touching `self` mutably again --
                        // `req` borrows `self.read_buf`, so it must not be
                        // alive across the `consume_buffer`/`dispatch`
                        // calls below (same trick as `Context::finish`).
                        let parsed = ParsedRequest::from_request(&req);
                        Ok(Some(self.dispatch(parsed, consumed)))
                    }
                    Err(_) => {
                        self.write_buf = simple_response(400, "Bad Request", false);
                        Ok(Some(State::Writing { written: 0, next: NextAfterWrite::Close }))
                    }
                }
            }
            Err(ref e) if would_block(e) => {
                self.state = State::Reading;
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    fn dispatch(&mut self, parsed: ParsedRequest, consumed: usize) -> State {
        self.consume_buffer(consumed);

        if let Some(accept) = parsed.ws_accept {
            if let Some(handler) = self.router.dispatch_ws(&parsed.req.path) {
                let handler = handler.clone();
                let mut out = Vec::new();
                ResponseBuilder::new(101)
                    .reason("Switching Protocols")
                    .header("Upgrade", "websocket")
                    .header("Connection", "Upgrade")
                    .header("Sec-WebSocket-Accept", &accept)
                    .write(true, &mut out);
                self.write_buf = out;
                self.ws = Some((websocket::Connection::new(Role::Server), handler));
                return State::Writing { written: 0, next: NextAfterWrite::StartWs };
            }
        }

        let response = match self.router.dispatch(&parsed.req) {
            Some(handler) => (handler)(&parsed.req),
            None => Ok(crate::server::route::HandlerResponse::new(404, "not found")),
        };

        let next = match response {
            Ok(resp) => {
                let mut builder = ResponseBuilder::new(resp.status).body(&resp.body);
                for (name, value) in &resp.headers {
                    builder = builder.header(name, value);
                }
                let mut out = Vec::new();
                builder.write(parsed.keep_alive, &mut out);
                self.write_buf = out;
                if parsed.keep_alive { NextAfterWrite::KeepAlive } else { NextAfterWrite::Close }
            }
            Err(_) => {
                self.write_buf = simple_response(500, "Internal Server Error", false);
                NextAfterWrite::Close
            }
        };
        State::Writing { written: 0, next: next }
    }

    /// Shift the `read_len - consumed` unconsumed (pipelined) bytes to
    /// the front of the buffer, keeping its allocated size unchanged.
    fn consume_buffer(&mut self, consumed: usize) {
        self.read_buf.copy_within(consumed..self.read_len, 0);
        self.read_len -= consumed;
    }

    fn do_write(&mut self, mut written: usize, next: NextAfterWrite) -> Result<Option<State>> {
        match self.transport.write(&self.write_buf[written..]) {
            Ok(n) => {
                written += n;
                if written >= self.write_buf.len() {
                    self.write_buf.clear();
                    Ok(Some(match next {
                        NextAfterWrite::KeepAlive => State::Reading,
                        NextAfterWrite::Close => State::Terminal,
                        NextAfterWrite::StartWs => State::WsOpen,
                    }))
                } else {
                    self.state = State::Writing { written: written, next: next };
                    Ok(None)
                }
            }
            Err(ref e) if would_block(e) => {
                self.state = State::Writing { written: written, next: next };
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    fn do_ws(&mut self) -> Result<Option<State>> {
        if self.read_len == self.read_buf.len() {
            self.read_buf.resize(self.read_buf.len() * 2, 0);
        }
        match self.transport.read(&mut self.read_buf[self.read_len..]) {
            Ok(0) => Err(Error::NetConnectionClosed),
            Ok(n) => {
                self.read_len += n;
                let mut consumable = self.read_buf[..self.read_len].to_vec();
                let (conn, handler) = self.ws.as_mut().expect("WsOpen without a session");
                let delivery = conn.feed(&mut consumable)?;
                self.read_len = consumable.len();
                self.read_buf[..self.read_len].copy_from_slice(&consumable);

                let mut out = delivery.outbound;
                for message in delivery.messages {
                    if let Some(reply) = (handler)(message) {
                        out.extend_from_slice(&match reply {
                            websocket::Message::Text(t) => conn.encode_text(&t),
                            websocket::Message::Binary(b) => conn.encode_binary(&b),
                        });
                    }
                }
                if !out.is_empty() {
                    self.transport.write(&out)?;
                }
                if conn.is_closed() {
                    Ok(Some(State::Terminal))
                } else {
                    self.state = State::WsOpen;
                    Ok(None)
                }
            }
            Err(ref e) if would_block(e) => {
                self.state = State::WsOpen;
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

fn simple_response(status: u16, body: &str, keep_alive: bool) -> Vec<u8> {
    let mut out = Vec::new();
    ResponseBuilder::new(status)
        .header("Content-Type", "text/plain")
        .body(body.as_bytes())
        .write(keep_alive, &mut out);
    out
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::{Read, Write};
    use std::net::{TcpListener, TcpStream};
    use std::time::Duration;

    use crate::server::route::HandlerResponse;

    fn pair() -> (TcpStream, ServerTransport) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).unwrap();
        let (accepted, _) = listener.accept().unwrap();
        client.set_read_timeout(Some(Duration::from_millis(200))).unwrap();
        (client, ServerTransport::Tcp(TcpTransport::from_stream(accepted).unwrap()))
    }

    fn read_some(client: &mut TcpStream) -> String {
        let mut buf = [0u8; 4096];
        for _ in 0..20 {
            match client.read(&mut buf) {
                Ok(n) if n > 0 => return String::from_utf8_lossy(&buf[..n]).into_owned(),
                _ => std::thread::sleep(Duration::from_millis(10)),
            }
        }
        panic!("no response received")
    }

    #[test]
    fn dispatches_matching_route_and_stays_open() {
        let (mut client, transport) = pair();
        let mut router = Router::new();
        router.add(None, "/hello", Arc::new(|_| Ok(HandlerResponse::new(200, "hi"))));
        let mut conn = Connection::new(transport, Arc::new(router), &Config::new());

        client.write_all(b"GET /hello HTTP/1.1\r\nHost: x\r\n\r\n").unwrap();
        conn.step().unwrap();
        let text = read_some(&mut client);
        assert!(text.starts_with("HTTP/1.1 200"));
        assert!(text.contains("hi"));
        assert!(!conn.is_terminal());
    }

    #[test]
    fn unmatched_route_yields_404() {
        let (mut client, transport) = pair();
        let router = Router::new();
        let mut conn = Connection::new(transport, Arc::new(router), &Config::new());

        client.write_all(b"GET /missing HTTP/1.1\r\nHost: x\r\n\r\n").unwrap();
        conn.step().unwrap();
        let text = read_some(&mut client);
        assert!(text.starts_with("HTTP/1.1 404"));
    }

    #[test]
    fn close_header_terminates_connection() {
        let (mut client, transport) = pair();
        let mut router = Router::new();
        router.add(None, "/x", Arc::new(|_| Ok(HandlerResponse::new(200, "ok"))));
        let mut conn = Connection::new(transport, Arc::new(router), &Config::new());

        client.write_all(b"GET /x HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n").unwrap();
        conn.step().unwrap();
        let _ = read_some(&mut client);
        assert!(conn.is_terminal());
    }

    #[test]
    fn websocket_upgrade_then_echo() {
        let (mut client, transport) = pair();
        let mut router = Router::new();
        router.add_websocket("/ws", Arc::new(|msg| Some(msg)));
        let mut conn = Connection::new(transport, Arc::new(router), &Config::new());

        client
            .write_all(
                b"GET /ws HTTP/1.1\r\n\
                Host: x\r\n\
                Upgrade: websocket\r\n\
                Connection: Upgrade\r\n\
                Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\
                Sec-WebSocket-Version: 13\r\n\r\n",
            )
            .unwrap();
        conn.step().unwrap();
        let text = read_some(&mut client);
        assert!(text.starts_with("HTTP/1.1 101"));
        assert!(text.contains("s3pPLMBiTxaQ9kYGzzhZRbK+xOo="));

        let mut frame = Vec::new();
        crate::websocket::frame::encode_frame(&mut frame, crate::websocket::frame::OP_TEXT, b"ping", true);
        client.write_all(&frame).unwrap();
        conn.step().unwrap();

        let mut buf = [0u8; 256];
        let mut n = 0;
        for _ in 0..20 {
            match client.read(&mut buf) {
                Ok(k) if k > 0 => {
                    n = k;
                    break;
                }
                _ => std::thread::sleep(Duration::from_millis(10)),
            }
        }
        assert!(n > 0);
        let mut echoed = buf[..n].to_vec();
        let decoded = crate::websocket::frame::decode_frame(&mut echoed, false).unwrap().unwrap();
        assert_eq!(decoded.payload, b"ping");
    }
}
