//! Per-request client state machine:
//! `Resolving -> Connecting -> (TlsHandshake) -> Sending -> ReadingHeaders
//! -> Delivering -> Terminal`.
//!
//! `Resolving`/`Connecting` collapse into one synchronous step here:
//! `TcpTransport::connect` performs DNS and the TCP handshake with a
//! blocking call (the documented liveness caveat), so by the time a
//! `Context` exists the transport is already connected and only the
//! non-blocking phases from `Sending` onward are driven by `step`.
//! `ReadingHeaders`/`ReadingBody` also collapse: the wire parser only
//! succeeds once the whole message, body included, is in the buffer, so
//! there is no separate point to suspend between them.
//!
//! State transitions mem::replace the field with `State::Void` while
//! deciding the next state, the same sentinel trick the teacher's
//! `client/connect.rs` uses for its `Sink` impl.

use std::mem;

use crate::client::config::Config;
use crate::client::cookie::CookieJar;
use crate::client::redirect::redirect_method;
use crate::error::{Error, Result};
use crate::pool::{Origin, Pool, PooledTransport};
use crate::transport::{would_block, Transport};
use crate::wire::serialize::RequestBuilder;
use crate::wire::{Method, Response};

enum State {
    Sending { written: usize },
    Reading,
    Terminal,
    Void,
}

/// An owned copy of a response, detached from the read buffer it was
/// parsed from -- needed because the buffer is reused/dropped once the
/// context is done, but callers frequently want to hold on to the
/// result past that point.
pub struct OwnedResponse {
    pub status: u16,
    pub reason: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    pub keep_alive: bool,
}

impl<'a> From<Response<'a>> for OwnedResponse {
    fn from(resp: Response<'a>) -> OwnedResponse {
        OwnedResponse {
            status: resp.status,
            reason: resp.reason().to_string(),
            headers: resp.headers().map(|(k, v)| (k.to_string(), String::from_utf8_lossy(v).into_owned())).collect(),
            body: resp.body().to_vec(),
            keep_alive: resp.is_keep_alive(),
        }
    }
}

pub struct Context {
    transport: PooledTransport,
    origin: Origin,
    method: Method,
    out: Vec<u8>,
    read_buf: Vec<u8>,
    read_len: usize,
    max_size: usize,
    state: State,
}

impl Context {
    pub fn new(
        transport: PooledTransport,
        origin: Origin,
        method: Method,
        request_bytes: Vec<u8>,
        config: &Config,
    ) -> Context {
        Context {
            transport: transport,
            origin: origin,
            method: method,
            out: request_bytes,
            read_buf: vec![0u8; config.read_buffer_size],
            read_len: 0,
            max_size: config.max_response_size,
            state: State::Sending { written: 0 },
        }
    }

    pub fn raw_fd(&self) -> crate::reactor::RawFd {
        self.transport.raw_fd()
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.state, State::Terminal)
    }

    /// Drive as far as possible without blocking. Returns `Ok(true)` once
    /// a full response has been parsed (call `finish` to retrieve it),
    /// `Ok(false)` if it parked on I/O and needs to be re-polled once the
    /// reactor reports the socket ready again.
    pub fn step(&mut self) -> Result<bool> {
        loop {
            match mem::replace(&mut self.state, State::Void) {
                State::Sending { mut written } => {
                    match self.transport.write(&self.out[written..]) {
                        Ok(n) => {
                            written += n;
                            if written >= self.out.len() {
                                self.state = State::Reading;
                            } else {
                                self.state = State::Sending { written: written };
                                return Ok(false);
                            }
                        }
                        Err(ref e) if would_block(e) => {
                            self.state = State::Sending { written: written };
                            return Ok(false);
                        }
                        Err(e) => return Err(e),
                    }
                }
                State::Reading => {
                    if self.read_len == self.read_buf.len() {
                        if self.read_buf.len() >= self.max_size {
                            return Err(Error::AllocBufferTooSmall);
                        }
                        let grow = (self.read_buf.len() * 2).min(self.max_size);
                        self.read_buf.resize(grow, 0);
                    }
                    match self.transport.read(&mut self.read_buf[self.read_len..]) {
                        Ok(0) => {
                            self.state = State::Reading;
                            return self.try_parse(true);
                        }
                        Ok(n) => {
                            self.read_len += n;
                            self.state = State::Reading;
                            match self.try_parse(false)? {
                                true => return Ok(true),
                                false => continue,
                            }
                        }
                        Err(ref e) if would_block(e) => {
                            self.state = State::Reading;
                            return Ok(false);
                        }
                        Err(e) => return Err(e),
                    }
                }
                State::Terminal => {
                    self.state = State::Terminal;
                    return Ok(true);
                }
                State::Void => unreachable!("state left in transient Void"),
            }
        }
    }

    fn try_parse(&mut self, eof: bool) -> Result<bool> {
        match Response::parse(&mut self.read_buf[..self.read_len], eof) {
            Ok(crate::wire::Parsed::Complete(_, _)) => {
                self.state = State::Terminal;
                Ok(true)
            }
            Ok(crate::wire::Parsed::Incomplete) => {
                if eof {
                    Err(Error::ParseIncomplete)
                } else {
                    Ok(false)
                }
            }
            Err(e) => Err(e),
        }
    }

    /// Parse the completed response and consume the context, returning
    /// the transport for pool return/close decisions.
    pub fn finish(mut self) -> Result<(OwnedResponse, PooledTransport)> {
        let resp = match Response::parse(&mut self.read_buf[..self.read_len], true) {
            Ok(crate::wire::Parsed::Complete(resp, _)) => OwnedResponse::from(resp),
            Ok(crate::wire::Parsed::Incomplete) => return Err(Error::Internal("finish called before response complete")),
            Err(e) => return Err(e),
        };
        Ok((resp, self.transport))
    }

    pub fn origin(&self) -> &Origin {
        &self.origin
    }

    pub fn method(&self) -> Method {
        self.method
    }
}

/// Build the request bytes for `method path` against `origin`, injecting
/// `Host`, `User-Agent`, and (when the jar has matching cookies) `Cookie`.
pub fn build_request(
    method: &'static str,
    path: &str,
    origin: &Origin,
    extra_headers: &[(&str, &str)],
    body: &[u8],
    cookies: Option<&CookieJar>,
) -> Vec<u8> {
    let mut builder = RequestBuilder::new(method, path).body(body);
    for &(k, v) in extra_headers {
        builder = builder.header(k, v);
    }
    let cookie_header;
    if let Some(jar) = cookies {
        if let Some(h) = jar.header_for(&origin.host, path, origin.scheme == "https") {
            cookie_header = h;
            builder = builder.header("Cookie", &cookie_header);
        }
    }
    let mut out = Vec::new();
    builder.write(Some(&origin.host), true, &mut out);
    out
}

/// Decide what to do with a transport after delivering `response`: put
/// it back in the pool if keep-aliveable, otherwise let it drop (closing
/// the socket).
pub fn recycle(pool: &mut Pool, origin: Origin, response: &OwnedResponse, transport: PooledTransport) {
    if response.keep_alive {
        pool.put(origin, transport);
    }
}

/// Whether `status` should trigger a follow-up request, and with which
/// method, given the request that produced it.
pub fn next_redirect(status: u16, method: Method) -> Option<Method> {
    redirect_method(status, method)
}
