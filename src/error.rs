//! Error taxonomy shared by every layer of the core.
//!
//! One enum covers parse, network, memory, file, server, client, reactor
//! and TLS failures so that callers crossing layer boundaries (the client
//! handing a socket error to its response callback, the server turning a
//! parse error into a 400) don't have to juggle several error types.

use std::cell::RefCell;
use std::fmt;
use std::io;
use std::str::Utf8Error;

use httparse;

quick_error! {
    #[derive(Debug)]
    pub enum Error {
        // -- parse --
        /// The request line, status line or a header could not be parsed.
        ParseInvalidRequest {
            description("invalid HTTP request format")
        }
        ParseInvalidMethod {
            description("invalid or unsupported HTTP method")
        }
        ParseInvalidUrl {
            description("invalid URL format")
        }
        ParseInvalidHeader {
            description("invalid HTTP header format")
        }
        ParseBodyTooLarge {
            description("request body exceeds maximum size")
        }
        ParseIncomplete {
            description("incomplete HTTP message")
        }
        Httparse(err: httparse::Error) {
            description("header parse error")
            display("header parse error: {}", err)
            from()
        }
        InvalidChunkSize(err: httparse::InvalidChunkSize) {
            description("invalid chunk size")
            display("invalid chunk size: {}", err)
            from()
        }
        InvalidUtf8(err: Utf8Error) {
            description("invalid utf-8 in text frame")
            display("invalid utf-8: {}", err)
            from()
        }

        // -- network --
        NetSocketCreate {
            description("failed to create socket")
        }
        NetSocketBind {
            description("failed to bind socket to address")
        }
        NetSocketListen {
            description("failed to listen on socket")
        }
        NetSocketAccept {
            description("failed to accept connection")
        }
        NetSocketConnect {
            description("failed to connect to remote host")
        }
        NetSend {
            description("failed to send data")
        }
        NetRecv {
            description("failed to receive data")
        }
        NetTimeout {
            description("network operation timed out")
        }
        NetConnectionClosed {
            description("connection closed by peer")
        }
        NetDnsLookup {
            description("DNS lookup failed")
        }
        NetInvalidAddress {
            description("invalid network address")
        }
        Io(err: io::Error) {
            description("I/O error")
            display("I/O error: {}", err)
            from()
        }

        // -- memory --
        AllocBufferTooSmall {
            description("buffer too small for operation")
        }

        // -- server --
        ServerInit {
            description("server initialization failed")
        }
        ServerStart {
            description("server failed to start")
        }
        ServerDuplicateRoute {
            description("route already registered")
        }
        ServerNoHandler {
            description("no handler matched the request")
        }
        ServerMaxConnections {
            description("server connection limit reached")
        }

        // -- client --
        ClientInit {
            description("client initialization failed")
        }
        ClientRequestBuild {
            description("failed to build request")
        }
        ClientResponseParse {
            description("failed to parse response")
        }
        ClientRedirectLimit {
            description("redirect limit exceeded")
        }

        // -- reactor --
        LoopInit {
            description("event loop initialization failed")
        }
        LoopAddFd {
            description("failed to register descriptor with reactor")
        }
        LoopModFd {
            description("failed to modify descriptor interest")
        }
        LoopDelFd {
            description("failed to remove descriptor from reactor")
        }
        LoopWait {
            description("reactor wait failed")
        }
        LoopBackendUnsupported {
            description("reactor backend not supported on this platform")
        }

        // -- TLS --
        SslInit {
            description("TLS initialization failed")
        }
        SslHandshake {
            description("TLS handshake failed")
        }
        SslCertVerify {
            description("TLS certificate verification failed")
        }

        // -- websocket --
        WebsocketProtocol {
            description("websocket protocol error")
        }
        WebsocketTooLarge {
            description("websocket message exceeds configured limit")
        }

        // -- generic --
        InvalidArgument(msg: &'static str) {
            description("invalid argument")
            display("invalid argument: {}", msg)
        }
        NotImplemented {
            description("not implemented")
        }
        Internal(msg: &'static str) {
            description("internal error")
            display("internal error: {}", msg)
        }
    }
}

pub type Result<T> = ::std::result::Result<T, Error>;

thread_local! {
    static LAST_ERROR: RefCell<Option<String>> = RefCell::new(None);
}

/// Record an error for callers that cannot propagate one directly
/// (mirrors `cwh_set_last_error` from the C original's FFI surface).
pub fn set_last_error<E: fmt::Display>(err: E) {
    LAST_ERROR.with(|cell| {
        *cell.borrow_mut() = Some(err.to_string());
    });
}

/// Fetch (and clear) the last thread-local error, if any was recorded.
pub fn take_last_error() -> Option<String> {
    LAST_ERROR.with(|cell| cell.borrow_mut().take())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn displays_readable_message() {
        let e = Error::ParseIncomplete;
        assert_eq!(format!("{}", e), "incomplete HTTP message");
    }

    #[test]
    fn thread_local_last_error_roundtrips() {
        assert_eq!(take_last_error(), None);
        set_last_error(Error::NetTimeout);
        assert_eq!(take_last_error().as_deref(), Some("network operation timed out"));
        assert_eq!(take_last_error(), None);
    }
}
