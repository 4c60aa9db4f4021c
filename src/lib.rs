//! An embeddable HTTP/1.1 networking core: a backend-polymorphic
//! reactor, a zero-copy wire parser, a connection-pooled client and a
//! route-dispatching server, with optional TLS and WebSocket upgrade.
//!
//! Nothing here spawns a thread or assumes an async runtime -- every
//! state machine ([`client::Context`], [`server::connection::Connection`])
//! advances one non-blocking `step()` at a time, driven by whatever
//! [`reactor::Reactor`] the embedding application runs.
#![recursion_limit = "100"]

extern crate httparse;
#[macro_use(quick_error)]
extern crate quick_error;
#[macro_use]
extern crate matches;
#[macro_use]
extern crate log;
extern crate base64;
extern crate byteorder;
extern crate flate2;
extern crate rand;
extern crate sha1;
#[cfg(feature = "date_header")]
extern crate httpdate;
#[cfg(feature = "tls")]
extern crate rustls;
#[cfg(feature = "tls")]
extern crate webpki;
#[cfg(feature = "tls")]
extern crate webpki_roots;
#[cfg(unix)]
extern crate libc;
#[cfg(windows)]
extern crate winapi;

pub mod client;
pub mod error;
pub mod pool;
pub mod reactor;
pub mod server;
pub mod transport;
pub mod websocket;
pub mod wire;

pub use client::Client;
pub use error::{Error, Result};
pub use reactor::Reactor;
pub use server::Server;
pub use wire::{Method, Request, Response};
