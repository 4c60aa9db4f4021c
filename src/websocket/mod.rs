//! WebSocket support: the RFC 6455 handshake, frame codec, and the
//! per-connection state machine used by both the client and server sides.

pub mod connection;
pub mod frame;
pub mod handshake;

pub use self::connection::{Connection, Delivery, Message, Role, State};
pub use self::frame::{decode_frame, encode_close, encode_frame, FrameHeader};
pub use self::handshake::{accept_key, generate_key};
