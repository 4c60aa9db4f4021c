//! Per-connection WebSocket state machine: `Open` -> `Closing` -> `Closed`,
//! fragment reassembly, PING/PONG, and the CLOSE handshake.
//!
//! Grounded in the teacher's `zero_copy.rs` framing plus `dispatcher.rs`'s
//! control-frame handling, but genuinely extended: the teacher rejects any
//! non-final data frame (`ErrorEnum::Fragmented`); this reassembles
//! CONTINUATION sequences into a single message instead.

use std::str;

use crate::error::{Error, Result};
use crate::websocket::frame::{
    decode_frame, encode_close, encode_frame, OP_BINARY, OP_CLOSE, OP_CONTINUATION, OP_PING, OP_PONG, OP_TEXT,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Client,
    Server,
}

impl Role {
    /// Client->server frames must be masked; server->client frames must not.
    fn sends_masked(self) -> bool {
        self == Role::Client
    }

    fn expects_masked(self) -> bool {
        self == Role::Server
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum State {
    Open,
    Closing,
    Closed,
}

#[derive(Debug, PartialEq, Eq)]
pub enum Message {
    Text(String),
    Binary(Vec<u8>),
}

/// Result of feeding one chunk of bytes to the connection: zero or more
/// complete messages, plus bytes the caller should write out (PONGs,
/// CLOSE echoes) before the next read.
pub struct Delivery {
    pub messages: Vec<Message>,
    pub outbound: Vec<u8>,
}

pub struct Connection {
    role: Role,
    state: State,
    max_message_size: usize,
    fragment_opcode: Option<u8>,
    fragment_buf: Vec<u8>,
}

const DEFAULT_MAX_MESSAGE_SIZE: usize = 10 * 1024 * 1024;

impl Connection {
    pub fn new(role: Role) -> Connection {
        Connection {
            role: role,
            state: State::Open,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            fragment_opcode: None,
            fragment_buf: Vec::new(),
        }
    }

    pub fn with_max_message_size(mut self, size: usize) -> Connection {
        self.max_message_size = size;
        self
    }

    pub fn is_closed(&self) -> bool {
        self.state == State::Closed
    }

    /// Consume as many complete frames as `buf` holds, returning delivered
    /// messages and any bytes to write in response. `buf` is drained of
    /// the bytes consumed; leftover partial-frame bytes remain at the
    /// front for the next read.
    pub fn feed(&mut self, buf: &mut Vec<u8>) -> Result<Delivery> {
        let mut messages = Vec::new();
        let mut outbound = Vec::new();
        let mut offset = 0;

        loop {
            if self.state == State::Closed {
                break;
            }
            let decoded = match decode_frame(&mut buf[offset..], self.role.expects_masked()) {
                Ok(Some(frame)) => frame,
                Ok(None) => break,
                Err(e) => {
                    encode_close(&mut outbound, 1002, "", self.role.sends_masked());
                    self.state = State::Closed;
                    return Err(e);
                }
            };
            let header = decoded.header;
            let payload = decoded.payload.to_vec();
            offset += decoded.consumed;

            match header.opcode {
                OP_PING => {
                    encode_frame(&mut outbound, OP_PONG, &payload, self.role.sends_masked());
                }
                OP_PONG => {}
                OP_CLOSE => {
                    let code = if payload.len() >= 2 { ((payload[0] as u16) << 8) | payload[1] as u16 } else { 1005 };
                    match self.state {
                        State::Open => {
                            encode_close(&mut outbound, code, "", self.role.sends_masked());
                            self.state = State::Closed;
                        }
                        State::Closing => {
                            self.state = State::Closed;
                        }
                        State::Closed => {}
                    }
                }
                OP_TEXT | OP_BINARY => {
                    if !header.fin {
                        self.fragment_opcode = Some(header.opcode);
                        self.fragment_buf.clear();
                        self.fragment_buf.extend_from_slice(&payload);
                        if self.fragment_buf.len() > self.max_message_size {
                            self.fail_too_large(&mut outbound);
                            return Err(Error::WebsocketTooLarge);
                        }
                    } else {
                        messages.push(self.build_message(header.opcode, payload, &mut outbound)?);
                    }
                }
                OP_CONTINUATION => {
                    let opcode = match self.fragment_opcode {
                        Some(op) => op,
                        None => {
                            encode_close(&mut outbound, 1002, "", self.role.sends_masked());
                            self.state = State::Closed;
                            return Err(Error::WebsocketProtocol);
                        }
                    };
                    self.fragment_buf.extend_from_slice(&payload);
                    if self.fragment_buf.len() > self.max_message_size {
                        self.fail_too_large(&mut outbound);
                        return Err(Error::WebsocketTooLarge);
                    }
                    if header.fin {
                        let assembled = std::mem::take(&mut self.fragment_buf);
                        self.fragment_opcode = None;
                        messages.push(self.build_message(opcode, assembled, &mut outbound)?);
                    }
                }
                _ => {
                    encode_close(&mut outbound, 1002, "", self.role.sends_masked());
                    self.state = State::Closed;
                    return Err(Error::WebsocketProtocol);
                }
            }
        }

        buf.drain(0..offset);
        Ok(Delivery { messages: messages, outbound: outbound })
    }

    fn build_message(&mut self, opcode: u8, payload: Vec<u8>, outbound: &mut Vec<u8>) -> Result<Message> {
        if opcode == OP_TEXT {
            match String::from_utf8(payload) {
                Ok(text) => Ok(Message::Text(text)),
                Err(_) => {
                    encode_close(outbound, 1007, "", self.role.sends_masked());
                    self.state = State::Closed;
                    Err(Error::WebsocketProtocol)
                }
            }
        } else {
            Ok(Message::Binary(payload))
        }
    }

    fn fail_too_large(&mut self, outbound: &mut Vec<u8>) {
        encode_close(outbound, 1009, "", self.role.sends_masked());
        self.state = State::Closed;
        self.fragment_buf.clear();
        self.fragment_opcode = None;
    }

    /// Begin a graceful close: encode an outgoing CLOSE frame and move to
    /// `Closing` (a CLOSE reply from the peer then finishes the handshake).
    pub fn start_close(&mut self, code: u16, reason: &str) -> Vec<u8> {
        let mut out = Vec::new();
        encode_close(&mut out, code, reason, self.role.sends_masked());
        self.state = State::Closing;
        out
    }

    pub fn encode_text(&self, text: &str) -> Vec<u8> {
        let mut out = Vec::new();
        encode_frame(&mut out, OP_TEXT, text.as_bytes(), self.role.sends_masked());
        out
    }

    pub fn encode_binary(&self, data: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        encode_frame(&mut out, OP_BINARY, data, self.role.sends_masked());
        out
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn masked_frame(opcode: u8, payload: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        encode_frame(&mut out, opcode, payload, true);
        out
    }

    #[test]
    fn delivers_single_text_message() {
        let mut conn = Connection::new(Role::Server);
        let mut buf = masked_frame(OP_TEXT, b"hi");
        let delivery = conn.feed(&mut buf).unwrap();
        assert_eq!(delivery.messages, vec![Message::Text("hi".into())]);
        assert!(buf.is_empty());
    }

    #[test]
    fn reassembles_fragmented_message() {
        let mut conn = Connection::new(Role::Server);
        let mut buf = Vec::new();
        // first fragment: fin=0, opcode=TEXT
        let mut first = Vec::new();
        encode_frame(&mut first, OP_TEXT, b"hel", true);
        first[0] &= !0x80; // clear FIN
        buf.extend_from_slice(&first);
        let mut last = Vec::new();
        encode_frame(&mut last, OP_CONTINUATION, b"lo", true);
        buf.extend_from_slice(&last);

        let delivery = conn.feed(&mut buf).unwrap();
        assert_eq!(delivery.messages, vec![Message::Text("hello".into())]);
    }

    #[test]
    fn answers_ping_with_pong() {
        let mut conn = Connection::new(Role::Server);
        let mut buf = masked_frame(OP_PING, b"ping-payload");
        let delivery = conn.feed(&mut buf).unwrap();
        assert!(delivery.messages.is_empty());
        assert_eq!(&delivery.outbound[0..2], &[0x8A, 0x0C]);
    }

    #[test]
    fn close_from_open_echoes_and_closes() {
        let mut conn = Connection::new(Role::Server);
        let mut buf = masked_frame(OP_CLOSE, &[0x03, 0xE8]); // 1000
        let delivery = conn.feed(&mut buf).unwrap();
        assert!(conn.is_closed());
        assert_eq!(delivery.outbound[0] & 0x0F, OP_CLOSE);
    }

    #[test]
    fn continuation_without_start_is_protocol_error() {
        let mut conn = Connection::new(Role::Server);
        let mut buf = masked_frame(OP_CONTINUATION, b"oops");
        assert!(matches!(conn.feed(&mut buf), Err(Error::WebsocketProtocol)));
        assert!(conn.is_closed());
    }

    #[test]
    fn oversize_fragmented_message_is_rejected() {
        let mut conn = Connection::new(Role::Server).with_max_message_size(4);
        let mut first = Vec::new();
        encode_frame(&mut first, OP_TEXT, b"hello", true);
        first[0] &= !0x80;
        let mut buf = first;
        assert!(matches!(conn.feed(&mut buf), Err(Error::WebsocketTooLarge)));
        assert!(conn.is_closed());
    }
}
