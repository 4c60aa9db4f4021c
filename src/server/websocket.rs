//! WebSocket upgrade predicate for the server side, grounded in the
//! teacher's original `get_handshake` (same case-insensitive header
//! checks), but producing the real `Sec-WebSocket-Accept` value via the
//! `websocket::handshake` module shared with the client/framing code
//! rather than re-deriving SHA-1 locally.

use crate::websocket::handshake::accept_key;

pub struct WebsocketUpgrade {
    pub accept: String,
    pub protocols: Vec<String>,
}

/// Per §4.6: a request qualifies for upgrade when `Upgrade: websocket`
/// and `Connection: upgrade` (case-insensitive, comma-separated) are
/// both present alongside `Sec-WebSocket-Version: 13` and a
/// `Sec-WebSocket-Key`.
pub fn check_upgrade<'a, I>(headers: I) -> Option<WebsocketUpgrade>
where
    I: Iterator<Item = (&'a str, &'a [u8])>,
{
    let mut has_upgrade_token = false;
    let mut has_connection_upgrade = false;
    let mut version_ok = false;
    let mut key: Option<&[u8]> = None;
    let mut protocols = Vec::new();

    for (name, value) in headers {
        if name.eq_ignore_ascii_case("upgrade") {
            has_upgrade_token = value.eq_ignore_ascii_case(b"websocket");
        } else if name.eq_ignore_ascii_case("connection") {
            has_connection_upgrade = String::from_utf8_lossy(value)
                .split(',')
                .any(|tok| tok.trim().eq_ignore_ascii_case("upgrade"));
        } else if name.eq_ignore_ascii_case("sec-websocket-version") {
            version_ok = value == b"13";
        } else if name.eq_ignore_ascii_case("sec-websocket-key") {
            key = Some(value);
        } else if name.eq_ignore_ascii_case("sec-websocket-protocol") {
            if let Ok(s) = std::str::from_utf8(value) {
                protocols.extend(s.split(',').map(|t| t.trim().to_string()).filter(|t| !t.is_empty()));
            }
        }
    }

    if !has_upgrade_token || !has_connection_upgrade || !version_ok {
        return None;
    }
    let key = key?;
    Some(WebsocketUpgrade { accept: accept_key(key), protocols: protocols })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::wire::{Parsed, Request};

    #[test]
    fn accepts_well_formed_upgrade_request() {
        let mut buf = b"GET /chat HTTP/1.1\r\n\
            Host: example.com\r\n\
            Upgrade: websocket\r\n\
            Connection: Upgrade\r\n\
            Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\
            Sec-WebSocket-Version: 13\r\n\r\n".to_vec();
        let req = match Request::parse(&mut buf).unwrap() {
            Parsed::Complete(r, _) => r,
            _ => panic!("expected complete"),
        };
        let upgrade = check_upgrade(req.headers()).unwrap();
        assert_eq!(upgrade.accept, "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=");
    }

    #[test]
    fn rejects_missing_upgrade_header() {
        let mut buf = b"GET / HTTP/1.1\r\nHost: x\r\n\r\n".to_vec();
        let req = match Request::parse(&mut buf).unwrap() {
            Parsed::Complete(r, _) => r,
            _ => panic!("expected complete"),
        };
        assert!(check_upgrade(req.headers()).is_none());
    }
}
