//! `Sec-WebSocket-Accept` computation: `Base64(SHA1(key ++ GUID))`, using
//! real cryptographic SHA-1 rather than the source's demonstrative
//! XOR-fold (a known defect the spec explicitly calls out to fix).

use base64;
use rand::{thread_rng, Rng};
use sha1::Sha1;

pub const GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Compute the `Sec-WebSocket-Accept` value for a client's
/// `Sec-WebSocket-Key` header value.
pub fn accept_key(client_key: &[u8]) -> String {
    let mut sha1 = Sha1::new();
    sha1.update(client_key);
    sha1.update(GUID.as_bytes());
    base64::encode(&sha1.digest().bytes())
}

/// Generate a fresh, random `Sec-WebSocket-Key` for a client handshake.
pub fn generate_key() -> String {
    let mut bytes = [0u8; 16];
    thread_rng().fill_bytes(&mut bytes);
    base64::encode(&bytes)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn matches_rfc6455_example() {
        assert_eq!(accept_key(b"dGhlIHNhbXBsZSBub25jZQ=="), "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=");
    }

    #[test]
    fn generated_key_is_24_chars_base64() {
        let key = generate_key();
        assert_eq!(key.len(), 24);
        assert!(base64::decode(&key).is_ok());
    }
}
