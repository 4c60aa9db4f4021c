//! Chunked transfer-coding codec (RFC 7230 §4.1).
//!
//! `decode` scans a complete (or partial) chunked byte stream and copies
//! de-chunked payload bytes into a caller-provided output buffer,
//! returning how much of the input was consumed and whether the
//! terminating `0\r\n\r\n` was seen. `encode` is the inverse, splitting a
//! payload into fixed-size chunks the way a request/response serializer
//! would.

use httparse::{self, parse_chunk_size};

use crate::error::{Error, Result};

/// Default chunk size used by the encoder (4 KiB, as suggested by the
/// wire contract).
pub const DEFAULT_CHUNK_SIZE: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeOutcome {
    /// Number of input bytes consumed.
    pub consumed: usize,
    /// Number of output bytes written to the caller's buffer.
    pub written: usize,
    /// True once the terminating `0`-size chunk and trailing CRLF were seen.
    pub done: bool,
}

/// Decode as much of `input` as forms complete chunks, writing the
/// payload bytes into `out`. Returns `Error::ParseIncomplete` only via
/// `DecodeOutcome::done == false` (decoding never fails on a merely
/// partial stream); returns `Error::InvalidChunkSize` on malformed chunk
/// framing, and `Error::AllocBufferTooSmall` if `out` cannot hold the
/// decoded payload.
pub fn decode(input: &[u8], out: &mut [u8]) -> Result<DecodeOutcome> {
    let mut in_pos = 0usize;
    let mut out_pos = 0usize;
    loop {
        if in_pos >= input.len() {
            return Ok(DecodeOutcome { consumed: in_pos, written: out_pos, done: false });
        }
        match parse_chunk_size(&input[in_pos..]) {
            Ok(httparse::Status::Complete((header_len, 0))) => {
                // Terminal chunk: still need the trailing CRLF after it.
                let after = in_pos + header_len;
                if input.len() < after + 2 {
                    return Ok(DecodeOutcome { consumed: in_pos, written: out_pos, done: false });
                }
                return Ok(DecodeOutcome { consumed: after + 2, written: out_pos, done: true });
            }
            Ok(httparse::Status::Complete((header_len, chunk_size))) => {
                let chunk_size = chunk_size as usize;
                let body_start = in_pos + header_len;
                let body_end = body_start + chunk_size;
                if input.len() < body_end + 2 {
                    return Ok(DecodeOutcome { consumed: in_pos, written: out_pos, done: false });
                }
                if out_pos + chunk_size > out.len() {
                    return Err(Error::AllocBufferTooSmall);
                }
                out[out_pos..out_pos + chunk_size]
                    .copy_from_slice(&input[body_start..body_end]);
                out_pos += chunk_size;
                in_pos = body_end + 2;
            }
            Ok(httparse::Status::Partial) => {
                return Ok(DecodeOutcome { consumed: in_pos, written: out_pos, done: false });
            }
            Err(_) => return Err(Error::InvalidChunkSize(httparse::InvalidChunkSize)),
        }
    }
}

/// Decode a complete chunked body in one call, returning an owned `Vec`.
/// Convenience wrapper over `decode` for callers that already know the
/// whole chunked stream is buffered (e.g. the response parser).
pub fn decode_all(input: &[u8]) -> Result<Vec<u8>> {
    let mut out = vec![0u8; input.len()];
    let outcome = decode(input, &mut out)?;
    if !outcome.done {
        return Err(Error::ParseIncomplete);
    }
    out.truncate(outcome.written);
    Ok(out)
}

/// Encode `payload` as a chunked byte stream using `chunk_size`-sized
/// chunks, appending to `out`.
pub fn encode(payload: &[u8], chunk_size: usize, out: &mut Vec<u8>) {
    debug_assert!(chunk_size > 0);
    for chunk in payload.chunks(chunk_size.max(1)) {
        out.extend_from_slice(format!("{:x}\r\n", chunk.len()).as_bytes());
        out.extend_from_slice(chunk);
        out.extend_from_slice(b"\r\n");
    }
    out.extend_from_slice(b"0\r\n\r\n");
}

/// Encode using the default chunk size.
pub fn encode_default(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + 16);
    encode(payload, DEFAULT_CHUNK_SIZE, &mut out);
    out
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn decodes_simple_example() {
        let input = b"5\r\nHello\r\n6\r\n World\r\n0\r\n\r\n";
        let got = decode_all(input).unwrap();
        assert_eq!(got, b"Hello World");
    }

    #[test]
    fn decode_reports_incomplete_without_erroring() {
        let input = b"5\r\nHel";
        let mut out = [0u8; 16];
        let outcome = decode(input, &mut out).unwrap();
        assert!(!outcome.done);
        assert_eq!(outcome.written, 0);
    }

    #[test]
    fn chunk_exceeding_buffer_is_rejected() {
        let input = b"5\r\nHello\r\n0\r\n\r\n";
        let mut out = [0u8; 2];
        assert!(matches!(decode(input, &mut out), Err(Error::AllocBufferTooSmall)));
    }

    #[test]
    fn round_trips_through_encode_decode() {
        let payload = b"the quick brown fox jumps over the lazy dog".repeat(200);
        let encoded = encode_default(&payload);
        let decoded = decode_all(&encoded).unwrap();
        assert_eq!(decoded, payload);
    }

    #[test]
    fn encode_matches_example() {
        let mut out = Vec::new();
        encode(b"Hello World", 6, &mut out);
        assert_eq!(out, b"6\r\nHello \r\n5\r\nWorld\r\n0\r\n\r\n");
    }
}
