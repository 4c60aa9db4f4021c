//! Content-Encoding decompression: gzip and deflate only, matching the
//! wire contract. Encoding (compression) is out of scope -- this core
//! only ever decodes what a peer sent.

use std::io::Read;

use flate2::read::{DeflateDecoder, GzDecoder};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentEncoding {
    Identity,
    Gzip,
    Deflate,
}

impl ContentEncoding {
    pub fn from_header(value: &[u8]) -> ContentEncoding {
        if crate::wire::headers::is_gzip(value) {
            ContentEncoding::Gzip
        } else if crate::wire::headers::is_deflate(value) {
            ContentEncoding::Deflate
        } else {
            ContentEncoding::Identity
        }
    }
}

/// Decompress `input` according to `encoding`. `Identity` is a cheap
/// copy; failures of the underlying stream are surfaced uniformly as
/// `Error::ClientResponseParse` per the wire contract ("decompression
/// failure surfaces as ClientResponseParse").
pub fn decompress(input: &[u8], encoding: ContentEncoding) -> Result<Vec<u8>> {
    match encoding {
        ContentEncoding::Identity => Ok(input.to_vec()),
        ContentEncoding::Gzip => {
            let mut decoder = GzDecoder::new(input);
            let mut out = Vec::new();
            decoder.read_to_end(&mut out).map_err(|_| Error::ClientResponseParse)?;
            Ok(out)
        }
        ContentEncoding::Deflate => {
            let mut decoder = DeflateDecoder::new(input);
            let mut out = Vec::new();
            decoder.read_to_end(&mut out).map_err(|_| Error::ClientResponseParse)?;
            Ok(out)
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Write;

    #[test]
    fn identity_is_passthrough() {
        let out = decompress(b"hello", ContentEncoding::Identity).unwrap();
        assert_eq!(out, b"hello");
    }

    #[test]
    fn gzip_round_trip() {
        use flate2::write::GzEncoder;
        use flate2::Compression;
        let mut enc = GzEncoder::new(Vec::new(), Compression::default());
        enc.write_all(b"ok").unwrap();
        let compressed = enc.finish().unwrap();
        let out = decompress(&compressed, ContentEncoding::Gzip).unwrap();
        assert_eq!(out, b"ok");
    }

    #[test]
    fn deflate_round_trip() {
        use flate2::write::DeflateEncoder;
        use flate2::Compression;
        let mut enc = DeflateEncoder::new(Vec::new(), Compression::default());
        enc.write_all(b"deflated body").unwrap();
        let compressed = enc.finish().unwrap();
        let out = decompress(&compressed, ContentEncoding::Deflate).unwrap();
        assert_eq!(out, b"deflated body");
    }

    #[test]
    fn corrupt_stream_is_client_response_parse_error() {
        let err = decompress(b"not gzip data at all", ContentEncoding::Gzip).unwrap_err();
        assert!(matches!(err, Error::ClientResponseParse));
    }
}
