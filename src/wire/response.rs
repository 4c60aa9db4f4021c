//! Status line and header parser, mirroring the request parser.
//!
//! Body delimitation: chunked takes precedence over `Content-Length`
//! (RFC 7230 §3.3.3 -- the dual-framing case the design notes call out
//! explicitly); absent both, and with the connection marked for close,
//! the body runs to EOF. `Transfer-Encoding: chunked` is decoded and
//! `Content-Encoding: gzip`/`deflate` is automatically decompressed;
//! both headers are then considered "consumed" by the caller.

use httparse;

use crate::error::{Error, Result};
use crate::wire::chunked;
use crate::wire::compress::{self, ContentEncoding};
use crate::wire::headers::{HeaderList, MAX_HEADERS};
use crate::wire::request::Parsed;

enum BodyData<'a> {
    Borrowed(&'a [u8]),
    Owned(Vec<u8>),
}

impl<'a> BodyData<'a> {
    fn as_slice(&self) -> &[u8] {
        match *self {
            BodyData::Borrowed(s) => s,
            BodyData::Owned(ref v) => v,
        }
    }
}

pub struct Response<'a> {
    buf: &'a [u8],
    pub version_minor: u8,
    pub status: u16,
    reason: (usize, usize),
    headers: HeaderList,
    body: BodyData<'a>,
}

fn offset_of(base: &[u8], sub: &[u8]) -> (usize, usize) {
    let base_ptr = base.as_ptr() as usize;
    let sub_ptr = sub.as_ptr() as usize;
    let start = sub_ptr.saturating_sub(base_ptr);
    (start, start + sub.len())
}

impl<'a> Response<'a> {
    /// Parse a response from `buf`. `eof` must be true once the
    /// transport has observed peer close, enabling the EOF-delimited
    /// body framing rule when neither chunked nor `Content-Length` is
    /// present.
    pub fn parse(buf: &'a mut [u8], eof: bool) -> Result<Parsed<Response<'a>>> {
        let mut raw_headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
        let mut parser = httparse::Response::new(&mut raw_headers);
        let header_len = match parser.parse(buf) {
            Ok(httparse::Status::Complete(n)) => n,
            Ok(httparse::Status::Partial) => return Ok(Parsed::Incomplete),
            Err(httparse::Error::TooManyHeaders) => return Err(Error::ParseInvalidHeader),
            Err(_) => return Err(Error::ParseInvalidRequest),
        };

        let status = parser.code.ok_or(Error::ParseInvalidRequest)?;
        let version = parser.version.ok_or(Error::ParseInvalidRequest)?;
        let reason_range = match parser.reason {
            Some(r) if !r.is_empty() => offset_of(buf, r.as_bytes()),
            _ => (header_len, header_len),
        };

        let mut headers = HeaderList::new();
        for h in parser.headers.iter() {
            if h.name.is_empty() && h.value.is_empty() {
                continue;
            }
            let name_range = offset_of(buf, h.name.as_bytes());
            let value_range = offset_of(buf, h.value);
            if !headers.push(name_range, value_range) {
                return Err(Error::ParseInvalidHeader);
            }
        }

        let chunked = headers
            .get(buf, "Transfer-Encoding")
            .map(crate::wire::headers::is_chunked)
            .unwrap_or(false);
        let content_length = parse_content_length(buf, &headers)?;
        let encoding = headers
            .get(buf, "Content-Encoding")
            .map(ContentEncoding::from_header)
            .unwrap_or(ContentEncoding::Identity);

        let (raw_body, total_consumed): (&[u8], usize) = if chunked {
            // Decode into scratch space first -- writing the decoded
            // payload directly over `buf[header_len..]` would clobber the
            // still-unconsumed chunked source bytes whenever the body
            // isn't fully buffered yet, corrupting the next parse attempt
            // on the same buffer.
            let tail = &buf[header_len..];
            let mut scratch = vec![0u8; tail.len()];
            let outcome = chunked::decode(tail, &mut scratch)?;
            if !outcome.done {
                return Ok(Parsed::Incomplete);
            }
            let out_start = header_len;
            buf[out_start..out_start + outcome.written].copy_from_slice(&scratch[..outcome.written]);
            (&buf[out_start..out_start + outcome.written], header_len + outcome.consumed)
        } else if let Some(len) = content_length {
            if buf.len() < header_len + len {
                return Ok(Parsed::Incomplete);
            }
            (&buf[header_len..header_len + len], header_len + len)
        } else if eof {
            (&buf[header_len..], buf.len())
        } else {
            return Ok(Parsed::Incomplete);
        };

        let body = if encoding != ContentEncoding::Identity {
            BodyData::Owned(compress::decompress(raw_body, encoding)?)
        } else {
            BodyData::Borrowed(raw_body)
        };

        let resp = Response {
            buf: &*buf,
            version_minor: version,
            status: status,
            reason: reason_range,
            headers: headers,
            body: body,
        };
        Ok(Parsed::Complete(resp, total_consumed))
    }

    pub fn reason(&self) -> &'a str {
        std::str::from_utf8(&self.buf[self.reason.0..self.reason.1]).unwrap_or("")
    }

    pub fn header(&self, name: &str) -> Option<&'a [u8]> {
        self.headers.get(self.buf, name)
    }

    pub fn headers(&self) -> impl Iterator<Item = (&'a str, &'a [u8])> + '_ {
        let buf = self.buf;
        self.headers.iter().map(move |h| {
            (
                std::str::from_utf8(&buf[h.name.0..h.name.1]).unwrap_or(""),
                &buf[h.value.0..h.value.1],
            )
        })
    }

    pub fn body(&self) -> &[u8] {
        self.body.as_slice()
    }

    pub fn is_keep_alive(&self) -> bool {
        match self.header("Connection") {
            Some(v) => !crate::wire::headers::is_close(v),
            None => self.version_minor == 1,
        }
    }
}

fn parse_content_length(buf: &[u8], headers: &HeaderList) -> Result<Option<usize>> {
    match headers.get(buf, "Content-Length") {
        Some(v) => {
            let s = std::str::from_utf8(v).map_err(|_| Error::ParseInvalidHeader)?;
            let n: usize = s.trim().parse().map_err(|_| Error::ParseInvalidHeader)?;
            Ok(Some(n))
        }
        None => Ok(None),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn content_length_complete_vs_incomplete() {
        let mut full = b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nhello".to_vec();
        match Response::parse(&mut full, false).unwrap() {
            Parsed::Complete(r, _) => assert_eq!(r.body(), b"hello"),
            Parsed::Incomplete => panic!("should be complete"),
        }
        let mut partial = b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nhel".to_vec();
        assert!(matches!(Response::parse(&mut partial, false).unwrap(), Parsed::Incomplete));
    }

    #[test]
    fn chunked_wins_over_content_length() {
        let mut buf = b"HTTP/1.1 200 OK\r\nContent-Length: 999\r\nTransfer-Encoding: chunked\r\n\r\n2\r\nok\r\n0\r\n\r\n".to_vec();
        match Response::parse(&mut buf, false).unwrap() {
            Parsed::Complete(r, _) => assert_eq!(r.body(), b"ok"),
            Parsed::Incomplete => panic!("should be complete"),
        }
    }

    #[test]
    fn eof_delimited_body_requires_eof_flag() {
        let mut buf = b"HTTP/1.1 200 OK\r\nConnection: close\r\n\r\nwhatever is left".to_vec();
        assert!(matches!(Response::parse(&mut buf, false).unwrap(), Parsed::Incomplete));
        match Response::parse(&mut buf, true).unwrap() {
            Parsed::Complete(r, _) => assert_eq!(r.body(), b"whatever is left"),
            Parsed::Incomplete => panic!("should be complete with eof"),
        }
    }

    #[test]
    fn chunked_gzip_decoded_then_decompressed() {
        use flate2::write::GzEncoder;
        use flate2::Compression;
        use std::io::Write;

        let mut enc = GzEncoder::new(Vec::new(), Compression::default());
        enc.write_all(b"ok").unwrap();
        let gz = enc.finish().unwrap();

        let mut chunked_body = Vec::new();
        chunked::encode(&gz, 4096, &mut chunked_body);

        let mut head = b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\nContent-Encoding: gzip\r\n\r\n".to_vec();
        head.extend_from_slice(&chunked_body);

        match Response::parse(&mut head, false).unwrap() {
            Parsed::Complete(r, _) => assert_eq!(r.body(), b"ok"),
            Parsed::Incomplete => panic!("should be complete"),
        }
    }
}
