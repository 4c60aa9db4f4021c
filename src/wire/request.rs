//! Request line and header parser.
//!
//! Tokenizes a caller-owned, writable byte buffer into a `Request` view
//! whose fields are offset/length ranges into that buffer -- no NUL
//! termination, no raw pointers, matching the rearchitecture note in the
//! design document. The buffer must outlive the `Request`.

use httparse;

use crate::error::{Error, Result};
use crate::wire::chunked;
use crate::wire::headers::{HeaderList, MAX_HEADERS};
use crate::wire::method::Method;

/// Outcome of a single parse attempt.
pub enum Parsed<T> {
    /// A complete message was parsed; the `usize` is how many bytes of
    /// the input buffer it consumed (headers + body, if any).
    Complete(T, usize),
    /// The buffer does not yet contain a complete message.
    Incomplete,
}

#[derive(Debug)]
pub struct Request<'a> {
    buf: &'a [u8],
    pub method: Method,
    path: (usize, usize),
    query: Option<(usize, usize)>,
    pub version_minor: u8,
    headers: HeaderList,
    body: (usize, usize),
}

fn offset_of(base: &[u8], sub: &[u8]) -> (usize, usize) {
    let base_ptr = base.as_ptr() as usize;
    let sub_ptr = sub.as_ptr() as usize;
    let start = sub_ptr.saturating_sub(base_ptr);
    (start, start + sub.len())
}

impl<'a> Request<'a> {
    /// Parse a request from `buf`. On success the body (if chunked) has
    /// been decoded in place into the tail of the returned byte range;
    /// `buf` must not be touched again until the `Request` is dropped.
    pub fn parse(buf: &'a mut [u8]) -> Result<Parsed<Request<'a>>> {
        let mut raw_headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
        let mut parser = httparse::Request::new(&mut raw_headers);
        let header_len = match parser.parse(buf) {
            Ok(httparse::Status::Complete(n)) => n,
            Ok(httparse::Status::Partial) => return Ok(Parsed::Incomplete),
            Err(httparse::Error::TooManyHeaders) => return Err(Error::ParseInvalidHeader),
            Err(_) => return Err(Error::ParseInvalidRequest),
        };

        let method_tok = parser.method.ok_or(Error::ParseInvalidRequest)?;
        let path_raw = parser.path.ok_or(Error::ParseInvalidRequest)?;
        let version = parser.version.ok_or(Error::ParseInvalidRequest)?;

        let method_start = offset_of(buf, method_tok.as_bytes()).0;
        let method = Method::parse(method_tok.as_bytes(), method_start);

        let (path_range, query_range) = split_target(buf, path_raw.as_bytes());

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

        let (body_range, total_consumed) = if chunked {
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
            ((out_start, out_start + outcome.written), header_len + outcome.consumed)
        } else {
            let body_len = content_length.unwrap_or(0);
            if buf.len() < header_len + body_len {
                return Ok(Parsed::Incomplete);
            }
            ((header_len, header_len + body_len), header_len + body_len)
        };

        let req = Request {
            buf: &*buf,
            method: method,
            path: path_range,
            query: query_range,
            version_minor: version,
            headers: headers,
            body: body_range,
        };
        Ok(Parsed::Complete(req, total_consumed))
    }

    pub fn path(&self) -> &'a str {
        std::str::from_utf8(&self.buf[self.path.0..self.path.1]).unwrap_or("")
    }

    pub fn query(&self) -> Option<&'a str> {
        self.query.map(|(a, b)| std::str::from_utf8(&self.buf[a..b]).unwrap_or(""))
    }

    pub fn method_str(&self) -> &'a str {
        self.method.as_str(self.buf)
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

    pub fn body(&self) -> &'a [u8] {
        &self.buf[self.body.0..self.body.1]
    }

    pub fn is_keep_alive(&self) -> bool {
        match self.header("Connection") {
            Some(v) => !crate::wire::headers::is_close(v),
            None => self.version_minor == 1,
        }
    }
}

fn split_target<'a>(buf: &'a [u8], target: &[u8]) -> ((usize, usize), Option<(usize, usize)>) {
    let (start, end) = offset_of(buf, target);
    match target.iter().position(|&b| b == b'?') {
        Some(pos) => ((start, start + pos), Some((start + pos + 1, end))),
        None => ((start, end), None),
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
    fn parses_simple_get() {
        let mut buf = b"GET /api/users?page=1 HTTP/1.1\r\nHost: example.com\r\nUser-Agent: x\r\n\r\n".to_vec();
        let (req, consumed) = match Request::parse(&mut buf).unwrap() {
            Parsed::Complete(r, n) => (r, n),
            Parsed::Incomplete => panic!("expected complete"),
        };
        assert_eq!(req.method, Method::Get);
        assert_eq!(req.path(), "/api/users");
        assert_eq!(req.query(), Some("page=1"));
        assert_eq!(req.body().len(), 0);
        assert_eq!(req.headers().count(), 2);
        assert_eq!(consumed, buf.len());
    }

    #[test]
    fn incomplete_without_blank_line() {
        let mut buf = b"GET / HTTP/1.1\r\nHost: x".to_vec();
        assert!(matches!(Request::parse(&mut buf).unwrap(), Parsed::Incomplete));
    }

    #[test]
    fn content_length_delimits_body() {
        let mut buf = b"POST /x HTTP/1.1\r\nHost: h\r\nContent-Length: 5\r\n\r\nhello".to_vec();
        match Request::parse(&mut buf).unwrap() {
            Parsed::Complete(r, _) => assert_eq!(r.body(), b"hello"),
            Parsed::Incomplete => panic!("should be complete"),
        }
    }

    #[test]
    fn chunked_body_is_decoded_in_place() {
        let mut buf = b"POST /x HTTP/1.1\r\nHost: h\r\nTransfer-Encoding: chunked\r\n\r\n5\r\nHello\r\n0\r\n\r\n".to_vec();
        match Request::parse(&mut buf).unwrap() {
            Parsed::Complete(r, _) => assert_eq!(r.body(), b"Hello"),
            Parsed::Incomplete => panic!("should be complete"),
        }
    }

    #[test]
    fn too_many_headers_is_rejected() {
        let mut text = String::from("GET / HTTP/1.1\r\n");
        for i in 0..40 {
            text.push_str(&format!("X-H{}: v\r\n", i));
        }
        text.push_str("\r\n");
        let mut buf = text.into_bytes();
        assert!(matches!(Request::parse(&mut buf), Err(Error::ParseInvalidHeader)));
    }

    #[test]
    fn unknown_method_preserved_verbatim() {
        let mut buf = b"PROPFIND /x HTTP/1.1\r\nHost: h\r\n\r\n".to_vec();
        match Request::parse(&mut buf).unwrap() {
            Parsed::Complete(r, _) => assert_eq!(r.method_str(), "PROPFIND"),
            Parsed::Incomplete => panic!("should be complete"),
        }
    }
}
