//! HTTP request method.
//!
//! Unknown methods are preserved verbatim as an offset/length range into
//! the parser's buffer rather than rejected -- the wire contract makes
//! no enumeration check at the parser boundary.

/// Enum representing HTTP request methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Options,
    Get,
    Head,
    Post,
    Put,
    Patch,
    Delete,
    Trace,
    Connect,
    /// Any token not recognized above, as a range into the source buffer.
    Other(usize, usize),
}

impl Method {
    pub fn parse(token: &[u8], start: usize) -> Method {
        match token {
            b"OPTIONS" => Method::Options,
            b"GET" => Method::Get,
            b"HEAD" => Method::Head,
            b"POST" => Method::Post,
            b"PUT" => Method::Put,
            b"PATCH" => Method::Patch,
            b"DELETE" => Method::Delete,
            b"TRACE" => Method::Trace,
            b"CONNECT" => Method::Connect,
            other => Method::Other(start, start + other.len()),
        }
    }

    pub fn as_str<'a>(&self, buf: &'a [u8]) -> &'a str {
        match *self {
            Method::Options => "OPTIONS",
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
            Method::Trace => "TRACE",
            Method::Connect => "CONNECT",
            Method::Other(a, b) => {
                std::str::from_utf8(&buf[a..b]).unwrap_or("")
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn recognizes_known_verbs() {
        assert_eq!(Method::parse(b"GET", 0), Method::Get);
        assert_eq!(Method::parse(b"POST", 0), Method::Post);
    }

    #[test]
    fn preserves_unknown_verbs_verbatim() {
        let buf = b"PROPFIND /x HTTP/1.1\r\n";
        let m = Method::parse(b"PROPFIND", 0);
        match m {
            Method::Other(a, b) => assert_eq!(&buf[a..b], b"PROPFIND"),
            _ => panic!("expected Other"),
        }
    }
}
