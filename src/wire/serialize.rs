//! Request/response serialization: the write side of the wire codec.
//!
//! Mirrors the parser's naming but works the other way, building a
//! `Vec<u8>` rather than tokenizing one. Auto-injects `Host`,
//! `User-Agent`, `Accept`, `Content-Length` and `Connection` on the
//! request side, and `Date` and `Content-Length`/`Connection` on the
//! response side, the way the client and server contracts require, so
//! callers only ever supply the headers that make their request/
//! response distinct.

use crate::wire::url::Url;

/// Default `Accept` sent by the client when the caller doesn't supply one.
pub const DEFAULT_ACCEPT: &str = "*/*";

/// Default `User-Agent` sent by the client when the caller doesn't
/// supply one.
pub const DEFAULT_USER_AGENT: &str = concat!("reactix-http/", env!("CARGO_PKG_VERSION"));

pub struct RequestBuilder<'a> {
    method: &'a str,
    path: &'a str,
    query: Option<&'a str>,
    version_minor: u8,
    headers: Vec<(&'a str, &'a str)>,
    body: &'a [u8],
}

impl<'a> RequestBuilder<'a> {
    pub fn new(method: &'a str, path: &'a str) -> RequestBuilder<'a> {
        RequestBuilder {
            method: method,
            path: path,
            query: None,
            version_minor: 1,
            headers: Vec::new(),
            body: b"",
        }
    }

    pub fn for_url(method: &'a str, url: &Url<'a>) -> RequestBuilder<'a> {
        RequestBuilder::new(method, url.path).query(url.query)
    }

    pub fn query(mut self, query: Option<&'a str>) -> Self {
        self.query = query;
        self
    }

    pub fn version_minor(mut self, v: u8) -> Self {
        self.version_minor = v;
        self
    }

    pub fn header(mut self, name: &'a str, value: &'a str) -> Self {
        self.headers.push((name, value));
        self
    }

    pub fn body(mut self, body: &'a [u8]) -> Self {
        self.body = body;
        self
    }

    fn has_header(&self, name: &str) -> bool {
        self.headers.iter().any(|(n, _)| n.eq_ignore_ascii_case(name))
    }

    /// Serialize into `out`, auto-injecting `Host` (when `host` is
    /// given and the caller didn't already set one), `User-Agent`,
    /// `Content-Length` and `Connection: close`/`keep-alive`.
    pub fn write(&self, host: Option<&str>, keep_alive: bool, out: &mut Vec<u8>) {
        out.extend_from_slice(self.method.as_bytes());
        out.push(b' ');
        out.extend_from_slice(self.path.as_bytes());
        if let Some(q) = self.query {
            out.push(b'?');
            out.extend_from_slice(q.as_bytes());
        }
        out.extend_from_slice(format!(" HTTP/1.{}\r\n", self.version_minor).as_bytes());

        if let Some(h) = host {
            if !self.has_header("Host") {
                out.extend_from_slice(format!("Host: {}\r\n", h).as_bytes());
            }
        }
        if !self.has_header("User-Agent") {
            out.extend_from_slice(format!("User-Agent: {}\r\n", DEFAULT_USER_AGENT).as_bytes());
        }
        if !self.has_header("Accept") {
            out.extend_from_slice(format!("Accept: {}\r\n", DEFAULT_ACCEPT).as_bytes());
        }
        for (name, value) in &self.headers {
            out.extend_from_slice(name.as_bytes());
            out.extend_from_slice(b": ");
            out.extend_from_slice(value.as_bytes());
            out.extend_from_slice(b"\r\n");
        }
        if !self.has_header("Content-Length") && !self.body.is_empty() {
            out.extend_from_slice(format!("Content-Length: {}\r\n", self.body.len()).as_bytes());
        }
        if !self.has_header("Connection") {
            out.extend_from_slice(if keep_alive { b"Connection: keep-alive\r\n" } else { b"Connection: close\r\n" });
        }
        out.extend_from_slice(b"\r\n");
        out.extend_from_slice(self.body);
    }
}

pub struct ResponseBuilder<'a> {
    status: u16,
    reason: Option<&'a str>,
    version_minor: u8,
    headers: Vec<(&'a str, &'a str)>,
    body: &'a [u8],
}

impl<'a> ResponseBuilder<'a> {
    pub fn new(status: u16) -> ResponseBuilder<'a> {
        ResponseBuilder {
            status: status,
            reason: None,
            version_minor: 1,
            headers: Vec::new(),
            body: b"",
        }
    }

    pub fn reason(mut self, reason: &'a str) -> Self {
        self.reason = Some(reason);
        self
    }

    pub fn header(mut self, name: &'a str, value: &'a str) -> Self {
        self.headers.push((name, value));
        self
    }

    pub fn body(mut self, body: &'a [u8]) -> Self {
        self.body = body;
        self
    }

    fn has_header(&self, name: &str) -> bool {
        self.headers.iter().any(|(n, _)| n.eq_ignore_ascii_case(name))
    }

    pub fn write(&self, keep_alive: bool, out: &mut Vec<u8>) {
        let reason = self
            .reason
            .unwrap_or_else(|| crate::wire::status::reason_phrase(self.status));
        out.extend_from_slice(format!("HTTP/1.{} {} {}\r\n", self.version_minor, self.status, reason).as_bytes());
        if !self.has_header("Date") {
            if let Some(date) = current_http_date() {
                out.extend_from_slice(format!("Date: {}\r\n", date).as_bytes());
            }
        }
        for (name, value) in &self.headers {
            out.extend_from_slice(name.as_bytes());
            out.extend_from_slice(b": ");
            out.extend_from_slice(value.as_bytes());
            out.extend_from_slice(b"\r\n");
        }
        if !self.has_header("Content-Length") {
            out.extend_from_slice(format!("Content-Length: {}\r\n", self.body.len()).as_bytes());
        }
        if !self.has_header("Connection") {
            out.extend_from_slice(if keep_alive { b"Connection: keep-alive\r\n" } else { b"Connection: close\r\n" });
        }
        out.extend_from_slice(b"\r\n");
        out.extend_from_slice(self.body);
    }
}

#[cfg(feature = "date_header")]
fn current_http_date() -> Option<String> {
    Some(httpdate::fmt_http_date(std::time::SystemTime::now()))
}

#[cfg(not(feature = "date_header"))]
fn current_http_date() -> Option<String> {
    None
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn builds_simple_get() {
        let mut out = Vec::new();
        RequestBuilder::new("GET", "/v1/users")
            .query(Some("limit=10"))
            .write(Some("api.example.com"), true, &mut out);
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("GET /v1/users?limit=10 HTTP/1.1\r\n"));
        assert!(text.contains("Host: api.example.com\r\n"));
        assert!(text.contains("Connection: keep-alive\r\n"));
        assert!(text.ends_with("\r\n\r\n"));
    }

    #[test]
    fn caller_header_suppresses_auto_injection() {
        let mut out = Vec::new();
        RequestBuilder::new("GET", "/")
            .header("Host", "custom.example")
            .write(Some("ignored.example"), true, &mut out);
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text.matches("Host:").count(), 1);
        assert!(text.contains("Host: custom.example\r\n"));
    }

    #[test]
    fn request_body_sets_content_length() {
        let mut out = Vec::new();
        RequestBuilder::new("POST", "/x").body(b"hello").write(None, false, &mut out);
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("Content-Length: 5\r\n"));
        assert!(text.contains("Connection: close\r\n"));
        assert!(text.ends_with("hello"));
    }

    #[test]
    fn builds_response_with_default_reason() {
        let mut out = Vec::new();
        ResponseBuilder::new(200).body(b"ok").write(true, &mut out);
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(text.contains("Content-Length: 2\r\n"));
        assert!(text.ends_with("ok"));
    }

    #[test]
    fn request_gets_default_accept_header() {
        let mut out = Vec::new();
        RequestBuilder::new("GET", "/").write(None, true, &mut out);
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("Accept: */*\r\n"));
    }

    #[test]
    fn caller_accept_header_suppresses_default() {
        let mut out = Vec::new();
        RequestBuilder::new("GET", "/").header("Accept", "application/json").write(None, true, &mut out);
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text.matches("Accept:").count(), 1);
        assert!(text.contains("Accept: application/json\r\n"));
    }

    #[cfg(feature = "date_header")]
    #[test]
    fn response_gets_a_date_header() {
        let mut out = Vec::new();
        ResponseBuilder::new(200).body(b"ok").write(true, &mut out);
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("Date: "));
    }

    #[test]
    fn caller_date_header_suppresses_default() {
        let mut out = Vec::new();
        ResponseBuilder::new(200).header("Date", "fixed").body(b"ok").write(true, &mut out);
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text.matches("Date:").count(), 1);
        assert!(text.contains("Date: fixed\r\n"));
    }
}
