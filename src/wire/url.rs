//! Minimal URL parser for `scheme://host[:port][/path][?query][#fragment]`.
//!
//! Only `http` and `https` are accepted, matching the wire contract; IPv6
//! bracketed literals are out of scope. Fields borrow from the input
//! buffer rather than allocating, the same offset/length discipline used
//! by the request and response parsers.

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Http,
    Https,
}

impl Scheme {
    pub fn default_port(&self) -> u16 {
        match *self {
            Scheme::Http => 80,
            Scheme::Https => 443,
        }
    }

    pub fn is_tls(&self) -> bool {
        matches!(self, Scheme::Https)
    }
}

/// A parsed URL borrowing its text fields from the caller's buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Url<'a> {
    pub scheme: Scheme,
    pub host: &'a str,
    pub port: u16,
    pub path: &'a str,
    pub query: Option<&'a str>,
    pub fragment: Option<&'a str>,
}

impl<'a> Url<'a> {
    /// Parse `input`. Percent-decoding is never performed, matching the
    /// request-target contract.
    pub fn parse(input: &'a str) -> Result<Url<'a>> {
        let (scheme, rest) = split_scheme(input)?;
        let rest = rest
            .strip_prefix("//")
            .ok_or(Error::ParseInvalidUrl)?;

        // Split off fragment, then query, then find the end of the
        // authority (host[:port]) at the first '/', '?' or '#'.
        let authority_end = rest
            .find(|c| c == '/' || c == '?' || c == '#')
            .unwrap_or(rest.len());
        let authority = &rest[..authority_end];
        let mut tail = &rest[authority_end..];

        let (host, port) = split_authority(authority, scheme)?;

        let fragment = if let Some(pos) = tail.find('#') {
            let f = &tail[pos + 1..];
            tail = &tail[..pos];
            Some(f)
        } else {
            None
        };

        let query = if let Some(pos) = tail.find('?') {
            let q = &tail[pos + 1..];
            tail = &tail[..pos];
            Some(q)
        } else {
            None
        };

        let path = if tail.is_empty() { "/" } else { tail };

        Ok(Url {
            scheme: scheme,
            host: host,
            port: port,
            path: path,
            query: query,
            fragment: fragment,
        })
    }
}

fn split_scheme(input: &str) -> Result<(Scheme, &str)> {
    let pos = input.find("://").ok_or(Error::ParseInvalidUrl)?;
    let scheme = match &input[..pos] {
        s if s.eq_ignore_ascii_case("http") => Scheme::Http,
        s if s.eq_ignore_ascii_case("https") => Scheme::Https,
        _ => return Err(Error::ParseInvalidUrl),
    };
    Ok((scheme, &input[pos + 3..]))
}

fn split_authority(authority: &str, scheme: Scheme) -> Result<(&str, u16)> {
    if authority.is_empty() {
        return Err(Error::ParseInvalidUrl);
    }
    match authority.rfind(':') {
        Some(pos) => {
            let host = &authority[..pos];
            let port_str = &authority[pos + 1..];
            if host.is_empty() {
                return Err(Error::ParseInvalidUrl);
            }
            let port: u16 = port_str.parse().map_err(|_| Error::ParseInvalidUrl)?;
            if port == 0 {
                return Err(Error::ParseInvalidUrl);
            }
            Ok((host, port))
        }
        None => Ok((authority, scheme.default_port())),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parses_full_url() {
        let u = Url::parse("https://api.example.com:8443/v1/users?limit=10#top").unwrap();
        assert_eq!(u.scheme, Scheme::Https);
        assert_eq!(u.host, "api.example.com");
        assert_eq!(u.port, 8443);
        assert_eq!(u.path, "/v1/users");
        assert_eq!(u.query, Some("limit=10"));
        assert_eq!(u.fragment, Some("top"));
    }

    #[test]
    fn default_ports_applied_only_when_absent() {
        let http = Url::parse("http://example.com/").unwrap();
        assert_eq!(http.port, 80);
        let https = Url::parse("https://example.com/").unwrap();
        assert_eq!(https.port, 443);
        let explicit = Url::parse("http://example.com:8080/").unwrap();
        assert_eq!(explicit.port, 8080);
    }

    #[test]
    fn defaults_path_to_slash() {
        let u = Url::parse("http://example.com").unwrap();
        assert_eq!(u.path, "/");
    }

    #[test]
    fn rejects_other_schemes() {
        assert!(matches!(Url::parse("ftp://example.com/"), Err(Error::ParseInvalidUrl)));
        assert!(matches!(Url::parse("example.com/"), Err(Error::ParseInvalidUrl)));
    }

    #[test]
    fn rejects_out_of_range_port() {
        assert!(Url::parse("http://example.com:0/").is_err());
        assert!(Url::parse("http://example.com:99999/").is_err());
    }
}
