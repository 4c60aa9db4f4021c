//! Cookie jar: parses `Set-Cookie` responses and assembles `Cookie`
//! request headers per origin/path, grounded in `cwh_cookie_t` and the
//! `cwh_cookie_jar_*` API (`examples/original_source/include/cwebhttp.h`).

use std::collections::HashMap;
use std::time::{Duration, SystemTime};

#[derive(Debug, Clone)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    pub path: String,
    pub expires: Option<SystemTime>,
    pub secure: bool,
    pub http_only: bool,
}

impl Cookie {
    fn is_expired(&self) -> bool {
        match self.expires {
            Some(at) => SystemTime::now() > at,
            None => false,
        }
    }

    fn matches(&self, domain: &str, path: &str, is_https: bool) -> bool {
        if self.secure && !is_https {
            return false;
        }
        if !domain.ends_with(&self.domain) {
            return false;
        }
        path.starts_with(&self.path)
    }
}

/// Parse one `Set-Cookie` header value into a `Cookie`, defaulting
/// `domain`/`path` from the response's origin when the attributes are
/// absent (per RFC 6265 §5.3, simplified: no public-suffix check).
pub fn parse_set_cookie(value: &str, default_domain: &str, default_path: &str) -> Option<Cookie> {
    let mut parts = value.split(';');
    let first = parts.next()?.trim();
    let eq = first.find('=')?;
    let name = first[..eq].trim().to_string();
    let value = first[eq + 1..].trim().to_string();
    if name.is_empty() {
        return None;
    }

    let mut cookie = Cookie {
        name: name,
        value: value,
        domain: default_domain.to_string(),
        path: default_path.to_string(),
        expires: None,
        secure: false,
        http_only: false,
    };

    for attr in parts {
        let attr = attr.trim();
        if attr.is_empty() {
            continue;
        }
        let (key, val) = match attr.find('=') {
            Some(i) => (&attr[..i], Some(attr[i + 1..].trim())),
            None => (attr, None),
        };
        match key.to_ascii_lowercase().as_str() {
            "domain" => {
                if let Some(v) = val {
                    if !v.is_empty() {
                        cookie.domain = v.trim_start_matches('.').to_string();
                    }
                }
            }
            "path" => {
                if let Some(v) = val {
                    if !v.is_empty() {
                        cookie.path = v.to_string();
                    }
                }
            }
            "secure" => cookie.secure = true,
            "httponly" => cookie.http_only = true,
            "max-age" => {
                if let Some(v) = val.and_then(|v| v.parse::<i64>().ok()) {
                    cookie.expires = if v <= 0 {
                        Some(SystemTime::UNIX_EPOCH)
                    } else {
                        Some(SystemTime::now() + Duration::from_secs(v as u64))
                    };
                }
            }
            "expires" => {
                // Max-Age takes precedence when both are present; only
                // fill this in if Max-Age hasn't already set `expires`.
                if cookie.expires.is_none() {
                    if let Some(v) = val.and_then(httpdate_to_systime) {
                        cookie.expires = Some(v);
                    }
                }
            }
            _ => {}
        }
    }

    Some(cookie)
}

#[cfg(feature = "date_header")]
fn httpdate_to_systime(s: &str) -> Option<SystemTime> {
    httpdate::parse_http_date(s).ok()
}

#[cfg(not(feature = "date_header"))]
fn httpdate_to_systime(_s: &str) -> Option<SystemTime> {
    None
}

/// Per-domain store of non-expired cookies.
#[derive(Default)]
pub struct CookieJar {
    by_domain: HashMap<String, Vec<Cookie>>,
}

impl CookieJar {
    pub fn new() -> CookieJar {
        CookieJar { by_domain: HashMap::new() }
    }

    /// Record a `Set-Cookie` header received from `domain`.
    pub fn add(&mut self, domain: &str, set_cookie_value: &str) {
        if let Some(cookie) = parse_set_cookie(set_cookie_value, domain, "/") {
            let bucket = self.by_domain.entry(cookie.domain.clone()).or_insert_with(Vec::new);
            bucket.retain(|c| c.name != cookie.name || c.path != cookie.path);
            if !cookie.is_expired() {
                bucket.push(cookie);
            }
        }
    }

    /// Build the `Cookie:` header value for a request to `domain`/`path`,
    /// or `None` if nothing matches.
    pub fn header_for(&self, domain: &str, path: &str, is_https: bool) -> Option<String> {
        let mut pairs = Vec::new();
        for (stored_domain, cookies) in &self.by_domain {
            if !domain.ends_with(stored_domain.as_str()) {
                continue;
            }
            for cookie in cookies {
                if cookie.is_expired() {
                    continue;
                }
                if cookie.matches(domain, path, is_https) {
                    pairs.push(format!("{}={}", cookie.name, cookie.value));
                }
            }
        }
        if pairs.is_empty() {
            None
        } else {
            Some(pairs.join("; "))
        }
    }

    pub fn clear(&mut self) {
        self.by_domain.clear();
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parses_name_value_only() {
        let c = parse_set_cookie("session=abc123", "example.com", "/").unwrap();
        assert_eq!(c.name, "session");
        assert_eq!(c.value, "abc123");
        assert_eq!(c.domain, "example.com");
        assert_eq!(c.path, "/");
        assert!(!c.secure);
    }

    #[test]
    fn parses_attributes() {
        let c = parse_set_cookie(
            "id=42; Domain=.example.com; Path=/api; Secure; HttpOnly",
            "www.example.com",
            "/",
        )
        .unwrap();
        assert_eq!(c.domain, "example.com");
        assert_eq!(c.path, "/api");
        assert!(c.secure);
        assert!(c.http_only);
    }

    #[test]
    fn jar_roundtrips_matching_cookie() {
        let mut jar = CookieJar::new();
        jar.add("example.com", "a=1; Path=/");
        jar.add("example.com", "b=2; Path=/private; Secure");
        assert_eq!(jar.header_for("example.com", "/", false), Some("a=1".to_string()));
        assert_eq!(jar.header_for("example.com", "/private", false), Some("a=1".to_string()));
        let header = jar.header_for("example.com", "/private", true).unwrap();
        let mut parts: Vec<_> = header.split("; ").collect();
        parts.sort();
        assert_eq!(parts, vec!["a=1", "b=2"]);
    }

    #[test]
    fn max_age_zero_expires_immediately() {
        let mut jar = CookieJar::new();
        jar.add("example.com", "a=1; Max-Age=0");
        assert_eq!(jar.header_for("example.com", "/", false), None);
    }
}
