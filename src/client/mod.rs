//! The HTTP/1.x client: connection pooling, cookies, and redirects on
//! top of the per-request state machine in [`context`].

pub mod config;
pub mod context;
pub mod cookie;
pub mod redirect;

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::pool::{Origin, Pool, PoolConfig, PooledTransport};
use crate::transport::TcpTransport;
use crate::wire::Method;

pub use self::config::Config;
pub use self::context::{Context, OwnedResponse};
pub use self::cookie::CookieJar;

/// Ties a connection pool, cookie jar and config together. Not `Sync`
/// (see [`crate::pool`]) -- one `Client` belongs to one reactor thread.
pub struct Client {
    config: Arc<Config>,
    pool: Pool,
    cookies: CookieJar,
}

impl Client {
    pub fn new(config: Arc<Config>) -> Client {
        Client {
            config: config,
            pool: Pool::new(PoolConfig::default()),
            cookies: CookieJar::new(),
        }
    }

    /// Obtain a transport for `origin`: a pooled one if available and
    /// still fresh, otherwise a fresh connection.
    fn acquire(&mut self, origin: &Origin) -> Result<PooledTransport> {
        if let Some(t) = self.pool.get(origin) {
            return Ok(t);
        }
        let tcp = TcpTransport::connect(&origin.host, origin.port, self.config.connect_timeout)?;
        Ok(PooledTransport::Tcp(tcp))
    }

    /// Start a new request context for `method path` against `origin`.
    /// The caller is responsible for registering `context.raw_fd()` with
    /// a reactor and calling `context.step()` on readiness until it
    /// returns `Ok(true)`, then `finish()`-ing and, if the result is a
    /// redirect, calling `begin` again via `follow_redirect`.
    pub fn begin(&mut self, method: Method, method_str: &'static str, origin: Origin, path: &str, headers: &[(&str, &str)], body: &[u8]) -> Result<Context> {
        let transport = self.acquire(&origin)?;
        let cookies = if self.config.enable_cookies { Some(&self.cookies) } else { None };
        let request = context::build_request(method_str, path, &origin, headers, body, cookies);
        Ok(Context::new(transport, origin, method, request, &self.config))
    }

    /// Record `Set-Cookie` headers from a response, decide whether to
    /// recycle its transport, and report the method to retry with if
    /// `response.status` is a redirect this client follows (§4.5:
    /// 307/308 keep `request_method`, 303 downgrades to GET, 301/302
    /// retain `request_method` too) -- provided a `Location` header is
    /// present. `redirects_followed` is the number of redirects already
    /// followed for this logical request; exceeding `config.max_redirects`
    /// fails with `ClientRedirectLimit` instead of reporting a redirect.
    pub fn complete(
        &mut self,
        origin: Origin,
        request_method: Method,
        response: OwnedResponse,
        transport: PooledTransport,
        redirects_followed: u32,
    ) -> Result<Option<Method>> {
        if self.config.enable_cookies {
            for (name, value) in &response.headers {
                if name.eq_ignore_ascii_case("set-cookie") {
                    self.cookies.add(&origin.host, value);
                }
            }
        }
        let has_location = response.headers.iter().any(|(name, _)| name.eq_ignore_ascii_case("location"));
        let redirect = if has_location { context::next_redirect(response.status, request_method) } else { None };
        context::recycle(&mut self.pool, origin, &response, transport);
        if redirect.is_some() && redirects_followed >= self.config.max_redirects {
            return Err(Error::ClientRedirectLimit);
        }
        Ok(redirect)
    }

    pub fn pool_cleanup(&mut self) {
        self.pool.cleanup();
    }

    pub fn shutdown(&mut self) {
        self.pool.shutdown();
        self.cookies.clear();
    }
}

/// Split a parsed URL into its origin and path+query, the minimum a
/// caller needs to call `Client::begin`.
pub fn split_url(url: &crate::wire::Url) -> (Origin, String) {
    let scheme: &'static str = match url.scheme {
        crate::wire::Scheme::Http => "http",
        crate::wire::Scheme::Https => "https",
    };
    let origin = Origin::new(scheme, url.host, url.port);
    let mut path = url.path.to_string();
    if let Some(q) = url.query {
        path.push('?');
        path.push_str(q);
    }
    (origin, path)
}

#[cfg(test)]
mod test {
    use super::*;
    use std::net::TcpListener;

    fn dummy_transport() -> PooledTransport {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = std::net::TcpStream::connect(addr).unwrap();
        PooledTransport::Tcp(TcpTransport::from_stream(client).unwrap())
    }

    fn response(status: u16, headers: Vec<(&str, &str)>) -> OwnedResponse {
        OwnedResponse {
            status: status,
            reason: String::new(),
            headers: headers.into_iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
            body: Vec::new(),
            keep_alive: false,
        }
    }

    #[test]
    fn client_starts_with_empty_pool() {
        let client = Client::new(Config::new().done());
        assert_eq!(client.pool.idle_count(), 0);
    }

    #[test]
    fn redirect_reported_when_location_present_and_under_limit() {
        let mut client = Client::new(Config::new().done());
        let origin = Origin::new("http", "example.com", 80);
        let resp = response(302, vec![("Location", "/elsewhere")]);
        let redirect = client.complete(origin, Method::Get, resp, dummy_transport(), 0).unwrap();
        assert_eq!(redirect, Some(Method::Get));
    }

    #[test]
    fn redirect_status_without_location_is_not_reported() {
        let mut client = Client::new(Config::new().done());
        let origin = Origin::new("http", "example.com", 80);
        let resp = response(302, vec![]);
        let redirect = client.complete(origin, Method::Get, resp, dummy_transport(), 0).unwrap();
        assert_eq!(redirect, None);
    }

    #[test]
    fn redirect_limit_exceeded_errors() {
        let mut config = Config::new();
        config.max_redirects(3);
        let mut client = Client::new(config.done());
        let origin = Origin::new("http", "example.com", 80);
        let resp = response(302, vec![("Location", "/elsewhere")]);
        let result = client.complete(origin, Method::Get, resp, dummy_transport(), 3);
        assert!(matches!(result, Err(Error::ClientRedirectLimit)));
    }
}
