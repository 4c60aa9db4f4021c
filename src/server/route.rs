//! Route table: first match wins, `NULL` method / `"*"` pattern mean
//! "any" -- same semantics as `cwh_route_t`'s linked list walked by
//! `cwh_run`, just a `Vec` instead of hand-rolled `next` pointers.

use std::sync::Arc;

use crate::error::Result;
use crate::wire::Method;

/// An owned, already-collected request -- the server reads and parses
/// into its connection buffer, then copies out what the handler needs
/// before the buffer is reused for the next pipelined request.
pub struct HandlerRequest {
    pub method: Method,
    pub path: String,
    pub query: Option<String>,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HandlerRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

pub struct HandlerResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HandlerResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> HandlerResponse {
        HandlerResponse { status: status, headers: Vec::new(), body: body.into() }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> HandlerResponse {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn content_type(self, value: &str) -> HandlerResponse {
        self.with_header("Content-Type", value)
    }
}

pub type Handler = Arc<dyn Fn(&HandlerRequest) -> Result<HandlerResponse> + Send + Sync>;

/// Handles one fully-assembled WebSocket message and optionally produces
/// a reply; `None` means "nothing to send back for this message".
pub type WsHandler = Arc<dyn Fn(crate::websocket::Message) -> Option<crate::websocket::Message> + Send + Sync>;

struct Route {
    method: Option<Method>,
    pattern: String,
    handler: Handler,
}

struct WsRoute {
    pattern: String,
    handler: WsHandler,
}

/// Registered routes, tried in registration order.
#[derive(Default)]
pub struct Router {
    routes: Vec<Route>,
    ws_routes: Vec<WsRoute>,
}

impl Router {
    pub fn new() -> Router {
        Router { routes: Vec::new(), ws_routes: Vec::new() }
    }

    /// Register a handler. `method` of `None` matches any method;
    /// `pattern` of `"*"` matches any path, otherwise an exact match is
    /// required (per the wire contract's minimum pattern semantics).
    pub fn add(&mut self, method: Option<Method>, pattern: &str, handler: Handler) {
        self.routes.push(Route { method: method, pattern: pattern.to_string(), handler: handler });
    }

    /// Register a WebSocket upgrade route. Only the path is matched --
    /// the upgrade predicate itself (`GET` plus the upgrade headers) is
    /// checked separately by `server::websocket::check_upgrade`.
    pub fn add_websocket(&mut self, pattern: &str, handler: WsHandler) {
        self.ws_routes.push(WsRoute { pattern: pattern.to_string(), handler: handler });
    }

    pub fn dispatch(&self, req: &HandlerRequest) -> Option<&Handler> {
        self.routes
            .iter()
            .find(|r| {
                r.method.map_or(true, |m| m == req.method) && (r.pattern == "*" || r.pattern == req.path)
            })
            .map(|r| &r.handler)
    }

    pub fn dispatch_ws(&self, path: &str) -> Option<&WsHandler> {
        self.ws_routes
            .iter()
            .find(|r| r.pattern == "*" || r.pattern == path)
            .map(|r| &r.handler)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn req(method: Method, path: &str) -> HandlerRequest {
        HandlerRequest { method: method, path: path.to_string(), query: None, headers: Vec::new(), body: Vec::new() }
    }

    #[test]
    fn exact_path_and_method_match() {
        let mut router = Router::new();
        router.add(Some(Method::Get), "/users", Arc::new(|_| Ok(HandlerResponse::new(200, "ok"))));
        assert!(router.dispatch(&req(Method::Get, "/users")).is_some());
        assert!(router.dispatch(&req(Method::Post, "/users")).is_none());
        assert!(router.dispatch(&req(Method::Get, "/other")).is_none());
    }

    #[test]
    fn wildcard_pattern_matches_any_path() {
        let mut router = Router::new();
        router.add(None, "*", Arc::new(|_| Ok(HandlerResponse::new(404, "not found"))));
        assert!(router.dispatch(&req(Method::Get, "/anything")).is_some());
        assert!(router.dispatch(&req(Method::Post, "/other")).is_some());
    }

    #[test]
    fn first_registered_match_wins() {
        let mut router = Router::new();
        router.add(Some(Method::Get), "/x", Arc::new(|_| Ok(HandlerResponse::new(1, ""))));
        router.add(None, "*", Arc::new(|_| Ok(HandlerResponse::new(2, ""))));
        let handler = router.dispatch(&req(Method::Get, "/x")).unwrap();
        assert_eq!((handler)(&req(Method::Get, "/x")).unwrap().status, 1);
    }
}
