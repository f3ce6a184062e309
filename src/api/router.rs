//! Request router
//!
//! A declarative route table resolved by a small segment matcher. Routes
//! are tried in table order; the first pattern and method match wins.
//!
//! - no pattern matches the path: 404
//! - a pattern matches but no route for the method: 405 + `Allow`
//! - a handler panics: 500 `Internal server error`

use std::panic::{catch_unwind, AssertUnwindSafe};

use super::handlers::ROUTES;
use super::ServerContext;
use crate::error::{AtlasError, Result};
use crate::protocol::{HttpRequest, HttpResponse, Method};

/// Route handler signature
pub type Handler = fn(&ServerContext, &HttpRequest, &Params) -> Result<HttpResponse>;

/// One entry in the route table
pub struct Route {
    pub method: Method,

    /// `/`-separated; `{name}` segments capture
    pub pattern: &'static str,

    pub handler: Handler,

    /// One-line summary printed by `--routes`
    pub summary: &'static str,
}

/// Captured `{name}` segments
#[derive(Debug, Default, Clone)]
pub struct Params {
    values: Vec<(&'static str, String)>,
}

impl Params {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| v.as_str())
    }

    /// A capture the route pattern guarantees
    pub fn require(&self, name: &str) -> Result<&str> {
        self.get(name)
            .ok_or_else(|| AtlasError::Protocol(format!("missing path parameter '{}'", name)))
    }
}

/// Match `segments` against `pattern`, capturing `{name}` segments
fn match_pattern(pattern: &'static str, segments: &[String]) -> Option<Params> {
    let parts: Vec<&'static str> = pattern.split('/').filter(|p| !p.is_empty()).collect();
    if parts.len() != segments.len() {
        return None;
    }

    let mut params = Params::default();
    for (part, segment) in parts.into_iter().zip(segments) {
        if let Some(name) = part.strip_prefix('{').and_then(|p| p.strip_suffix('}')) {
            params.values.push((name, segment.clone()));
        } else if part != segment {
            return None;
        }
    }
    Some(params)
}

/// Dispatches requests through the route table
pub struct Router {
    ctx: ServerContext,
    routes: &'static [Route],
}

impl Router {
    pub fn new(ctx: ServerContext) -> Self {
        Self { ctx, routes: ROUTES }
    }

    pub fn context(&self) -> &ServerContext {
        &self.ctx
    }

    /// Resolve and run the handler for `request`. Always produces a JSON
    /// response.
    pub fn dispatch(&self, request: &HttpRequest) -> HttpResponse {
        let segments = request.segments();
        let mut allowed: Vec<&'static str> = Vec::new();

        for route in self.routes {
            let Some(params) = match_pattern(route.pattern, &segments) else {
                continue;
            };
            if route.method != request.method {
                if !allowed.contains(&route.method.as_str()) {
                    allowed.push(route.method.as_str());
                }
                continue;
            }

            tracing::trace!("{} {} -> {}", request.method, request.path, route.pattern);
            return self.invoke(route, request, &params);
        }

        if allowed.is_empty() {
            HttpResponse::not_found()
        } else {
            HttpResponse::method_not_allowed(&allowed)
        }
    }

    fn invoke(&self, route: &Route, request: &HttpRequest, params: &Params) -> HttpResponse {
        let outcome = catch_unwind(AssertUnwindSafe(|| (route.handler)(&self.ctx, request, params)));

        match outcome {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                if e.is_client_error() {
                    tracing::debug!("{} {} rejected: {}", request.method, request.path, e);
                }
                HttpResponse::from(e)
            }
            Err(_) => {
                tracing::error!("Handler for {} {} panicked", request.method, request.path);
                HttpResponse::internal_error()
            }
        }
    }
}

/// Route listing printed by `atlasdb --routes`
pub fn describe_routes() -> Vec<String> {
    ROUTES
        .iter()
        .map(|r| format!("{:<7} {:<58} {}", r.method.as_str(), r.pattern, r.summary))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segs(path: &str) -> Vec<String> {
        HttpRequest::new(Method::Get, path).segments()
    }

    #[test]
    fn captures_named_segments() {
        let params = match_pattern(
            "/api/databases/{db}/collections/{coll}",
            &segs("/api/databases/app/collections/users"),
        )
        .unwrap();
        assert_eq!(params.get("db"), Some("app"));
        assert_eq!(params.get("coll"), Some("users"));
        assert!(params.get("id").is_none());
    }

    #[test]
    fn literal_and_length_mismatch() {
        assert!(match_pattern("/api/databases/{db}", &segs("/api/databases")).is_none());
        assert!(match_pattern("/api/databases/{db}", &segs("/api/tables/app")).is_none());
        assert!(match_pattern("/api/databases", &segs("/api/databases/")).is_some());
    }
}
