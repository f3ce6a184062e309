//! Response definitions
//!
//! Every response the server sends carries a JSON body with a `success`
//! flag. Errors become `{"success": false, "error": "..."}`.

use serde_json::{json, Value};

use crate::error::AtlasError;

/// A response to send to the client
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// Status code
    pub status: u16,

    /// Extra headers (`Content-Type`, `Content-Length` and `Connection`
    /// are added by the codec)
    pub headers: Vec<(String, String)>,

    /// JSON body
    pub body: Value,
}

impl HttpResponse {
    /// 200 with `body`
    pub fn ok(body: Value) -> Self {
        Self::json(200, body)
    }

    /// 201 with `body`
    pub fn created(body: Value) -> Self {
        Self::json(201, body)
    }

    pub fn json(status: u16, body: Value) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body,
        }
    }

    /// `{"success": false, "error": message}`
    pub fn error(status: u16, message: impl Into<String>) -> Self {
        Self::json(status, json!({ "success": false, "error": message.into() }))
    }

    pub fn not_found() -> Self {
        Self::error(404, "Not found")
    }

    /// 405 listing the methods the path does accept
    pub fn method_not_allowed(allowed: &[&str]) -> Self {
        Self::error(405, "Method not allowed").with_header("Allow", allowed.join(", "))
    }

    pub fn too_many_requests() -> Self {
        Self::error(429, "Too many requests")
    }

    pub fn internal_error() -> Self {
        Self::error(500, "Internal server error")
    }

    pub fn service_unavailable() -> Self {
        Self::error(503, "Server busy")
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

impl From<AtlasError> for HttpResponse {
    /// Map an engine error to its status code. Server-side failures hide
    /// their detail from the client.
    fn from(err: AtlasError) -> Self {
        let status = err.status_code();
        if status >= 500 && !matches!(err, AtlasError::LockTimeout(_) | AtlasError::ResourceExhausted(_)) {
            tracing::error!("Request failed: {}", err);
            return Self::internal_error();
        }
        Self::error(status, err.to_string())
    }
}

/// Standard reason phrase for the status line
pub fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        204 => "No Content",
        400 => "Bad Request",
        404 => "Not Found",
        405 => "Method Not Allowed",
        408 => "Request Timeout",
        409 => "Conflict",
        413 => "Payload Too Large",
        429 => "Too Many Requests",
        431 => "Request Header Fields Too Large",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "Unknown",
    }
}
