//! Protocol codec
//!
//! Minimal HTTP/1.1 reading and writing over a blocking stream.
//!
//! ## Request Format
//! ```text
//! ┌──────────────────────────────────────────┐
//! │ METHOD SP target SP HTTP/1.x CRLF        │
//! ├──────────────────────────────────────────┤
//! │ Name: value CRLF          (0..=MAX)      │
//! ├──────────────────────────────────────────┤
//! │ CRLF                                     │
//! ├──────────────────────────────────────────┤
//! │ body (Content-Length bytes)              │
//! └──────────────────────────────────────────┘
//! ```
//!
//! Chunked transfer encoding is not supported; bodies need a
//! `Content-Length`. Responses always carry `Connection: close`.

use std::io::{BufRead, Read, Write};

use super::{HttpRequest, HttpResponse, Method};
use super::response::reason_phrase;
use crate::error::{AtlasError, Result};

/// Longest accepted request or header line
pub const MAX_LINE_LEN: usize = 8 * 1024;

/// Most header lines accepted per request
pub const MAX_HEADERS: usize = 100;

// =============================================================================
// Request Decoding
// =============================================================================

/// Read one request from `reader`.
///
/// An immediate EOF surfaces as `AtlasError::Io(UnexpectedEof)` so the
/// caller can tell a silent disconnect apart from a malformed request.
pub fn read_request<R: BufRead>(reader: &mut R, max_body: usize) -> Result<HttpRequest> {
    let request_line = match read_line(reader)? {
        Some(line) => line,
        None => {
            return Err(AtlasError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "connection closed before request",
            )))
        }
    };

    let mut parts = request_line.split_whitespace();
    let (method, target, version) = match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(m), Some(t), Some(v), None) => (m, t, v),
        _ => {
            return Err(AtlasError::Protocol(format!(
                "Malformed request line: {:?}",
                request_line
            )))
        }
    };

    if !version.starts_with("HTTP/1.") {
        return Err(AtlasError::Protocol(format!("Unsupported version: {}", version)));
    }
    if !target.starts_with('/') {
        return Err(AtlasError::Protocol(format!("Invalid request target: {}", target)));
    }

    let mut request = HttpRequest::new(Method::parse(method)?, target);

    // Headers
    loop {
        let line = read_line(reader)?
            .ok_or_else(|| AtlasError::Protocol("Connection closed inside headers".to_string()))?;
        if line.is_empty() {
            break;
        }
        if request.headers.len() >= MAX_HEADERS {
            return Err(AtlasError::Protocol(format!("More than {} headers", MAX_HEADERS)));
        }

        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| AtlasError::Protocol(format!("Malformed header: {:?}", line)))?;
        request
            .headers
            .insert(name.trim().to_ascii_lowercase(), value.trim().to_string());
    }

    if request
        .header("transfer-encoding")
        .is_some_and(|te| !te.eq_ignore_ascii_case("identity"))
    {
        return Err(AtlasError::Protocol("Chunked bodies are not supported".to_string()));
    }

    // Body
    let content_length = match request.header("content-length") {
        Some(len) => len
            .parse::<usize>()
            .map_err(|_| AtlasError::Protocol(format!("Invalid Content-Length: {}", len)))?,
        None => 0,
    };

    if content_length > max_body {
        return Err(AtlasError::Protocol(format!(
            "Body too large: {} bytes (max {})",
            content_length, max_body
        )));
    }

    if content_length > 0 {
        let mut body = vec![0u8; content_length];
        reader.read_exact(&mut body)?;
        request.body = body;
    }

    Ok(request)
}

/// One CRLF- or LF-terminated line without its terminator.
/// `None` at a clean EOF.
fn read_line<R: BufRead>(reader: &mut R) -> Result<Option<String>> {
    let mut buf = Vec::new();
    let read = reader.take(MAX_LINE_LEN as u64 + 1).read_until(b'\n', &mut buf)?;

    if read == 0 {
        return Ok(None);
    }
    if !buf.ends_with(b"\n") {
        if buf.len() > MAX_LINE_LEN {
            return Err(AtlasError::Protocol(format!("Line longer than {} bytes", MAX_LINE_LEN)));
        }
        return Err(AtlasError::Protocol("Truncated line".to_string()));
    }

    buf.pop();
    if buf.ends_with(b"\r") {
        buf.pop();
    }

    String::from_utf8(buf)
        .map(Some)
        .map_err(|_| AtlasError::Protocol("Non UTF-8 header line".to_string()))
}

// =============================================================================
// Response Encoding
// =============================================================================

/// Encode a response to bytes (status line, headers, JSON body)
pub fn encode_response(response: &HttpResponse) -> Vec<u8> {
    let body = serde_json::to_vec(&response.body)
        .unwrap_or_else(|_| br#"{"success":false,"error":"Internal server error"}"#.to_vec());

    let mut head = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n",
        response.status,
        reason_phrase(response.status),
        body.len()
    );
    for (name, value) in &response.headers {
        head.push_str(name);
        head.push_str(": ");
        head.push_str(value);
        head.push_str("\r\n");
    }
    head.push_str("\r\n");

    let mut message = Vec::with_capacity(head.len() + body.len());
    message.extend_from_slice(head.as_bytes());
    message.extend_from_slice(&body);
    message
}

/// Write a response to a stream
pub fn write_response<W: Write>(writer: &mut W, response: &HttpResponse) -> Result<()> {
    let bytes = encode_response(response);
    writer.write_all(&bytes)?;
    writer.flush()?;
    Ok(())
}
