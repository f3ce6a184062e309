//! Protocol Module
//!
//! Defines the wire protocol for client-server communication.
//!
//! ## HTTP/1.1, one request per connection
//!
//! ```text
//! client ──► request line + headers + Content-Length body
//! server ◄── status line + JSON body, then close
//! ```
//!
//! ### Commands
//! Both the HTTP routes and the CLI reduce to a `Command`, which the engine
//! executes. `/api/execute` accepts the CLI form directly:
//! `{"command": "find", "arguments": ["app", "users", "age:30"]}`.
//!
//! ### Response Body
//! - success: `{"success": true, ...}`
//! - failure: `{"success": false, "error": "..."}`

mod codec;
mod command;
mod request;
mod response;

pub use codec::{encode_response, read_request, write_response, MAX_HEADERS, MAX_LINE_LEN};
pub use command::{parse_schema_spec, Command};
pub use request::{parse_query_string, percent_decode, HttpRequest, Method};
pub use response::{reason_phrase, HttpResponse};
