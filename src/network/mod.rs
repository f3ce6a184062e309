//! Network Module
//!
//! HTTP server and client handling.
//!
//! ## Architecture
//! - Single acceptor thread, per-address rate limiting at accept time
//! - Bounded worker pool for connections
//! - One request per connection, routed through `api::Router`

mod connection;
mod rate_limiter;
mod server;
mod thread_pool;

pub use connection::Connection;
pub use rate_limiter::RateLimiter;
pub use server::{Server, ShutdownHandle};
pub use thread_pool::ThreadPool;
