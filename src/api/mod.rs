//! API Module
//!
//! JSON-over-HTTP surface of the engine.
//!
//! ## Architecture
//! - `router`: route table matcher, 404/405 handling, panic containment
//! - `handlers`: one function per route, each building a `Command`

mod handlers;
mod router;

use std::sync::Arc;

use crate::engine::Engine;

pub use handlers::ROUTES;
pub use router::{describe_routes, Handler, Params, Route, Router};

/// State shared with every handler
#[derive(Clone)]
pub struct ServerContext {
    pub engine: Arc<Engine>,
}

impl ServerContext {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self { engine }
    }
}
