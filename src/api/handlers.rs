//! Route handlers
//!
//! Each handler turns a request into a `Command`, runs it through the
//! engine and wraps the JSON result. Errors bubble up to the router, which
//! maps them onto status codes.

use serde_json::{json, Value};

use super::router::{Params, Route};
use super::ServerContext;
use crate::error::{AtlasError, Result};
use crate::protocol::{Command, HttpRequest, HttpResponse, Method};
use crate::schema::Schema;

/// The route table, in match order
pub static ROUTES: &[Route] = &[
    Route {
        method: Method::Get,
        pattern: "/api/health",
        handler: health,
        summary: "Liveness, uptime and cache counters",
    },
    Route {
        method: Method::Get,
        pattern: "/api/databases",
        handler: list_databases,
        summary: "List databases",
    },
    Route {
        method: Method::Post,
        pattern: "/api/databases",
        handler: create_database,
        summary: "Create a database {name}",
    },
    Route {
        method: Method::Delete,
        pattern: "/api/databases/{db}",
        handler: delete_database,
        summary: "Delete a database",
    },
    Route {
        method: Method::Get,
        pattern: "/api/databases/{db}/collections",
        handler: list_collections,
        summary: "List collections",
    },
    Route {
        method: Method::Post,
        pattern: "/api/databases/{db}/collections",
        handler: create_collection,
        summary: "Create a collection {name, schema:[{name,type,required,indexed}]}",
    },
    Route {
        method: Method::Delete,
        pattern: "/api/databases/{db}/collections/{coll}",
        handler: delete_collection,
        summary: "Delete a collection",
    },
    Route {
        method: Method::Get,
        pattern: "/api/databases/{db}/collections/{coll}/schema",
        handler: get_schema,
        summary: "Get a collection's schema",
    },
    Route {
        method: Method::Get,
        pattern: "/api/databases/{db}/collections/{coll}/stats",
        handler: collection_stats,
        summary: "Collection statistics",
    },
    Route {
        method: Method::Get,
        pattern: "/api/databases/{db}/collections/{coll}/instances",
        handler: find_instances,
        summary: "List instances (?query=field:value,...)",
    },
    Route {
        method: Method::Post,
        pattern: "/api/databases/{db}/collections/{coll}/instances",
        handler: insert_instance,
        summary: "Insert an instance",
    },
    Route {
        method: Method::Get,
        pattern: "/api/databases/{db}/collections/{coll}/instances/{id}",
        handler: get_instance,
        summary: "Get an instance by id",
    },
    Route {
        method: Method::Put,
        pattern: "/api/databases/{db}/collections/{coll}/instances/{id}",
        handler: update_instance,
        summary: "Update an instance",
    },
    Route {
        method: Method::Delete,
        pattern: "/api/databases/{db}/collections/{coll}/instances/{id}",
        handler: delete_instance,
        summary: "Delete an instance",
    },
    Route {
        method: Method::Post,
        pattern: "/api/execute",
        handler: execute,
        summary: "Run a CLI command {command, arguments}",
    },
];

// =============================================================================
// Helpers
// =============================================================================

fn run(ctx: &ServerContext, command: Command) -> Result<HttpResponse> {
    ctx.engine.execute(command).map(HttpResponse::ok)
}

fn run_created(ctx: &ServerContext, command: Command) -> Result<HttpResponse> {
    ctx.engine.execute(command).map(HttpResponse::created)
}

/// A required string field of the request body
fn body_string(body: &Value, field: &str) -> Result<String> {
    body.get(field)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| AtlasError::Validation(format!("'{}' is required", field)))
}

fn db_and_collection(params: &Params) -> Result<(String, String)> {
    Ok((params.require("db")?.to_string(), params.require("coll")?.to_string()))
}

// =============================================================================
// Handlers
// =============================================================================

fn health(ctx: &ServerContext, _req: &HttpRequest, _params: &Params) -> Result<HttpResponse> {
    Ok(HttpResponse::ok(json!({
        "success": true,
        "status": "ok",
        "version": crate::VERSION,
        "uptime_secs": ctx.engine.uptime().as_secs(),
        "cache": ctx.engine.cache_stats(),
    })))
}

fn list_databases(ctx: &ServerContext, _req: &HttpRequest, _params: &Params) -> Result<HttpResponse> {
    run(ctx, Command::ListDatabases)
}

fn create_database(ctx: &ServerContext, req: &HttpRequest, _params: &Params) -> Result<HttpResponse> {
    let name = body_string(&req.json()?, "name")?;
    run_created(ctx, Command::CreateDatabase { name })
}

fn delete_database(ctx: &ServerContext, _req: &HttpRequest, params: &Params) -> Result<HttpResponse> {
    let name = params.require("db")?.to_string();
    run(ctx, Command::DeleteDatabase { name })
}

fn list_collections(ctx: &ServerContext, _req: &HttpRequest, params: &Params) -> Result<HttpResponse> {
    let db = params.require("db")?.to_string();
    run(ctx, Command::ListCollections { db })
}

fn create_collection(ctx: &ServerContext, req: &HttpRequest, params: &Params) -> Result<HttpResponse> {
    let body = req.json()?;
    let db = params.require("db")?.to_string();
    let name = body_string(&body, "name")?;
    let schema = Schema::from_json(body.get("schema").unwrap_or(&Value::Null))?;
    run_created(ctx, Command::CreateCollection { db, name, schema })
}

fn delete_collection(ctx: &ServerContext, _req: &HttpRequest, params: &Params) -> Result<HttpResponse> {
    let (db, name) = db_and_collection(params)?;
    run(ctx, Command::DeleteCollection { db, name })
}

fn get_schema(ctx: &ServerContext, _req: &HttpRequest, params: &Params) -> Result<HttpResponse> {
    let (db, collection) = db_and_collection(params)?;
    run(ctx, Command::GetSchema { db, collection })
}

fn collection_stats(ctx: &ServerContext, _req: &HttpRequest, params: &Params) -> Result<HttpResponse> {
    let (db, collection) = db_and_collection(params)?;
    run(ctx, Command::Stats { db, collection })
}

fn find_instances(ctx: &ServerContext, req: &HttpRequest, params: &Params) -> Result<HttpResponse> {
    let (db, collection) = db_and_collection(params)?;
    let query = req.query_param("query").unwrap_or_default().to_string();
    run(ctx, Command::Find { db, collection, query })
}

fn insert_instance(ctx: &ServerContext, req: &HttpRequest, params: &Params) -> Result<HttpResponse> {
    let (db, collection) = db_and_collection(params)?;
    let document = req.json()?;
    run_created(ctx, Command::Insert { db, collection, document })
}

fn get_instance(ctx: &ServerContext, _req: &HttpRequest, params: &Params) -> Result<HttpResponse> {
    let (db, collection) = db_and_collection(params)?;
    let id = params.require("id")?.to_string();
    run(ctx, Command::GetInstance { db, collection, id })
}

fn update_instance(ctx: &ServerContext, req: &HttpRequest, params: &Params) -> Result<HttpResponse> {
    let (db, collection) = db_and_collection(params)?;
    let id = params.require("id")?.to_string();
    let document = req.json()?;
    run(ctx, Command::Update { db, collection, id, document })
}

fn delete_instance(ctx: &ServerContext, _req: &HttpRequest, params: &Params) -> Result<HttpResponse> {
    let (db, collection) = db_and_collection(params)?;
    let id = params.require("id")?.to_string();
    run(ctx, Command::DeleteInstance { db, collection, id })
}

/// `{"command": "insert", "arguments": ["app", "users", {"name": "x"}]}`.
/// Non-string arguments are passed as their JSON text.
fn execute(ctx: &ServerContext, req: &HttpRequest, _params: &Params) -> Result<HttpResponse> {
    let body = req.json()?;
    let verb = body_string(&body, "command")?;

    let arguments = match body.get("arguments") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| match item {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect(),
        Some(_) => {
            return Err(AtlasError::Validation("'arguments' must be an array".to_string()));
        }
    };

    let command = Command::from_args(&verb, &arguments)?;
    tracing::debug!("execute: {} ({} argument(s))", command.name(), arguments.len());
    run(ctx, command)
}
