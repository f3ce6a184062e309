//! AtlasDB Binary
//!
//! One-shot CLI commands against the data directory, or the HTTP server
//! with `--server [PORT]`.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use atlasdb::api::describe_routes;
use atlasdb::network::Server;
use atlasdb::protocol::Command;
use atlasdb::{AtlasError, Config, Engine};
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use tracing_subscriber::{fmt, EnvFilter};

/// AtlasDB
#[derive(Parser, Debug)]
#[command(name = "atlasdb")]
#[command(about = "Embedded file-backed document database")]
#[command(version)]
struct Args {
    /// Run the HTTP server (default port 8080)
    #[arg(long, value_name = "PORT", num_args = 0..=1, default_missing_value = "8080")]
    server: Option<u16>,

    /// Debug-level logging
    #[arg(short, long)]
    verbose: bool,

    /// Print the HTTP route table and exit
    #[arg(long)]
    routes: bool,

    /// Data directory (overrides ATLASDB_DATA_DIR)
    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create a database, or a collection inside one
    Create {
        db: String,
        collection: Option<String>,

        /// Fields as name:type:required:indexed, comma separated
        #[arg(long)]
        schema: Option<String>,
    },

    /// Insert a JSON instance
    Insert {
        db: String,
        collection: String,
        json: String,
    },

    /// List instances matching a query
    Find {
        db: String,
        collection: String,

        /// field:value[,field:value...]
        #[arg(long = "where", value_name = "QUERY")]
        filter: Option<String>,
    },

    /// Show a collection's schema
    Schema { db: String, collection: String },

    /// List databases, a database's collections, or a collection's instances
    List {
        db: Option<String>,
        collection: Option<String>,
    },

    /// Collection statistics
    Stats { db: String, collection: String },

    /// Fetch one instance by id
    Get {
        db: String,
        collection: String,
        id: String,
    },

    /// Merge JSON fields into an instance
    Update {
        db: String,
        collection: String,
        id: String,
        json: String,
    },

    /// Delete a database, a collection, or an instance
    Delete {
        db: String,
        collection: Option<String>,
        id: Option<String>,
    },
}

impl Commands {
    /// The verb and positional arguments understood by `Command::from_args`
    fn into_args(self) -> (&'static str, Vec<String>) {
        match self {
            Commands::Create { db, collection, schema } => match collection {
                Some(collection) => ("create", [Some(db), Some(collection), schema].into_iter().flatten().collect()),
                None => ("create", vec![db]),
            },
            Commands::Insert { db, collection, json } => ("insert", vec![db, collection, json]),
            Commands::Find { db, collection, filter } => {
                ("find", [Some(db), Some(collection), filter].into_iter().flatten().collect())
            }
            Commands::Schema { db, collection } => ("schema", vec![db, collection]),
            Commands::List { db, collection } => ("list", [db, collection].into_iter().flatten().collect()),
            Commands::Stats { db, collection } => ("stats", vec![db, collection]),
            Commands::Get { db, collection, id } => ("get", vec![db, collection, id]),
            Commands::Update { db, collection, id, json } => ("update", vec![db, collection, id, json]),
            Commands::Delete { db, collection, id } => {
                ("delete", [Some(db), collection, id].into_iter().flatten().collect())
            }
        }
    }
}

fn main() -> ExitCode {
    // Usage errors exit with 1, not clap's default 2
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() { ExitCode::FAILURE } else { ExitCode::SUCCESS };
        }
    };
    init_tracing(&args);

    if args.routes {
        for line in describe_routes() {
            println!("{}", line);
        }
        return ExitCode::SUCCESS;
    }

    let mut config = Config::from_env();
    if let Some(dir) = &args.data_dir {
        config.data_dir = dir.clone();
    }

    if let Some(port) = args.server {
        config.port = port;
        return serve(config);
    }

    let Some(command) = args.command else {
        eprintln!("No command given; see `atlasdb help`");
        return ExitCode::FAILURE;
    };

    let (verb, positional) = command.into_args();
    match run_command(config, verb, &positional) {
        Ok(output) => {
            print_json(&output);
            ExitCode::SUCCESS
        }
        Err(e) => {
            print_json(&json!({ "success": false, "error": e.to_string() }));
            ExitCode::FAILURE
        }
    }
}

/// Server logs at info by default; one-shot commands only log warnings so
/// stdout stays pure JSON. `RUST_LOG` wins over both.
fn init_tracing(args: &Args) {
    let default = match (args.verbose, args.server.is_some()) {
        (true, _) => "debug",
        (false, true) => "info,atlasdb=info",
        (false, false) => "warn",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_writer(std::io::stderr)
        .init();
}

fn run_command(config: Config, verb: &str, positional: &[String]) -> atlasdb::Result<Value> {
    let command = Command::from_args(verb, positional)?;
    let engine = Engine::open(config)?;
    let result = engine.execute(command);
    engine.close();
    result
}

fn serve(config: Config) -> ExitCode {
    tracing::info!("AtlasDB v{}", atlasdb::VERSION);
    tracing::info!("Data directory: {}", config.data_dir.display());

    let engine = match Engine::open(config.clone()) {
        Ok(engine) => Arc::new(engine),
        Err(e) => {
            tracing::error!("Failed to open engine: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let server = match Server::bind(config, engine) {
        Ok(server) => server,
        Err(AtlasError::Io(e)) => {
            eprintln!("Cannot listen: {}", e);
            return ExitCode::FAILURE;
        }
        Err(e) => {
            tracing::error!("Failed to start server: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = server.run() {
        tracing::error!("Server error: {}", e);
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

fn print_json(value: &Value) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{}", text),
        Err(_) => println!("{}", value),
    }
}
