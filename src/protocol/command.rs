//! Command definitions
//!
//! Every engine operation as a value. The HTTP handlers, `/api/execute` and
//! the CLI all build a `Command` and hand it to `Engine::execute`.

use serde_json::Value;

use crate::error::{AtlasError, Result};
use crate::schema::{FieldSchema, Schema};

/// A parsed command
#[derive(Debug, Clone)]
pub enum Command {
    /// List every database
    ListDatabases,

    /// Create a database
    CreateDatabase { name: String },

    /// Delete a database (succeeds if absent)
    DeleteDatabase { name: String },

    /// List a database's collections
    ListCollections { db: String },

    /// Create a collection with an optional schema
    CreateCollection { db: String, name: String, schema: Schema },

    /// Delete a collection (succeeds if absent)
    DeleteCollection { db: String, name: String },

    /// Read a collection's schema
    GetSchema { db: String, collection: String },

    /// Collection statistics
    Stats { db: String, collection: String },

    /// Insert an instance
    Insert { db: String, collection: String, document: Value },

    /// List instances matching an equality query (empty: all)
    Find { db: String, collection: String, query: String },

    /// Fetch one instance by id
    GetInstance { db: String, collection: String, id: String },

    /// Merge fields into an instance
    Update { db: String, collection: String, id: String, document: Value },

    /// Delete an instance (succeeds if absent)
    DeleteInstance { db: String, collection: String, id: String },
}

impl Command {
    /// Short name used in logs
    pub fn name(&self) -> &'static str {
        match self {
            Command::ListDatabases => "list_databases",
            Command::CreateDatabase { .. } => "create_database",
            Command::DeleteDatabase { .. } => "delete_database",
            Command::ListCollections { .. } => "list_collections",
            Command::CreateCollection { .. } => "create_collection",
            Command::DeleteCollection { .. } => "delete_collection",
            Command::GetSchema { .. } => "get_schema",
            Command::Stats { .. } => "stats",
            Command::Insert { .. } => "insert",
            Command::Find { .. } => "find",
            Command::GetInstance { .. } => "get_instance",
            Command::Update { .. } => "update",
            Command::DeleteInstance { .. } => "delete_instance",
        }
    }

    /// Build a command from a CLI-style verb and positional arguments.
    ///
    /// ```text
    /// list   [db [collection]]
    /// create db [collection [name:type:required:indexed,...]]
    /// insert db collection <json>
    /// find   db collection [--where] [query]
    /// schema db collection
    /// stats  db collection
    /// get    db collection id
    /// update db collection id <json>
    /// delete db [collection [id]]
    /// ```
    pub fn from_args(verb: &str, args: &[String]) -> Result<Self> {
        let arg = |i: usize| args.get(i).cloned();

        let command = match (verb, args.len()) {
            ("list", 0) => Command::ListDatabases,
            ("list", 1) => Command::ListCollections { db: args[0].clone() },
            ("list", 2) => Command::Find {
                db: args[0].clone(),
                collection: args[1].clone(),
                query: String::new(),
            },

            ("create", 1) => Command::CreateDatabase { name: args[0].clone() },
            ("create", 2) | ("create", 3) => Command::CreateCollection {
                db: args[0].clone(),
                name: args[1].clone(),
                schema: match arg(2) {
                    Some(spec) => parse_schema_spec(&spec)?,
                    None => Schema::default(),
                },
            },

            ("insert", 3) => Command::Insert {
                db: args[0].clone(),
                collection: args[1].clone(),
                document: serde_json::from_str(&args[2])?,
            },

            ("find", 2..=4) => {
                let rest: Vec<&String> = args[2..].iter().filter(|a| a.as_str() != "--where").collect();
                if rest.len() > 1 {
                    return Err(usage(verb));
                }
                Command::Find {
                    db: args[0].clone(),
                    collection: args[1].clone(),
                    query: rest.first().map(|q| q.to_string()).unwrap_or_default(),
                }
            }

            ("schema", 2) => Command::GetSchema {
                db: args[0].clone(),
                collection: args[1].clone(),
            },

            ("stats", 2) => Command::Stats {
                db: args[0].clone(),
                collection: args[1].clone(),
            },

            ("get", 3) => Command::GetInstance {
                db: args[0].clone(),
                collection: args[1].clone(),
                id: args[2].clone(),
            },

            ("update", 4) => Command::Update {
                db: args[0].clone(),
                collection: args[1].clone(),
                id: args[2].clone(),
                document: serde_json::from_str(&args[3])?,
            },

            ("delete", 1) => Command::DeleteDatabase { name: args[0].clone() },
            ("delete", 2) => Command::DeleteCollection {
                db: args[0].clone(),
                name: args[1].clone(),
            },
            ("delete", 3) => Command::DeleteInstance {
                db: args[0].clone(),
                collection: args[1].clone(),
                id: args[2].clone(),
            },

            ("list" | "create" | "insert" | "find" | "schema" | "stats" | "get" | "update" | "delete", _) => {
                return Err(usage(verb))
            }
            (other, _) => {
                return Err(AtlasError::Validation(format!("unknown command '{}'", other)));
            }
        };

        Ok(command)
    }
}

/// Parse a compact schema: `name:type:required:indexed,age:int`
pub fn parse_schema_spec(spec: &str) -> Result<Schema> {
    let fields = spec
        .split(',')
        .map(str::trim)
        .filter(|f| !f.is_empty())
        .map(FieldSchema::parse_line)
        .collect::<Result<Vec<_>>>()?;
    Schema::new(fields)
}

fn usage(verb: &str) -> AtlasError {
    AtlasError::Validation(format!("wrong number of arguments for '{}'", verb))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn list_depth_selects_target() {
        assert!(matches!(Command::from_args("list", &[]).unwrap(), Command::ListDatabases));
        assert!(matches!(
            Command::from_args("list", &args(&["app"])).unwrap(),
            Command::ListCollections { .. }
        ));
        assert!(matches!(
            Command::from_args("list", &args(&["app", "users"])).unwrap(),
            Command::Find { .. }
        ));
    }

    #[test]
    fn find_accepts_where_flag() {
        match Command::from_args("find", &args(&["app", "users", "--where", "age:30"])).unwrap() {
            Command::Find { query, .. } => assert_eq!(query, "age:30"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn create_with_schema_spec() {
        match Command::from_args("create", &args(&["app", "users", "name:string:required:indexed,age:int"])).unwrap() {
            Command::CreateCollection { schema, .. } => {
                assert_eq!(schema.fields().len(), 2);
                assert!(schema.fields()[0].indexed);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn unknown_and_malformed() {
        assert!(Command::from_args("drop", &[]).is_err());
        assert!(Command::from_args("schema", &args(&["app"])).is_err());
        assert!(Command::from_args("insert", &args(&["app", "users", "{not json"])).is_err());
        assert!(Command::from_args("find", &args(&["app", "users", "a:1", "b:2"])).is_err());
    }
}
