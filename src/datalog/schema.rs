//! Schema bootstrap for the Datalog engine.

use serde_json::Map;
use std::path::Path;
use tracing::{debug, info, warn};

use super::client::ScriptRunner;
use crate::error::Result;

/// Relation whose presence means the schema is already in place.
pub const PERSON_RELATION: &str = "person";

/// Shipped schema, used when the configured file cannot be read.
pub const DEFAULT_SCHEMA: &str = include_str!("../../schema/crm.cozo");

/// Create the CRM relations unless `person` already exists.
///
/// Returns `true` when the schema script was run.
pub fn ensure_schema(runner: &dyn ScriptRunner, schema_path: &Path) -> Result<bool> {
    let relations = runner.run_script("::relations", &Map::new())?;
    let present = relations
        .rows
        .iter()
        .any(|row| row.str_at(0, "name") == Some(PERSON_RELATION));
    if present {
        debug!("datalog schema already present");
        return Ok(false);
    }

    let script = load_schema_script(schema_path);
    runner.run_script(&script, &Map::new())?;
    info!(path = %schema_path.display(), "initialized datalog schema");
    Ok(true)
}

fn load_schema_script(path: &Path) -> String {
    match std::fs::read_to_string(path) {
        Ok(script) => script,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "schema file unreadable, using built-in schema");
            DEFAULT_SCHEMA.to_string()
        }
    }
}
