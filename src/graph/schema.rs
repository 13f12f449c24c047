//! Schema for the embedded property-graph store.
//!
//! Two fixed node tables plus one relationship table per relationship
//! type, created the first time that type is used.

use rusqlite::{Connection, OptionalExtension};
use tracing::{debug, info, warn};

use crate::error::{CrmError, Result};

pub const PERSON_TABLE: &str = "Person";
pub const RULE_TABLE: &str = "Rule";

/// Prefix that keeps relationship tables apart from node tables.
pub const REL_TABLE_PREFIX: &str = "rel_";

const PERSON_DDL: &str = "CREATE TABLE Person (
    uuid TEXT PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    data TEXT NOT NULL
)";

const RULE_DDL: &str = "CREATE TABLE Rule (
    name TEXT PRIMARY KEY,
    query TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT ''
)";

/// Create the fixed tables.
///
/// Existing tables are left alone. Any other failure is logged and
/// skipped so the server can still start against a partial schema.
pub fn init_schema(conn: &Connection) {
    if let Err(e) = conn.execute_batch("PRAGMA foreign_keys = ON;") {
        warn!(error = %e, "could not enable foreign keys");
    }
    for (table, ddl) in [(PERSON_TABLE, PERSON_DDL), (RULE_TABLE, RULE_DDL)] {
        if let Err(e) = create_table(conn, table, ddl) {
            warn!(table, error = %e, "table creation skipped/failed");
        }
    }
}

/// Keep only ASCII letters, digits and underscores.
///
/// Fails when nothing survives.
pub fn sanitize_rel_type(raw: &str) -> Result<String> {
    let safe: String = raw
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect();
    if safe.is_empty() {
        return Err(CrmError::InvalidRelationType(raw.to_string()));
    }
    Ok(safe)
}

/// Table name for an already-sanitized relationship type.
pub fn rel_table_name(safe_type: &str) -> String {
    format!("{}{}", REL_TABLE_PREFIX, safe_type)
}

/// Create the relationship table for `safe_type` if it is missing.
///
/// Returns `true` when the table was created by this call.
pub fn ensure_rel_table(conn: &Connection, safe_type: &str) -> Result<bool> {
    let table = rel_table_name(safe_type);
    let ddl = format!(
        "CREATE TABLE \"{table}\" (
            from_uuid TEXT NOT NULL REFERENCES Person(uuid),
            to_uuid TEXT NOT NULL REFERENCES Person(uuid),
            data TEXT NOT NULL
        )"
    );
    create_table(conn, &table, &ddl)
}

/// The relationship type as its table was first created.
///
/// Table names compare case-insensitively, so `Spouse` resolves to an
/// existing `rel_spouse` and comes back as `spouse`.
pub fn stored_rel_type(conn: &Connection, safe_type: &str) -> Result<Option<String>> {
    let table: Option<String> = conn
        .query_row(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?1 COLLATE NOCASE",
            [rel_table_name(safe_type)],
            |row| row.get(0),
        )
        .optional()?;
    Ok(table.and_then(|name| name.get(REL_TABLE_PREFIX.len()..).map(String::from)))
}

/// Run one `CREATE TABLE`, treating "already exists" as success.
fn create_table(conn: &Connection, table: &str, ddl: &str) -> Result<bool> {
    match conn.execute_batch(ddl) {
        Ok(()) => {
            info!(table, "created table");
            Ok(true)
        }
        Err(e) if is_already_exists(&e) => {
            debug!(table, "table already exists");
            Ok(false)
        }
        Err(e) => Err(e.into()),
    }
}

fn is_already_exists(err: &rusqlite::Error) -> bool {
    err.to_string().contains("already exists")
}
