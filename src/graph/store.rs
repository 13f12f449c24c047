//! The embedded property-graph store.
//!
//! People and rules live in node tables; each relationship type gets its
//! own edge table. One connection is shared behind a mutex.

use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

use super::schema::{self, REL_TABLE_PREFIX};
use crate::backend::{CrmBackend, Fact, Person, QueryOutput, Rule};
use crate::config::{BackendKind, GraphConfig};
use crate::error::{CrmError, Result};
use crate::props::Properties;
use crate::row::Row;

/// Property-graph backend over an embedded database file.
pub struct GraphStore {
    conn: Mutex<Connection>,
}

impl GraphStore {
    /// Open (or create) the database at the configured path.
    pub fn open(config: &GraphConfig) -> Result<Self> {
        if let Some(parent) = config.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(&config.path)?;
        info!(path = %config.path.display(), "opened graph store");
        Ok(Self::with_connection(conn))
    }

    /// A throwaway store, for tests and dry runs.
    pub fn open_in_memory() -> Result<Self> {
        Ok(Self::with_connection(Connection::open_in_memory()?))
    }

    fn with_connection(conn: Connection) -> Self {
        schema::init_schema(&conn);
        Self {
            conn: Mutex::new(conn),
        }
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        // A panic mid-call leaves SQLite itself consistent, so keep serving.
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Count the edges stored under one relationship type.
    pub fn count_facts(&self, rel_type: &str) -> Result<usize> {
        let safe = schema::sanitize_rel_type(rel_type)?;
        let conn = self.conn();
        if !table_exists(&conn, &schema::rel_table_name(&safe))? {
            return Ok(0);
        }
        let sql = format!("SELECT COUNT(*) FROM \"{}\"", schema::rel_table_name(&safe));
        let count: i64 = conn.query_row(&sql, [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Count all people.
    pub fn count_people(&self) -> Result<usize> {
        let count: i64 = self
            .conn()
            .query_row("SELECT COUNT(*) FROM Person", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

impl CrmBackend for GraphStore {
    fn kind(&self) -> BackendKind {
        BackendKind::Graph
    }

    fn add_person(&self, name: &str, properties: &Properties) -> Result<Person> {
        let conn = self.conn();
        if find_person_id(&conn, name)?.is_some() {
            return Err(CrmError::DuplicatePerson(name.to_string()));
        }

        let person = Person::new(name, properties.clone());
        conn.execute(
            "INSERT INTO Person (uuid, name, data) VALUES (?1, ?2, ?3)",
            params![person.id, person.name, person.properties.to_json_string()],
        )
        .map_err(|e| match e.sqlite_error_code() {
            // lost a race with another writer: the UNIQUE index caught it
            Some(ErrorCode::ConstraintViolation) => CrmError::DuplicatePerson(name.to_string()),
            _ => CrmError::Database(e),
        })?;

        info!(name, id = %person.id, "added person");
        Ok(person)
    }

    fn add_fact(
        &self,
        from_name: &str,
        to_name: &str,
        rel_type: &str,
        properties: &Properties,
    ) -> Result<Fact> {
        let safe_type = schema::sanitize_rel_type(rel_type)?;
        let conn = self.conn();

        let from_id = find_person_id(&conn, from_name)?
            .ok_or_else(|| CrmError::PersonNotFound(from_name.to_string()))?;
        let to_id = find_person_id(&conn, to_name)?
            .ok_or_else(|| CrmError::PersonNotFound(to_name.to_string()))?;

        schema::ensure_rel_table(&conn, &safe_type)?;
        let stored_type = schema::stored_rel_type(&conn, &safe_type)?.unwrap_or(safe_type);
        let sql = format!(
            "INSERT INTO \"{}\" (from_uuid, to_uuid, data) VALUES (?1, ?2, ?3)",
            schema::rel_table_name(&stored_type)
        );
        conn.execute(&sql, params![from_id, to_id, properties.to_json_string()])?;

        info!(from = from_name, to = to_name, rel_type = %stored_type, "added fact");
        Ok(Fact {
            from: from_name.to_string(),
            to: to_name.to_string(),
            rel_type: stored_type,
            properties: properties.clone(),
        })
    }

    fn add_rule(&self, rule: &Rule) -> Result<()> {
        self.conn().execute(
            "INSERT INTO Rule (name, query, description) VALUES (?1, ?2, ?3)
             ON CONFLICT(name) DO UPDATE SET
                query = excluded.query,
                description = excluded.description",
            params![rule.name, rule.body, rule.description],
        )?;
        info!(name = %rule.name, "saved rule");
        Ok(())
    }

    fn get_rule(&self, name: &str) -> Result<Option<Rule>> {
        let rule = self
            .conn()
            .query_row(
                "SELECT name, query, description FROM Rule WHERE name = ?1",
                [name],
                |row| {
                    Ok(Rule {
                        name: row.get(0)?,
                        body: row.get(1)?,
                        description: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(rule)
    }

    fn list_rules(&self) -> Result<Vec<Rule>> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT name, query, description FROM Rule")?;
        let rules = stmt
            .query_map([], |row| {
                Ok(Rule {
                    name: row.get(0)?,
                    body: row.get(1)?,
                    description: row.get(2)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rules)
    }

    fn run_query(&self, query: &str, params: &Map<String, Value>) -> Result<QueryOutput> {
        debug!(query, "running raw query");
        let conn = self.conn();
        let mut stmt = conn.prepare(query)?;

        for (key, value) in params {
            let index = [":", "$", "@"]
                .iter()
                .find_map(|prefix| {
                    stmt.parameter_index(&format!("{}{}", prefix, key))
                        .transpose()
                })
                .transpose()?
                .ok_or_else(|| {
                    CrmError::InvalidArgument(format!("query has no parameter named '{}'", key))
                })?;
            stmt.raw_bind_parameter(index, json_to_sql(value))?;
        }

        let headers: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let mut rows = stmt.raw_query();
        let mut output = Vec::new();
        while let Some(row) = rows.next()? {
            let cells = (0..headers.len())
                .map(|i| row.get_ref(i).map(sql_to_json))
                .collect::<std::result::Result<Vec<_>, _>>()?;
            output.push(Row::keyed(&headers, cells));
        }

        Ok(QueryOutput {
            headers,
            rows: output,
        })
    }

    fn relation_types(&self) -> Result<Vec<String>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT name FROM sqlite_master
             WHERE type = 'table' AND substr(name, 1, length(?1)) = ?1",
        )?;
        let names = stmt
            .query_map([REL_TABLE_PREFIX], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let types: BTreeSet<String> = names
            .into_iter()
            .filter_map(|name| name.strip_prefix(REL_TABLE_PREFIX).map(String::from))
            .filter(|t| !t.is_empty())
            .collect();
        Ok(types.into_iter().collect())
    }

    fn sample_people(&self, limit: usize) -> Result<Vec<Person>> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT uuid, name, data FROM Person LIMIT ?1")?;
        let people = stmt
            .query_map([limit as i64], |row| {
                let data: String = row.get(2)?;
                Ok(Person {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    properties: Properties::from_stored(&data),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(people)
    }
}

fn find_person_id(conn: &Connection, name: &str) -> Result<Option<String>> {
    let id = conn
        .query_row("SELECT uuid FROM Person WHERE name = ?1", [name], |row| {
            row.get(0)
        })
        .optional()?;
    Ok(id)
}

fn table_exists(conn: &Connection, table: &str) -> Result<bool> {
    let found = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1 COLLATE NOCASE",
            [table],
            |_| Ok(()),
        )
        .optional()?;
    Ok(found.is_some())
}

fn sql_to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ValueRef::Text(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => Value::String(format!("<blob: {} bytes>", bytes.len())),
    }
}

fn json_to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => SqlValue::Real(n.as_f64().unwrap_or_default()),
        },
        Value::String(s) => SqlValue::Text(s.clone()),
        // nested values are stored as JSON text, like property bags
        other => SqlValue::Text(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store() -> GraphStore {
        GraphStore::open_in_memory().unwrap()
    }

    fn props(text: &str) -> Properties {
        Properties::parse(text).unwrap()
    }

    #[test]
    fn test_add_person() {
        let store = store();
        let person = store.add_person("Alice", &props(r#"{"job": "Dev"}"#)).unwrap();

        assert_eq!(person.name, "Alice");
        assert_eq!(store.count_people().unwrap(), 1);

        let sample = store.sample_people(5).unwrap();
        assert_eq!(sample.len(), 1);
        assert_eq!(sample[0].id, person.id);
        assert_eq!(sample[0].properties.as_value(), &json!({"job": "Dev"}));
    }

    #[test]
    fn test_duplicate_person_is_rejected_without_write() {
        let store = store();
        store.add_person("Alice", &Properties::empty()).unwrap();

        let err = store.add_person("Alice", &props(r#"{"x": 1}"#)).unwrap_err();
        assert!(matches!(err, CrmError::DuplicatePerson(ref n) if n == "Alice"));
        assert_eq!(store.count_people().unwrap(), 1);
    }

    #[test]
    fn test_unique_index_backs_the_name_check() {
        let store = store();
        store.add_person("Alice", &Properties::empty()).unwrap();

        // a writer that skips the pre-check still cannot create a duplicate
        let err = store
            .run_query(
                "INSERT INTO Person (uuid, name, data) VALUES ('x', 'Alice', '{}')",
                &Map::new(),
            )
            .unwrap_err();
        assert!(matches!(err, CrmError::Database(_)));
        assert_eq!(store.count_people().unwrap(), 1);
    }

    #[test]
    fn test_add_fact() {
        let store = store();
        store.add_person("Alice", &Properties::empty()).unwrap();
        store.add_person("Bob", &Properties::empty()).unwrap();

        let fact = store
            .add_fact("Alice", "Bob", "spouse", &props(r#"{"since": 2010}"#))
            .unwrap();
        assert_eq!(fact.rel_type, "spouse");
        assert_eq!(store.count_facts("spouse").unwrap(), 1);

        // identical facts are not de-duplicated
        store
            .add_fact("Alice", "Bob", "spouse", &props(r#"{"since": 2010}"#))
            .unwrap();
        assert_eq!(store.count_facts("spouse").unwrap(), 2);
    }

    #[test]
    fn test_add_fact_sanitizes_type() {
        let store = store();
        store.add_person("Alice", &Properties::empty()).unwrap();
        store.add_person("Bob", &Properties::empty()).unwrap();

        let fact = store
            .add_fact("Alice", "Bob", "a-b c!", &Properties::empty())
            .unwrap();
        assert_eq!(fact.rel_type, "abc");
        assert_eq!(store.relation_types().unwrap(), vec!["abc".to_string()]);
    }

    #[test]
    fn test_add_fact_reuses_table_across_case() {
        let store = store();
        store.add_person("Alice", &Properties::empty()).unwrap();
        store.add_person("Bob", &Properties::empty()).unwrap();

        store
            .add_fact("Alice", "Bob", "spouse", &Properties::empty())
            .unwrap();
        let fact = store
            .add_fact("Bob", "Alice", "Spouse", &Properties::empty())
            .unwrap();
        assert_eq!(fact.rel_type, "spouse");
        assert_eq!(store.relation_types().unwrap(), vec!["spouse".to_string()]);
        assert_eq!(store.count_facts("spouse").unwrap(), 2);
        assert_eq!(store.count_facts("SPOUSE").unwrap(), 2);
    }

    #[test]
    fn test_add_fact_invalid_type() {
        let store = store();
        store.add_person("Alice", &Properties::empty()).unwrap();
        store.add_person("Bob", &Properties::empty()).unwrap();

        let err = store
            .add_fact("Alice", "Bob", "-!", &Properties::empty())
            .unwrap_err();
        assert!(matches!(err, CrmError::InvalidRelationType(_)));
        assert!(store.relation_types().unwrap().is_empty());
    }

    #[test]
    fn test_add_fact_missing_endpoint_writes_nothing() {
        let store = store();
        store.add_person("Alice", &Properties::empty()).unwrap();

        let err = store
            .add_fact("Alice", "Ghost", "friend", &Properties::empty())
            .unwrap_err();
        assert!(matches!(err, CrmError::PersonNotFound(ref n) if n == "Ghost"));

        let err = store
            .add_fact("Ghost", "Alice", "friend", &Properties::empty())
            .unwrap_err();
        assert!(matches!(err, CrmError::PersonNotFound(ref n) if n == "Ghost"));

        assert_eq!(store.count_facts("friend").unwrap(), 0);
        // the edge table is only created once both endpoints resolve
        assert!(store.relation_types().unwrap().is_empty());
    }

    #[test]
    fn test_relation_types_distinct_and_sorted() {
        let store = store();
        store.add_person("A", &Properties::empty()).unwrap();
        store.add_person("B", &Properties::empty()).unwrap();

        for t in ["spouse", "colleague", "spouse", "parent_child", "colleague"] {
            store.add_fact("A", "B", t, &Properties::empty()).unwrap();
        }

        assert_eq!(
            store.relation_types().unwrap(),
            vec!["colleague", "parent_child", "spouse"]
        );
    }

    #[test]
    fn test_rule_upsert_round_trip() {
        let store = store();
        let rule = Rule {
            name: "adults".into(),
            body: "SELECT name FROM Person".into(),
            description: "everyone".into(),
        };
        store.add_rule(&rule).unwrap();
        assert_eq!(store.get_rule("adults").unwrap(), Some(rule.clone()));

        let updated = Rule {
            body: "SELECT name FROM Person LIMIT 1".into(),
            description: "first person".into(),
            ..rule
        };
        store.add_rule(&updated).unwrap();

        assert_eq!(store.get_rule("adults").unwrap(), Some(updated.clone()));
        assert_eq!(store.list_rules().unwrap(), vec![updated]);
        assert_eq!(store.get_rule("missing").unwrap(), None);
    }

    #[test]
    fn test_sample_people_limit() {
        let store = store();
        for i in 0..8 {
            store
                .add_person(&format!("person{}", i), &Properties::empty())
                .unwrap();
        }
        assert_eq!(store.sample_people(5).unwrap().len(), 5);
        assert_eq!(store.sample_people(20).unwrap().len(), 8);
    }

    #[test]
    fn test_run_query_rows_are_keyed() {
        let store = store();
        store.add_person("Alice", &props(r#"{"age": 30}"#)).unwrap();

        let output = store
            .run_query("SELECT name, data, 1.5 AS score FROM Person", &Map::new())
            .unwrap();
        assert_eq!(output.headers, vec!["name", "data", "score"]);
        assert_eq!(output.rows.len(), 1);
        assert_eq!(output.rows[0].str_at(0, "name"), Some("Alice"));
        assert_eq!(output.rows[0].get(2, "score"), Some(&json!(1.5)));
    }

    #[test]
    fn test_run_query_named_params() {
        let store = store();
        store.add_person("Alice", &Properties::empty()).unwrap();
        store.add_person("Bob", &Properties::empty()).unwrap();

        let mut params = Map::new();
        params.insert("name".into(), json!("Bob"));
        let output = store
            .run_query("SELECT name FROM Person WHERE name = :name", &params)
            .unwrap();
        assert_eq!(output.rows.len(), 1);
        assert_eq!(output.rows[0].str_at(0, "name"), Some("Bob"));

        params.insert("nope".into(), json!(1));
        let err = store
            .run_query("SELECT name FROM Person WHERE name = :name", &params)
            .unwrap_err();
        assert!(err.to_string().contains("nope"));
    }

    #[test]
    fn test_run_query_write_statement_returns_no_rows() {
        let store = store();
        let output = store
            .run_query(
                "INSERT INTO Rule (name, query) VALUES ('r', 'SELECT 1')",
                &Map::new(),
            )
            .unwrap();
        assert!(output.rows.is_empty());
        assert!(store.get_rule("r").unwrap().is_some());
    }

    #[test]
    fn test_run_query_reports_syntax_errors() {
        let store = store();
        let err = store.run_query("SELEC nonsense", &Map::new()).unwrap_err();
        assert!(matches!(err, CrmError::Database(_)));
    }

    #[test]
    fn test_open_on_disk_persists() {
        let dir = tempfile::tempdir().unwrap();
        let config = GraphConfig {
            path: dir.path().join("crm.db"),
        };

        {
            let store = GraphStore::open(&config).unwrap();
            store.add_person("Alice", &Properties::empty()).unwrap();
        }

        let store = GraphStore::open(&config).unwrap();
        let err = store.add_person("Alice", &Properties::empty()).unwrap_err();
        assert!(matches!(err, CrmError::DuplicatePerson(_)));
    }
}
