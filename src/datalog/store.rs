//! The remote Datalog backend.
//!
//! Holds no local state: every operation is one or two scripts sent to the
//! engine. Rules are rows in the `rule` relation, and their bodies are
//! prepended to every ad-hoc query.

use serde_json::{json, Map, Value};
use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::client::{CozoClient, ScriptRunner};
use super::schema::ensure_schema;
use crate::backend::{CrmBackend, Fact, Person, QueryOutput, Rule};
use crate::config::{BackendKind, DatalogConfig};
use crate::error::{CrmError, Result};
use crate::props::Properties;

const FIND_PEOPLE: &str = "?[name, id] := *person{id, name}, is_in(name, $names)";

const PUT_PERSON: &str = "?[id, name, data] <- [[$id, $name, $data]]
:put person {id => name, data}";

const PUT_FACT: &str = "?[id, from, to, type, data] <- [[$id, $from, $to, $type, $data]]
:put fact {id => from, to, type, data}";

const PUT_RULE: &str = "?[name, body, description] <- [[$name, $body, $description]]
:put rule {name => body, description}";

const GET_RULE: &str =
    "?[name, body, description] := *rule{name, body, description}, name = $name";

const LIST_RULES: &str = "?[name, body, description] := *rule{name, body, description}";

const RULE_BODIES: &str = "?[body] := *rule{body}";

const RELATION_TYPES: &str = "?[type] := *fact{type}";

/// Datalog backend over any [`ScriptRunner`].
///
/// When built with a schema path, the schema is checked before each write
/// until one check succeeds, so an engine that was down at startup is
/// bootstrapped on first use.
pub struct DatalogStore {
    runner: Box<dyn ScriptRunner>,
    schema_path: Option<PathBuf>,
    schema_ready: AtomicBool,
}

impl DatalogStore {
    /// Connect over HTTP and make sure the schema exists.
    ///
    /// Schema problems are logged, not returned; writes retry the check.
    pub fn connect(config: &DatalogConfig) -> Result<Self> {
        let client = CozoClient::new(config)?;
        info!(endpoint = client.endpoint(), "using datalog engine");
        let store = Self::with_schema(Box::new(client), config.schema_path.clone());
        store.init_schema();
        Ok(store)
    }

    /// Wrap a runner whose schema is managed elsewhere.
    pub fn new(runner: Box<dyn ScriptRunner>) -> Self {
        Self {
            runner,
            schema_path: None,
            schema_ready: AtomicBool::new(true),
        }
    }

    /// Wrap a runner and bootstrap the schema from `schema_path` on demand.
    pub fn with_schema(runner: Box<dyn ScriptRunner>, schema_path: PathBuf) -> Self {
        Self {
            runner,
            schema_path: Some(schema_path),
            schema_ready: AtomicBool::new(false),
        }
    }

    /// Best-effort schema bootstrap.
    pub fn init_schema(&self) {
        if let Err(e) = self.ensure_ready() {
            warn!(error = %e, "datalog schema initialization failed");
        }
    }

    /// Run the schema check unless one already succeeded.
    fn ensure_ready(&self) -> Result<()> {
        if self.schema_ready.load(Ordering::Acquire) {
            return Ok(());
        }
        if let Some(path) = &self.schema_path {
            ensure_schema(self.runner.as_ref(), path)?;
        }
        self.schema_ready.store(true, Ordering::Release);
        Ok(())
    }

    fn run(&self, script: &str, params: Map<String, Value>) -> Result<QueryOutput> {
        self.runner.run_script(script, &params)
    }

    /// Resolve names to ids in one round trip.
    fn find_people(&self, names: &[&str]) -> Result<HashMap<String, String>> {
        let output = self.run(FIND_PEOPLE, params([("names", json!(names))]))?;
        let ids = output
            .rows
            .iter()
            .filter_map(|row| {
                let name = row.str_at(0, "name")?;
                let id = row.str_at(1, "id")?;
                Some((name.to_string(), id.to_string()))
            })
            .collect();
        Ok(ids)
    }

    /// Stored rule bodies, in the engine's order.
    fn rule_bodies(&self) -> Result<Vec<String>> {
        let output = self.run(RULE_BODIES, Map::new())?;
        Ok(output
            .rows
            .iter()
            .filter_map(|row| row.str_at(0, "body").map(String::from))
            .collect())
    }
}

impl CrmBackend for DatalogStore {
    fn kind(&self) -> BackendKind {
        BackendKind::Datalog
    }

    fn add_person(&self, name: &str, properties: &Properties) -> Result<Person> {
        self.ensure_ready()?;
        if self.find_people(&[name])?.contains_key(name) {
            return Err(CrmError::DuplicatePerson(name.to_string()));
        }

        let person = Person::new(name, properties.clone());
        self.run(
            PUT_PERSON,
            params([
                ("id", json!(person.id)),
                ("name", json!(person.name)),
                ("data", person.properties.as_value().clone()),
            ]),
        )?;
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
        self.ensure_ready()?;
        let ids = self.find_people(&[from_name, to_name])?;
        let from_id = ids
            .get(from_name)
            .ok_or_else(|| CrmError::PersonNotFound(from_name.to_string()))?;
        let to_id = ids
            .get(to_name)
            .ok_or_else(|| CrmError::PersonNotFound(to_name.to_string()))?;

        self.run(
            PUT_FACT,
            params([
                ("id", json!(Uuid::new_v4().to_string())),
                ("from", json!(from_id)),
                ("to", json!(to_id)),
                ("type", json!(rel_type)),
                ("data", properties.as_value().clone()),
            ]),
        )?;
        info!(from = from_name, to = to_name, rel_type, "added fact");
        Ok(Fact {
            from: from_name.to_string(),
            to: to_name.to_string(),
            rel_type: rel_type.to_string(),
            properties: properties.clone(),
        })
    }

    fn add_rule(&self, rule: &Rule) -> Result<()> {
        self.ensure_ready()?;
        self.run(
            PUT_RULE,
            params([
                ("name", json!(rule.name)),
                ("body", json!(rule.body)),
                ("description", json!(rule.description)),
            ]),
        )?;
        info!(name = %rule.name, "saved rule");
        Ok(())
    }

    fn get_rule(&self, name: &str) -> Result<Option<Rule>> {
        let output = self.run(GET_RULE, params([("name", json!(name))]))?;
        Ok(output.rows.first().map(|row| Rule {
            name: row.text_at(0, "name"),
            body: row.text_at(1, "body"),
            description: row.text_at(2, "description"),
        }))
    }

    fn list_rules(&self) -> Result<Vec<Rule>> {
        let output = self.run(LIST_RULES, Map::new())?;
        Ok(output
            .rows
            .iter()
            .map(|row| Rule {
                name: row.text_at(0, "name"),
                body: row.text_at(1, "body"),
                description: row.text_at(2, "description"),
            })
            .collect())
    }

    fn run_query(&self, query: &str, params: &Map<String, Value>) -> Result<QueryOutput> {
        let bodies = self.rule_bodies()?;
        debug!(rules = bodies.len(), "prepending stored rules");

        let script = if bodies.is_empty() {
            query.to_string()
        } else {
            format!("{}\n{}", bodies.join("\n"), query)
        };
        self.runner.run_script(&script, params)
    }

    fn relation_types(&self) -> Result<Vec<String>> {
        let output = self.run(RELATION_TYPES, Map::new())?;
        let types: BTreeSet<String> = output
            .rows
            .iter()
            .filter_map(|row| row.str_at(0, "type").map(String::from))
            .collect();
        Ok(types.into_iter().collect())
    }

    fn sample_people(&self, limit: usize) -> Result<Vec<Person>> {
        let script = format!(
            "?[id, name, data] := *person{{id, name, data}}\n:limit {}",
            limit
        );
        let output = self.run(&script, Map::new())?;
        Ok(output
            .rows
            .iter()
            .map(|row| Person {
                id: row.text_at(0, "id"),
                name: row.text_at(1, "name"),
                properties: Properties::from_value(
                    row.get(2, "data").cloned().unwrap_or(Value::Null),
                ),
            })
            .collect())
    }
}

fn params<const N: usize>(pairs: [(&str, Value); N]) -> Map<String, Value> {
    pairs
        .into_iter()
        .map(|(key, value)| (key.to_string(), value))
        .collect()
}
