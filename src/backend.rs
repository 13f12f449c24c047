//! The operations every backend provides, and the records they exchange.

use tracing::info;
use uuid::Uuid;

use crate::config::{BackendKind, CrmConfig};
use crate::datalog::DatalogStore;
use crate::error::Result;
use crate::graph::GraphStore;
use crate::props::Properties;
use crate::row::Row;

/// A person node.
#[derive(Debug, Clone, PartialEq)]
pub struct Person {
    pub id: String,
    pub name: String,
    pub properties: Properties,
}

impl Person {
    /// A new person with a fresh UUID v4 identifier.
    pub fn new(name: impl Into<String>, properties: Properties) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            properties,
        }
    }
}

/// A directed, typed relationship between two people.
#[derive(Debug, Clone, PartialEq)]
pub struct Fact {
    pub from: String,
    pub to: String,
    /// The label as stored, after any backend-specific sanitizing.
    pub rel_type: String,
    pub properties: Properties,
}

/// A stored, named query fragment.
#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    pub name: String,
    pub body: String,
    pub description: String,
}

/// Raw result of an ad-hoc query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryOutput {
    pub headers: Vec<String>,
    pub rows: Vec<Row>,
}

/// A storage engine that can serve the CRM tools.
///
/// Implementations own their connection state and are shared by reference
/// across tool calls.
pub trait CrmBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Insert a person unless the name is already taken.
    fn add_person(&self, name: &str, properties: &Properties) -> Result<Person>;

    /// Link two existing people by name.
    fn add_fact(
        &self,
        from_name: &str,
        to_name: &str,
        rel_type: &str,
        properties: &Properties,
    ) -> Result<Fact>;

    /// Upsert a rule by name.
    fn add_rule(&self, rule: &Rule) -> Result<()>;

    fn get_rule(&self, name: &str) -> Result<Option<Rule>>;

    /// All rules, in the backend's natural order.
    fn list_rules(&self) -> Result<Vec<Rule>>;

    /// Run caller-supplied query text as-is.
    fn run_query(&self, query: &str, params: &serde_json::Map<String, serde_json::Value>)
        -> Result<QueryOutput>;

    /// Distinct relationship labels in use, sorted.
    fn relation_types(&self) -> Result<Vec<String>>;

    /// Up to `limit` people, in the backend's natural order.
    fn sample_people(&self, limit: usize) -> Result<Vec<Person>>;
}

/// Open the backend selected by `config`, initializing its schema.
pub fn open_backend(config: &CrmConfig) -> Result<Box<dyn CrmBackend>> {
    info!(backend = %config.backend, "opening backend");
    match config.backend {
        BackendKind::Graph => Ok(Box::new(GraphStore::open(&config.graph)?)),
        BackendKind::Datalog => Ok(Box::new(DatalogStore::connect(&config.datalog)?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_person_ids_are_unique_uuids() {
        let a = Person::new("Alice", Properties::empty());
        let b = Person::new("Alice", Properties::empty());
        assert_ne!(a.id, b.id);
        assert!(Uuid::parse_str(&a.id).is_ok());
        assert_eq!(a.name, "Alice");
    }

    #[test]
    fn test_open_graph_backend() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = CrmConfig::default();
        config.graph.path = dir.path().join("nested").join("crm.db");

        let backend = open_backend(&config).unwrap();
        assert_eq!(backend.kind(), BackendKind::Graph);
        assert!(config.graph.path.exists());
        assert!(backend.list_rules().unwrap().is_empty());
    }
}
