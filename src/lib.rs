//! # Personal CRM
//!
//! People, relationships and reusable rules for AI agents, served as MCP
//! tools.
//!
//! Two interchangeable backends implement the same tool surface:
//!
//! - **Graph**: an embedded property-graph store in a local file. People
//!   and rules are node tables, every relationship type gets its own edge
//!   table on first use.
//! - **Datalog**: a remote CozoDB server reached over HTTP. Facts share
//!   one relation, and stored rules are prepended to every ad-hoc query.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use crm::{call_tool, open_backend, CrmConfig};
//! use serde_json::json;
//!
//! let backend = open_backend(&CrmConfig::default()).unwrap();
//! let result = call_tool(backend.as_ref(), "add_person", &json!({"name": "Alice"}));
//! println!("{}", result.as_text());
//! // Added person: Alice (3f0c...)
//! ```

pub mod backend;
pub mod cli;
pub mod config;
pub mod datalog;
pub mod error;
pub mod graph;
pub mod logging;
pub mod mcp;
pub mod props;
pub mod row;

// Re-exports for convenience
pub use backend::{open_backend, CrmBackend, Fact, Person, QueryOutput, Rule};
pub use config::{BackendKind, CrmConfig};
pub use datalog::DatalogStore;
pub use error::{CrmError, Result};
pub use graph::GraphStore;
pub use mcp::{call_tool, list_tools};
pub use props::Properties;
pub use row::Row;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn text(backend: &dyn CrmBackend, tool: &str, args: serde_json::Value) -> String {
        call_tool(backend, tool, &args).as_text().to_string()
    }

    #[test]
    fn test_family_tree_session() {
        let store = GraphStore::open_in_memory().unwrap();
        let backend: &dyn CrmBackend = &store;

        for (name, props) in [
            ("Ann", r#"{"born": 1950}"#),
            ("Carl", r#"{"born": 1978}"#),
            ("Dora", r#"{"born": 1981}"#),
        ] {
            let out = text(backend, "add_person", json!({"name": name, "properties": props}));
            assert!(out.starts_with("Added person:"), "{out}");
        }

        for child in ["Carl", "Dora"] {
            let out = text(
                backend,
                "add_fact",
                json!({"from_name": "Ann", "to_name": child, "type": "parent_child"}),
            );
            assert_eq!(out, format!("Added fact: Ann --[parent_child]--> {}", child));
        }

        let siblings = "SELECT a.name AS sibling FROM rel_parent_child x \
            JOIN rel_parent_child y ON x.from_uuid = y.from_uuid AND x.to_uuid != y.to_uuid \
            JOIN Person a ON a.uuid = y.to_uuid \
            JOIN Person b ON b.uuid = x.to_uuid WHERE b.name = :name";
        text(
            backend,
            "add_rule",
            json!({"name": "siblings", "body": siblings, "description": "siblings of :name"}),
        );

        let rule_body = store.get_rule("siblings").unwrap().unwrap().body;
        let out = text(
            backend,
            "run_cypher",
            json!({"query": rule_body, "params": {"name": "Carl"}}),
        );
        assert_eq!(out, r#"{"sibling":"Dora"}"#);

        assert_eq!(
            text(backend, "list_relation_types", json!({})),
            "Existing Relation Types: parent_child"
        );
        assert_eq!(text(backend, "list_rules", json!({})), "- siblings: siblings of :name");
    }

    #[test]
    fn test_reexports_line_up() {
        let person = Person::new("Eve", Properties::empty());
        assert_eq!(person.properties.to_string(), "{}");
        assert_eq!(CrmConfig::default().backend, BackendKind::Graph);
        assert_eq!(list_tools(BackendKind::Graph).len(), 8);
    }
}
