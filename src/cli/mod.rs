//! CLI module for the CRM tools.
//!
//! Each subcommand maps onto exactly one tool call, so the command line
//! and MCP clients see the same text.

use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use std::path::PathBuf;

use crate::config::{BackendKind, DEFAULT_CONFIG_FILE};
use crate::mcp::tools;

#[derive(Parser)]
#[command(name = "crm")]
#[command(about = "Personal CRM - people, relationships and rules in a graph", long_about = None)]
pub struct Cli {
    /// Config file (TOML)
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE, global = true)]
    pub config: PathBuf,

    /// Override the configured backend
    #[arg(short, long, value_enum, global = true)]
    pub backend: Option<BackendKind>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Commands {
    // ─── Write ────────────────────────────────────────────────────
    /// Add a person
    AddPerson {
        /// Person name (unique)
        name: String,

        /// JSON object of properties
        #[arg(short, long, default_value = "{}")]
        properties: String,
    },

    /// Add a directed relationship between two people
    AddFact {
        /// Subject person
        from: String,

        /// Object person
        to: String,

        /// Relationship type, e.g. spouse or parent_child
        #[arg(short = 't', long = "type")]
        rel_type: String,

        /// JSON object of details
        #[arg(short, long, default_value = "{}")]
        properties: String,
    },

    /// Save (or replace) a named rule
    AddRule {
        name: String,

        /// Query text of the rule
        body: String,

        #[arg(short, long, default_value = "")]
        description: String,
    },

    // ─── Read ─────────────────────────────────────────────────────
    /// Show one rule
    GetRule { name: String },

    /// List all rules
    Rules,

    /// Run a raw query (stored rules are prepended on the datalog backend)
    Query {
        query: String,

        /// JSON object of named parameters
        #[arg(long)]
        params: Option<String>,
    },

    /// Search facts with a rule-aware query (datalog backend)
    SearchFacts { query: String },

    /// List relationship types in use
    RelationTypes,

    /// Show a sample of people
    People,
}

impl Commands {
    /// The tool name and arguments this command stands for.
    pub fn to_tool_call(&self, kind: BackendKind) -> (&'static str, Value) {
        match self {
            Commands::AddPerson { name, properties } => (
                tools::ADD_PERSON,
                json!({ "name": name, "properties": properties }),
            ),
            Commands::AddFact {
                from,
                to,
                rel_type,
                properties,
            } => (
                tools::ADD_FACT,
                json!({
                    "from_name": from,
                    "to_name": to,
                    "type": rel_type,
                    "properties": properties,
                }),
            ),
            Commands::AddRule {
                name,
                body,
                description,
            } => (
                tools::ADD_RULE,
                json!({ "name": name, "body": body, "description": description }),
            ),
            Commands::GetRule { name } => (tools::GET_RULE, json!({ "name": name })),
            Commands::Rules => (tools::LIST_RULES, json!({})),
            Commands::Query { query, params } => {
                let tool = match kind {
                    BackendKind::Graph => tools::RUN_CYPHER,
                    BackendKind::Datalog => tools::RUN_CUSTOM_QUERY,
                };
                (tool, json!({ "query": query, "params": params }))
            }
            Commands::SearchFacts { query } => (tools::SEARCH_FACTS, json!({ "query": query })),
            Commands::RelationTypes => (tools::LIST_RELATION_TYPES, json!({})),
            Commands::People => (tools::INSPECT_PERSON_SCHEMA, json!({})),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("crm").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_add_fact_args() {
        let cli = parse(&["add-fact", "Alice", "Bob", "-t", "spouse"]);
        assert_eq!(cli.config, PathBuf::from(DEFAULT_CONFIG_FILE));
        let (tool, args) = cli.command.to_tool_call(BackendKind::Graph);
        assert_eq!(tool, tools::ADD_FACT);
        assert_eq!(
            args,
            json!({"from_name": "Alice", "to_name": "Bob", "type": "spouse", "properties": "{}"})
        );
    }

    #[test]
    fn test_query_tool_follows_backend() {
        let cli = parse(&["--backend", "datalog", "query", "?[x] := x = 1"]);
        assert_eq!(cli.backend, Some(BackendKind::Datalog));
        let (tool, args) = cli.command.to_tool_call(BackendKind::Datalog);
        assert_eq!(tool, tools::RUN_CUSTOM_QUERY);
        assert_eq!(args["params"], Value::Null);

        let (tool, _) = cli.command.to_tool_call(BackendKind::Graph);
        assert_eq!(tool, tools::RUN_CYPHER);
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = parse(&["people", "-c", "other.toml", "-v"]);
        assert_eq!(cli.command, Commands::People);
        assert_eq!(cli.config, PathBuf::from("other.toml"));
        assert!(cli.verbose);
    }

    #[test]
    fn test_missing_type_is_rejected() {
        assert!(Cli::try_parse_from(["crm", "add-fact", "Alice", "Bob"]).is_err());
    }
}
