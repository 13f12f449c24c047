//! MCP tool implementations: maps tool calls to backend operations and
//! renders the results as text.

use serde_json::{json, Map, Value};
use tracing::debug;

use super::types::{ToolDefinition, ToolsCallResult};
use crate::backend::{CrmBackend, QueryOutput, Rule};
use crate::config::BackendKind;
use crate::error::{CrmError, Result};
use crate::props::Properties;

pub const ADD_PERSON: &str = "add_person";
pub const ADD_FACT: &str = "add_fact";
pub const ADD_RULE: &str = "add_rule";
pub const GET_RULE: &str = "get_rule";
pub const LIST_RULES: &str = "list_rules";
pub const RUN_CYPHER: &str = "run_cypher";
/// Accepted in place of [`RUN_CYPHER`] on the graph backend.
pub const RUN_QUERY: &str = "run_query";
pub const RUN_CUSTOM_QUERY: &str = "run_custom_query";
pub const SEARCH_FACTS: &str = "search_facts";
pub const LIST_RELATION_TYPES: &str = "list_relation_types";
pub const INSPECT_PERSON_SCHEMA: &str = "inspect_person_schema";

/// How many people `inspect_person_schema` shows.
pub const SAMPLE_LIMIT: usize = 5;

/// Return the tools offered by a backend, with their JSON schemas.
pub fn list_tools(kind: BackendKind) -> Vec<ToolDefinition> {
    let mut tools = vec![
        tool(
            ADD_PERSON,
            "Add a new person with arbitrary properties. Names are unique.",
            json!({
                "type": "object",
                "properties": {
                    "name": {
                        "type": "string",
                        "description": "Name of the person"
                    },
                    "properties": {
                        "type": "string",
                        "description": "JSON string of properties (e.g., '{\"gender\": \"M\", \"job\": \"Engineer\"}')",
                        "default": "{}"
                    }
                },
                "required": ["name"]
            }),
        ),
        tool(
            ADD_FACT,
            "Add a directed relationship/fact between two existing people.",
            json!({
                "type": "object",
                "properties": {
                    "from_name": {
                        "type": "string",
                        "description": "Name of the subject person"
                    },
                    "to_name": {
                        "type": "string",
                        "description": "Name of the object person"
                    },
                    "type": {
                        "type": "string",
                        "description": "Type of relation (e.g., 'parent_child', 'spouse', 'met_at'). \
                            Check list_relation_types first to reuse existing names."
                    },
                    "properties": {
                        "type": "string",
                        "description": "JSON string of details",
                        "default": "{}"
                    }
                },
                "required": ["from_name", "to_name", "type"]
            }),
        ),
        tool(
            ADD_RULE,
            "Save a reusable named query rule. Saving an existing name replaces it.",
            json!({
                "type": "object",
                "properties": {
                    "name": {
                        "type": "string",
                        "description": "Unique name for the rule (e.g., 'find_siblings')"
                    },
                    "body": {
                        "type": "string",
                        "description": rule_body_hint(kind)
                    },
                    "description": {
                        "type": "string",
                        "description": "Optional description",
                        "default": ""
                    }
                },
                "required": ["name", "body"]
            }),
        ),
        tool(
            GET_RULE,
            "Retrieve a stored rule's query body and description.",
            json!({
                "type": "object",
                "properties": {
                    "name": { "type": "string", "description": "Rule name" }
                },
                "required": ["name"]
            }),
        ),
        tool(
            LIST_RULES,
            "List all stored rules with their descriptions.",
            json!({ "type": "object", "properties": {} }),
        ),
    ];

    match kind {
        BackendKind::Graph => tools.push(tool(
            RUN_CYPHER,
            "Execute a raw query against the embedded graph store. The store speaks SQL: \
                people live in Person(uuid, name, data), rules in Rule(name, query, description), \
                and each relationship type T in rel_T(from_uuid, to_uuid, data).",
            query_schema(true),
        )),
        BackendKind::Datalog => {
            tools.push(tool(
                RUN_CUSTOM_QUERY,
                "Execute a Datalog query. All stored rules are prepended, so they can be \
                    used by name. Relations: person{id => name, data}, \
                    fact{id => from, to, type, data}, rule{name => body, description}.",
                query_schema(true),
            ));
            tools.push(tool(
                SEARCH_FACTS,
                "Search facts with a Datalog query that may use any stored rule.",
                query_schema(false),
            ));
        }
    }

    tools.push(tool(
        LIST_RELATION_TYPES,
        "List the relationship types already in use, to stay consistent with them.",
        json!({ "type": "object", "properties": {} }),
    ));
    tools.push(tool(
        INSPECT_PERSON_SCHEMA,
        "Return a small sample of people and their properties.",
        json!({ "type": "object", "properties": {} }),
    ));

    tools
}

fn tool(name: &str, description: &str, input_schema: Value) -> ToolDefinition {
    ToolDefinition {
        name: name.to_string(),
        description: description.to_string(),
        input_schema,
    }
}

fn rule_body_hint(kind: BackendKind) -> &'static str {
    match kind {
        BackendKind::Graph => "The SQL query text. Named parameters like :name are allowed.",
        BackendKind::Datalog => {
            "A Datalog rule definition, e.g. 'siblings[a, b] := *fact{from: p, to: a, \
             type: \"parent_child\"}, *fact{from: p, to: b, type: \"parent_child\"}, a != b'"
        }
    }
}

fn query_schema(with_params: bool) -> Value {
    let mut properties = json!({
        "query": { "type": "string", "description": "Query text" }
    });
    if with_params {
        properties["params"] = json!({
            "type": "object",
            "description": "Optional named query parameters"
        });
    }
    json!({
        "type": "object",
        "properties": properties,
        "required": ["query"]
    })
}

/// Dispatch a tool call to the appropriate handler.
///
/// Failures come back as `Error: ...` text, never as protocol errors.
pub fn call_tool(backend: &dyn CrmBackend, name: &str, arguments: &Value) -> ToolsCallResult {
    let outcome = match (name, backend.kind()) {
        (ADD_PERSON, _) => handle_add_person(backend, arguments),
        (ADD_FACT, _) => handle_add_fact(backend, arguments),
        (ADD_RULE, _) => handle_add_rule(backend, arguments),
        (GET_RULE, _) => handle_get_rule(backend, arguments),
        (LIST_RULES, _) => handle_list_rules(backend),
        (RUN_CYPHER | RUN_QUERY, BackendKind::Graph)
        | (RUN_CUSTOM_QUERY, BackendKind::Datalog) => {
            handle_query(backend, arguments, true)
        }
        (SEARCH_FACTS, BackendKind::Datalog) => handle_query(backend, arguments, false),
        (LIST_RELATION_TYPES, _) => handle_list_relation_types(backend),
        (INSPECT_PERSON_SCHEMA, _) => handle_inspect_person_schema(backend),
        _ => return ToolsCallResult::error(format!("Error: Unknown tool: {}", name)),
    };

    match outcome {
        Ok(text) => ToolsCallResult::text(text),
        Err(e) => {
            debug!(tool = name, error = %e, "tool failed");
            ToolsCallResult::error(format!("Error: {}", e))
        }
    }
}

fn handle_add_person(backend: &dyn CrmBackend, args: &Value) -> Result<String> {
    let name = required_str(args, "name")?;
    let properties = Properties::from_argument(args.get("properties"))?;

    let person = backend.add_person(name, &properties)?;
    Ok(format!("Added person: {} ({})", person.name, person.id))
}

fn handle_add_fact(backend: &dyn CrmBackend, args: &Value) -> Result<String> {
    let from_name = required_str(args, "from_name")?;
    let to_name = required_str(args, "to_name")?;
    let rel_type = required_str(args, "type")?;
    let properties = Properties::from_argument(args.get("properties"))?;

    let fact = backend.add_fact(from_name, to_name, rel_type, &properties)?;
    Ok(format!(
        "Added fact: {} --[{}]--> {}",
        fact.from, fact.rel_type, fact.to
    ))
}

fn handle_add_rule(backend: &dyn CrmBackend, args: &Value) -> Result<String> {
    let name = required_str(args, "name")?;
    // older clients send the body as `cypher_query` or `query`
    let body = ["body", "query", "cypher_query"]
        .iter()
        .find_map(|key| args.get(*key).and_then(Value::as_str))
        .ok_or(CrmError::MissingArgument("body"))?;
    let description = args
        .get("description")
        .and_then(Value::as_str)
        .unwrap_or_default();

    backend.add_rule(&Rule {
        name: name.to_string(),
        body: body.to_string(),
        description: description.to_string(),
    })?;
    Ok(format!("Rule '{}' saved.", name))
}

fn handle_get_rule(backend: &dyn CrmBackend, args: &Value) -> Result<String> {
    let name = required_str(args, "name")?;
    Ok(match backend.get_rule(name)? {
        Some(rule) => format!(
            "Rule: {}\nDescription: {}\nBody: {}",
            rule.name, rule.description, rule.body
        ),
        None => "Rule not found.".to_string(),
    })
}

fn handle_list_rules(backend: &dyn CrmBackend) -> Result<String> {
    let rules = backend.list_rules()?;
    if rules.is_empty() {
        return Ok("No rules found.".to_string());
    }
    Ok(rules
        .iter()
        .map(|rule| format!("- {}: {}", rule.name, rule.description))
        .collect::<Vec<_>>()
        .join("\n"))
}

fn handle_query(backend: &dyn CrmBackend, args: &Value, allow_params: bool) -> Result<String> {
    let query = required_str(args, "query")?;
    let params = if allow_params {
        params_arg(args.get("params"))?
    } else {
        Map::new()
    };

    let output = backend.run_query(query, &params)?;
    Ok(render_query_output(&output))
}

fn handle_list_relation_types(backend: &dyn CrmBackend) -> Result<String> {
    let types = backend.relation_types()?;
    if types.is_empty() {
        return Ok("No relationship types found.".to_string());
    }
    Ok(format!("Existing Relation Types: {}", types.join(", ")))
}

fn handle_inspect_person_schema(backend: &dyn CrmBackend) -> Result<String> {
    let people = backend.sample_people(SAMPLE_LIMIT)?;
    if people.is_empty() {
        return Ok("No people found.".to_string());
    }
    let lines: Vec<String> = people
        .iter()
        .take(SAMPLE_LIMIT)
        .map(|person| format!("- {}: {}", person.name, person.properties))
        .collect();
    Ok(format!("Sample Person records:\n{}", lines.join("\n")))
}

/// Render query rows one per line.
///
/// Positional rows are preceded by the header row when the engine sent one.
pub fn render_query_output(output: &QueryOutput) -> String {
    if output.rows.is_empty() {
        return "No results.".to_string();
    }

    let mut lines = Vec::with_capacity(output.rows.len() + 1);
    let positional = output.rows.first().is_some_and(|row| row.is_positional());
    if positional && !output.headers.is_empty() {
        lines.push(json!(output.headers).to_string());
    }
    lines.extend(output.rows.iter().map(|row| row.to_string()));
    lines.join("\n")
}

fn required_str<'a>(args: &'a Value, key: &'static str) -> Result<&'a str> {
    args.get(key)
        .and_then(Value::as_str)
        .ok_or(CrmError::MissingArgument(key))
}

/// Query parameters: absent, a JSON object, or JSON text of an object.
fn params_arg(arg: Option<&Value>) -> Result<Map<String, Value>> {
    match arg {
        None | Some(Value::Null) => Ok(Map::new()),
        Some(Value::Object(map)) => Ok(map.clone()),
        Some(Value::String(text)) if text.trim().is_empty() => Ok(Map::new()),
        Some(Value::String(text)) => match serde_json::from_str(text) {
            Ok(Value::Object(map)) => Ok(map),
            _ => Err(CrmError::InvalidArgument(
                "params must be a JSON object.".to_string(),
            )),
        },
        Some(_) => Err(CrmError::InvalidArgument(
            "params must be a JSON object.".to_string(),
        )),
    }
}
