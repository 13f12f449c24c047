//! MCP (Model Context Protocol) server module.
//!
//! Provides a JSON-RPC 2.0 over STDIO interface through which AI agents
//! call the CRM tools.

pub mod server;
pub mod tools;
pub mod types;

pub use tools::{call_tool, list_tools};
