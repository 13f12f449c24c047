//! Personal CRM CLI - the MCP tools from the command line.
//!
//! Usage:
//!   crm add-person Alice -p '{"job": "Engineer"}'
//!   crm add-fact Alice Bob -t spouse
//!   crm add-rule everyone 'SELECT name FROM Person' -d 'all people'
//!   crm rules
//!   crm query 'SELECT name, data FROM Person'
//!   crm relation-types
//!   crm people

use anyhow::{Context, Result};
use clap::Parser;

use crm::cli::Cli;
use crm::config::CrmConfig;

fn main() {
    let cli = Cli::parse();
    crm::logging::init_logging(if cli.verbose { "debug" } else { "warn" });

    match run(cli) {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Run one tool and print its text. Returns false when the tool failed.
fn run(cli: Cli) -> Result<bool> {
    let config = CrmConfig::resolve(&cli.config, cli.backend)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    let backend = crm::open_backend(&config).context("opening backend")?;

    let (tool, arguments) = cli.command.to_tool_call(config.backend);
    let result = crm::mcp::call_tool(backend.as_ref(), tool, &arguments);

    if result.is_error() {
        eprintln!("{}", result.as_text());
        return Ok(false);
    }
    println!("{}", result.as_text());
    Ok(true)
}
