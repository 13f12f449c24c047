//! Personal CRM MCP server.
//!
//! Runs a JSON-RPC 2.0 server over STDIO that exposes the CRM tools
//! through the Model Context Protocol (MCP).
//!
//! Usage:
//!   crm-mcp [--config crm.toml] [--backend graph|datalog]
//!
//! Environment overrides: CRM_BACKEND, CRM_GRAPH_PATH, COZO_HOST,
//! COZO_AUTH_TOKEN, COZO_SCHEMA_PATH.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::info;

use crm::config::{BackendKind, CrmConfig, DEFAULT_CONFIG_FILE};

#[derive(Parser)]
#[command(name = "crm-mcp")]
#[command(about = "Personal CRM tools over the Model Context Protocol", long_about = None)]
struct Args {
    /// Config file (TOML)
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Override the configured backend
    #[arg(short, long, value_enum)]
    backend: Option<BackendKind>,
}

fn main() {
    // Initialize tracing to stderr (MCP uses stdout for protocol)
    crm::logging::init_logging("info");

    if let Err(e) = run(Args::parse()) {
        tracing::error!(error = %e, "MCP server failed");
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<()> {
    let config = CrmConfig::resolve(&args.config, args.backend)
        .with_context(|| format!("loading {}", args.config.display()))?;

    let backend = crm::open_backend(&config).context("opening backend")?;

    info!("MCP server ready, waiting for JSON-RPC requests on stdin");

    // Blocks until stdin closes
    crm::mcp::server::run(backend.as_ref());
    Ok(())
}
