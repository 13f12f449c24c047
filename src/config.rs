//! Configuration for the CRM tool server.
//!
//! Loaded from a TOML file, then overridden by environment variables and
//! command-line flags. The resolved value is passed into backend
//! constructors; nothing below this module reads the environment.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{CrmError, Result};

/// Default config file name, looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "crm.toml";

/// Which engine backs the tools.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Embedded property-graph store.
    #[default]
    Graph,
    /// Remote Datalog engine over HTTP.
    Datalog,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Graph => write!(f, "graph"),
            BackendKind::Datalog => write!(f, "datalog"),
        }
    }
}

impl FromStr for BackendKind {
    type Err = CrmError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "graph" | "kuzu" | "sqlite" => Ok(BackendKind::Graph),
            "datalog" | "cozo" => Ok(BackendKind::Datalog),
            other => Err(CrmError::Config(format!("unknown backend '{}'", other))),
        }
    }
}

/// Embedded store settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// Database file. Parent directories are created on open.
    pub path: PathBuf,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("crm_data/personal_crm.db"),
        }
    }
}

/// Remote Datalog engine settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatalogConfig {
    /// Base URL; `/text-query` is appended.
    pub host: String,
    /// Sent verbatim in the `x-cozo-auth` header when set.
    pub auth_token: Option<String>,
    /// Script run once when the `person` relation is missing.
    pub schema_path: PathBuf,
}

impl Default for DatalogConfig {
    fn default() -> Self {
        Self {
            host: "http://127.0.0.1:9070".to_string(),
            auth_token: None,
            schema_path: PathBuf::from("schema/crm.cozo"),
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrmConfig {
    pub backend: BackendKind,
    pub graph: GraphConfig,
    pub datalog: DatalogConfig,
}

impl CrmConfig {
    /// Load from a TOML file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text)
            .map_err(|e| CrmError::Config(format!("{}: {}", path.display(), e)))
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| CrmError::Config(e.to_string()))
    }

    /// Load, then apply the process environment and an optional backend flag.
    pub fn resolve(path: &Path, backend: Option<BackendKind>) -> Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_overrides(|key| std::env::var(key).ok())?;
        if let Some(kind) = backend {
            config.backend = kind;
        }
        Ok(config)
    }

    /// Apply environment-style overrides from `lookup`.
    ///
    /// Recognized keys: `CRM_BACKEND`, `CRM_GRAPH_PATH`, `COZO_HOST`,
    /// `COZO_AUTH_TOKEN`, `COZO_SCHEMA_PATH`. Empty values are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(kind) = get("CRM_BACKEND") {
            self.backend = kind.parse()?;
        }
        if let Some(path) = get("CRM_GRAPH_PATH") {
            self.graph.path = PathBuf::from(path);
        }
        if let Some(host) = get("COZO_HOST") {
            self.datalog.host = host;
        }
        if let Some(token) = get("COZO_AUTH_TOKEN") {
            self.datalog.auth_token = Some(token);
        }
        if let Some(path) = get("COZO_SCHEMA_PATH") {
            self.datalog.schema_path = PathBuf::from(path);
        }
        Ok(())
    }
}
