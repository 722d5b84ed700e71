//! # Configuration
//!
//! Optional TOML file read at startup. Every key may be omitted:
//!
//! ```toml
//! database = "facetgraph.db"
//! backend = "redb"        # or "memory"
//! stage = "AL1"
//! log_format = "text"     # or "json"
//! ```
//!
//! ## Lookup order
//!
//! 1. `--config <path>`
//! 2. `FACETGRAPH_CONFIG`
//! 3. `facetgraph.toml` in the working directory, if present
//!
//! CLI flags override file values; `FACETGRAPH_LOG_FORMAT` overrides
//! `log_format`.

use facetgraph_core::{FacetError, WorkflowDefinitionId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub const CONFIG_ENV: &str = "FACETGRAPH_CONFIG";
pub const LOG_FORMAT_ENV: &str = "FACETGRAPH_LOG_FORMAT";
pub const DEFAULT_CONFIG_FILE: &str = "facetgraph.toml";
pub const DEFAULT_DATABASE: &str = "facetgraph.db";

/// Maximum config file size (1 MB).
const MAX_CONFIG_FILE_SIZE: u64 = 1024 * 1024;

// =============================================================================
// FILE CONTENTS
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub database: Option<PathBuf>,
    pub backend: Option<String>,
    pub stage: Option<String>,
    pub log_format: Option<String>,
}

impl Config {
    /// Parse a config document.
    ///
    /// # Errors
    ///
    /// `Serialization` for malformed TOML or unknown keys.
    pub fn from_toml(text: &str) -> Result<Self, FacetError> {
        toml::from_str(text).map_err(|e| FacetError::Serialization(format!("Invalid config: {e}")))
    }

    /// Read the config file named by `explicit`, by `FACETGRAPH_CONFIG`, or
    /// the default file if it exists. No file at all yields the defaults.
    ///
    /// # Errors
    ///
    /// `Storage` when a named file cannot be read, `Serialization` when it
    /// does not parse.
    pub fn load(explicit: Option<&Path>) -> Result<Self, FacetError> {
        let named = explicit
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from));

        let path = match named {
            Some(path) => path,
            None => {
                let default = PathBuf::from(DEFAULT_CONFIG_FILE);
                if !default.is_file() {
                    return Ok(Self::default());
                }
                default
            }
        };
        Self::read(&path)
    }

    fn read(path: &Path) -> Result<Self, FacetError> {
        let metadata = std::fs::metadata(path).map_err(|e| {
            FacetError::Storage(format!("Cannot read config '{}': {e}", path.display()))
        })?;
        if metadata.len() > MAX_CONFIG_FILE_SIZE {
            return Err(FacetError::Storage(format!(
                "Config '{}' exceeds {MAX_CONFIG_FILE_SIZE} bytes",
                path.display()
            )));
        }
        let text = std::fs::read_to_string(path).map_err(|e| {
            FacetError::Storage(format!("Cannot read config '{}': {e}", path.display()))
        })?;
        tracing::debug!(path = %path.display(), "loaded config file");
        Self::from_toml(&text)
    }

    /// Merge CLI overrides over the file values.
    ///
    /// # Errors
    ///
    /// `MissingArgument` for an unknown backend or log format name.
    pub fn resolve(&self, overrides: &Overrides) -> Result<Settings, FacetError> {
        let database = overrides
            .database
            .clone()
            .or_else(|| self.database.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATABASE));
        let backend = match overrides.backend.as_deref().or(self.backend.as_deref()) {
            Some(name) => name.parse()?,
            None => Backend::default(),
        };
        let stage = overrides
            .stage
            .as_deref()
            .or(self.stage.as_deref())
            .map(WorkflowDefinitionId::new);
        let log_format = match self.log_format.as_deref() {
            Some(name) => name.parse()?,
            None => LogFormat::default(),
        };

        Ok(Settings {
            database,
            backend,
            stage,
            log_format,
        })
    }
}

/// Values given on the command line.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub database: Option<PathBuf>,
    pub backend: Option<String>,
    pub stage: Option<String>,
}

// =============================================================================
// RESOLVED SETTINGS
// =============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Backend {
    Memory,
    #[default]
    Redb,
}

impl FromStr for Backend {
    type Err = FacetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "memory" => Ok(Self::Memory),
            "redb" => Ok(Self::Redb),
            other => Err(FacetError::MissingArgument(format!(
                "Unknown backend '{other}', expected 'memory' or 'redb'"
            ))),
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Memory => "memory",
            Self::Redb => "redb",
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = FacetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(FacetError::MissingArgument(format!(
                "Unknown log format '{other}', expected 'text' or 'json'"
            ))),
        }
    }
}

impl LogFormat {
    /// `FACETGRAPH_LOG_FORMAT` if set and valid, else the configured value.
    #[must_use]
    pub fn from_env_or(configured: Option<&str>) -> Self {
        std::env::var(LOG_FORMAT_ENV)
            .ok()
            .and_then(|value| value.parse().ok())
            .or_else(|| configured.and_then(|value| value.parse().ok()))
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub database: PathBuf,
    pub backend: Backend,
    pub stage: Option<WorkflowDefinitionId>,
    pub log_format: LogFormat,
}
