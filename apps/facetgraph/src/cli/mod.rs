//! # facetgraph CLI Module
//!
//! ## Available Commands
//!
//! - `import` - Load a fixture into the database
//! - `populate` - Facet one aggregate root by id
//! - `defaults` - Print the default definition for a kind
//! - `validate` - Check a definition file
//! - `status` - Show record counts

mod commands;

use crate::config::{Config, Overrides, Settings};
use clap::{Parser, Subcommand};
use facetgraph_core::FacetError;
use std::path::PathBuf;

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// facetgraph - selective population of monitoring entities
///
/// Loads events, signal detections, waveforms and station definitions into a
/// reference store and facets them with JSON or TOML definitions.
#[derive(Parser, Debug)]
#[command(name = "facetgraph")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to a TOML config file (default: $FACETGRAPH_CONFIG or ./facetgraph.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Path to the redb database
    #[arg(short = 'D', long, global = true)]
    pub database: Option<PathBuf>,

    /// Storage backend: "redb" (database file) or "memory" (fixture only)
    #[arg(short = 'B', long, global = true)]
    pub backend: Option<String>,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json_mode: bool,

    /// Suppress informational output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Load a fixture document into the database
    Import {
        /// Path to the fixture (JSON)
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Facet one aggregate root
    Populate {
        /// Aggregate kind (event, event-hypothesis, signal-detection, ...)
        #[arg(short, long)]
        kind: String,

        /// Identity: uuid, "<parent>/<hypothesis>", station or channel name,
        /// or "<channel>/<start>/<end>/<creation>" for channel segments
        #[arg(short, long)]
        id: String,

        /// Definition file (JSON or TOML); the kind's default when omitted
        #[arg(short, long)]
        definition: Option<PathBuf>,

        /// Workflow stage for events and signal detections
        #[arg(short, long)]
        stage: Option<String>,

        /// Effective time (RFC 3339) for station definitions
        #[arg(short, long)]
        effective_time: Option<String>,

        /// Facet against this fixture in memory instead of the database
        #[arg(short = 'x', long)]
        fixture: Option<PathBuf>,
    },

    /// Print the default definition for a kind
    Defaults {
        /// Aggregate kind
        #[arg(short, long)]
        kind: String,
    },

    /// Check a definition file against a class type
    Validate {
        /// Definition file (JSON or TOML)
        #[arg(short, long)]
        definition: PathBuf,

        /// Class type the definition must govern
        #[arg(short = 't', long)]
        class_type: String,
    },

    /// Show record counts in the configured store
    Status,
}

impl Cli {
    /// Load the config file and apply this command line over it.
    ///
    /// # Errors
    ///
    /// Config read or parse errors, unknown backend names.
    pub fn settings(&self) -> Result<Settings, FacetError> {
        self.settings_from(&Config::load(self.config.as_deref())?)
    }

    /// Apply this command line over an already loaded config.
    ///
    /// # Errors
    ///
    /// Unknown backend or log format names.
    pub fn settings_from(&self, config: &Config) -> Result<Settings, FacetError> {
        let stage = match &self.command {
            Some(Commands::Populate { stage, .. }) => stage.clone(),
            _ => None,
        };
        config.resolve(&Overrides {
            database: self.database.clone(),
            backend: self.backend.clone(),
            stage,
        })
    }
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Execute the CLI with parsed arguments.
pub fn execute(cli: Cli, config: &Config) -> Result<(), FacetError> {
    let settings = cli.settings_from(config)?;
    let output = Output {
        json_mode: cli.json_mode,
        quiet: cli.quiet,
    };

    match cli.command {
        Some(Commands::Import { file }) => cmd_import(&settings, output, &file),
        Some(Commands::Populate {
            kind,
            id,
            definition,
            stage: _,
            effective_time,
            fixture,
        }) => cmd_populate(
            &settings,
            output,
            &PopulateRequest {
                kind: kind.parse()?,
                id,
                definition,
                effective_time: effective_time.as_deref().map(parse_time).transpose()?,
                fixture,
            },
        ),
        Some(Commands::Defaults { kind }) => cmd_defaults(kind.parse()?),
        Some(Commands::Validate {
            definition,
            class_type,
        }) => cmd_validate(output, &definition, &class_type),
        Some(Commands::Status) | None => cmd_status(&settings, output),
    }
}
