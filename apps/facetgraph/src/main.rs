//! # facetgraph
//!
//! Populates monitoring entities from a fixture or redb database according
//! to faceting definitions.
//!
//! ## Usage
//!
//! ```bash
//! # Load a fixture into facetgraph.db
//! facetgraph import -f fixture.json
//!
//! # Facet an event at a stage with the default definition
//! facetgraph populate -k event -i 5f0c... -s AL1
//!
//! # Facet a station version from a fixture, without a database
//! facetgraph populate -k station -i ASAR -e 2024-01-01T00:00:00Z -x fixture.json
//!
//! # Check a hand-written definition
//! facetgraph validate -d event.toml -t Event
//! ```

use clap::Parser;
use facetgraph::cli::{self, Cli};
use facetgraph::config::{Config, LogFormat};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

fn main() {
    let cli = Cli::parse();

    // A config that fails to load still gets reported through the logger.
    let config = Config::load(cli.config.as_deref());
    let configured_format = config
        .as_ref()
        .ok()
        .and_then(|config| config.log_format.as_deref());

    // FACETGRAPH_LOG_FORMAT=json enables machine-parseable output.
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "facetgraph=info,facetgraph_core=info".into());

    match LogFormat::from_env_or(configured_format) {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }

    let result = config.and_then(|config| cli::execute(cli, &config));
    if let Err(e) = result {
        tracing::error!("Error: {}", e);
        std::process::exit(1);
    }
}
