//! # facetgraph
//!
//! Command-line front end for `facetgraph-core`.
//!
//! The library half holds the CLI definition and configuration so the
//! commands can be driven from integration tests; `main.rs` only wires up
//! logging and exits with a status code.

pub mod cli;
pub mod config;
