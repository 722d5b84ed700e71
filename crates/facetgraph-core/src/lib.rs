//! # facetgraph-core
//!
//! The faceting engine for the monitoring domain graph.
//!
//! Events, signal detections, channel segments and station definitions
//! refer to each other across four bounded contexts. Any nested entity can
//! appear either as a reference (identity only) or populated (identity plus
//! data). A [`FacetingDefinition`] states, per field, how far a caller wants
//! that graph materialized; the engine fetches what is missing from each
//! context's [`accessor`] and strips what was not asked for.
//!
//! ## Architectural Constraints
//!
//! - Pure Rust: no async, no network dependencies
//! - Deterministic: BTreeMap only, output order follows input order
//! - Missing data is never an error: unresolvable entities are dropped or
//!   reduced to references, and only contract violations surface as
//!   [`FacetError`]
//! - Inputs are never mutated; every result is a new instance

// =============================================================================
// MODULES
// =============================================================================

pub mod accessor;
pub mod defaults;
pub mod definition;
pub mod facet;
pub mod model;
pub mod primitives;
pub mod storage;
pub mod types;

// =============================================================================
// RE-EXPORTS: Core Types (from types module)
// =============================================================================

pub use types::{
    AccessError, ClassType, EventHypothesisId, FacetError, SignalDetectionHypothesisId,
    WorkflowDefinitionId,
};

// =============================================================================
// RE-EXPORTS: Definitions and Engine
// =============================================================================

pub use accessor::{
    EventAccessor, SignalDetectionAccessor, StationDefinitionAccessor, WaveformAccessor,
};
pub use definition::{FacetingDefinition, FacetingDefinitionBuilder};
pub use facet::{
    Aggregate, EventFaceting, FacetContext, FacetingEngine, SignalDetectionFaceting,
    StationDefinitionFaceting, WaveformFaceting,
};
pub use model::{Faceted, VersionScoped};

// =============================================================================
// RE-EXPORTS: Storage (from storage module)
// =============================================================================

pub use storage::{
    Fixture, MemoryStore, RecordHeader, RedbStore, Repository, Staged, StorageBackend,
};
