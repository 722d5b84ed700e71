//! # Core Type Definitions
//!
//! Types shared by every bounded context:
//! - The closed set of faceted class types (`ClassType`)
//! - Cross-context identifiers (`WorkflowDefinitionId`, hypothesis ids)
//! - Error types (`FacetError`, `AccessError`)
//!
//! ## Determinism Guarantees
//!
//! Identifiers implement `Ord` so that every lookup table in the engine can
//! be a `BTreeMap`, and batched lookups produce the same output for the same
//! input on every run.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

// =============================================================================
// CLASS TYPES
// =============================================================================

/// Every type a faceting definition may govern.
///
/// Definitions carry their class type as a string so that they can be read
/// from JSON or TOML; resolvers parse it into this closed set and reject
/// anything else with [`FacetError::UnregisteredClassType`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ClassType {
    Event,
    EventHypothesis,
    /// Marker type: an event hypothesis faceted with this class type is
    /// returned exactly as its data already encodes it.
    DefaultFacetedEventHypothesis,
    PreferredEventHypothesis,
    LocationSolution,
    FeaturePrediction,
    NetworkMagnitudeSolution,
    SignalDetection,
    SignalDetectionHypothesis,
    FeatureMeasurement,
    ChannelSegment,
    ProcessingMask,
    Channel,
    Station,
    Response,
}

impl ClassType {
    /// All registered class types, in declaration order.
    pub const ALL: [ClassType; 15] = [
        Self::Event,
        Self::EventHypothesis,
        Self::DefaultFacetedEventHypothesis,
        Self::PreferredEventHypothesis,
        Self::LocationSolution,
        Self::FeaturePrediction,
        Self::NetworkMagnitudeSolution,
        Self::SignalDetection,
        Self::SignalDetectionHypothesis,
        Self::FeatureMeasurement,
        Self::ChannelSegment,
        Self::ProcessingMask,
        Self::Channel,
        Self::Station,
        Self::Response,
    ];

    /// The name used for this type in faceting definitions.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Event => "Event",
            Self::EventHypothesis => "EventHypothesis",
            Self::DefaultFacetedEventHypothesis => "DefaultFacetedEventHypothesis",
            Self::PreferredEventHypothesis => "PreferredEventHypothesis",
            Self::LocationSolution => "LocationSolution",
            Self::FeaturePrediction => "FeaturePrediction",
            Self::NetworkMagnitudeSolution => "NetworkMagnitudeSolution",
            Self::SignalDetection => "SignalDetection",
            Self::SignalDetectionHypothesis => "SignalDetectionHypothesis",
            Self::FeatureMeasurement => "FeatureMeasurement",
            Self::ChannelSegment => "ChannelSegment",
            Self::ProcessingMask => "ProcessingMask",
            Self::Channel => "Channel",
            Self::Station => "Station",
            Self::Response => "Response",
        }
    }
}

impl fmt::Display for ClassType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ClassType {
    type Err = FacetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|class_type| class_type.as_str() == s)
            .ok_or_else(|| FacetError::UnregisteredClassType(s.to_string()))
    }
}

// =============================================================================
// IDENTIFIERS
// =============================================================================

/// Identifies the workflow stage a stage-scoped entity was produced in.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct WorkflowDefinitionId {
    pub name: String,
}

impl WorkflowDefinitionId {
    /// Create a stage id from its name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// Get the stage name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for WorkflowDefinitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Composite identity of a signal detection hypothesis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SignalDetectionHypothesisId {
    pub signal_detection_id: Uuid,
    pub hypothesis_id: Uuid,
}

impl SignalDetectionHypothesisId {
    #[must_use]
    pub const fn new(signal_detection_id: Uuid, hypothesis_id: Uuid) -> Self {
        Self {
            signal_detection_id,
            hypothesis_id,
        }
    }
}

impl fmt::Display for SignalDetectionHypothesisId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.signal_detection_id, self.hypothesis_id)
    }
}

/// Composite identity of an event hypothesis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EventHypothesisId {
    pub event_id: Uuid,
    pub hypothesis_id: Uuid,
}

impl EventHypothesisId {
    #[must_use]
    pub const fn new(event_id: Uuid, hypothesis_id: Uuid) -> Self {
        Self {
            event_id,
            hypothesis_id,
        }
    }
}

impl fmt::Display for EventHypothesisId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.event_id, self.hypothesis_id)
    }
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors raised by the faceting engine.
///
/// These are argument and contract errors: they are never retried and always
/// propagate to the caller. Data that simply cannot be found is not an error;
/// resolvers report it as `Ok(None)` or drop it from a collection.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FacetError {
    /// A required call argument or context value was not supplied.
    #[error("{0}")]
    MissingArgument(String),

    /// A resolver was built without one of its collaborators.
    #[error("{0}")]
    MissingDependency(String),

    /// A populate call requires a definition and none was given.
    #[error("FacetingDefinition must be present for {0}")]
    MissingDefinition(ClassType),

    /// The definition governs a different type than the one being faceted.
    #[error("FacetingDefinition must be for {expected}")]
    ClassTypeMismatch { expected: ClassType, found: String },

    /// A value object was asked to be stripped, but only its container has
    /// an identity to strip to.
    #[error("{0} parent must be populated")]
    ParentNotPopulated(ClassType),

    /// An unpopulated definition declares nested definitions.
    #[error("FacetingDefinition for {0} is not populated but declares children")]
    ChildrenWithoutData(String),

    /// The definition names a class type the engine does not know.
    #[error("No resolver registered for class type {0}")]
    UnregisteredClassType(String),

    /// The class type is known but is not an aggregate root.
    #[error("{0} cannot be faceted as a root aggregate")]
    UnsupportedAggregate(ClassType),

    /// An entity failed a construction-time invariant.
    #[error("Invalid entity: {0}")]
    InvalidEntity(String),

    /// A storage backend failed outside of an accessor lookup.
    #[error("Storage error: {0}")]
    Storage(String),

    /// A serialization or deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Errors surfaced by accessor lookups.
///
/// The engine never propagates these: a failed lookup is logged and treated
/// exactly like a lookup that returned nothing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AccessError {
    /// The lookup did not complete in time.
    #[error("Accessor timed out: {0}")]
    Timeout(String),

    /// Legacy records could not be bridged into domain objects.
    #[error("Bridging failed: {0}")]
    Bridging(String),

    /// The backing store failed.
    #[error("Storage failure: {0}")]
    Storage(String),

    /// The lookup named more ids than a single call accepts.
    #[error("Lookup of {0} ids exceeds the batch limit")]
    BatchTooLarge(usize),
}

// =============================================================================
// TESTS
// =============================================================================
