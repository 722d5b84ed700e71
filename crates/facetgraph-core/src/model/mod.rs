//! # Domain Model
//!
//! Entity types for the four bounded contexts. Every aggregate follows the
//! same shape:
//!
//! - an identity (`id`, or `name` for version-scoped station definitions)
//! - `data: Option<Data>`: absent means the instance is a reference,
//!   present means it is populated
//! - `effective_at` for version-scoped types
//!
//! Entities are immutable values. The faceting engine never mutates its
//! inputs; it returns new instances with data added, removed, or with nested
//! fields transformed.

pub mod detection;
pub mod event;
pub mod station;
pub mod waveform;

use chrono::{DateTime, Utc};

pub use detection::{
    AnalysisWaveform, FeatureMeasurement, FeatureMeasurementType, MeasurementValue,
    SignalDetection, SignalDetectionData, SignalDetectionHypothesis, SignalDetectionHypothesisData,
};
pub use event::{
    Event, EventData, EventHypothesis, EventHypothesisData, EventLocation, FeaturePrediction,
    LocationBehavior, LocationSolution, LocationSolutionData, MagnitudeType,
    NetworkMagnitudeBehavior, NetworkMagnitudeSolution, PreferredEventHypothesis,
    StationMagnitudeSolution,
};
pub use station::{
    Channel, ChannelData, Response, ResponseData, Station, StationData, StationType, Units,
};
pub use waveform::{
    ChannelSegment, ChannelSegmentData, ChannelSegmentDescriptor, ProcessingMask,
    ProcessingMaskData, ProcessingOperation, Waveform,
};

/// The reference/populated state shared by every aggregate.
pub trait Faceted: Clone {
    type Data;

    /// The payload, if this instance is populated.
    fn data(&self) -> Option<&Self::Data>;

    /// The same entity reduced to its identity.
    fn to_entity_reference(&self) -> Self;

    fn is_populated(&self) -> bool {
        self.data().is_some()
    }
}

/// Aggregates whose identity includes the time a version became effective.
pub trait VersionScoped: Faceted {
    fn effective_at(&self) -> Option<DateTime<Utc>>;

    /// The same entity reduced to its identity and effective time.
    fn to_version_reference(&self) -> Self;
}
