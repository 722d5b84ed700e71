//! # Faceting Primitives
//!
//! Hardcoded field keys and format constants for the faceting engine.
//!
//! A faceting definition names nested relations by field key. The keys are
//! fixed at compile time: a definition that names a key a resolver does not
//! know is simply never consulted for it.

// =============================================================================
// EVENT CONTEXT KEYS
// =============================================================================

/// `Event.rejectedSignalDetectionAssociations`
pub const REJECTED_SD_KEY: &str = "rejectedSignalDetectionAssociations";

/// `Event.eventHypotheses`
pub const EVENT_HYPOTHESIS_KEY: &str = "eventHypotheses";

/// `Event.preferredEventHypothesisByStage`
pub const PREFERRED_EH_KEY: &str = "preferredEventHypothesisByStage";

/// `Event.overallPreferred`
pub const OVERALL_PREFERRED_KEY: &str = "overallPreferred";

/// `Event.finalEventHypothesisHistory`
pub const FINAL_EH_HISTORY_KEY: &str = "finalEventHypothesisHistory";

/// `EventHypothesis.parentEventHypotheses`
pub const PARENT_EH_KEY: &str = "parentEventHypotheses";

/// `EventHypothesis.associatedSignalDetectionHypotheses`
pub const ASSOCIATED_SDH_KEY: &str = "associatedSignalDetectionHypotheses";

/// `EventHypothesis.preferredLocationSolution`
pub const PREFERRED_LOCATION_SOLUTION_KEY: &str = "preferredLocationSolution";

/// `EventHypothesis.locationSolutions`
pub const LOCATION_SOLUTION_KEY: &str = "locationSolutions";

/// `LocationSolution.featurePredictions`
pub const FEATURE_PREDICTIONS_KEY: &str = "featurePredictions";

/// `LocationSolution.networkMagnitudeSolutions`
pub const NETWORK_MAGNITUDE_SOLUTIONS_KEY: &str = "networkMagnitudeSolutions";

// =============================================================================
// SIGNAL DETECTION CONTEXT KEYS
// =============================================================================

/// `SignalDetection.signalDetectionHypotheses`
pub const SD_HYPOTHESES_KEY: &str = "signalDetectionHypotheses";

/// `SignalDetectionHypothesis.parentSignalDetectionHypothesis`
pub const PARENT_SDH_KEY: &str = "parentSignalDetectionHypothesis";

/// `SignalDetectionHypothesis.featureMeasurements`, also used by
/// `LocationSolution` for the measurements of its location behaviors.
pub const FEATURE_MEASUREMENTS_KEY: &str = "featureMeasurements";

/// `FeatureMeasurement.measuredChannelSegment`
pub const MEASURED_CHANNEL_SEGMENT_KEY: &str = "measuredChannelSegment";

/// `FeatureMeasurement.analysisWaveform.waveform`
pub const AW_CHANNEL_SEGMENT_KEY: &str = "analysisWaveformChannelSegment";

// =============================================================================
// SHARED KEYS
// =============================================================================

/// A `station` field (signal detections, hypotheses, channels).
pub const STATION_KEY: &str = "station";

/// A `channel` field (feature measurements, predictions, magnitudes).
pub const CHANNEL_KEY: &str = "channel";

/// `FeaturePrediction.predictionChannelSegment`
pub const CHANNEL_SEGMENT_KEY: &str = "channelSegment";

// =============================================================================
// WAVEFORM / STATION DEFINITION KEYS
// =============================================================================

/// `ChannelSegment.id.channel`
pub const ID_CHANNEL_KEY: &str = "id.channel";

/// `ChannelSegment.maskedBy`
pub const MASKED_BY_KEY: &str = "maskedBy";

/// `ProcessingMask.appliedToRawChannel`
pub const APPLIED_TO_RAW_CHANNEL_KEY: &str = "appliedToRawChannel";

/// `Station.channels`
pub const CHANNELS_KEY: &str = "channels";

/// `Channel.response`
pub const RESPONSE_KEY: &str = "response";

// =============================================================================
// PERSISTENCE FORMAT
// =============================================================================

/// Magic bytes prefixed to every value stored by the redb backend.
pub const MAGIC_BYTES: &[u8; 4] = b"FGPH";

/// Current record format version.
///
/// Increment this when making breaking changes to the stored model.
pub const FORMAT_VERSION: u8 = 1;

/// Maximum encoded size of a single stored record (64 MB).
///
/// Validated before decoding to keep a corrupted record from driving a huge
/// allocation.
pub const MAX_RECORD_SIZE: usize = 64 * 1024 * 1024;

/// Maximum number of ids accepted by a single accessor lookup.
pub const MAX_LOOKUP_BATCH: usize = 10_000;
