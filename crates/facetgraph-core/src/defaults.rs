//! Default faceting definitions.
//!
//! The depth most consumers want for each context: related entities are
//! populated one level down, station definitions and waveforms stay
//! version or entity references, and generational parent chains are not
//! followed.

use crate::definition::FacetingDefinition;
use crate::primitives::{
    APPLIED_TO_RAW_CHANNEL_KEY, ASSOCIATED_SDH_KEY, CHANNEL_KEY, CHANNEL_SEGMENT_KEY,
    EVENT_HYPOTHESIS_KEY, FEATURE_MEASUREMENTS_KEY, FEATURE_PREDICTIONS_KEY, FINAL_EH_HISTORY_KEY,
    ID_CHANNEL_KEY, LOCATION_SOLUTION_KEY, MASKED_BY_KEY, MEASURED_CHANNEL_SEGMENT_KEY,
    NETWORK_MAGNITUDE_SOLUTIONS_KEY, OVERALL_PREFERRED_KEY, PARENT_EH_KEY, PARENT_SDH_KEY,
    PREFERRED_EH_KEY, PREFERRED_LOCATION_SOLUTION_KEY, REJECTED_SD_KEY, SD_HYPOTHESES_KEY,
    STATION_KEY,
};
use crate::types::ClassType;

/// A channel reduced to name and effective time.
#[must_use]
pub fn channel_version_reference_definition() -> FacetingDefinition {
    FacetingDefinition::unpopulated(ClassType::Channel)
}

#[must_use]
pub fn processing_mask_definition() -> FacetingDefinition {
    FacetingDefinition::populated_with(
        ClassType::ProcessingMask,
        [(APPLIED_TO_RAW_CHANNEL_KEY, channel_version_reference_definition())],
    )
}

#[must_use]
pub fn channel_segment_definition() -> FacetingDefinition {
    FacetingDefinition::populated_with(
        ClassType::ChannelSegment,
        [
            (ID_CHANNEL_KEY, channel_version_reference_definition()),
            (MASKED_BY_KEY, processing_mask_definition()),
        ],
    )
}

fn feature_measurement_definition() -> FacetingDefinition {
    FacetingDefinition::populated_with(
        ClassType::FeatureMeasurement,
        [
            (CHANNEL_KEY, channel_version_reference_definition()),
            (
                MEASURED_CHANNEL_SEGMENT_KEY,
                FacetingDefinition::unpopulated(ClassType::ChannelSegment),
            ),
        ],
    )
}

/// Hypothesis with its measurements; the parent stays a reference.
#[must_use]
pub fn signal_detection_hypothesis_definition() -> FacetingDefinition {
    FacetingDefinition::populated_with(
        ClassType::SignalDetectionHypothesis,
        [
            (STATION_KEY, FacetingDefinition::unpopulated(ClassType::Station)),
            (FEATURE_MEASUREMENTS_KEY, feature_measurement_definition()),
            (
                PARENT_SDH_KEY,
                FacetingDefinition::unpopulated(ClassType::SignalDetectionHypothesis),
            ),
        ],
    )
}

#[must_use]
pub fn signal_detection_definition() -> FacetingDefinition {
    FacetingDefinition::populated_with(
        ClassType::SignalDetection,
        [
            (SD_HYPOTHESES_KEY, signal_detection_hypothesis_definition()),
            (STATION_KEY, FacetingDefinition::unpopulated(ClassType::Station)),
        ],
    )
}

fn location_solution_definition() -> FacetingDefinition {
    FacetingDefinition::populated_with(
        ClassType::LocationSolution,
        [
            (
                FEATURE_MEASUREMENTS_KEY,
                FacetingDefinition::populated_with(
                    ClassType::FeatureMeasurement,
                    [(CHANNEL_KEY, channel_version_reference_definition())],
                ),
            ),
            (
                FEATURE_PREDICTIONS_KEY,
                FacetingDefinition::populated_with(
                    ClassType::FeaturePrediction,
                    [
                        (CHANNEL_KEY, channel_version_reference_definition()),
                        (
                            CHANNEL_SEGMENT_KEY,
                            FacetingDefinition::unpopulated(ClassType::ChannelSegment),
                        ),
                    ],
                ),
            ),
            (
                NETWORK_MAGNITUDE_SOLUTIONS_KEY,
                FacetingDefinition::populated_with(
                    ClassType::NetworkMagnitudeSolution,
                    [(CHANNEL_KEY, channel_version_reference_definition())],
                ),
            ),
        ],
    )
}

/// Associated detections with their measurements, and every location
/// solution with its predictions and magnitudes. Parents stay references.
#[must_use]
pub fn event_hypothesis_definition() -> FacetingDefinition {
    FacetingDefinition::populated_with(
        ClassType::EventHypothesis,
        [
            (
                PARENT_EH_KEY,
                FacetingDefinition::unpopulated(ClassType::EventHypothesis),
            ),
            (
                ASSOCIATED_SDH_KEY,
                FacetingDefinition::populated_with(
                    ClassType::SignalDetectionHypothesis,
                    [
                        (STATION_KEY, FacetingDefinition::unpopulated(ClassType::Station)),
                        (FEATURE_MEASUREMENTS_KEY, feature_measurement_definition()),
                    ],
                ),
            ),
            (PREFERRED_LOCATION_SOLUTION_KEY, location_solution_definition()),
            (LOCATION_SOLUTION_KEY, location_solution_definition()),
        ],
    )
}

/// Hypotheses returned exactly as stored.
#[must_use]
pub fn default_faceted_event_hypothesis_definition() -> FacetingDefinition {
    FacetingDefinition::populated(ClassType::DefaultFacetedEventHypothesis)
}

#[must_use]
pub fn event_definition() -> FacetingDefinition {
    FacetingDefinition::populated_with(
        ClassType::Event,
        [
            (
                REJECTED_SD_KEY,
                FacetingDefinition::unpopulated(ClassType::SignalDetection),
            ),
            (EVENT_HYPOTHESIS_KEY, event_hypothesis_definition()),
            (
                PREFERRED_EH_KEY,
                FacetingDefinition::populated(ClassType::PreferredEventHypothesis),
            ),
            (
                OVERALL_PREFERRED_KEY,
                FacetingDefinition::populated(ClassType::EventHypothesis),
            ),
            (
                FINAL_EH_HISTORY_KEY,
                FacetingDefinition::populated(ClassType::EventHypothesis),
            ),
        ],
    )
}

/// The default definition for an aggregate root, if it has one.
#[must_use]
pub fn for_class_type(class_type: ClassType) -> Option<FacetingDefinition> {
    match class_type {
        ClassType::Event => Some(event_definition()),
        ClassType::EventHypothesis => Some(event_hypothesis_definition()),
        ClassType::DefaultFacetedEventHypothesis => {
            Some(default_faceted_event_hypothesis_definition())
        }
        ClassType::SignalDetection => Some(signal_detection_definition()),
        ClassType::SignalDetectionHypothesis => Some(signal_detection_hypothesis_definition()),
        ClassType::ChannelSegment => Some(channel_segment_definition()),
        ClassType::ProcessingMask => Some(processing_mask_definition()),
        ClassType::Channel => Some(channel_version_reference_definition()),
        ClassType::PreferredEventHypothesis
        | ClassType::LocationSolution
        | ClassType::FeaturePrediction
        | ClassType::NetworkMagnitudeSolution
        | ClassType::FeatureMeasurement
        | ClassType::Station
        | ClassType::Response => None,
    }
}
