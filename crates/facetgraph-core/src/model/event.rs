//! Event context: events, event hypotheses and location solutions.
//!
//! `EventHypothesisData` is the one payload with a construction-time
//! invariant that faceting must preserve: a rejected hypothesis carries no
//! associations and no location solutions.

use super::Faceted;
use super::detection::{FeatureMeasurement, FeatureMeasurementType, MeasurementValue};
use super::detection::{SignalDetection, SignalDetectionHypothesis};
use super::station::{Channel, Station};
use super::waveform::ChannelSegment;
use crate::types::{EventHypothesisId, FacetError, WorkflowDefinitionId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// =============================================================================
// EVENT
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: Uuid,
    pub data: Option<EventData>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventData {
    pub monitoring_organization: String,
    pub rejected_signal_detection_associations: Vec<SignalDetection>,
    pub event_hypotheses: Vec<EventHypothesis>,
    pub preferred_event_hypothesis_by_stage: Vec<PreferredEventHypothesis>,
    pub overall_preferred: Option<EventHypothesis>,
    pub final_event_hypothesis_history: Vec<EventHypothesis>,
}

impl Event {
    #[must_use]
    pub fn reference(id: Uuid) -> Self {
        Self { id, data: None }
    }

    #[must_use]
    pub fn populated(id: Uuid, data: EventData) -> Self {
        Self {
            id,
            data: Some(data),
        }
    }

    #[must_use]
    pub fn with_data(&self, data: EventData) -> Self {
        Self::populated(self.id, data)
    }
}

impl Faceted for Event {
    type Data = EventData;

    fn data(&self) -> Option<&EventData> {
        self.data.as_ref()
    }

    fn to_entity_reference(&self) -> Self {
        Self::reference(self.id)
    }
}

/// The hypothesis a stage prefers for an event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreferredEventHypothesis {
    pub stage: WorkflowDefinitionId,
    pub preferred_by: String,
    pub preferred: EventHypothesis,
}

// =============================================================================
// EVENT HYPOTHESIS
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventHypothesis {
    pub id: EventHypothesisId,
    pub data: Option<EventHypothesisData>,
}

impl EventHypothesis {
    #[must_use]
    pub fn reference(id: EventHypothesisId) -> Self {
        Self { id, data: None }
    }

    #[must_use]
    pub fn populated(id: EventHypothesisId, data: EventHypothesisData) -> Self {
        Self {
            id,
            data: Some(data),
        }
    }

    /// The marker hypothesis recorded when an analyst rejects an event: no
    /// associations, no locations, and a reference to the hypothesis it
    /// rejected as its only parent.
    #[must_use]
    pub fn rejected(event_id: Uuid, hypothesis_id: Uuid, rejected_parent_id: Uuid) -> Self {
        let parent =
            EventHypothesis::reference(EventHypothesisId::new(event_id, rejected_parent_id));
        Self::populated(
            EventHypothesisId::new(event_id, hypothesis_id),
            EventHypothesisData {
                rejected: true,
                deleted: false,
                parent_event_hypotheses: vec![parent],
                associated_signal_detection_hypotheses: Vec::new(),
                preferred_location_solution: None,
                location_solutions: Vec::new(),
            },
        )
    }

    #[must_use]
    pub fn with_data(&self, data: EventHypothesisData) -> Self {
        Self::populated(self.id, data)
    }
}

impl Faceted for EventHypothesis {
    type Data = EventHypothesisData;

    fn data(&self) -> Option<&EventHypothesisData> {
        self.data.as_ref()
    }

    fn to_entity_reference(&self) -> Self {
        Self::reference(self.id)
    }
}

/// Hypothesis payload. Fields are private so that every instance has passed
/// [`EventHypothesisData::new`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "EventHypothesisFields", into = "EventHypothesisFields")]
pub struct EventHypothesisData {
    rejected: bool,
    deleted: bool,
    parent_event_hypotheses: Vec<EventHypothesis>,
    associated_signal_detection_hypotheses: Vec<SignalDetectionHypothesis>,
    preferred_location_solution: Option<LocationSolution>,
    location_solutions: Vec<LocationSolution>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventHypothesisFields {
    rejected: bool,
    deleted: bool,
    parent_event_hypotheses: Vec<EventHypothesis>,
    associated_signal_detection_hypotheses: Vec<SignalDetectionHypothesis>,
    preferred_location_solution: Option<LocationSolution>,
    location_solutions: Vec<LocationSolution>,
}

impl TryFrom<EventHypothesisFields> for EventHypothesisData {
    type Error = FacetError;

    fn try_from(fields: EventHypothesisFields) -> Result<Self, FacetError> {
        Self::new(
            fields.rejected,
            fields.deleted,
            fields.parent_event_hypotheses,
            fields.associated_signal_detection_hypotheses,
            fields.preferred_location_solution,
            fields.location_solutions,
        )
    }
}

impl From<EventHypothesisData> for EventHypothesisFields {
    fn from(data: EventHypothesisData) -> Self {
        Self {
            rejected: data.rejected,
            deleted: data.deleted,
            parent_event_hypotheses: data.parent_event_hypotheses,
            associated_signal_detection_hypotheses: data.associated_signal_detection_hypotheses,
            preferred_location_solution: data.preferred_location_solution,
            location_solutions: data.location_solutions,
        }
    }
}

impl EventHypothesisData {
    /// # Errors
    ///
    /// Returns `FacetError::InvalidEntity` when:
    /// - a rejected hypothesis carries associations, location solutions, a
    ///   preferred location solution, or more than one parent
    /// - a non-rejected hypothesis has a preferred location solution without
    ///   location solutions, or location solutions without a preferred one
    pub fn new(
        rejected: bool,
        deleted: bool,
        parent_event_hypotheses: Vec<EventHypothesis>,
        associated_signal_detection_hypotheses: Vec<SignalDetectionHypothesis>,
        preferred_location_solution: Option<LocationSolution>,
        location_solutions: Vec<LocationSolution>,
    ) -> Result<Self, FacetError> {
        if rejected {
            if !associated_signal_detection_hypotheses.is_empty() {
                return Err(FacetError::InvalidEntity(
                    "rejected EventHypothesis cannot have associated signal detection hypotheses"
                        .to_string(),
                ));
            }
            if !location_solutions.is_empty() || preferred_location_solution.is_some() {
                return Err(FacetError::InvalidEntity(
                    "rejected EventHypothesis cannot have location solutions".to_string(),
                ));
            }
            if parent_event_hypotheses.len() > 1 {
                return Err(FacetError::InvalidEntity(
                    "rejected EventHypothesis can have at most one parent".to_string(),
                ));
            }
        } else if preferred_location_solution.is_some() == location_solutions.is_empty() {
            return Err(FacetError::InvalidEntity(
                "preferred location solution and location solutions must be set together"
                    .to_string(),
            ));
        }

        Ok(Self {
            rejected,
            deleted,
            parent_event_hypotheses,
            associated_signal_detection_hypotheses,
            preferred_location_solution,
            location_solutions,
        })
    }

    #[must_use]
    pub fn is_rejected(&self) -> bool {
        self.rejected
    }

    #[must_use]
    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    #[must_use]
    pub fn parent_event_hypotheses(&self) -> &[EventHypothesis] {
        &self.parent_event_hypotheses
    }

    #[must_use]
    pub fn associated_signal_detection_hypotheses(&self) -> &[SignalDetectionHypothesis] {
        &self.associated_signal_detection_hypotheses
    }

    #[must_use]
    pub fn preferred_location_solution(&self) -> Option<&LocationSolution> {
        self.preferred_location_solution.as_ref()
    }

    #[must_use]
    pub fn location_solutions(&self) -> &[LocationSolution] {
        &self.location_solutions
    }

    /// Copy with the four relation fields replaced, re-checking the
    /// invariants.
    ///
    /// # Errors
    ///
    /// See [`EventHypothesisData::new`].
    pub fn with_relations(
        &self,
        parent_event_hypotheses: Vec<EventHypothesis>,
        associated_signal_detection_hypotheses: Vec<SignalDetectionHypothesis>,
        preferred_location_solution: Option<LocationSolution>,
        location_solutions: Vec<LocationSolution>,
    ) -> Result<Self, FacetError> {
        Self::new(
            self.rejected,
            self.deleted,
            parent_event_hypotheses,
            associated_signal_detection_hypotheses,
            preferred_location_solution,
            location_solutions,
        )
    }
}

// =============================================================================
// LOCATION SOLUTION
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventLocation {
    pub latitude_degrees: f64,
    pub longitude_degrees: f64,
    pub depth_km: f64,
    pub time: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationSolution {
    pub id: Uuid,
    pub data: Option<LocationSolutionData>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationSolutionData {
    pub location: EventLocation,
    pub location_behaviors: Vec<LocationBehavior>,
    pub feature_predictions: Vec<FeaturePrediction>,
    pub network_magnitude_solutions: Vec<NetworkMagnitudeSolution>,
}

impl LocationSolution {
    #[must_use]
    pub fn reference(id: Uuid) -> Self {
        Self { id, data: None }
    }

    #[must_use]
    pub fn populated(id: Uuid, data: LocationSolutionData) -> Self {
        Self {
            id,
            data: Some(data),
        }
    }
}

impl Faceted for LocationSolution {
    type Data = LocationSolutionData;

    fn data(&self) -> Option<&LocationSolutionData> {
        self.data.as_ref()
    }

    fn to_entity_reference(&self) -> Self {
        Self::reference(self.id)
    }
}

impl LocationSolutionData {
    /// Arrival time of the first behavior that measures one.
    #[must_use]
    pub fn arrival_time(&self) -> Option<DateTime<Utc>> {
        self.location_behaviors
            .iter()
            .find(|behavior| {
                behavior.measurement.measurement_type() == FeatureMeasurementType::ArrivalTime
            })
            .and_then(|behavior| behavior.measurement.measurement.arrival_time())
    }
}

/// How one measurement contributed to a location solution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationBehavior {
    pub residual: Option<f64>,
    pub weight: Option<f64>,
    pub defining: bool,
    pub prediction: Option<FeaturePrediction>,
    pub measurement: FeatureMeasurement,
}

/// A value object predicted by a location solution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeaturePrediction {
    pub phase: String,
    pub prediction_type: FeatureMeasurementType,
    pub predicted_value: MeasurementValue,
    pub extrapolated: bool,
    pub channel: Option<Channel>,
    pub prediction_channel_segment: Option<ChannelSegment>,
}

// =============================================================================
// MAGNITUDES
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MagnitudeType {
    Mb,
    Ms,
    Ml,
    Mw,
}

/// A value object: network magnitude estimate for a location solution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkMagnitudeSolution {
    pub magnitude_type: MagnitudeType,
    pub magnitude: f64,
    pub standard_deviation: f64,
    pub magnitude_behaviors: Vec<NetworkMagnitudeBehavior>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkMagnitudeBehavior {
    pub defining: bool,
    pub residual: f64,
    pub weight: f64,
    pub station_magnitude_solution: StationMagnitudeSolution,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StationMagnitudeSolution {
    pub magnitude_type: MagnitudeType,
    pub station: Station,
    pub phase: String,
    pub magnitude: f64,
    pub measurement: Option<FeatureMeasurement>,
}
