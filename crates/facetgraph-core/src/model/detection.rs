//! Signal-detection context: detections, their hypotheses and the feature
//! measurements a hypothesis carries.

use super::Faceted;
use super::station::{Channel, Station, Units};
use super::waveform::ChannelSegment;
use crate::types::{FacetError, SignalDetectionHypothesisId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

// =============================================================================
// FEATURE MEASUREMENTS
// =============================================================================

/// The kind of quantity a feature measurement records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum FeatureMeasurementType {
    ArrivalTime,
    Phase,
    Amplitude,
    ReceiverToSourceAzimuth,
    Slowness,
    EmergenceAngle,
    Rectilinearity,
}

/// A measured (or predicted) value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all_fields = "camelCase")]
pub enum MeasurementValue {
    ArrivalTime {
        arrival_time: DateTime<Utc>,
        standard_deviation_sec: Option<f64>,
    },
    Phase {
        phase: String,
        confidence: f64,
    },
    Amplitude {
        amplitude: f64,
        period_sec: f64,
        units: Units,
    },
    Azimuth {
        degrees: f64,
        standard_deviation: Option<f64>,
    },
    Slowness {
        sec_per_degree: f64,
        standard_deviation: Option<f64>,
    },
    EmergenceAngle {
        degrees: f64,
    },
    Rectilinearity {
        value: f64,
    },
}

impl MeasurementValue {
    #[must_use]
    pub fn measurement_type(&self) -> FeatureMeasurementType {
        match self {
            Self::ArrivalTime { .. } => FeatureMeasurementType::ArrivalTime,
            Self::Phase { .. } => FeatureMeasurementType::Phase,
            Self::Amplitude { .. } => FeatureMeasurementType::Amplitude,
            Self::Azimuth { .. } => FeatureMeasurementType::ReceiverToSourceAzimuth,
            Self::Slowness { .. } => FeatureMeasurementType::Slowness,
            Self::EmergenceAngle { .. } => FeatureMeasurementType::EmergenceAngle,
            Self::Rectilinearity { .. } => FeatureMeasurementType::Rectilinearity,
        }
    }

    /// The arrival time, for arrival-time values.
    #[must_use]
    pub fn arrival_time(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::ArrivalTime { arrival_time, .. } => Some(*arrival_time),
            _ => None,
        }
    }
}

/// Waveform an analyst derived a measurement from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisWaveform {
    pub waveform: ChannelSegment,
}

/// A value object: it has no identity of its own and is always populated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureMeasurement {
    pub channel: Channel,
    pub measured_channel_segment: Option<ChannelSegment>,
    pub analysis_waveform: Option<AnalysisWaveform>,
    pub measurement: MeasurementValue,
    pub snr: Option<f64>,
}

impl FeatureMeasurement {
    #[must_use]
    pub fn measurement_type(&self) -> FeatureMeasurementType {
        self.measurement.measurement_type()
    }
}

// =============================================================================
// SIGNAL DETECTION HYPOTHESIS
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalDetectionHypothesis {
    pub id: SignalDetectionHypothesisId,
    pub data: Option<SignalDetectionHypothesisData>,
}

/// Hypothesis payload.
///
/// Holds at most one feature measurement per measurement type. The check
/// runs on construction and on deserialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "HypothesisFields", into = "HypothesisFields")]
pub struct SignalDetectionHypothesisData {
    monitoring_organization: String,
    station: Station,
    rejected: bool,
    parent_signal_detection_hypothesis: Option<Box<SignalDetectionHypothesis>>,
    feature_measurements: Vec<FeatureMeasurement>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HypothesisFields {
    monitoring_organization: String,
    station: Station,
    rejected: bool,
    parent_signal_detection_hypothesis: Option<Box<SignalDetectionHypothesis>>,
    feature_measurements: Vec<FeatureMeasurement>,
}

impl TryFrom<HypothesisFields> for SignalDetectionHypothesisData {
    type Error = FacetError;

    fn try_from(fields: HypothesisFields) -> Result<Self, FacetError> {
        Self::new(
            fields.monitoring_organization,
            fields.station,
            fields.rejected,
            fields.parent_signal_detection_hypothesis.map(|parent| *parent),
            fields.feature_measurements,
        )
    }
}

impl From<SignalDetectionHypothesisData> for HypothesisFields {
    fn from(data: SignalDetectionHypothesisData) -> Self {
        Self {
            monitoring_organization: data.monitoring_organization,
            station: data.station,
            rejected: data.rejected,
            parent_signal_detection_hypothesis: data.parent_signal_detection_hypothesis,
            feature_measurements: data.feature_measurements,
        }
    }
}

fn check_one_per_type(measurements: &[FeatureMeasurement]) -> Result<(), FacetError> {
    let mut seen = BTreeSet::new();
    for measurement in measurements {
        if !seen.insert(measurement.measurement_type()) {
            return Err(FacetError::InvalidEntity(format!(
                "SignalDetectionHypothesis carries more than one {:?} measurement",
                measurement.measurement_type()
            )));
        }
    }
    Ok(())
}

impl SignalDetectionHypothesisData {
    /// # Errors
    ///
    /// Returns `FacetError::InvalidEntity` if two measurements share a type.
    pub fn new(
        monitoring_organization: impl Into<String>,
        station: Station,
        rejected: bool,
        parent: Option<SignalDetectionHypothesis>,
        feature_measurements: Vec<FeatureMeasurement>,
    ) -> Result<Self, FacetError> {
        check_one_per_type(&feature_measurements)?;
        Ok(Self {
            monitoring_organization: monitoring_organization.into(),
            station,
            rejected,
            parent_signal_detection_hypothesis: parent.map(Box::new),
            feature_measurements,
        })
    }

    #[must_use]
    pub fn monitoring_organization(&self) -> &str {
        &self.monitoring_organization
    }

    #[must_use]
    pub fn station(&self) -> &Station {
        &self.station
    }

    #[must_use]
    pub fn is_rejected(&self) -> bool {
        self.rejected
    }

    #[must_use]
    pub fn parent_signal_detection_hypothesis(&self) -> Option<&SignalDetectionHypothesis> {
        self.parent_signal_detection_hypothesis.as_deref()
    }

    #[must_use]
    pub fn feature_measurements(&self) -> &[FeatureMeasurement] {
        &self.feature_measurements
    }

    /// The measurement of the given type, if present.
    #[must_use]
    pub fn feature_measurement(&self, kind: FeatureMeasurementType) -> Option<&FeatureMeasurement> {
        self.feature_measurements
            .iter()
            .find(|measurement| measurement.measurement_type() == kind)
    }

    /// Arrival time of the hypothesis, the effective time of its station
    /// and channel children.
    #[must_use]
    pub fn arrival_time(&self) -> Option<DateTime<Utc>> {
        self.feature_measurement(FeatureMeasurementType::ArrivalTime)
            .and_then(|measurement| measurement.measurement.arrival_time())
    }

    #[must_use]
    pub fn with_station(&self, station: Station) -> Self {
        Self {
            station,
            ..self.clone()
        }
    }

    #[must_use]
    pub fn with_parent(&self, parent: Option<SignalDetectionHypothesis>) -> Self {
        Self {
            parent_signal_detection_hypothesis: parent.map(Box::new),
            ..self.clone()
        }
    }

    /// # Errors
    ///
    /// Returns `FacetError::InvalidEntity` if two measurements share a type.
    pub fn with_feature_measurements(
        &self,
        feature_measurements: Vec<FeatureMeasurement>,
    ) -> Result<Self, FacetError> {
        check_one_per_type(&feature_measurements)?;
        Ok(Self {
            feature_measurements,
            ..self.clone()
        })
    }
}

impl SignalDetectionHypothesis {
    #[must_use]
    pub fn reference(id: SignalDetectionHypothesisId) -> Self {
        Self { id, data: None }
    }

    #[must_use]
    pub fn populated(id: SignalDetectionHypothesisId, data: SignalDetectionHypothesisData) -> Self {
        Self {
            id,
            data: Some(data),
        }
    }

    #[must_use]
    pub fn with_data(&self, data: SignalDetectionHypothesisData) -> Self {
        Self::populated(self.id, data)
    }

    /// Length of the populated parent chain starting at this hypothesis.
    #[must_use]
    pub fn populated_depth(&self) -> usize {
        let mut depth = 0;
        let mut current = Some(self);
        while let Some(hypothesis) = current {
            let Some(data) = hypothesis.data.as_ref() else {
                break;
            };
            depth += 1;
            current = data.parent_signal_detection_hypothesis();
        }
        depth
    }
}

impl Faceted for SignalDetectionHypothesis {
    type Data = SignalDetectionHypothesisData;

    fn data(&self) -> Option<&SignalDetectionHypothesisData> {
        self.data.as_ref()
    }

    fn to_entity_reference(&self) -> Self {
        Self::reference(self.id)
    }
}

// =============================================================================
// SIGNAL DETECTION
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalDetection {
    pub id: Uuid,
    pub data: Option<SignalDetectionData>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalDetectionData {
    pub monitoring_organization: String,
    pub station: Station,
    pub signal_detection_hypotheses: Vec<SignalDetectionHypothesis>,
}

impl SignalDetection {
    #[must_use]
    pub fn reference(id: Uuid) -> Self {
        Self { id, data: None }
    }

    #[must_use]
    pub fn populated(id: Uuid, data: SignalDetectionData) -> Self {
        Self {
            id,
            data: Some(data),
        }
    }

    #[must_use]
    pub fn with_data(&self, data: SignalDetectionData) -> Self {
        Self::populated(self.id, data)
    }
}

impl Faceted for SignalDetection {
    type Data = SignalDetectionData;

    fn data(&self) -> Option<&SignalDetectionData> {
        self.data.as_ref()
    }

    fn to_entity_reference(&self) -> Self {
        Self::reference(self.id)
    }
}
