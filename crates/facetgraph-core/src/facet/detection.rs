//! Signal-detection facade: detections, hypotheses and feature measurements.
//!
//! Station and channel children of a hypothesis are looked up at the
//! hypothesis arrival time.

use super::{StationDefinitionFaceting, WaveformFaceting, resolve_batch, resolve_one};
use crate::accessor::SignalDetectionAccessor;
use crate::definition::{FacetingDefinition, require_populated, validate};
use crate::model::{
    AnalysisWaveform, ChannelSegment, Faceted, FeatureMeasurement, SignalDetection,
    SignalDetectionData, SignalDetectionHypothesis, SignalDetectionHypothesisData, VersionScoped,
};
use crate::primitives::{
    AW_CHANNEL_SEGMENT_KEY, CHANNEL_KEY, FEATURE_MEASUREMENTS_KEY, MEASURED_CHANNEL_SEGMENT_KEY,
    PARENT_SDH_KEY, SD_HYPOTHESES_KEY, STATION_KEY,
};
use crate::types::{ClassType, FacetError, WorkflowDefinitionId};
use chrono::{DateTime, Utc};
use std::slice;
use std::sync::Arc;

pub struct SignalDetectionFaceting {
    accessor: Arc<dyn SignalDetectionAccessor>,
    waveform: Arc<WaveformFaceting>,
    station: Arc<StationDefinitionFaceting>,
}

#[derive(Default)]
pub struct SignalDetectionFacetingBuilder {
    accessor: Option<Arc<dyn SignalDetectionAccessor>>,
    waveform: Option<Arc<WaveformFaceting>>,
    station: Option<Arc<StationDefinitionFaceting>>,
}

impl SignalDetectionFacetingBuilder {
    #[must_use]
    pub fn accessor(mut self, accessor: Arc<dyn SignalDetectionAccessor>) -> Self {
        self.accessor = Some(accessor);
        self
    }

    #[must_use]
    pub fn waveform_faceting(mut self, waveform: Arc<WaveformFaceting>) -> Self {
        self.waveform = Some(waveform);
        self
    }

    #[must_use]
    pub fn station_definition_faceting(mut self, station: Arc<StationDefinitionFaceting>) -> Self {
        self.station = Some(station);
        self
    }

    /// # Errors
    ///
    /// `MissingDependency` naming the first collaborator not supplied.
    pub fn build(self) -> Result<SignalDetectionFaceting, FacetError> {
        let accessor = self.accessor.ok_or_else(|| {
            FacetError::MissingDependency("SignalDetectionAccessor cannot be null".to_string())
        })?;
        let waveform = self.waveform.ok_or_else(|| {
            FacetError::MissingDependency("WaveformFaceting cannot be null".to_string())
        })?;
        let station = self.station.ok_or_else(|| {
            FacetError::MissingDependency("StationDefinitionFaceting cannot be null".to_string())
        })?;
        Ok(SignalDetectionFaceting {
            accessor,
            waveform,
            station,
        })
    }
}

impl SignalDetectionFaceting {
    #[must_use]
    pub fn builder() -> SignalDetectionFacetingBuilder {
        SignalDetectionFacetingBuilder::default()
    }

    // =========================================================================
    // SIGNAL DETECTION
    // =========================================================================

    /// Facet one detection as it stands in `stage`.
    ///
    /// # Errors
    ///
    /// Definition validation errors, here or in any nested definition.
    #[tracing::instrument(level = "debug", skip_all, fields(signal_detection = %detection.id, stage = %stage))]
    pub fn populate_signal_detection(
        &self,
        detection: &SignalDetection,
        definition: &FacetingDefinition,
        stage: &WorkflowDefinitionId,
    ) -> Result<Option<SignalDetection>, FacetError> {
        let definition = validate(Some(definition), ClassType::SignalDetection)?;
        if !definition.is_populated() {
            return Ok(Some(detection.to_entity_reference()));
        }

        let resolved = resolve_one(
            detection,
            ClassType::SignalDetection,
            &detection.id,
            "signal_detection::find_by_ids",
            || {
                self.accessor
                    .find_by_ids(slice::from_ref(&detection.id), stage)
            },
        );
        match resolved {
            Some(resolved) => self.facet_signal_detection(resolved, definition),
            None => Ok(None),
        }
    }

    /// Facet a detection list with one accessor call for all references.
    /// Unresolvable detections are dropped.
    ///
    /// # Errors
    ///
    /// Definition validation errors.
    pub fn populate_signal_detections(
        &self,
        detections: &[SignalDetection],
        definition: &FacetingDefinition,
        stage: &WorkflowDefinitionId,
    ) -> Result<Vec<SignalDetection>, FacetError> {
        let definition = validate(Some(definition), ClassType::SignalDetection)?;
        if !definition.is_populated() {
            return Ok(detections.iter().map(Faceted::to_entity_reference).collect());
        }

        let resolved = resolve_batch(
            detections,
            ClassType::SignalDetection,
            "signal_detection::find_by_ids",
            |detection| detection.id,
            |ids| self.accessor.find_by_ids(ids, stage),
        );
        let mut populated = Vec::with_capacity(resolved.len());
        for detection in resolved.into_iter().flatten() {
            if let Some(faceted) = self.facet_signal_detection(detection, definition)? {
                populated.push(faceted);
            }
        }
        Ok(populated)
    }

    fn facet_signal_detection(
        &self,
        detection: SignalDetection,
        definition: &FacetingDefinition,
    ) -> Result<Option<SignalDetection>, FacetError> {
        let Some(data) = detection.data.clone() else {
            return Ok(Some(detection));
        };

        let hypotheses = match definition.child(SD_HYPOTHESES_KEY) {
            Some(child) => {
                let faceted = self.populate_hypotheses(&data.signal_detection_hypotheses, child)?;
                if faceted.is_empty() {
                    tracing::debug!(
                        signal_detection = %detection.id,
                        "no hypothesis could be resolved"
                    );
                    return Ok(None);
                }
                faceted
            }
            None => data.signal_detection_hypotheses.clone(),
        };

        let station = match definition.child(STATION_KEY) {
            Some(child) if child.is_populated() => {
                let arrival = hypotheses
                    .iter()
                    .find_map(|h| h.data.as_ref().and_then(SignalDetectionHypothesisData::arrival_time));
                let Some(arrival) = arrival else {
                    tracing::debug!(
                        signal_detection = %detection.id,
                        "station requested but no hypothesis carries an arrival time"
                    );
                    return Ok(None);
                };
                self.station
                    .populate_station(&data.station, child, arrival)?
                    .unwrap_or_else(|| data.station.to_version_reference())
            }
            // Only reached when the child is unpopulated; stripping reads no time.
            Some(child) => self
                .station
                .populate_station(&data.station, child, DateTime::<Utc>::UNIX_EPOCH)?
                .unwrap_or_else(|| data.station.to_version_reference()),
            None => data.station.clone(),
        };

        Ok(Some(detection.with_data(SignalDetectionData {
            station,
            signal_detection_hypotheses: hypotheses,
            ..data
        })))
    }

    // =========================================================================
    // SIGNAL DETECTION HYPOTHESIS
    // =========================================================================

    /// Facet one hypothesis, following its parent chain as deep as the
    /// definition nests `parentSignalDetectionHypothesis`.
    ///
    /// # Errors
    ///
    /// Definition validation errors, here or in any nested definition.
    #[tracing::instrument(level = "debug", skip_all, fields(hypothesis = %hypothesis.id))]
    pub fn populate_hypothesis(
        &self,
        hypothesis: &SignalDetectionHypothesis,
        definition: &FacetingDefinition,
    ) -> Result<Option<SignalDetectionHypothesis>, FacetError> {
        let definition = validate(Some(definition), ClassType::SignalDetectionHypothesis)?;
        if !definition.is_populated() {
            return Ok(Some(hypothesis.to_entity_reference()));
        }

        let resolved = resolve_one(
            hypothesis,
            ClassType::SignalDetectionHypothesis,
            &hypothesis.id,
            "signal_detection::find_hypotheses_by_ids",
            || {
                self.accessor
                    .find_hypotheses_by_ids(slice::from_ref(&hypothesis.id))
            },
        );
        match resolved {
            Some(resolved) => self.facet_hypothesis(resolved, definition),
            None => Ok(None),
        }
    }

    /// Facet a hypothesis list with one accessor call for all references.
    /// Unresolvable hypotheses are dropped.
    ///
    /// # Errors
    ///
    /// Definition validation errors.
    pub fn populate_hypotheses(
        &self,
        hypotheses: &[SignalDetectionHypothesis],
        definition: &FacetingDefinition,
    ) -> Result<Vec<SignalDetectionHypothesis>, FacetError> {
        let definition = validate(Some(definition), ClassType::SignalDetectionHypothesis)?;
        if !definition.is_populated() {
            return Ok(hypotheses.iter().map(Faceted::to_entity_reference).collect());
        }

        let resolved = resolve_batch(
            hypotheses,
            ClassType::SignalDetectionHypothesis,
            "signal_detection::find_hypotheses_by_ids",
            |hypothesis| hypothesis.id,
            |ids| self.accessor.find_hypotheses_by_ids(ids),
        );
        let mut populated = Vec::with_capacity(resolved.len());
        for hypothesis in resolved.into_iter().flatten() {
            if let Some(faceted) = self.facet_hypothesis(hypothesis, definition)? {
                populated.push(faceted);
            }
        }
        Ok(populated)
    }

    fn facet_hypothesis(
        &self,
        hypothesis: SignalDetectionHypothesis,
        definition: &FacetingDefinition,
    ) -> Result<Option<SignalDetectionHypothesis>, FacetError> {
        let Some(mut data) = hypothesis.data.clone() else {
            return Ok(Some(hypothesis));
        };

        if !data.is_rejected() {
            let station_child = definition.child(STATION_KEY);
            let measurements_child = definition.child(FEATURE_MEASUREMENTS_KEY);
            if station_child.is_some() || measurements_child.is_some() {
                let Some(arrival) = data.arrival_time() else {
                    tracing::debug!(
                        hypothesis = %hypothesis.id,
                        "hypothesis has no arrival time to look up its station at"
                    );
                    return Ok(None);
                };

                if let Some(child) = station_child {
                    let station = self
                        .station
                        .populate_station(data.station(), child, arrival)?
                        .unwrap_or_else(|| data.station().to_version_reference());
                    data = data.with_station(station);
                }
                if let Some(child) = measurements_child {
                    let measurements = data
                        .feature_measurements()
                        .iter()
                        .map(|m| self.populate_feature_measurement(m, child, arrival))
                        .collect::<Result<Vec<_>, _>>()?;
                    data = data.with_feature_measurements(measurements)?;
                }
            }
        }

        if let (Some(parent), Some(child)) = (
            data.parent_signal_detection_hypothesis(),
            definition.child(PARENT_SDH_KEY),
        ) {
            let faceted = self
                .populate_hypothesis(parent, child)?
                .unwrap_or_else(|| parent.to_entity_reference());
            data = data.with_parent(Some(faceted));
        }

        Ok(Some(hypothesis.with_data(data)))
    }

    // =========================================================================
    // FEATURE MEASUREMENT
    // =========================================================================

    /// Facet a feature measurement at `effective_time`.
    ///
    /// Measurements are values: they cannot be stripped, so the definition
    /// must be populated. Unresolvable children fall back to references.
    ///
    /// # Errors
    ///
    /// `ParentNotPopulated` for an unpopulated definition, plus definition
    /// validation errors.
    pub fn populate_feature_measurement(
        &self,
        measurement: &FeatureMeasurement,
        definition: &FacetingDefinition,
        effective_time: DateTime<Utc>,
    ) -> Result<FeatureMeasurement, FacetError> {
        let definition = require_populated(Some(definition), ClassType::FeatureMeasurement)?;

        let channel = match definition.child(CHANNEL_KEY) {
            Some(child) => self
                .station
                .populate_channel(&measurement.channel, child, effective_time)?
                .unwrap_or_else(|| measurement.channel.to_version_reference()),
            None => measurement.channel.clone(),
        };

        let measured_channel_segment = match (
            definition.child(MEASURED_CHANNEL_SEGMENT_KEY),
            &measurement.measured_channel_segment,
        ) {
            (Some(child), Some(segment)) => Some(self.facet_segment(segment, child)?),
            _ => measurement.measured_channel_segment.clone(),
        };

        let analysis_waveform = match (
            definition.child(AW_CHANNEL_SEGMENT_KEY),
            &measurement.analysis_waveform,
        ) {
            (Some(child), Some(analysis)) => Some(AnalysisWaveform {
                waveform: self.facet_segment(&analysis.waveform, child)?,
            }),
            _ => measurement.analysis_waveform.clone(),
        };

        Ok(FeatureMeasurement {
            channel,
            measured_channel_segment,
            analysis_waveform,
            ..measurement.clone()
        })
    }

    fn facet_segment(
        &self,
        segment: &ChannelSegment,
        definition: &FacetingDefinition,
    ) -> Result<ChannelSegment, FacetError> {
        Ok(self
            .waveform
            .populate_channel_segment(segment, definition)?
            .unwrap_or_else(|| segment.to_entity_reference()))
    }
}
