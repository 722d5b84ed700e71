//! Event facade: events, event hypotheses and location solutions.
//!
//! The preferred, overall-preferred and final-history hypotheses of an event
//! are resolved against the event's own (already faceted) hypotheses by id.
//! They are never fetched on their own.

use super::{
    SignalDetectionFaceting, StationDefinitionFaceting, WaveformFaceting, fetch_grouped,
    resolve_batch, resolve_one,
};
use crate::accessor::EventAccessor;
use crate::definition::{FacetingDefinition, class_type_of, require_populated, validate};
use crate::model::{
    Channel, ChannelSegment, Event, EventData, EventHypothesis, Faceted,
    FeaturePrediction, LocationBehavior, LocationSolution, LocationSolutionData,
    NetworkMagnitudeSolution, PreferredEventHypothesis, VersionScoped,
};
use crate::primitives::{
    ASSOCIATED_SDH_KEY, CHANNEL_KEY, CHANNEL_SEGMENT_KEY, EVENT_HYPOTHESIS_KEY,
    FEATURE_MEASUREMENTS_KEY, FEATURE_PREDICTIONS_KEY, FINAL_EH_HISTORY_KEY,
    LOCATION_SOLUTION_KEY, NETWORK_MAGNITUDE_SOLUTIONS_KEY, OVERALL_PREFERRED_KEY,
    PARENT_EH_KEY, PREFERRED_EH_KEY, PREFERRED_LOCATION_SOLUTION_KEY, REJECTED_SD_KEY,
};
use crate::types::{ClassType, EventHypothesisId, FacetError, WorkflowDefinitionId};
use std::slice;
use std::sync::Arc;

pub struct EventFaceting {
    accessor: Arc<dyn EventAccessor>,
    signal_detection: Arc<SignalDetectionFaceting>,
    station: Arc<StationDefinitionFaceting>,
    waveform: Arc<WaveformFaceting>,
}

#[derive(Default)]
pub struct EventFacetingBuilder {
    accessor: Option<Arc<dyn EventAccessor>>,
    signal_detection: Option<Arc<SignalDetectionFaceting>>,
    station: Option<Arc<StationDefinitionFaceting>>,
    waveform: Option<Arc<WaveformFaceting>>,
}

impl EventFacetingBuilder {
    #[must_use]
    pub fn accessor(mut self, accessor: Arc<dyn EventAccessor>) -> Self {
        self.accessor = Some(accessor);
        self
    }

    #[must_use]
    pub fn signal_detection_faceting(
        mut self,
        signal_detection: Arc<SignalDetectionFaceting>,
    ) -> Self {
        self.signal_detection = Some(signal_detection);
        self
    }

    #[must_use]
    pub fn station_definition_faceting(mut self, station: Arc<StationDefinitionFaceting>) -> Self {
        self.station = Some(station);
        self
    }

    #[must_use]
    pub fn waveform_faceting(mut self, waveform: Arc<WaveformFaceting>) -> Self {
        self.waveform = Some(waveform);
        self
    }

    /// # Errors
    ///
    /// `MissingDependency` naming the first collaborator not supplied.
    pub fn build(self) -> Result<EventFaceting, FacetError> {
        let accessor = self.accessor.ok_or_else(|| {
            FacetError::MissingDependency("EventAccessor cannot be null".to_string())
        })?;
        let signal_detection = self.signal_detection.ok_or_else(|| {
            FacetError::MissingDependency("SignalDetectionFaceting cannot be null".to_string())
        })?;
        let station = self.station.ok_or_else(|| {
            FacetError::MissingDependency("StationDefinitionFaceting cannot be null".to_string())
        })?;
        let waveform = self.waveform.ok_or_else(|| {
            FacetError::MissingDependency("WaveformFaceting cannot be null".to_string())
        })?;
        Ok(EventFaceting {
            accessor,
            signal_detection,
            station,
            waveform,
        })
    }
}

/// Whether a hypothesis definition is the pass-through marker.
///
/// # Errors
///
/// Validation errors when the definition is neither the marker nor an
/// `EventHypothesis` definition.
fn is_pass_through(definition: &FacetingDefinition) -> Result<bool, FacetError> {
    if matches!(
        class_type_of(definition),
        Ok(ClassType::DefaultFacetedEventHypothesis)
    ) {
        return Ok(true);
    }
    validate(Some(definition), ClassType::EventHypothesis)?;
    Ok(false)
}

/// First hypothesis in `pool` with the given id.
fn find_by_id(pool: &[EventHypothesis], id: EventHypothesisId) -> Option<&EventHypothesis> {
    pool.iter().find(|hypothesis| hypothesis.id == id)
}

/// Resolve each stage's preferred hypothesis against the faceted pool.
fn preferred_by_stage(
    preferred: &[PreferredEventHypothesis],
    pool: &[EventHypothesis],
    definition: &FacetingDefinition,
) -> Result<Vec<PreferredEventHypothesis>, FacetError> {
    let definition = validate(Some(definition), ClassType::PreferredEventHypothesis)?;
    Ok(preferred
        .iter()
        .map(|entry| {
            let hypothesis = if definition.is_populated() {
                find_by_id(pool, entry.preferred.id)
                    .cloned()
                    .unwrap_or_else(|| entry.preferred.clone())
            } else {
                entry.preferred.to_entity_reference()
            };
            PreferredEventHypothesis {
                preferred: hypothesis,
                ..entry.clone()
            }
        })
        .collect())
}

impl EventFaceting {
    #[must_use]
    pub fn builder() -> EventFacetingBuilder {
        EventFacetingBuilder::default()
    }

    // =========================================================================
    // EVENT
    // =========================================================================

    /// Facet one event as it stands in `stage`.
    ///
    /// # Errors
    ///
    /// Definition validation errors, here or in any nested definition.
    #[tracing::instrument(level = "debug", skip_all, fields(event = %event.id, stage = %stage))]
    pub fn populate_event(
        &self,
        event: &Event,
        stage: &WorkflowDefinitionId,
        definition: &FacetingDefinition,
    ) -> Result<Option<Event>, FacetError> {
        let definition = validate(Some(definition), ClassType::Event)?;
        if !definition.is_populated() {
            return Ok(Some(event.to_entity_reference()));
        }

        let resolved = resolve_one(event, ClassType::Event, &event.id, "event::find_by_ids", || {
            self.accessor.find_by_ids(slice::from_ref(&event.id), stage)
        });
        match resolved {
            Some(resolved) => self.facet_event(resolved, stage, definition).map(Some),
            None => Ok(None),
        }
    }

    /// Facet an event list with one accessor call for all references.
    /// Unresolvable events are dropped.
    ///
    /// # Errors
    ///
    /// Definition validation errors.
    pub fn populate_events(
        &self,
        events: &[Event],
        stage: &WorkflowDefinitionId,
        definition: &FacetingDefinition,
    ) -> Result<Vec<Event>, FacetError> {
        let definition = validate(Some(definition), ClassType::Event)?;
        if !definition.is_populated() {
            return Ok(events.iter().map(Faceted::to_entity_reference).collect());
        }

        resolve_batch(
            events,
            ClassType::Event,
            "event::find_by_ids",
            |event| event.id,
            |ids| self.accessor.find_by_ids(ids, stage),
        )
        .into_iter()
        .flatten()
        .map(|event| self.facet_event(event, stage, definition))
        .collect()
    }

    fn facet_event(
        &self,
        event: Event,
        stage: &WorkflowDefinitionId,
        definition: &FacetingDefinition,
    ) -> Result<Event, FacetError> {
        let Some(data) = event.data.clone() else {
            return Ok(event);
        };

        let rejected_signal_detection_associations = match definition.child(REJECTED_SD_KEY) {
            Some(child) => self.signal_detection.populate_signal_detections(
                &data.rejected_signal_detection_associations,
                child,
                stage,
            )?,
            None => data.rejected_signal_detection_associations.clone(),
        };

        let event_hypotheses = match definition.child(EVENT_HYPOTHESIS_KEY) {
            Some(child) => self.populate_event_hypotheses(&data.event_hypotheses, child)?,
            None => data.event_hypotheses.clone(),
        };

        let preferred_event_hypothesis_by_stage = match definition.child(PREFERRED_EH_KEY) {
            Some(child) => preferred_by_stage(
                &data.preferred_event_hypothesis_by_stage,
                &event_hypotheses,
                child,
            )?,
            None => data.preferred_event_hypothesis_by_stage.clone(),
        };

        let overall_preferred = match (
            definition.child(OVERALL_PREFERRED_KEY),
            &data.overall_preferred,
        ) {
            (Some(child), Some(overall)) => {
                let child = validate(Some(child), ClassType::EventHypothesis)?;
                if child.is_populated() {
                    let found = find_by_id(&event_hypotheses, overall.id).cloned();
                    if found.is_none() {
                        tracing::warn!(
                            event = %event.id,
                            hypothesis = %overall.id,
                            "overall preferred hypothesis is not among the event hypotheses"
                        );
                    }
                    found
                } else {
                    Some(overall.to_entity_reference())
                }
            }
            _ => data.overall_preferred.clone(),
        };

        let final_event_hypothesis_history = match definition.child(FINAL_EH_HISTORY_KEY) {
            Some(child) => {
                let child = validate(Some(child), ClassType::EventHypothesis)?;
                if child.is_populated() {
                    data.final_event_hypothesis_history
                        .iter()
                        .filter_map(|entry| {
                            let found = find_by_id(&event_hypotheses, entry.id).cloned();
                            if found.is_none() {
                                tracing::warn!(
                                    event = %event.id,
                                    hypothesis = %entry.id,
                                    "final history hypothesis is not among the event hypotheses"
                                );
                            }
                            found
                        })
                        .collect()
                } else {
                    data.final_event_hypothesis_history
                        .iter()
                        .map(Faceted::to_entity_reference)
                        .collect()
                }
            }
            None => data.final_event_hypothesis_history.clone(),
        };

        Ok(event.with_data(EventData {
            rejected_signal_detection_associations,
            event_hypotheses,
            preferred_event_hypothesis_by_stage,
            overall_preferred,
            final_event_hypothesis_history,
            ..data
        }))
    }

    // =========================================================================
    // EVENT HYPOTHESIS
    // =========================================================================

    /// Facet one hypothesis. A reference that the accessor answers with
    /// anything other than exactly one hypothesis is unresolvable.
    ///
    /// # Errors
    ///
    /// Definition validation errors, here or in any nested definition.
    #[tracing::instrument(level = "debug", skip_all, fields(hypothesis = %hypothesis.id))]
    pub fn populate_event_hypothesis(
        &self,
        hypothesis: &EventHypothesis,
        definition: &FacetingDefinition,
    ) -> Result<Option<EventHypothesis>, FacetError> {
        let pass_through = is_pass_through(definition)?;
        if !pass_through && !definition.is_populated() {
            return Ok(Some(hypothesis.to_entity_reference()));
        }

        let resolved = resolve_one(
            hypothesis,
            ClassType::EventHypothesis,
            &hypothesis.id,
            "event::find_hypotheses_by_ids",
            || {
                self.accessor
                    .find_hypotheses_by_ids(slice::from_ref(&hypothesis.id))
            },
        );
        match resolved {
            Some(resolved) if pass_through => Ok(Some(resolved)),
            Some(resolved) => self.facet_event_hypothesis(resolved, definition).map(Some),
            None => Ok(None),
        }
    }

    /// Facet a hypothesis collection.
    ///
    /// Each reference expands to every hypothesis the accessor returns for
    /// its id, so a rejected hypothesis comes back together with the
    /// hypothesis it rejected. All references are fetched in one call.
    ///
    /// # Errors
    ///
    /// Definition validation errors, here or in any nested definition.
    pub fn populate_event_hypotheses(
        &self,
        hypotheses: &[EventHypothesis],
        definition: &FacetingDefinition,
    ) -> Result<Vec<EventHypothesis>, FacetError> {
        let pass_through = is_pass_through(definition)?;
        if !pass_through && !definition.is_populated() {
            return Ok(hypotheses.iter().map(Faceted::to_entity_reference).collect());
        }

        let key_of = |hypothesis: &EventHypothesis| hypothesis.id;
        let fetched = fetch_grouped(
            hypotheses,
            "event::find_hypotheses_by_ids",
            &key_of,
            |ids| self.accessor.find_hypotheses_by_ids(ids),
        );

        let mut expanded = Vec::with_capacity(hypotheses.len());
        for hypothesis in hypotheses {
            if hypothesis.is_populated() {
                expanded.push(hypothesis.clone());
                continue;
            }
            let matches = fetched.get(&hypothesis.id).map(Vec::as_slice).unwrap_or_default();
            if matches.is_empty() {
                tracing::debug!(hypothesis = %hypothesis.id, "no event hypothesis found");
            }
            expanded.extend(matches.iter().filter(|m| m.is_populated()).cloned());
        }

        if pass_through {
            return Ok(expanded);
        }
        expanded
            .into_iter()
            .map(|hypothesis| self.facet_event_hypothesis(hypothesis, definition))
            .collect()
    }

    fn facet_event_hypothesis(
        &self,
        hypothesis: EventHypothesis,
        definition: &FacetingDefinition,
    ) -> Result<EventHypothesis, FacetError> {
        let Some(data) = hypothesis.data.clone() else {
            return Ok(hypothesis);
        };

        let parents = match definition.child(PARENT_EH_KEY) {
            Some(child) => data
                .parent_event_hypotheses()
                .iter()
                .map(|parent| {
                    Ok(self
                        .populate_event_hypothesis(parent, child)?
                        .unwrap_or_else(|| parent.to_entity_reference()))
                })
                .collect::<Result<Vec<_>, FacetError>>()?,
            None => data.parent_event_hypotheses().to_vec(),
        };

        if data.is_rejected() {
            return Ok(hypothesis.with_data(data.with_relations(
                parents,
                data.associated_signal_detection_hypotheses().to_vec(),
                data.preferred_location_solution().cloned(),
                data.location_solutions().to_vec(),
            )?));
        }

        let associations = match definition.child(ASSOCIATED_SDH_KEY) {
            Some(child) => self
                .signal_detection
                .populate_hypotheses(data.associated_signal_detection_hypotheses(), child)?,
            None => data.associated_signal_detection_hypotheses().to_vec(),
        };

        let location_solutions = match definition.child(LOCATION_SOLUTION_KEY) {
            Some(child) => data
                .location_solutions()
                .iter()
                .map(|solution| self.populate_location_solution(solution, child))
                .collect::<Result<Vec<_>, _>>()?,
            None => data.location_solutions().to_vec(),
        };

        let preferred = match (
            definition.child(PREFERRED_LOCATION_SOLUTION_KEY),
            data.preferred_location_solution(),
        ) {
            (Some(child), Some(preferred)) => {
                let child = validate(Some(child), ClassType::LocationSolution)?;
                if child.is_populated() {
                    match location_solutions.iter().find(|s| s.id == preferred.id) {
                        Some(found) if found.is_populated() => Some(found.clone()),
                        _ => Some(self.populate_location_solution(preferred, child)?),
                    }
                } else {
                    Some(preferred.to_entity_reference())
                }
            }
            _ => data.preferred_location_solution().cloned(),
        };

        Ok(hypothesis.with_data(data.with_relations(
            parents,
            associations,
            preferred,
            location_solutions,
        )?))
    }

    // =========================================================================
    // LOCATION SOLUTION
    // =========================================================================

    /// Facet a location solution.
    ///
    /// Location solutions are stored with their hypothesis and have no
    /// accessor of their own; a reference is returned as provided.
    ///
    /// # Errors
    ///
    /// Definition validation errors, here or in any nested definition.
    pub fn populate_location_solution(
        &self,
        solution: &LocationSolution,
        definition: &FacetingDefinition,
    ) -> Result<LocationSolution, FacetError> {
        let definition = validate(Some(definition), ClassType::LocationSolution)?;
        if !definition.is_populated() {
            return Ok(solution.to_entity_reference());
        }
        let Some(data) = solution.data.as_ref() else {
            tracing::debug!(
                location_solution = %solution.id,
                "location solution reference kept as provided"
            );
            return Ok(solution.clone());
        };

        let measurements_child = definition.child(FEATURE_MEASUREMENTS_KEY);
        let predictions_child = definition.child(FEATURE_PREDICTIONS_KEY);
        let arrival = data.arrival_time();
        if measurements_child.is_some() && arrival.is_none() {
            tracing::warn!(
                location_solution = %solution.id,
                "no arrival time among location behaviors, measurements kept as provided"
            );
        }

        let location_behaviors = data
            .location_behaviors
            .iter()
            .map(|behavior| {
                let measurement = match (measurements_child, arrival) {
                    (Some(child), Some(arrival)) => self
                        .signal_detection
                        .populate_feature_measurement(&behavior.measurement, child, arrival)?,
                    _ => behavior.measurement.clone(),
                };
                let prediction = match (predictions_child, &behavior.prediction) {
                    (Some(child), Some(prediction)) => {
                        Some(self.populate_feature_prediction(prediction, child)?)
                    }
                    _ => behavior.prediction.clone(),
                };
                Ok(LocationBehavior {
                    measurement,
                    prediction,
                    ..behavior.clone()
                })
            })
            .collect::<Result<Vec<_>, FacetError>>()?;

        let feature_predictions = match predictions_child {
            Some(child) => data
                .feature_predictions
                .iter()
                .map(|prediction| self.populate_feature_prediction(prediction, child))
                .collect::<Result<Vec<_>, _>>()?,
            None => data.feature_predictions.clone(),
        };

        let network_magnitude_solutions = match definition.child(NETWORK_MAGNITUDE_SOLUTIONS_KEY) {
            Some(child) => data
                .network_magnitude_solutions
                .iter()
                .map(|magnitude| self.populate_network_magnitude_solution(magnitude, child))
                .collect::<Result<Vec<_>, _>>()?,
            None => data.network_magnitude_solutions.clone(),
        };

        Ok(LocationSolution::populated(
            solution.id,
            LocationSolutionData {
                location_behaviors,
                feature_predictions,
                network_magnitude_solutions,
                ..data.clone()
            },
        ))
    }

    fn populate_feature_prediction(
        &self,
        prediction: &FeaturePrediction,
        definition: &FacetingDefinition,
    ) -> Result<FeaturePrediction, FacetError> {
        let definition = require_populated(Some(definition), ClassType::FeaturePrediction)?;

        let channel = match (definition.child(CHANNEL_KEY), &prediction.channel) {
            (Some(child), Some(channel)) => Some(self.build_channel(channel, child)?),
            _ => prediction.channel.clone(),
        };
        let prediction_channel_segment = match (
            definition.child(CHANNEL_SEGMENT_KEY),
            &prediction.prediction_channel_segment,
        ) {
            (Some(child), Some(segment)) => Some(self.build_channel_segment(segment, child)?),
            _ => prediction.prediction_channel_segment.clone(),
        };

        Ok(FeaturePrediction {
            channel,
            prediction_channel_segment,
            ..prediction.clone()
        })
    }

    fn populate_network_magnitude_solution(
        &self,
        magnitude: &NetworkMagnitudeSolution,
        definition: &FacetingDefinition,
    ) -> Result<NetworkMagnitudeSolution, FacetError> {
        let definition = require_populated(Some(definition), ClassType::NetworkMagnitudeSolution)?;
        let Some(child) = definition.child(CHANNEL_KEY) else {
            return Ok(magnitude.clone());
        };

        let mut faceted = magnitude.clone();
        for behavior in &mut faceted.magnitude_behaviors {
            if let Some(measurement) = behavior.station_magnitude_solution.measurement.as_mut() {
                measurement.channel = self.build_channel(&measurement.channel, child)?;
            }
        }
        Ok(faceted)
    }

    /// Facet a channel at the version it already names.
    fn build_channel(
        &self,
        channel: &Channel,
        definition: &FacetingDefinition,
    ) -> Result<Channel, FacetError> {
        let definition = validate(Some(definition), ClassType::Channel)?;
        if !definition.is_populated() {
            return Ok(channel.to_version_reference());
        }
        let Some(effective_at) = channel.effective_at else {
            tracing::debug!(channel = %channel.name, "channel has no effective time, kept as provided");
            return Ok(channel.clone());
        };
        Ok(self
            .station
            .populate_channel(channel, definition, effective_at)?
            .unwrap_or_else(|| channel.to_version_reference()))
    }

    fn build_channel_segment(
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
