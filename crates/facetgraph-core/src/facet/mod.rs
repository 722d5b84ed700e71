//! # Faceting Engine
//!
//! One facade per bounded context, composed into a [`FacetingEngine`] that
//! dispatches on the aggregate it is handed.
//!
//! ## Resolution steps
//!
//! Every facade entry point follows the same order:
//!
//! 1. Validate the definition against the expected class type.
//! 2. An unpopulated definition strips the entity to its reference form.
//! 3. A reference is upgraded through the owning accessor (0/1/N policy).
//! 4. Each child key present in the definition is faceted recursively.
//!    Absent keys leave the field exactly as provided.
//!
//! Facades depend on each other only through `Arc`, so one engine can be
//! shared across threads.

pub mod detection;
pub mod event;
pub mod station;
pub mod waveform;

pub use detection::{SignalDetectionFaceting, SignalDetectionFacetingBuilder};
pub use event::{EventFaceting, EventFacetingBuilder};
pub use station::{StationDefinitionFaceting, StationDefinitionFacetingBuilder};
pub use waveform::{WaveformFaceting, WaveformFacetingBuilder};

use crate::accessor::{
    EventAccessor, SignalDetectionAccessor, StationDefinitionAccessor, WaveformAccessor,
    distinct, group_by_id, results_or_empty, select_single,
};
use crate::definition::{FacetingDefinition, class_type_of};
use crate::primitives::MAX_LOOKUP_BATCH;
use crate::model::{
    Channel, ChannelSegment, Event, EventHypothesis, Faceted, LocationSolution, ProcessingMask,
    Response, SignalDetection, SignalDetectionHypothesis, Station,
};
use crate::types::{AccessError, ClassType, FacetError, WorkflowDefinitionId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Display;
use std::sync::Arc;

// =============================================================================
// CONTEXT
// =============================================================================

/// Call context an aggregate is faceted in.
///
/// Events and signal detections are looked up per stage; station
/// definitions and responses are looked up at an effective time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FacetContext {
    pub stage: Option<WorkflowDefinitionId>,
    pub effective_time: Option<DateTime<Utc>>,
}

impl FacetContext {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_stage(mut self, stage: WorkflowDefinitionId) -> Self {
        self.stage = Some(stage);
        self
    }

    #[must_use]
    pub fn with_effective_time(mut self, effective_time: DateTime<Utc>) -> Self {
        self.effective_time = Some(effective_time);
        self
    }

    /// # Errors
    ///
    /// `MissingArgument` when no stage was supplied.
    pub fn require_stage(&self) -> Result<&WorkflowDefinitionId, FacetError> {
        self.stage
            .as_ref()
            .ok_or_else(|| FacetError::MissingArgument("StageId cannot be null".to_string()))
    }

    /// # Errors
    ///
    /// `MissingArgument` when no effective time was supplied.
    pub fn require_effective_time(&self) -> Result<DateTime<Utc>, FacetError> {
        self.effective_time
            .ok_or_else(|| FacetError::MissingArgument("EffectiveTime cannot be null".to_string()))
    }
}

// =============================================================================
// AGGREGATES
// =============================================================================

/// Every root the engine can facet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Aggregate {
    Event(Event),
    EventHypothesis(EventHypothesis),
    LocationSolution(LocationSolution),
    SignalDetection(SignalDetection),
    SignalDetectionHypothesis(SignalDetectionHypothesis),
    ChannelSegment(ChannelSegment),
    ProcessingMask(ProcessingMask),
    Station(Station),
    Channel(Channel),
    Response(Response),
}

impl Aggregate {
    #[must_use]
    pub fn class_type(&self) -> ClassType {
        match self {
            Self::Event(_) => ClassType::Event,
            Self::EventHypothesis(_) => ClassType::EventHypothesis,
            Self::LocationSolution(_) => ClassType::LocationSolution,
            Self::SignalDetection(_) => ClassType::SignalDetection,
            Self::SignalDetectionHypothesis(_) => ClassType::SignalDetectionHypothesis,
            Self::ChannelSegment(_) => ClassType::ChannelSegment,
            Self::ProcessingMask(_) => ClassType::ProcessingMask,
            Self::Station(_) => ClassType::Station,
            Self::Channel(_) => ClassType::Channel,
            Self::Response(_) => ClassType::Response,
        }
    }

    #[must_use]
    pub fn is_populated(&self) -> bool {
        match self {
            Self::Event(e) => e.is_populated(),
            Self::EventHypothesis(h) => h.is_populated(),
            Self::LocationSolution(l) => l.is_populated(),
            Self::SignalDetection(s) => s.is_populated(),
            Self::SignalDetectionHypothesis(h) => h.is_populated(),
            Self::ChannelSegment(c) => c.is_populated(),
            Self::ProcessingMask(m) => m.is_populated(),
            Self::Station(s) => s.is_populated(),
            Self::Channel(c) => c.is_populated(),
            Self::Response(r) => r.is_populated(),
        }
    }
}

/// Whether a class type can head a faceting request on its own.
fn ensure_aggregate_root(class_type: ClassType) -> Result<(), FacetError> {
    match class_type {
        ClassType::Event
        | ClassType::EventHypothesis
        | ClassType::DefaultFacetedEventHypothesis
        | ClassType::LocationSolution
        | ClassType::SignalDetection
        | ClassType::SignalDetectionHypothesis
        | ClassType::ChannelSegment
        | ClassType::ProcessingMask
        | ClassType::Station
        | ClassType::Channel
        | ClassType::Response => Ok(()),
        ClassType::FeatureMeasurement
        | ClassType::FeaturePrediction
        | ClassType::NetworkMagnitudeSolution
        | ClassType::PreferredEventHypothesis => Err(FacetError::UnsupportedAggregate(class_type)),
    }
}

// =============================================================================
// ENGINE
// =============================================================================

/// The four facades wired together.
///
/// Cloning is cheap; every facade sits behind an `Arc`.
#[derive(Clone)]
pub struct FacetingEngine {
    station: Arc<StationDefinitionFaceting>,
    waveform: Arc<WaveformFaceting>,
    signal_detection: Arc<SignalDetectionFaceting>,
    event: Arc<EventFaceting>,
}

impl std::fmt::Debug for FacetingEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FacetingEngine").finish_non_exhaustive()
    }
}

impl FacetingEngine {
    /// Wire all facades from one accessor per context.
    ///
    /// # Errors
    ///
    /// Propagates facade builder errors.
    pub fn new(
        events: Arc<dyn EventAccessor>,
        signal_detections: Arc<dyn SignalDetectionAccessor>,
        waveforms: Arc<dyn WaveformAccessor>,
        stations: Arc<dyn StationDefinitionAccessor>,
    ) -> Result<Self, FacetError> {
        let station = Arc::new(
            StationDefinitionFaceting::builder()
                .accessor(stations)
                .build()?,
        );
        let waveform = Arc::new(
            WaveformFaceting::builder()
                .accessor(waveforms)
                .station_definition_faceting(Arc::clone(&station))
                .build()?,
        );
        let signal_detection = Arc::new(
            SignalDetectionFaceting::builder()
                .accessor(signal_detections)
                .waveform_faceting(Arc::clone(&waveform))
                .station_definition_faceting(Arc::clone(&station))
                .build()?,
        );
        let event = Arc::new(
            EventFaceting::builder()
                .accessor(events)
                .signal_detection_faceting(Arc::clone(&signal_detection))
                .station_definition_faceting(Arc::clone(&station))
                .waveform_faceting(Arc::clone(&waveform))
                .build()?,
        );

        Ok(Self {
            station,
            waveform,
            signal_detection,
            event,
        })
    }

    /// Wire all facades from one store that owns every context.
    ///
    /// # Errors
    ///
    /// See [`FacetingEngine::new`].
    pub fn from_store<S>(store: Arc<S>) -> Result<Self, FacetError>
    where
        S: EventAccessor
            + SignalDetectionAccessor
            + WaveformAccessor
            + StationDefinitionAccessor
            + 'static,
    {
        Self::new(store.clone(), store.clone(), store.clone(), store)
    }

    #[must_use]
    pub fn station_definition_faceting(&self) -> &Arc<StationDefinitionFaceting> {
        &self.station
    }

    #[must_use]
    pub fn waveform_faceting(&self) -> &Arc<WaveformFaceting> {
        &self.waveform
    }

    #[must_use]
    pub fn signal_detection_faceting(&self) -> &Arc<SignalDetectionFaceting> {
        &self.signal_detection
    }

    #[must_use]
    pub fn event_faceting(&self) -> &Arc<EventFaceting> {
        &self.event
    }

    /// Facet any aggregate root.
    ///
    /// # Errors
    ///
    /// - `UnregisteredClassType` when the definition names an unknown type
    /// - `UnsupportedAggregate` when it names a value object
    /// - `MissingArgument` when the context lacks the stage or effective
    ///   time the aggregate needs
    /// - any validation error the facade raises
    #[tracing::instrument(
        level = "debug",
        skip_all,
        fields(class_type = %aggregate.class_type(), populated = definition.is_populated())
    )]
    pub fn populate(
        &self,
        aggregate: &Aggregate,
        definition: &FacetingDefinition,
        context: &FacetContext,
    ) -> Result<Option<Aggregate>, FacetError> {
        ensure_aggregate_root(class_type_of(definition)?)?;

        match aggregate {
            Aggregate::Event(event) => Ok(self
                .event
                .populate_event(event, context.require_stage()?, definition)?
                .map(Aggregate::Event)),
            Aggregate::EventHypothesis(hypothesis) => Ok(self
                .event
                .populate_event_hypothesis(hypothesis, definition)?
                .map(Aggregate::EventHypothesis)),
            Aggregate::LocationSolution(solution) => Ok(Some(Aggregate::LocationSolution(
                self.event.populate_location_solution(solution, definition)?,
            ))),
            Aggregate::SignalDetection(detection) => Ok(self
                .signal_detection
                .populate_signal_detection(detection, definition, context.require_stage()?)?
                .map(Aggregate::SignalDetection)),
            Aggregate::SignalDetectionHypothesis(hypothesis) => Ok(self
                .signal_detection
                .populate_hypothesis(hypothesis, definition)?
                .map(Aggregate::SignalDetectionHypothesis)),
            Aggregate::ChannelSegment(segment) => Ok(self
                .waveform
                .populate_channel_segment(segment, definition)?
                .map(Aggregate::ChannelSegment)),
            Aggregate::ProcessingMask(mask) => Ok(self
                .waveform
                .populate_processing_mask(mask, definition)?
                .map(Aggregate::ProcessingMask)),
            Aggregate::Station(station) => Ok(self
                .station
                .populate_station(station, definition, context.require_effective_time()?)?
                .map(Aggregate::Station)),
            Aggregate::Channel(channel) => Ok(self
                .station
                .populate_channel(channel, definition, context.require_effective_time()?)?
                .map(Aggregate::Channel)),
            Aggregate::Response(response) => Ok(self
                .station
                .populate_response(response, definition, context.require_effective_time()?)?
                .map(Aggregate::Response)),
        }
    }
}

// =============================================================================
// SHARED RESOLUTION HELPERS
// =============================================================================

/// Keep a fetched instance only if it actually carries data.
fn populated_only<T: Faceted>(entity: T, class_type: ClassType, id: &dyn Display) -> Option<T> {
    if entity.is_populated() {
        Some(entity)
    } else {
        tracing::debug!(class_type = %class_type, id = %id, "retrieved instance is not populated");
        None
    }
}

/// Upgrade one entity to its populated form.
///
/// Populated input is returned as-is; a reference goes through `fetch` and
/// the 0/1/N policy.
pub(crate) fn resolve_one<T: Faceted>(
    entity: &T,
    class_type: ClassType,
    id: &dyn Display,
    context: &str,
    fetch: impl FnOnce() -> Result<Vec<T>, AccessError>,
) -> Option<T> {
    if entity.is_populated() {
        return Some(entity.clone());
    }
    let fetched = select_single(results_or_empty(fetch(), context), class_type, id)?;
    populated_only(fetched, class_type, id)
}

/// Upgrade a collection with one accessor call for all its references.
///
/// The output lines up with the input; `None` marks unresolvable entries.
pub(crate) fn resolve_batch<T, K>(
    entities: &[T],
    class_type: ClassType,
    context: &str,
    key_of: impl Fn(&T) -> K,
    fetch: impl Fn(&[K]) -> Result<Vec<T>, AccessError>,
) -> Vec<Option<T>>
where
    T: Faceted,
    K: Ord + Clone + Display,
{
    let grouped = fetch_grouped(entities, context, &key_of, fetch);
    entities
        .iter()
        .map(|entity| {
            if entity.is_populated() {
                return Some(entity.clone());
            }
            let key = key_of(entity);
            let results = grouped.get(&key).cloned().unwrap_or_default();
            select_single(results, class_type, &key)
                .and_then(|fetched| populated_only(fetched, class_type, &key))
        })
        .collect()
}

/// Fetch every distinct unpopulated key once and group the answers.
///
/// Keys go out in chunks of at most [`MAX_LOOKUP_BATCH`]; a failed chunk
/// only leaves its own keys without results.
pub(crate) fn fetch_grouped<T, K>(
    entities: &[T],
    context: &str,
    key_of: &impl Fn(&T) -> K,
    fetch: impl Fn(&[K]) -> Result<Vec<T>, AccessError>,
) -> BTreeMap<K, Vec<T>>
where
    T: Faceted,
    K: Ord + Clone,
{
    let wanted: Vec<K> = entities
        .iter()
        .filter(|entity| !entity.is_populated())
        .map(key_of)
        .collect();
    let keys = distinct(&wanted);

    let mut grouped = BTreeMap::new();
    for chunk in keys.chunks(MAX_LOOKUP_BATCH) {
        grouped.append(&mut group_by_id(
            chunk,
            results_or_empty(fetch(chunk), context),
            key_of,
        ));
    }
    grouped
}
