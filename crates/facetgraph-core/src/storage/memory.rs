//! In-memory reference store.
//!
//! Keeps every record kind in a `BTreeMap` from identity to the records
//! stored under it. More than one record per identity is allowed, which is
//! how ambiguous lookups and rejected event hypotheses are represented.
//!
//! Every accessor call is counted per record kind so callers can check how
//! many round trips a faceting request cost.

use super::fixture::{Fixture, Staged};
use super::{RecordCounts, check_batch, version_at};
use crate::accessor::{
    EventAccessor, SignalDetectionAccessor, StationDefinitionAccessor, WaveformAccessor,
};
use crate::model::waveform::SegmentKey;
use crate::model::{
    Channel, ChannelSegment, ChannelSegmentDescriptor, Event, EventHypothesis, ProcessingMask,
    Response, SignalDetection, SignalDetectionHypothesis, Station,
};
use crate::types::{
    AccessError, EventHypothesisId, FacetError, SignalDetectionHypothesisId, WorkflowDefinitionId,
};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Mutex;
use uuid::Uuid;

/// Record kinds, also the keys of call and record counts.
pub mod kind {
    pub const EVENTS: &str = "events";
    pub const EVENT_HYPOTHESES: &str = "eventHypotheses";
    pub const SIGNAL_DETECTIONS: &str = "signalDetections";
    pub const SIGNAL_DETECTION_HYPOTHESES: &str = "signalDetectionHypotheses";
    pub const CHANNEL_SEGMENTS: &str = "channelSegments";
    pub const PROCESSING_MASKS: &str = "processingMasks";
    pub const STATIONS: &str = "stations";
    pub const CHANNELS: &str = "channels";
    pub const RESPONSES: &str = "responses";
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    events: BTreeMap<Uuid, Vec<Staged<Event>>>,
    event_hypotheses: BTreeMap<EventHypothesisId, Vec<EventHypothesis>>,
    signal_detections: BTreeMap<Uuid, Vec<Staged<SignalDetection>>>,
    signal_detection_hypotheses:
        BTreeMap<SignalDetectionHypothesisId, Vec<SignalDetectionHypothesis>>,
    channel_segments: BTreeMap<SegmentKey, Vec<ChannelSegment>>,
    processing_masks: BTreeMap<Uuid, Vec<ProcessingMask>>,
    stations: BTreeMap<String, Vec<Station>>,
    channels: BTreeMap<String, Vec<Channel>>,
    responses: BTreeMap<Uuid, Vec<Response>>,
    calls: Mutex<BTreeMap<&'static str, usize>>,
    failures: BTreeMap<&'static str, AccessError>,
}

fn push<K: Ord, T>(map: &mut BTreeMap<K, Vec<T>>, key: K, record: T) {
    map.entry(key).or_default().push(record);
}

fn len_of<K, T>(map: &BTreeMap<K, Vec<T>>) -> usize {
    map.values().map(Vec::len).sum()
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A store holding every record of `fixture`.
    ///
    /// # Errors
    ///
    /// Returns the fixture's validation error.
    pub fn from_fixture(fixture: &Fixture) -> Result<Self, FacetError> {
        let mut store = Self::new();
        store.import(fixture)?;
        Ok(store)
    }

    /// Add every record of `fixture`; returns how many were added.
    pub fn import(&mut self, fixture: &Fixture) -> Result<usize, FacetError> {
        fixture.validate()?;

        for staged in &fixture.events {
            push(&mut self.events, staged.record.id, staged.clone());
        }
        for hypothesis in &fixture.event_hypotheses {
            push(&mut self.event_hypotheses, hypothesis.id, hypothesis.clone());
        }
        for staged in &fixture.signal_detections {
            push(&mut self.signal_detections, staged.record.id, staged.clone());
        }
        for hypothesis in &fixture.signal_detection_hypotheses {
            push(
                &mut self.signal_detection_hypotheses,
                hypothesis.id,
                hypothesis.clone(),
            );
        }
        for segment in &fixture.channel_segments {
            push(&mut self.channel_segments, segment.id.key(), segment.clone());
        }
        for mask in &fixture.processing_masks {
            push(&mut self.processing_masks, mask.id, mask.clone());
        }
        for station in &fixture.stations {
            push(&mut self.stations, station.name.clone(), station.clone());
        }
        for channel in &fixture.channels {
            push(&mut self.channels, channel.name.clone(), channel.clone());
        }
        for response in &fixture.responses {
            push(&mut self.responses, response.id, response.clone());
        }

        let added = fixture.record_count();
        tracing::debug!(added, "imported fixture into memory store");
        Ok(added)
    }

    /// Make every lookup of `kind` fail with `error`.
    #[must_use]
    pub fn failing(mut self, kind: &'static str, error: AccessError) -> Self {
        self.failures.insert(kind, error);
        self
    }

    #[must_use]
    pub fn counts(&self) -> RecordCounts {
        RecordCounts::from([
            (kind::EVENTS, len_of(&self.events)),
            (kind::EVENT_HYPOTHESES, len_of(&self.event_hypotheses)),
            (kind::SIGNAL_DETECTIONS, len_of(&self.signal_detections)),
            (
                kind::SIGNAL_DETECTION_HYPOTHESES,
                len_of(&self.signal_detection_hypotheses),
            ),
            (kind::CHANNEL_SEGMENTS, len_of(&self.channel_segments)),
            (kind::PROCESSING_MASKS, len_of(&self.processing_masks)),
            (kind::STATIONS, len_of(&self.stations)),
            (kind::CHANNELS, len_of(&self.channels)),
            (kind::RESPONSES, len_of(&self.responses)),
        ])
    }

    /// Number of accessor calls made for `kind` so far.
    #[must_use]
    pub fn call_count(&self, kind: &str) -> usize {
        self.calls
            .lock()
            .map(|calls| calls.get(kind).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    #[must_use]
    pub fn total_calls(&self) -> usize {
        self.calls
            .lock()
            .map(|calls| calls.values().sum())
            .unwrap_or(0)
    }

    pub fn reset_calls(&self) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.clear();
        }
    }

    /// Count one call and apply the batch limit and any injected failure.
    fn begin(&self, kind: &'static str, batch: usize) -> Result<(), AccessError> {
        {
            let mut calls = self
                .calls
                .lock()
                .map_err(|e| AccessError::Storage(e.to_string()))?;
            *calls.entry(kind).or_insert(0) += 1;
        }
        check_batch(batch)?;
        match self.failures.get(kind) {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}

fn records_for<'a, K, T, Q>(
    map: &'a BTreeMap<K, Vec<T>>,
    keys: impl IntoIterator<Item = &'a Q>,
) -> Vec<T>
where
    K: Ord + std::borrow::Borrow<Q>,
    Q: Ord + ?Sized + 'a,
    T: Clone,
{
    keys.into_iter()
        .filter_map(|key| map.get(key))
        .flat_map(|records| records.iter().cloned())
        .collect()
}

fn in_stage<T: Clone>(records: &[Staged<T>], stage: &WorkflowDefinitionId) -> Vec<T> {
    records
        .iter()
        .filter(|staged| &staged.stage == stage)
        .map(|staged| staged.record.clone())
        .collect()
}

impl EventAccessor for MemoryStore {
    fn find_by_ids(
        &self,
        ids: &[Uuid],
        stage: &WorkflowDefinitionId,
    ) -> Result<Vec<Event>, AccessError> {
        self.begin(kind::EVENTS, ids.len())?;
        Ok(ids
            .iter()
            .filter_map(|id| self.events.get(id))
            .flat_map(|records| in_stage(records, stage))
            .collect())
    }

    fn find_hypotheses_by_ids(
        &self,
        ids: &[EventHypothesisId],
    ) -> Result<Vec<EventHypothesis>, AccessError> {
        self.begin(kind::EVENT_HYPOTHESES, ids.len())?;
        Ok(records_for(&self.event_hypotheses, ids))
    }
}

impl SignalDetectionAccessor for MemoryStore {
    fn find_by_ids(
        &self,
        ids: &[Uuid],
        stage: &WorkflowDefinitionId,
    ) -> Result<Vec<SignalDetection>, AccessError> {
        self.begin(kind::SIGNAL_DETECTIONS, ids.len())?;
        Ok(ids
            .iter()
            .filter_map(|id| self.signal_detections.get(id))
            .flat_map(|records| in_stage(records, stage))
            .collect())
    }

    fn find_hypotheses_by_ids(
        &self,
        ids: &[SignalDetectionHypothesisId],
    ) -> Result<Vec<SignalDetectionHypothesis>, AccessError> {
        self.begin(kind::SIGNAL_DETECTION_HYPOTHESES, ids.len())?;
        Ok(records_for(&self.signal_detection_hypotheses, ids))
    }
}

impl WaveformAccessor for MemoryStore {
    fn find_by_channel_segment_descriptors(
        &self,
        descriptors: &[ChannelSegmentDescriptor],
    ) -> Result<Vec<ChannelSegment>, AccessError> {
        self.begin(kind::CHANNEL_SEGMENTS, descriptors.len())?;
        let keys: Vec<SegmentKey> = descriptors
            .iter()
            .map(ChannelSegmentDescriptor::key)
            .collect();
        Ok(records_for(&self.channel_segments, &keys))
    }

    fn find_processing_masks_by_ids(
        &self,
        ids: &[Uuid],
    ) -> Result<Vec<ProcessingMask>, AccessError> {
        self.begin(kind::PROCESSING_MASKS, ids.len())?;
        Ok(records_for(&self.processing_masks, ids))
    }
}

impl StationDefinitionAccessor for MemoryStore {
    fn find_stations_by_name_and_time(
        &self,
        names: &[String],
        time: DateTime<Utc>,
    ) -> Result<Vec<Station>, AccessError> {
        self.begin(kind::STATIONS, names.len())?;
        Ok(names
            .iter()
            .filter_map(|name| self.stations.get(name))
            .filter_map(|versions| version_at(versions, time, |s| s.effective_at))
            .collect())
    }

    fn find_channels_by_name_and_time(
        &self,
        names: &[String],
        time: DateTime<Utc>,
    ) -> Result<Vec<Channel>, AccessError> {
        self.begin(kind::CHANNELS, names.len())?;
        Ok(names
            .iter()
            .filter_map(|name| self.channels.get(name))
            .filter_map(|versions| version_at(versions, time, |c| c.effective_at))
            .collect())
    }

    fn find_responses_by_id(
        &self,
        ids: &[Uuid],
        time: DateTime<Utc>,
    ) -> Result<Vec<Response>, AccessError> {
        self.begin(kind::RESPONSES, ids.len())?;
        Ok(ids
            .iter()
            .filter_map(|id| self.responses.get(id))
            .filter_map(|versions| version_at(versions, time, |r| r.effective_at))
            .collect())
    }
}
