//! JSON interchange document loaded into the reference stores.
//!
//! A fixture lists populated records per kind. Events and signal detections
//! are stage scoped and carry the stage they were produced in; station
//! definitions carry the time their version became effective.

use super::RecordCounts;
use crate::model::{
    Channel, ChannelSegment, Event, EventHypothesis, Faceted, ProcessingMask, Response,
    SignalDetection, SignalDetectionHypothesis, Station, VersionScoped,
};
use crate::types::{FacetError, WorkflowDefinitionId};
use serde::{Deserialize, Serialize};

/// A record as it stands in one stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Staged<T> {
    pub stage: WorkflowDefinitionId,
    pub record: T,
}

impl<T> Staged<T> {
    #[must_use]
    pub fn new(stage: WorkflowDefinitionId, record: T) -> Self {
        Self { stage, record }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Fixture {
    pub events: Vec<Staged<Event>>,
    pub event_hypotheses: Vec<EventHypothesis>,
    pub signal_detections: Vec<Staged<SignalDetection>>,
    pub signal_detection_hypotheses: Vec<SignalDetectionHypothesis>,
    pub channel_segments: Vec<ChannelSegment>,
    pub processing_masks: Vec<ProcessingMask>,
    pub stations: Vec<Station>,
    pub channels: Vec<Channel>,
    pub responses: Vec<Response>,
}

fn check_populated<'a, T: Faceted + 'a>(
    records: impl IntoIterator<Item = &'a T>,
    kind: &str,
    id_of: impl Fn(&T) -> String,
) -> Result<(), FacetError> {
    match records.into_iter().find(|record| !record.is_populated()) {
        Some(record) => Err(FacetError::InvalidEntity(format!(
            "{kind} {} is stored without data",
            id_of(record)
        ))),
        None => Ok(()),
    }
}

fn check_versioned<T: VersionScoped>(
    records: &[T],
    kind: &str,
    id_of: impl Fn(&T) -> String,
) -> Result<(), FacetError> {
    check_populated(records, kind, &id_of)?;
    match records.iter().find(|record| record.effective_at().is_none()) {
        Some(record) => Err(FacetError::InvalidEntity(format!(
            "{kind} {} is stored without an effective time",
            id_of(record)
        ))),
        None => Ok(()),
    }
}

impl Fixture {
    /// Parse and validate a fixture document.
    ///
    /// # Errors
    ///
    /// `Serialization` for malformed JSON, `InvalidEntity` for records that
    /// fail [`Fixture::validate`].
    pub fn from_json(json: &str) -> Result<Self, FacetError> {
        let fixture: Self =
            serde_json::from_str(json).map_err(|e| FacetError::Serialization(e.to_string()))?;
        fixture.validate()?;
        Ok(fixture)
    }

    pub fn to_json(&self) -> Result<String, FacetError> {
        serde_json::to_string_pretty(self).map_err(|e| FacetError::Serialization(e.to_string()))
    }

    /// Stores hold populated records only; station definitions also need
    /// the time their version took effect.
    pub fn validate(&self) -> Result<(), FacetError> {
        check_populated(
            self.events.iter().map(|s| &s.record),
            "Event",
            |e: &Event| e.id.to_string(),
        )?;
        check_populated(
            &self.event_hypotheses,
            "EventHypothesis",
            |h: &EventHypothesis| h.id.to_string(),
        )?;

        check_populated(
            self.signal_detections.iter().map(|s| &s.record),
            "SignalDetection",
            |d: &SignalDetection| d.id.to_string(),
        )?;
        check_populated(
            &self.signal_detection_hypotheses,
            "SignalDetectionHypothesis",
            |h: &SignalDetectionHypothesis| h.id.to_string(),
        )?;

        check_populated(
            &self.channel_segments,
            "ChannelSegment",
            |c: &ChannelSegment| c.id.to_string(),
        )?;
        check_populated(
            &self.processing_masks,
            "ProcessingMask",
            |m: &ProcessingMask| m.id.to_string(),
        )?;

        check_versioned(&self.stations, "Station", |s: &Station| s.name.clone())?;
        check_versioned(&self.channels, "Channel", |c: &Channel| c.name.clone())?;
        check_versioned(&self.responses, "Response", |r: &Response| r.id.to_string())
    }

    #[must_use]
    pub fn record_count(&self) -> usize {
        self.counts().values().sum()
    }

    #[must_use]
    pub fn counts(&self) -> RecordCounts {
        RecordCounts::from([
            ("events", self.events.len()),
            ("eventHypotheses", self.event_hypotheses.len()),
            ("signalDetections", self.signal_detections.len()),
            (
                "signalDetectionHypotheses",
                self.signal_detection_hypotheses.len(),
            ),
            ("channelSegments", self.channel_segments.len()),
            ("processingMasks", self.processing_masks.len()),
            ("stations", self.stations.len()),
            ("channels", self.channels.len()),
            ("responses", self.responses.len()),
        ])
    }
}
