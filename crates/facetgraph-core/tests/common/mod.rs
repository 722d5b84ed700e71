//! Entity builders shared by the integration tests.

#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use facetgraph_core::model::{
    Channel, ChannelData, ChannelSegment, ChannelSegmentData, ChannelSegmentDescriptor, Event,
    EventData, EventHypothesis, EventHypothesisData, EventLocation, FeatureMeasurement,
    LocationSolution, LocationSolutionData, MeasurementValue, PreferredEventHypothesis,
    ProcessingMask, ProcessingMaskData, ProcessingOperation, Response, ResponseData,
    SignalDetection, SignalDetectionData, SignalDetectionHypothesis,
    SignalDetectionHypothesisData, Station, StationData, StationType, Units,
};
use facetgraph_core::{EventHypothesisId, SignalDetectionHypothesisId, WorkflowDefinitionId};
use uuid::Uuid;

pub const STATION: &str = "ASAR";
pub const CHANNEL: &str = "ASAR.AS01.SHZ";
pub const EVENT_ID: u128 = 1_000;

pub fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).single().expect("valid timestamp")
}

pub fn stage() -> WorkflowDefinitionId {
    WorkflowDefinitionId::new("AL1")
}

// =============================================================================
// STATION DEFINITION
// =============================================================================

pub fn station(effective: i64, channels: Vec<Channel>) -> Station {
    Station::populated(
        STATION,
        at(effective),
        StationData {
            description: format!("{STATION} as of {effective}"),
            station_type: StationType::SeismicArray,
            channels,
        },
    )
}

pub fn channel(effective: i64) -> Channel {
    Channel::populated(
        CHANNEL,
        at(effective),
        ChannelData {
            station: Station::version_reference(STATION, at(effective)),
            units: Units::NanometersPerSecond,
            nominal_sample_rate_hz: 40.0,
            response: None,
        },
    )
}

pub fn response(id: u128, effective: i64) -> Response {
    Response::populated(
        Uuid::from_u128(id),
        at(effective),
        ResponseData {
            calibration_factor: 1.5,
            calibration_period_sec: 1.0,
        },
    )
}

// =============================================================================
// WAVEFORM
// =============================================================================

pub fn descriptor(start: i64) -> ChannelSegmentDescriptor {
    ChannelSegmentDescriptor::new(
        Channel::version_reference(CHANNEL, at(0)),
        at(start),
        at(start + 60),
        at(start + 120),
    )
}

pub fn mask(id: u128) -> ProcessingMask {
    ProcessingMask::populated(
        Uuid::from_u128(id),
        ProcessingMaskData {
            effective_at: at(0),
            applied_to_raw_channel: Channel::version_reference(CHANNEL, at(0)),
            start_time: at(0),
            end_time: at(30),
            processing_operation: ProcessingOperation::EventBeam,
        },
    )
}

pub fn segment(start: i64, masks: &[u128]) -> ChannelSegment {
    ChannelSegment::populated(
        descriptor(start),
        ChannelSegmentData {
            units: Units::Counts,
            timeseries: Vec::new(),
            masked_by: masks
                .iter()
                .map(|id| ProcessingMask::reference(Uuid::from_u128(*id)))
                .collect(),
        },
    )
}

// =============================================================================
// SIGNAL DETECTION
// =============================================================================

pub fn sdh_id(detection: u128, hypothesis: u128) -> SignalDetectionHypothesisId {
    SignalDetectionHypothesisId::new(Uuid::from_u128(detection), Uuid::from_u128(hypothesis))
}

pub fn arrival(time: i64) -> FeatureMeasurement {
    FeatureMeasurement {
        channel: Channel::version_reference(CHANNEL, at(0)),
        measured_channel_segment: Some(ChannelSegment::reference(descriptor(time))),
        analysis_waveform: None,
        measurement: MeasurementValue::ArrivalTime {
            arrival_time: at(time),
            standard_deviation_sec: Some(0.25),
        },
        snr: Some(12.5),
    }
}

pub fn hypothesis(
    id: SignalDetectionHypothesisId,
    parent: Option<SignalDetectionHypothesisId>,
    arrival_at: i64,
) -> SignalDetectionHypothesis {
    SignalDetectionHypothesis::populated(
        id,
        SignalDetectionHypothesisData::new(
            "CTBTO",
            Station::version_reference(STATION, at(0)),
            false,
            parent.map(SignalDetectionHypothesis::reference),
            vec![arrival(arrival_at)],
        )
        .expect("valid hypothesis"),
    )
}

pub fn rejected_hypothesis(id: SignalDetectionHypothesisId) -> SignalDetectionHypothesis {
    SignalDetectionHypothesis::populated(
        id,
        SignalDetectionHypothesisData::new(
            "CTBTO",
            Station::reference(STATION),
            true,
            None,
            vec![arrival(0)],
        )
        .expect("valid hypothesis"),
    )
}

pub fn detection(id: u128, hypotheses: &[SignalDetectionHypothesisId]) -> SignalDetection {
    SignalDetection::populated(
        Uuid::from_u128(id),
        SignalDetectionData {
            monitoring_organization: "CTBTO".to_string(),
            station: Station::reference(STATION),
            signal_detection_hypotheses: hypotheses
                .iter()
                .map(|id| SignalDetectionHypothesis::reference(*id))
                .collect(),
        },
    )
}

// =============================================================================
// EVENT
// =============================================================================

pub fn eh_id(hypothesis: u128) -> EventHypothesisId {
    EventHypothesisId::new(Uuid::from_u128(EVENT_ID), Uuid::from_u128(hypothesis))
}

pub fn location_solution(id: u128) -> LocationSolution {
    LocationSolution::populated(
        Uuid::from_u128(id),
        LocationSolutionData {
            location: EventLocation {
                latitude_degrees: -23.665,
                longitude_degrees: 133.905,
                depth_km: 10.0,
                time: at(100),
            },
            location_behaviors: Vec::new(),
            feature_predictions: Vec::new(),
            network_magnitude_solutions: Vec::new(),
        },
    )
}

/// A non-rejected hypothesis; the first solution is the preferred one.
pub fn event_hypothesis(
    id: EventHypothesisId,
    parents: &[EventHypothesisId],
    associations: &[SignalDetectionHypothesisId],
    solutions: &[u128],
) -> EventHypothesis {
    let location_solutions: Vec<LocationSolution> =
        solutions.iter().map(|id| location_solution(*id)).collect();
    EventHypothesis::populated(
        id,
        EventHypothesisData::new(
            false,
            false,
            parents.iter().map(|p| EventHypothesis::reference(*p)).collect(),
            associations
                .iter()
                .map(|a| SignalDetectionHypothesis::reference(*a))
                .collect(),
            location_solutions.first().cloned(),
            location_solutions,
        )
        .expect("valid event hypothesis"),
    )
}

/// An event whose hypotheses are all references; the last one is the
/// overall preferred hypothesis and the first the stage's preferred one.
pub fn event(hypotheses: &[EventHypothesisId], rejected_detections: &[u128]) -> Event {
    let references: Vec<EventHypothesis> = hypotheses
        .iter()
        .map(|id| EventHypothesis::reference(*id))
        .collect();
    Event::populated(
        Uuid::from_u128(EVENT_ID),
        EventData {
            monitoring_organization: "CTBTO".to_string(),
            rejected_signal_detection_associations: rejected_detections
                .iter()
                .map(|id| SignalDetection::reference(Uuid::from_u128(*id)))
                .collect(),
            event_hypotheses: references.clone(),
            preferred_event_hypothesis_by_stage: references
                .first()
                .map(|preferred| PreferredEventHypothesis {
                    stage: stage(),
                    preferred_by: "analyst".to_string(),
                    preferred: preferred.clone(),
                })
                .into_iter()
                .collect(),
            overall_preferred: references.last().cloned(),
            final_event_hypothesis_history: references,
        },
    )
}
