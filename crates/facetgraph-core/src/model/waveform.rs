//! Waveform context: channel segments and the processing masks applied to them.

use super::station::{Channel, Units};
use super::{Faceted, VersionScoped};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Storage key of a channel segment: channel name plus the three times.
pub type SegmentKey = (String, DateTime<Utc>, DateTime<Utc>, DateTime<Utc>);

/// Identity of a channel segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelSegmentDescriptor {
    pub channel: Channel,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub creation_time: DateTime<Utc>,
}

impl ChannelSegmentDescriptor {
    #[must_use]
    pub fn new(
        channel: Channel,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        creation_time: DateTime<Utc>,
    ) -> Self {
        Self {
            channel,
            start_time,
            end_time,
            creation_time,
        }
    }

    /// Ordered lookup key; ignores how far the channel is populated.
    #[must_use]
    pub fn key(&self) -> SegmentKey {
        (
            self.channel.name.clone(),
            self.start_time,
            self.end_time,
            self.creation_time,
        )
    }

    /// The same descriptor with its channel replaced.
    #[must_use]
    pub fn with_channel(&self, channel: Channel) -> Self {
        Self {
            channel,
            ..self.clone()
        }
    }
}

impl std::fmt::Display for ChannelSegmentDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}[{}..{}]@{}",
            self.channel.name,
            self.start_time.to_rfc3339(),
            self.end_time.to_rfc3339(),
            self.creation_time.to_rfc3339()
        )
    }
}

/// A contiguous run of samples.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Waveform {
    pub start_time: DateTime<Utc>,
    pub sample_rate_hz: f64,
    pub samples: Vec<f64>,
}

impl Waveform {
    #[must_use]
    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }
}

// =============================================================================
// CHANNEL SEGMENT
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelSegment {
    pub id: ChannelSegmentDescriptor,
    pub data: Option<ChannelSegmentData>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelSegmentData {
    pub units: Units,
    pub timeseries: Vec<Waveform>,
    pub masked_by: Vec<ProcessingMask>,
}

impl ChannelSegment {
    #[must_use]
    pub fn reference(id: ChannelSegmentDescriptor) -> Self {
        Self { id, data: None }
    }

    #[must_use]
    pub fn populated(id: ChannelSegmentDescriptor, data: ChannelSegmentData) -> Self {
        Self {
            id,
            data: Some(data),
        }
    }
}

impl Faceted for ChannelSegment {
    type Data = ChannelSegmentData;

    fn data(&self) -> Option<&ChannelSegmentData> {
        self.data.as_ref()
    }

    /// The descriptor is the identity; its channel is kept as a version
    /// reference.
    fn to_entity_reference(&self) -> Self {
        Self::reference(self.id.with_channel(self.id.channel.to_version_reference()))
    }
}

// =============================================================================
// PROCESSING MASK
// =============================================================================

/// Operation a processing mask applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProcessingOperation {
    AmplitudeMeasurementBeam,
    EventBeam,
    FkSpectra,
    DisplayFilter,
    Rotation,
    SignalDetectionBeam,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingMask {
    pub id: Uuid,
    pub data: Option<ProcessingMaskData>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingMaskData {
    pub effective_at: DateTime<Utc>,
    pub applied_to_raw_channel: Channel,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub processing_operation: ProcessingOperation,
}

impl ProcessingMask {
    #[must_use]
    pub fn reference(id: Uuid) -> Self {
        Self { id, data: None }
    }

    #[must_use]
    pub fn populated(id: Uuid, data: ProcessingMaskData) -> Self {
        Self {
            id,
            data: Some(data),
        }
    }
}

impl Faceted for ProcessingMask {
    type Data = ProcessingMaskData;

    fn data(&self) -> Option<&ProcessingMaskData> {
        self.data.as_ref()
    }

    fn to_entity_reference(&self) -> Self {
        Self::reference(self.id)
    }
}
