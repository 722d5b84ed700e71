//! Station-definition context: stations, channels and responses.
//!
//! All three types are version scoped: an instance is identified by its
//! name (or id) and the time the version became effective.

use super::{Faceted, VersionScoped};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of installation a station represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StationType {
    SeismicArray,
    Seismic3Component,
    Seismic1Component,
    Hydroacoustic,
    Infrasound,
    Unknown,
}

/// Physical units of a channel or measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Units {
    Counts,
    Nanometers,
    NanometersPerSecond,
    Pascals,
    Seconds,
    Degrees,
    Unitless,
}

// =============================================================================
// STATION
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Station {
    pub name: String,
    pub effective_at: Option<DateTime<Utc>>,
    pub data: Option<StationData>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StationData {
    pub description: String,
    pub station_type: StationType,
    pub channels: Vec<Channel>,
}

impl Station {
    /// An entity reference: name only.
    #[must_use]
    pub fn reference(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            effective_at: None,
            data: None,
        }
    }

    /// A version reference: name and effective time.
    #[must_use]
    pub fn version_reference(name: impl Into<String>, effective_at: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            effective_at: Some(effective_at),
            data: None,
        }
    }

    #[must_use]
    pub fn populated(name: impl Into<String>, effective_at: DateTime<Utc>, data: StationData) -> Self {
        Self {
            name: name.into(),
            effective_at: Some(effective_at),
            data: Some(data),
        }
    }

    #[must_use]
    pub fn with_data(&self, data: StationData) -> Self {
        Self {
            data: Some(data),
            ..self.to_version_reference()
        }
    }
}

impl Faceted for Station {
    type Data = StationData;

    fn data(&self) -> Option<&StationData> {
        self.data.as_ref()
    }

    fn to_entity_reference(&self) -> Self {
        Self::reference(self.name.clone())
    }
}

impl VersionScoped for Station {
    fn effective_at(&self) -> Option<DateTime<Utc>> {
        self.effective_at
    }

    fn to_version_reference(&self) -> Self {
        Self {
            name: self.name.clone(),
            effective_at: self.effective_at,
            data: None,
        }
    }
}

// =============================================================================
// CHANNEL
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Channel {
    pub name: String,
    pub effective_at: Option<DateTime<Utc>>,
    pub data: Option<ChannelData>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelData {
    pub station: Station,
    pub units: Units,
    pub nominal_sample_rate_hz: f64,
    pub response: Option<Response>,
}

impl Channel {
    #[must_use]
    pub fn reference(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            effective_at: None,
            data: None,
        }
    }

    #[must_use]
    pub fn version_reference(name: impl Into<String>, effective_at: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            effective_at: Some(effective_at),
            data: None,
        }
    }

    #[must_use]
    pub fn populated(name: impl Into<String>, effective_at: DateTime<Utc>, data: ChannelData) -> Self {
        Self {
            name: name.into(),
            effective_at: Some(effective_at),
            data: Some(data),
        }
    }

    #[must_use]
    pub fn with_data(&self, data: ChannelData) -> Self {
        Self {
            data: Some(data),
            ..self.to_version_reference()
        }
    }
}

impl Faceted for Channel {
    type Data = ChannelData;

    fn data(&self) -> Option<&ChannelData> {
        self.data.as_ref()
    }

    fn to_entity_reference(&self) -> Self {
        Self::reference(self.name.clone())
    }
}

impl VersionScoped for Channel {
    fn effective_at(&self) -> Option<DateTime<Utc>> {
        self.effective_at
    }

    fn to_version_reference(&self) -> Self {
        Self {
            name: self.name.clone(),
            effective_at: self.effective_at,
            data: None,
        }
    }
}

// =============================================================================
// RESPONSE
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    pub id: Uuid,
    pub effective_at: Option<DateTime<Utc>>,
    pub data: Option<ResponseData>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseData {
    pub calibration_factor: f64,
    pub calibration_period_sec: f64,
}

impl Response {
    #[must_use]
    pub fn reference(id: Uuid) -> Self {
        Self {
            id,
            effective_at: None,
            data: None,
        }
    }

    #[must_use]
    pub fn populated(id: Uuid, effective_at: DateTime<Utc>, data: ResponseData) -> Self {
        Self {
            id,
            effective_at: Some(effective_at),
            data: Some(data),
        }
    }
}

impl Faceted for Response {
    type Data = ResponseData;

    fn data(&self) -> Option<&ResponseData> {
        self.data.as_ref()
    }

    fn to_entity_reference(&self) -> Self {
        Self::reference(self.id)
    }
}

impl VersionScoped for Response {
    fn effective_at(&self) -> Option<DateTime<Utc>> {
        self.effective_at
    }

    fn to_version_reference(&self) -> Self {
        Self {
            id: self.id,
            effective_at: self.effective_at,
            data: None,
        }
    }
}
