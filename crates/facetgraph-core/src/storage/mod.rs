//! # Reference Storage
//!
//! Accessor implementations the engine can run against outside of a live
//! system:
//!
//! - [`MemoryStore`]: BTreeMap-backed, counts every accessor call
//! - [`RedbStore`]: redb database, postcard-encoded records
//!
//! Both load from a [`Fixture`], the JSON interchange document.
//!
//! ## Record Format
//!
//! Every redb value is a 5-byte header followed by a postcard payload:
//! - 4 bytes: Magic ("FGPH")
//! - 1 byte: Version

pub mod fixture;
pub mod memory;
pub mod redb_store;

pub use fixture::{Fixture, Staged};
pub use memory::MemoryStore;
pub use redb_store::RedbStore;

use crate::accessor::{
    EventAccessor, SignalDetectionAccessor, StationDefinitionAccessor, WaveformAccessor,
};
use crate::facet::FacetingEngine;
use crate::model::{
    Channel, ChannelSegment, ChannelSegmentDescriptor, Event, EventHypothesis, ProcessingMask,
    Response, SignalDetection, SignalDetectionHypothesis, Station,
};
use crate::primitives::{FORMAT_VERSION, MAGIC_BYTES, MAX_LOOKUP_BATCH, MAX_RECORD_SIZE};
use crate::types::{
    AccessError, EventHypothesisId, FacetError, SignalDetectionHypothesisId, WorkflowDefinitionId,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

/// Size of the record header in bytes.
const HEADER_SIZE: usize = 5;

// =============================================================================
// RECORD HEADER
// =============================================================================

/// The header that precedes every stored record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHeader {
    pub magic: [u8; 4],
    pub version: u8,
}

impl RecordHeader {
    #[must_use]
    pub fn new() -> Self {
        Self {
            magic: *MAGIC_BYTES,
            version: FORMAT_VERSION,
        }
    }

    pub fn validate(&self) -> Result<(), FacetError> {
        if &self.magic != MAGIC_BYTES {
            return Err(FacetError::Serialization("Invalid magic bytes".to_string()));
        }
        if self.version != FORMAT_VERSION {
            return Err(FacetError::Serialization(format!(
                "Unsupported version: {} (expected {})",
                self.version, FORMAT_VERSION
            )));
        }
        Ok(())
    }

    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut bytes = [0u8; HEADER_SIZE];
        bytes[0..4].copy_from_slice(&self.magic);
        bytes[4] = self.version;
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, FacetError> {
        if bytes.len() < HEADER_SIZE {
            return Err(FacetError::Serialization("Header too short".to_string()));
        }
        let mut magic = [0u8; 4];
        magic.copy_from_slice(&bytes[0..4]);
        Ok(Self {
            magic,
            version: bytes[4],
        })
    }
}

impl Default for RecordHeader {
    fn default() -> Self {
        Self::new()
    }
}

/// Encode records as header + postcard payload.
pub fn encode_records<T: Serialize>(records: &[T]) -> Result<Vec<u8>, FacetError> {
    let payload =
        postcard::to_stdvec(records).map_err(|e| FacetError::Serialization(e.to_string()))?;
    if payload.len() > MAX_RECORD_SIZE {
        return Err(FacetError::Serialization(format!(
            "record too large: {} bytes (max {})",
            payload.len(),
            MAX_RECORD_SIZE
        )));
    }

    let mut bytes = Vec::with_capacity(HEADER_SIZE + payload.len());
    bytes.extend_from_slice(&RecordHeader::new().to_bytes());
    bytes.extend_from_slice(&payload);
    Ok(bytes)
}

/// Decode records written by [`encode_records`].
///
/// The header and size limit are checked before the payload is parsed.
pub fn decode_records<T: DeserializeOwned>(bytes: &[u8]) -> Result<Vec<T>, FacetError> {
    RecordHeader::from_bytes(bytes)?.validate()?;
    let payload = &bytes[HEADER_SIZE..];
    if payload.len() > MAX_RECORD_SIZE {
        return Err(FacetError::Serialization(format!(
            "record too large: {} bytes (max {})",
            payload.len(),
            MAX_RECORD_SIZE
        )));
    }
    postcard::from_bytes(payload).map_err(|e| FacetError::Serialization(e.to_string()))
}

// =============================================================================
// SHARED LOOKUP RULES
// =============================================================================

/// Reject batches larger than the store is willing to answer in one call.
pub(crate) fn check_batch(len: usize) -> Result<(), AccessError> {
    if len > MAX_LOOKUP_BATCH {
        return Err(AccessError::BatchTooLarge(len));
    }
    Ok(())
}

/// The version in effect at `time`: the latest one that started at or
/// before it.
pub(crate) fn version_at<T: Clone>(
    versions: &[T],
    time: DateTime<Utc>,
    effective_at: impl Fn(&T) -> Option<DateTime<Utc>>,
) -> Option<T> {
    versions
        .iter()
        .filter_map(|version| effective_at(version).map(|at| (at, version)))
        .filter(|(at, _)| *at <= time)
        .max_by_key(|(at, _)| *at)
        .map(|(_, version)| version.clone())
}

/// Record counts per kind, keyed by the fixture field name.
pub type RecordCounts = BTreeMap<&'static str, usize>;

// =============================================================================
// BACKEND SELECTION
// =============================================================================

/// The store a repository reads from.
#[derive(Debug)]
pub enum StorageBackend {
    /// BTreeMap-backed store (fast, volatile).
    InMemory(MemoryStore),
    /// redb-backed store (ACID, persistent).
    Persistent(RedbStore),
}

impl Default for StorageBackend {
    fn default() -> Self {
        Self::InMemory(MemoryStore::new())
    }
}

impl StorageBackend {
    #[must_use]
    pub fn is_persistent(&self) -> bool {
        matches!(self, Self::Persistent(_))
    }

    /// Load every record of `fixture`.
    pub fn import(&mut self, fixture: &Fixture) -> Result<usize, FacetError> {
        match self {
            Self::InMemory(store) => store.import(fixture),
            Self::Persistent(store) => store.import(fixture),
        }
    }

    pub fn counts(&self) -> Result<RecordCounts, FacetError> {
        match self {
            Self::InMemory(store) => Ok(store.counts()),
            Self::Persistent(store) => store.counts(),
        }
    }
}

impl EventAccessor for StorageBackend {
    fn find_by_ids(
        &self,
        ids: &[Uuid],
        stage: &WorkflowDefinitionId,
    ) -> Result<Vec<Event>, AccessError> {
        match self {
            Self::InMemory(store) => EventAccessor::find_by_ids(store, ids, stage),
            Self::Persistent(store) => EventAccessor::find_by_ids(store, ids, stage),
        }
    }

    fn find_hypotheses_by_ids(
        &self,
        ids: &[EventHypothesisId],
    ) -> Result<Vec<EventHypothesis>, AccessError> {
        match self {
            Self::InMemory(store) => EventAccessor::find_hypotheses_by_ids(store, ids),
            Self::Persistent(store) => EventAccessor::find_hypotheses_by_ids(store, ids),
        }
    }
}

impl SignalDetectionAccessor for StorageBackend {
    fn find_by_ids(
        &self,
        ids: &[Uuid],
        stage: &WorkflowDefinitionId,
    ) -> Result<Vec<SignalDetection>, AccessError> {
        match self {
            Self::InMemory(store) => SignalDetectionAccessor::find_by_ids(store, ids, stage),
            Self::Persistent(store) => SignalDetectionAccessor::find_by_ids(store, ids, stage),
        }
    }

    fn find_hypotheses_by_ids(
        &self,
        ids: &[SignalDetectionHypothesisId],
    ) -> Result<Vec<SignalDetectionHypothesis>, AccessError> {
        match self {
            Self::InMemory(store) => SignalDetectionAccessor::find_hypotheses_by_ids(store, ids),
            Self::Persistent(store) => {
                SignalDetectionAccessor::find_hypotheses_by_ids(store, ids)
            }
        }
    }
}

impl WaveformAccessor for StorageBackend {
    fn find_by_channel_segment_descriptors(
        &self,
        descriptors: &[ChannelSegmentDescriptor],
    ) -> Result<Vec<ChannelSegment>, AccessError> {
        match self {
            Self::InMemory(store) => store.find_by_channel_segment_descriptors(descriptors),
            Self::Persistent(store) => store.find_by_channel_segment_descriptors(descriptors),
        }
    }

    fn find_processing_masks_by_ids(
        &self,
        ids: &[Uuid],
    ) -> Result<Vec<ProcessingMask>, AccessError> {
        match self {
            Self::InMemory(store) => store.find_processing_masks_by_ids(ids),
            Self::Persistent(store) => store.find_processing_masks_by_ids(ids),
        }
    }
}

impl StationDefinitionAccessor for StorageBackend {
    fn find_stations_by_name_and_time(
        &self,
        names: &[String],
        time: DateTime<Utc>,
    ) -> Result<Vec<Station>, AccessError> {
        match self {
            Self::InMemory(store) => store.find_stations_by_name_and_time(names, time),
            Self::Persistent(store) => store.find_stations_by_name_and_time(names, time),
        }
    }

    fn find_channels_by_name_and_time(
        &self,
        names: &[String],
        time: DateTime<Utc>,
    ) -> Result<Vec<Channel>, AccessError> {
        match self {
            Self::InMemory(store) => store.find_channels_by_name_and_time(names, time),
            Self::Persistent(store) => store.find_channels_by_name_and_time(names, time),
        }
    }

    fn find_responses_by_id(
        &self,
        ids: &[Uuid],
        time: DateTime<Utc>,
    ) -> Result<Vec<Response>, AccessError> {
        match self {
            Self::InMemory(store) => store.find_responses_by_id(ids, time),
            Self::Persistent(store) => store.find_responses_by_id(ids, time),
        }
    }
}

// =============================================================================
// REPOSITORY
// =============================================================================

/// A shared handle on one backend, serving all four contexts.
#[derive(Debug, Clone)]
pub struct Repository {
    backend: Arc<StorageBackend>,
}

impl Repository {
    #[must_use]
    pub fn new(backend: StorageBackend) -> Self {
        Self {
            backend: Arc::new(backend),
        }
    }

    #[must_use]
    pub fn backend(&self) -> &StorageBackend {
        &self.backend
    }

    /// An engine whose accessors all read from this repository.
    pub fn engine(&self) -> Result<FacetingEngine, FacetError> {
        FacetingEngine::from_store(Arc::clone(&self.backend))
    }

    pub fn counts(&self) -> Result<RecordCounts, FacetError> {
        self.backend.counts()
    }
}
