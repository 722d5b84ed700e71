//! # redb-backed Reference Store
//!
//! A disk-backed store using the redb embedded database. Each record kind
//! has its own table from a string identity to every record stored under
//! it, encoded with [`encode_records`].
//!
//! Imports run in a single write transaction; each accessor call reads in
//! its own read transaction, so lookups never observe a half-imported
//! fixture.

use super::fixture::{Fixture, Staged};
use super::memory::kind;
use super::{RecordCounts, check_batch, decode_records, encode_records, version_at};
use crate::accessor::{
    EventAccessor, SignalDetectionAccessor, StationDefinitionAccessor, WaveformAccessor,
};
use crate::model::{
    Channel, ChannelSegment, ChannelSegmentDescriptor, Event, EventHypothesis, ProcessingMask,
    Response, SignalDetection, SignalDetectionHypothesis, Station,
};
use crate::types::{
    AccessError, EventHypothesisId, FacetError, SignalDetectionHypothesisId, WorkflowDefinitionId,
};
use chrono::{DateTime, Utc};
use redb::{Database, ReadableDatabase, ReadableTable, Table, TableDefinition, TableHandle};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt::Display;
use std::path::{Path, PathBuf};
use uuid::Uuid;

type RecordTable = TableDefinition<'static, &'static str, &'static [u8]>;

const EVENTS: RecordTable = TableDefinition::new("events");
const EVENT_HYPOTHESES: RecordTable = TableDefinition::new("event_hypotheses");
const SIGNAL_DETECTIONS: RecordTable = TableDefinition::new("signal_detections");
const SIGNAL_DETECTION_HYPOTHESES: RecordTable =
    TableDefinition::new("signal_detection_hypotheses");
const CHANNEL_SEGMENTS: RecordTable = TableDefinition::new("channel_segments");
const PROCESSING_MASKS: RecordTable = TableDefinition::new("processing_masks");
const STATIONS: RecordTable = TableDefinition::new("stations");
const CHANNELS: RecordTable = TableDefinition::new("channels");
const RESPONSES: RecordTable = TableDefinition::new("responses");

/// Table for record counts: kind -> number of records
const METADATA: TableDefinition<&str, u64> = TableDefinition::new("metadata");

const TABLES: [(&str, RecordTable); 9] = [
    (kind::EVENTS, EVENTS),
    (kind::EVENT_HYPOTHESES, EVENT_HYPOTHESES),
    (kind::SIGNAL_DETECTIONS, SIGNAL_DETECTIONS),
    (kind::SIGNAL_DETECTION_HYPOTHESES, SIGNAL_DETECTION_HYPOTHESES),
    (kind::CHANNEL_SEGMENTS, CHANNEL_SEGMENTS),
    (kind::PROCESSING_MASKS, PROCESSING_MASKS),
    (kind::STATIONS, STATIONS),
    (kind::CHANNELS, CHANNELS),
    (kind::RESPONSES, RESPONSES),
];

fn storage_error(e: impl Display) -> FacetError {
    FacetError::Storage(e.to_string())
}

fn access_error(e: impl Display) -> AccessError {
    AccessError::Storage(e.to_string())
}

/// Append one record to those stored under `key`.
fn append<T>(
    table: &mut Table<'_, &'static str, &'static [u8]>,
    key: &str,
    record: &T,
) -> Result<(), FacetError>
where
    T: Serialize + DeserializeOwned + Clone,
{
    let mut records: Vec<T> = match table.get(key).map_err(storage_error)? {
        Some(existing) => decode_records(existing.value())?,
        None => Vec::new(),
    };
    records.push(record.clone());
    let bytes = encode_records(&records)?;
    table
        .insert(key, bytes.as_slice())
        .map_err(storage_error)?;
    Ok(())
}

fn import_into<T>(
    txn: &redb::WriteTransaction,
    definition: RecordTable,
    records: &[T],
    key_of: impl Fn(&T) -> String,
) -> Result<(), FacetError>
where
    T: Serialize + DeserializeOwned + Clone,
{
    let mut table = txn.open_table(definition).map_err(storage_error)?;
    for record in records {
        append(&mut table, &key_of(record), record)?;
    }
    Ok(())
}

fn add_count(
    txn: &redb::WriteTransaction,
    kind: &str,
    added: usize,
) -> Result<(), FacetError> {
    let mut table = txn.open_table(METADATA).map_err(storage_error)?;
    let current = table
        .get(kind)
        .map_err(storage_error)?
        .map(|v| v.value())
        .unwrap_or(0);
    let added = u64::try_from(added).map_err(storage_error)?;
    table
        .insert(kind, current.saturating_add(added))
        .map_err(storage_error)?;
    Ok(())
}

/// A disk-backed reference store.
pub struct RedbStore {
    db: Database,
    path: PathBuf,
}

impl std::fmt::Debug for RedbStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbStore")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl RedbStore {
    /// Open or create a store at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, FacetError> {
        let db = Database::create(path.as_ref()).map_err(storage_error)?;

        // Initialize tables if they don't exist
        {
            let write_txn = db.begin_write().map_err(storage_error)?;
            for (_, definition) in TABLES {
                let _ = write_txn.open_table(definition).map_err(storage_error)?;
            }
            let _ = write_txn.open_table(METADATA).map_err(storage_error)?;
            write_txn.commit().map_err(storage_error)?;
        }

        tracing::debug!(path = %path.as_ref().display(), "opened redb store");
        Ok(Self {
            db,
            path: path.as_ref().to_path_buf(),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Add every record of `fixture` in one transaction; returns how many
    /// were added.
    pub fn import(&self, fixture: &Fixture) -> Result<usize, FacetError> {
        fixture.validate()?;

        let txn = self.db.begin_write().map_err(storage_error)?;
        import_into(&txn, EVENTS, &fixture.events, |s: &Staged<Event>| {
            s.record.id.to_string()
        })?;
        import_into(
            &txn,
            EVENT_HYPOTHESES,
            &fixture.event_hypotheses,
            |h: &EventHypothesis| h.id.to_string(),
        )?;
        import_into(
            &txn,
            SIGNAL_DETECTIONS,
            &fixture.signal_detections,
            |s: &Staged<SignalDetection>| s.record.id.to_string(),
        )?;
        import_into(
            &txn,
            SIGNAL_DETECTION_HYPOTHESES,
            &fixture.signal_detection_hypotheses,
            |h: &SignalDetectionHypothesis| h.id.to_string(),
        )?;
        import_into(
            &txn,
            CHANNEL_SEGMENTS,
            &fixture.channel_segments,
            |c: &ChannelSegment| c.id.to_string(),
        )?;
        import_into(
            &txn,
            PROCESSING_MASKS,
            &fixture.processing_masks,
            |m: &ProcessingMask| m.id.to_string(),
        )?;
        import_into(&txn, STATIONS, &fixture.stations, |s: &Station| {
            s.name.clone()
        })?;
        import_into(&txn, CHANNELS, &fixture.channels, |c: &Channel| {
            c.name.clone()
        })?;
        import_into(&txn, RESPONSES, &fixture.responses, |r: &Response| {
            r.id.to_string()
        })?;

        for (kind, added) in fixture.counts() {
            add_count(&txn, kind, added)?;
        }
        txn.commit().map_err(storage_error)?;

        let added = fixture.record_count();
        tracing::info!(added, path = %self.path.display(), "imported fixture into redb store");
        Ok(added)
    }

    pub fn counts(&self) -> Result<RecordCounts, FacetError> {
        let txn = self.db.begin_read().map_err(storage_error)?;
        let table = txn.open_table(METADATA).map_err(storage_error)?;
        let mut counts = RecordCounts::new();
        for (kind, _) in TABLES {
            let stored = table
                .get(kind)
                .map_err(storage_error)?
                .map(|v| v.value())
                .unwrap_or(0);
            counts.insert(kind, usize::try_from(stored).map_err(storage_error)?);
        }
        Ok(counts)
    }

    /// Records stored under each key, in key order. Keys with nothing
    /// stored, or whose stored bytes do not decode, are skipped.
    fn read<T: DeserializeOwned>(
        &self,
        definition: RecordTable,
        keys: &[String],
    ) -> Result<Vec<Vec<T>>, AccessError> {
        check_batch(keys.len())?;
        let txn = self.db.begin_read().map_err(access_error)?;
        let table = txn.open_table(definition).map_err(access_error)?;

        let mut found = Vec::with_capacity(keys.len());
        for key in keys {
            let Some(bytes) = table.get(key.as_str()).map_err(access_error)? else {
                continue;
            };
            match decode_records(bytes.value()) {
                Ok(records) => found.push(records),
                Err(e) => tracing::warn!(
                    table = definition.name(),
                    key = %key,
                    error = %e,
                    "skipping undecodable records"
                ),
            }
        }
        Ok(found)
    }

    fn read_flat<T: DeserializeOwned>(
        &self,
        definition: RecordTable,
        keys: &[String],
    ) -> Result<Vec<T>, AccessError> {
        Ok(self.read(definition, keys)?.into_iter().flatten().collect())
    }

    fn read_staged<T: DeserializeOwned>(
        &self,
        definition: RecordTable,
        ids: &[Uuid],
        stage: &WorkflowDefinitionId,
    ) -> Result<Vec<T>, AccessError> {
        let staged: Vec<Staged<T>> = self.read_flat(definition, &keys(ids))?;
        Ok(staged
            .into_iter()
            .filter(|s| &s.stage == stage)
            .map(|s| s.record)
            .collect())
    }
}

fn keys<K: ToString>(ids: &[K]) -> Vec<String> {
    ids.iter().map(ToString::to_string).collect()
}

impl EventAccessor for RedbStore {
    fn find_by_ids(
        &self,
        ids: &[Uuid],
        stage: &WorkflowDefinitionId,
    ) -> Result<Vec<Event>, AccessError> {
        self.read_staged(EVENTS, ids, stage)
    }

    fn find_hypotheses_by_ids(
        &self,
        ids: &[EventHypothesisId],
    ) -> Result<Vec<EventHypothesis>, AccessError> {
        self.read_flat(EVENT_HYPOTHESES, &keys(ids))
    }
}

impl SignalDetectionAccessor for RedbStore {
    fn find_by_ids(
        &self,
        ids: &[Uuid],
        stage: &WorkflowDefinitionId,
    ) -> Result<Vec<SignalDetection>, AccessError> {
        self.read_staged(SIGNAL_DETECTIONS, ids, stage)
    }

    fn find_hypotheses_by_ids(
        &self,
        ids: &[SignalDetectionHypothesisId],
    ) -> Result<Vec<SignalDetectionHypothesis>, AccessError> {
        self.read_flat(SIGNAL_DETECTION_HYPOTHESES, &keys(ids))
    }
}

impl WaveformAccessor for RedbStore {
    fn find_by_channel_segment_descriptors(
        &self,
        descriptors: &[ChannelSegmentDescriptor],
    ) -> Result<Vec<ChannelSegment>, AccessError> {
        self.read_flat(CHANNEL_SEGMENTS, &keys(descriptors))
    }

    fn find_processing_masks_by_ids(
        &self,
        ids: &[Uuid],
    ) -> Result<Vec<ProcessingMask>, AccessError> {
        self.read_flat(PROCESSING_MASKS, &keys(ids))
    }
}

impl StationDefinitionAccessor for RedbStore {
    fn find_stations_by_name_and_time(
        &self,
        names: &[String],
        time: DateTime<Utc>,
    ) -> Result<Vec<Station>, AccessError> {
        Ok(self
            .read::<Station>(STATIONS, names)?
            .iter()
            .filter_map(|versions| version_at(versions, time, |s| s.effective_at))
            .collect())
    }

    fn find_channels_by_name_and_time(
        &self,
        names: &[String],
        time: DateTime<Utc>,
    ) -> Result<Vec<Channel>, AccessError> {
        Ok(self
            .read::<Channel>(CHANNELS, names)?
            .iter()
            .filter_map(|versions| version_at(versions, time, |c| c.effective_at))
            .collect())
    }

    fn find_responses_by_id(
        &self,
        ids: &[Uuid],
        time: DateTime<Utc>,
    ) -> Result<Vec<Response>, AccessError> {
        Ok(self
            .read::<Response>(RESPONSES, &keys(ids))?
            .iter()
            .filter_map(|versions| version_at(versions, time, |r| r.effective_at))
            .collect())
    }
}
