//! # Accessors
//!
//! The owning stores of each bounded context, seen from the faceting engine.
//! Resolvers consult an accessor only when a reference must be upgraded to
//! populated data.
//!
//! Every accessor returns `Result<Vec<T>, AccessError>`. The engine applies a
//! single result-count policy on top:
//!
//! | results | outcome |
//! |---------|---------|
//! | error   | logged at `warn`, treated as 0 |
//! | 0       | unresolvable (`None`) |
//! | 1       | the fetched instance |
//! | >1      | unresolvable, logged at `warn` |

use crate::model::{
    Channel, ChannelSegment, ChannelSegmentDescriptor, Event, EventHypothesis, ProcessingMask,
    Response, SignalDetection, SignalDetectionHypothesis, Station,
};
use crate::types::{
    AccessError, ClassType, EventHypothesisId, SignalDetectionHypothesisId, WorkflowDefinitionId,
};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Display;
use uuid::Uuid;

// =============================================================================
// ACCESSOR TRAITS
// =============================================================================

/// Owning store of the event context.
pub trait EventAccessor: Send + Sync {
    /// Events with the given ids as they stand in `stage`.
    fn find_by_ids(
        &self,
        ids: &[Uuid],
        stage: &WorkflowDefinitionId,
    ) -> Result<Vec<Event>, AccessError>;

    /// Event hypotheses with the given ids. A rejected event yields two
    /// hypotheses for one id: the rejected marker and the hypothesis it
    /// rejected.
    fn find_hypotheses_by_ids(
        &self,
        ids: &[EventHypothesisId],
    ) -> Result<Vec<EventHypothesis>, AccessError>;
}

/// Owning store of the signal-detection context.
pub trait SignalDetectionAccessor: Send + Sync {
    fn find_by_ids(
        &self,
        ids: &[Uuid],
        stage: &WorkflowDefinitionId,
    ) -> Result<Vec<SignalDetection>, AccessError>;

    fn find_hypotheses_by_ids(
        &self,
        ids: &[SignalDetectionHypothesisId],
    ) -> Result<Vec<SignalDetectionHypothesis>, AccessError>;
}

/// Owning store of the waveform context.
pub trait WaveformAccessor: Send + Sync {
    fn find_by_channel_segment_descriptors(
        &self,
        descriptors: &[ChannelSegmentDescriptor],
    ) -> Result<Vec<ChannelSegment>, AccessError>;

    fn find_processing_masks_by_ids(
        &self,
        ids: &[Uuid],
    ) -> Result<Vec<ProcessingMask>, AccessError>;
}

/// Owning store of the station-definition context.
///
/// Lookups are version scoped: each returns the version effective at `time`.
pub trait StationDefinitionAccessor: Send + Sync {
    fn find_stations_by_name_and_time(
        &self,
        names: &[String],
        time: DateTime<Utc>,
    ) -> Result<Vec<Station>, AccessError>;

    fn find_channels_by_name_and_time(
        &self,
        names: &[String],
        time: DateTime<Utc>,
    ) -> Result<Vec<Channel>, AccessError>;

    fn find_responses_by_id(
        &self,
        ids: &[Uuid],
        time: DateTime<Utc>,
    ) -> Result<Vec<Response>, AccessError>;
}

// =============================================================================
// RESULT-COUNT POLICY
// =============================================================================

/// Log an accessor failure and convert it to an empty result set.
///
/// Timeouts, bridging failures and storage errors are data-availability
/// gaps from the engine's point of view, not fatal errors.
pub fn results_or_empty<T>(result: Result<Vec<T>, AccessError>, context: &str) -> Vec<T> {
    match result {
        Ok(results) => results,
        Err(e) => {
            tracing::warn!(context, error = %e, "accessor lookup failed, treating as no results");
            Vec::new()
        }
    }
}

/// Apply the 0/1/N policy to the results fetched for one id.
pub fn select_single<T>(results: Vec<T>, what: ClassType, id: &dyn Display) -> Option<T> {
    let count = results.len();
    match count {
        0 => {
            tracing::debug!(class_type = %what, id = %id, "no instance found");
            None
        }
        1 => results.into_iter().next(),
        _ => {
            tracing::warn!(
                class_type = %what,
                id = %id,
                count,
                "ambiguous lookup returned multiple instances, treating as unresolved"
            );
            None
        }
    }
}

/// Distinct ids in first-seen order.
pub fn distinct<K: Ord + Clone>(ids: &[K]) -> Vec<K> {
    let mut seen = BTreeSet::new();
    ids.iter()
        .filter(|id| seen.insert((*id).clone()))
        .cloned()
        .collect()
}

/// Group the results of one batched lookup by the id they answer.
///
/// Every requested id gets an entry, so that ids with no results still flow
/// through [`select_single`] and resolve to `None`.
pub fn group_by_id<K, T>(
    ids: &[K],
    results: Vec<T>,
    key_of: impl Fn(&T) -> K,
) -> BTreeMap<K, Vec<T>>
where
    K: Ord + Clone,
{
    let mut grouped: BTreeMap<K, Vec<T>> =
        ids.iter().map(|id| (id.clone(), Vec::new())).collect();
    for result in results {
        if let Some(bucket) = grouped.get_mut(&key_of(&result)) {
            bucket.push(result);
        }
    }
    grouped
}
