//! Station-definition facade: stations, channels and responses.
//!
//! Every lookup here is version scoped. An entity that already names the
//! version it refers to (`effective_at` is set) is looked up at that time;
//! otherwise the caller's effective time is used.

use super::resolve_one;
use crate::accessor::{StationDefinitionAccessor, group_by_id, results_or_empty, select_single};
use crate::definition::{FacetingDefinition, validate};
use crate::model::{Channel, ChannelData, Faceted, Response, Station, StationData, VersionScoped};
use crate::primitives::{CHANNELS_KEY, MAX_LOOKUP_BATCH, RESPONSE_KEY, STATION_KEY};
use crate::types::{ClassType, FacetError};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::slice;
use std::sync::Arc;

fn lookup_time(effective_at: Option<DateTime<Utc>>, fallback: DateTime<Utc>) -> DateTime<Utc> {
    effective_at.unwrap_or(fallback)
}

pub struct StationDefinitionFaceting {
    accessor: Arc<dyn StationDefinitionAccessor>,
}

#[derive(Default)]
pub struct StationDefinitionFacetingBuilder {
    accessor: Option<Arc<dyn StationDefinitionAccessor>>,
}

impl StationDefinitionFacetingBuilder {
    #[must_use]
    pub fn accessor(mut self, accessor: Arc<dyn StationDefinitionAccessor>) -> Self {
        self.accessor = Some(accessor);
        self
    }

    /// # Errors
    ///
    /// `MissingDependency` when no accessor was supplied.
    pub fn build(self) -> Result<StationDefinitionFaceting, FacetError> {
        let accessor = self.accessor.ok_or_else(|| {
            FacetError::MissingDependency("StationDefinitionAccessor cannot be null".to_string())
        })?;
        Ok(StationDefinitionFaceting { accessor })
    }
}

impl StationDefinitionFaceting {
    #[must_use]
    pub fn builder() -> StationDefinitionFacetingBuilder {
        StationDefinitionFacetingBuilder::default()
    }

    // =========================================================================
    // STATION
    // =========================================================================

    /// # Errors
    ///
    /// Definition validation errors.
    #[tracing::instrument(level = "debug", skip_all, fields(station = %station.name))]
    pub fn populate_station(
        &self,
        station: &Station,
        definition: &FacetingDefinition,
        effective_time: DateTime<Utc>,
    ) -> Result<Option<Station>, FacetError> {
        let definition = validate(Some(definition), ClassType::Station)?;
        if !definition.is_populated() {
            return Ok(Some(station.to_version_reference()));
        }

        let time = lookup_time(station.effective_at, effective_time);
        let resolved = resolve_one(
            station,
            ClassType::Station,
            &station.name,
            "find_stations_by_name_and_time",
            || {
                self.accessor
                    .find_stations_by_name_and_time(slice::from_ref(&station.name), time)
            },
        );
        let Some(resolved) = resolved else {
            return Ok(None);
        };
        self.facet_station(resolved, definition, effective_time)
            .map(Some)
    }

    fn facet_station(
        &self,
        station: Station,
        definition: &FacetingDefinition,
        effective_time: DateTime<Utc>,
    ) -> Result<Station, FacetError> {
        let Some(data) = station.data.clone() else {
            return Ok(station);
        };
        let Some(child) = definition.child(CHANNELS_KEY) else {
            return Ok(station);
        };

        let time = lookup_time(station.effective_at, effective_time);
        let channels = self.populate_channels(&data.channels, child, time)?;
        Ok(station.with_data(StationData { channels, ..data }))
    }

    // =========================================================================
    // CHANNEL
    // =========================================================================

    /// # Errors
    ///
    /// Definition validation errors.
    #[tracing::instrument(level = "debug", skip_all, fields(channel = %channel.name))]
    pub fn populate_channel(
        &self,
        channel: &Channel,
        definition: &FacetingDefinition,
        effective_time: DateTime<Utc>,
    ) -> Result<Option<Channel>, FacetError> {
        let definition = validate(Some(definition), ClassType::Channel)?;
        if !definition.is_populated() {
            return Ok(Some(channel.to_version_reference()));
        }

        let time = lookup_time(channel.effective_at, effective_time);
        let resolved = resolve_one(
            channel,
            ClassType::Channel,
            &channel.name,
            "find_channels_by_name_and_time",
            || {
                self.accessor
                    .find_channels_by_name_and_time(slice::from_ref(&channel.name), time)
            },
        );
        let Some(resolved) = resolved else {
            return Ok(None);
        };
        self.facet_channel(resolved, definition, effective_time)
            .map(Some)
    }

    /// Facet a channel list, fetching all references that share a lookup
    /// time in one accessor call. Unresolvable channels are dropped.
    ///
    /// # Errors
    ///
    /// Definition validation errors.
    pub fn populate_channels(
        &self,
        channels: &[Channel],
        definition: &FacetingDefinition,
        effective_time: DateTime<Utc>,
    ) -> Result<Vec<Channel>, FacetError> {
        let definition = validate(Some(definition), ClassType::Channel)?;
        if !definition.is_populated() {
            return Ok(channels.iter().map(VersionScoped::to_version_reference).collect());
        }

        let mut names_by_time: BTreeMap<DateTime<Utc>, Vec<String>> = BTreeMap::new();
        for channel in channels.iter().filter(|c| !c.is_populated()) {
            let names = names_by_time
                .entry(lookup_time(channel.effective_at, effective_time))
                .or_default();
            if !names.contains(&channel.name) {
                names.push(channel.name.clone());
            }
        }

        let mut fetched: BTreeMap<(DateTime<Utc>, String), Vec<Channel>> = BTreeMap::new();
        for (time, names) in names_by_time {
            for chunk in names.chunks(MAX_LOOKUP_BATCH) {
                let results = results_or_empty(
                    self.accessor.find_channels_by_name_and_time(chunk, time),
                    "find_channels_by_name_and_time",
                );
                let grouped = group_by_id(chunk, results, |c: &Channel| c.name.clone());
                for (name, matches) in grouped {
                    fetched.insert((time, name), matches);
                }
            }
        }

        let mut populated = Vec::with_capacity(channels.len());
        for channel in channels {
            let resolved = if channel.is_populated() {
                Some(channel.clone())
            } else {
                let key = (
                    lookup_time(channel.effective_at, effective_time),
                    channel.name.clone(),
                );
                let matches = fetched.get(&key).cloned().unwrap_or_default();
                select_single(matches, ClassType::Channel, &channel.name)
                    .filter(|c| c.is_populated())
            };
            if let Some(resolved) = resolved {
                populated.push(self.facet_channel(resolved, definition, effective_time)?);
            }
        }
        Ok(populated)
    }

    fn facet_channel(
        &self,
        channel: Channel,
        definition: &FacetingDefinition,
        effective_time: DateTime<Utc>,
    ) -> Result<Channel, FacetError> {
        let Some(data) = channel.data.clone() else {
            return Ok(channel);
        };
        let time = lookup_time(channel.effective_at, effective_time);

        let station = match definition.child(STATION_KEY) {
            Some(child) => self
                .populate_station(&data.station, child, time)?
                .unwrap_or_else(|| data.station.to_version_reference()),
            None => data.station.clone(),
        };
        let response = match (definition.child(RESPONSE_KEY), &data.response) {
            (Some(child), Some(response)) => Some(
                self.populate_response(response, child, time)?
                    .unwrap_or_else(|| response.to_version_reference()),
            ),
            _ => data.response.clone(),
        };

        Ok(channel.with_data(ChannelData {
            station,
            response,
            ..data
        }))
    }

    // =========================================================================
    // RESPONSE
    // =========================================================================

    /// # Errors
    ///
    /// Definition validation errors.
    pub fn populate_response(
        &self,
        response: &Response,
        definition: &FacetingDefinition,
        effective_time: DateTime<Utc>,
    ) -> Result<Option<Response>, FacetError> {
        let definition = validate(Some(definition), ClassType::Response)?;
        if !definition.is_populated() {
            return Ok(Some(response.to_version_reference()));
        }

        let time = lookup_time(response.effective_at, effective_time);
        Ok(resolve_one(
            response,
            ClassType::Response,
            &response.id,
            "find_responses_by_id",
            || {
                self.accessor
                    .find_responses_by_id(slice::from_ref(&response.id), time)
            },
        ))
    }
}
