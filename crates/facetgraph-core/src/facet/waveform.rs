//! Waveform facade: channel segments and processing masks.

use super::{StationDefinitionFaceting, resolve_batch, resolve_one};
use crate::accessor::WaveformAccessor;
use crate::defaults::processing_mask_definition;
use crate::definition::{FacetingDefinition, validate};
use crate::model::{
    ChannelSegment, ChannelSegmentData, Faceted, ProcessingMask, ProcessingMaskData,
    VersionScoped,
};
use crate::primitives::{APPLIED_TO_RAW_CHANNEL_KEY, ID_CHANNEL_KEY, MASKED_BY_KEY};
use crate::types::{ClassType, FacetError};
use std::slice;
use std::sync::Arc;

pub struct WaveformFaceting {
    accessor: Arc<dyn WaveformAccessor>,
    station: Arc<StationDefinitionFaceting>,
}

#[derive(Default)]
pub struct WaveformFacetingBuilder {
    accessor: Option<Arc<dyn WaveformAccessor>>,
    station: Option<Arc<StationDefinitionFaceting>>,
}

impl WaveformFacetingBuilder {
    #[must_use]
    pub fn accessor(mut self, accessor: Arc<dyn WaveformAccessor>) -> Self {
        self.accessor = Some(accessor);
        self
    }

    #[must_use]
    pub fn station_definition_faceting(mut self, station: Arc<StationDefinitionFaceting>) -> Self {
        self.station = Some(station);
        self
    }

    /// # Errors
    ///
    /// `MissingDependency` naming the first collaborator not supplied.
    pub fn build(self) -> Result<WaveformFaceting, FacetError> {
        let accessor = self.accessor.ok_or_else(|| {
            FacetError::MissingDependency("WaveformAccessor cannot be null".to_string())
        })?;
        let station = self.station.ok_or_else(|| {
            FacetError::MissingDependency("StationDefinitionFaceting cannot be null".to_string())
        })?;
        Ok(WaveformFaceting { accessor, station })
    }
}

impl WaveformFaceting {
    #[must_use]
    pub fn builder() -> WaveformFacetingBuilder {
        WaveformFacetingBuilder::default()
    }

    /// Facet a channel segment.
    ///
    /// Without a `maskedBy` entry the masks are faceted with
    /// [`processing_mask_definition`].
    ///
    /// # Errors
    ///
    /// Definition validation errors.
    #[tracing::instrument(level = "debug", skip_all, fields(segment = %segment.id))]
    pub fn populate_channel_segment(
        &self,
        segment: &ChannelSegment,
        definition: &FacetingDefinition,
    ) -> Result<Option<ChannelSegment>, FacetError> {
        let definition = validate(Some(definition), ClassType::ChannelSegment)?;
        if !definition.is_populated() {
            return Ok(Some(segment.to_entity_reference()));
        }

        let resolved = resolve_one(
            segment,
            ClassType::ChannelSegment,
            &segment.id,
            "find_by_channel_segment_descriptors",
            || {
                self.accessor
                    .find_by_channel_segment_descriptors(slice::from_ref(&segment.id))
            },
        );
        let Some(resolved) = resolved else {
            return Ok(None);
        };
        let Some(data) = resolved.data.clone() else {
            return Ok(Some(resolved));
        };

        let id = match definition.child(ID_CHANNEL_KEY) {
            Some(child) => {
                let channel = &resolved.id.channel;
                let faceted = self
                    .station
                    .populate_channel(channel, child, resolved.id.creation_time)?
                    .unwrap_or_else(|| channel.to_version_reference());
                resolved.id.with_channel(faceted)
            }
            None => resolved.id.clone(),
        };

        let default_masks = processing_mask_definition();
        let mask_definition = definition.child(MASKED_BY_KEY).unwrap_or(&default_masks);
        let masked_by = self.populate_processing_masks(&data.masked_by, mask_definition)?;

        Ok(Some(ChannelSegment::populated(
            id,
            ChannelSegmentData { masked_by, ..data },
        )))
    }

    /// # Errors
    ///
    /// Definition validation errors.
    pub fn populate_processing_mask(
        &self,
        mask: &ProcessingMask,
        definition: &FacetingDefinition,
    ) -> Result<Option<ProcessingMask>, FacetError> {
        let definition = validate(Some(definition), ClassType::ProcessingMask)?;
        if !definition.is_populated() {
            return Ok(Some(mask.to_entity_reference()));
        }

        let resolved = resolve_one(
            mask,
            ClassType::ProcessingMask,
            &mask.id,
            "find_processing_masks_by_ids",
            || {
                self.accessor
                    .find_processing_masks_by_ids(slice::from_ref(&mask.id))
            },
        );
        match resolved {
            Some(resolved) => self.facet_processing_mask(resolved, definition).map(Some),
            None => Ok(None),
        }
    }

    /// Facet a mask list with one accessor call for all references.
    /// Unresolvable masks are dropped.
    ///
    /// # Errors
    ///
    /// Definition validation errors.
    pub fn populate_processing_masks(
        &self,
        masks: &[ProcessingMask],
        definition: &FacetingDefinition,
    ) -> Result<Vec<ProcessingMask>, FacetError> {
        let definition = validate(Some(definition), ClassType::ProcessingMask)?;
        if !definition.is_populated() {
            return Ok(masks.iter().map(Faceted::to_entity_reference).collect());
        }

        resolve_batch(
            masks,
            ClassType::ProcessingMask,
            "find_processing_masks_by_ids",
            |mask| mask.id,
            |ids| self.accessor.find_processing_masks_by_ids(ids),
        )
        .into_iter()
        .flatten()
        .map(|mask| self.facet_processing_mask(mask, definition))
        .collect()
    }

    fn facet_processing_mask(
        &self,
        mask: ProcessingMask,
        definition: &FacetingDefinition,
    ) -> Result<ProcessingMask, FacetError> {
        let (Some(data), Some(child)) = (mask.data.clone(), definition.child(APPLIED_TO_RAW_CHANNEL_KEY))
        else {
            return Ok(mask);
        };

        let channel = &data.applied_to_raw_channel;
        let applied_to_raw_channel = self
            .station
            .populate_channel(channel, child, data.effective_at)?
            .unwrap_or_else(|| channel.to_version_reference());
        Ok(ProcessingMask::populated(
            mask.id,
            ProcessingMaskData {
                applied_to_raw_channel,
                ..data
            },
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accessor::StationDefinitionAccessor;
    use crate::model::{
        Channel, ChannelData, ChannelSegmentDescriptor, ProcessingOperation, Response, Station,
        Units, Waveform,
    };
    use crate::types::AccessError;
    use chrono::{DateTime, TimeZone, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use uuid::Uuid;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).single().expect("valid timestamp")
    }

    struct NoStations;

    impl StationDefinitionAccessor for NoStations {
        fn find_stations_by_name_and_time(
            &self,
            _names: &[String],
            _time: DateTime<Utc>,
        ) -> Result<Vec<Station>, AccessError> {
            Ok(Vec::new())
        }

        fn find_channels_by_name_and_time(
            &self,
            names: &[String],
            time: DateTime<Utc>,
        ) -> Result<Vec<Channel>, AccessError> {
            Ok(names
                .iter()
                .map(|name| {
                    Channel::populated(
                        name.clone(),
                        time,
                        ChannelData {
                            station: Station::reference("ASAR"),
                            units: Units::Counts,
                            nominal_sample_rate_hz: 20.0,
                            response: None,
                        },
                    )
                })
                .collect())
        }

        fn find_responses_by_id(
            &self,
            _ids: &[Uuid],
            _time: DateTime<Utc>,
        ) -> Result<Vec<Response>, AccessError> {
            Ok(Vec::new())
        }
    }

    #[derive(Default)]
    struct Segments {
        stored: Vec<ChannelSegment>,
        masks: Vec<ProcessingMask>,
        segment_calls: AtomicUsize,
        mask_calls: AtomicUsize,
    }

    impl WaveformAccessor for Segments {
        fn find_by_channel_segment_descriptors(
            &self,
            descriptors: &[ChannelSegmentDescriptor],
        ) -> Result<Vec<ChannelSegment>, AccessError> {
            self.segment_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self
                .stored
                .iter()
                .filter(|s| descriptors.iter().any(|d| d.key() == s.id.key()))
                .cloned()
                .collect())
        }

        fn find_processing_masks_by_ids(
            &self,
            ids: &[Uuid],
        ) -> Result<Vec<ProcessingMask>, AccessError> {
            self.mask_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self
                .masks
                .iter()
                .filter(|m| ids.contains(&m.id))
                .cloned()
                .collect())
        }
    }

    fn descriptor() -> ChannelSegmentDescriptor {
        ChannelSegmentDescriptor::new(
            Channel::version_reference("ASAR.AS01.SHZ", at(0)),
            at(10),
            at(20),
            at(30),
        )
    }

    fn mask(n: u128) -> ProcessingMask {
        ProcessingMask::populated(
            Uuid::from_u128(n),
            ProcessingMaskData {
                effective_at: at(5),
                applied_to_raw_channel: Channel::version_reference("ASAR.AS01.SHZ", at(0)),
                start_time: at(10),
                end_time: at(12),
                processing_operation: ProcessingOperation::EventBeam,
            },
        )
    }

    fn stored_segment() -> ChannelSegment {
        ChannelSegment::populated(
            descriptor(),
            ChannelSegmentData {
                units: Units::Counts,
                timeseries: vec![Waveform {
                    start_time: at(10),
                    sample_rate_hz: 20.0,
                    samples: vec![1.0, 2.0, 3.0],
                }],
                masked_by: vec![
                    ProcessingMask::reference(Uuid::from_u128(1)),
                    ProcessingMask::reference(Uuid::from_u128(2)),
                ],
            },
        )
    }

    fn faceting(accessor: Arc<Segments>) -> WaveformFaceting {
        let station = StationDefinitionFaceting::builder()
            .accessor(Arc::new(NoStations))
            .build()
            .expect("accessor supplied");
        WaveformFaceting::builder()
            .accessor(accessor)
            .station_definition_faceting(Arc::new(station))
            .build()
            .expect("collaborators supplied")
    }

    #[test]
    fn builder_names_missing_collaborator() {
        let result = WaveformFaceting::builder()
            .accessor(Arc::new(Segments::default()))
            .build();
        assert!(matches!(
            result,
            Err(FacetError::MissingDependency(message))
                if message == "StationDefinitionFaceting cannot be null"
        ));
    }

    #[test]
    fn reference_is_fetched_and_masks_default_to_populated() {
        let accessor = Arc::new(Segments {
            stored: vec![stored_segment()],
            masks: vec![mask(1)],
            ..Segments::default()
        });
        let faceting = faceting(Arc::clone(&accessor));

        let result = faceting
            .populate_channel_segment(
                &ChannelSegment::reference(descriptor()),
                &FacetingDefinition::populated(ClassType::ChannelSegment),
            )
            .expect("valid definition")
            .expect("resolvable");

        let data = result.data.expect("populated");
        assert_eq!(data.masked_by, vec![mask(1)]);
        assert_eq!(accessor.segment_calls.load(Ordering::SeqCst), 1);
        assert_eq!(accessor.mask_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn id_channel_child_populates_descriptor_channel() {
        let accessor = Arc::new(Segments::default());
        let faceting = faceting(Arc::clone(&accessor));
        let definition = FacetingDefinition::populated_with(
            ClassType::ChannelSegment,
            [
                (ID_CHANNEL_KEY, FacetingDefinition::populated(ClassType::Channel)),
                (
                    MASKED_BY_KEY,
                    FacetingDefinition::unpopulated(ClassType::ProcessingMask),
                ),
            ],
        );

        let result = faceting
            .populate_channel_segment(&stored_segment(), &definition)
            .expect("valid definition")
            .expect("resolvable");

        assert!(result.id.channel.is_populated());
        assert_eq!(accessor.segment_calls.load(Ordering::SeqCst), 0);
        assert_eq!(accessor.mask_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn unpopulated_definition_strips_segment() {
        let faceting = faceting(Arc::new(Segments::default()));
        let result = faceting
            .populate_channel_segment(
                &stored_segment(),
                &FacetingDefinition::unpopulated(ClassType::ChannelSegment),
            )
            .expect("valid definition")
            .expect("reference");
        assert!(!result.is_populated());
        assert_eq!(result.id.key(), descriptor().key());
    }

    #[test]
    fn missing_segment_is_unresolvable() {
        let faceting = faceting(Arc::new(Segments::default()));
        let result = faceting
            .populate_channel_segment(
                &ChannelSegment::reference(descriptor()),
                &FacetingDefinition::populated(ClassType::ChannelSegment),
            )
            .expect("valid definition");
        assert_eq!(result, None);
    }

    #[test]
    fn applied_to_raw_channel_is_populated_at_mask_time() {
        let faceting = faceting(Arc::new(Segments::default()));
        let definition = FacetingDefinition::populated_with(
            ClassType::ProcessingMask,
            [(
                APPLIED_TO_RAW_CHANNEL_KEY,
                FacetingDefinition::populated(ClassType::Channel),
            )],
        );
        let result = faceting
            .populate_processing_mask(&mask(7), &definition)
            .expect("valid definition")
            .expect("resolvable");
        let channel = result.data.expect("populated").applied_to_raw_channel;
        assert!(channel.is_populated());
        assert_eq!(channel.effective_at, Some(at(0)));
    }
}
