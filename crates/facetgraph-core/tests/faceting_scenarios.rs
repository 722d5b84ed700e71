//! # Faceting Scenarios
//!
//! End-to-end behavior of the engine over the in-memory reference store.
//!
//! ## Groups
//! - F0: Fetch policy (0/1/N, failures, stripping)
//! - F1: Generational chains
//! - F2: Event context
//! - F3: Signal detection context
//! - F4: Waveform context
//! - F5: Engine dispatch

mod common;

use common::*;
use facetgraph_core::defaults;
use facetgraph_core::model::{
    ChannelSegment, Event, EventHypothesis, Faceted, SignalDetection, SignalDetectionHypothesis,
    Station,
};
use facetgraph_core::primitives::{
    CHANNEL_SEGMENT_KEY, EVENT_HYPOTHESIS_KEY, LOCATION_SOLUTION_KEY, MAX_LOOKUP_BATCH,
    MEASURED_CHANNEL_SEGMENT_KEY, PARENT_SDH_KEY, PREFERRED_LOCATION_SOLUTION_KEY,
    REJECTED_SD_KEY, SD_HYPOTHESES_KEY, STATION_KEY,
};
use facetgraph_core::storage::memory::kind;
use facetgraph_core::{
    AccessError, Aggregate, ClassType, FacetContext, FacetError, FacetingDefinition,
    FacetingEngine, Fixture, MemoryStore, Staged,
};
use std::sync::Arc;
use uuid::Uuid;

fn engine_for(store: MemoryStore) -> (Arc<MemoryStore>, FacetingEngine) {
    let store = Arc::new(store);
    let engine = FacetingEngine::from_store(Arc::clone(&store)).expect("engine");
    (store, engine)
}

fn engine_over(fixture: &Fixture) -> (Arc<MemoryStore>, FacetingEngine) {
    engine_for(MemoryStore::from_fixture(fixture).expect("valid fixture"))
}

/// A hypothesis definition following `levels` generations of parents.
fn parent_chain(levels: usize) -> FacetingDefinition {
    if levels <= 1 {
        return FacetingDefinition::populated(ClassType::SignalDetectionHypothesis);
    }
    FacetingDefinition::populated_with(
        ClassType::SignalDetectionHypothesis,
        [(PARENT_SDH_KEY, parent_chain(levels - 1))],
    )
}

// =============================================================================
// F0: FETCH POLICY
// =============================================================================

mod f0_fetch_policy {
    use super::*;

    fn single_hypothesis_fixture() -> Fixture {
        Fixture {
            signal_detection_hypotheses: vec![hypothesis(sdh_id(1, 1), None, 150)],
            ..Fixture::default()
        }
    }

    /// F0.1: A reference resolves to the stored record with one call.
    #[test]
    fn reference_resolves_to_stored_record() {
        let fixture = single_hypothesis_fixture();
        let (store, engine) = engine_over(&fixture);

        let result = engine
            .signal_detection_faceting()
            .populate_hypothesis(
                &SignalDetectionHypothesis::reference(sdh_id(1, 1)),
                &FacetingDefinition::populated(ClassType::SignalDetectionHypothesis),
            )
            .expect("valid definition");

        assert_eq!(result, Some(fixture.signal_detection_hypotheses[0].clone()));
        assert_eq!(store.call_count(kind::SIGNAL_DETECTION_HYPOTHESES), 1);
        assert_eq!(store.total_calls(), 1);
    }

    /// F0.2: Zero, one and two matches give None, Some and None.
    #[test]
    fn only_a_single_match_resolves() {
        let fixture = Fixture {
            signal_detection_hypotheses: vec![
                hypothesis(sdh_id(1, 1), None, 150),
                hypothesis(sdh_id(2, 1), None, 150),
                hypothesis(sdh_id(2, 1), None, 151),
            ],
            ..Fixture::default()
        };
        let (_store, engine) = engine_over(&fixture);
        let definition = FacetingDefinition::populated(ClassType::SignalDetectionHypothesis);
        let facade = engine.signal_detection_faceting();

        let missing = facade
            .populate_hypothesis(&SignalDetectionHypothesis::reference(sdh_id(9, 9)), &definition)
            .expect("valid definition");
        let single = facade
            .populate_hypothesis(&SignalDetectionHypothesis::reference(sdh_id(1, 1)), &definition)
            .expect("valid definition");
        let ambiguous = facade
            .populate_hypothesis(&SignalDetectionHypothesis::reference(sdh_id(2, 1)), &definition)
            .expect("valid definition");

        assert!(missing.is_none());
        assert!(single.is_some_and(|h| h.is_populated()));
        assert!(ambiguous.is_none());
    }

    /// F0.3: An accessor failure counts as "not found".
    #[test]
    fn accessor_failure_is_unresolvable() {
        let store = MemoryStore::from_fixture(&single_hypothesis_fixture())
            .expect("valid fixture")
            .failing(
                kind::SIGNAL_DETECTION_HYPOTHESES,
                AccessError::Timeout("upstream".to_string()),
            );
        let (store, engine) = engine_for(store);

        let result = engine
            .signal_detection_faceting()
            .populate_hypothesis(
                &SignalDetectionHypothesis::reference(sdh_id(1, 1)),
                &FacetingDefinition::populated(ClassType::SignalDetectionHypothesis),
            );

        assert_eq!(result, Ok(None));
        assert_eq!(store.call_count(kind::SIGNAL_DETECTION_HYPOTHESES), 1);
    }

    /// F0.4: An unpopulated definition strips without touching the store.
    #[test]
    fn unpopulated_definition_strips_without_calls() {
        let fixture = single_hypothesis_fixture();
        let (store, engine) = engine_over(&fixture);
        let populated = fixture.signal_detection_hypotheses[0].clone();

        let result = engine
            .signal_detection_faceting()
            .populate_hypothesis(
                &populated,
                &FacetingDefinition::unpopulated(ClassType::SignalDetectionHypothesis),
            )
            .expect("valid definition");

        assert_eq!(result, Some(SignalDetectionHypothesis::reference(sdh_id(1, 1))));
        assert_eq!(store.total_calls(), 0);
    }

    /// F0.5: Populated input is used as-is and not fetched again.
    #[test]
    fn populated_input_is_not_refetched() {
        let (store, engine) = engine_over(&Fixture::default());
        let populated = hypothesis(sdh_id(1, 1), None, 150);

        let result = engine
            .signal_detection_faceting()
            .populate_hypothesis(
                &populated,
                &FacetingDefinition::populated(ClassType::SignalDetectionHypothesis),
            )
            .expect("valid definition");

        assert_eq!(result, Some(populated));
        assert_eq!(store.total_calls(), 0);
    }
}

// =============================================================================
// F1: GENERATIONAL CHAINS
// =============================================================================

mod f1_generational_chains {
    use super::*;

    /// g1 -> g2 -> g3 -> g4, each the parent of the one before.
    fn chain_fixture() -> Fixture {
        Fixture {
            signal_detection_hypotheses: vec![
                hypothesis(sdh_id(1, 1), Some(sdh_id(1, 2)), 150),
                hypothesis(sdh_id(1, 2), Some(sdh_id(1, 3)), 150),
                hypothesis(sdh_id(1, 3), Some(sdh_id(1, 4)), 150),
                hypothesis(sdh_id(1, 4), None, 150),
            ],
            ..Fixture::default()
        }
    }

    /// F1.1: Three nested levels populate exactly three generations.
    #[test]
    fn chain_depth_follows_definition() {
        let (store, engine) = engine_over(&chain_fixture());

        let result = engine
            .signal_detection_faceting()
            .populate_hypothesis(&SignalDetectionHypothesis::reference(sdh_id(1, 1)), &parent_chain(3))
            .expect("valid definition")
            .expect("resolvable");

        assert_eq!(result.populated_depth(), 3);
        assert_eq!(store.call_count(kind::SIGNAL_DETECTION_HYPOTHESES), 3);

        let third = result
            .data
            .as_ref()
            .and_then(|d| d.parent_signal_detection_hypothesis())
            .and_then(|p| p.data.as_ref())
            .and_then(|d| d.parent_signal_detection_hypothesis())
            .expect("third generation");
        let fourth = third
            .data
            .as_ref()
            .and_then(|d| d.parent_signal_detection_hypothesis())
            .expect("fourth generation");
        assert_eq!(fourth, &SignalDetectionHypothesis::reference(sdh_id(1, 4)));
    }

    /// F1.2: Two levels stop after the first parent.
    #[test]
    fn shallower_definition_stops_earlier() {
        let (store, engine) = engine_over(&chain_fixture());

        let result = engine
            .signal_detection_faceting()
            .populate_hypothesis(&SignalDetectionHypothesis::reference(sdh_id(1, 1)), &parent_chain(2))
            .expect("valid definition")
            .expect("resolvable");

        assert_eq!(result.populated_depth(), 2);
        assert_eq!(store.call_count(kind::SIGNAL_DETECTION_HYPOTHESES), 2);
    }

    /// F1.3: An unpopulated parent entry strips the parent.
    #[test]
    fn unpopulated_parent_is_stripped() {
        let fixture = chain_fixture();
        let (store, engine) = engine_over(&fixture);
        let definition = FacetingDefinition::populated_with(
            ClassType::SignalDetectionHypothesis,
            [(
                PARENT_SDH_KEY,
                FacetingDefinition::unpopulated(ClassType::SignalDetectionHypothesis),
            )],
        );

        let result = engine
            .signal_detection_faceting()
            .populate_hypothesis(&fixture.signal_detection_hypotheses[0], &definition)
            .expect("valid definition")
            .expect("resolvable");

        assert_eq!(result.populated_depth(), 1);
        assert_eq!(store.total_calls(), 0);
    }

    /// F1.4: A missing ancestor leaves a reference in its place.
    #[test]
    fn missing_parent_becomes_reference() {
        let fixture = Fixture {
            signal_detection_hypotheses: vec![hypothesis(sdh_id(1, 1), Some(sdh_id(1, 2)), 150)],
            ..Fixture::default()
        };
        let (_store, engine) = engine_over(&fixture);

        let result = engine
            .signal_detection_faceting()
            .populate_hypothesis(&SignalDetectionHypothesis::reference(sdh_id(1, 1)), &parent_chain(3))
            .expect("valid definition")
            .expect("resolvable");

        assert_eq!(result.populated_depth(), 1);
        let parent = result
            .data
            .as_ref()
            .and_then(|d| d.parent_signal_detection_hypothesis())
            .expect("parent kept");
        assert_eq!(parent, &SignalDetectionHypothesis::reference(sdh_id(1, 2)));
    }
}

// =============================================================================
// F2: EVENT CONTEXT
// =============================================================================

mod f2_event_context {
    use super::*;

    fn event_id() -> Uuid {
        Uuid::from_u128(EVENT_ID)
    }

    /// Two hypotheses, the second refining the first, each with one
    /// associated detection hypothesis and one location solution.
    fn event_fixture() -> Fixture {
        Fixture {
            events: vec![Staged::new(
                stage(),
                event(&[eh_id(1), eh_id(2)], &[7]),
            )],
            event_hypotheses: vec![
                event_hypothesis(eh_id(1), &[], &[sdh_id(1, 1)], &[10]),
                event_hypothesis(eh_id(2), &[eh_id(1)], &[sdh_id(2, 1)], &[20]),
            ],
            signal_detections: vec![Staged::new(stage(), detection(7, &[sdh_id(7, 1)]))],
            signal_detection_hypotheses: vec![
                hypothesis(sdh_id(1, 1), None, 150),
                hypothesis(sdh_id(2, 1), None, 160),
                hypothesis(sdh_id(7, 1), None, 170),
            ],
            ..Fixture::default()
        }
    }

    fn as_event(result: Option<Aggregate>) -> Option<Event> {
        match result {
            Some(Aggregate::Event(event)) => Some(event),
            _ => None,
        }
    }

    /// F2.1: The default definition populates one level down.
    #[test]
    fn default_definition_populates_one_level() {
        let (store, engine) = engine_over(&event_fixture());
        let context = FacetContext::new().with_stage(stage());

        let result = engine
            .populate(
                &Aggregate::Event(Event::reference(event_id())),
                &defaults::event_definition(),
                &context,
            )
            .expect("valid definition");
        let event = as_event(result).expect("event resolved");
        let data = event.data.as_ref().expect("populated");

        assert_eq!(store.call_count(kind::EVENTS), 1);
        assert_eq!(store.call_count(kind::EVENT_HYPOTHESES), 1);
        assert_eq!(store.call_count(kind::SIGNAL_DETECTION_HYPOTHESES), 2);
        assert_eq!(store.call_count(kind::SIGNAL_DETECTIONS), 0);
        assert_eq!(store.call_count(kind::STATIONS), 0);
        assert_eq!(store.call_count(kind::CHANNELS), 0);
        assert_eq!(store.call_count(kind::CHANNEL_SEGMENTS), 0);

        let hypotheses = &data.event_hypotheses;
        assert_eq!(hypotheses.len(), 2);
        assert!(hypotheses.iter().all(Faceted::is_populated));
        for hypothesis in hypotheses {
            let associations = hypothesis
                .data
                .as_ref()
                .map(|d| d.associated_signal_detection_hypotheses())
                .unwrap_or_default();
            assert_eq!(associations.len(), 1);
            assert!(associations[0].is_populated());
        }

        assert_eq!(data.overall_preferred.as_ref(), Some(&hypotheses[1]));
        assert_eq!(&data.final_event_hypothesis_history, hypotheses);
        assert_eq!(data.preferred_event_hypothesis_by_stage[0].preferred, hypotheses[0]);
        assert!(
            data.rejected_signal_detection_associations
                .iter()
                .all(|d| !d.is_populated())
        );
    }

    /// F2.2: Rejected detections and location solutions stay references.
    #[test]
    fn unpopulated_children_stay_references() {
        let (store, engine) = engine_over(&event_fixture());
        let definition = FacetingDefinition::populated_with(
            ClassType::Event,
            [
                (
                    REJECTED_SD_KEY,
                    FacetingDefinition::unpopulated(ClassType::SignalDetection),
                ),
                (
                    EVENT_HYPOTHESIS_KEY,
                    FacetingDefinition::populated_with(
                        ClassType::EventHypothesis,
                        [
                            (
                                LOCATION_SOLUTION_KEY,
                                FacetingDefinition::unpopulated(ClassType::LocationSolution),
                            ),
                            (
                                PREFERRED_LOCATION_SOLUTION_KEY,
                                FacetingDefinition::unpopulated(ClassType::LocationSolution),
                            ),
                        ],
                    ),
                ),
            ],
        );

        let event = engine
            .event_faceting()
            .populate_event(&Event::reference(event_id()), &stage(), &definition)
            .expect("valid definition")
            .expect("event resolved");
        let data = event.data.as_ref().expect("populated");

        assert_eq!(
            data.rejected_signal_detection_associations,
            vec![SignalDetection::reference(Uuid::from_u128(7))]
        );
        assert_eq!(store.call_count(kind::SIGNAL_DETECTIONS), 0);

        for hypothesis in &data.event_hypotheses {
            let hypothesis_data = hypothesis.data.as_ref().expect("populated hypothesis");
            assert!(!hypothesis_data.location_solutions().is_empty());
            assert!(
                hypothesis_data
                    .location_solutions()
                    .iter()
                    .all(|s| !s.is_populated())
            );
            assert!(
                hypothesis_data
                    .preferred_location_solution()
                    .is_some_and(|s| !s.is_populated())
            );
            // associations were not named and are left as stored
            assert!(
                hypothesis_data
                    .associated_signal_detection_hypotheses()
                    .iter()
                    .all(|h| !h.is_populated())
            );
        }
    }

    /// F2.3: A rejected pair expands in a collection but is ambiguous alone.
    #[test]
    fn rejected_pair_expands_in_collection() {
        let fixture = Fixture {
            event_hypotheses: vec![
                event_hypothesis(eh_id(3), &[], &[], &[]),
                EventHypothesis::rejected(event_id(), Uuid::from_u128(3), Uuid::from_u128(2)),
            ],
            ..Fixture::default()
        };
        let (store, engine) = engine_over(&fixture);
        let definition = FacetingDefinition::populated(ClassType::EventHypothesis);
        let facade = engine.event_faceting();

        let expanded = facade
            .populate_event_hypotheses(&[EventHypothesis::reference(eh_id(3))], &definition)
            .expect("valid definition");
        assert_eq!(expanded.len(), 2);
        assert_eq!(store.call_count(kind::EVENT_HYPOTHESES), 1);

        let single = facade
            .populate_event_hypothesis(&EventHypothesis::reference(eh_id(3)), &definition)
            .expect("valid definition");
        assert!(single.is_none());
    }

    /// F2.4: A rejected hypothesis keeps its empty associations.
    #[test]
    fn rejected_hypothesis_is_not_expanded() {
        let rejected =
            EventHypothesis::rejected(event_id(), Uuid::from_u128(4), Uuid::from_u128(1));
        let fixture = Fixture {
            event_hypotheses: vec![rejected.clone()],
            ..Fixture::default()
        };
        let (store, engine) = engine_over(&fixture);

        let result = engine
            .event_faceting()
            .populate_event_hypothesis(
                &EventHypothesis::reference(eh_id(4)),
                &defaults::event_hypothesis_definition(),
            )
            .expect("valid definition")
            .expect("resolvable");

        let data = result.data.as_ref().expect("populated");
        assert!(data.is_rejected());
        assert!(data.associated_signal_detection_hypotheses().is_empty());
        assert_eq!(data.parent_event_hypotheses().len(), 1);
        assert_eq!(store.call_count(kind::SIGNAL_DETECTION_HYPOTHESES), 0);
    }

    /// F2.5: The pass-through marker returns hypotheses as stored.
    #[test]
    fn default_faceted_hypothesis_passes_through() {
        let fixture = event_fixture();
        let (store, engine) = engine_over(&fixture);

        let result = engine
            .event_faceting()
            .populate_event_hypothesis(
                &EventHypothesis::reference(eh_id(1)),
                &defaults::default_faceted_event_hypothesis_definition(),
            )
            .expect("valid definition");

        assert_eq!(result, Some(fixture.event_hypotheses[0].clone()));
        assert_eq!(store.call_count(kind::SIGNAL_DETECTION_HYPOTHESES), 0);
    }

    /// F2.6: Events are scoped to the stage they were stored in.
    #[test]
    fn other_stage_does_not_resolve() {
        let (_store, engine) = engine_over(&event_fixture());

        let result = engine
            .event_faceting()
            .populate_event(
                &Event::reference(event_id()),
                &facetgraph_core::WorkflowDefinitionId::new("AL2"),
                &defaults::event_definition(),
            )
            .expect("valid definition");

        assert!(result.is_none());
    }
}

// =============================================================================
// F3: SIGNAL DETECTION CONTEXT
// =============================================================================

mod f3_signal_detection_context {
    use super::*;

    fn detection_fixture() -> Fixture {
        Fixture {
            signal_detections: vec![
                Staged::new(stage(), detection(5, &[sdh_id(5, 1)])),
                Staged::new(stage(), detection(6, &[sdh_id(6, 1)])),
            ],
            signal_detection_hypotheses: vec![hypothesis(sdh_id(5, 1), None, 150)],
            stations: vec![station(0, Vec::new()), station(100, Vec::new())],
            ..Fixture::default()
        }
    }

    fn with_station() -> FacetingDefinition {
        FacetingDefinition::populated_with(
            ClassType::SignalDetection,
            [
                (
                    SD_HYPOTHESES_KEY,
                    FacetingDefinition::populated(ClassType::SignalDetectionHypothesis),
                ),
                (STATION_KEY, FacetingDefinition::populated(ClassType::Station)),
            ],
        )
    }

    /// F3.1: The station is looked up at the arrival time.
    #[test]
    fn station_version_follows_arrival_time() {
        let (store, engine) = engine_over(&detection_fixture());

        let detection = engine
            .signal_detection_faceting()
            .populate_signal_detection(
                &SignalDetection::reference(Uuid::from_u128(5)),
                &with_station(),
                &stage(),
            )
            .expect("valid definition")
            .expect("resolvable");

        let station = &detection.data.as_ref().expect("populated").station;
        assert!(station.is_populated());
        assert_eq!(station.effective_at, Some(at(100)));
        assert_eq!(store.call_count(kind::STATIONS), 1);
    }

    /// F3.2: A detection from another stage is unresolvable.
    #[test]
    fn other_stage_does_not_resolve() {
        let (_store, engine) = engine_over(&detection_fixture());

        let result = engine
            .signal_detection_faceting()
            .populate_signal_detection(
                &SignalDetection::reference(Uuid::from_u128(5)),
                &with_station(),
                &facetgraph_core::WorkflowDefinitionId::new("AL2"),
            )
            .expect("valid definition");

        assert!(result.is_none());
    }

    /// F3.3: A detection none of whose hypotheses resolve is dropped.
    #[test]
    fn detection_without_hypotheses_is_unresolvable() {
        let (_store, engine) = engine_over(&detection_fixture());

        let result = engine
            .signal_detection_faceting()
            .populate_signal_detection(
                &SignalDetection::reference(Uuid::from_u128(6)),
                &with_station(),
                &stage(),
            )
            .expect("valid definition");

        assert!(result.is_none());
    }

    /// F3.4: A list is fetched in one call and missing entries are dropped.
    #[test]
    fn batch_drops_missing_entries() {
        let (store, engine) = engine_over(&detection_fixture());

        let result = engine
            .signal_detection_faceting()
            .populate_signal_detections(
                &[
                    SignalDetection::reference(Uuid::from_u128(5)),
                    SignalDetection::reference(Uuid::from_u128(99)),
                    SignalDetection::reference(Uuid::from_u128(5)),
                ],
                &FacetingDefinition::populated(ClassType::SignalDetection),
                &stage(),
            )
            .expect("valid definition");

        assert_eq!(result.len(), 2);
        assert!(result.iter().all(|d| d.id == Uuid::from_u128(5)));
        assert_eq!(store.call_count(kind::SIGNAL_DETECTIONS), 1);
    }

    /// F3.5: An unpopulated station entry keeps the station's own version.
    #[test]
    fn stripped_station_keeps_its_version() {
        let (store, engine) = engine_over(&detection_fixture());
        let mut populated = detection(5, &[sdh_id(5, 1)]);
        if let Some(data) = populated.data.as_mut() {
            data.station = station(100, Vec::new());
        }
        let definition = FacetingDefinition::populated_with(
            ClassType::SignalDetection,
            [(STATION_KEY, FacetingDefinition::unpopulated(ClassType::Station))],
        );

        let result = engine
            .signal_detection_faceting()
            .populate_signal_detection(&populated, &definition, &stage())
            .expect("valid definition")
            .expect("resolvable");

        assert_eq!(
            result.data.expect("populated").station,
            Station::version_reference(STATION, at(100))
        );
        assert_eq!(store.total_calls(), 0);
    }

    /// F3.6: Lists longer than one lookup allows are fetched in chunks and
    /// match faceting each entry on its own.
    #[test]
    fn oversized_batch_matches_single_lookups() {
        let count = u128::try_from(MAX_LOOKUP_BATCH + 1).expect("small");
        let fixture = Fixture {
            signal_detection_hypotheses: (0..count)
                .map(|detection| hypothesis(sdh_id(detection, 1), None, 150))
                .collect(),
            ..Fixture::default()
        };
        let (store, engine) = engine_over(&fixture);
        let facade = engine.signal_detection_faceting();
        let definition = FacetingDefinition::populated(ClassType::SignalDetectionHypothesis);
        let references: Vec<SignalDetectionHypothesis> = (0..count)
            .map(|detection| SignalDetectionHypothesis::reference(sdh_id(detection, 1)))
            .collect();

        let batched = facade
            .populate_hypotheses(&references, &definition)
            .expect("valid definition");
        assert_eq!(store.call_count(kind::SIGNAL_DETECTION_HYPOTHESES), 2);

        let individually: Vec<SignalDetectionHypothesis> = references
            .iter()
            .filter_map(|reference| {
                facade
                    .populate_hypothesis(reference, &definition)
                    .expect("valid definition")
            })
            .collect();

        assert_eq!(batched.len(), references.len());
        assert_eq!(batched, individually);
    }
}

// =============================================================================
// F4: WAVEFORM CONTEXT
// =============================================================================

mod f4_waveform_context {
    use super::*;

    fn waveform_fixture() -> Fixture {
        Fixture {
            channel_segments: vec![segment(0, &[1, 2])],
            processing_masks: vec![mask(1), mask(2)],
            ..Fixture::default()
        }
    }

    /// F4.1: Masks are populated by default, in one call.
    #[test]
    fn masks_default_to_populated() {
        let (store, engine) = engine_over(&waveform_fixture());

        let segment = engine
            .waveform_faceting()
            .populate_channel_segment(
                &ChannelSegment::reference(descriptor(0)),
                &FacetingDefinition::populated(ClassType::ChannelSegment),
            )
            .expect("valid definition")
            .expect("resolvable");

        let masks = &segment.data.as_ref().expect("populated").masked_by;
        assert_eq!(masks.len(), 2);
        assert!(masks.iter().all(Faceted::is_populated));
        assert_eq!(store.call_count(kind::CHANNEL_SEGMENTS), 1);
        assert_eq!(store.call_count(kind::PROCESSING_MASKS), 1);
        assert_eq!(store.call_count(kind::CHANNELS), 0);
    }

    /// F4.2: A measured segment populates, or falls back to a reference.
    #[test]
    fn measured_segment_populates_or_falls_back() {
        let (_store, engine) = engine_over(&waveform_fixture());
        let definition = FacetingDefinition::populated_with(
            ClassType::FeatureMeasurement,
            [(
                MEASURED_CHANNEL_SEGMENT_KEY,
                FacetingDefinition::populated(ClassType::ChannelSegment),
            )],
        );
        let facade = engine.signal_detection_faceting();

        let found = facade
            .populate_feature_measurement(&arrival(0), &definition, at(0))
            .expect("valid definition");
        assert!(
            found
                .measured_channel_segment
                .as_ref()
                .is_some_and(Faceted::is_populated)
        );

        let missing = facade
            .populate_feature_measurement(&arrival(500), &definition, at(500))
            .expect("valid definition");
        assert_eq!(
            missing.measured_channel_segment,
            Some(ChannelSegment::reference(descriptor(500)))
        );
    }

    /// F4.3: A measurement cannot be stripped.
    #[test]
    fn unpopulated_measurement_definition_is_rejected() {
        let (_store, engine) = engine_over(&Fixture::default());

        let result = engine.signal_detection_faceting().populate_feature_measurement(
            &arrival(0),
            &FacetingDefinition::unpopulated(ClassType::FeatureMeasurement),
            at(0),
        );

        assert_eq!(
            result,
            Err(FacetError::ParentNotPopulated(ClassType::FeatureMeasurement))
        );
    }

    /// F4.4: Segment children other than the documented keys are ignored.
    #[test]
    fn unknown_child_keys_are_ignored() {
        let (_store, engine) = engine_over(&waveform_fixture());
        let definition = FacetingDefinition::populated_with(
            ClassType::ChannelSegment,
            [(
                CHANNEL_SEGMENT_KEY,
                FacetingDefinition::populated(ClassType::ChannelSegment),
            )],
        );

        let segment = engine
            .waveform_faceting()
            .populate_channel_segment(&ChannelSegment::reference(descriptor(0)), &definition)
            .expect("valid definition");

        assert!(segment.is_some_and(|s| s.is_populated()));
    }
}

// =============================================================================
// F5: ENGINE DISPATCH
// =============================================================================

mod f5_engine_dispatch {
    use super::*;

    /// F5.1: Stage-scoped aggregates need a stage.
    #[test]
    fn event_requires_stage() {
        let (_store, engine) = engine_over(&Fixture::default());

        let result = engine.populate(
            &Aggregate::Event(Event::reference(Uuid::from_u128(EVENT_ID))),
            &defaults::event_definition(),
            &FacetContext::new(),
        );

        assert_eq!(
            result,
            Err(FacetError::MissingArgument("StageId cannot be null".to_string()))
        );
    }

    /// F5.2: Station definitions need an effective time.
    #[test]
    fn station_requires_effective_time() {
        let (_store, engine) = engine_over(&Fixture::default());

        let result = engine.populate(
            &Aggregate::Station(Station::reference(STATION)),
            &FacetingDefinition::populated(ClassType::Station),
            &FacetContext::new().with_stage(stage()),
        );

        assert_eq!(
            result,
            Err(FacetError::MissingArgument(
                "EffectiveTime cannot be null".to_string()
            ))
        );
    }

    /// F5.3: Value objects cannot head a request.
    #[test]
    fn value_object_is_not_an_aggregate() {
        let (_store, engine) = engine_over(&Fixture::default());

        let result = engine.populate(
            &Aggregate::SignalDetectionHypothesis(SignalDetectionHypothesis::reference(sdh_id(
                1, 1,
            ))),
            &FacetingDefinition::populated(ClassType::FeatureMeasurement),
            &FacetContext::new(),
        );

        assert_eq!(
            result,
            Err(FacetError::UnsupportedAggregate(ClassType::FeatureMeasurement))
        );
    }

    /// F5.4: Unknown class types are rejected before any lookup.
    #[test]
    fn unregistered_class_type_is_rejected() {
        let (store, engine) = engine_over(&Fixture::default());
        let definition = FacetingDefinition::builder("Wrong")
            .populated(true)
            .build()
            .expect("well formed");

        let result = engine.populate(
            &Aggregate::Station(Station::reference(STATION)),
            &definition,
            &FacetContext::new().with_effective_time(at(0)),
        );

        assert_eq!(
            result,
            Err(FacetError::UnregisteredClassType("Wrong".to_string()))
        );
        assert_eq!(store.total_calls(), 0);
    }

    /// F5.5: A definition for another type is a mismatch.
    #[test]
    fn mismatched_definition_is_rejected() {
        let (_store, engine) = engine_over(&Fixture::default());

        let result = engine.populate(
            &Aggregate::Station(Station::reference(STATION)),
            &FacetingDefinition::populated(ClassType::Channel),
            &FacetContext::new().with_effective_time(at(0)),
        );

        assert_eq!(
            result,
            Err(FacetError::ClassTypeMismatch {
                expected: ClassType::Station,
                found: "Channel".to_string(),
            })
        );
    }

    /// F5.6: Station lookups pick the version effective at the given time.
    #[test]
    fn station_version_is_selected_by_time() {
        let fixture = Fixture {
            stations: vec![station(0, Vec::new()), station(100, Vec::new())],
            ..Fixture::default()
        };
        let (_store, engine) = engine_over(&fixture);
        let definition = FacetingDefinition::populated(ClassType::Station);

        let early = engine
            .populate(
                &Aggregate::Station(Station::reference(STATION)),
                &definition,
                &FacetContext::new().with_effective_time(at(50)),
            )
            .expect("valid definition");
        let late = engine
            .populate(
                &Aggregate::Station(Station::reference(STATION)),
                &definition,
                &FacetContext::new().with_effective_time(at(150)),
            )
            .expect("valid definition");

        assert_eq!(early, Some(Aggregate::Station(fixture.stations[0].clone())));
        assert_eq!(late, Some(Aggregate::Station(fixture.stations[1].clone())));
    }

    /// One populated instance of every aggregate root.
    fn every_aggregate() -> Vec<Aggregate> {
        vec![
            Aggregate::Event(event(&[eh_id(1)], &[7])),
            Aggregate::EventHypothesis(event_hypothesis(eh_id(1), &[], &[sdh_id(1, 1)], &[3])),
            Aggregate::LocationSolution(location_solution(3)),
            Aggregate::SignalDetection(detection(1, &[sdh_id(1, 1)])),
            Aggregate::SignalDetectionHypothesis(hypothesis(sdh_id(1, 1), None, 150)),
            Aggregate::ChannelSegment(segment(100, &[4])),
            Aggregate::ProcessingMask(mask(4)),
            Aggregate::Station(station(0, vec![channel(0)])),
            Aggregate::Channel(channel(0)),
            Aggregate::Response(response(9, 0)),
        ]
    }

    fn full_context() -> FacetContext {
        FacetContext::new()
            .with_stage(stage())
            .with_effective_time(at(0))
    }

    /// F5.8: Every root rejects a definition for another type.
    #[test]
    fn every_aggregate_rejects_mismatched_definition() {
        let (store, engine) = engine_over(&Fixture::default());

        for aggregate in every_aggregate() {
            let expected = aggregate.class_type();
            let wrong = if expected == ClassType::ProcessingMask {
                ClassType::Channel
            } else {
                ClassType::ProcessingMask
            };

            let result = engine.populate(
                &aggregate,
                &FacetingDefinition::populated(wrong),
                &full_context(),
            );

            assert_eq!(
                result,
                Err(FacetError::ClassTypeMismatch {
                    expected,
                    found: wrong.as_str().to_string(),
                }),
                "{expected} accepted a {wrong} definition"
            );
        }
        assert_eq!(store.total_calls(), 0);
    }

    /// F5.9: Every root strips to a reference without a lookup.
    #[test]
    fn every_aggregate_strips_without_lookup() {
        let (store, engine) = engine_over(&Fixture::default());

        for aggregate in every_aggregate() {
            let class_type = aggregate.class_type();
            assert!(aggregate.is_populated());

            let result = engine
                .populate(
                    &aggregate,
                    &FacetingDefinition::unpopulated(class_type),
                    &full_context(),
                )
                .expect("valid definition")
                .expect("stripping always yields a reference");

            assert_eq!(result.class_type(), class_type);
            assert!(!result.is_populated(), "{class_type} kept its data");
        }
        assert_eq!(store.total_calls(), 0);
    }

    /// F5.7: Stripping always succeeds and never calls a store.
    #[test]
    fn stripping_is_total() {
        let (store, engine) = engine_over(&Fixture::default());
        let populated = event(&[eh_id(1)], &[]);

        let result = engine
            .populate(
                &Aggregate::Event(populated),
                &FacetingDefinition::unpopulated(ClassType::Event),
                &FacetContext::new().with_stage(stage()),
            )
            .expect("valid definition");

        assert_eq!(
            result,
            Some(Aggregate::Event(Event::reference(Uuid::from_u128(EVENT_ID))))
        );
        assert_eq!(store.total_calls(), 0);
    }
}
