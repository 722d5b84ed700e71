//! # CLI Command Implementations
//!
//! Each `cmd_*` function prints its result; the work itself is done by a
//! plain function returning data so it can be tested without capturing
//! stdout.

use crate::config::{Backend, Settings};
use chrono::{DateTime, Utc};
use facetgraph_core::defaults;
use facetgraph_core::definition::{class_type_of, validate};
use facetgraph_core::model::{
    Channel, ChannelSegment, ChannelSegmentDescriptor, Event, EventHypothesis, ProcessingMask,
    Response, SignalDetection, SignalDetectionHypothesis, Station,
};
use facetgraph_core::storage::RecordCounts;
use facetgraph_core::{
    Aggregate, ClassType, EventHypothesisId, FacetContext, FacetError, FacetingDefinition,
    Fixture, MemoryStore, RedbStore, Repository, SignalDetectionHypothesisId, StorageBackend,
};
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use uuid::Uuid;

// =============================================================================
// FILE SIZE LIMITS
// =============================================================================

/// Maximum fixture size (500 MB).
const MAX_FIXTURE_FILE_SIZE: u64 = 500 * 1024 * 1024;

/// Maximum definition file size (1 MB).
const MAX_DEFINITION_FILE_SIZE: u64 = 1024 * 1024;

/// Canonicalize `path` and make sure it names a regular file no larger
/// than `max_size`.
fn validate_input_file(path: &Path, max_size: u64) -> Result<PathBuf, FacetError> {
    let canonical = path.canonicalize().map_err(|e| {
        FacetError::Storage(format!("Invalid file path '{}': {e}", path.display()))
    })?;
    if !canonical.is_file() {
        return Err(FacetError::Storage(format!(
            "Path '{}' is not a regular file",
            path.display()
        )));
    }

    let metadata = std::fs::metadata(&canonical)
        .map_err(|e| FacetError::Storage(format!("Cannot read file metadata: {e}")))?;
    if metadata.len() > max_size {
        return Err(FacetError::Storage(format!(
            "File size {} bytes exceeds maximum allowed {max_size} bytes",
            metadata.len()
        )));
    }
    Ok(canonical)
}

fn read_text(path: &Path, max_size: u64) -> Result<String, FacetError> {
    let validated = validate_input_file(path, max_size)?;
    std::fs::read_to_string(&validated)
        .map_err(|e| FacetError::Storage(format!("Read file '{}': {e}", path.display())))
}

fn print_json(value: &impl Serialize) -> Result<(), FacetError> {
    let text =
        serde_json::to_string_pretty(value).map_err(|e| FacetError::Serialization(e.to_string()))?;
    println!("{text}");
    Ok(())
}

/// How results are printed.
#[derive(Debug, Clone, Copy, Default)]
pub struct Output {
    pub json_mode: bool,
    pub quiet: bool,
}

// =============================================================================
// AGGREGATE KINDS
// =============================================================================

/// Aggregate roots addressable from the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Event,
    EventHypothesis,
    SignalDetection,
    SignalDetectionHypothesis,
    ChannelSegment,
    ProcessingMask,
    Station,
    Channel,
    Response,
}

impl Kind {
    pub const ALL: [Kind; 9] = [
        Kind::Event,
        Kind::EventHypothesis,
        Kind::SignalDetection,
        Kind::SignalDetectionHypothesis,
        Kind::ChannelSegment,
        Kind::ProcessingMask,
        Kind::Station,
        Kind::Channel,
        Kind::Response,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Event => "event",
            Self::EventHypothesis => "event-hypothesis",
            Self::SignalDetection => "signal-detection",
            Self::SignalDetectionHypothesis => "signal-detection-hypothesis",
            Self::ChannelSegment => "channel-segment",
            Self::ProcessingMask => "processing-mask",
            Self::Station => "station",
            Self::Channel => "channel",
            Self::Response => "response",
        }
    }

    #[must_use]
    pub fn class_type(self) -> ClassType {
        match self {
            Self::Event => ClassType::Event,
            Self::EventHypothesis => ClassType::EventHypothesis,
            Self::SignalDetection => ClassType::SignalDetection,
            Self::SignalDetectionHypothesis => ClassType::SignalDetectionHypothesis,
            Self::ChannelSegment => ClassType::ChannelSegment,
            Self::ProcessingMask => ClassType::ProcessingMask,
            Self::Station => ClassType::Station,
            Self::Channel => ClassType::Channel,
            Self::Response => ClassType::Response,
        }
    }

    /// The library default for this kind. Station definitions, whose
    /// library default is a version reference, are populated one level.
    #[must_use]
    pub fn default_definition(self) -> FacetingDefinition {
        let class_type = self.class_type();
        match self {
            Self::Station | Self::Channel | Self::Response => {
                FacetingDefinition::populated(class_type)
            }
            _ => defaults::for_class_type(class_type)
                .unwrap_or_else(|| FacetingDefinition::populated(class_type)),
        }
    }

    /// A reference of this kind with the identity parsed from `id`.
    ///
    /// # Errors
    ///
    /// `MissingArgument` when `id` does not have the shape the kind needs.
    pub fn reference(self, id: &str) -> Result<Aggregate, FacetError> {
        Ok(match self {
            Self::Event => Aggregate::Event(Event::reference(parse_uuid(id)?)),
            Self::EventHypothesis => {
                let (event, hypothesis) = parse_pair(id)?;
                Aggregate::EventHypothesis(EventHypothesis::reference(EventHypothesisId::new(
                    event, hypothesis,
                )))
            }
            Self::SignalDetection => {
                Aggregate::SignalDetection(SignalDetection::reference(parse_uuid(id)?))
            }
            Self::SignalDetectionHypothesis => {
                let (detection, hypothesis) = parse_pair(id)?;
                Aggregate::SignalDetectionHypothesis(SignalDetectionHypothesis::reference(
                    SignalDetectionHypothesisId::new(detection, hypothesis),
                ))
            }
            Self::ChannelSegment => {
                Aggregate::ChannelSegment(ChannelSegment::reference(parse_descriptor(id)?))
            }
            Self::ProcessingMask => {
                Aggregate::ProcessingMask(ProcessingMask::reference(parse_uuid(id)?))
            }
            Self::Station => Aggregate::Station(Station::reference(parse_name(id)?)),
            Self::Channel => Aggregate::Channel(Channel::reference(parse_name(id)?)),
            Self::Response => Aggregate::Response(Response::reference(parse_uuid(id)?)),
        })
    }
}

impl FromStr for Kind {
    type Err = FacetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| {
                let known: Vec<&str> = Self::ALL.iter().map(|k| k.as_str()).collect();
                FacetError::MissingArgument(format!(
                    "Unknown kind '{s}'. Use: {}",
                    known.join(", ")
                ))
            })
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// ARGUMENT PARSING
// =============================================================================

/// Parse an RFC 3339 timestamp.
pub fn parse_time(value: &str) -> Result<DateTime<Utc>, FacetError> {
    DateTime::parse_from_rfc3339(value)
        .map(|time| time.with_timezone(&Utc))
        .map_err(|e| FacetError::MissingArgument(format!("Invalid time '{value}': {e}")))
}

fn parse_uuid(value: &str) -> Result<Uuid, FacetError> {
    Uuid::parse_str(value.trim())
        .map_err(|e| FacetError::MissingArgument(format!("Invalid id '{value}': {e}")))
}

fn parse_name(value: &str) -> Result<String, FacetError> {
    let name = value.trim();
    if name.is_empty() {
        return Err(FacetError::MissingArgument("Name cannot be empty".to_string()));
    }
    Ok(name.to_string())
}

/// `<uuid>/<uuid>`, the display form of composite hypothesis ids.
fn parse_pair(value: &str) -> Result<(Uuid, Uuid), FacetError> {
    let (parent, hypothesis) = value.split_once('/').ok_or_else(|| {
        FacetError::MissingArgument(format!(
            "Invalid id '{value}', expected '<parent uuid>/<hypothesis uuid>'"
        ))
    })?;
    Ok((parse_uuid(parent)?, parse_uuid(hypothesis)?))
}

/// `<channel>/<start>/<end>/<creation>` with RFC 3339 times.
fn parse_descriptor(value: &str) -> Result<ChannelSegmentDescriptor, FacetError> {
    let parts: Vec<&str> = value.split('/').collect();
    let [channel, start, end, creation] = parts.as_slice() else {
        return Err(FacetError::MissingArgument(format!(
            "Invalid channel segment id '{value}', expected '<channel>/<start>/<end>/<creation>'"
        )));
    };
    Ok(ChannelSegmentDescriptor::new(
        Channel::reference(parse_name(channel)?),
        parse_time(start)?,
        parse_time(end)?,
        parse_time(creation)?,
    ))
}

// =============================================================================
// FILE LOADING
// =============================================================================

/// Read and validate a fixture document.
pub fn read_fixture(path: &Path) -> Result<Fixture, FacetError> {
    Fixture::from_json(&read_text(path, MAX_FIXTURE_FILE_SIZE)?)
}

/// Read a definition from JSON, or from TOML when the extension is `.toml`,
/// and check its shape.
pub fn read_definition(path: &Path) -> Result<FacetingDefinition, FacetError> {
    let text = read_text(path, MAX_DEFINITION_FILE_SIZE)?;
    let is_toml = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));

    let definition: FacetingDefinition = if is_toml {
        toml::from_str(&text).map_err(|e| FacetError::Serialization(e.to_string()))?
    } else {
        serde_json::from_str(&text).map_err(|e| FacetError::Serialization(e.to_string()))?
    };
    definition.check_shape()?;
    Ok(definition)
}

/// Every node of the tree names a registered class type.
fn check_registered(definition: &FacetingDefinition) -> Result<(), FacetError> {
    class_type_of(definition)?;
    definition.children().values().try_for_each(check_registered)
}

/// The configured store, or an in-memory store loaded from `fixture`.
pub fn open_backend(
    settings: &Settings,
    fixture: Option<&Path>,
) -> Result<StorageBackend, FacetError> {
    if let Some(path) = fixture {
        let fixture = read_fixture(path)?;
        return Ok(StorageBackend::InMemory(MemoryStore::from_fixture(&fixture)?));
    }
    match settings.backend {
        Backend::Memory => Ok(StorageBackend::InMemory(MemoryStore::new())),
        Backend::Redb => Ok(StorageBackend::Persistent(RedbStore::open(&settings.database)?)),
    }
}

// =============================================================================
// IMPORT COMMAND
// =============================================================================

/// Load `file` into the configured store; returns the per-kind counts of
/// the imported document.
///
/// The memory backend does not outlive the process, so there the fixture
/// is only validated.
pub fn import_fixture(settings: &Settings, file: &Path) -> Result<RecordCounts, FacetError> {
    let fixture = read_fixture(file)?;
    let mut backend = open_backend(settings, None)?;
    let imported = backend.import(&fixture)?;
    tracing::info!(
        imported,
        backend = %settings.backend,
        database = %settings.database.display(),
        "imported fixture"
    );
    Ok(fixture.counts())
}

pub fn cmd_import(settings: &Settings, output: Output, file: &Path) -> Result<(), FacetError> {
    let counts = import_fixture(settings, file)?;
    let total: usize = counts.values().sum();

    if output.json_mode {
        return print_json(&serde_json::json!({
            "database": settings.database.to_string_lossy(),
            "backend": settings.backend.to_string(),
            "persisted": settings.backend == Backend::Redb,
            "imported": total,
            "counts": counts,
        }));
    }

    if settings.backend == Backend::Memory && !output.quiet {
        println!("Memory backend: fixture validated, nothing persisted");
    }
    println!("Imported {total} records");
    if !output.quiet {
        for (kind, count) in &counts {
            println!("  {kind:<27} {count}");
        }
    }
    Ok(())
}

// =============================================================================
// POPULATE COMMAND
// =============================================================================

#[derive(Debug, Clone)]
pub struct PopulateRequest {
    pub kind: Kind,
    pub id: String,
    pub definition: Option<PathBuf>,
    pub effective_time: Option<DateTime<Utc>>,
    pub fixture: Option<PathBuf>,
}

/// Facet the requested aggregate; `None` when it cannot be resolved.
pub fn populate(
    settings: &Settings,
    request: &PopulateRequest,
) -> Result<Option<Aggregate>, FacetError> {
    let aggregate = request.kind.reference(&request.id)?;
    let definition = match &request.definition {
        Some(path) => read_definition(path)?,
        None => request.kind.default_definition(),
    };

    let mut context = FacetContext::new();
    if let Some(stage) = &settings.stage {
        context = context.with_stage(stage.clone());
    }
    if let Some(time) = request.effective_time {
        context = context.with_effective_time(time);
    }

    let repository = Repository::new(open_backend(settings, request.fixture.as_deref())?);
    let engine = repository.engine()?;
    tracing::debug!(
        kind = %request.kind,
        id = %request.id,
        depth = definition.depth(),
        "populating aggregate"
    );
    engine.populate(&aggregate, &definition, &context)
}

pub fn cmd_populate(
    settings: &Settings,
    output: Output,
    request: &PopulateRequest,
) -> Result<(), FacetError> {
    let result = populate(settings, request)?;

    if output.json_mode {
        return print_json(&serde_json::json!({
            "kind": request.kind.as_str(),
            "id": request.id,
            "resolved": result.is_some(),
            "result": result,
        }));
    }

    match result {
        Some(aggregate) => print_json(&aggregate),
        None => {
            println!("{} {} could not be resolved", request.kind, request.id);
            Ok(())
        }
    }
}

// =============================================================================
// DEFAULTS COMMAND
// =============================================================================

pub fn cmd_defaults(kind: Kind) -> Result<(), FacetError> {
    print_json(&kind.default_definition())
}

// =============================================================================
// VALIDATE COMMAND
// =============================================================================

/// Check that the definition at `path` is well formed, names only
/// registered class types and governs `class_type`.
pub fn validate_definition(path: &Path, class_type: &str) -> Result<FacetingDefinition, FacetError> {
    let expected: ClassType = class_type.parse()?;
    let definition = read_definition(path)?;
    check_registered(&definition)?;
    validate(Some(&definition), expected)?;
    Ok(definition)
}

pub fn cmd_validate(output: Output, path: &Path, class_type: &str) -> Result<(), FacetError> {
    let definition = validate_definition(path, class_type)?;

    if output.json_mode {
        return print_json(&serde_json::json!({
            "valid": true,
            "classType": definition.class_type(),
            "populated": definition.is_populated(),
            "depth": definition.depth(),
        }));
    }

    println!(
        "Definition is valid for {} (depth {})",
        definition.class_type(),
        definition.depth()
    );
    Ok(())
}

// =============================================================================
// STATUS COMMAND
// =============================================================================

pub fn cmd_status(settings: &Settings, output: Output) -> Result<(), FacetError> {
    let backend = open_backend(settings, None)?;
    let counts = backend.counts()?;

    if output.json_mode {
        return print_json(&serde_json::json!({
            "database": settings.database.to_string_lossy(),
            "backend": settings.backend.to_string(),
            "stage": settings.stage.as_ref().map(|s| s.as_str()),
            "counts": counts,
        }));
    }

    println!("facetgraph Store Status");
    println!("=======================");
    println!("Database: {}", settings.database.display());
    println!("Backend:  {}", settings.backend);
    if let Some(stage) = &settings.stage {
        println!("Stage:    {stage}");
    }
    println!();
    for (kind, count) in &counts {
        println!("{kind:<27} {count}");
    }
    Ok(())
}
