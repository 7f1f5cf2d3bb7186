use anyhow::{bail, Context, Result};
use erp_normalizer::{
    logging, ConverterRegistry, InMemoryAdapter, NormalizationService, RawRecord, Settings,
    StandardFilters, StandardRecord,
};
use serde::Serialize;
use serde_json::{Map, Value};
use std::env;
use std::fs;
use std::path::Path;
use std::sync::Arc;

const USAGE: &str = "\
Usage:
  erp-normalizer mappings
  erp-normalizer to-standard <entity> <source> <file.json>
  erp-normalizer to-external <entity> <source> <file.json>
  erp-normalizer filters     <entity> <source> <filters.json>
  erp-normalizer fetch       <entity> <fixtures.json> [id]";

/// Page size used by `fetch` without an id
const FETCH_PAGE_SIZE: usize = 50;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let settings = Settings::from_env().context("Invalid configuration")?;
    logging::init(&settings.log_level);

    let registry = Arc::new(ConverterRegistry::new().context("Mapping tables failed validation")?);

    let args: Vec<String> = env::args().skip(1).collect();
    let args: Vec<&str> = args.iter().map(String::as_str).collect();

    match args.as_slice() {
        ["mappings"] => run_mappings(&registry),
        ["to-standard", entity, source, file] => run_to_standard(&registry, entity, source, Path::new(file)),
        ["to-external", entity, source, file] => run_to_external(&registry, entity, source, Path::new(file)),
        ["filters", entity, source, file] => run_filters(&registry, entity, source, Path::new(file)),
        ["fetch", entity, fixtures] => run_fetch(registry, &settings, entity, Path::new(fixtures), None).await,
        ["fetch", entity, fixtures, id] => run_fetch(registry, &settings, entity, Path::new(fixtures), Some(*id)).await,
        _ => {
            eprintln!("{}", USAGE);
            std::process::exit(2);
        }
    }
}

/// Every mapping table: entity → source system → canonical field → source field.
fn run_mappings(registry: &ConverterRegistry) -> Result<()> {
    let mut tables = Map::new();

    for entity_type in registry.entity_types() {
        let converter = registry.converter_for(entity_type)?;
        let mut sources = Map::new();
        for source_system in converter.source_systems() {
            if let Some(mapping) = converter.field_mapping(source_system) {
                sources.insert(source_system.to_string(), serde_json::to_value(mapping.as_pairs())?);
            }
        }
        tables.insert(entity_type.to_string(), Value::Object(sources));
    }

    print_json(&tables)
}

/// Backend payload(s) → canonical records. Accepts one object or an array.
fn run_to_standard(registry: &ConverterRegistry, entity: &str, source: &str, file: &Path) -> Result<()> {
    let converter = registry.get_converter(entity)?;
    let payloads = read_json(file)?;

    let convert = |value: &Value| -> Result<StandardRecord> {
        let raw = as_record(value)?;
        converter
            .external_to_standard(source, raw)
            .with_context(|| format!("Failed to convert {} from {}", entity, source))
    };

    match &payloads {
        Value::Array(items) => {
            let records = items.iter().map(convert).collect::<Result<Vec<_>>>()?;
            eprintln!("✓ Converted {} {} record(s) from {}", records.len(), entity, source);
            print_json(&records)
        }
        single => print_json(&convert(single)?),
    }
}

/// Canonical record → backend payload.
fn run_to_external(registry: &ConverterRegistry, entity: &str, source: &str, file: &Path) -> Result<()> {
    let converter = registry.get_converter(entity)?;
    let record = StandardRecord::from_value(converter.entity_type(), read_json(file)?)
        .with_context(|| format!("{} is not a canonical {} record", file.display(), entity))?;

    let payload = converter
        .standard_to_external(source, &record)
        .with_context(|| format!("Failed to convert {} for {}", entity, source))?;
    print_json(&payload)
}

/// Canonical filters → the backend's filter dialect.
fn run_filters(registry: &ConverterRegistry, entity: &str, source: &str, file: &Path) -> Result<()> {
    let converter = registry.get_converter(entity)?;
    let filters: StandardFilters = serde_json::from_value(read_json(file)?)
        .with_context(|| format!("{} does not hold a filter object", file.display()))?;

    let external = converter.convert_filters(source, converter.entity_type(), &filters)?;
    print_json(&external.to_json())
}

/// Full service path against fixture data: get by id, or list the first page.
async fn run_fetch(
    registry: Arc<ConverterRegistry>,
    settings: &Settings,
    entity: &str,
    fixtures: &Path,
    id: Option<&str>,
) -> Result<()> {
    let entity_type = registry.get_converter(entity)?.entity_type();
    let source = settings.routing.resolve(entity_type, None);

    let adapter = InMemoryAdapter::from_fixture(source, &read_json(fixtures)?)
        .with_context(|| format!("Invalid fixture file {}", fixtures.display()))?
        .with_id_fields_from(&registry);

    let service = NormalizationService::builder(registry)
        .settings(settings)?
        .adapter(Arc::new(adapter))
        .build();

    match id {
        Some(id) => print_json(&service.get(entity, id, None).await?),
        None => {
            let page = service
                .search(entity, &StandardFilters::new(), 1, FETCH_PAGE_SIZE, None)
                .await?;
            print_json(&page)
        }
    }
}

// ============================================================================
// HELPERS
// ============================================================================

fn read_json(path: &Path) -> Result<Value> {
    let text = fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("{} is not valid JSON", path.display()))
}

fn as_record(value: &Value) -> Result<&RawRecord> {
    match value {
        Value::Object(map) => Ok(map),
        other => bail!("expected a JSON object, found {}", other),
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
