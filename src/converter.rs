// 🔄 Entity Converters
// The shared capability set every entity converter offers, driven by its
// mapping table. Converters are stateless and safe to share across tasks.

use crate::error::{ConversionError, ConversionFailure, NormalizeError, Result};
use crate::fields::{find_spec, to_canonical, to_external, FieldKind, FieldSpec, TimestampFormat};
use crate::filters::{self, ExternalFilters, StandardFilters};
use crate::mapping::{insert_path, lookup, lookup_checked, FieldMapping, ItemMapping, ListShape, MappingEntry, MappingTable};
use crate::schema::{EntityType, Metadata, RawRecord, StandardRecord};
use serde_json::{Map, Value};
use tracing::debug;

// ============================================================================
// CONVERTER TRAIT
// ============================================================================

/// Converts one entity type between backend payloads and canonical records.
///
/// Implementors provide the entity type and the mapping table; the
/// conversions themselves are derived from the table and may be overridden
/// for entities that need more than field mapping.
pub trait EntityConverter: Send + Sync {
    fn entity_type(&self) -> EntityType;

    fn mapping_table(&self) -> &MappingTable;

    fn field_mapping(&self, source_system: &str) -> Option<&FieldMapping> {
        self.mapping_table().get(source_system)
    }

    /// Source systems this converter has a mapping for
    fn source_systems(&self) -> Vec<&str> {
        self.mapping_table().source_systems()
    }

    /// Backend payload → canonical record, with provenance attached.
    fn external_to_standard(&self, source_system: &str, external_data: &RawRecord) -> Result<StandardRecord> {
        let mapping = require_mapping(self, source_system)?;
        inbound(self.entity_type(), mapping, external_data)
    }

    /// Canonical record → backend payload.
    fn standard_to_external(&self, source_system: &str, standard_data: &StandardRecord) -> Result<RawRecord> {
        let mapping = require_mapping(self, source_system)?;
        outbound(self.entity_type(), mapping, standard_data)
    }

    /// Canonical filter criteria → backend query conditions.
    ///
    /// `entity_type` qualifies the conditions when the backend mapping has
    /// no document type of its own.
    fn convert_filters(
        &self,
        source_system: &str,
        entity_type: EntityType,
        standard_filters: &StandardFilters,
    ) -> Result<ExternalFilters> {
        let mapping = require_mapping(self, source_system)?;
        let external = filters::translate(entity_type, mapping, standard_filters)?;
        debug!(
            entity_type = %entity_type,
            source_system,
            conditions = external.conditions.len(),
            "Translated filters"
        );
        Ok(external)
    }
}

fn require_mapping<'a, C: EntityConverter + ?Sized>(converter: &'a C, source_system: &str) -> Result<&'a FieldMapping> {
    converter
        .field_mapping(source_system)
        .ok_or_else(|| NormalizeError::UnknownSourceSystem {
            entity_type: converter.entity_type().to_string(),
            source_system: source_system.to_string(),
        })
}

// ============================================================================
// CONVERSION CONTEXT
// ============================================================================

/// Where in a record a conversion is happening, for error reporting.
struct Scope<'a> {
    entity_type: EntityType,
    source_system: &'a str,
    prefix: String,
}

impl<'a> Scope<'a> {
    fn root(entity_type: EntityType, source_system: &'a str) -> Self {
        Scope {
            entity_type,
            source_system,
            prefix: String::new(),
        }
    }

    fn item(&self, field: &str, index: usize) -> Scope<'a> {
        Scope {
            entity_type: self.entity_type,
            source_system: self.source_system,
            prefix: format!("{}{}[{}].", self.prefix, field, index),
        }
    }

    fn fail(&self, field: &str, failure: ConversionFailure) -> ConversionError {
        ConversionError::new(
            self.entity_type,
            self.source_system,
            format!("{}{}", self.prefix, field),
            failure,
        )
    }
}

// ============================================================================
// INBOUND (backend → canonical)
// ============================================================================

fn inbound(entity_type: EntityType, mapping: &FieldMapping, raw: &RawRecord) -> Result<StandardRecord> {
    let scope = Scope::root(entity_type, mapping.source_system());
    let mut canonical = inbound_object(mapping.entries(), raw, entity_type.catalog(), &scope)?;

    let source_id = canonical
        .get("id")
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .ok_or_else(|| scope.fail("id", ConversionFailure::MissingIdentifier))?;

    let metadata = Metadata::capture(mapping.source_system(), &source_id, raw);
    let metadata = serde_json::to_value(metadata)
        .map_err(|e| scope.fail("metadata", ConversionFailure::Shape(e.to_string())))?;
    canonical.insert("metadata".to_string(), metadata);

    let record = StandardRecord::from_value(entity_type, Value::Object(canonical))
        .map_err(|e| scope.fail("*", ConversionFailure::Shape(e.to_string())))?;

    debug!(
        entity_type = %entity_type,
        source_system = mapping.source_system(),
        source_id = %source_id,
        "Converted backend record"
    );
    Ok(record)
}

fn inbound_object(
    entries: &[MappingEntry],
    raw: &Map<String, Value>,
    catalog: &[FieldSpec],
    scope: &Scope<'_>,
) -> std::result::Result<Map<String, Value>, ConversionError> {
    let mut canonical = Map::new();

    for entry in entries {
        let value = match lookup_checked(raw, entry.source) {
            Ok(Some(value)) => value,
            Ok(None) => continue,
            Err(parent) => {
                let found = lookup(raw, &parent).map(crate::fields::describe).unwrap_or_default();
                return Err(scope.fail(
                    &parent,
                    ConversionFailure::Shape(format!("expected an object, found {}", found)),
                ));
            }
        };
        let spec = find_spec(catalog, entry.canonical).ok_or_else(|| {
            scope.fail(entry.canonical, ConversionFailure::Shape("field is not in the catalog".to_string()))
        })?;

        let converted = match (&entry.items, spec.kind) {
            (Some(items), FieldKind::Records) => inbound_records(entry, items, value, spec, scope)?,
            _ => to_canonical(spec.kind, value)
                .map_err(|f| scope.fail(entry.canonical, f))?
                .map(|v| entry.transform.apply(v)),
        };

        if let Some(converted) = converted {
            insert_path(&mut canonical, entry.canonical, converted);
        }
    }

    Ok(canonical)
}

fn inbound_records(
    entry: &MappingEntry,
    items: &ItemMapping,
    value: &Value,
    spec: &FieldSpec,
    scope: &Scope<'_>,
) -> std::result::Result<Option<Value>, ConversionError> {
    let shape_error = |expected: &str| {
        scope.fail(
            entry.canonical,
            ConversionFailure::Shape(format!("expected {}, found {}", expected, crate::fields::describe(value))),
        )
    };

    let converted = match (&items.shape, value) {
        (_, Value::Null) => return Ok(None),
        (ListShape::Array, Value::Array(elements)) => elements
            .iter()
            .enumerate()
            .map(|(index, element)| {
                let object = element.as_object().ok_or_else(|| {
                    scope.item(entry.canonical, index).fail(
                        "*",
                        ConversionFailure::Shape(format!("expected an object, found {}", crate::fields::describe(element))),
                    )
                })?;
                inbound_object(&items.entries, object, spec.items, &scope.item(entry.canonical, index))
                    .map(Value::Object)
            })
            .collect::<std::result::Result<Vec<_>, ConversionError>>()?,
        (ListShape::Array, _) => return Err(shape_error("a list")),
        (ListShape::KeyedObject { key, value: value_field }, Value::Object(pairs)) => {
            let value_kind = find_spec(spec.items, value_field).map(|s| s.kind).unwrap_or(FieldKind::Text);
            pairs
                .iter()
                .enumerate()
                .map(|(index, (name, raw_value))| -> std::result::Result<Value, ConversionError> {
                    let mut element = Map::new();
                    element.insert(key.to_string(), Value::String(name.clone()));
                    if let Some(v) = to_canonical(value_kind, raw_value)
                        .map_err(|f| scope.item(entry.canonical, index).fail(value_field, f))?
                    {
                        element.insert(value_field.to_string(), v);
                    }
                    Ok(Value::Object(element))
                })
                .collect::<std::result::Result<Vec<_>, ConversionError>>()?
        }
        (ListShape::KeyedObject { .. }, _) => return Err(shape_error("an object")),
    };

    Ok(Some(Value::Array(converted)))
}

// ============================================================================
// OUTBOUND (canonical → backend)
// ============================================================================

fn outbound(entity_type: EntityType, mapping: &FieldMapping, record: &StandardRecord) -> Result<RawRecord> {
    let scope = Scope::root(entity_type, mapping.source_system());

    if record.entity_type() != entity_type {
        return Err(scope
            .fail(
                "*",
                ConversionFailure::Shape(format!("expected a {} record, got a {}", entity_type, record.entity_type())),
            )
            .into());
    }

    let canonical = match record.to_value() {
        Ok(Value::Object(object)) => object,
        Ok(other) => {
            return Err(scope
                .fail("*", ConversionFailure::Shape(format!("record serialized as {}", crate::fields::describe(&other))))
                .into())
        }
        Err(e) => return Err(scope.fail("*", ConversionFailure::Shape(e.to_string())).into()),
    };

    let mut external = RawRecord::new();
    if let Some(document_type) = mapping.document_type() {
        external.insert("doctype".to_string(), Value::String(document_type.to_string()));
    }
    outbound_object(
        mapping.entries(),
        &canonical,
        entity_type.catalog(),
        mapping.profile().timestamps,
        &scope,
        &mut external,
    )?;

    debug!(
        entity_type = %entity_type,
        source_system = mapping.source_system(),
        fields = external.len(),
        "Converted canonical record"
    );
    Ok(external)
}

fn outbound_object(
    entries: &[MappingEntry],
    canonical: &Map<String, Value>,
    catalog: &[FieldSpec],
    timestamps: TimestampFormat,
    scope: &Scope<'_>,
    external: &mut Map<String, Value>,
) -> std::result::Result<(), ConversionError> {
    for entry in entries.iter().filter(|e| !e.read_only) {
        let Some(value) = lookup(canonical, entry.canonical).filter(|v| !v.is_null()) else {
            continue;
        };
        let spec = find_spec(catalog, entry.canonical).ok_or_else(|| {
            scope.fail(entry.canonical, ConversionFailure::Shape("field is not in the catalog".to_string()))
        })?;

        let rendered = match (&entry.items, spec.kind) {
            (Some(items), FieldKind::Records) => {
                match outbound_records(entry, items, value, spec, timestamps, scope)? {
                    Some(list) => list,
                    None => continue,
                }
            }
            _ => to_external(spec.kind, &entry.transform.apply(value.clone()), timestamps)
                .map_err(|f| scope.fail(entry.canonical, f))?,
        };

        insert_path(external, entry.source, rendered);
    }
    Ok(())
}

/// An empty canonical list is left out rather than sent as `[]`, so a
/// partial update never wipes the backend's lines.
fn outbound_records(
    entry: &MappingEntry,
    items: &ItemMapping,
    value: &Value,
    spec: &FieldSpec,
    timestamps: TimestampFormat,
    scope: &Scope<'_>,
) -> std::result::Result<Option<Value>, ConversionError> {
    let elements = value.as_array().ok_or_else(|| {
        scope.fail(entry.canonical, ConversionFailure::Shape("expected a list".to_string()))
    })?;
    if elements.is_empty() {
        return Ok(None);
    }

    let rendered = match &items.shape {
        ListShape::Array => {
            let mut list = Vec::with_capacity(elements.len());
            for (index, element) in elements.iter().enumerate() {
                let item_scope = scope.item(entry.canonical, index);
                let object = element
                    .as_object()
                    .ok_or_else(|| item_scope.fail("*", ConversionFailure::Shape("expected an object".to_string())))?;
                let mut out = Map::new();
                outbound_object(&items.entries, object, spec.items, timestamps, &item_scope, &mut out)?;
                list.push(Value::Object(out));
            }
            Value::Array(list)
        }
        ListShape::KeyedObject { key, value: value_field } => {
            let value_kind = find_spec(spec.items, value_field).map(|s| s.kind).unwrap_or(FieldKind::Text);
            let mut pairs = Map::new();
            for (index, element) in elements.iter().enumerate() {
                let item_scope = scope.item(entry.canonical, index);
                let name = element.get(*key).and_then(Value::as_str).ok_or_else(|| {
                    item_scope.fail(key, ConversionFailure::Shape("keyed list entries need a name".to_string()))
                })?;
                if pairs.contains_key(name) {
                    return Err(item_scope.fail(
                        key,
                        ConversionFailure::Shape(format!("`{}` appears more than once", name)),
                    ));
                }
                let rendered = match element.get(*value_field).filter(|v| !v.is_null()) {
                    Some(v) => to_external(value_kind, v, timestamps).map_err(|f| item_scope.fail(value_field, f))?,
                    None => Value::Null,
                };
                pairs.insert(name.to_string(), rendered);
            }
            Value::Object(pairs)
        }
    };

    Ok(Some(rendered))
}
