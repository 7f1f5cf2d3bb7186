// 🗺️ Field Mapping Tables
// Declarative canonical ↔ backend field pairs, scoped per
// (entity type, source system), validated once at start-up.

use crate::error::{NormalizeError, Result};
use crate::fields::{find_spec, FieldKind, FieldSpec, TimestampFormat};
use crate::filters::FilterDialect;
use crate::schema::EntityType;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashSet};

pub const ERP_NEXT: &str = "erp_next";
pub const CLOUD_ERP: &str = "cloud_erp";

// ============================================================================
// SOURCE PROFILES
// ============================================================================

/// How one backend renders values that are not plain renames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceProfile {
    pub timestamps: TimestampFormat,
    pub filters: FilterDialect,
}

impl SourceProfile {
    pub fn erp_next() -> Self {
        SourceProfile {
            timestamps: TimestampFormat::NaiveUtc,
            filters: FilterDialect::QualifiedArrays,
        }
    }

    pub fn cloud_erp() -> Self {
        SourceProfile {
            timestamps: TimestampFormat::Rfc3339,
            filters: FilterDialect::FieldObjects,
        }
    }
}

impl Default for SourceProfile {
    fn default() -> Self {
        SourceProfile::cloud_erp()
    }
}

// ============================================================================
// MAPPING ENTRIES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transform {
    Direct,
    /// Boolean stored with the opposite meaning (`disabled` vs `is_active`)
    Inverted,
}

impl Transform {
    /// Applies in both directions; inversion is its own inverse.
    pub fn apply(&self, value: Value) -> Value {
        match (self, value) {
            (Transform::Inverted, Value::Bool(b)) => Value::Bool(!b),
            (_, other) => other,
        }
    }
}

/// Backend shape of a list of nested records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListShape {
    /// `[{...}, {...}]`, each element mapped with the item entries
    Array,
    /// `{"Color": "Red"}`: object keys and values become two item fields
    KeyedObject {
        key: &'static str,
        value: &'static str,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ItemMapping {
    pub shape: ListShape,
    pub entries: Vec<MappingEntry>,
}

impl ItemMapping {
    pub fn array(entries: Vec<MappingEntry>) -> Self {
        ItemMapping {
            shape: ListShape::Array,
            entries,
        }
    }

    pub fn keyed(key: &'static str, value: &'static str) -> Self {
        ItemMapping {
            shape: ListShape::KeyedObject { key, value },
            entries: Vec::new(),
        }
    }
}

/// One `(canonical_field, source_field)` pair.
///
/// Both paths may be dot-separated to reach into nested objects.
#[derive(Debug, Clone, PartialEq)]
pub struct MappingEntry {
    pub canonical: &'static str,
    pub source: &'static str,
    pub transform: Transform,
    pub items: Option<ItemMapping>,
    /// Read from the backend but never written back
    pub read_only: bool,
}

impl MappingEntry {
    pub fn field(canonical: &'static str, source: &'static str) -> Self {
        MappingEntry {
            canonical,
            source,
            transform: Transform::Direct,
            items: None,
            read_only: false,
        }
    }

    pub fn inverted(mut self) -> Self {
        self.transform = Transform::Inverted;
        self
    }

    /// Inbound only: for a backend field that already feeds a writable entry
    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    pub fn records(canonical: &'static str, source: &'static str, items: ItemMapping) -> Self {
        MappingEntry {
            canonical,
            source,
            transform: Transform::Direct,
            items: Some(items),
            read_only: false,
        }
    }
}

// ============================================================================
// FIELD MAPPING (one entity type × one source system)
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct FieldMapping {
    source_system: String,
    profile: SourceProfile,
    document_type: Option<&'static str>,
    entries: Vec<MappingEntry>,
}

impl FieldMapping {
    pub fn new(source_system: impl Into<String>, profile: SourceProfile) -> Self {
        FieldMapping {
            source_system: source_system.into(),
            profile,
            document_type: None,
            entries: Vec::new(),
        }
    }

    /// Builder: backend document type, sent as `doctype` on writes and used
    /// to qualify filters
    pub fn with_document_type(mut self, document_type: &'static str) -> Self {
        self.document_type = Some(document_type);
        self
    }

    /// Builder: plain rename
    pub fn with_field(self, canonical: &'static str, source: &'static str) -> Self {
        self.with_entry(MappingEntry::field(canonical, source))
    }

    /// Builder: boolean stored inverted by the backend
    pub fn with_inverted_field(self, canonical: &'static str, source: &'static str) -> Self {
        self.with_entry(MappingEntry::field(canonical, source).inverted())
    }

    /// Builder: canonical field filled from the backend, never sent back
    pub fn with_read_only_field(self, canonical: &'static str, source: &'static str) -> Self {
        self.with_entry(MappingEntry::field(canonical, source).read_only())
    }

    /// Builder: list of nested records
    pub fn with_records(self, canonical: &'static str, source: &'static str, items: ItemMapping) -> Self {
        self.with_entry(MappingEntry::records(canonical, source, items))
    }

    pub fn with_entry(mut self, entry: MappingEntry) -> Self {
        self.entries.push(entry);
        self
    }

    pub fn source_system(&self) -> &str {
        &self.source_system
    }

    pub fn profile(&self) -> SourceProfile {
        self.profile
    }

    pub fn document_type(&self) -> Option<&'static str> {
        self.document_type
    }

    pub fn entries(&self) -> &[MappingEntry] {
        &self.entries
    }

    /// Entry for a canonical field, if this backend has one
    pub fn entry(&self, canonical: &str) -> Option<&MappingEntry> {
        self.entries.iter().find(|e| e.canonical == canonical)
    }

    /// Source field name for a canonical field
    pub fn source_field(&self, canonical: &str) -> Option<&'static str> {
        self.entry(canonical).map(|e| e.source)
    }

    /// Flat `canonical → source` view, for display
    pub fn as_pairs(&self) -> BTreeMap<&'static str, &'static str> {
        self.entries.iter().map(|e| (e.canonical, e.source)).collect()
    }
}

// ============================================================================
// MAPPING TABLE (one entity type × all source systems)
// ============================================================================

#[derive(Debug, Clone)]
pub struct MappingTable {
    entity_type: EntityType,
    mappings: BTreeMap<String, FieldMapping>,
}

impl MappingTable {
    pub fn new(entity_type: EntityType) -> Self {
        MappingTable {
            entity_type,
            mappings: BTreeMap::new(),
        }
    }

    /// Builder: add (or replace) the mapping of one source system
    pub fn with_mapping(mut self, mapping: FieldMapping) -> Self {
        self.mappings.insert(mapping.source_system.clone(), mapping);
        self
    }

    pub fn entity_type(&self) -> EntityType {
        self.entity_type
    }

    pub fn get(&self, source_system: &str) -> Option<&FieldMapping> {
        self.mappings.get(source_system)
    }

    pub fn source_systems(&self) -> Vec<&str> {
        self.mappings.keys().map(String::as_str).collect()
    }

    /// Check every mapping against the entity's field catalog.
    ///
    /// Catches typos in canonical names, duplicate canonical entries,
    /// transforms that do not fit the field kind, colliding source paths, and
    /// two writable entries targeting the same source field.
    pub fn validate(&self) -> Result<()> {
        let catalog = self.entity_type.catalog();
        for mapping in self.mappings.values() {
            validate_entries(&mapping.entries, catalog, "").map_err(|reason| {
                NormalizeError::InvalidMapping {
                    entity_type: self.entity_type,
                    source_system: mapping.source_system.clone(),
                    reason,
                }
            })?;
        }
        Ok(())
    }
}

fn validate_entries(
    entries: &[MappingEntry],
    catalog: &[FieldSpec],
    scope: &str,
) -> std::result::Result<(), String> {
    let mut seen = HashSet::new();

    for entry in entries {
        let name = format!("{}{}", scope, entry.canonical);

        if !seen.insert(entry.canonical) {
            return Err(format!("`{}` is mapped more than once", name));
        }

        let spec = find_spec(catalog, entry.canonical)
            .ok_or_else(|| format!("unknown canonical field `{}`", name))?;

        if entry.transform == Transform::Inverted && spec.kind != FieldKind::Boolean {
            return Err(format!("`{}` is {}, only booleans can be inverted", name, spec.kind));
        }

        match (&entry.items, spec.kind) {
            (Some(items), FieldKind::Records) => match &items.shape {
                ListShape::Array => {
                    validate_entries(&items.entries, spec.items, &format!("{}[].", name))?;
                }
                ListShape::KeyedObject { key, value } => {
                    for part in [key, value] {
                        let item = find_spec(spec.items, part)
                            .ok_or_else(|| format!("unknown item field `{}[].{}`", name, part))?;
                        if !item.kind.is_scalar() {
                            return Err(format!("`{}[].{}` cannot be a keyed list part", name, part));
                        }
                    }
                }
            },
            (None, FieldKind::Records) => {
                return Err(format!("list field `{}` has no item mapping", name));
            }
            (Some(_), kind) => {
                return Err(format!("`{}` is {}, not a list", name, kind));
            }
            (None, _) => {}
        }
    }

    let mut written = HashSet::new();
    for entry in entries.iter().filter(|e| !e.read_only) {
        if !written.insert(entry.source) {
            return Err(format!(
                "source field `{}{}` is written by more than one entry; mark the extra ones read-only",
                scope, entry.source
            ));
        }
    }

    for a in entries {
        for b in entries {
            if b.source.starts_with(a.source) && b.source[a.source.len()..].starts_with('.') {
                return Err(format!(
                    "source path `{}` is nested inside `{}`",
                    b.source, a.source
                ));
            }
        }
    }

    Ok(())
}

// ============================================================================
// PATH HELPERS
// ============================================================================

/// Read a dot-separated path from a JSON object.
pub fn lookup<'a>(object: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    let mut parts = path.split('.');
    let first = parts.next()?;
    let mut current = object.get(first)?;
    for part in parts {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}

/// Like `lookup`, but tells a missing parent apart from one of the wrong
/// shape: `Err(parent_path)` when an intermediate value is present, not
/// null, and not an object.
pub fn lookup_checked<'a>(object: &'a Map<String, Value>, path: &str) -> std::result::Result<Option<&'a Value>, String> {
    let mut parts = path.split('.');
    let Some(first) = parts.next() else {
        return Ok(None);
    };
    let mut walked = first.to_string();
    let Some(mut current) = object.get(first) else {
        return Ok(None);
    };
    for part in parts {
        current = match current {
            Value::Object(inner) => match inner.get(part) {
                Some(next) => next,
                None => return Ok(None),
            },
            Value::Null => return Ok(None),
            _ => return Err(walked),
        };
        walked.push('.');
        walked.push_str(part);
    }
    Ok(Some(current))
}

/// Write a dot-separated path, creating intermediate objects.
pub fn insert_path(object: &mut Map<String, Value>, path: &str, value: Value) {
    match path.split_once('.') {
        None => {
            object.insert(path.to_string(), value);
        }
        Some((head, rest)) => {
            let slot = object
                .entry(head.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !slot.is_object() {
                *slot = Value::Object(Map::new());
            }
            if let Value::Object(inner) = slot {
                insert_path(inner, rest, value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn table(mapping: FieldMapping) -> MappingTable {
        MappingTable::new(EntityType::Customer).with_mapping(mapping)
    }

    #[test]
    fn test_valid_mapping_passes() {
        let mapping = FieldMapping::new("erp_a", SourceProfile::default())
            .with_field("id", "cust_id")
            .with_field("name", "officialName")
            .with_field("contact_info.address.city", "addr.city");

        assert!(table(mapping).validate().is_ok());
    }

    #[test]
    fn test_typo_in_canonical_field_is_rejected() {
        let mapping = FieldMapping::new("erp_a", SourceProfile::default())
            .with_field("id", "cust_id")
            .with_field("nmae", "officialName");

        let err = table(mapping).validate().unwrap_err();
        match err {
            NormalizeError::InvalidMapping { source_system, reason, .. } => {
                assert_eq!(source_system, "erp_a");
                assert!(reason.contains("nmae"));
            }
            other => panic!("expected InvalidMapping, got {:?}", other),
        }
    }

    #[test]
    fn test_duplicate_canonical_field_is_rejected() {
        let mapping = FieldMapping::new("erp_a", SourceProfile::default())
            .with_field("name", "name")
            .with_field("name", "customer_name");

        assert!(table(mapping).validate().is_err());
    }

    #[test]
    fn test_shared_source_field_needs_read_only_entry() {
        // ERPNext uses the document name as both identifier and number
        let both_written = FieldMapping::new(ERP_NEXT, SourceProfile::erp_next())
            .with_field("id", "name")
            .with_field("number", "name");
        let err = MappingTable::new(EntityType::Quotation)
            .with_mapping(both_written)
            .validate()
            .unwrap_err()
            .to_string();
        assert!(err.contains("`name`"), "{}", err);

        let one_written = FieldMapping::new(ERP_NEXT, SourceProfile::erp_next())
            .with_field("id", "name")
            .with_read_only_field("number", "name");
        let table = MappingTable::new(EntityType::Quotation).with_mapping(one_written);
        assert!(table.validate().is_ok());
    }

    #[test]
    fn test_inverting_non_boolean_is_rejected() {
        let mapping = FieldMapping::new("erp_a", SourceProfile::default()).with_inverted_field("name", "x");
        assert!(table(mapping).validate().is_err());
    }

    #[test]
    fn test_list_field_requires_item_mapping() {
        let mapping = FieldMapping::new("erp_a", SourceProfile::default()).with_field("items", "lines");
        let table = MappingTable::new(EntityType::Quotation).with_mapping(mapping);
        assert!(table.validate().is_err());
    }

    #[test]
    fn test_item_typo_is_rejected() {
        let mapping = FieldMapping::new("erp_a", SourceProfile::default()).with_records(
            "items",
            "lines",
            ItemMapping::array(vec![MappingEntry::field("quantity", "qty")]),
        );
        let table = MappingTable::new(EntityType::Quotation).with_mapping(mapping);
        let err = table.validate().unwrap_err().to_string();
        assert!(err.contains("items[].quantity"), "{}", err);
    }

    #[test]
    fn test_colliding_source_paths_are_rejected() {
        let mapping = FieldMapping::new("erp_a", SourceProfile::default())
            .with_field("name", "address")
            .with_field("contact_info.address.city", "address.city");
        assert!(table(mapping).validate().is_err());
    }

    #[test]
    fn test_path_helpers() {
        let mut object = Map::new();
        insert_path(&mut object, "billing_address.city", json!("Lyon"));
        insert_path(&mut object, "billing_address.zip", json!("69001"));
        insert_path(&mut object, "name", json!("Acme"));

        assert_eq!(
            Value::Object(object.clone()),
            json!({"billing_address": {"city": "Lyon", "zip": "69001"}, "name": "Acme"})
        );
        assert_eq!(lookup(&object, "billing_address.city"), Some(&json!("Lyon")));
        assert_eq!(lookup(&object, "name.first"), None);
        assert_eq!(lookup(&object, "missing"), None);
    }

    #[test]
    fn test_checked_lookup_reports_scalar_parent() {
        let object = match json!({"billing_address": "1 Main St", "shipping": null, "contact": {"email": "a@b.c"}}) {
            Value::Object(map) => map,
            _ => unreachable!(),
        };

        assert_eq!(lookup_checked(&object, "billing_address.city"), Err("billing_address".to_string()));
        assert_eq!(lookup_checked(&object, "shipping.city"), Ok(None));
        assert_eq!(lookup_checked(&object, "missing.city"), Ok(None));
        assert_eq!(lookup_checked(&object, "contact.phone"), Ok(None));
        assert_eq!(lookup_checked(&object, "contact.email"), Ok(Some(&json!("a@b.c"))));
    }
}
