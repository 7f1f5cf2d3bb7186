// Entity Converters - one per canonical entity type
//
// Each converter owns the mapping table of its entity for every supported
// backend. The conversion logic itself is shared (see `converter`), so adding
// a backend means adding a `FieldMapping`, not code.

pub mod customer;
pub mod product;
pub mod quotation;
pub mod invoice;

pub use customer::CustomerConverter;
pub use product::ProductConverter;
pub use quotation::QuotationConverter;
pub use invoice::InvoiceConverter;

#[cfg(test)]
pub(crate) mod fixtures {
    use crate::converter::EntityConverter;
    use crate::fields::{find_spec, FieldKind, FieldSpec};
    use crate::mapping::{insert_path, lookup, ListShape, MappingEntry};
    use crate::schema::{RawRecord, StandardRecord};
    use serde_json::{json, Map, Value};

    /// Unwrap a `json!` object literal into a backend payload.
    pub fn raw(value: Value) -> RawRecord {
        match value {
            Value::Object(map) => map,
            other => panic!("fixture is not a JSON object: {}", other),
        }
    }

    /// Send a canonical record with every field `source_system` maps filled
    /// in (distinct values, two list items, nanosecond timestamps) out and
    /// back, and check nothing was lost.
    ///
    /// Read-only fields come back holding whatever their shared backend
    /// field carries.
    pub fn assert_full_round_trip(converter: &dyn EntityConverter, source_system: &str) {
        let entity_type = converter.entity_type();
        let mapping = converter.field_mapping(source_system).unwrap();

        let mut counter = 0;
        let mut sent = Map::new();
        fill(mapping.entries(), entity_type.catalog(), &mut counter, &mut sent);

        let mut expected = sent.clone();
        for entry in mapping.entries().iter().filter(|e| e.read_only) {
            let writer = mapping
                .entries()
                .iter()
                .find(|w| !w.read_only && w.source == entry.source)
                .unwrap();
            insert_path(&mut expected, entry.canonical, lookup(&sent, writer.canonical).unwrap().clone());
        }

        let record = StandardRecord::from_value(entity_type, Value::Object(sent)).unwrap();
        let external = converter.standard_to_external(source_system, &record).unwrap();
        let back = converter.external_to_standard(source_system, &external).unwrap();
        let expected = StandardRecord::from_value(entity_type, Value::Object(expected)).unwrap();

        assert_eq!(back.metadata().unwrap().source_id(), record.id().unwrap());
        assert_eq!(without_metadata(&back), without_metadata(&expected), "{} via {}", entity_type, source_system);
    }

    fn fill(entries: &[MappingEntry], catalog: &[FieldSpec], counter: &mut usize, out: &mut Map<String, Value>) {
        for entry in entries {
            let spec = find_spec(catalog, entry.canonical).unwrap();
            let value = match &entry.items {
                None => sample(spec.kind, entry.canonical, counter),
                Some(items) => {
                    let mut elements = Vec::new();
                    for n in 0..2 {
                        let mut element = Map::new();
                        match &items.shape {
                            ListShape::Array => fill(&items.entries, spec.items, counter, &mut element),
                            ListShape::KeyedObject { key, value } => {
                                let value_kind = find_spec(spec.items, value).unwrap().kind;
                                element.insert(key.to_string(), json!(format!("{}-{}", key, n)));
                                element.insert(value.to_string(), sample(value_kind, value, counter));
                            }
                        }
                        elements.push(Value::Object(element));
                    }
                    Value::Array(elements)
                }
            };
            insert_path(out, entry.canonical, value);
        }
    }

    fn sample(kind: FieldKind, path: &str, counter: &mut usize) -> Value {
        *counter += 1;
        let n = *counter;
        match kind {
            FieldKind::Text => json!(format!("{}-{}", path, n)),
            FieldKind::Integer => json!(n as i64),
            FieldKind::Decimal => json!(n as f64 + 0.25),
            FieldKind::Boolean => json!(n % 2 == 0),
            FieldKind::Timestamp => json!(format!("2024-01-15T10:30:{:02}.123456789Z", n % 60)),
            FieldKind::Date => json!(format!("2024-04-{:02}", n % 28 + 1)),
            FieldKind::Records => unreachable!("list fields are filled through their item mapping"),
        }
    }

    fn without_metadata(record: &StandardRecord) -> Value {
        let mut value = record.to_value().unwrap();
        if let Value::Object(object) = &mut value {
            object.remove("metadata");
        }
        value
    }
}
