// 🧪 In-Memory Backend
// A fixture backend holding native payloads for one source system. Used by
// the tests and by the CLI `fetch` command.

use super::{Adapter, FetchRequest, Fetched, SendOperation};
use crate::error::{NormalizeError, Result};
use crate::filters::{ExternalCondition, FilterOp};
use crate::mapping::lookup;
use crate::registry::ConverterRegistry;
use crate::schema::{EntityType, RawRecord};
use async_trait::async_trait;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

const DEFAULT_ID_FIELD: &str = "id";

pub struct InMemoryAdapter {
    source_system: String,
    id_fields: HashMap<EntityType, String>,
    store: RwLock<HashMap<EntityType, Vec<RawRecord>>>,
}

impl InMemoryAdapter {
    pub fn new(source_system: impl Into<String>) -> Self {
        InMemoryAdapter {
            source_system: source_system.into(),
            id_fields: HashMap::new(),
            store: RwLock::new(HashMap::new()),
        }
    }

    /// Builder: backend field holding the identifier of `entity_type`
    pub fn with_id_field(mut self, entity_type: EntityType, field: impl Into<String>) -> Self {
        self.id_fields.insert(entity_type, field.into());
        self
    }

    /// Builder: take identifier fields from the registry's `id` mappings
    pub fn with_id_fields_from(mut self, registry: &ConverterRegistry) -> Self {
        for entity_type in registry.entity_types() {
            let field = registry
                .converter_for(entity_type)
                .ok()
                .and_then(|c| c.field_mapping(&self.source_system).and_then(|m| m.source_field("id")));
            if let Some(field) = field {
                self.id_fields.insert(entity_type, field.to_string());
            }
        }
        self
    }

    /// Builder: seed records of one entity type
    pub fn with_records(mut self, entity_type: EntityType, records: Vec<RawRecord>) -> Self {
        self.store.get_mut().entry(entity_type).or_default().extend(records);
        self
    }

    /// Seed from a fixture document `{"customer": [{...}], "product": [...]}`.
    pub fn from_fixture(source_system: impl Into<String>, fixture: &Value) -> Result<Self> {
        let mut adapter = InMemoryAdapter::new(source_system);
        let sections = fixture
            .as_object()
            .ok_or_else(|| NormalizeError::Config("fixture must be a JSON object keyed by entity type".to_string()))?;

        for (name, records) in sections {
            let entity_type: EntityType = name.parse()?;
            let records = records
                .as_array()
                .ok_or_else(|| NormalizeError::Config(format!("fixture section `{}` must be a list", name)))?
                .iter()
                .map(|record| {
                    record
                        .as_object()
                        .cloned()
                        .ok_or_else(|| NormalizeError::Config(format!("fixture section `{}` holds a non-object", name)))
                })
                .collect::<Result<Vec<_>>>()?;
            adapter = adapter.with_records(entity_type, records);
        }
        Ok(adapter)
    }

    pub async fn count(&self, entity_type: EntityType) -> usize {
        self.store.read().await.get(&entity_type).map(Vec::len).unwrap_or(0)
    }

    fn id_field(&self, entity_type: EntityType) -> &str {
        self.id_fields
            .get(&entity_type)
            .map(String::as_str)
            .unwrap_or(DEFAULT_ID_FIELD)
    }

    fn record_id(&self, entity_type: EntityType, record: &RawRecord) -> Option<String> {
        match lookup(record, self.id_field(entity_type))? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    fn not_found(&self, entity_type: EntityType, id: &str) -> NormalizeError {
        NormalizeError::NotFound {
            source_system: self.source_system.clone(),
            entity_type,
            id: id.to_string(),
        }
    }
}

#[async_trait]
impl Adapter for InMemoryAdapter {
    fn source_system(&self) -> &str {
        &self.source_system
    }

    async fn fetch(&self, entity_type: EntityType, request: &FetchRequest) -> Result<Fetched> {
        let store = self.store.read().await;
        let records = store.get(&entity_type).map(Vec::as_slice).unwrap_or(&[]);

        match request {
            FetchRequest::ById(id) => records
                .iter()
                .find(|r| self.record_id(entity_type, r).as_deref() == Some(id.as_str()))
                .cloned()
                .map(Fetched::One)
                .ok_or_else(|| self.not_found(entity_type, id)),
            FetchRequest::Search { filters, page, page_size } => {
                let matching: Vec<&RawRecord> = records
                    .iter()
                    .filter(|r| filters.conditions.iter().all(|c| matches(r, c)))
                    .collect();
                let page_size = (*page_size).max(1);
                let skip = page.saturating_sub(1).saturating_mul(page_size);

                debug!(
                    source_system = %self.source_system,
                    entity_type = %entity_type,
                    total = matching.len(),
                    "In-memory search"
                );
                Ok(Fetched::Page {
                    total: matching.len(),
                    records: matching.into_iter().skip(skip).take(page_size).cloned().collect(),
                })
            }
        }
    }

    async fn send(&self, entity_type: EntityType, operation: &SendOperation, payload: RawRecord) -> Result<RawRecord> {
        let id_field = self.id_field(entity_type).to_string();
        let mut store = self.store.write().await;
        let records = store.entry(entity_type).or_default();

        let position = |records: &[RawRecord], id: &str| {
            records
                .iter()
                .position(|r| self.record_id(entity_type, r).as_deref() == Some(id))
        };

        match operation {
            SendOperation::Create => {
                let mut record = payload;
                let id = match self.record_id(entity_type, &record) {
                    Some(id) => id,
                    None => {
                        let id = Uuid::new_v4().to_string();
                        crate::mapping::insert_path(&mut record, &id_field, Value::String(id.clone()));
                        id
                    }
                };
                if position(&records[..], &id).is_some() {
                    return Err(NormalizeError::Rejected {
                        source_system: self.source_system.clone(),
                        entity_type,
                        message: format!("duplicate identifier `{}`", id),
                    });
                }
                records.push(record.clone());
                debug!(source_system = %self.source_system, entity_type = %entity_type, id = %id, "Created record");
                Ok(record)
            }
            SendOperation::Update { id } => {
                let index = position(&records[..], id).ok_or_else(|| self.not_found(entity_type, id))?;
                let record = &mut records[index];
                for (key, value) in payload {
                    if key != id_field {
                        record.insert(key, value);
                    }
                }
                Ok(record.clone())
            }
            SendOperation::Delete { id } => {
                let index = position(&records[..], id).ok_or_else(|| self.not_found(entity_type, id))?;
                Ok(records.remove(index))
            }
        }
    }
}

// ============================================================================
// CONDITION MATCHING
// ============================================================================

fn matches(record: &RawRecord, condition: &ExternalCondition) -> bool {
    let actual = lookup(record, &condition.field).unwrap_or(&Value::Null);
    let expected = &condition.value;

    match condition.op {
        FilterOp::Eq => values_equal(actual, expected),
        FilterOp::Ne => !values_equal(actual, expected),
        FilterOp::Gt => compare(actual, expected) == Some(Ordering::Greater),
        FilterOp::Gte => matches!(compare(actual, expected), Some(Ordering::Greater | Ordering::Equal)),
        FilterOp::Lt => compare(actual, expected) == Some(Ordering::Less),
        FilterOp::Lte => matches!(compare(actual, expected), Some(Ordering::Less | Ordering::Equal)),
        FilterOp::Like => match (actual.as_str(), expected.as_str()) {
            (Some(text), Some(pattern)) => like(text, pattern),
            _ => false,
        },
        FilterOp::In => expected
            .as_array()
            .map(|values| values.iter().any(|v| values_equal(actual, v)))
            .unwrap_or(false),
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        // ERPNext stores check fields as 0/1
        (Value::Number(n), Value::Bool(flag)) | (Value::Bool(flag), Value::Number(n)) => {
            n.as_i64() == Some(i64::from(*flag))
        }
        _ => a == b,
    }
}

fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

/// SQL-style `LIKE`: `%` matches any run of characters, case-insensitive.
fn like(text: &str, pattern: &str) -> bool {
    let text = text.to_lowercase();
    let pattern = pattern.to_lowercase();
    let parts: Vec<&str> = pattern.split('%').collect();

    let Some((last, init)) = parts.split_last() else {
        return false;
    };
    let Some((first, middle)) = init.split_first() else {
        return text == pattern;
    };

    let Some(mut remaining) = text.strip_prefix(first) else {
        return false;
    };
    for part in middle {
        match remaining.find(part) {
            Some(at) => remaining = &remaining[at + part.len()..],
            None => return false,
        }
    }
    remaining.ends_with(last)
}
