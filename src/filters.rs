// 🔍 Filter Translation
// Canonical filter criteria → backend query conditions.

use crate::error::{ConversionError, ConversionFailure};
use crate::fields::{find_spec, to_canonical, to_external, FieldKind, FieldSpec};
use crate::mapping::FieldMapping;
use crate::schema::EntityType;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{json, Value};
use std::collections::BTreeMap;

// ============================================================================
// CANONICAL FILTERS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    Like,
    In,
}

impl FilterOp {
    /// Operator word used by object-style backends
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterOp::Eq => "eq",
            FilterOp::Ne => "ne",
            FilterOp::Gt => "gt",
            FilterOp::Gte => "gte",
            FilterOp::Lt => "lt",
            FilterOp::Lte => "lte",
            FilterOp::Like => "like",
            FilterOp::In => "in",
        }
    }

    /// Operator symbol used by ERPNext-style backends
    pub fn symbol(&self) -> &'static str {
        match self {
            FilterOp::Eq => "=",
            FilterOp::Ne => "!=",
            FilterOp::Gt => ">",
            FilterOp::Gte => ">=",
            FilterOp::Lt => "<",
            FilterOp::Lte => "<=",
            FilterOp::Like => "like",
            FilterOp::In => "in",
        }
    }
}

/// A criterion on one canonical field.
///
/// Deserializes from either `{"op": "gte", "value": 10}` or a bare value,
/// which means equality.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    Condition { op: FilterOp, value: Value },
    Equals(Value),
}

impl FilterValue {
    pub fn op(&self) -> FilterOp {
        match self {
            FilterValue::Condition { op, .. } => *op,
            FilterValue::Equals(_) => FilterOp::Eq,
        }
    }

    pub fn value(&self) -> &Value {
        match self {
            FilterValue::Condition { value, .. } | FilterValue::Equals(value) => value,
        }
    }
}

/// Canonical field name → criterion.
///
/// A key `<field>_from` / `<field>_to` whose base name is a mapped field
/// becomes an inclusive lower / upper bound on that field. Range keys take a
/// bare value; an explicit operator on one is rejected.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StandardFilters(BTreeMap<String, FilterValue>);

impl StandardFilters {
    pub fn new() -> Self {
        StandardFilters(BTreeMap::new())
    }

    /// Builder: equality on one field
    pub fn eq(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with(field, FilterValue::Equals(value.into()))
    }

    /// Builder: arbitrary operator on one field
    pub fn op(self, field: impl Into<String>, op: FilterOp, value: impl Into<Value>) -> Self {
        self.with(field, FilterValue::Condition { op, value: value.into() })
    }

    pub fn with(mut self, field: impl Into<String>, criterion: FilterValue) -> Self {
        self.0.insert(field.into(), criterion);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FilterValue)> {
        self.0.iter()
    }
}

// ============================================================================
// BACKEND FILTERS
// ============================================================================

/// Wire shape of a backend's filter list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterDialect {
    /// `[["Customer", "customer_name", "=", "Acme"]]`
    QualifiedArrays,
    /// `[{"field": "name", "operator": "eq", "value": "Acme"}]`
    FieldObjects,
}

/// One condition in backend vocabulary.
#[derive(Debug, Clone, PartialEq)]
pub struct ExternalCondition {
    /// Document type qualifying the field, for dialects that use one
    pub qualifier: String,
    pub field: String,
    pub op: FilterOp,
    pub value: Value,
}

/// Backend query conditions, serialized in the backend's dialect.
#[derive(Debug, Clone, PartialEq)]
pub struct ExternalFilters {
    pub dialect: FilterDialect,
    pub conditions: Vec<ExternalCondition>,
}

impl ExternalFilters {
    pub fn empty(dialect: FilterDialect) -> Self {
        ExternalFilters {
            dialect,
            conditions: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn to_json(&self) -> Value {
        let rendered = self
            .conditions
            .iter()
            .map(|c| match self.dialect {
                FilterDialect::QualifiedArrays => {
                    json!([c.qualifier, c.field, c.op.symbol(), c.value])
                }
                FilterDialect::FieldObjects => {
                    json!({"field": c.field, "operator": c.op.as_str(), "value": c.value})
                }
            })
            .collect();
        Value::Array(rendered)
    }
}

impl Serialize for ExternalFilters {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

// ============================================================================
// TRANSLATION
// ============================================================================

/// Translate canonical criteria through one backend's field mapping.
///
/// Every key must resolve to a mapped scalar field, directly or as a
/// `_from`/`_to` bound; anything else fails instead of being dropped.
pub fn translate(
    entity_type: EntityType,
    mapping: &FieldMapping,
    filters: &StandardFilters,
) -> Result<ExternalFilters, ConversionError> {
    let catalog = entity_type.catalog();
    let profile = mapping.profile();
    let qualifier = mapping
        .document_type()
        .unwrap_or_else(|| entity_type.as_str())
        .to_string();

    let mut conditions = Vec::with_capacity(filters.len());

    for (key, criterion) in filters.iter() {
        let fail = |failure| ConversionError::new(entity_type, mapping.source_system(), key.as_str(), failure);

        let (canonical, op) = resolve_key(mapping, key, criterion).ok_or_else(|| fail(ConversionFailure::UnsupportedFilter))?;
        let entry = mapping.entry(canonical).ok_or_else(|| fail(ConversionFailure::UnsupportedFilter))?;
        let spec = find_spec(catalog, canonical).ok_or_else(|| fail(ConversionFailure::UnsupportedFilter))?;
        if !spec.kind.is_scalar() || (op == FilterOp::Like && spec.kind != FieldKind::Text) {
            return Err(fail(ConversionFailure::UnsupportedFilter));
        }

        let render = |value: &Value| -> Result<Value, ConversionFailure> {
            render_value(spec, op, value, profile.timestamps).map(|v| entry.transform.apply(v))
        };

        let value = match (op, criterion.value()) {
            (FilterOp::In, Value::Array(values)) => {
                Value::Array(values.iter().map(render).collect::<Result<_, _>>().map_err(fail)?)
            }
            (FilterOp::In, other) => {
                return Err(fail(ConversionFailure::Shape(format!(
                    "`in` needs a list of values, got {}",
                    crate::fields::describe(other)
                ))))
            }
            (_, value) => render(value).map_err(fail)?,
        };

        conditions.push(ExternalCondition {
            qualifier: qualifier.clone(),
            field: entry.source.to_string(),
            op,
            value,
        });
    }

    Ok(ExternalFilters {
        dialect: profile.filters,
        conditions,
    })
}

fn resolve_key<'k>(mapping: &FieldMapping, key: &'k str, criterion: &FilterValue) -> Option<(&'k str, FilterOp)> {
    if mapping.entry(key).is_some() {
        return Some((key, criterion.op()));
    }
    if matches!(criterion, FilterValue::Condition { .. }) {
        return None;
    }
    if let Some(base) = key.strip_suffix("_from") {
        if mapping.entry(base).is_some() {
            return Some((base, FilterOp::Gte));
        }
    }
    if let Some(base) = key.strip_suffix("_to") {
        if mapping.entry(base).is_some() {
            return Some((base, FilterOp::Lte));
        }
    }
    None
}

fn render_value(
    spec: &FieldSpec,
    op: FilterOp,
    value: &Value,
    timestamps: crate::fields::TimestampFormat,
) -> Result<Value, ConversionFailure> {
    // patterns stay as given
    if op == FilterOp::Like {
        return match value {
            Value::String(_) => Ok(value.clone()),
            other => Err(ConversionFailure::TypeMismatch {
                expected: FieldKind::Text,
                found: crate::fields::describe(other),
            }),
        };
    }
    match to_canonical(spec.kind, value)? {
        Some(canonical) => to_external(spec.kind, &canonical, timestamps),
        None => Ok(Value::Null),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::{SourceProfile, ERP_NEXT};

    fn customer_mapping() -> FieldMapping {
        FieldMapping::new(ERP_NEXT, SourceProfile::erp_next())
            .with_document_type("Customer")
            .with_field("id", "name")
            .with_field("name", "customer_name")
            .with_field("credit_limit", "credit_limit")
            .with_field("created_at", "creation")
    }

    #[test]
    fn test_filter_value_deserializes_both_forms() {
        let filters: StandardFilters = serde_json::from_value(json!({
            "name": "Acme",
            "credit_limit": {"op": "gte", "value": 1000}
        }))
        .unwrap();

        let collected: Vec<_> = filters.iter().collect();
        assert_eq!(collected[0].1.op(), FilterOp::Gte);
        assert_eq!(collected[1].1, &FilterValue::Equals(json!("Acme")));
    }

    #[test]
    fn test_translate_renames_and_qualifies() {
        let filters = StandardFilters::new().eq("name", "Acme");
        let external = translate(EntityType::Customer, &customer_mapping(), &filters).unwrap();

        assert_eq!(external.to_json(), json!([["Customer", "customer_name", "=", "Acme"]]));
    }

    #[test]
    fn test_translate_object_dialect() {
        let mapping = FieldMapping::new("cloud_erp", SourceProfile::cloud_erp())
            .with_field("id", "id")
            .with_field("name", "name");
        let filters = StandardFilters::new().op("name", FilterOp::Like, "%acme%");

        let external = translate(EntityType::Customer, &mapping, &filters).unwrap();
        assert_eq!(
            external.to_json(),
            json!([{"field": "name", "operator": "like", "value": "%acme%"}])
        );
    }

    #[test]
    fn test_range_keys_become_bounds() {
        let filters = StandardFilters::new()
            .eq("created_at_from", "2024-01-01T00:00:00Z")
            .eq("created_at_to", "2024-01-31T23:59:59Z");

        let external = translate(EntityType::Customer, &customer_mapping(), &filters).unwrap();
        assert_eq!(
            external.to_json(),
            json!([
                ["Customer", "creation", ">=", "2024-01-01 00:00:00.000000"],
                ["Customer", "creation", "<=", "2024-01-31 23:59:59.000000"]
            ])
        );
    }

    #[test]
    fn test_range_key_with_explicit_operator_is_rejected() {
        let filters = StandardFilters::new().op("created_at_from", FilterOp::Lt, "2024-01-01T00:00:00Z");
        let err = translate(EntityType::Customer, &customer_mapping(), &filters).unwrap_err();

        assert_eq!(err.field, "created_at_from");
        assert_eq!(err.failure, ConversionFailure::UnsupportedFilter);
    }

    #[test]
    fn test_like_only_applies_to_text() {
        let filters = StandardFilters::new().op("credit_limit", FilterOp::Like, "10%");
        let err = translate(EntityType::Customer, &customer_mapping(), &filters).unwrap_err();

        assert_eq!(err.field, "credit_limit");
        assert_eq!(err.failure, ConversionFailure::UnsupportedFilter);
    }

    #[test]
    fn test_unmapped_field_fails() {
        let filters = StandardFilters::new().eq("favourite_colour", "blue");
        let err = translate(EntityType::Customer, &customer_mapping(), &filters).unwrap_err();

        assert_eq!(err.field, "favourite_colour");
        assert_eq!(err.failure, ConversionFailure::UnsupportedFilter);
    }

    #[test]
    fn test_filter_value_is_coerced_to_field_kind() {
        let filters = StandardFilters::new().op("credit_limit", FilterOp::Gt, "1000");
        let external = translate(EntityType::Customer, &customer_mapping(), &filters).unwrap();
        assert_eq!(external.conditions[0].value, json!(1000.0));

        let bad = StandardFilters::new().op("credit_limit", FilterOp::Gt, "lots");
        assert!(translate(EntityType::Customer, &customer_mapping(), &bad).is_err());
    }

    #[test]
    fn test_in_requires_list() {
        let filters = StandardFilters::new().op("name", FilterOp::In, json!(["A", "B"]));
        let external = translate(EntityType::Customer, &customer_mapping(), &filters).unwrap();
        assert_eq!(external.conditions[0].value, json!(["A", "B"]));

        let bad = StandardFilters::new().op("name", FilterOp::In, "A");
        assert!(translate(EntityType::Customer, &customer_mapping(), &bad).is_err());
    }
}
