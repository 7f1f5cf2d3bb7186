// 🔤 Field Kinds & Coercion
// Typed canonical fields and the value coercions between backend JSON and
// canonical JSON, in both directions.

use crate::error::ConversionFailure;
use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use serde_json::{Number, Value};

// ============================================================================
// FIELD KINDS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    Text,
    Integer,
    Decimal,
    Boolean,
    Timestamp,
    Date,
    /// List of nested records, converted with an item mapping
    Records,
}

impl FieldKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldKind::Text => "text",
            FieldKind::Integer => "integer",
            FieldKind::Decimal => "decimal",
            FieldKind::Boolean => "boolean",
            FieldKind::Timestamp => "timestamp",
            FieldKind::Date => "date",
            FieldKind::Records => "list of records",
        }
    }

    pub fn is_scalar(&self) -> bool {
        !matches!(self, FieldKind::Records)
    }
}

impl std::fmt::Display for FieldKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One typed field of a canonical record.
///
/// `path` is dot-separated for fields inside nested structures
/// (`contact_info.address.city`). `items` describes the element fields of a
/// `Records` field and is empty for scalars.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldSpec {
    pub path: &'static str,
    pub kind: FieldKind,
    pub items: &'static [FieldSpec],
}

impl FieldSpec {
    pub const fn new(path: &'static str, kind: FieldKind) -> Self {
        FieldSpec {
            path,
            kind,
            items: &[],
        }
    }

    pub const fn records(path: &'static str, items: &'static [FieldSpec]) -> Self {
        FieldSpec {
            path,
            kind: FieldKind::Records,
            items,
        }
    }
}

/// Look up a field by its canonical path.
pub fn find_spec<'a>(catalog: &'a [FieldSpec], path: &str) -> Option<&'a FieldSpec> {
    catalog.iter().find(|spec| spec.path == path)
}

// ============================================================================
// TIMESTAMP FORMATS
// ============================================================================

/// How a backend renders timestamps on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimestampFormat {
    /// `2024-01-15T10:30:00Z`
    Rfc3339,
    /// `2024-01-15 10:30:00.000000`, implicitly UTC. Nine fraction digits
    /// when the value carries sub-microsecond precision.
    NaiveUtc,
}

impl TimestampFormat {
    pub fn render(&self, ts: &DateTime<Utc>) -> String {
        match self {
            TimestampFormat::Rfc3339 => ts.to_rfc3339_opts(SecondsFormat::AutoSi, true),
            TimestampFormat::NaiveUtc if ts.timestamp_subsec_nanos() % 1_000 != 0 => {
                ts.format("%Y-%m-%d %H:%M:%S%.9f").to_string()
            }
            TimestampFormat::NaiveUtc => ts.format("%Y-%m-%d %H:%M:%S%.6f").to_string(),
        }
    }
}

// ============================================================================
// BACKEND → CANONICAL
// ============================================================================

/// Coerce a backend value into the canonical JSON form of `kind`.
///
/// `Ok(None)` means the value counts as absent (null, or an empty string for
/// non-text kinds) and the canonical field stays unset.
pub fn to_canonical(kind: FieldKind, value: &Value) -> Result<Option<Value>, ConversionFailure> {
    if value.is_null() {
        return Ok(None);
    }
    if kind != FieldKind::Text && value.as_str().map(|s| s.trim().is_empty()).unwrap_or(false) {
        return Ok(None);
    }

    let coerced = match kind {
        FieldKind::Text => match value {
            Value::String(s) => Value::String(s.clone()),
            Value::Number(n) => Value::String(n.to_string()),
            Value::Bool(b) => Value::String(b.to_string()),
            _ => return Err(mismatch(kind, value)),
        },
        FieldKind::Integer => Value::Number(Number::from(parse_integer(value).ok_or_else(|| mismatch(kind, value))?)),
        FieldKind::Decimal => {
            let n = parse_decimal(value).ok_or_else(|| mismatch(kind, value))?;
            Value::Number(Number::from_f64(n).ok_or_else(|| mismatch(kind, value))?)
        }
        FieldKind::Boolean => Value::Bool(parse_boolean(value).ok_or_else(|| mismatch(kind, value))?),
        FieldKind::Timestamp => {
            let ts = parse_timestamp(value).ok_or_else(|| mismatch(kind, value))?;
            Value::String(TimestampFormat::Rfc3339.render(&ts))
        }
        FieldKind::Date => {
            let date = parse_date(value).ok_or_else(|| mismatch(kind, value))?;
            Value::String(date.format("%Y-%m-%d").to_string())
        }
        FieldKind::Records => {
            return Err(ConversionFailure::Shape(
                "list fields are converted through their item mapping".to_string(),
            ))
        }
    };

    Ok(Some(coerced))
}

fn parse_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
                .map(|f| f as i64)
        }),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>().ok().or_else(|| {
                s.parse::<f64>()
                    .ok()
                    .filter(|f| f.is_finite() && f.fract() == 0.0 && f.abs() < i64::MAX as f64)
                    .map(|f| f as i64)
            })
        }
        _ => None,
    }
}

fn parse_decimal(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    n.is_finite().then_some(n)
}

fn parse_boolean(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => match n.as_i64() {
            Some(0) => Some(false),
            Some(1) => Some(true),
            _ => None,
        },
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "true" | "yes" | "1" => Some(true),
            "false" | "no" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// Accepts RFC 3339, `YYYY-MM-DD HH:MM:SS[.f]` (UTC), bare dates (midnight
/// UTC) and integer Unix seconds.
pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(n) => DateTime::<Utc>::from_timestamp(n.as_i64()?, 0),
        Value::String(s) => {
            let s = s.trim();
            if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
                return Some(ts.with_timezone(&Utc));
            }
            for fmt in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
                if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
                    return Some(Utc.from_utc_datetime(&naive));
                }
            }
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|naive| Utc.from_utc_datetime(&naive))
        }
        _ => None,
    }
}

/// Accepts `YYYY-MM-DD`, `DD-MM-YYYY`, `MM/DD/YYYY` and the date part of a
/// timestamp.
pub fn parse_date(value: &Value) -> Option<NaiveDate> {
    let s = value.as_str()?.trim();
    for fmt in ["%Y-%m-%d", "%d-%m-%Y", "%m/%d/%Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(s, fmt) {
            return Some(date);
        }
    }
    parse_timestamp(value).map(|ts| ts.date_naive())
}

// ============================================================================
// CANONICAL → BACKEND
// ============================================================================

/// Render a canonical JSON value in the shape a backend expects.
pub fn to_external(
    kind: FieldKind,
    value: &Value,
    timestamps: TimestampFormat,
) -> Result<Value, ConversionFailure> {
    let rendered = match (kind, value) {
        (FieldKind::Text, Value::String(_)) => value.clone(),
        (FieldKind::Integer, Value::Number(n)) if n.as_i64().is_some() => value.clone(),
        (FieldKind::Decimal, Value::Number(_)) => value.clone(),
        (FieldKind::Boolean, Value::Bool(_)) => value.clone(),
        (FieldKind::Timestamp, Value::String(_)) => {
            let ts = parse_timestamp(value).ok_or_else(|| mismatch(kind, value))?;
            Value::String(timestamps.render(&ts))
        }
        (FieldKind::Date, Value::String(_)) => {
            let date = parse_date(value).ok_or_else(|| mismatch(kind, value))?;
            Value::String(date.format("%Y-%m-%d").to_string())
        }
        _ => return Err(mismatch(kind, value)),
    };
    Ok(rendered)
}

fn mismatch(expected: FieldKind, found: &Value) -> ConversionFailure {
    ConversionFailure::TypeMismatch {
        expected,
        found: describe(found),
    }
}

/// Short rendering of a value for error messages.
pub fn describe(value: &Value) -> String {
    let rendered = value.to_string();
    if rendered.chars().count() > 40 {
        let head: String = rendered.chars().take(37).collect();
        format!("{}...", head)
    } else {
        rendered
    }
}
