// ⚠️ Error Taxonomy
// Every failure that crosses the core boundary carries its kind, backend and
// entity type so callers can map it without reading message text.

use crate::fields::FieldKind;
use crate::schema::EntityType;
use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, NormalizeError>;

// ============================================================================
// CONVERSION ERRORS
// ============================================================================

/// Why a single field could not be converted.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConversionFailure {
    #[error("expected {expected}, found {found}")]
    TypeMismatch { expected: FieldKind, found: String },

    #[error("record has no identifier")]
    MissingIdentifier,

    #[error("field cannot be used as a filter for this backend")]
    UnsupportedFilter,

    #[error("{0}")]
    Shape(String),
}

/// A value could not be coerced between the canonical and backend shapes.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("cannot convert {entity_type} field `{field}` for {source_system}: {failure}")]
pub struct ConversionError {
    pub entity_type: EntityType,
    pub source_system: String,
    pub field: String,
    pub failure: ConversionFailure,
}

impl ConversionError {
    pub fn new(
        entity_type: EntityType,
        source_system: impl Into<String>,
        field: impl Into<String>,
        failure: ConversionFailure,
    ) -> Self {
        ConversionError {
            entity_type,
            source_system: source_system.into(),
            field: field.into(),
            failure,
        }
    }
}

// ============================================================================
// ERROR KINDS
// ============================================================================

/// Coarse classification used by the resilience policy and the API layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Conversion,
    UnknownEntity,
    Configuration,
    Adapter,
    RateLimit,
    NotFound,
    Validation,
    RetryExhausted,
    Timeout,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Conversion => "conversion",
            ErrorKind::UnknownEntity => "unknown_entity",
            ErrorKind::Configuration => "configuration",
            ErrorKind::Adapter => "adapter",
            ErrorKind::RateLimit => "rate_limit",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Validation => "validation",
            ErrorKind::RetryExhausted => "retry_exhausted",
            ErrorKind::Timeout => "timeout",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// TOP-LEVEL ERROR
// ============================================================================

#[derive(Error, Debug)]
pub enum NormalizeError {
    #[error(transparent)]
    Conversion(#[from] ConversionError),

    #[error("no converter registered for entity type `{entity_type}`")]
    UnknownEntity { entity_type: String },

    #[error("no mapping or adapter for source system `{source_system}` ({entity_type})")]
    UnknownSourceSystem {
        entity_type: String,
        source_system: String,
    },

    #[error("invalid {entity_type} mapping for {source_system}: {reason}")]
    InvalidMapping {
        entity_type: EntityType,
        source_system: String,
        reason: String,
    },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("{source_system} failed handling {entity_type}: {message}")]
    Adapter {
        source_system: String,
        entity_type: EntityType,
        message: String,
    },

    #[error("{source_system} is throttling {entity_type} requests")]
    RateLimited {
        source_system: String,
        entity_type: EntityType,
        retry_after: Option<Duration>,
    },

    #[error("{entity_type} `{id}` not found in {source_system}")]
    NotFound {
        source_system: String,
        entity_type: EntityType,
        id: String,
    },

    #[error("{source_system} rejected {entity_type}: {message}")]
    Rejected {
        source_system: String,
        entity_type: EntityType,
        message: String,
    },

    #[error("gave up after {attempts} attempt(s): {last}")]
    RetryExhausted {
        attempts: u32,
        #[source]
        last: Box<NormalizeError>,
    },

    #[error("request timed out after {after:?} ({attempts} attempt(s) started)")]
    Timeout { after: Duration, attempts: u32 },
}

impl NormalizeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            NormalizeError::Conversion(_) => ErrorKind::Conversion,
            NormalizeError::UnknownEntity { .. } => ErrorKind::UnknownEntity,
            NormalizeError::UnknownSourceSystem { .. }
            | NormalizeError::InvalidMapping { .. }
            | NormalizeError::Config(_) => ErrorKind::Configuration,
            NormalizeError::Adapter { .. } => ErrorKind::Adapter,
            NormalizeError::RateLimited { .. } => ErrorKind::RateLimit,
            NormalizeError::NotFound { .. } => ErrorKind::NotFound,
            NormalizeError::Rejected { .. } => ErrorKind::Validation,
            NormalizeError::RetryExhausted { .. } => ErrorKind::RetryExhausted,
            NormalizeError::Timeout { .. } => ErrorKind::Timeout,
        }
    }

    /// Kind of the underlying failure, looking through `RetryExhausted`.
    pub fn root_kind(&self) -> ErrorKind {
        self.last_error().kind()
    }

    /// The failure that ended a retry sequence, or `self`.
    pub fn last_error(&self) -> &NormalizeError {
        match self {
            NormalizeError::RetryExhausted { last, .. } => last.last_error(),
            other => other,
        }
    }

    /// Number of attempts made, when the error came out of the resilience policy.
    pub fn attempts(&self) -> Option<u32> {
        match self {
            NormalizeError::RetryExhausted { attempts, .. }
            | NormalizeError::Timeout { attempts, .. } => Some(*attempts),
            _ => None,
        }
    }

    pub fn source_system(&self) -> Option<&str> {
        match self.last_error() {
            NormalizeError::Conversion(e) => Some(&e.source_system),
            NormalizeError::UnknownSourceSystem { source_system, .. }
            | NormalizeError::InvalidMapping { source_system, .. }
            | NormalizeError::Adapter { source_system, .. }
            | NormalizeError::RateLimited { source_system, .. }
            | NormalizeError::NotFound { source_system, .. }
            | NormalizeError::Rejected { source_system, .. } => Some(source_system),
            _ => None,
        }
    }

    pub fn entity_type(&self) -> Option<String> {
        match self.last_error() {
            NormalizeError::Conversion(e) => Some(e.entity_type.to_string()),
            NormalizeError::UnknownEntity { entity_type }
            | NormalizeError::UnknownSourceSystem { entity_type, .. } => Some(entity_type.clone()),
            NormalizeError::InvalidMapping { entity_type, .. }
            | NormalizeError::Adapter { entity_type, .. }
            | NormalizeError::RateLimited { entity_type, .. }
            | NormalizeError::NotFound { entity_type, .. }
            | NormalizeError::Rejected { entity_type, .. } => Some(entity_type.to_string()),
            _ => None,
        }
    }

    /// Backend-suggested wait before retrying, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            NormalizeError::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}
