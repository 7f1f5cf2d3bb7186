// 🔌 Backend Adapters
// The transport seam: one adapter per source system, speaking that backend's
// native payloads. Adapters never see canonical records.

pub mod memory;

use crate::error::{NormalizeError, Result};
use crate::filters::ExternalFilters;
use crate::schema::{EntityType, RawRecord};
use async_trait::async_trait;

pub use memory::InMemoryAdapter;

/// What to read from a backend.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchRequest {
    ById(String),
    Search {
        filters: ExternalFilters,
        /// 1-based
        page: usize,
        page_size: usize,
    },
}

/// What a backend returned.
#[derive(Debug, Clone, PartialEq)]
pub enum Fetched {
    One(RawRecord),
    Page { total: usize, records: Vec<RawRecord> },
}

impl Fetched {
    /// The single record of a by-id fetch.
    pub fn into_one(self, source_system: &str, entity_type: EntityType, id: &str) -> Result<RawRecord> {
        match self {
            Fetched::One(record) => Ok(record),
            Fetched::Page { records, .. } => {
                records
                    .into_iter()
                    .next()
                    .ok_or_else(|| NormalizeError::NotFound {
                        source_system: source_system.to_string(),
                        entity_type,
                        id: id.to_string(),
                    })
            }
        }
    }

    /// `(total, records)` of a search.
    pub fn into_page(self) -> (usize, Vec<RawRecord>) {
        match self {
            Fetched::One(record) => (1, vec![record]),
            Fetched::Page { total, records } => (total, records),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOperation {
    Create,
    Update { id: String },
    Delete { id: String },
}

impl SendOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            SendOperation::Create => "create",
            SendOperation::Update { .. } => "update",
            SendOperation::Delete { .. } => "delete",
        }
    }
}

/// Transport to one backend.
///
/// Failures use the shared taxonomy: `Adapter` for transport/server errors,
/// `RateLimited` for throttling, `NotFound`, and `Rejected` for payloads the
/// backend refused. The resilience policy decides which of these to retry.
#[async_trait]
pub trait Adapter: Send + Sync {
    fn source_system(&self) -> &str;

    async fn fetch(&self, entity_type: EntityType, request: &FetchRequest) -> Result<Fetched>;

    /// Write a backend-native payload and return the backend's view of the
    /// record afterwards (for deletes, the record that was removed).
    async fn send(&self, entity_type: EntityType, operation: &SendOperation, payload: RawRecord) -> Result<RawRecord>;
}
