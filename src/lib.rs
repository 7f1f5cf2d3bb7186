// ERP Normalizer - Core Library
// Exposes all modules for use in the CLI, an API layer, and tests

pub mod error;
pub mod fields;      // Field kinds + value coercion
pub mod schema;      // Canonical records + field catalogs
pub mod mapping;     // Declarative field mapping tables
pub mod filters;     // Canonical filters → backend filter dialects
pub mod converter;   // EntityConverter trait + shared conversion engine
pub mod entities;    // One converter per entity type
pub mod registry;
pub mod resilience;  // Retry with bounded exponential backoff
pub mod adapter;     // Backend transport seam
pub mod service;
pub mod config;
pub mod logging;

// Re-export commonly used types
pub use error::{ConversionError, ConversionFailure, ErrorKind, NormalizeError, Result};
pub use fields::{FieldKind, FieldSpec, TimestampFormat};
pub use schema::{
    Address, ContactInfo, Customer, EntityType, Invoice, InvoiceItem, Metadata,
    Product, ProductAttribute, Quotation, QuotationItem, RawRecord, StandardRecord,
};
pub use mapping::{
    FieldMapping, ItemMapping, ListShape, MappingEntry, MappingTable, SourceProfile,
    Transform, CLOUD_ERP, ERP_NEXT,
};
pub use filters::{ExternalFilters, FilterDialect, FilterOp, FilterValue, StandardFilters};
pub use converter::EntityConverter;
pub use entities::{CustomerConverter, InvoiceConverter, ProductConverter, QuotationConverter};
pub use registry::ConverterRegistry;
pub use resilience::{ResiliencePolicy, RetryConfig};
pub use adapter::{Adapter, FetchRequest, Fetched, InMemoryAdapter, SendOperation};
pub use service::{NormalizationService, NormalizationServiceBuilder, RecordPage};
pub use config::{AdapterRouting, Settings};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
