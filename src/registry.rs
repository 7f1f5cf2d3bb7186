// 📚 Converter Registry
// entity type → converter, built once at start-up and read-only afterwards.

use crate::converter::EntityConverter;
use crate::entities::{CustomerConverter, InvoiceConverter, ProductConverter, QuotationConverter};
use crate::error::{NormalizeError, Result};
use crate::schema::EntityType;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

#[derive(Clone)]
pub struct ConverterRegistry {
    converters: BTreeMap<EntityType, Arc<dyn EntityConverter>>,
}

impl ConverterRegistry {
    /// Registry with every built-in converter, mappings validated.
    pub fn new() -> Result<Self> {
        let mut registry = Self::empty();
        registry.register_default_converters()?;

        info!(
            entity_types = ?registry.entity_types(),
            "Converter registry initialized"
        );
        Ok(registry)
    }

    /// Registry with no converters, for assembling a custom set
    pub fn empty() -> Self {
        ConverterRegistry {
            converters: BTreeMap::new(),
        }
    }

    fn register_default_converters(&mut self) -> Result<()> {
        self.register(Arc::new(CustomerConverter::new()))?;
        self.register(Arc::new(ProductConverter::new()))?;
        self.register(Arc::new(QuotationConverter::new()))?;
        self.register(Arc::new(InvoiceConverter::new()))?;
        Ok(())
    }

    /// Validate a converter's mapping table and add it, replacing any
    /// converter already registered for the same entity type.
    pub fn register(&mut self, converter: Arc<dyn EntityConverter>) -> Result<()> {
        let table = converter.mapping_table();
        if table.entity_type() != converter.entity_type() {
            return Err(NormalizeError::InvalidMapping {
                entity_type: converter.entity_type(),
                source_system: "*".to_string(),
                reason: format!("mapping table describes {}", table.entity_type()),
            });
        }
        table.validate()?;

        self.converters.insert(converter.entity_type(), converter);
        Ok(())
    }

    /// Converter for an entity type given by name (`"customer"`, ...).
    pub fn get_converter(&self, entity_type: &str) -> Result<Arc<dyn EntityConverter>> {
        let parsed: EntityType = entity_type.parse()?;
        self.converters
            .get(&parsed)
            .cloned()
            .ok_or_else(|| NormalizeError::UnknownEntity {
                entity_type: entity_type.to_string(),
            })
    }

    pub fn converter_for(&self, entity_type: EntityType) -> Result<Arc<dyn EntityConverter>> {
        self.converters
            .get(&entity_type)
            .cloned()
            .ok_or_else(|| NormalizeError::UnknownEntity {
                entity_type: entity_type.to_string(),
            })
    }

    pub fn entity_types(&self) -> Vec<EntityType> {
        self.converters.keys().copied().collect()
    }
}
