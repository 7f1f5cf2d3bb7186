// 📦 Product Converter
//
// ERPNext Items are flagged `disabled` rather than active, and carry their
// attributes as a child table. The cloud ERP sends attributes as a plain
// name → value object.

use crate::converter::EntityConverter;
use crate::mapping::{FieldMapping, ItemMapping, MappingEntry, MappingTable, SourceProfile, CLOUD_ERP, ERP_NEXT};
use crate::schema::EntityType;

pub struct ProductConverter {
    table: MappingTable,
}

impl ProductConverter {
    pub fn new() -> Self {
        ProductConverter {
            table: MappingTable::new(EntityType::Product)
                .with_mapping(erp_next())
                .with_mapping(cloud_erp()),
        }
    }
}

impl Default for ProductConverter {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityConverter for ProductConverter {
    fn entity_type(&self) -> EntityType {
        EntityType::Product
    }

    fn mapping_table(&self) -> &MappingTable {
        &self.table
    }
}

fn erp_next() -> FieldMapping {
    FieldMapping::new(ERP_NEXT, SourceProfile::erp_next())
        .with_document_type("Item")
        .with_field("id", "name")
        .with_field("name", "item_name")
        .with_field("sku", "item_code")
        .with_field("description", "description")
        .with_field("category", "item_group")
        .with_field("price", "standard_rate")
        .with_field("cost", "valuation_rate")
        .with_field("tax_rate", "tax_rate")
        .with_field("stock_quantity", "actual_qty")
        .with_field("unit_of_measure", "stock_uom")
        .with_inverted_field("is_active", "disabled")
        .with_records(
            "attributes",
            "attributes",
            ItemMapping::array(vec![
                MappingEntry::field("name", "attribute"),
                MappingEntry::field("value", "attribute_value"),
            ]),
        )
        .with_field("created_at", "creation")
        .with_field("updated_at", "modified")
}

fn cloud_erp() -> FieldMapping {
    FieldMapping::new(CLOUD_ERP, SourceProfile::cloud_erp())
        .with_field("id", "product_id")
        .with_field("name", "product_name")
        .with_field("sku", "sku")
        .with_field("description", "description")
        .with_field("category", "category")
        .with_field("price", "price")
        .with_field("cost", "cost")
        .with_field("tax_rate", "tax_percentage")
        .with_field("stock_quantity", "quantity_in_stock")
        .with_field("unit_of_measure", "uom")
        .with_field("is_active", "active")
        .with_records("attributes", "attributes", ItemMapping::keyed("name", "value"))
        .with_field("created_at", "created_date")
        .with_field("updated_at", "last_modified_date")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::fixtures::{assert_full_round_trip, raw};
    use crate::error::{ConversionFailure, NormalizeError};
    use crate::filters::{FilterOp, StandardFilters};
    use crate::schema::{Product, ProductAttribute, StandardRecord};
    use serde_json::{json, Value};

    fn product(record: StandardRecord) -> Product {
        match record {
            StandardRecord::Product(p) => p,
            other => panic!("expected product, got {:?}", other),
        }
    }

    fn attribute(name: &str, value: &str) -> ProductAttribute {
        ProductAttribute {
            name: Some(name.to_string()),
            value: Some(value.to_string()),
        }
    }

    #[test]
    fn test_disabled_is_inverted_to_is_active() {
        let converter = ProductConverter::new();

        let enabled = raw(json!({"name": "ITEM-1", "disabled": 0}));
        assert_eq!(product(converter.external_to_standard(ERP_NEXT, &enabled).unwrap()).is_active, Some(true));

        let disabled = raw(json!({"name": "ITEM-2", "disabled": 1}));
        assert_eq!(product(converter.external_to_standard(ERP_NEXT, &disabled).unwrap()).is_active, Some(false));

        let unknown = raw(json!({"name": "ITEM-3"}));
        assert_eq!(product(converter.external_to_standard(ERP_NEXT, &unknown).unwrap()).is_active, None);
    }

    #[test]
    fn test_is_active_is_inverted_on_the_way_out() {
        let record = StandardRecord::Product(Product {
            sku: Some("SKU-9".to_string()),
            is_active: Some(true),
            ..Default::default()
        });

        let external = ProductConverter::new().standard_to_external(ERP_NEXT, &record).unwrap();
        assert_eq!(external.get("disabled"), Some(&json!(false)));
        assert_eq!(external.get("doctype"), Some(&json!("Item")));
    }

    #[test]
    fn test_is_active_filter_is_inverted() {
        let filters = StandardFilters::new().eq("is_active", true);
        let external = ProductConverter::new()
            .convert_filters(ERP_NEXT, EntityType::Product, &filters)
            .unwrap();

        assert_eq!(external.to_json(), json!([["Item", "disabled", "=", false]]));
    }

    #[test]
    fn test_erp_next_attributes_round_trip() {
        let payload = raw(json!({
            "name": "ITEM-7",
            "item_code": "TSHIRT-RED-M",
            "standard_rate": 19.9,
            "actual_qty": "12",
            "attributes": [
                {"attribute": "Colour", "attribute_value": "Red"},
                {"attribute": "Size", "attribute_value": "M"}
            ]
        }));
        let converter = ProductConverter::new();

        let record = converter.external_to_standard(ERP_NEXT, &payload).unwrap();
        let p = product(record.clone());
        assert_eq!(p.attributes, vec![attribute("Colour", "Red"), attribute("Size", "M")]);
        assert_eq!(p.stock_quantity, Some(12));

        let back = converter.standard_to_external(ERP_NEXT, &record).unwrap();
        assert_eq!(back.get("attributes"), payload.get("attributes"));
    }

    #[test]
    fn test_cloud_erp_keyed_attributes_round_trip() {
        let payload = raw(json!({
            "product_id": "p-1",
            "product_name": "Mug",
            "active": true,
            "attributes": {"Colour": "Blue", "Material": "Ceramic"}
        }));
        let converter = ProductConverter::new();

        let record = converter.external_to_standard(CLOUD_ERP, &payload).unwrap();
        assert_eq!(
            product(record.clone()).attributes,
            vec![attribute("Colour", "Blue"), attribute("Material", "Ceramic")]
        );

        let back = converter.standard_to_external(CLOUD_ERP, &record).unwrap();
        assert_eq!(Value::Object(back), Value::Object(payload));
    }

    #[test]
    fn test_attributes_with_wrong_shape_fail() {
        let payload = raw(json!({"product_id": "p-1", "attributes": ["Colour"]}));
        assert!(ProductConverter::new().external_to_standard(CLOUD_ERP, &payload).is_err());
    }

    #[test]
    fn test_price_range_filter() {
        let filters = StandardFilters::new()
            .op("price", FilterOp::Gte, 10)
            .eq("price_to", 50);
        let external = ProductConverter::new()
            .convert_filters(CLOUD_ERP, EntityType::Product, &filters)
            .unwrap();

        assert_eq!(
            external.to_json(),
            json!([
                {"field": "price", "operator": "gte", "value": 10.0},
                {"field": "price", "operator": "lte", "value": 50.0}
            ])
        );
    }

    #[test]
    fn test_duplicate_attribute_names_cannot_become_keys() {
        let record = StandardRecord::Product(Product {
            id: Some("p-1".to_string()),
            attributes: vec![attribute("Colour", "Red"), attribute("Colour", "Blue")],
            ..Default::default()
        });
        let err = ProductConverter::new().standard_to_external(CLOUD_ERP, &record).unwrap_err();

        match err {
            NormalizeError::Conversion(e) => {
                assert_eq!(e.field, "attributes[1].name");
                assert!(matches!(e.failure, ConversionFailure::Shape(_)));
            }
            other => panic!("expected conversion error, got {:?}", other),
        }

        assert!(ProductConverter::new().standard_to_external(ERP_NEXT, &record).is_ok());
    }

    #[test]
    fn test_full_round_trip_erp_next() {
        assert_full_round_trip(&ProductConverter::new(), ERP_NEXT);
    }

    #[test]
    fn test_full_round_trip_cloud_erp() {
        assert_full_round_trip(&ProductConverter::new(), CLOUD_ERP);
    }

    #[test]
    fn test_mapping_table_is_valid() {
        assert!(ProductConverter::new().mapping_table().validate().is_ok());
    }
}
