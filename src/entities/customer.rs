// 👤 Customer Converter
//
// ERPNext keeps the primary address flat on the Customer document; the cloud
// ERP nests it under `billing_address`.

use crate::converter::EntityConverter;
use crate::mapping::{FieldMapping, MappingTable, SourceProfile, CLOUD_ERP, ERP_NEXT};
use crate::schema::EntityType;

pub struct CustomerConverter {
    table: MappingTable,
}

impl CustomerConverter {
    pub fn new() -> Self {
        CustomerConverter {
            table: MappingTable::new(EntityType::Customer)
                .with_mapping(erp_next())
                .with_mapping(cloud_erp()),
        }
    }
}

impl Default for CustomerConverter {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityConverter for CustomerConverter {
    fn entity_type(&self) -> EntityType {
        EntityType::Customer
    }

    fn mapping_table(&self) -> &MappingTable {
        &self.table
    }
}

fn erp_next() -> FieldMapping {
    FieldMapping::new(ERP_NEXT, SourceProfile::erp_next())
        .with_document_type("Customer")
        .with_field("id", "name")
        .with_field("name", "customer_name")
        .with_field("customer_type", "customer_type")
        .with_field("status", "status")
        .with_field("contact_info.email", "email_id")
        .with_field("contact_info.phone", "phone")
        .with_field("contact_info.mobile", "mobile_no")
        .with_field("contact_info.website", "website")
        .with_field("contact_info.address.street1", "address_line1")
        .with_field("contact_info.address.street2", "address_line2")
        .with_field("contact_info.address.city", "city")
        .with_field("contact_info.address.state", "state")
        .with_field("contact_info.address.postal_code", "pincode")
        .with_field("contact_info.address.country", "country")
        .with_field("tax_id", "tax_id")
        .with_field("credit_limit", "credit_limit")
        .with_field("notes", "notes")
        .with_field("customer_group", "customer_group")
        .with_field("territory", "territory")
        .with_field("default_currency", "default_currency")
        .with_field("language", "language")
        .with_field("owner", "owner")
        .with_field("modified_by", "modified_by")
        .with_field("docstatus", "docstatus")
        .with_field("created_at", "creation")
        .with_field("updated_at", "modified")
}

fn cloud_erp() -> FieldMapping {
    FieldMapping::new(CLOUD_ERP, SourceProfile::cloud_erp())
        .with_field("id", "customer_id")
        .with_field("name", "name")
        .with_field("customer_type", "type")
        .with_field("status", "status")
        .with_field("contact_info.email", "email_address")
        .with_field("contact_info.phone", "phone_number")
        .with_field("contact_info.mobile", "mobile_number")
        .with_field("contact_info.website", "web_site")
        .with_field("contact_info.address.street1", "billing_address.street")
        .with_field("contact_info.address.street2", "billing_address.street2")
        .with_field("contact_info.address.city", "billing_address.city")
        .with_field("contact_info.address.state", "billing_address.state")
        .with_field("contact_info.address.postal_code", "billing_address.zip")
        .with_field("contact_info.address.country", "billing_address.country")
        .with_field("tax_id", "tax_identifier")
        .with_field("credit_limit", "credit_limit_amount")
        .with_field("notes", "customer_notes")
        .with_field("created_at", "created_date")
        .with_field("updated_at", "last_modified_date")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::fixtures::{assert_full_round_trip, raw};
    use crate::error::{ConversionFailure, NormalizeError};
    use crate::filters::StandardFilters;
    use crate::schema::{Address, StandardRecord};
    use chrono::{TimeZone, Utc};
    use serde_json::{json, Value};

    fn customer(record: StandardRecord) -> crate::schema::Customer {
        match record {
            StandardRecord::Customer(c) => c,
            other => panic!("expected customer, got {:?}", other),
        }
    }

    #[test]
    fn test_erp_next_customer_to_standard() {
        let payload = raw(json!({
            "name": "CUST-0001",
            "customer_name": "Acme Ltd",
            "customer_type": "Company",
            "email_id": "billing@acme.test",
            "credit_limit": "15000.00",
            "city": "Lyon",
            "pincode": "69001",
            "docstatus": 0,
            "creation": "2024-01-15 10:30:00.000000",
            "naming_series": "CUST-.####"
        }));

        let c = customer(CustomerConverter::new().external_to_standard(ERP_NEXT, &payload).unwrap());

        assert_eq!(c.id.as_deref(), Some("CUST-0001"));
        assert_eq!(c.name.as_deref(), Some("Acme Ltd"));
        assert_eq!(c.contact_info.email.as_deref(), Some("billing@acme.test"));
        assert_eq!(c.credit_limit, Some(15000.0));
        assert_eq!(c.docstatus, Some(0));
        assert_eq!(c.created_at, Some(Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 0).unwrap()));
        assert_eq!(
            c.contact_info.address,
            Some(Address {
                city: Some("Lyon".to_string()),
                postal_code: Some("69001".to_string()),
                ..Default::default()
            })
        );
        assert_eq!(c.metadata.unwrap().raw_data(), &payload);
    }

    #[test]
    fn test_no_address_fields_means_no_address() {
        let payload = raw(json!({"name": "CUST-0002", "customer_name": "Solo", "city": null}));
        let c = customer(CustomerConverter::new().external_to_standard(ERP_NEXT, &payload).unwrap());

        assert_eq!(c.contact_info.address, None);
    }

    #[test]
    fn test_cloud_erp_nested_address_round_trip() {
        let payload = raw(json!({
            "customer_id": "c-77",
            "name": "Globex",
            "billing_address": {"street": "1 Main St", "city": "Springfield", "zip": "12345"},
            "created_date": "2024-02-01T08:00:00Z"
        }));
        let converter = CustomerConverter::new();

        let record = converter.external_to_standard(CLOUD_ERP, &payload).unwrap();
        let address = customer(record.clone()).contact_info.address.unwrap();
        assert_eq!(address.street1.as_deref(), Some("1 Main St"));
        assert_eq!(address.postal_code.as_deref(), Some("12345"));

        let back = converter.standard_to_external(CLOUD_ERP, &record).unwrap();
        assert_eq!(Value::Object(back), Value::Object(payload));
    }

    #[test]
    fn test_erp_next_outbound_carries_doctype() {
        let record = StandardRecord::Customer(crate::schema::Customer {
            name: Some("New Co".to_string()),
            credit_limit: Some(500.0),
            updated_at: Some(Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()),
            ..Default::default()
        });

        let external = CustomerConverter::new().standard_to_external(ERP_NEXT, &record).unwrap();
        assert_eq!(
            Value::Object(external),
            json!({
                "doctype": "Customer",
                "customer_name": "New Co",
                "credit_limit": 500.0,
                "modified": "2024-03-01 09:00:00.000000"
            })
        );
    }

    #[test]
    fn test_bad_credit_limit_names_field() {
        let payload = raw(json!({"customer_id": "c-1", "credit_limit_amount": "a lot"}));
        let err = CustomerConverter::new().external_to_standard(CLOUD_ERP, &payload).unwrap_err();

        match err {
            NormalizeError::Conversion(e) => {
                assert_eq!(e.field, "credit_limit");
                assert_eq!(e.source_system, CLOUD_ERP);
                assert!(matches!(e.failure, ConversionFailure::TypeMismatch { .. }));
            }
            other => panic!("expected conversion error, got {:?}", other),
        }
    }

    #[test]
    fn test_customer_filters_for_both_backends() {
        let converter = CustomerConverter::new();
        let filters = StandardFilters::new().eq("contact_info.address.city", "Lyon");

        let erp = converter.convert_filters(ERP_NEXT, EntityType::Customer, &filters).unwrap();
        assert_eq!(erp.to_json(), json!([["Customer", "city", "=", "Lyon"]]));

        let cloud = converter.convert_filters(CLOUD_ERP, EntityType::Customer, &filters).unwrap();
        assert_eq!(
            cloud.to_json(),
            json!([{"field": "billing_address.city", "operator": "eq", "value": "Lyon"}])
        );
    }

    #[test]
    fn test_scalar_billing_address_is_a_shape_error() {
        let payload = raw(json!({"customer_id": "C-1", "billing_address": 42}));
        let err = CustomerConverter::new().external_to_standard(CLOUD_ERP, &payload).unwrap_err();

        match err {
            NormalizeError::Conversion(e) => {
                assert_eq!(e.field, "billing_address");
                assert!(matches!(e.failure, ConversionFailure::Shape(_)));
            }
            other => panic!("expected conversion error, got {:?}", other),
        }
    }

    #[test]
    fn test_full_round_trip_erp_next() {
        assert_full_round_trip(&CustomerConverter::new(), ERP_NEXT);
    }

    #[test]
    fn test_full_round_trip_cloud_erp() {
        assert_full_round_trip(&CustomerConverter::new(), CLOUD_ERP);
    }

    #[test]
    fn test_mapping_table_is_valid() {
        assert!(CustomerConverter::new().mapping_table().validate().is_ok());
        assert_eq!(CustomerConverter::new().source_systems(), vec![CLOUD_ERP, ERP_NEXT]);
    }
}
