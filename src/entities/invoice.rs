// 🧾 Invoice Converter
//
// Maps to the ERPNext "Sales Invoice" doctype. ERPNext stores no per-line tax
// percentage and links addresses instead of embedding them, so those fields
// only travel to and from the cloud ERP.

use crate::converter::EntityConverter;
use crate::mapping::{FieldMapping, ItemMapping, MappingEntry, MappingTable, SourceProfile, CLOUD_ERP, ERP_NEXT};
use crate::schema::EntityType;

pub struct InvoiceConverter {
    table: MappingTable,
}

impl InvoiceConverter {
    pub fn new() -> Self {
        InvoiceConverter {
            table: MappingTable::new(EntityType::Invoice)
                .with_mapping(erp_next())
                .with_mapping(cloud_erp()),
        }
    }
}

impl Default for InvoiceConverter {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityConverter for InvoiceConverter {
    fn entity_type(&self) -> EntityType {
        EntityType::Invoice
    }

    fn mapping_table(&self) -> &MappingTable {
        &self.table
    }
}

fn erp_next() -> FieldMapping {
    FieldMapping::new(ERP_NEXT, SourceProfile::erp_next())
        .with_document_type("Sales Invoice")
        .with_field("id", "name")
        .with_read_only_field("number", "name")
        .with_field("customer_id", "customer")
        .with_field("invoice_date", "posting_date")
        .with_field("due_date", "due_date")
        .with_field("status", "status")
        .with_field("currency", "currency")
        .with_field("subtotal", "net_total")
        .with_field("tax_total", "total_taxes_and_charges")
        .with_field("discount_total", "discount_amount")
        .with_field("grand_total", "grand_total")
        .with_field("notes", "remarks")
        .with_field("payment_terms", "payment_terms_template")
        .with_records(
            "items",
            "items",
            ItemMapping::array(vec![
                MappingEntry::field("product_id", "item_code"),
                MappingEntry::field("description", "description"),
                MappingEntry::field("quantity", "qty"),
                MappingEntry::field("unit_price", "rate"),
                MappingEntry::field("discount_percentage", "discount_percentage"),
                MappingEntry::field("total_amount", "amount"),
            ]),
        )
        .with_field("created_at", "creation")
        .with_field("updated_at", "modified")
}

fn cloud_erp() -> FieldMapping {
    FieldMapping::new(CLOUD_ERP, SourceProfile::cloud_erp())
        .with_field("id", "invoice_id")
        .with_field("number", "invoice_number")
        .with_field("customer_id", "customer_id")
        .with_field("invoice_date", "issue_date")
        .with_field("due_date", "due_date")
        .with_field("status", "invoice_status")
        .with_field("currency", "currency_code")
        .with_field("subtotal", "subtotal")
        .with_field("tax_total", "tax_amount")
        .with_field("discount_total", "discount_amount")
        .with_field("grand_total", "total_amount")
        .with_field("notes", "notes")
        .with_field("payment_terms", "payment_terms")
        .with_field("billing_address.street1", "billing_address.street")
        .with_field("billing_address.street2", "billing_address.street2")
        .with_field("billing_address.city", "billing_address.city")
        .with_field("billing_address.state", "billing_address.state")
        .with_field("billing_address.postal_code", "billing_address.zip")
        .with_field("billing_address.country", "billing_address.country")
        .with_records(
            "items",
            "line_items",
            ItemMapping::array(vec![
                MappingEntry::field("product_id", "product_id"),
                MappingEntry::field("description", "description"),
                MappingEntry::field("quantity", "quantity"),
                MappingEntry::field("unit_price", "unit_price"),
                MappingEntry::field("discount_percentage", "discount_percent"),
                MappingEntry::field("tax_percentage", "tax_percent"),
                MappingEntry::field("total_amount", "total"),
            ]),
        )
        .with_field("created_at", "created_date")
        .with_field("updated_at", "last_modified_date")
}
