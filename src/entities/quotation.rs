// 📝 Quotation Converter
//
// ERPNext identifies a quotation by its document name, which doubles as the
// human-facing number. The cloud ERP keeps them separate and calls the lines
// `line_items`.

use crate::converter::EntityConverter;
use crate::mapping::{FieldMapping, ItemMapping, MappingEntry, MappingTable, SourceProfile, CLOUD_ERP, ERP_NEXT};
use crate::schema::EntityType;

pub struct QuotationConverter {
    table: MappingTable,
}

impl QuotationConverter {
    pub fn new() -> Self {
        QuotationConverter {
            table: MappingTable::new(EntityType::Quotation)
                .with_mapping(erp_next())
                .with_mapping(cloud_erp()),
        }
    }
}

impl Default for QuotationConverter {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityConverter for QuotationConverter {
    fn entity_type(&self) -> EntityType {
        EntityType::Quotation
    }

    fn mapping_table(&self) -> &MappingTable {
        &self.table
    }
}

fn erp_next() -> FieldMapping {
    FieldMapping::new(ERP_NEXT, SourceProfile::erp_next())
        .with_document_type("Quotation")
        .with_field("id", "name")
        .with_read_only_field("number", "name")
        .with_field("title", "title")
        .with_field("quotation_to", "quotation_to")
        .with_field("party_name", "party_name")
        .with_field("customer_name", "customer_name")
        .with_field("transaction_date", "transaction_date")
        .with_field("valid_till", "valid_till")
        .with_field("status", "status")
        .with_field("currency", "currency")
        .with_field("conversion_rate", "conversion_rate")
        .with_field("total_qty", "total_qty")
        .with_field("total", "total")
        .with_field("net_total", "net_total")
        .with_field("discount_amount", "discount_amount")
        .with_field("grand_total", "grand_total")
        .with_field("owner", "owner")
        .with_field("modified_by", "modified_by")
        .with_field("docstatus", "docstatus")
        .with_records(
            "items",
            "items",
            ItemMapping::array(vec![
                MappingEntry::field("item_code", "item_code"),
                MappingEntry::field("item_name", "item_name"),
                MappingEntry::field("description", "description"),
                MappingEntry::field("qty", "qty"),
                MappingEntry::field("rate", "rate"),
                MappingEntry::field("amount", "amount"),
                MappingEntry::field("uom", "uom"),
            ]),
        )
        .with_field("created_at", "creation")
        .with_field("updated_at", "modified")
}

fn cloud_erp() -> FieldMapping {
    FieldMapping::new(CLOUD_ERP, SourceProfile::cloud_erp())
        .with_field("id", "quotation_id")
        .with_field("number", "quotation_number")
        .with_field("title", "title")
        .with_field("customer_name", "customer_name")
        .with_field("transaction_date", "quotation_date")
        .with_field("valid_till", "expiry_date")
        .with_field("status", "quotation_status")
        .with_field("currency", "currency_code")
        .with_field("total", "subtotal")
        .with_field("grand_total", "total_amount")
        .with_field("owner", "created_by")
        .with_field("modified_by", "modified_by")
        .with_records(
            "items",
            "line_items",
            ItemMapping::array(vec![
                MappingEntry::field("item_code", "product_id"),
                MappingEntry::field("item_name", "product_name"),
                MappingEntry::field("description", "description"),
                MappingEntry::field("qty", "quantity"),
                MappingEntry::field("rate", "unit_price"),
                MappingEntry::field("amount", "total"),
                MappingEntry::field("uom", "unit"),
            ]),
        )
        .with_field("created_at", "created_date")
        .with_field("updated_at", "modified_date")
}
