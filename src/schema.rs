// 📐 Canonical Schema Model
// The stable record shapes handed to downstream consumers, whichever backend
// produced them, plus the typed field catalog of each entity.

use crate::error::NormalizeError;
use crate::fields::{FieldKind, FieldSpec};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::str::FromStr;

/// Backend-native payload: a JSON object exactly as the backend sent it.
pub type RawRecord = Map<String, Value>;

// ============================================================================
// ENTITY TYPES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    Customer,
    Product,
    Quotation,
    Invoice,
}

impl EntityType {
    pub const ALL: [EntityType; 4] = [
        EntityType::Customer,
        EntityType::Product,
        EntityType::Quotation,
        EntityType::Invoice,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Customer => "customer",
            EntityType::Product => "product",
            EntityType::Quotation => "quotation",
            EntityType::Invoice => "invoice",
        }
    }

    /// Typed canonical fields of this entity
    pub fn catalog(&self) -> &'static [FieldSpec] {
        match self {
            EntityType::Customer => CUSTOMER_FIELDS,
            EntityType::Product => PRODUCT_FIELDS,
            EntityType::Quotation => QUOTATION_FIELDS,
            EntityType::Invoice => INVOICE_FIELDS,
        }
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = NormalizeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        EntityType::ALL
            .into_iter()
            .find(|t| t.as_str() == wanted)
            .ok_or_else(|| NormalizeError::UnknownEntity {
                entity_type: s.to_string(),
            })
    }
}

// ============================================================================
// SHARED SUBSTRUCTURES
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Address {
    pub street1: Option<String>,
    pub street2: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postal_code: Option<String>,
    pub country: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContactInfo {
    pub email: Option<String>,
    pub phone: Option<String>,
    pub mobile: Option<String>,
    pub website: Option<String>,
    /// `None` when the backend sent no address at all
    pub address: Option<Address>,
}

/// Provenance of a canonical record.
///
/// Captured once when a backend payload is converted and never changed
/// afterwards. It is not part of any mapping, so it never travels back to a
/// backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    source_system: String,
    source_id: String,
    raw_data: RawRecord,
    converted_at: DateTime<Utc>,
}

impl Metadata {
    pub(crate) fn capture(source_system: &str, source_id: &str, raw_data: &RawRecord) -> Self {
        Metadata {
            source_system: source_system.to_string(),
            source_id: source_id.to_string(),
            raw_data: raw_data.clone(),
            converted_at: Utc::now(),
        }
    }

    pub fn source_system(&self) -> &str {
        &self.source_system
    }

    /// Identifier of the record inside its backend
    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    /// The backend payload, verbatim
    pub fn raw_data(&self) -> &RawRecord {
        &self.raw_data
    }

    pub fn converted_at(&self) -> DateTime<Utc> {
        self.converted_at
    }
}

// ============================================================================
// CUSTOMER
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Customer {
    pub id: Option<String>,
    pub name: Option<String>,
    pub customer_type: Option<String>,
    pub status: Option<String>,
    pub contact_info: ContactInfo,
    pub tax_id: Option<String>,
    pub credit_limit: Option<f64>,
    pub notes: Option<String>,
    pub customer_group: Option<String>,
    pub territory: Option<String>,
    pub default_currency: Option<String>,
    pub language: Option<String>,
    pub owner: Option<String>,
    pub modified_by: Option<String>,
    pub docstatus: Option<i64>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub metadata: Option<Metadata>,
}

pub const CUSTOMER_FIELDS: &[FieldSpec] = &[
    FieldSpec::new("id", FieldKind::Text),
    FieldSpec::new("name", FieldKind::Text),
    FieldSpec::new("customer_type", FieldKind::Text),
    FieldSpec::new("status", FieldKind::Text),
    FieldSpec::new("contact_info.email", FieldKind::Text),
    FieldSpec::new("contact_info.phone", FieldKind::Text),
    FieldSpec::new("contact_info.mobile", FieldKind::Text),
    FieldSpec::new("contact_info.website", FieldKind::Text),
    FieldSpec::new("contact_info.address.street1", FieldKind::Text),
    FieldSpec::new("contact_info.address.street2", FieldKind::Text),
    FieldSpec::new("contact_info.address.city", FieldKind::Text),
    FieldSpec::new("contact_info.address.state", FieldKind::Text),
    FieldSpec::new("contact_info.address.postal_code", FieldKind::Text),
    FieldSpec::new("contact_info.address.country", FieldKind::Text),
    FieldSpec::new("tax_id", FieldKind::Text),
    FieldSpec::new("credit_limit", FieldKind::Decimal),
    FieldSpec::new("notes", FieldKind::Text),
    FieldSpec::new("customer_group", FieldKind::Text),
    FieldSpec::new("territory", FieldKind::Text),
    FieldSpec::new("default_currency", FieldKind::Text),
    FieldSpec::new("language", FieldKind::Text),
    FieldSpec::new("owner", FieldKind::Text),
    FieldSpec::new("modified_by", FieldKind::Text),
    FieldSpec::new("docstatus", FieldKind::Integer),
    FieldSpec::new("created_at", FieldKind::Timestamp),
    FieldSpec::new("updated_at", FieldKind::Timestamp),
];

// ============================================================================
// PRODUCT
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProductAttribute {
    pub name: Option<String>,
    pub value: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Product {
    pub id: Option<String>,
    pub name: Option<String>,
    pub sku: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub price: Option<f64>,
    pub cost: Option<f64>,
    pub tax_rate: Option<f64>,
    pub stock_quantity: Option<i64>,
    pub unit_of_measure: Option<String>,
    pub is_active: Option<bool>,
    pub attributes: Vec<ProductAttribute>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub metadata: Option<Metadata>,
}

pub const PRODUCT_ATTRIBUTE_FIELDS: &[FieldSpec] = &[
    FieldSpec::new("name", FieldKind::Text),
    FieldSpec::new("value", FieldKind::Text),
];

pub const PRODUCT_FIELDS: &[FieldSpec] = &[
    FieldSpec::new("id", FieldKind::Text),
    FieldSpec::new("name", FieldKind::Text),
    FieldSpec::new("sku", FieldKind::Text),
    FieldSpec::new("description", FieldKind::Text),
    FieldSpec::new("category", FieldKind::Text),
    FieldSpec::new("price", FieldKind::Decimal),
    FieldSpec::new("cost", FieldKind::Decimal),
    FieldSpec::new("tax_rate", FieldKind::Decimal),
    FieldSpec::new("stock_quantity", FieldKind::Integer),
    FieldSpec::new("unit_of_measure", FieldKind::Text),
    FieldSpec::new("is_active", FieldKind::Boolean),
    FieldSpec::records("attributes", PRODUCT_ATTRIBUTE_FIELDS),
    FieldSpec::new("created_at", FieldKind::Timestamp),
    FieldSpec::new("updated_at", FieldKind::Timestamp),
];

// ============================================================================
// QUOTATION
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuotationItem {
    pub item_code: Option<String>,
    pub item_name: Option<String>,
    pub description: Option<String>,
    pub qty: Option<f64>,
    pub rate: Option<f64>,
    pub amount: Option<f64>,
    pub uom: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Quotation {
    pub id: Option<String>,
    /// Human-facing quotation number
    pub number: Option<String>,
    pub title: Option<String>,
    pub quotation_to: Option<String>,
    pub party_name: Option<String>,
    pub customer_name: Option<String>,
    pub transaction_date: Option<NaiveDate>,
    pub valid_till: Option<NaiveDate>,
    pub status: Option<String>,
    pub currency: Option<String>,
    pub conversion_rate: Option<f64>,
    pub total_qty: Option<f64>,
    pub total: Option<f64>,
    pub net_total: Option<f64>,
    pub discount_amount: Option<f64>,
    pub grand_total: Option<f64>,
    pub owner: Option<String>,
    pub modified_by: Option<String>,
    pub docstatus: Option<i64>,
    pub items: Vec<QuotationItem>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub metadata: Option<Metadata>,
}

pub const QUOTATION_ITEM_FIELDS: &[FieldSpec] = &[
    FieldSpec::new("item_code", FieldKind::Text),
    FieldSpec::new("item_name", FieldKind::Text),
    FieldSpec::new("description", FieldKind::Text),
    FieldSpec::new("qty", FieldKind::Decimal),
    FieldSpec::new("rate", FieldKind::Decimal),
    FieldSpec::new("amount", FieldKind::Decimal),
    FieldSpec::new("uom", FieldKind::Text),
];

pub const QUOTATION_FIELDS: &[FieldSpec] = &[
    FieldSpec::new("id", FieldKind::Text),
    FieldSpec::new("number", FieldKind::Text),
    FieldSpec::new("title", FieldKind::Text),
    FieldSpec::new("quotation_to", FieldKind::Text),
    FieldSpec::new("party_name", FieldKind::Text),
    FieldSpec::new("customer_name", FieldKind::Text),
    FieldSpec::new("transaction_date", FieldKind::Date),
    FieldSpec::new("valid_till", FieldKind::Date),
    FieldSpec::new("status", FieldKind::Text),
    FieldSpec::new("currency", FieldKind::Text),
    FieldSpec::new("conversion_rate", FieldKind::Decimal),
    FieldSpec::new("total_qty", FieldKind::Decimal),
    FieldSpec::new("total", FieldKind::Decimal),
    FieldSpec::new("net_total", FieldKind::Decimal),
    FieldSpec::new("discount_amount", FieldKind::Decimal),
    FieldSpec::new("grand_total", FieldKind::Decimal),
    FieldSpec::new("owner", FieldKind::Text),
    FieldSpec::new("modified_by", FieldKind::Text),
    FieldSpec::new("docstatus", FieldKind::Integer),
    FieldSpec::records("items", QUOTATION_ITEM_FIELDS),
    FieldSpec::new("created_at", FieldKind::Timestamp),
    FieldSpec::new("updated_at", FieldKind::Timestamp),
];

// ============================================================================
// INVOICE
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InvoiceItem {
    pub product_id: Option<String>,
    pub description: Option<String>,
    pub quantity: Option<f64>,
    pub unit_price: Option<f64>,
    pub discount_percentage: Option<f64>,
    pub tax_percentage: Option<f64>,
    pub total_amount: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Invoice {
    pub id: Option<String>,
    pub number: Option<String>,
    pub customer_id: Option<String>,
    pub invoice_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub status: Option<String>,
    pub currency: Option<String>,
    pub subtotal: Option<f64>,
    pub tax_total: Option<f64>,
    pub discount_total: Option<f64>,
    pub grand_total: Option<f64>,
    pub notes: Option<String>,
    pub payment_terms: Option<String>,
    pub billing_address: Option<Address>,
    pub items: Vec<InvoiceItem>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub metadata: Option<Metadata>,
}

pub const INVOICE_ITEM_FIELDS: &[FieldSpec] = &[
    FieldSpec::new("product_id", FieldKind::Text),
    FieldSpec::new("description", FieldKind::Text),
    FieldSpec::new("quantity", FieldKind::Decimal),
    FieldSpec::new("unit_price", FieldKind::Decimal),
    FieldSpec::new("discount_percentage", FieldKind::Decimal),
    FieldSpec::new("tax_percentage", FieldKind::Decimal),
    FieldSpec::new("total_amount", FieldKind::Decimal),
];

pub const INVOICE_FIELDS: &[FieldSpec] = &[
    FieldSpec::new("id", FieldKind::Text),
    FieldSpec::new("number", FieldKind::Text),
    FieldSpec::new("customer_id", FieldKind::Text),
    FieldSpec::new("invoice_date", FieldKind::Date),
    FieldSpec::new("due_date", FieldKind::Date),
    FieldSpec::new("status", FieldKind::Text),
    FieldSpec::new("currency", FieldKind::Text),
    FieldSpec::new("subtotal", FieldKind::Decimal),
    FieldSpec::new("tax_total", FieldKind::Decimal),
    FieldSpec::new("discount_total", FieldKind::Decimal),
    FieldSpec::new("grand_total", FieldKind::Decimal),
    FieldSpec::new("notes", FieldKind::Text),
    FieldSpec::new("payment_terms", FieldKind::Text),
    FieldSpec::new("billing_address.street1", FieldKind::Text),
    FieldSpec::new("billing_address.street2", FieldKind::Text),
    FieldSpec::new("billing_address.city", FieldKind::Text),
    FieldSpec::new("billing_address.state", FieldKind::Text),
    FieldSpec::new("billing_address.postal_code", FieldKind::Text),
    FieldSpec::new("billing_address.country", FieldKind::Text),
    FieldSpec::records("items", INVOICE_ITEM_FIELDS),
    FieldSpec::new("created_at", FieldKind::Timestamp),
    FieldSpec::new("updated_at", FieldKind::Timestamp),
];

// ============================================================================
// STANDARD RECORD
// ============================================================================

/// A canonical record of any entity type.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum StandardRecord {
    Customer(Customer),
    Product(Product),
    Quotation(Quotation),
    Invoice(Invoice),
}

impl StandardRecord {
    /// Build a record of `entity_type` from its canonical JSON form.
    pub fn from_value(entity_type: EntityType, value: Value) -> Result<Self, serde_json::Error> {
        Ok(match entity_type {
            EntityType::Customer => StandardRecord::Customer(serde_json::from_value(value)?),
            EntityType::Product => StandardRecord::Product(serde_json::from_value(value)?),
            EntityType::Quotation => StandardRecord::Quotation(serde_json::from_value(value)?),
            EntityType::Invoice => StandardRecord::Invoice(serde_json::from_value(value)?),
        })
    }

    pub fn to_value(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }

    pub fn entity_type(&self) -> EntityType {
        match self {
            StandardRecord::Customer(_) => EntityType::Customer,
            StandardRecord::Product(_) => EntityType::Product,
            StandardRecord::Quotation(_) => EntityType::Quotation,
            StandardRecord::Invoice(_) => EntityType::Invoice,
        }
    }

    pub fn id(&self) -> Option<&str> {
        match self {
            StandardRecord::Customer(r) => r.id.as_deref(),
            StandardRecord::Product(r) => r.id.as_deref(),
            StandardRecord::Quotation(r) => r.id.as_deref(),
            StandardRecord::Invoice(r) => r.id.as_deref(),
        }
    }

    pub fn metadata(&self) -> Option<&Metadata> {
        match self {
            StandardRecord::Customer(r) => r.metadata.as_ref(),
            StandardRecord::Product(r) => r.metadata.as_ref(),
            StandardRecord::Quotation(r) => r.metadata.as_ref(),
            StandardRecord::Invoice(r) => r.metadata.as_ref(),
        }
    }
}

impl From<Customer> for StandardRecord {
    fn from(record: Customer) -> Self {
        StandardRecord::Customer(record)
    }
}

impl From<Product> for StandardRecord {
    fn from(record: Product) -> Self {
        StandardRecord::Product(record)
    }
}

impl From<Quotation> for StandardRecord {
    fn from(record: Quotation) -> Self {
        StandardRecord::Quotation(record)
    }
}

impl From<Invoice> for StandardRecord {
    fn from(record: Invoice) -> Self {
        StandardRecord::Invoice(record)
    }
}
