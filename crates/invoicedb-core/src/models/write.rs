use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{Discount, RecordId, TaxKind};

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ClientCommand {
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub tax_number: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CategoryCommand {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProductCommand {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub unit_price: Decimal,
    #[serde(default)]
    pub vat_rate: Decimal,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub category_id: Option<RecordId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxCommand {
    pub name: String,
    pub rate: Decimal,
    #[serde(default = "default_tax_kind")]
    pub kind: TaxKind,
}

fn default_tax_kind() -> TaxKind {
    TaxKind::Percentage
}

/// A document line as submitted. A line that references a product may leave
/// out description, price and VAT rate; the service copies them from the
/// product before anything is stored.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LineItemCommand {
    #[serde(default)]
    pub product_id: Option<RecordId>,
    #[serde(default)]
    pub description: String,
    pub quantity: Decimal,
    #[serde(default)]
    pub unit_price: Option<Decimal>,
    #[serde(default)]
    pub vat_rate: Option<Decimal>,
}

/// Write shape shared by invoices and quotes. For a quote `due_date` is the
/// validity end date. A missing `due_date` is derived from the issue date and
/// the configured payment term or quote validity.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DocumentCommand {
    pub client_id: RecordId,
    pub issue_date: i64,
    #[serde(default)]
    pub due_date: Option<i64>,
    #[serde(default)]
    pub discount: Option<Discount>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub items: Vec<LineItemCommand>,
    #[serde(default)]
    pub tax_ids: Vec<RecordId>,
}
