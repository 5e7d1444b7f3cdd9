use std::{fmt::Display, str::FromStr};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

pub mod read;
pub mod write;

pub type RecordId = i64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Client {
    pub id: RecordId,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub tax_number: Option<String>,
    pub notes: Option<String>,
    pub created_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: RecordId,
    pub name: String,
    pub description: Option<String>,
    pub created_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: RecordId,
    pub name: String,
    pub description: Option<String>,
    pub unit_price: Decimal,
    /// Percentage, e.g. `20` for 20 %.
    pub vat_rate: Decimal,
    pub unit: Option<String>,
    pub category_id: Option<RecordId>,
    pub created_at: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaxKind {
    /// `rate` is a percentage of the document subtotal.
    Percentage,
    /// `rate` is an absolute amount added to the document.
    Fixed,
}

impl TaxKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaxKind::Percentage => "percentage",
            TaxKind::Fixed => "fixed",
        }
    }
}

impl FromStr for TaxKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "percentage" | "percent" => Ok(TaxKind::Percentage),
            "fixed" => Ok(TaxKind::Fixed),
            other => Err(format!("unknown tax kind: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tax {
    pub id: RecordId,
    pub name: String,
    pub rate: Decimal,
    pub kind: TaxKind,
    pub created_at: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscountType {
    Percentage,
    Fixed,
}

impl DiscountType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiscountType::Percentage => "percentage",
            DiscountType::Fixed => "fixed",
        }
    }
}

impl FromStr for DiscountType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "percentage" | "percent" => Ok(DiscountType::Percentage),
            "fixed" => Ok(DiscountType::Fixed),
            other => Err(format!("unknown discount type: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Discount {
    pub kind: DiscountType,
    pub value: Decimal,
}

impl Discount {
    pub fn percentage(value: Decimal) -> Self {
        Self { kind: DiscountType::Percentage, value }
    }

    pub fn fixed(value: Decimal) -> Self {
        Self { kind: DiscountType::Fixed, value }
    }
}

/// A line on an invoice or a quote. Description, price and VAT rate are
/// copied from the product when the line is created so later product edits
/// do not rewrite issued documents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub id: RecordId,
    pub document_id: RecordId,
    pub product_id: Option<RecordId>,
    pub description: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub vat_rate: Decimal,
    pub position: u32,
}

pub type InvoiceItem = LineItem;
pub type QuoteItem = LineItem;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvoiceStatus {
    Draft,
    Sent,
    Paid,
    Overdue,
}

impl InvoiceStatus {
    pub const ALL: [InvoiceStatus; 4] = [
        InvoiceStatus::Draft,
        InvoiceStatus::Sent,
        InvoiceStatus::Paid,
        InvoiceStatus::Overdue,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Draft => "draft",
            InvoiceStatus::Sent => "sent",
            InvoiceStatus::Paid => "paid",
            InvoiceStatus::Overdue => "overdue",
        }
    }

    pub fn can_transition_to(&self, next: InvoiceStatus) -> bool {
        use InvoiceStatus::*;
        matches!(
            (*self, next),
            (Draft, Sent) | (Draft, Paid)
                | (Sent, Paid) | (Sent, Overdue) | (Sent, Draft)
                | (Overdue, Paid) | (Overdue, Sent)
                | (Paid, Sent)
        ) || *self == next
    }

    /// Amount is still owed by the client.
    pub fn is_outstanding(&self) -> bool {
        matches!(self, InvoiceStatus::Sent | InvoiceStatus::Overdue)
    }
}

impl FromStr for InvoiceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "draft" => Ok(InvoiceStatus::Draft),
            "sent" => Ok(InvoiceStatus::Sent),
            "paid" => Ok(InvoiceStatus::Paid),
            "overdue" => Ok(InvoiceStatus::Overdue),
            other => Err(format!("unknown invoice status: {}", other)),
        }
    }
}

impl Display for InvoiceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuoteStatus {
    Draft,
    Sent,
    Accepted,
    Rejected,
}

impl QuoteStatus {
    pub const ALL: [QuoteStatus; 4] = [
        QuoteStatus::Draft,
        QuoteStatus::Sent,
        QuoteStatus::Accepted,
        QuoteStatus::Rejected,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            QuoteStatus::Draft => "draft",
            QuoteStatus::Sent => "sent",
            QuoteStatus::Accepted => "accepted",
            QuoteStatus::Rejected => "rejected",
        }
    }

    pub fn can_transition_to(&self, next: QuoteStatus) -> bool {
        use QuoteStatus::*;
        matches!(
            (*self, next),
            (Draft, Sent) | (Draft, Accepted) | (Draft, Rejected)
                | (Sent, Accepted) | (Sent, Rejected) | (Sent, Draft)
                | (Rejected, Draft)
        ) || *self == next
    }
}

impl FromStr for QuoteStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "draft" => Ok(QuoteStatus::Draft),
            "sent" => Ok(QuoteStatus::Sent),
            "accepted" => Ok(QuoteStatus::Accepted),
            "rejected" => Ok(QuoteStatus::Rejected),
            other => Err(format!("unknown quote status: {}", other)),
        }
    }
}

impl Display for QuoteStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invoice {
    pub id: RecordId,
    pub number: String,
    pub client_id: RecordId,
    pub status: InvoiceStatus,
    pub issue_date: i64,
    pub due_date: i64,
    pub discount: Option<Discount>,
    pub notes: Option<String>,
    /// Quote this invoice was converted from, if any.
    pub quote_id: Option<RecordId>,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    pub id: RecordId,
    pub number: String,
    pub client_id: RecordId,
    pub status: QuoteStatus,
    pub issue_date: i64,
    pub valid_until: i64,
    pub discount: Option<Discount>,
    pub notes: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    Invoice,
    Quote,
}

impl DocumentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentKind::Invoice => "invoice",
            DocumentKind::Quote => "quote",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            DocumentKind::Invoice => "INVOICE",
            DocumentKind::Quote => "QUOTE",
        }
    }
}

impl FromStr for DocumentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "invoice" | "invoices" => Ok(DocumentKind::Invoice),
            "quote" | "quotes" => Ok(DocumentKind::Quote),
            other => Err(format!("unknown document kind: {}", other)),
        }
    }
}

impl Display for DocumentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invoice_transitions() {
        assert!(InvoiceStatus::Draft.can_transition_to(InvoiceStatus::Sent));
        assert!(InvoiceStatus::Sent.can_transition_to(InvoiceStatus::Overdue));
        assert!(InvoiceStatus::Overdue.can_transition_to(InvoiceStatus::Paid));
        assert!(InvoiceStatus::Paid.can_transition_to(InvoiceStatus::Paid));
        assert!(!InvoiceStatus::Draft.can_transition_to(InvoiceStatus::Overdue));
        assert!(!InvoiceStatus::Paid.can_transition_to(InvoiceStatus::Draft));
    }

    #[test]
    fn test_quote_transitions() {
        assert!(QuoteStatus::Sent.can_transition_to(QuoteStatus::Accepted));
        assert!(QuoteStatus::Rejected.can_transition_to(QuoteStatus::Draft));
        assert!(!QuoteStatus::Accepted.can_transition_to(QuoteStatus::Rejected));
        assert!(!QuoteStatus::Accepted.can_transition_to(QuoteStatus::Draft));
    }

    #[test]
    fn test_status_parse() {
        assert_eq!("PAID".parse::<InvoiceStatus>().unwrap(), InvoiceStatus::Paid);
        assert_eq!("rejected".parse::<QuoteStatus>().unwrap(), QuoteStatus::Rejected);
        assert!("void".parse::<InvoiceStatus>().is_err());
        assert_eq!("quotes".parse::<DocumentKind>().unwrap(), DocumentKind::Quote);
    }
}
