use serde::Serialize;

use crate::totals::{self, DocumentTotals, TotalsOverflow};

use super::{Client, Discount, DocumentKind, Invoice, InvoiceStatus, LineItem, Quote, QuoteStatus, RecordId, Tax};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum DocumentStatus {
    Invoice(InvoiceStatus),
    Quote(QuoteStatus),
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Invoice(s) => s.as_str(),
            DocumentStatus::Quote(s) => s.as_str(),
        }
    }
}

/// A fully loaded invoice or quote: header, client, lines, attached taxes and
/// the derived totals.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Document {
    pub kind: DocumentKind,
    pub id: RecordId,
    pub number: String,
    pub status: DocumentStatus,
    pub issue_date: i64,
    /// Due date for invoices, validity end for quotes.
    pub due_date: i64,
    pub discount: Option<Discount>,
    pub notes: Option<String>,
    pub client: Client,
    pub items: Vec<LineItem>,
    pub taxes: Vec<Tax>,
    pub totals: DocumentTotals,
}

impl Document {
    pub fn from_invoice(invoice: Invoice, client: Client, items: Vec<LineItem>, taxes: Vec<Tax>) -> Result<Self, TotalsOverflow> {
        let totals = totals::compute(&items, invoice.discount.as_ref(), &taxes)?;
        Ok(Self {
            kind: DocumentKind::Invoice,
            id: invoice.id,
            number: invoice.number,
            status: DocumentStatus::Invoice(invoice.status),
            issue_date: invoice.issue_date,
            due_date: invoice.due_date,
            discount: invoice.discount,
            notes: invoice.notes,
            client,
            items,
            taxes,
            totals,
        })
    }

    pub fn from_quote(quote: Quote, client: Client, items: Vec<LineItem>, taxes: Vec<Tax>) -> Result<Self, TotalsOverflow> {
        let totals = totals::compute(&items, quote.discount.as_ref(), &taxes)?;
        Ok(Self {
            kind: DocumentKind::Quote,
            id: quote.id,
            number: quote.number,
            status: DocumentStatus::Quote(quote.status),
            issue_date: quote.issue_date,
            due_date: quote.valid_until,
            discount: quote.discount,
            notes: quote.notes,
            client,
            items,
            taxes,
            totals,
        })
    }
}
