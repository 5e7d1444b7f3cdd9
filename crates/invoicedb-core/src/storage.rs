use std::collections::BTreeMap;

use thiserror::Error;

use crate::models::{
    write::{CategoryCommand, ClientCommand, DocumentCommand, ProductCommand, TaxCommand},
    Category, Client, Invoice, InvoiceStatus, LineItem, Product, Quote, QuoteStatus, RecordId, Tax,
};
use crate::numbering::SequenceState;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("{0}")]
    Other(String),
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: RecordId },
    #[error("constraint violation: {0}")]
    Constraint(String),
    #[error("invalid stored value: {0}")]
    Corrupt(String),
    #[error("no active transaction")]
    NoActiveTransaction,
}

impl StorageError {
    pub fn not_found(entity: &'static str, id: RecordId) -> Self {
        StorageError::NotFound { entity, id }
    }
}

pub type TransactionId = u64;

/// Updates a sequence from its current state to the returned one.
pub type SequenceUpdate<'a> = &'a mut dyn FnMut(SequenceState) -> SequenceState;

/// Row timestamps are passed in by the caller, so every backend shares the
/// caller's notion of "now".
pub trait StorageBackend: Send + Sync {
    // Clients
    fn create_client(&self, command: &ClientCommand, created_at: i64) -> Result<RecordId, StorageError>;
    fn update_client(&self, id: RecordId, command: &ClientCommand) -> Result<(), StorageError>;
    /// Cascades to the client's invoices and quotes.
    fn delete_client(&self, id: RecordId) -> Result<(), StorageError>;
    fn get_client(&self, id: RecordId) -> Result<Client, StorageError>;
    fn list_clients(&self) -> Result<Vec<Client>, StorageError>;

    // Categories
    fn create_category(&self, command: &CategoryCommand, created_at: i64) -> Result<RecordId, StorageError>;
    fn update_category(&self, id: RecordId, command: &CategoryCommand) -> Result<(), StorageError>;
    /// Products in the category are kept and become uncategorised.
    fn delete_category(&self, id: RecordId) -> Result<(), StorageError>;
    fn get_category(&self, id: RecordId) -> Result<Category, StorageError>;
    fn list_categories(&self) -> Result<Vec<Category>, StorageError>;

    // Products
    fn create_product(&self, command: &ProductCommand, created_at: i64) -> Result<RecordId, StorageError>;
    fn update_product(&self, id: RecordId, command: &ProductCommand) -> Result<(), StorageError>;
    /// Document lines referring to the product keep their copied values.
    fn delete_product(&self, id: RecordId) -> Result<(), StorageError>;
    fn get_product(&self, id: RecordId) -> Result<Product, StorageError>;
    fn list_products(&self) -> Result<Vec<Product>, StorageError>;

    // Taxes
    fn create_tax(&self, command: &TaxCommand, created_at: i64) -> Result<RecordId, StorageError>;
    fn update_tax(&self, id: RecordId, command: &TaxCommand) -> Result<(), StorageError>;
    /// Detaches the tax from every document.
    fn delete_tax(&self, id: RecordId) -> Result<(), StorageError>;
    fn get_tax(&self, id: RecordId) -> Result<Tax, StorageError>;
    fn list_taxes(&self) -> Result<Vec<Tax>, StorageError>;

    // Invoices
    fn create_invoice(&self, number: &str, command: &DocumentCommand, quote_id: Option<RecordId>, created_at: i64) -> Result<RecordId, StorageError>;
    /// Replaces header fields, lines and attached taxes.
    fn update_invoice(&self, id: RecordId, command: &DocumentCommand, updated_at: i64) -> Result<(), StorageError>;
    fn set_invoice_status(&self, id: RecordId, status: InvoiceStatus, updated_at: i64) -> Result<(), StorageError>;
    fn delete_invoice(&self, id: RecordId) -> Result<(), StorageError>;
    fn get_invoice(&self, id: RecordId) -> Result<Invoice, StorageError>;
    fn list_invoices(&self) -> Result<Vec<Invoice>, StorageError>;
    fn invoice_items(&self, id: RecordId) -> Result<Vec<LineItem>, StorageError>;
    fn invoice_taxes(&self, id: RecordId) -> Result<Vec<Tax>, StorageError>;

    // Quotes
    fn create_quote(&self, number: &str, command: &DocumentCommand, created_at: i64) -> Result<RecordId, StorageError>;
    fn update_quote(&self, id: RecordId, command: &DocumentCommand, updated_at: i64) -> Result<(), StorageError>;
    fn set_quote_status(&self, id: RecordId, status: QuoteStatus, updated_at: i64) -> Result<(), StorageError>;
    fn delete_quote(&self, id: RecordId) -> Result<(), StorageError>;
    fn get_quote(&self, id: RecordId) -> Result<Quote, StorageError>;
    fn list_quotes(&self) -> Result<Vec<Quote>, StorageError>;
    fn quote_items(&self, id: RecordId) -> Result<Vec<LineItem>, StorageError>;
    fn quote_taxes(&self, id: RecordId) -> Result<Vec<Tax>, StorageError>;

    // Preferences
    fn get_setting(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set_setting(&self, key: &str, value: &str) -> Result<(), StorageError>;
    fn list_settings(&self) -> Result<BTreeMap<String, String>, StorageError>;

    // Numbering
    fn get_sequence(&self, name: &str) -> Result<SequenceState, StorageError>;
    /// Atomically applies `update` to the named counter and stores the result.
    fn update_sequence(&self, name: &str, update: SequenceUpdate<'_>) -> Result<SequenceState, StorageError>;

    fn begin_transaction(&self) -> Result<TransactionId, StorageError>;
    fn commit_transaction(&self, tx_id: TransactionId) -> Result<(), StorageError>;
    fn rollback_transaction(&self, tx_id: TransactionId) -> Result<(), StorageError>;
}
