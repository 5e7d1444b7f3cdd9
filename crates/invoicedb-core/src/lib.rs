//! Core types and traits for InvoiceDB storage backends.
//!
//! This crate provides the domain model, the `StorageBackend` trait and the
//! two pieces of pure business logic shared by every backend and surface:
//! document totals and document numbering.

pub mod clock;
pub mod models;
pub mod numbering;
pub mod storage;
pub mod totals;

// Re-export key types at crate root for convenience
pub use models::{
    Category, Client, Discount, DiscountType, DocumentKind, Invoice, InvoiceItem, InvoiceStatus,
    LineItem, Product, Quote, QuoteItem, QuoteStatus, RecordId, Tax, TaxKind,
};
pub use models::read::{Document, DocumentStatus};
pub use models::write::{
    CategoryCommand, ClientCommand, DocumentCommand, LineItemCommand, ProductCommand, TaxCommand,
};
pub use numbering::{NumberingScheme, SequenceState};
pub use storage::{StorageBackend, StorageError, TransactionId};
pub use totals::{DocumentTotals, LineTotals, TaxLine, TotalsOverflow};
