use invoicedb_core::{StorageError, TotalsOverflow};
use thiserror::Error;

use crate::pdf::PdfError;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{0}")]
    Validation(String),
    #[error("cannot change {entity} status from {from} to {to}")]
    InvalidTransition {
        entity: &'static str,
        from: &'static str,
        to: &'static str,
    },
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Totals(#[from] TotalsOverflow),
    #[error(transparent)]
    Pdf(#[from] PdfError),
}

impl ServiceError {
    pub fn validation(message: impl Into<String>) -> Self {
        ServiceError::Validation(message.into())
    }
}
