//! Application services: validation and orchestration on top of a
//! `StorageBackend`. Both the HTTP API and the CLI go through this layer.

use std::sync::{Arc, Mutex, MutexGuard};

use invoicedb_core::{clock, StorageBackend, StorageError};

use crate::{error::ServiceError, settings::AppSettings};

mod catalog;
mod documents;
mod numbering;
mod validation;

pub use documents::{InvoiceFilter, QuoteFilter};
pub use validation::{MAX_AMOUNT, MAX_DAYS};

pub type Clock = Arc<dyn Fn() -> i64 + Send + Sync>;

pub struct Service {
    storage: Arc<dyn StorageBackend>,
    clock: Clock,
    /// Held by every mutation. A transaction rollback restores the whole
    /// store, so no other write may run while one is open.
    write_lock: Mutex<()>,
}

/// Turns a missing referenced record into a validation failure.
fn referenced(err: StorageError) -> ServiceError {
    match err {
        StorageError::NotFound { entity, id } => ServiceError::validation(format!("{} {} does not exist", entity, id)),
        other => other.into(),
    }
}

impl Service {
    pub fn new(storage: Arc<dyn StorageBackend>) -> Self {
        Self::with_clock(storage, Arc::new(clock::now_millis))
    }

    /// Uses `clock` instead of the system time for "now".
    pub fn with_clock(storage: Arc<dyn StorageBackend>, clock: Clock) -> Self {
        Self {
            storage,
            clock,
            write_lock: Mutex::new(()),
        }
    }

    pub fn storage(&self) -> &Arc<dyn StorageBackend> {
        &self.storage
    }

    pub fn now(&self) -> i64 {
        (self.clock)()
    }

    pub fn settings(&self) -> Result<AppSettings, ServiceError> {
        Ok(AppSettings::load(&*self.storage)?)
    }

    pub fn save_settings(&self, settings: &AppSettings) -> Result<AppSettings, ServiceError> {
        validation::settings(settings)?;
        self.in_transaction(|| Ok(settings.save(&*self.storage)?))?;
        tracing::info!(company = %settings.company_name, "Settings saved");
        self.settings()
    }

    fn lock(&self) -> Result<MutexGuard<'_, ()>, ServiceError> {
        self.write_lock
            .lock()
            .map_err(|e| ServiceError::Storage(StorageError::Other(e.to_string())))
    }

    /// Runs a single-step write while no transaction is open.
    fn write<T>(&self, f: impl FnOnce() -> Result<T, ServiceError>) -> Result<T, ServiceError> {
        let _guard = self.lock()?;
        f()
    }

    /// Runs `f` inside a storage transaction, rolling back when it fails.
    /// Checks that decide whether the write may happen belong inside `f`.
    fn in_transaction<T>(&self, f: impl FnOnce() -> Result<T, ServiceError>) -> Result<T, ServiceError> {
        let _guard = self.lock()?;
        let tx_id = self.storage.begin_transaction()?;
        match f() {
            Ok(value) => {
                self.storage.commit_transaction(tx_id)?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback_err) = self.storage.rollback_transaction(tx_id) {
                    tracing::error!(tx_id, error = %rollback_err, "Rollback failed");
                }
                Err(e)
            }
        }
    }
}
