//! Backend selection for the configured store.

use std::sync::Arc;

pub use invoicedb_core::storage::{StorageBackend, StorageError, TransactionId};
pub use invoicedb_memory::InMemoryStorage;
pub use invoicedb_sqlite::SqliteStorage;

use crate::config::{BackendKind, DatabaseConfig};

pub fn open_storage(config: &DatabaseConfig) -> Result<Arc<dyn StorageBackend>, StorageError> {
    match config.backend {
        BackendKind::Memory => {
            tracing::info!("Using in-memory storage");
            Ok(Arc::new(InMemoryStorage::new()))
        }
        BackendKind::Sqlite => {
            tracing::info!(path = %config.path, "Opening SQLite storage");
            Ok(Arc::new(SqliteStorage::new(&config.path)?))
        }
    }
}
