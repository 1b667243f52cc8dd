//! Storage layer for oversightd
//!
//! Provides persistent storage for users, objectives, activities, spend,
//! attachments, revisions, settings and the audit chain.

mod memory;
mod postgres;
mod traits;

pub use memory::InMemoryStorage;
pub use postgres::PostgresStorage;
pub use traits::{
    ActivityStorage, AttachmentStorage, AuditStorage, ObjectiveStorage, RevisionFilter,
    RevisionStorage, SettingsStorage, SpendStorage, Storage, StorageResult, UserStorage,
};

use crate::config::StorageConfig;
use crate::error::StorageError;
use std::sync::Arc;

/// Open the configured storage backend
pub async fn connect(config: &StorageConfig) -> Result<Arc<dyn Storage>, StorageError> {
    match config {
        StorageConfig::Memory => Ok(Arc::new(InMemoryStorage::new())),
        StorageConfig::Postgres {
            url,
            max_connections,
            connect_timeout_secs,
        } => {
            let storage =
                PostgresStorage::new(url, *max_connections, *connect_timeout_secs).await?;
            Ok(Arc::new(storage))
        }
    }
}
