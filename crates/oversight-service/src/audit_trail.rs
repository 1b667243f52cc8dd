//! Persistent audit trail
//!
//! - Entry index and hash are computed against the in-memory chain first.
//! - The entry is persisted before it is committed in memory.
//! - On startup, stored entries are hydrated and hash-verified.

use crate::error::{ApiError, DaemonResult};
use crate::storage::Storage;
use chrono::Utc;
use oversight_core::{AuditFilter, AuditLog, AuditPage};
use oversight_types::{AuditEntry, AuditRecord};
use std::sync::Arc;
use tokio::sync::Mutex;

pub struct AuditTrail {
    log: Mutex<AuditLog>,
    storage: Arc<dyn Storage>,
}

impl AuditTrail {
    /// Load and verify the stored chain
    pub async fn bootstrap(storage: Arc<dyn Storage>) -> DaemonResult<Self> {
        let entries = storage.load_audit_entries().await?;
        let count = entries.len();
        let log = AuditLog::from_entries(entries)?;
        tracing::info!(entries = count, "Audit chain verified");
        Ok(Self {
            log: Mutex::new(log),
            storage,
        })
    }

    pub async fn record(&self, record: AuditRecord) -> Result<AuditEntry, ApiError> {
        let mut log = self.log.lock().await;
        let entry = log.build_entry(record, Utc::now());
        self.storage.append_audit_entry(&entry).await?;
        log.commit_entry(entry.clone())?;

        tracing::debug!(
            index = entry.index,
            action = %entry.action,
            entity = %entry.entity,
            entity_id = %entry.entity_id,
            "Audit entry appended"
        );
        Ok(entry)
    }

    pub async fn query(&self, filter: &AuditFilter) -> AuditPage {
        self.log.lock().await.query(filter)
    }

    pub async fn verify(&self) -> bool {
        self.log.lock().await.verify_chain()
    }

    pub async fn len(&self) -> usize {
        self.log.lock().await.len()
    }
}
