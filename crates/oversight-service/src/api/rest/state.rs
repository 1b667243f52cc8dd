//! Application state for API handlers

use crate::audit_trail::AuditTrail;
use crate::blob::{BlobKeyLocks, BlobStore};
use crate::error::ApiResult;
use crate::notify::{Notifier, WorkflowEvent};
use crate::settings_cache::SettingsCache;
use crate::storage::Storage;
use oversight_core::{ApprovalWorkflow, EditLock};
use oversight_types::AuditRecord;
use std::sync::Arc;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Record storage
    pub storage: Arc<dyn Storage>,

    /// Attachment content
    pub blobs: Arc<dyn BlobStore>,

    /// Held while a blob key gains or loses references
    pub blob_locks: Arc<BlobKeyLocks>,

    /// Hash-chained audit trail
    pub audit: Arc<AuditTrail>,

    /// Runtime settings
    pub settings: Arc<SettingsCache>,

    /// Workflow notifications
    pub notifier: Arc<dyn Notifier>,

    /// Service version
    pub version: String,

    /// Service start time
    pub started_at: chrono::DateTime<chrono::Utc>,
}

impl AppState {
    /// Create new application state
    pub fn new(
        storage: Arc<dyn Storage>,
        blobs: Arc<dyn BlobStore>,
        audit: Arc<AuditTrail>,
        settings: Arc<SettingsCache>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            storage,
            blobs,
            blob_locks: Arc::new(BlobKeyLocks::new()),
            audit,
            settings,
            notifier,
            version: env!("CARGO_PKG_VERSION").to_string(),
            started_at: chrono::Utc::now(),
        }
    }

    /// Workflow rules built from the current settings
    pub async fn workflow(&self) -> ApiResult<ApprovalWorkflow> {
        let settings = self.settings.get().await?;
        Ok(ApprovalWorkflow::from_settings(&settings))
    }

    pub async fn edit_lock(&self) -> ApiResult<EditLock> {
        let settings = self.settings.get().await?;
        Ok(EditLock::new(settings.lock_ttl()))
    }

    pub async fn record(&self, record: AuditRecord) -> ApiResult<()> {
        self.audit.record(record).await.map(|_| ())
    }

    pub fn notify(&self, event: WorkflowEvent) {
        self.notifier.notify(&event);
    }

    /// Get uptime as a human-readable string
    pub fn uptime(&self) -> String {
        let duration = chrono::Utc::now() - self.started_at;
        let secs = duration.num_seconds();

        if secs < 60 {
            format!("{}s", secs)
        } else if secs < 3600 {
            format!("{}m {}s", secs / 60, secs % 60)
        } else if secs < 86400 {
            format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
        } else {
            format!("{}d {}h", secs / 86400, (secs % 86400) / 3600)
        }
    }
}
