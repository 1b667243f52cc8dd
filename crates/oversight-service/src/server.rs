//! Server setup and lifecycle management

use crate::api::create_router;
use crate::api::rest::state::AppState;
use crate::audit_trail::AuditTrail;
use crate::blob::{BlobStore, FsBlobStore, MemoryBlobStore};
use crate::config::{AttachmentConfig, BootstrapConfig, ServiceConfig};
use crate::error::{DaemonError, DaemonResult};
use crate::notify::TracingNotifier;
use crate::settings_cache::SettingsCache;
use crate::storage::{self, Storage, UserStorage};
use oversight_types::{normalize_email, AuditRecord, EntityKind, Role, User};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

/// Grant oversight server
pub struct Server {
    config: ServiceConfig,
    state: AppState,
}

impl Server {
    /// Connect storage, verify the audit chain and prepare shared state
    pub async fn new(config: ServiceConfig) -> DaemonResult<Self> {
        config
            .workflow
            .defaults
            .validate()
            .map_err(DaemonError::Config)?;

        let storage = storage::connect(&config.storage).await?;
        tracing::info!(backend = storage.backend(), "Storage ready");

        let blobs: Arc<dyn BlobStore> = match &config.attachments {
            AttachmentConfig::Memory => Arc::new(MemoryBlobStore::new()),
            AttachmentConfig::Filesystem { root } => Arc::new(FsBlobStore::open(root.clone()).await?),
        };
        tracing::info!(backend = blobs.label(), "Attachment store ready");

        let audit = Arc::new(AuditTrail::bootstrap(storage.clone()).await?);
        let settings = Arc::new(SettingsCache::new(
            storage.clone(),
            config.workflow.defaults.clone(),
            Duration::from_secs(config.workflow.settings_cache_ttl_secs),
        ));

        bootstrap_admin(storage.as_ref(), &audit, &config.bootstrap).await?;

        let state = AppState::new(
            storage,
            blobs,
            audit,
            settings,
            Arc::new(TracingNotifier),
        );

        Ok(Self { config, state })
    }

    /// Run the server until a shutdown signal arrives
    pub async fn run(self) -> DaemonResult<()> {
        let addr = self.config.server.listen_addr;
        let app = create_router(self.state, &self.config.server);

        let listener = TcpListener::bind(addr).await?;
        tracing::info!("oversightd listening on {}", addr);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| DaemonError::Server(e.to_string()))?;

        tracing::info!("oversightd shutting down");
        Ok(())
    }
}

/// Create the configured administrator when no users exist yet
async fn bootstrap_admin(
    storage: &dyn Storage,
    audit: &AuditTrail,
    bootstrap: &BootstrapConfig,
) -> DaemonResult<()> {
    if !storage.list_users().await?.is_empty() {
        return Ok(());
    }

    let Some(email) = bootstrap.admin_email.as_deref() else {
        tracing::warn!("No users exist and no bootstrap admin is configured");
        return Ok(());
    };

    let admin = User::new(normalize_email(email), bootstrap.admin_name.trim(), Role::Admin);
    storage.insert_user(admin.clone()).await?;
    audit
        .record(
            AuditRecord::new("system", "user.bootstrapped", EntityKind::User, admin.id)
                .with_detail(serde_json::json!({ "email": admin.email })),
        )
        .await
        .map_err(|e| DaemonError::Server(e.to_string()))?;

    tracing::info!(user_id = %admin.id, email = %admin.email, "Created bootstrap administrator");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        }
    }
}
