//! Health handler

use crate::api::rest::state::AppState;
use axum::{extract::State, Json};
use serde::Serialize;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthCheckResponse {
    pub status: String,
    pub version: String,
    pub uptime: String,
    pub storage: String,
    pub attachments: String,
    pub audit_entries: usize,
    pub audit_chain_valid: bool,
}

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<HealthCheckResponse> {
    let audit_chain_valid = state.audit.verify().await;
    Json(HealthCheckResponse {
        status: if audit_chain_valid { "healthy" } else { "degraded" }.to_string(),
        version: state.version.clone(),
        uptime: state.uptime(),
        storage: state.storage.backend().to_string(),
        attachments: state.blobs.label().to_string(),
        audit_entries: state.audit.len().await,
        audit_chain_valid,
    })
}
