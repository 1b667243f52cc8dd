//! Runtime settings

use crate::api::rest::auth::CurrentUser;
use crate::api::rest::state::AppState;
use crate::error::ApiResult;
use axum::{extract::State, Json};
use oversight_core::{authorize, Permission};
use oversight_types::{AuditRecord, EntityKind, Settings};

pub async fn get_settings(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
) -> ApiResult<Json<Settings>> {
    authorize(&actor, Permission::Read)?;
    Ok(Json(state.settings.get().await?))
}

/// Replace the runtime settings (Admin)
pub async fn update_settings(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Json(request): Json<Settings>,
) -> ApiResult<Json<Settings>> {
    authorize(&actor, Permission::ManageSettings)?;

    let previous = state.settings.get().await?;
    let updated = state.settings.update(request).await?;

    state
        .record(
            AuditRecord::new(actor.id, "settings.updated", EntityKind::Settings, "global")
                .with_detail(serde_json::json!({
                    "previous": previous,
                    "current": updated,
                })),
        )
        .await?;

    tracing::info!(
        auto_approve_max_minor = updated.auto_approve_max_minor,
        auto_approve_max_percent_bp = updated.auto_approve_max_percent_bp,
        lock_ttl_minutes = updated.lock_ttl_minutes,
        "Updated settings"
    );
    Ok(Json(updated))
}
