//! Actual spend handlers

use super::activities::guard_activity_write;
use super::{load_activity, parse_id, DeleteResponse};
use crate::api::rest::auth::CurrentUser;
use crate::api::rest::state::AppState;
use crate::error::{ApiError, ApiResult};
use crate::storage::{AttachmentStorage, SpendStorage};
use axum::{
    extract::{Path, State},
    Json,
};
use chrono::NaiveDate;
use oversight_core::{authorize, Permission};
use oversight_types::{
    format_minor, ActivityId, AttachmentOwner, AuditRecord, EntityKind, SpendEntry, SpendId,
};
use serde::Deserialize;

/// Record spend request
#[derive(Debug, Deserialize)]
pub struct CreateSpendRequest {
    pub amount_minor: i64,
    pub spent_on: NaiveDate,
    #[serde(default)]
    pub description: String,
}

/// List spend recorded against an activity
pub async fn list_spend(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<SpendEntry>>> {
    authorize(&actor, Permission::Read)?;
    let activity_id: ActivityId = parse_id(&id)?;
    load_activity(&state, &activity_id).await?;
    Ok(Json(state.storage.list_spend_for_activity(&activity_id).await?))
}

/// Record a spend line
pub async fn create_spend(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<String>,
    Json(request): Json<CreateSpendRequest>,
) -> ApiResult<Json<SpendEntry>> {
    authorize(&actor, Permission::RecordSpend)?;
    let activity_id: ActivityId = parse_id(&id)?;

    if request.amount_minor <= 0 {
        return Err(ApiError::Validation("spend amount must be positive".to_string()));
    }

    let mut activity = load_activity(&state, &activity_id).await?;
    guard_activity_write(&state, &mut activity, &actor).await?;

    let mut entry = SpendEntry::new(activity_id, request.amount_minor, request.spent_on, actor.id);
    entry.description = request.description.trim().to_string();
    state.storage.insert_spend(entry.clone()).await?;

    state
        .record(
            AuditRecord::new(actor.id, "spend.recorded", EntityKind::Spend, entry.id).with_detail(
                serde_json::json!({
                    "activity_id": activity_id,
                    "amount_minor": entry.amount_minor,
                    "spent_on": entry.spent_on,
                }),
            ),
        )
        .await?;

    tracing::info!(
        spend_id = %entry.id,
        activity_id = %activity_id,
        amount = %format_minor(entry.amount_minor),
        "Recorded spend"
    );
    Ok(Json(entry))
}

/// Delete a spend line that has no attachments
pub async fn delete_spend(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<String>,
) -> ApiResult<Json<DeleteResponse>> {
    authorize(&actor, Permission::RecordSpend)?;
    let spend_id: SpendId = parse_id(&id)?;

    let entry = state
        .storage
        .get_spend(&spend_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Spend entry {} not found", id)))?;

    let attachments = state
        .storage
        .list_attachments_for_owner(&AttachmentOwner::Spend(spend_id))
        .await?;
    if !attachments.is_empty() {
        return Err(ApiError::Conflict(format!(
            "Cannot delete spend entry {} with {} attachments",
            id,
            attachments.len()
        )));
    }

    let mut activity = load_activity(&state, &entry.activity_id).await?;
    guard_activity_write(&state, &mut activity, &actor).await?;

    let deleted = state.storage.delete_spend(&spend_id).await?;
    if deleted {
        state
            .record(
                AuditRecord::new(actor.id, "spend.deleted", EntityKind::Spend, spend_id)
                    .with_detail(serde_json::json!({
                        "activity_id": entry.activity_id,
                        "amount_minor": entry.amount_minor,
                    })),
            )
            .await?;
        tracing::info!(spend_id = %id, "Deleted spend entry");
    }

    Ok(Json(DeleteResponse { deleted }))
}
