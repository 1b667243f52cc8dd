//! Attachment handlers
//!
//! Uploads carry the raw file as the request body and the filename as a
//! query parameter.

use super::activities::guard_activity_write;
use super::{load_activity, parse_id, DeleteResponse};
use crate::api::rest::auth::CurrentUser;
use crate::api::rest::state::AppState;
use crate::blob::content_key;
use crate::error::{ApiError, ApiResult};
use crate::storage::{AttachmentStorage, SpendStorage};
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, HeaderMap},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use oversight_core::{authorize, Permission};
use oversight_types::{
    sanitize_filename, ActivityId, Attachment, AttachmentId, AttachmentOwner, AuditRecord,
    EntityKind, SpendId, User,
};
use serde::Deserialize;

/// Upload query
#[derive(Debug, Deserialize)]
pub struct UploadQuery {
    pub filename: String,
}

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

fn content_type_of(headers: &HeaderMap) -> String {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or(DEFAULT_CONTENT_TYPE)
        .to_string()
}

/// Activity an attachment owner belongs to
async fn owning_activity(state: &AppState, owner: &AttachmentOwner) -> ApiResult<ActivityId> {
    match owner {
        AttachmentOwner::Activity(id) => Ok(*id),
        AttachmentOwner::Spend(id) => state
            .storage
            .get_spend(id)
            .await?
            .map(|s| s.activity_id)
            .ok_or_else(|| ApiError::NotFound(format!("Spend entry {} not found", id))),
    }
}

async fn store_attachment(
    state: &AppState,
    actor: &User,
    owner: AttachmentOwner,
    filename: &str,
    content_type: String,
    body: Bytes,
) -> ApiResult<Attachment> {
    authorize(actor, Permission::ManageAttachments)?;

    let settings = state.settings.get().await?;
    if body.is_empty() {
        return Err(ApiError::Validation("attachment body is empty".to_string()));
    }
    if body.len() as u64 > settings.max_attachment_bytes {
        return Err(ApiError::PayloadTooLarge(format!(
            "attachment is {} bytes, limit is {}",
            body.len(),
            settings.max_attachment_bytes
        )));
    }

    let activity_id = owning_activity(state, &owner).await?;
    let mut activity = load_activity(state, &activity_id).await?;
    guard_activity_write(state, &mut activity, actor).await?;

    let key_guard = state.blob_locks.acquire(&content_key(&body)).await;
    let blob = state.blobs.put(&body).await?;
    let attachment = Attachment {
        id: AttachmentId::generate(),
        owner,
        filename: sanitize_filename(filename),
        content_type,
        size_bytes: blob.size_bytes,
        content_hash: blob.content_hash,
        storage_key: blob.key,
        uploaded_by: actor.id,
        uploaded_at: Utc::now(),
    };
    state.storage.insert_attachment(attachment.clone()).await?;
    drop(key_guard);

    state
        .record(
            AuditRecord::new(
                actor.id,
                "attachment.uploaded",
                EntityKind::Attachment,
                attachment.id,
            )
            .with_detail(serde_json::json!({
                "owner": attachment.owner,
                "filename": attachment.filename,
                "size_bytes": attachment.size_bytes,
                "content_hash": attachment.content_hash,
            })),
        )
        .await?;

    tracing::info!(
        attachment_id = %attachment.id,
        size_bytes = attachment.size_bytes,
        "Stored attachment"
    );
    Ok(attachment)
}

/// List attachments on an activity
pub async fn list_activity_attachments(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<Attachment>>> {
    authorize(&actor, Permission::Read)?;
    let activity_id: ActivityId = parse_id(&id)?;
    load_activity(&state, &activity_id).await?;
    Ok(Json(
        state
            .storage
            .list_attachments_for_owner(&AttachmentOwner::Activity(activity_id))
            .await?,
    ))
}

/// List attachments on a spend entry
pub async fn list_spend_attachments(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<Attachment>>> {
    authorize(&actor, Permission::Read)?;
    let spend_id: SpendId = parse_id(&id)?;
    Ok(Json(
        state
            .storage
            .list_attachments_for_owner(&AttachmentOwner::Spend(spend_id))
            .await?,
    ))
}

/// Upload an attachment to an activity
pub async fn upload_activity_attachment(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<String>,
    Query(query): Query<UploadQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<Attachment>> {
    let activity_id: ActivityId = parse_id(&id)?;
    let attachment = store_attachment(
        &state,
        &actor,
        AttachmentOwner::Activity(activity_id),
        &query.filename,
        content_type_of(&headers),
        body,
    )
    .await?;
    Ok(Json(attachment))
}

/// Upload an attachment to a spend entry
pub async fn upload_spend_attachment(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<String>,
    Query(query): Query<UploadQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<Attachment>> {
    let spend_id: SpendId = parse_id(&id)?;
    let attachment = store_attachment(
        &state,
        &actor,
        AttachmentOwner::Spend(spend_id),
        &query.filename,
        content_type_of(&headers),
        body,
    )
    .await?;
    Ok(Json(attachment))
}

async fn load_attachment(state: &AppState, raw: &str) -> ApiResult<Attachment> {
    let attachment_id: AttachmentId = parse_id(raw)?;
    state
        .storage
        .get_attachment(&attachment_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Attachment {} not found", raw)))
}

/// Attachment metadata
pub async fn get_attachment(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<String>,
) -> ApiResult<Json<Attachment>> {
    authorize(&actor, Permission::Read)?;
    Ok(Json(load_attachment(&state, &id).await?))
}

/// Attachment content
pub async fn get_attachment_content(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    authorize(&actor, Permission::Read)?;
    let attachment = load_attachment(&state, &id).await?;

    let bytes = state
        .blobs
        .get(&attachment.storage_key)
        .await?
        .ok_or_else(|| {
            ApiError::Internal(format!(
                "content for attachment {} is missing from the blob store",
                attachment.id
            ))
        })?;

    let disposition = format!(
        "attachment; filename=\"{}\"",
        attachment.filename.replace(['"', '\\'], "_")
    );
    Ok((
        [
            (header::CONTENT_TYPE, attachment.content_type.clone()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    )
        .into_response())
}

/// Delete an attachment; the blob goes once nothing references it
pub async fn delete_attachment(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<String>,
) -> ApiResult<Json<DeleteResponse>> {
    authorize(&actor, Permission::ManageAttachments)?;
    let attachment = load_attachment(&state, &id).await?;

    let activity_id = owning_activity(&state, &attachment.owner).await?;
    let mut activity = load_activity(&state, &activity_id).await?;
    guard_activity_write(&state, &mut activity, &actor).await?;

    let key_guard = state.blob_locks.acquire(&attachment.storage_key).await;
    let deleted = state.storage.delete_attachment(&attachment.id).await?;
    if deleted
        && state
            .storage
            .count_attachments_with_key(&attachment.storage_key)
            .await?
            == 0
    {
        state.blobs.delete(&attachment.storage_key).await?;
    }
    drop(key_guard);

    if deleted {
        state
            .record(
                AuditRecord::new(
                    actor.id,
                    "attachment.deleted",
                    EntityKind::Attachment,
                    attachment.id,
                )
                .with_detail(serde_json::json!({
                    "filename": attachment.filename,
                    "content_hash": attachment.content_hash,
                })),
            )
            .await?;
        tracing::info!(attachment_id = %attachment.id, "Deleted attachment");
    }

    Ok(Json(DeleteResponse { deleted }))
}
