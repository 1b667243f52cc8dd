//! Activity handlers, including the edit lock

use super::{load_activity, load_objective, parse_id, DeleteResponse};
use crate::api::rest::auth::CurrentUser;
use crate::api::rest::state::AppState;
use crate::error::{ApiError, ApiResult};
use crate::storage::{
    ActivityStorage, AttachmentStorage, RevisionFilter, RevisionStorage, SpendStorage,
};
use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::Utc;
use oversight_core::{allows, authorize, EditLock, LockState, Permission, WorkflowError};
use oversight_types::{
    Activity, ActivityId, AttachmentOwner, AuditRecord, EntityKind, ObjectiveId, User,
};
use serde::{Deserialize, Serialize};

/// Activity with its current lock state
#[derive(Debug, Serialize)]
pub struct ActivityView {
    #[serde(flatten)]
    pub activity: Activity,
    pub lock: LockState,
}

impl ActivityView {
    fn new(activity: Activity, lock: &EditLock) -> Self {
        let state = lock.state(&activity, Utc::now());
        Self {
            activity,
            lock: state,
        }
    }
}

/// Activity listing filter
#[derive(Debug, Default, Deserialize)]
pub struct ActivityListQuery {
    pub objective_id: Option<String>,
}

/// Create activity request
#[derive(Debug, Deserialize)]
pub struct CreateActivityRequest {
    pub objective_id: ObjectiveId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub budget_minor: i64,
}

/// Update activity request
#[derive(Debug, Deserialize)]
pub struct UpdateActivityRequest {
    pub expected_version: u64,
    pub title: Option<String>,
    pub description: Option<String>,
    /// Refused; budgets change through revisions
    pub budget_minor: Option<i64>,
}

/// Delete activity query
#[derive(Debug, Deserialize)]
pub struct DeleteActivityQuery {
    pub expected_version: u64,
}

/// Run the edit-lock check for `writer` before a write that touches the
/// activity's children, persisting any lock change it makes.
pub(crate) async fn guard_activity_write(
    state: &AppState,
    activity: &mut Activity,
    writer: &User,
) -> ApiResult<()> {
    let lock = state.edit_lock().await?;
    let now = Utc::now();
    let before = (activity.locked_by_id, activity.locked_at);

    lock.guard_write(activity, writer.id, now)?;

    if (activity.locked_by_id, activity.locked_at) != before {
        let expected = activity.version;
        activity.touch(now);
        state
            .storage
            .update_activity(activity.clone(), expected)
            .await?;
    }
    Ok(())
}

fn ensure_may_lock(user: &User) -> ApiResult<()> {
    let may_write = [
        Permission::WriteActivities,
        Permission::RecordSpend,
        Permission::ManageAttachments,
        Permission::SubmitRevision,
    ]
    .into_iter()
    .any(|p| allows(user.role, p));

    if may_write {
        Ok(())
    } else {
        Err(WorkflowError::Forbidden {
            role: user.role,
            action: "lock activities",
        }
        .into())
    }
}

/// List activities, optionally for one objective
pub async fn list_activities(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Query(query): Query<ActivityListQuery>,
) -> ApiResult<Json<Vec<ActivityView>>> {
    authorize(&actor, Permission::Read)?;
    let activities = match query.objective_id.as_deref() {
        Some(raw) => {
            let objective_id: ObjectiveId = parse_id(raw)?;
            state
                .storage
                .list_activities_for_objective(&objective_id)
                .await?
        }
        None => state.storage.list_activities().await?,
    };

    let lock = state.edit_lock().await?;
    Ok(Json(
        activities
            .into_iter()
            .map(|a| ActivityView::new(a, &lock))
            .collect(),
    ))
}

/// Get a specific activity
pub async fn get_activity(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<String>,
) -> ApiResult<Json<ActivityView>> {
    authorize(&actor, Permission::Read)?;
    let activity_id: ActivityId = parse_id(&id)?;
    let activity = load_activity(&state, &activity_id).await?;
    let lock = state.edit_lock().await?;
    Ok(Json(ActivityView::new(activity, &lock)))
}

/// Create a new activity under an objective
pub async fn create_activity(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Json(request): Json<CreateActivityRequest>,
) -> ApiResult<Json<ActivityView>> {
    authorize(&actor, Permission::WriteActivities)?;
    load_objective(&state, &request.objective_id).await?;

    let title = request.title.trim();
    if title.is_empty() {
        return Err(ApiError::Validation("title must not be empty".to_string()));
    }
    if request.budget_minor < 0 {
        return Err(ApiError::Validation("budget must not be negative".to_string()));
    }

    let mut activity = Activity::new(request.objective_id, title, request.budget_minor, actor.id);
    activity.description = request.description.trim().to_string();
    state.storage.insert_activity(activity.clone()).await?;

    state
        .record(
            AuditRecord::new(actor.id, "activity.created", EntityKind::Activity, activity.id)
                .with_detail(serde_json::json!({
                    "objective_id": activity.objective_id,
                    "title": activity.title,
                    "budget_minor": activity.budget_minor,
                })),
        )
        .await?;

    tracing::info!(activity_id = %activity.id, objective_id = %activity.objective_id, "Created activity");
    let lock = state.edit_lock().await?;
    Ok(Json(ActivityView::new(activity, &lock)))
}

/// Update title or description
pub async fn update_activity(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<String>,
    Json(request): Json<UpdateActivityRequest>,
) -> ApiResult<Json<ActivityView>> {
    authorize(&actor, Permission::WriteActivities)?;
    let activity_id: ActivityId = parse_id(&id)?;

    if request.budget_minor.is_some() {
        return Err(ApiError::Validation(
            "activity budgets change through budget revisions".to_string(),
        ));
    }

    let mut activity = load_activity(&state, &activity_id).await?;
    if activity.version != request.expected_version {
        return Err(ApiError::Conflict(format!(
            "activity version is {}, request expected {}",
            activity.version, request.expected_version
        )));
    }

    let lock = state.edit_lock().await?;
    let now = Utc::now();
    lock.guard_write(&mut activity, actor.id, now)?;

    if let Some(title) = &request.title {
        let title = title.trim();
        if title.is_empty() {
            return Err(ApiError::Validation("title must not be empty".to_string()));
        }
        activity.title = title.to_string();
    }
    if let Some(description) = &request.description {
        activity.description = description.trim().to_string();
    }
    activity.touch(now);

    state
        .storage
        .update_activity(activity.clone(), request.expected_version)
        .await?;
    state
        .record(
            AuditRecord::new(actor.id, "activity.updated", EntityKind::Activity, activity.id)
                .with_detail(serde_json::json!({
                    "version": activity.version,
                    "title": activity.title,
                })),
        )
        .await?;

    tracing::info!(activity_id = %activity.id, version = activity.version, "Updated activity");
    Ok(Json(ActivityView::new(activity, &lock)))
}

/// Delete an activity with no spend, attachments or open revisions
pub async fn delete_activity(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<String>,
    Query(query): Query<DeleteActivityQuery>,
) -> ApiResult<Json<DeleteResponse>> {
    authorize(&actor, Permission::WriteActivities)?;
    let activity_id: ActivityId = parse_id(&id)?;

    let mut activity = load_activity(&state, &activity_id).await?;
    if activity.version != query.expected_version {
        return Err(ApiError::Conflict(format!(
            "activity version is {}, request expected {}",
            activity.version, query.expected_version
        )));
    }

    let lock = state.edit_lock().await?;
    lock.guard_write(&mut activity, actor.id, Utc::now())?;

    let spend = state.storage.list_spend_for_activity(&activity_id).await?;
    if !spend.is_empty() {
        return Err(ApiError::Conflict(format!(
            "Cannot delete activity {} with {} spend entries",
            id,
            spend.len()
        )));
    }
    let attachments = state
        .storage
        .list_attachments_for_owner(&AttachmentOwner::Activity(activity_id))
        .await?;
    if !attachments.is_empty() {
        return Err(ApiError::Conflict(format!(
            "Cannot delete activity {} with {} attachments",
            id,
            attachments.len()
        )));
    }
    let revisions = state
        .storage
        .list_revisions(&RevisionFilter {
            activity_id: Some(activity_id),
            ..RevisionFilter::default()
        })
        .await?;
    if revisions.iter().any(|r| !r.status.is_terminal()) {
        return Err(WorkflowError::OpenRevisionExists(activity_id).into());
    }

    let deleted = state
        .storage
        .delete_activity(&activity_id, query.expected_version)
        .await?;
    if deleted {
        state
            .record(AuditRecord::new(
                actor.id,
                "activity.deleted",
                EntityKind::Activity,
                activity_id,
            ))
            .await?;
        tracing::info!(activity_id = %id, "Deleted activity");
    }

    Ok(Json(DeleteResponse { deleted }))
}

/// Take or refresh the edit lock
pub async fn lock_activity(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<String>,
) -> ApiResult<Json<ActivityView>> {
    authorize(&actor, Permission::Read)?;
    ensure_may_lock(&actor)?;
    let activity_id: ActivityId = parse_id(&id)?;

    let mut activity = load_activity(&state, &activity_id).await?;
    let expected = activity.version;
    let lock = state.edit_lock().await?;
    let held = lock.acquire(&mut activity, &actor, Utc::now())?;

    state
        .storage
        .update_activity(activity.clone(), expected)
        .await?;

    let expires_at = match held {
        LockState::Held { expires_at, .. } => Some(expires_at),
        _ => None,
    };
    state
        .record(
            AuditRecord::new(actor.id, "activity.locked", EntityKind::Activity, activity.id)
                .with_detail(serde_json::json!({ "expires_at": expires_at })),
        )
        .await?;

    tracing::info!(activity_id = %activity.id, user_id = %actor.id, "Locked activity");
    Ok(Json(ActivityView::new(activity, &lock)))
}

/// Release the edit lock (holder, or Admin to force)
pub async fn unlock_activity(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<String>,
) -> ApiResult<Json<ActivityView>> {
    authorize(&actor, Permission::Read)?;
    let activity_id: ActivityId = parse_id(&id)?;

    let mut activity = load_activity(&state, &activity_id).await?;
    let expected = activity.version;
    let previous_holder = activity.locked_by_id;
    let lock = state.edit_lock().await?;

    if lock.release(&mut activity, &actor, Utc::now())? {
        state
            .storage
            .update_activity(activity.clone(), expected)
            .await?;
        state
            .record(
                AuditRecord::new(actor.id, "activity.unlocked", EntityKind::Activity, activity.id)
                    .with_detail(serde_json::json!({ "previous_holder": previous_holder })),
            )
            .await?;
        tracing::info!(activity_id = %activity.id, user_id = %actor.id, "Released activity lock");
    }

    Ok(Json(ActivityView::new(activity, &lock)))
}
