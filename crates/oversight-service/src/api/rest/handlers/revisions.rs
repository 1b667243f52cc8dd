//! Budget revision handlers
//!
//! A revision that reaches `CommitteeApproved` is applied to its activity in
//! the same request. Every revision write names the status it was loaded in,
//! so two decisions racing on the same revision cannot both land. On committee
//! approval the revision write goes first; if the activity write then fails
//! the revision is put back to the state it was loaded in.

use super::{load_activity, parse_id};
use crate::api::rest::auth::CurrentUser;
use crate::api::rest::state::AppState;
use crate::error::{ApiError, ApiResult, StorageError};
use crate::notify::WorkflowEvent;
use crate::storage::{ActivityStorage, RevisionFilter, RevisionStorage};
use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::Utc;
use oversight_core::{authorize, Permission, WorkflowError};
use oversight_types::{
    ActivityId, ApprovalStatus, AuditRecord, BudgetRevision, EntityKind, RevisionId,
};
use serde::Deserialize;

/// Revision listing filter
#[derive(Debug, Default, Deserialize)]
pub struct RevisionListQuery {
    pub status: Option<String>,
    pub activity_id: Option<String>,
}

/// Submit revision request
#[derive(Debug, Deserialize)]
pub struct SubmitRevisionRequest {
    pub proposed_budget_minor: i64,
    #[serde(default)]
    pub justification: String,
}

/// Approval decision request
#[derive(Debug, Default, Deserialize)]
pub struct DecisionRequest {
    #[serde(default)]
    pub note: Option<String>,
}

/// Rejection request
#[derive(Debug, Deserialize)]
pub struct RejectRequest {
    #[serde(default)]
    pub note: String,
}

async fn load_revision(state: &AppState, raw: &str) -> ApiResult<BudgetRevision> {
    let revision_id: RevisionId = parse_id(raw)?;
    state
        .storage
        .get_revision(&revision_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Revision {} not found", raw)))
}

fn audit_detail(revision: &BudgetRevision) -> serde_json::Value {
    serde_json::json!({
        "activity_id": revision.activity_id,
        "status": revision.status,
        "current_budget_minor": revision.current_budget_minor,
        "proposed_budget_minor": revision.proposed_budget_minor,
        "auto_approved": revision.auto_approved,
        "applied": revision.applied,
    })
}

/// List revisions, newest first
pub async fn list_revisions(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Query(query): Query<RevisionListQuery>,
) -> ApiResult<Json<Vec<BudgetRevision>>> {
    authorize(&actor, Permission::Read)?;

    let status = query
        .status
        .as_deref()
        .map(str::parse::<ApprovalStatus>)
        .transpose()
        .map_err(ApiError::BadRequest)?;
    let activity_id = query
        .activity_id
        .as_deref()
        .map(parse_id::<ActivityId>)
        .transpose()?;

    let revisions = state
        .storage
        .list_revisions(&RevisionFilter {
            status,
            activity_id,
        })
        .await?;
    Ok(Json(revisions))
}

/// Get a specific revision
pub async fn get_revision(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<String>,
) -> ApiResult<Json<BudgetRevision>> {
    authorize(&actor, Permission::Read)?;
    Ok(Json(load_revision(&state, &id).await?))
}

/// Submit a budget revision for an activity
pub async fn submit_revision(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<String>,
    Json(request): Json<SubmitRevisionRequest>,
) -> ApiResult<Json<BudgetRevision>> {
    let activity_id: ActivityId = parse_id(&id)?;
    let mut activity = load_activity(&state, &activity_id).await?;
    let workflow = state.workflow().await?;

    let existing = state
        .storage
        .list_revisions(&RevisionFilter {
            activity_id: Some(activity_id),
            ..RevisionFilter::default()
        })
        .await?;
    workflow.ensure_no_open_revision(&activity, existing.iter())?;

    let now = Utc::now();
    let mut revision = workflow.submit(
        &activity,
        &actor,
        request.proposed_budget_minor,
        request.justification.trim(),
        now,
    )?;

    if revision.auto_approved {
        let expected = activity.version;
        workflow.apply(&mut revision, &mut activity, &actor, now)?;
        state
            .storage
            .update_activity(activity.clone(), expected)
            .await?;
    }

    state
        .storage
        .insert_revision(revision.clone())
        .await
        .map_err(|err| match err {
            StorageError::Conflict(_) => {
                ApiError::from(WorkflowError::OpenRevisionExists(activity_id))
            }
            other => ApiError::from(other),
        })?;
    state
        .record(
            AuditRecord::new(actor.id, "revision.submitted", EntityKind::Revision, revision.id)
                .with_detail(audit_detail(&revision)),
        )
        .await?;

    tracing::info!(
        revision_id = %revision.id,
        activity_id = %activity_id,
        auto_approved = revision.auto_approved,
        "Submitted budget revision"
    );

    state.notify(WorkflowEvent::RevisionSubmitted {
        revision_id: revision.id,
        activity_id,
        requested_by: actor.id,
        proposed_budget_minor: revision.proposed_budget_minor,
    });
    if revision.auto_approved {
        state
            .record(
                AuditRecord::new("system", "revision.auto_approved", EntityKind::Revision, revision.id)
                    .with_detail(audit_detail(&revision)),
            )
            .await?;
        state.notify(WorkflowEvent::RevisionAutoApproved {
            revision_id: revision.id,
            activity_id,
            budget_minor: activity.budget_minor,
        });
    }

    Ok(Json(revision))
}

/// Finance sign-off: `Submitted -> FinanceApproved`
pub async fn finance_approve_revision(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<String>,
    body: Option<Json<DecisionRequest>>,
) -> ApiResult<Json<BudgetRevision>> {
    let mut revision = load_revision(&state, &id).await?;
    let workflow = state.workflow().await?;
    let note = body.and_then(|Json(b)| b.note);
    let loaded_status = revision.status;

    workflow.finance_approve(&mut revision, &actor, note, Utc::now())?;
    state
        .storage
        .update_revision(revision.clone(), loaded_status)
        .await?;
    state
        .record(
            AuditRecord::new(actor.id, "revision.finance_approved", EntityKind::Revision, revision.id)
                .with_detail(audit_detail(&revision)),
        )
        .await?;

    tracing::info!(revision_id = %revision.id, user_id = %actor.id, "Finance approved revision");
    state.notify(WorkflowEvent::RevisionFinanceApproved {
        revision_id: revision.id,
        activity_id: revision.activity_id,
        actor: actor.id,
    });
    Ok(Json(revision))
}

/// Committee sign-off: `FinanceApproved -> CommitteeApproved`, then apply
pub async fn committee_approve_revision(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<String>,
    body: Option<Json<DecisionRequest>>,
) -> ApiResult<Json<BudgetRevision>> {
    let mut revision = load_revision(&state, &id).await?;
    let workflow = state.workflow().await?;
    let note = body.and_then(|Json(b)| b.note);
    let now = Utc::now();
    let loaded = revision.clone();

    workflow.committee_approve(&mut revision, &actor, note, now)?;
    let mut activity = load_activity(&state, &revision.activity_id).await?;
    let expected_version = activity.version;
    workflow.apply(&mut revision, &mut activity, &actor, now)?;

    state
        .storage
        .update_revision(revision.clone(), loaded.status)
        .await?;
    if let Err(err) = state
        .storage
        .update_activity(activity.clone(), expected_version)
        .await
    {
        if let Err(restore) = state
            .storage
            .update_revision(loaded, ApprovalStatus::CommitteeApproved)
            .await
        {
            tracing::error!(
                revision_id = %revision.id,
                error = %restore,
                "Failed to restore revision after activity write failed"
            );
        }
        return Err(err.into());
    }

    state
        .record(
            AuditRecord::new(
                actor.id,
                "revision.committee_approved",
                EntityKind::Revision,
                revision.id,
            )
            .with_detail(audit_detail(&revision)),
        )
        .await?;

    tracing::info!(
        revision_id = %revision.id,
        activity_id = %activity.id,
        budget_minor = activity.budget_minor,
        "Committee approved and applied revision"
    );
    state.notify(WorkflowEvent::RevisionCommitteeApproved {
        revision_id: revision.id,
        activity_id: activity.id,
        actor: actor.id,
        budget_minor: activity.budget_minor,
    });
    Ok(Json(revision))
}

/// Reject an open revision; a note is required
pub async fn reject_revision(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<String>,
    Json(request): Json<RejectRequest>,
) -> ApiResult<Json<BudgetRevision>> {
    let mut revision = load_revision(&state, &id).await?;
    let workflow = state.workflow().await?;
    let note = request.note.trim().to_string();
    let loaded_status = revision.status;

    workflow.reject(&mut revision, &actor, Some(note.clone()), Utc::now())?;
    state
        .storage
        .update_revision(revision.clone(), loaded_status)
        .await?;
    state
        .record(
            AuditRecord::new(actor.id, "revision.rejected", EntityKind::Revision, revision.id)
                .with_detail(audit_detail(&revision)),
        )
        .await?;

    tracing::info!(revision_id = %revision.id, user_id = %actor.id, "Rejected revision");
    state.notify(WorkflowEvent::RevisionRejected {
        revision_id: revision.id,
        activity_id: revision.activity_id,
        actor: actor.id,
        note,
    });
    Ok(Json(revision))
}
