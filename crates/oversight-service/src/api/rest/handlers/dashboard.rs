//! Portfolio dashboard

use crate::api::rest::auth::CurrentUser;
use crate::api::rest::state::AppState;
use crate::error::ApiResult;
use crate::storage::{ActivityStorage, ObjectiveStorage, RevisionFilter, RevisionStorage, SpendStorage};
use axum::{extract::State, Json};
use chrono::Utc;
use oversight_core::{authorize, build_dashboard, DashboardSummary, Permission};

/// Budget, spend and approval totals across every objective
pub async fn dashboard(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
) -> ApiResult<Json<DashboardSummary>> {
    authorize(&actor, Permission::Read)?;

    let objectives = state.storage.list_objectives().await?;
    let activities = state.storage.list_activities().await?;
    let spend = state.storage.list_spend().await?;
    let revisions = state.storage.list_revisions(&RevisionFilter::default()).await?;
    let lock = state.edit_lock().await?;

    Ok(Json(build_dashboard(
        &objectives,
        &activities,
        &spend,
        &revisions,
        &lock,
        Utc::now(),
    )))
}
