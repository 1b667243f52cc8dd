//! Investment objective handlers

use super::{load_objective, parse_id, DeleteResponse};
use crate::api::rest::auth::CurrentUser;
use crate::api::rest::state::AppState;
use crate::error::{ApiError, ApiResult};
use crate::storage::{ActivityStorage, ObjectiveStorage, RevisionFilter, RevisionStorage, SpendStorage};
use axum::{
    extract::{Path, Query, State},
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use oversight_core::{authorize, summarize_objective, ObjectiveReport, ObjectiveSummary, Permission};
use oversight_types::{AuditRecord, EntityKind, InvestmentObjective, ObjectiveId, SpendEntry};
use serde::Deserialize;

/// Create objective request
#[derive(Debug, Deserialize)]
pub struct CreateObjectiveRequest {
    pub code: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub budget_minor: i64,
}

/// Update objective request
#[derive(Debug, Deserialize)]
pub struct UpdateObjectiveRequest {
    pub expected_version: u64,
    pub code: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub budget_minor: Option<i64>,
}

/// Report format selector
#[derive(Debug, Default, Deserialize)]
pub struct ReportQuery {
    #[serde(default)]
    pub format: Option<String>,
}

fn validate_code(code: &str) -> ApiResult<String> {
    let code = code.trim();
    if code.is_empty() || code.len() > 32 {
        return Err(ApiError::Validation(
            "objective code must be 1 to 32 characters".to_string(),
        ));
    }
    Ok(code.to_string())
}

fn validate_title(title: &str) -> ApiResult<String> {
    let title = title.trim();
    if title.is_empty() {
        return Err(ApiError::Validation("title must not be empty".to_string()));
    }
    Ok(title.to_string())
}

fn validate_budget(budget_minor: i64) -> ApiResult<i64> {
    if budget_minor < 0 {
        return Err(ApiError::Validation("budget must not be negative".to_string()));
    }
    Ok(budget_minor)
}

/// List all objectives
pub async fn list_objectives(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
) -> ApiResult<Json<Vec<InvestmentObjective>>> {
    authorize(&actor, Permission::Read)?;
    Ok(Json(state.storage.list_objectives().await?))
}

/// Get a specific objective
pub async fn get_objective(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<String>,
) -> ApiResult<Json<InvestmentObjective>> {
    authorize(&actor, Permission::Read)?;
    let objective_id: ObjectiveId = parse_id(&id)?;
    Ok(Json(load_objective(&state, &objective_id).await?))
}

/// Create a new objective
pub async fn create_objective(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Json(request): Json<CreateObjectiveRequest>,
) -> ApiResult<Json<InvestmentObjective>> {
    authorize(&actor, Permission::WriteObjectives)?;

    let mut objective = InvestmentObjective::new(
        validate_code(&request.code)?,
        validate_title(&request.title)?,
        validate_budget(request.budget_minor)?,
        actor.id,
    );
    objective.description = request.description.trim().to_string();

    state.storage.insert_objective(objective.clone()).await?;
    state
        .record(
            AuditRecord::new(actor.id, "objective.created", EntityKind::Objective, objective.id)
                .with_detail(serde_json::json!({
                    "code": objective.code,
                    "budget_minor": objective.budget_minor,
                })),
        )
        .await?;

    tracing::info!(objective_id = %objective.id, code = %objective.code, "Created objective");
    Ok(Json(objective))
}

/// Update an existing objective
pub async fn update_objective(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<String>,
    Json(request): Json<UpdateObjectiveRequest>,
) -> ApiResult<Json<InvestmentObjective>> {
    authorize(&actor, Permission::WriteObjectives)?;
    let objective_id: ObjectiveId = parse_id(&id)?;
    let mut objective = load_objective(&state, &objective_id).await?;

    if objective.version != request.expected_version {
        return Err(ApiError::Conflict(format!(
            "objective version is {}, request expected {}",
            objective.version, request.expected_version
        )));
    }

    let previous_budget = objective.budget_minor;
    if let Some(code) = &request.code {
        objective.code = validate_code(code)?;
    }
    if let Some(title) = &request.title {
        objective.title = validate_title(title)?;
    }
    if let Some(description) = &request.description {
        objective.description = description.trim().to_string();
    }
    if let Some(budget_minor) = request.budget_minor {
        objective.budget_minor = validate_budget(budget_minor)?;
    }
    objective.version += 1;
    objective.updated_at = Utc::now();

    state
        .storage
        .update_objective(objective.clone(), request.expected_version)
        .await?;
    state
        .record(
            AuditRecord::new(actor.id, "objective.updated", EntityKind::Objective, objective.id)
                .with_detail(serde_json::json!({
                    "version": objective.version,
                    "previous_budget_minor": previous_budget,
                    "budget_minor": objective.budget_minor,
                })),
        )
        .await?;

    tracing::info!(objective_id = %objective.id, version = objective.version, "Updated objective");
    Ok(Json(objective))
}

/// Delete an objective that has no activities
pub async fn delete_objective(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<String>,
) -> ApiResult<Json<DeleteResponse>> {
    authorize(&actor, Permission::WriteObjectives)?;
    let objective_id: ObjectiveId = parse_id(&id)?;

    let activities = state
        .storage
        .list_activities_for_objective(&objective_id)
        .await?;
    if !activities.is_empty() {
        return Err(ApiError::Conflict(format!(
            "Cannot delete objective {} with {} activities",
            id,
            activities.len()
        )));
    }

    let deleted = state.storage.delete_objective(&objective_id).await?;
    if deleted {
        state
            .record(AuditRecord::new(
                actor.id,
                "objective.deleted",
                EntityKind::Objective,
                objective_id,
            ))
            .await?;
        tracing::info!(objective_id = %id, "Deleted objective");
    }

    Ok(Json(DeleteResponse { deleted }))
}

async fn objective_spend(
    state: &AppState,
    activities: &[oversight_types::Activity],
) -> ApiResult<Vec<SpendEntry>> {
    let mut spend = Vec::new();
    for activity in activities {
        spend.extend(state.storage.list_spend_for_activity(&activity.id).await?);
    }
    Ok(spend)
}

/// Budget position of one objective
pub async fn objective_summary(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<String>,
) -> ApiResult<Json<ObjectiveSummary>> {
    authorize(&actor, Permission::Read)?;
    let objective_id: ObjectiveId = parse_id(&id)?;
    let objective = load_objective(&state, &objective_id).await?;

    let activities = state
        .storage
        .list_activities_for_objective(&objective_id)
        .await?;
    let spend = objective_spend(&state, &activities).await?;
    let revisions = state.storage.list_revisions(&RevisionFilter::default()).await?;

    Ok(Json(summarize_objective(
        &objective,
        &activities,
        &spend,
        &revisions,
    )))
}

/// Export an objective report as JSON (default) or CSV
pub async fn objective_report(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<String>,
    Query(query): Query<ReportQuery>,
) -> ApiResult<Response> {
    authorize(&actor, Permission::Export)?;
    let objective_id: ObjectiveId = parse_id(&id)?;
    let objective = load_objective(&state, &objective_id).await?;

    let activities = state
        .storage
        .list_activities_for_objective(&objective_id)
        .await?;
    let spend = objective_spend(&state, &activities).await?;
    let revisions = state.storage.list_revisions(&RevisionFilter::default()).await?;
    let report = ObjectiveReport::build(&objective, &activities, &spend, &revisions, Utc::now());

    let format = query.format.as_deref().unwrap_or("json").to_ascii_lowercase();
    let (content_type, extension, body) = match format.as_str() {
        "json" => (
            "application/json",
            "json",
            report
                .to_json()
                .map_err(|e| ApiError::Internal(format!("report serialization failed: {e}")))?,
        ),
        "csv" => ("text/csv; charset=utf-8", "csv", report.to_csv()),
        other => {
            return Err(ApiError::BadRequest(format!(
                "unsupported report format '{other}'; expected json or csv"
            )))
        }
    };

    tracing::info!(objective_id = %objective.id, format = %format, "Exported objective report");

    let disposition = format!(
        "attachment; filename=\"objective-{}.{}\"",
        objective.code.replace(|c: char| !c.is_ascii_alphanumeric() && c != '-', "_"),
        extension
    );
    Ok((
        [
            (header::CONTENT_TYPE, content_type.to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    )
        .into_response())
}
