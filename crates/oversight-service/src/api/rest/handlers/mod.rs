//! API request handlers

mod activities;
mod attachments;
mod audit;
mod dashboard;
mod health;
mod objectives;
mod revisions;
mod settings;
mod spend;
mod users;

pub use activities::*;
pub use attachments::*;
pub use audit::*;
pub use dashboard::*;
pub use health::*;
pub use objectives::*;
pub use revisions::*;
pub use settings::*;
pub use spend::*;
pub use users::*;

use crate::api::rest::state::AppState;
use crate::error::{ApiError, ApiResult};
use crate::storage::{ActivityStorage, ObjectiveStorage};
use oversight_types::{Activity, ActivityId, IdParseError, InvestmentObjective, ObjectiveId};
use serde::Serialize;
use std::str::FromStr;

/// Delete response
#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub deleted: bool,
}

/// Parse a path segment into a typed id
pub(crate) fn parse_id<T>(raw: &str) -> ApiResult<T>
where
    T: FromStr<Err = IdParseError>,
{
    raw.parse::<T>()
        .map_err(|e| ApiError::BadRequest(e.to_string()))
}

pub(crate) async fn load_objective(
    state: &AppState,
    id: &ObjectiveId,
) -> ApiResult<InvestmentObjective> {
    state
        .storage
        .get_objective(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Objective {} not found", id)))
}

pub(crate) async fn load_activity(state: &AppState, id: &ActivityId) -> ApiResult<Activity> {
    state
        .storage
        .get_activity(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Activity {} not found", id)))
}
