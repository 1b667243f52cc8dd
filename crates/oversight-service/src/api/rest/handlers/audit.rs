//! Audit trail queries

use crate::api::rest::auth::CurrentUser;
use crate::api::rest::state::AppState;
use crate::error::{ApiError, ApiResult};
use axum::{
    extract::{Query, State},
    Json,
};
use oversight_core::{authorize, AuditFilter, Permission};
use oversight_types::{AuditEntry, EntityKind};
use serde::{Deserialize, Serialize};

const MAX_PAGE: usize = 500;

/// Audit listing query
#[derive(Debug, Default, Deserialize)]
pub struct AuditQuery {
    pub entity: Option<String>,
    pub entity_id: Option<String>,
    pub actor: Option<String>,
    /// `asc` or `desc` (default)
    pub order: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl AuditQuery {
    fn into_filter(self) -> ApiResult<AuditFilter> {
        let defaults = AuditFilter::default();
        let entity = self
            .entity
            .as_deref()
            .map(str::parse::<EntityKind>)
            .transpose()
            .map_err(ApiError::BadRequest)?;
        let descending = match self.order.as_deref() {
            None | Some("desc") => true,
            Some("asc") => false,
            Some(other) => {
                return Err(ApiError::BadRequest(format!(
                    "unknown order '{other}'; expected asc or desc"
                )))
            }
        };

        Ok(AuditFilter {
            entity,
            entity_id: self.entity_id,
            actor: self.actor,
            descending,
            offset: self.offset.unwrap_or(defaults.offset),
            limit: self.limit.unwrap_or(defaults.limit).clamp(1, MAX_PAGE),
        })
    }
}

/// A page of audit entries
#[derive(Debug, Serialize)]
pub struct AuditListResponse {
    pub total: usize,
    pub chain_valid: bool,
    pub items: Vec<AuditEntry>,
}

/// List audit entries
pub async fn list_audit(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Query(query): Query<AuditQuery>,
) -> ApiResult<Json<AuditListResponse>> {
    authorize(&actor, Permission::ReadAudit)?;
    let filter = query.into_filter()?;

    let page = state.audit.query(&filter).await;
    let chain_valid = state.audit.verify().await;
    if !chain_valid {
        tracing::error!("Audit chain verification failed");
    }

    Ok(Json(AuditListResponse {
        total: page.total,
        chain_valid,
        items: page.items,
    }))
}
