//! User management handlers

use super::parse_id;
use crate::api::rest::auth::CurrentUser;
use crate::api::rest::state::AppState;
use crate::error::{ApiError, ApiResult};
use crate::storage::UserStorage;
use axum::{
    extract::{Path, State},
    Json,
};
use chrono::Utc;
use oversight_core::{authorize, Permission};
use oversight_types::{normalize_email, AuditRecord, EntityKind, Role, User, UserId};
use serde::Deserialize;

/// Create user request
#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub email: String,
    pub display_name: String,
    pub role: Role,
}

/// Update user request; absent fields are left unchanged
#[derive(Debug, Deserialize)]
pub struct UpdateUserRequest {
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub role: Option<Role>,
    pub active: Option<bool>,
}

fn validate_email(email: &str) -> ApiResult<String> {
    let email = normalize_email(email);
    let valid = match email.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.') && !domain.starts_with('.'),
        None => false,
    };
    if valid {
        Ok(email)
    } else {
        Err(ApiError::Validation(format!("invalid email address '{email}'")))
    }
}

fn validate_name(name: &str) -> ApiResult<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ApiError::Validation("display name must not be empty".to_string()));
    }
    Ok(name.to_string())
}

/// The acting user
pub async fn current_user(CurrentUser(user): CurrentUser) -> Json<User> {
    Json(user)
}

/// List all users
pub async fn list_users(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
) -> ApiResult<Json<Vec<User>>> {
    authorize(&actor, Permission::ManageUsers)?;
    Ok(Json(state.storage.list_users().await?))
}

/// Get a specific user
pub async fn get_user(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<String>,
) -> ApiResult<Json<User>> {
    let user_id: UserId = parse_id(&id)?;
    if user_id != actor.id {
        authorize(&actor, Permission::ManageUsers)?;
    }
    let user = state
        .storage
        .get_user(&user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("User {} not found", id)))?;
    Ok(Json(user))
}

/// Create a new user
pub async fn create_user(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Json(request): Json<CreateUserRequest>,
) -> ApiResult<Json<User>> {
    authorize(&actor, Permission::ManageUsers)?;

    let email = validate_email(&request.email)?;
    let user = User::new(email, validate_name(&request.display_name)?, request.role);
    state.storage.insert_user(user.clone()).await?;

    state
        .record(
            AuditRecord::new(actor.id, "user.created", EntityKind::User, user.id).with_detail(
                serde_json::json!({ "email": user.email, "role": user.role }),
            ),
        )
        .await?;

    tracing::info!(user_id = %user.id, role = %user.role, "Created user");
    Ok(Json(user))
}

/// Update an existing user
pub async fn update_user(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<String>,
    Json(request): Json<UpdateUserRequest>,
) -> ApiResult<Json<User>> {
    authorize(&actor, Permission::ManageUsers)?;
    let user_id: UserId = parse_id(&id)?;

    let mut user = state
        .storage
        .get_user(&user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("User {} not found", id)))?;

    if user.id == actor.id && (request.active == Some(false) || request.role.is_some_and(|r| r != Role::Admin)) {
        return Err(ApiError::Validation(
            "administrators cannot demote or deactivate themselves".to_string(),
        ));
    }

    if let Some(email) = &request.email {
        user.email = validate_email(email)?;
    }
    if let Some(name) = &request.display_name {
        user.display_name = validate_name(name)?;
    }
    if let Some(role) = request.role {
        user.role = role;
    }
    if let Some(active) = request.active {
        user.active = active;
    }
    user.updated_at = Utc::now();

    state.storage.update_user(user.clone()).await?;
    state
        .record(
            AuditRecord::new(actor.id, "user.updated", EntityKind::User, user.id).with_detail(
                serde_json::json!({
                    "email": user.email,
                    "role": user.role,
                    "active": user.active,
                }),
            ),
        )
        .await?;

    tracing::info!(user_id = %user.id, "Updated user");
    Ok(Json(user))
}

/// Deactivate a user. Accounts are never removed so history stays attributable.
pub async fn delete_user(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<String>,
) -> ApiResult<Json<User>> {
    authorize(&actor, Permission::ManageUsers)?;
    let user_id: UserId = parse_id(&id)?;
    if user_id == actor.id {
        return Err(ApiError::Validation(
            "administrators cannot deactivate themselves".to_string(),
        ));
    }

    let mut user = state
        .storage
        .get_user(&user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("User {} not found", id)))?;

    if user.active {
        user.active = false;
        user.updated_at = Utc::now();
        state.storage.update_user(user.clone()).await?;
        state
            .record(AuditRecord::new(
                actor.id,
                "user.deactivated",
                EntityKind::User,
                user.id,
            ))
            .await?;
        tracing::info!(user_id = %user.id, "Deactivated user");
    }

    Ok(Json(user))
}
