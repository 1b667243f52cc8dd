//! Acting-user extraction
//!
//! The caller names itself with the `x-user-id` header. Verifying that claim
//! belongs to whatever sits in front of this service.

use super::state::AppState;
use crate::error::ApiError;
use crate::storage::UserStorage;
use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use oversight_types::{User, UserId};

pub const USER_HEADER: &str = "x-user-id";

/// The user a request acts as
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(USER_HEADER)
            .ok_or_else(|| ApiError::Unauthorized(format!("missing {USER_HEADER} header")))?
            .to_str()
            .map_err(|_| ApiError::Unauthorized(format!("malformed {USER_HEADER} header")))?;

        let id: UserId = raw
            .parse()
            .map_err(|e| ApiError::Unauthorized(format!("{e}")))?;

        let user = state
            .storage
            .get_user(&id)
            .await?
            .ok_or_else(|| ApiError::Unauthorized(format!("unknown user {id}")))?;

        Ok(Self(user))
    }
}
