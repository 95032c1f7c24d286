use axum::{extract::Extension, http::HeaderMap, Json};
use std::sync::Arc;
use tracing::info;

use super::{
    clean,
    principal::{require_auth, require_identity},
    state::AuthState,
};
use crate::{
    api::types::{ErrorResponse, IdentityResponse, ProfileUpdateRequest},
    auth::{AuthError, IdentityUpdate},
};

const MAX_FIELD_LEN: usize = 256;
const MAX_AVATAR_LEN: usize = 2048;

#[utoipa::path(
    get,
    path = "/v1/auth/me",
    responses(
        (status = 200, description = "Identity of the current session", body = IdentityResponse),
        (status = 401, description = "Missing, expired or invalid access token", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "auth"
)]
pub async fn me(
    state: Extension<Arc<AuthState>>,
    headers: HeaderMap,
) -> Result<Json<IdentityResponse>, AuthError> {
    let (_, identity) = require_identity(&headers, &state).await?;
    Ok(Json(IdentityResponse {
        identity: identity.summary(),
    }))
}

fn bounded(field: &str, value: Option<String>, max: usize) -> Result<Option<String>, AuthError> {
    match clean(value) {
        Some(v) if v.chars().count() > max => Err(AuthError::Validation(format!(
            "{field} must be at most {max} characters"
        ))),
        other => Ok(other),
    }
}

#[utoipa::path(
    patch,
    path = "/v1/auth/me",
    request_body = ProfileUpdateRequest,
    responses(
        (status = 200, description = "Updated identity", body = IdentityResponse),
        (status = 400, description = "Invalid profile field", body = ErrorResponse),
        (status = 401, description = "Missing, expired or invalid access token", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "auth"
)]
pub async fn update_me(
    state: Extension<Arc<AuthState>>,
    headers: HeaderMap,
    Json(request): Json<ProfileUpdateRequest>,
) -> Result<Json<IdentityResponse>, AuthError> {
    let principal = require_auth(&headers, &state).await?;

    if request.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
        return Err(AuthError::Validation("name cannot be empty".to_string()));
    }
    let update = IdentityUpdate {
        display_name: bounded("name", request.name, MAX_FIELD_LEN)?,
        phone: bounded("phone", request.phone, MAX_FIELD_LEN)?,
        company: bounded("company", request.company, MAX_FIELD_LEN)?,
        avatar: bounded("avatar", request.avatar, MAX_AVATAR_LEN)?,
        password_hash: None,
    };

    let identity = state
        .credentials()
        .update(principal.identity_id, update)
        .await?;
    info!(identity_id = %identity.id, "profile updated");
    Ok(Json(IdentityResponse {
        identity: identity.summary(),
    }))
}
