use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    Json,
};
use secrecy::SecretString;
use std::sync::Arc;
use tracing::{debug, info};

use super::{principal::require_identity, state::AuthState};
use crate::{
    api::types::{ChangePasswordRequest, ErrorResponse},
    auth::{
        password::{hash_password_blocking, validate_password},
        AuthError, IdentityUpdate,
    },
};

#[utoipa::path(
    post,
    path = "/v1/auth/change-password",
    request_body = ChangePasswordRequest,
    responses(
        (status = 204, description = "Password changed"),
        (status = 400, description = "Current password wrong or new password too short", body = ErrorResponse),
        (status = 401, description = "Missing, expired or invalid access token", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "auth"
)]
pub async fn change_password(
    state: Extension<Arc<AuthState>>,
    headers: HeaderMap,
    Json(request): Json<ChangePasswordRequest>,
) -> Result<StatusCode, AuthError> {
    let (_, identity) = require_identity(&headers, &state).await?;
    validate_password(&request.new_password)?;

    // 400, not 401: a wrong current password must not end the session.
    let current = SecretString::from(request.current_password);
    if !state
        .credentials()
        .verify_password(Some(&identity), current)
        .await
    {
        debug!(identity_id = %identity.id, "change password with wrong current password");
        return Err(AuthError::Validation(
            "current password is incorrect".to_string(),
        ));
    }

    let password_hash = hash_password_blocking(SecretString::from(request.new_password)).await?;
    state
        .credentials()
        .update(
            identity.id,
            IdentityUpdate {
                password_hash: Some(password_hash),
                ..IdentityUpdate::default()
            },
        )
        .await?;
    info!(identity_id = %identity.id, "password changed");
    Ok(StatusCode::NO_CONTENT)
}
