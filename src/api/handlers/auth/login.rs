use axum::{extract::Extension, http::StatusCode, response::Response, Json};
use secrecy::SecretString;
use std::sync::Arc;
use tracing::{debug, info};

use super::{session_response, state::AuthState};
use crate::{
    api::types::{ErrorResponse, LoginRequest, SessionResponse},
    auth::{normalize_email, AuthError},
};

#[utoipa::path(
    post,
    path = "/v1/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Session established", body = SessionResponse),
        (status = 401, description = "Unknown email, wrong password or wrong role", body = ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn login(
    state: Extension<Arc<AuthState>>,
    Json(request): Json<LoginRequest>,
) -> Result<Response, AuthError> {
    let email = normalize_email(&request.email);
    let identity = state.credentials().find_by_email(&email).await?;

    // Unknown emails still pay for one hash check.
    let password = SecretString::from(request.password);
    let verified = state
        .credentials()
        .verify_password(identity.as_ref(), password)
        .await;
    let Some(identity) = identity else {
        debug!("login for unknown email");
        return Err(AuthError::InvalidCredentials);
    };
    if !verified {
        debug!(identity_id = %identity.id, "login with wrong password");
        return Err(AuthError::InvalidCredentials);
    }

    // A role mismatch looks exactly like a bad password.
    if request.role.is_some_and(|role| role != identity.role) {
        debug!(identity_id = %identity.id, role = %identity.role, "login for wrong role");
        return Err(AuthError::InvalidCredentials);
    }

    let tokens = state.issuer().issue(&identity).await?;
    info!(
        identity_id = %identity.id,
        role = %identity.role,
        session_id = %tokens.session_id,
        "login succeeded"
    );
    Ok(session_response(&state, StatusCode::OK, tokens, identity.summary()))
}
