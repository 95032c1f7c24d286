use axum::{extract::Extension, http::StatusCode, response::Response, Json};
use secrecy::SecretString;
use std::sync::Arc;
use tracing::info;

use super::{clean, session_response, state::AuthState};
use crate::{
    api::types::{ErrorResponse, RegisterRequest, SessionResponse},
    auth::{
        normalize_email,
        password::{hash_password_blocking, validate_password},
        valid_email, AuthError, NewIdentity, Profile, Role,
    },
};

#[utoipa::path(
    post,
    path = "/v1/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Client account created and signed in", body = SessionResponse),
        (status = 400, description = "Invalid email, name or password", body = ErrorResponse),
        (status = 409, description = "Email already registered", body = ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn register(
    state: Extension<Arc<AuthState>>,
    Json(request): Json<RegisterRequest>,
) -> Result<Response, AuthError> {
    let email = normalize_email(&request.email);
    if !valid_email(&email) {
        return Err(AuthError::Validation("invalid email".to_string()));
    }
    let name = request.name.trim().to_string();
    if name.is_empty() {
        return Err(AuthError::Validation("name is required".to_string()));
    }
    validate_password(&request.password)?;

    let password_hash = hash_password_blocking(SecretString::from(request.password)).await?;

    // Self-registration only ever creates clients; admins are bootstrapped.
    let identity = state
        .credentials()
        .create(NewIdentity {
            email,
            password_hash,
            role: Role::Client,
            display_name: name,
            profile: Profile {
                phone: clean(request.phone),
                company: clean(request.company),
                avatar: None,
            },
        })
        .await?;

    let tokens = state.issuer().issue(&identity).await?;
    info!(identity_id = %identity.id, "client registered");
    Ok(session_response(
        &state,
        StatusCode::CREATED,
        tokens,
        identity.summary(),
    ))
}
