//! Refresh and logout.

use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;
use tracing::{debug, error, info};
use uuid::Uuid;

use super::{
    cookies::{clear_session_cookies, extract_access_token, extract_cookie, REFRESH_COOKIE_NAME},
    session_response,
    state::AuthState,
};
use crate::{
    api::types::{ErrorResponse, RefreshRequest, SessionResponse},
    auth::AuthError,
};

/// Refresh token from the body, falling back to the refresh cookie.
fn refresh_token(headers: &HeaderMap, body: Option<Json<RefreshRequest>>) -> Option<String> {
    body.and_then(|Json(body)| body.refresh_token)
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty())
        .or_else(|| extract_cookie(headers, REFRESH_COOKIE_NAME))
}

#[utoipa::path(
    post,
    path = "/v1/auth/refresh",
    request_body(content = RefreshRequest, description = "Optional when the refresh cookie is sent"),
    responses(
        (status = 200, description = "Token pair rotated", body = SessionResponse),
        (status = 401, description = "Refresh token unknown, expired, revoked or reused", body = ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn refresh(
    state: Extension<Arc<AuthState>>,
    headers: HeaderMap,
    body: Option<Json<RefreshRequest>>,
) -> Response {
    let Some(token) = refresh_token(&headers, body) else {
        debug!("refresh without a token");
        return refresh_failed(&state, AuthError::RefreshFailed);
    };

    match state.issuer().rotate(&token, state.credentials()).await {
        Ok((identity, tokens)) => {
            debug!(
                identity_id = %identity.id,
                session_id = %tokens.session_id,
                "session refreshed"
            );
            session_response(&state, StatusCode::OK, tokens, identity.summary())
        }
        Err(err @ AuthError::RefreshFailed) => refresh_failed(&state, err),
        Err(err) => err.into_response(),
    }
}

/// Revoke the session named by the refresh token, falling back to the session of
/// the access token (expired ones included) when the refresh token is missing or
/// unknown.
async fn revoke_for_logout(
    state: &AuthState,
    headers: &HeaderMap,
    body: Option<Json<RefreshRequest>>,
) -> Result<Option<Uuid>, AuthError> {
    if let Some(token) = refresh_token(headers, body) {
        if let Some(session_id) = state.issuer().revoke(&token).await? {
            return Ok(Some(session_id));
        }
        debug!("logout with an unknown refresh token");
    }
    let Some(session_id) =
        extract_access_token(headers).and_then(|token| state.verifier().session_of(&token))
    else {
        return Ok(None);
    };
    state.issuer().revoke_session(session_id).await?;
    Ok(Some(session_id))
}

/// The session is gone: tell the browser to drop its cookies too.
fn refresh_failed(state: &AuthState, err: AuthError) -> Response {
    (clear_session_cookies(state.config()), err).into_response()
}

#[utoipa::path(
    post,
    path = "/v1/auth/logout",
    request_body(content = RefreshRequest, description = "Optional when the refresh cookie is sent"),
    responses(
        (status = 204, description = "Session revoked and cookies cleared")
    ),
    tag = "auth"
)]
pub async fn logout(
    state: Extension<Arc<AuthState>>,
    headers: HeaderMap,
    body: Option<Json<RefreshRequest>>,
) -> Response {
    let revoked = revoke_for_logout(&state, &headers, body).await;

    // Logout always succeeds for the caller; the cookies are cleared either way.
    match revoked {
        Ok(Some(session_id)) => info!(%session_id, "logged out"),
        Ok(None) => debug!("logout without a known session"),
        Err(err) => error!("Failed to revoke session on logout: {err}"),
    }

    (StatusCode::NO_CONTENT, clear_session_cookies(state.config())).into_response()
}
