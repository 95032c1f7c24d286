//! Authenticated principal extraction and authorization helpers.
//!
//! Flow Overview: read the bearer header (or the access cookie), verify the
//! token, then confirm its session has not been revoked by a logout or a
//! detected refresh replay.

use axum::http::HeaderMap;
use tracing::debug;

use super::{cookies::extract_access_token, state::AuthState};
use crate::auth::{AuthError, Identity, Principal, Role};

/// Resolve the request's access token into a principal.
///
/// # Errors
/// `Unauthenticated` when no token is present, `TokenExpired`/`TokenInvalid`
/// when verification fails or the session was revoked.
pub async fn require_auth(headers: &HeaderMap, state: &AuthState) -> Result<Principal, AuthError> {
    let Some(token) = extract_access_token(headers) else {
        return Err(AuthError::Unauthenticated);
    };
    let principal = state.verifier().verify(&token)?;
    ensure_session_active(&principal, state).await?;
    Ok(principal)
}

/// [`require_auth`] that also loads the identity behind the session.
///
/// # Errors
/// Everything [`require_auth`] returns, and `UnknownIdentity` when the identity
/// no longer exists.
pub async fn require_identity(
    headers: &HeaderMap,
    state: &AuthState,
) -> Result<(Principal, Identity), AuthError> {
    let Some(token) = extract_access_token(headers) else {
        return Err(AuthError::Unauthenticated);
    };
    let (principal, identity) = state
        .verifier()
        .verify_identity(&token, state.credentials())
        .await?;
    ensure_session_active(&principal, state).await?;
    Ok((principal, identity))
}

async fn ensure_session_active(principal: &Principal, state: &AuthState) -> Result<(), AuthError> {
    if state
        .refresh_store()
        .session_active(principal.session_id)
        .await?
    {
        Ok(())
    } else {
        debug!(session_id = %principal.session_id, "access token for revoked session");
        Err(AuthError::TokenInvalid)
    }
}

/// [`require_auth`] plus a role check.
///
/// # Errors
/// Everything [`require_auth`] returns, and `UnauthorizedRole` for a valid
/// session holding a different role.
pub async fn require_role(
    headers: &HeaderMap,
    state: &AuthState,
    required: Role,
) -> Result<Principal, AuthError> {
    let principal = require_auth(headers, state).await?;
    if principal.role != required {
        return Err(AuthError::UnauthorizedRole {
            required,
            actual: principal.role,
        });
    }
    Ok(principal)
}
