//! Auth handlers and supporting modules.
//!
//! Login and registration issue a token pair inside a new session; refresh
//! rotates the pair within the session; logout revokes the whole session.
//! Tokens are returned in the JSON body and mirrored into `HttpOnly` cookies so
//! both API clients and browsers can use them.

pub(crate) mod cookies;
pub(crate) mod login;
pub(crate) mod me;
pub(crate) mod password;
pub(crate) mod principal;
pub(crate) mod register;
pub(crate) mod session;
mod state;

pub use login::login;
pub use me::{me, update_me};
pub use password::change_password;
pub use principal::{require_auth, require_identity, require_role};
pub use register::register;
pub use session::{logout, refresh};
pub use state::{AuthConfig, AuthState};

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use crate::{
    api::types::SessionResponse,
    auth::{IdentitySummary, IssuedTokens},
};

/// Session body plus the matching `Set-Cookie` headers.
fn session_response(
    state: &AuthState,
    status: StatusCode,
    tokens: IssuedTokens,
    identity: IdentitySummary,
) -> Response {
    let cookies = cookies::session_cookies(state.config(), &tokens);
    (status, cookies, Json(SessionResponse::new(tokens, identity))).into_response()
}

/// Trim optional profile input; blank strings count as absent.
fn clean(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
