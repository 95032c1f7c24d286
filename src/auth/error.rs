//! Auth error taxonomy and its HTTP mapping.
//!
//! Every failure leaves the server as `{"error": <code>, "message": <text>}`. The
//! `code` values are stable and drive client behavior: only `token_expired` is
//! recovered by a refresh, everything else ends the session or is surfaced.

use axum::{
    http::{header::WWW_AUTHENTICATE, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::error;

use super::identity::Role;
use crate::store::StoreError;

/// Outcome of verifying an access token that did not produce a principal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum VerifyError {
    /// Signature is valid but `exp` is at or before now.
    #[error("token expired")]
    Expired,
    /// Well-formed token rejected by signature, algorithm or claim checks.
    #[error("token invalid")]
    Invalid,
    /// Not a decodable token at all.
    #[error("token malformed")]
    Malformed,
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("invalid email or password")]
    InvalidCredentials,
    #[error("authentication required")]
    Unauthenticated,
    #[error("access token expired")]
    TokenExpired,
    #[error("access token invalid")]
    TokenInvalid,
    #[error("identity no longer exists")]
    UnknownIdentity,
    #[error("session refresh failed")]
    RefreshFailed,
    #[error("{actual} sessions cannot access {required} resources")]
    UnauthorizedRole { required: Role, actual: Role },
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Conflict(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AuthError {
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidCredentials => "invalid_credentials",
            Self::Unauthenticated => "unauthenticated",
            Self::TokenExpired => "token_expired",
            Self::TokenInvalid => "token_invalid",
            Self::UnknownIdentity => "unknown_identity",
            Self::RefreshFailed => "refresh_failed",
            Self::UnauthorizedRole { .. } => "forbidden_role",
            Self::Validation(_) => "validation",
            Self::Conflict(_) => "conflict",
            Self::Internal(_) => "internal",
        }
    }

    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::InvalidCredentials
            | Self::Unauthenticated
            | Self::TokenExpired
            | Self::TokenInvalid
            | Self::UnknownIdentity
            | Self::RefreshFailed => StatusCode::UNAUTHORIZED,
            Self::UnauthorizedRole { .. } => StatusCode::FORBIDDEN,
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<VerifyError> for AuthError {
    fn from(err: VerifyError) -> Self {
        match err {
            VerifyError::Expired => Self::TokenExpired,
            VerifyError::Invalid | VerifyError::Malformed => Self::TokenInvalid,
        }
    }
}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DuplicateEmail => Self::Conflict("email already registered".to_string()),
            StoreError::NotFound => Self::UnknownIdentity,
            other => Self::Internal(anyhow::Error::new(other)),
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if let Self::Internal(err) = &self {
            error!("Internal auth error: {err:#}");
            "internal error".to_string()
        } else {
            self.to_string()
        };

        let body = Json(json!({
            "error": self.code(),
            "message": message,
        }));

        if status == StatusCode::UNAUTHORIZED {
            let challenge = match self {
                Self::TokenExpired | Self::TokenInvalid => {
                    "Bearer error=\"invalid_token\""
                }
                _ => "Bearer",
            };
            (
                status,
                [(WWW_AUTHENTICATE, HeaderValue::from_static(challenge))],
                body,
            )
                .into_response()
        } else {
            (status, body).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_errors_collapse_to_two_codes() {
        assert_eq!(AuthError::from(VerifyError::Expired).code(), "token_expired");
        assert_eq!(AuthError::from(VerifyError::Invalid).code(), "token_invalid");
        assert_eq!(AuthError::from(VerifyError::Malformed).code(), "token_invalid");
    }

    #[test]
    fn role_mismatch_is_forbidden() {
        let err = AuthError::UnauthorizedRole {
            required: Role::Admin,
            actual: Role::Client,
        };
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
        assert_eq!(err.code(), "forbidden_role");
        assert_eq!(err.to_string(), "client sessions cannot access admin resources");
    }

    #[test]
    fn store_errors_map_to_auth_errors() {
        assert!(matches!(
            AuthError::from(StoreError::DuplicateEmail),
            AuthError::Conflict(_)
        ));
        assert!(matches!(
            AuthError::from(StoreError::NotFound),
            AuthError::UnknownIdentity
        ));
    }

    #[test]
    fn unauthorized_responses_carry_a_challenge() {
        let response = AuthError::TokenExpired.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.headers().get(WWW_AUTHENTICATE),
            Some(&HeaderValue::from_static("Bearer error=\"invalid_token\""))
        );

        let response = AuthError::Validation("bad".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(response.headers().get(WWW_AUTHENTICATE).is_none());
    }
}
