#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("invalid email or password")]
    InvalidCredentials,
    /// No usable session; the caller should send the user to a login page.
    #[error("not authenticated")]
    Unauthenticated,
    #[error("session role may not access this resource")]
    UnauthorizedRole,
    /// The session changed (logout or a new login) while the request was in flight.
    #[error("session ended while the request was in flight")]
    SessionEnded,
    #[error("request failed with status {status}: {code}")]
    Http { status: u16, code: String },
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("unexpected response body: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("invalid request: {0}")]
    Request(String),
}

impl ClientError {
    /// Whether the caller should route to a login page.
    #[must_use]
    pub const fn requires_login(&self) -> bool {
        matches!(self, Self::Unauthenticated | Self::InvalidCredentials)
    }
}
