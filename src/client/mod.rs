//! Session-aware API client.
//!
//! Flow Overview: every call attaches the current access token. When the server
//! answers 401 with `token_expired`, the client refreshes once, swaps the token pair
//! and retries the call once. Concurrent callers that hit the same expired token
//! share a single refresh exchange. Any other authentication failure, or a failed
//! refresh, clears the session so the route guard can send the user to login.

pub mod error;
pub mod session;
pub mod transport;

pub use self::error::ClientError;
pub use self::session::{SessionSnapshot, SessionStore, TokenPair};
pub use self::transport::{ApiRequest, ApiResponse, AuthTransport, HttpTransport};

use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;
use std::{sync::Arc, time::Duration};
use tokio::{sync::Mutex, task::JoinHandle, time::Instant};
use tracing::{debug, instrument, warn};

use crate::{
    api::types::{
        ChangePasswordRequest, IdentityResponse, LoginRequest, ProfileUpdateRequest,
        RegisterRequest, SessionResponse,
    },
    auth::{IdentitySummary, Role},
};

pub const LOGIN_PATH: &str = "/v1/auth/login";
pub const REGISTER_PATH: &str = "/v1/auth/register";
pub const REFRESH_PATH: &str = "/v1/auth/refresh";
pub const LOGOUT_PATH: &str = "/v1/auth/logout";
pub const ME_PATH: &str = "/v1/auth/me";
pub const CHANGE_PASSWORD_PATH: &str = "/v1/auth/change-password";

/// Delay before retrying a proactive refresh that failed on the network.
const AUTO_REFRESH_RETRY: Duration = Duration::from_secs(15);
/// Lower bound between two proactive refreshes.
const AUTO_REFRESH_MIN_INTERVAL: Duration = Duration::from_secs(1);

/// How a response relates to the session.
enum AuthOutcome {
    Passed,
    Expired,
    Rejected,
    Forbidden,
}

fn classify(response: &ApiResponse) -> AuthOutcome {
    match response.status {
        StatusCode::UNAUTHORIZED if response.error_code() == Some("token_expired") => {
            AuthOutcome::Expired
        }
        StatusCode::UNAUTHORIZED => AuthOutcome::Rejected,
        StatusCode::FORBIDDEN if response.error_code() == Some("forbidden_role") => {
            AuthOutcome::Forbidden
        }
        _ => AuthOutcome::Passed,
    }
}

#[derive(Clone)]
pub struct AutoRefreshClient {
    transport: Arc<dyn AuthTransport>,
    session: SessionStore,
    refresh_lock: Arc<Mutex<()>>,
}

impl AutoRefreshClient {
    #[must_use]
    pub fn new(transport: Arc<dyn AuthTransport>, session: SessionStore) -> Self {
        Self {
            transport,
            session,
            refresh_lock: Arc::new(Mutex::new(())),
        }
    }

    #[must_use]
    pub const fn session(&self) -> &SessionStore {
        &self.session
    }

    /// Send an authenticated request, refreshing the session once if needed.
    ///
    /// Non-auth failures (404, 409, ...) are returned as responses for the caller
    /// to interpret.
    ///
    /// # Errors
    /// - `Unauthenticated` when there is no session, the token is rejected, or the
    ///   refresh fails; the session is cleared in the latter two cases.
    /// - `UnauthorizedRole` on a 403 `forbidden_role`; the session is kept.
    /// - `SessionEnded` when the session changed while the call was in flight.
    /// - `Transport` for network failures.
    #[instrument(skip(self, request), fields(method = %request.method, path = %request.path))]
    pub async fn call(&self, request: ApiRequest) -> Result<ApiResponse, ClientError> {
        let snapshot = self.session.snapshot();
        let Some(tokens) = snapshot.tokens else {
            return Err(ClientError::Unauthenticated);
        };

        let response = self
            .transport
            .execute(request.clone(), Some(&tokens.access_token))
            .await?;
        self.ensure_epoch(snapshot.epoch)?;

        match classify(&response) {
            AuthOutcome::Passed => Ok(response),
            AuthOutcome::Forbidden => Err(ClientError::UnauthorizedRole),
            AuthOutcome::Rejected => {
                debug!(code = ?response.error_code(), "access token rejected");
                self.session.clear_if(snapshot.epoch);
                Err(ClientError::Unauthenticated)
            }
            AuthOutcome::Expired => {
                let access_token = self
                    .refresh_from(snapshot.epoch, snapshot.generation)
                    .await?;
                let retried = self
                    .transport
                    .execute(request, Some(&access_token))
                    .await?;
                self.ensure_epoch(snapshot.epoch)?;

                match classify(&retried) {
                    AuthOutcome::Passed => Ok(retried),
                    AuthOutcome::Forbidden => Err(ClientError::UnauthorizedRole),
                    AuthOutcome::Expired | AuthOutcome::Rejected => {
                        warn!("fresh access token rejected, ending session");
                        self.session.clear_if(snapshot.epoch);
                        Err(ClientError::Unauthenticated)
                    }
                }
            }
        }
    }

    /// Refresh the current session now.
    ///
    /// # Errors
    /// `Unauthenticated` if there is no session or the server rejects the refresh
    /// token (the session is cleared), `Transport` on network failure.
    pub async fn refresh(&self) -> Result<(), ClientError> {
        let snapshot = self.session.snapshot();
        self.refresh_from(snapshot.epoch, snapshot.generation)
            .await
            .map(|_| ())
    }

    /// Refresh the token pair observed at (`epoch`, `generation`) and return the
    /// access token to use. If the pair already moved on, the newer token is
    /// returned without another exchange.
    async fn refresh_from(&self, epoch: u64, generation: u64) -> Result<String, ClientError> {
        let _guard = self.refresh_lock.lock().await;

        let current = self.session.snapshot();
        if current.epoch != epoch {
            return Err(ClientError::SessionEnded);
        }
        let Some(tokens) = current.tokens else {
            return Err(ClientError::Unauthenticated);
        };
        if current.generation != generation {
            debug!("token pair already refreshed by a concurrent caller");
            return Ok(tokens.access_token);
        }

        debug!("refreshing session");
        let response = self
            .transport
            .execute(
                ApiRequest::post(
                    REFRESH_PATH,
                    json!({ "refresh_token": tokens.refresh_token }),
                ),
                None,
            )
            .await?;

        if response.status.is_server_error() {
            warn!(status = %response.status, "refresh failed on the server, keeping session");
            return Err(ClientError::Http {
                status: response.status.as_u16(),
                code: response.error_code().unwrap_or("unknown").to_string(),
            });
        }
        if !response.status.is_success() {
            debug!(status = %response.status, code = ?response.error_code(), "refresh rejected");
            self.session.clear_if(epoch);
            return Err(ClientError::Unauthenticated);
        }

        let grant: SessionResponse = response.json()?;
        let pair = TokenPair::from_response(&grant);
        let access_token = pair.access_token.clone();
        if !self.session.replace_tokens(epoch, pair) {
            return Err(ClientError::SessionEnded);
        }
        self.session.set_identity(epoch, grant.identity);
        Ok(access_token)
    }

    fn ensure_epoch(&self, epoch: u64) -> Result<(), ClientError> {
        if self.session.epoch() == epoch {
            Ok(())
        } else {
            debug!("discarding response from an ended session");
            Err(ClientError::SessionEnded)
        }
    }

    /// Log in and install the resulting session.
    ///
    /// # Errors
    /// `InvalidCredentials` on 401, `Http` for other failures, `SessionEnded` if a
    /// concurrent login or logout won.
    #[instrument(skip(self, password))]
    pub async fn login(
        &self,
        email: &str,
        password: &SecretString,
        role: Option<Role>,
    ) -> Result<IdentitySummary, ClientError> {
        let body = LoginRequest {
            email: email.to_string(),
            password: password.expose_secret().to_string(),
            role,
        };
        self.start_session(ApiRequest::post(LOGIN_PATH, serde_json::to_value(body)?))
            .await
    }

    /// Create a client account and log it in.
    ///
    /// # Errors
    /// `Http` with code `conflict` or `validation` for rejected input.
    #[instrument(skip(self, request), fields(email = %request.email))]
    pub async fn register(&self, request: RegisterRequest) -> Result<IdentitySummary, ClientError> {
        self.start_session(ApiRequest::post(REGISTER_PATH, serde_json::to_value(request)?))
            .await
    }

    async fn start_session(&self, request: ApiRequest) -> Result<IdentitySummary, ClientError> {
        let epoch = self.session.epoch();
        let response = self.transport.execute(request, None).await?;
        if response.status == StatusCode::UNAUTHORIZED {
            return Err(ClientError::InvalidCredentials);
        }
        let grant: SessionResponse = response.json()?;
        let identity = grant.identity.clone();
        self.session
            .establish(epoch, TokenPair::from_response(&grant), identity.clone())
            .ok_or(ClientError::SessionEnded)?;
        Ok(identity)
    }

    /// End the session locally and revoke it on the server.
    ///
    /// The local session is cleared first, so the user is logged out even when the
    /// server cannot be reached.
    pub async fn logout(&self) {
        let Some(tokens) = self.session.clear() else {
            return;
        };
        let request = ApiRequest::post(
            LOGOUT_PATH,
            json!({ "refresh_token": tokens.refresh_token }),
        );
        match self
            .transport
            .execute(request, Some(&tokens.access_token))
            .await
        {
            Ok(response) if response.status.is_success() => debug!("session revoked"),
            Ok(response) => debug!(status = %response.status, "logout not acknowledged"),
            Err(err) => warn!("logout request failed: {err}"),
        }
    }

    /// Fetch the current identity and publish it to session subscribers.
    ///
    /// # Errors
    /// See [`Self::call`].
    pub async fn whoami(&self) -> Result<IdentitySummary, ClientError> {
        let epoch = self.session.epoch();
        let response = self.call(ApiRequest::get(ME_PATH)).await?;
        self.publish_identity(epoch, response)
    }

    /// # Errors
    /// See [`Self::call`]; `Http` with code `validation` for rejected input.
    pub async fn update_profile(
        &self,
        update: ProfileUpdateRequest,
    ) -> Result<IdentitySummary, ClientError> {
        let epoch = self.session.epoch();
        let response = self
            .call(ApiRequest::patch(ME_PATH, serde_json::to_value(update)?))
            .await?;
        self.publish_identity(epoch, response)
    }

    /// # Errors
    /// `Http` with code `validation` when the current password is wrong or the new
    /// one is too short; see [`Self::call`] otherwise.
    pub async fn change_password(
        &self,
        current: &SecretString,
        new: &SecretString,
    ) -> Result<(), ClientError> {
        let body = ChangePasswordRequest {
            current_password: current.expose_secret().to_string(),
            new_password: new.expose_secret().to_string(),
        };
        let response = self
            .call(ApiRequest::post(
                CHANGE_PASSWORD_PATH,
                serde_json::to_value(body)?,
            ))
            .await?;
        response.error_for_status().map(|_| ())
    }

    fn publish_identity(
        &self,
        epoch: u64,
        response: ApiResponse,
    ) -> Result<IdentitySummary, ClientError> {
        let IdentityResponse { identity } = response.json()?;
        self.session.set_identity(epoch, identity.clone());
        Ok(identity)
    }

    /// Refresh the session in the background shortly before the access token expires.
    ///
    /// The task stops on logout and when the returned guard is dropped.
    #[must_use]
    pub fn spawn_auto_refresh(&self, margin: Duration) -> AutoRefresh {
        let client = self.clone();
        AutoRefresh {
            handle: tokio::spawn(async move { client.auto_refresh_loop(margin).await }),
        }
    }

    async fn auto_refresh_loop(self, margin: Duration) {
        let mut rx = self.session.subscribe();
        loop {
            let snapshot = rx.borrow_and_update().clone();
            let Some(tokens) = snapshot.tokens else {
                debug!("no session, auto refresh stopped");
                return;
            };
            let earliest = Instant::now() + AUTO_REFRESH_MIN_INTERVAL;
            let deadline = tokens
                .access_expires_at
                .checked_sub(margin)
                .map_or(earliest, |at| at.max(earliest));

            tokio::select! {
                () = tokio::time::sleep_until(deadline) => {
                    match self.refresh_from(snapshot.epoch, snapshot.generation).await {
                        Ok(_) | Err(ClientError::SessionEnded) => {}
                        Err(err @ (ClientError::Transport(_) | ClientError::Http { .. })) => {
                            warn!("auto refresh failed, retrying: {err}");
                            tokio::time::sleep(AUTO_REFRESH_RETRY).await;
                        }
                        Err(err) => {
                            debug!("auto refresh stopped: {err}");
                            return;
                        }
                    }
                }
                changed = rx.changed() => {
                    if changed.is_err() {
                        return;
                    }
                }
            }
        }
    }
}

/// Guard for the background refresh task; dropping it stops the task.
#[derive(Debug)]
pub struct AutoRefresh {
    handle: JoinHandle<()>,
}

impl AutoRefresh {
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for AutoRefresh {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
