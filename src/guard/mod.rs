//! Protected-route gating for the client and admin areas.
//!
//! A guard starts in [`GuardState::Unknown`] on every mount and renders nothing
//! protected until a "who am I" check confirms a session with the required role.
//! A session with the wrong role is redirected to the required role's login page
//! but is not logged out: a client who wanders into `/admin` keeps their client
//! session.

use tokio::sync::watch;
use tracing::debug;

use crate::{
    auth::Role,
    client::{AutoRefreshClient, SessionSnapshot},
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GuardState {
    Unknown,
    Authenticated(Role),
    Unauthenticated { redirect: String },
}

/// What a protected view should show right now.
#[derive(Debug, PartialEq, Eq)]
pub enum Rendered<V> {
    Loading,
    Content(V),
    Redirect(String),
}

#[derive(Debug)]
pub struct RouteGuard {
    required: Role,
    state: GuardState,
}

impl RouteGuard {
    #[must_use]
    pub const fn new(required: Role) -> Self {
        Self {
            required,
            state: GuardState::Unknown,
        }
    }

    #[must_use]
    pub const fn required(&self) -> Role {
        self.required
    }

    #[must_use]
    pub const fn state(&self) -> &GuardState {
        &self.state
    }

    fn redirect(&self) -> GuardState {
        GuardState::Unauthenticated {
            redirect: self.required.login_path().to_string(),
        }
    }

    /// Resolve the guard against the server.
    ///
    /// Expired access tokens are refreshed by the client on the way; only a
    /// session that cannot be recovered ends in a redirect.
    pub async fn check(&mut self, client: &AutoRefreshClient) -> &GuardState {
        self.state = match client.whoami().await {
            Ok(identity) if identity.role == self.required => {
                GuardState::Authenticated(identity.role)
            }
            Ok(identity) => {
                debug!(
                    required = %self.required,
                    actual = %identity.role,
                    "session role does not match route"
                );
                self.redirect()
            }
            Err(err) => {
                debug!("route check failed: {err}");
                self.redirect()
            }
        };
        &self.state
    }

    /// Follow session changes: a logout while mounted sends the user to login.
    pub fn observe(&mut self, snapshot: &SessionSnapshot) -> &GuardState {
        if !snapshot.is_authenticated() && matches!(self.state, GuardState::Authenticated(_)) {
            self.state = self.redirect();
        }
        &self.state
    }

    /// Wait for the next session change and apply it.
    ///
    /// Returns `None` once the session store is gone.
    pub async fn next_change(
        &mut self,
        updates: &mut watch::Receiver<SessionSnapshot>,
    ) -> Option<&GuardState> {
        updates.changed().await.ok()?;
        let snapshot = updates.borrow_and_update().clone();
        Some(self.observe(&snapshot))
    }

    /// Produce protected content only for an authenticated session with the right role.
    pub fn render<V>(&self, view: impl FnOnce() -> V) -> Rendered<V> {
        match &self.state {
            GuardState::Unknown => Rendered::Loading,
            GuardState::Authenticated(_) => Rendered::Content(view()),
            GuardState::Unauthenticated { redirect } => Rendered::Redirect(redirect.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        auth::IdentitySummary,
        client::{ApiRequest, ApiResponse, AuthTransport, ClientError, SessionStore},
    };
    use async_trait::async_trait;
    use reqwest::StatusCode;
    use secrecy::SecretString;
    use serde_json::json;
    use std::sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    };
    use uuid::Uuid;

    /// Answers login and "who am I" for a fixed role.
    struct FixedRole {
        role: Role,
        session_valid: AtomicBool,
    }

    impl FixedRole {
        fn new(role: Role) -> Arc<Self> {
            Arc::new(Self {
                role,
                session_valid: AtomicBool::new(true),
            })
        }
    }

    #[async_trait]
    impl AuthTransport for FixedRole {
        async fn execute(
            &self,
            request: ApiRequest,
            _access_token: Option<&str>,
        ) -> Result<ApiResponse, ClientError> {
            let identity = IdentitySummary {
                id: Uuid::nil(),
                email: "someone@studio.test".to_string(),
                role: self.role,
                name: "Someone".to_string(),
                phone: None,
                company: None,
                avatar: None,
            };
            let body = match request.path.as_str() {
                "/v1/auth/login" => json!({
                    "access_token": "a",
                    "refresh_token": "r",
                    "token_type": "Bearer",
                    "expires_in": 900,
                    "refresh_expires_in": 3600,
                    "identity": identity,
                }),
                "/v1/auth/me" if self.session_valid.load(Ordering::SeqCst) => {
                    json!({ "identity": identity })
                }
                _ => {
                    return Ok(ApiResponse {
                        status: StatusCode::UNAUTHORIZED,
                        body: Some(json!({ "error": "token_invalid" })),
                    })
                }
            };
            Ok(ApiResponse {
                status: StatusCode::OK,
                body: Some(body),
            })
        }
    }

    async fn client_for(role: Role) -> (Arc<FixedRole>, AutoRefreshClient) {
        let transport = FixedRole::new(role);
        let client = AutoRefreshClient::new(transport.clone(), SessionStore::new());
        let login = client
            .login("someone@studio.test", &SecretString::from("whatever"), None)
            .await;
        assert!(login.is_ok());
        (transport, client)
    }

    #[test]
    fn fresh_guard_renders_nothing_protected() {
        let guard = RouteGuard::new(Role::Admin);
        assert_eq!(guard.state(), &GuardState::Unknown);
        let mut rendered = false;
        let outcome = guard.render(|| rendered = true);
        assert_eq!(outcome, Rendered::Loading);
        assert!(!rendered);
    }

    #[tokio::test]
    async fn matching_role_renders_content() {
        let (_, client) = client_for(Role::Admin).await;
        let mut guard = RouteGuard::new(Role::Admin);

        assert_eq!(
            guard.check(&client).await,
            &GuardState::Authenticated(Role::Admin)
        );
        assert_eq!(guard.render(|| "dashboard"), Rendered::Content("dashboard"));
    }

    #[tokio::test]
    async fn client_session_on_admin_route_redirects_to_admin_login() {
        let (_, client) = client_for(Role::Client).await;
        let mut guard = RouteGuard::new(Role::Admin);

        assert_eq!(
            guard.check(&client).await,
            &GuardState::Unauthenticated {
                redirect: "/admin/login".to_string()
            }
        );
        assert_eq!(
            guard.render(|| "admin panel"),
            Rendered::Redirect("/admin/login".to_string())
        );
        // the client session itself survives
        assert!(client.session().snapshot().is_authenticated());
    }

    #[tokio::test]
    async fn admin_session_on_client_route_redirects_to_client_login() {
        let (_, client) = client_for(Role::Admin).await;
        let mut guard = RouteGuard::new(Role::Client);
        assert_eq!(
            guard.check(&client).await,
            &GuardState::Unauthenticated {
                redirect: "/client/login".to_string()
            }
        );
    }

    #[tokio::test]
    async fn no_session_redirects() {
        let client = AutoRefreshClient::new(FixedRole::new(Role::Client), SessionStore::new());
        let mut guard = RouteGuard::new(Role::Client);
        assert_eq!(
            guard.check(&client).await,
            &GuardState::Unauthenticated {
                redirect: "/client/login".to_string()
            }
        );
    }

    #[tokio::test]
    async fn rejected_session_redirects_and_clears() {
        let (transport, client) = client_for(Role::Client).await;
        transport.session_valid.store(false, Ordering::SeqCst);
        let mut guard = RouteGuard::new(Role::Client);

        assert!(matches!(
            guard.check(&client).await,
            GuardState::Unauthenticated { .. }
        ));
        assert!(!client.session().snapshot().is_authenticated());
    }

    #[tokio::test]
    async fn logout_while_mounted_redirects() {
        let (_, client) = client_for(Role::Client).await;
        let mut updates = client.session().subscribe();
        let mut guard = RouteGuard::new(Role::Client);
        guard.check(&client).await;
        assert_eq!(guard.state(), &GuardState::Authenticated(Role::Client));

        client.logout().await;
        let state = guard.next_change(&mut updates).await.cloned();
        assert_eq!(
            state,
            Some(GuardState::Unauthenticated {
                redirect: "/client/login".to_string()
            })
        );
    }
}
