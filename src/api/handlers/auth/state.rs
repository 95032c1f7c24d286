//! Auth state and configuration shared by the handlers.

use secrecy::SecretString;
use std::sync::Arc;

use crate::{
    auth::{RefreshStore, SessionVerifier, TokenIssuer, TokenSettings},
    store::CredentialStore,
};

const DEFAULT_FRONTEND_BASE_URL: &str = "http://localhost:3000";

#[derive(Clone, Debug)]
pub struct AuthConfig {
    frontend_base_url: String,
    token: TokenSettings,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self::new(DEFAULT_FRONTEND_BASE_URL.to_string())
    }
}

impl AuthConfig {
    #[must_use]
    pub fn new(frontend_base_url: String) -> Self {
        Self {
            frontend_base_url,
            token: TokenSettings::default(),
        }
    }

    #[must_use]
    pub const fn with_access_ttl_seconds(mut self, seconds: i64) -> Self {
        self.token.access_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub const fn with_refresh_ttl_seconds(mut self, seconds: i64) -> Self {
        self.token.refresh_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_issuer(mut self, issuer: String) -> Self {
        self.token.issuer = issuer;
        self
    }

    #[must_use]
    pub fn with_audience(mut self, audience: String) -> Self {
        self.token.audience = audience;
        self
    }

    #[must_use]
    pub fn frontend_base_url(&self) -> &str {
        &self.frontend_base_url
    }

    #[must_use]
    pub const fn token_settings(&self) -> &TokenSettings {
        &self.token
    }

    #[must_use]
    pub const fn access_ttl_seconds(&self) -> i64 {
        self.token.access_ttl_seconds
    }

    #[must_use]
    pub const fn refresh_ttl_seconds(&self) -> i64 {
        self.token.refresh_ttl_seconds
    }

    /// Only mark cookies secure when the frontend is served over HTTPS.
    #[must_use]
    pub fn session_cookie_secure(&self) -> bool {
        self.frontend_base_url.starts_with("https://")
    }
}

pub struct AuthState {
    config: AuthConfig,
    issuer: TokenIssuer,
    verifier: SessionVerifier,
    credentials: Arc<dyn CredentialStore>,
    refresh: Arc<dyn RefreshStore>,
}

impl AuthState {
    #[must_use]
    pub fn new(
        config: AuthConfig,
        secret: &SecretString,
        credentials: Arc<dyn CredentialStore>,
        refresh: Arc<dyn RefreshStore>,
    ) -> Self {
        let issuer = TokenIssuer::new(secret, config.token_settings().clone(), refresh.clone());
        let verifier = SessionVerifier::new(secret, config.token_settings());
        Self {
            config,
            issuer,
            verifier,
            credentials,
            refresh,
        }
    }

    #[must_use]
    pub const fn config(&self) -> &AuthConfig {
        &self.config
    }

    #[must_use]
    pub const fn issuer(&self) -> &TokenIssuer {
        &self.issuer
    }

    #[must_use]
    pub const fn verifier(&self) -> &SessionVerifier {
        &self.verifier
    }

    #[must_use]
    pub fn credentials(&self) -> &dyn CredentialStore {
        self.credentials.as_ref()
    }

    #[must_use]
    pub fn refresh_store(&self) -> &dyn RefreshStore {
        self.refresh.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_overrides_token_settings() {
        let config = AuthConfig::new("https://studio.test".to_string())
            .with_access_ttl_seconds(30)
            .with_refresh_ttl_seconds(600)
            .with_issuer("studio".to_string())
            .with_audience("studio-web".to_string());

        assert_eq!(config.access_ttl_seconds(), 30);
        assert_eq!(config.refresh_ttl_seconds(), 600);
        assert_eq!(config.token_settings().issuer, "studio");
        assert_eq!(config.token_settings().audience, "studio-web");
        assert!(config.session_cookie_secure());
    }

    #[test]
    fn plain_http_frontend_gets_insecure_cookies() {
        assert!(!AuthConfig::default().session_cookie_secure());
        assert_eq!(AuthConfig::default().frontend_base_url(), "http://localhost:3000");
    }
}
