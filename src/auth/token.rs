//! Access token issuance and verification.
//!
//! Access tokens are HS256 JWTs carrying the identity id, role and session id.
//! Verification is stateless and checks, in order: structure, signature and
//! algorithm, issuer and audience, token type, and finally expiry with zero leeway.
//! Expiry is only reported for tokens whose signature checks out, so a forged
//! expired token is `Invalid`, never `Expired`.

use jsonwebtoken::{
    decode, decode_header, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header,
    Validation,
};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::{fmt, sync::Arc};
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use super::{
    error::{AuthError, VerifyError},
    identity::{Identity, Role},
    refresh::{generate_refresh_token, hash_refresh_token, Redemption, RefreshRecord, RefreshStore},
    unix_now,
};
use crate::store::CredentialStore;

const ACCESS_TOKEN_TYPE: &str = "access";
pub const DEFAULT_ISSUER: &str = "pqrix";
pub const DEFAULT_AUDIENCE: &str = "pqrix-web";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessClaims {
    pub sub: String,
    pub email: String,
    pub role: Role,
    pub sid: String,
    pub iss: String,
    pub aud: String,
    pub typ: String,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
}

/// Verified access token contents.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Principal {
    pub identity_id: Uuid,
    pub email: String,
    pub role: Role,
    pub session_id: Uuid,
    pub expires_at: i64,
}

/// Tokens handed out by a login or refresh. Timestamps are unix seconds.
#[derive(Clone)]
pub struct IssuedTokens {
    pub access_token: String,
    pub access_expires_at: i64,
    pub refresh_token: String,
    pub refresh_expires_at: i64,
    pub session_id: Uuid,
    pub issued_at: i64,
}

impl IssuedTokens {
    #[must_use]
    pub const fn expires_in(&self) -> i64 {
        self.access_expires_at - self.issued_at
    }

    #[must_use]
    pub const fn refresh_expires_in(&self) -> i64 {
        self.refresh_expires_at - self.issued_at
    }
}

impl fmt::Debug for IssuedTokens {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IssuedTokens")
            .field("session_id", &self.session_id)
            .field("access_expires_at", &self.access_expires_at)
            .field("refresh_expires_at", &self.refresh_expires_at)
            .finish_non_exhaustive()
    }
}

#[derive(Clone, Debug)]
pub struct TokenSettings {
    pub issuer: String,
    pub audience: String,
    pub access_ttl_seconds: i64,
    pub refresh_ttl_seconds: i64,
}

impl Default for TokenSettings {
    fn default() -> Self {
        Self {
            issuer: DEFAULT_ISSUER.to_string(),
            audience: DEFAULT_AUDIENCE.to_string(),
            access_ttl_seconds: 15 * 60,
            refresh_ttl_seconds: 30 * 24 * 60 * 60,
        }
    }
}

/// Mints access tokens and manages the refresh token lineage of each session.
#[derive(Clone)]
pub struct TokenIssuer {
    encoding_key: EncodingKey,
    settings: TokenSettings,
    refresh: Arc<dyn RefreshStore>,
}

impl TokenIssuer {
    #[must_use]
    pub fn new(secret: &SecretString, settings: TokenSettings, refresh: Arc<dyn RefreshStore>) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.expose_secret().as_bytes()),
            settings,
            refresh,
        }
    }

    #[must_use]
    pub const fn settings(&self) -> &TokenSettings {
        &self.settings
    }

    /// Start a new session for an authenticated identity.
    ///
    /// # Errors
    /// Returns `AuthError::Internal` if signing or persisting the refresh token fails.
    pub async fn issue(&self, identity: &Identity) -> Result<IssuedTokens, AuthError> {
        self.issue_at(identity, unix_now()).await
    }

    /// [`Self::issue`] with an explicit clock.
    ///
    /// # Errors
    /// Returns `AuthError::Internal` if signing or persisting the refresh token fails.
    pub async fn issue_at(&self, identity: &Identity, now: i64) -> Result<IssuedTokens, AuthError> {
        self.issue_in_session(identity, Uuid::new_v4(), now).await
    }

    #[instrument(skip(self, identity), fields(identity_id = %identity.id, role = %identity.role))]
    async fn issue_in_session(
        &self,
        identity: &Identity,
        session_id: Uuid,
        now: i64,
    ) -> Result<IssuedTokens, AuthError> {
        let access_expires_at = now + self.settings.access_ttl_seconds;
        let claims = AccessClaims {
            sub: identity.id.to_string(),
            email: identity.email.clone(),
            role: identity.role,
            sid: session_id.to_string(),
            iss: self.settings.issuer.clone(),
            aud: self.settings.audience.clone(),
            typ: ACCESS_TOKEN_TYPE.to_string(),
            iat: now,
            exp: access_expires_at,
            jti: Uuid::new_v4().to_string(),
        };
        let access_token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AuthError::Internal(anyhow::anyhow!("failed to sign access token: {e}")))?;

        let refresh_token = generate_refresh_token()?;
        let refresh_expires_at = now + self.settings.refresh_ttl_seconds;
        self.refresh
            .insert(RefreshRecord {
                token_hash: hash_refresh_token(&refresh_token),
                identity_id: identity.id,
                role: identity.role,
                session_id,
                expires_at: refresh_expires_at,
                used_at: None,
                revoked_at: None,
            })
            .await?;

        debug!(%session_id, "issued session tokens");

        Ok(IssuedTokens {
            access_token,
            access_expires_at,
            refresh_token,
            refresh_expires_at,
            session_id,
            issued_at: now,
        })
    }

    /// Exchange a refresh token for a new token pair in the same session.
    ///
    /// # Errors
    /// Returns `AuthError::RefreshFailed` for unknown, expired, revoked or replayed
    /// tokens, and when the identity behind the session no longer exists.
    pub async fn rotate(
        &self,
        refresh_token: &str,
        credentials: &dyn CredentialStore,
    ) -> Result<(Identity, IssuedTokens), AuthError> {
        self.rotate_at(refresh_token, credentials, unix_now()).await
    }

    /// [`Self::rotate`] with an explicit clock.
    ///
    /// # Errors
    /// See [`Self::rotate`].
    #[instrument(skip_all)]
    pub async fn rotate_at(
        &self,
        refresh_token: &str,
        credentials: &dyn CredentialStore,
        now: i64,
    ) -> Result<(Identity, IssuedTokens), AuthError> {
        let token_hash = hash_refresh_token(refresh_token);
        let record = match self.refresh.redeem(&token_hash, now).await? {
            Redemption::Redeemed(record) => record,
            Redemption::Replayed(record) => {
                warn!(
                    session_id = %record.session_id,
                    identity_id = %record.identity_id,
                    "refresh token replayed, revoking session"
                );
                self.refresh.revoke_session(record.session_id, now).await?;
                return Err(AuthError::RefreshFailed);
            }
            Redemption::Expired => {
                debug!("refresh token expired");
                return Err(AuthError::RefreshFailed);
            }
            Redemption::Revoked | Redemption::Unknown => return Err(AuthError::RefreshFailed),
        };

        let Some(identity) = credentials.find_by_id(record.identity_id).await? else {
            self.refresh.revoke_session(record.session_id, now).await?;
            return Err(AuthError::RefreshFailed);
        };

        let tokens = self
            .issue_in_session(&identity, record.session_id, now)
            .await?;
        Ok((identity, tokens))
    }

    /// Revoke the session a refresh token belongs to. Unknown tokens are ignored.
    ///
    /// # Errors
    /// Returns an error if the store fails.
    pub async fn revoke(&self, refresh_token: &str) -> Result<Option<Uuid>, AuthError> {
        let token_hash = hash_refresh_token(refresh_token);
        let Some(record) = self.refresh.find(&token_hash).await? else {
            return Ok(None);
        };
        self.revoke_session(record.session_id).await?;
        Ok(Some(record.session_id))
    }

    /// # Errors
    /// Returns an error if the store fails.
    pub async fn revoke_session(&self, session_id: Uuid) -> Result<(), AuthError> {
        self.refresh.revoke_session(session_id, unix_now()).await?;
        debug!(%session_id, "session revoked");
        Ok(())
    }
}

/// Stateless access token verification.
#[derive(Clone)]
pub struct SessionVerifier {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl SessionVerifier {
    #[must_use]
    pub fn new(secret: &SecretString, settings: &TokenSettings) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        // expiry is checked against the caller's clock in `verify_at`
        validation.validate_exp = false;
        validation.set_issuer(&[settings.issuer.as_str()]);
        validation.set_audience(&[settings.audience.as_str()]);
        validation.set_required_spec_claims(&["exp", "sub", "iss", "aud"]);

        Self {
            decoding_key: DecodingKey::from_secret(secret.expose_secret().as_bytes()),
            validation,
        }
    }

    /// Verify an access token against the current time.
    ///
    /// # Errors
    /// Returns `Expired`, `Invalid` or `Malformed`; see [`VerifyError`].
    pub fn verify(&self, token: &str) -> Result<Principal, VerifyError> {
        self.verify_at(token, unix_now())
    }

    /// Verify an access token as of `now` (unix seconds).
    ///
    /// # Errors
    /// Returns `Expired`, `Invalid` or `Malformed`; see [`VerifyError`].
    pub fn verify_at(&self, token: &str, now: i64) -> Result<Principal, VerifyError> {
        let principal = self.decode_signed(token)?;
        if principal.expires_at <= now {
            return Err(VerifyError::Expired);
        }
        Ok(principal)
    }

    /// Session id of a correctly signed access token, expired or not.
    ///
    /// Only for ending a session: an expired token still identifies what to revoke.
    #[must_use]
    pub fn session_of(&self, token: &str) -> Option<Uuid> {
        self.decode_signed(token).ok().map(|principal| principal.session_id)
    }

    /// Every check except expiry.
    fn decode_signed(&self, token: &str) -> Result<Principal, VerifyError> {
        if token.split('.').count() != 3 {
            return Err(VerifyError::Malformed);
        }
        let header = decode_header(token).map_err(|_| VerifyError::Malformed)?;
        if header.alg != Algorithm::HS256 {
            return Err(VerifyError::Invalid);
        }

        let data = decode::<AccessClaims>(token, &self.decoding_key, &self.validation).map_err(
            |err| match err.kind() {
                ErrorKind::InvalidToken
                | ErrorKind::Base64(_)
                | ErrorKind::Json(_)
                | ErrorKind::Utf8(_) => VerifyError::Malformed,
                _ => VerifyError::Invalid,
            },
        )?;
        let claims = data.claims;

        if claims.typ != ACCESS_TOKEN_TYPE {
            return Err(VerifyError::Invalid);
        }
        let identity_id = Uuid::parse_str(&claims.sub).map_err(|_| VerifyError::Invalid)?;
        let session_id = Uuid::parse_str(&claims.sid).map_err(|_| VerifyError::Invalid)?;

        Ok(Principal {
            identity_id,
            email: claims.email,
            role: claims.role,
            session_id,
            expires_at: claims.exp,
        })
    }

    /// Verify a token and load the identity it names.
    ///
    /// # Errors
    /// Verification failures as in [`Self::verify`], `UnknownIdentity` when the
    /// identity no longer exists.
    pub async fn verify_identity(
        &self,
        token: &str,
        credentials: &dyn CredentialStore,
    ) -> Result<(Principal, Identity), AuthError> {
        let principal = self.verify(token)?;
        let identity = credentials
            .find_by_id(principal.identity_id)
            .await?
            .ok_or(AuthError::UnknownIdentity)?;
        Ok((principal, identity))
    }
}
