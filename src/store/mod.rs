//! Credential storage.
//!
//! The session service only needs a handful of identity operations; anything that
//! can answer them can back it. [`MemoryCredentialStore`] is used for development
//! and tests, [`postgres::PgStore`] in production.

pub mod postgres;

use async_trait::async_trait;
use secrecy::SecretString;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::auth::{
    identity::{Identity, IdentityUpdate, NewIdentity, Role},
    password, unix_now,
};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("email already registered")]
    DuplicateEmail,
    #[error("identity not found")]
    NotFound,
    #[error("invalid stored value: {0}")]
    Corrupt(String),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn find_by_email(&self, email: &str) -> Result<Option<Identity>, StoreError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Identity>, StoreError>;

    /// Persist a new identity. Emails are unique.
    async fn create(&self, identity: NewIdentity) -> Result<Identity, StoreError>;

    async fn update(&self, id: Uuid, update: IdentityUpdate) -> Result<Identity, StoreError>;

    /// Identities ordered by creation time, optionally filtered by role.
    async fn list(&self, role: Option<Role>) -> Result<Vec<Identity>, StoreError>;

    /// Check `password` against the identity's stored hash on the blocking pool.
    ///
    /// `None` stands for an unknown email: the check still runs, against
    /// [`password::DECOY_PASSWORD_HASH`], and never succeeds.
    async fn verify_password(&self, identity: Option<&Identity>, password: SecretString) -> bool {
        let stored_hash = identity.map_or_else(
            || password::DECOY_PASSWORD_HASH.to_string(),
            |identity| identity.password_hash.clone(),
        );
        password::verify_password_blocking(password, stored_hash).await
    }

    /// Short backend name reported by `/health`.
    fn kind(&self) -> &'static str;

    /// Check the backend is reachable.
    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    identities: RwLock<HashMap<Uuid, Identity>>,
}

impl MemoryCredentialStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a fully formed identity, keeping its id.
    ///
    /// # Errors
    /// Returns `StoreError::DuplicateEmail` if the email is taken.
    pub async fn insert_identity(&self, identity: Identity) -> Result<Identity, StoreError> {
        let mut identities = self.identities.write().await;
        if identities.values().any(|i| i.email == identity.email) {
            return Err(StoreError::DuplicateEmail);
        }
        identities.insert(identity.id, identity.clone());
        Ok(identity)
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<Identity>, StoreError> {
        Ok(self
            .identities
            .read()
            .await
            .values()
            .find(|i| i.email == email)
            .cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Identity>, StoreError> {
        Ok(self.identities.read().await.get(&id).cloned())
    }

    async fn create(&self, identity: NewIdentity) -> Result<Identity, StoreError> {
        self.insert_identity(Identity {
            id: Uuid::now_v7(),
            email: identity.email,
            password_hash: identity.password_hash,
            role: identity.role,
            display_name: identity.display_name,
            profile: identity.profile,
            created_at_unix: unix_now(),
        })
        .await
    }

    async fn update(&self, id: Uuid, update: IdentityUpdate) -> Result<Identity, StoreError> {
        let mut identities = self.identities.write().await;
        let identity = identities.get_mut(&id).ok_or(StoreError::NotFound)?;
        update.apply(identity);
        Ok(identity.clone())
    }

    async fn list(&self, role: Option<Role>) -> Result<Vec<Identity>, StoreError> {
        let mut identities: Vec<Identity> = self
            .identities
            .read()
            .await
            .values()
            .filter(|i| role.map_or(true, |r| i.role == r))
            .cloned()
            .collect();
        // v7 ids sort by creation time
        identities.sort_by_key(|i| (i.created_at_unix, i.id));
        Ok(identities)
    }

    fn kind(&self) -> &'static str {
        "memory"
    }
}
