//! Seeding of the initial admin identity.

use anyhow::{Context, Result};
use secrecy::{ExposeSecret, SecretString};
use tracing::{info, warn};

use super::{normalize_email, password, valid_email, Identity, NewIdentity, Profile, Role};
use crate::store::{CredentialStore, StoreError};

/// Make sure an admin with `email` exists, creating it with `password` if missing.
///
/// An existing identity is left untouched, including its password. An existing
/// client with that email is not promoted.
///
/// # Errors
/// Returns an error for invalid input or if the store fails.
pub async fn ensure_admin(
    store: &dyn CredentialStore,
    email: &str,
    password: &SecretString,
) -> Result<Identity> {
    let email = normalize_email(email);
    anyhow::ensure!(valid_email(&email), "invalid admin email: {email}");
    password::validate_password(password.expose_secret())
        .map_err(|e| anyhow::anyhow!("invalid admin password: {e}"))?;

    if let Some(existing) = store.find_by_email(&email).await? {
        if existing.role != Role::Admin {
            warn!(%email, "bootstrap admin email belongs to a non-admin identity");
        }
        return Ok(existing);
    }

    let password_hash = password::hash_password_blocking(password.clone()).await?;
    let created = store
        .create(NewIdentity {
            email: email.clone(),
            password_hash,
            role: Role::Admin,
            display_name: "Administrator".to_string(),
            profile: Profile::default(),
        })
        .await;

    match created {
        Ok(identity) => {
            info!(%email, "bootstrap admin created");
            Ok(identity)
        }
        // lost a race with another instance
        Err(StoreError::DuplicateEmail) => store
            .find_by_email(&email)
            .await?
            .context("bootstrap admin vanished after duplicate insert"),
        Err(err) => Err(err.into()),
    }
}
