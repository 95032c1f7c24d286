//! Argon2id password hashing.
//!
//! Hashing is CPU bound, so the async wrappers move the work onto the blocking pool.

use anyhow::{anyhow, Context, Result};
use argon2::{
    password_hash::{rand_core::OsRng, SaltString},
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
};
use secrecy::{ExposeSecret, SecretString};

use super::error::AuthError;

pub const MIN_PASSWORD_LEN: usize = 6;

/// Well-formed argon2id hash with the default cost parameters that no password
/// matches. Checked when a login names an unknown email so both paths pay for one
/// argon2 verification.
pub const DECOY_PASSWORD_HASH: &str =
    "$argon2id$v=19$m=19456,t=2,p=1$oyE8BrQ1miHbVoVGi7k1Vg$kQVzzj4wrHoY9G3uu0tvp+piZo8rCAnQ7m7hHnE6CwI";

/// Reject passwords shorter than [`MIN_PASSWORD_LEN`] characters.
///
/// # Errors
/// Returns `AuthError::Validation` when the password is too short.
pub fn validate_password(password: &str) -> Result<(), AuthError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AuthError::Validation(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

/// Hash a password into a PHC string.
///
/// # Errors
/// Returns an error if Argon2 fails to hash the input.
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| anyhow!("failed to hash password: {e}"))
}

/// Check a password against a stored PHC string. Unparsable hashes never match.
#[must_use]
pub fn verify_password(password: &str, stored_hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(stored_hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

/// [`hash_password`] on the blocking pool.
///
/// # Errors
/// Returns an error if hashing fails or the blocking task panics.
pub async fn hash_password_blocking(password: SecretString) -> Result<String> {
    tokio::task::spawn_blocking(move || hash_password(password.expose_secret()))
        .await
        .context("password hashing task failed")?
}

/// [`verify_password`] on the blocking pool. A failed task counts as a mismatch.
pub async fn verify_password_blocking(password: SecretString, stored_hash: String) -> bool {
    tokio::task::spawn_blocking(move || verify_password(password.expose_secret(), &stored_hash))
        .await
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_then_verify() -> Result<()> {
        let hash = hash_password("correct horse")?;
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password("correct horse", &hash));
        assert!(!verify_password("battery staple", &hash));
        Ok(())
    }

    #[test]
    fn same_password_gets_distinct_salts() -> Result<()> {
        assert_ne!(hash_password("secret1")?, hash_password("secret1")?);
        Ok(())
    }

    #[test]
    fn garbage_hash_never_matches() {
        assert!(!verify_password("anything", "not-a-phc-string"));
        assert!(!verify_password("anything", ""));
    }

    #[test]
    fn short_passwords_are_rejected() {
        assert!(validate_password("12345").is_err());
        assert!(validate_password("123456").is_ok());
        // counted in characters, not bytes
        assert!(validate_password("ñññññ").is_err());
    }

    #[test]
    fn decoy_hash_costs_the_same_as_a_real_one() -> Result<()> {
        let decoy = PasswordHash::new(DECOY_PASSWORD_HASH)
            .map_err(|e| anyhow!("decoy hash does not parse: {e}"))?;
        let real_hash = hash_password("secret1")?;
        let real = PasswordHash::new(&real_hash).map_err(|e| anyhow!("{e}"))?;
        assert_eq!(decoy.algorithm, real.algorithm);
        assert_eq!(decoy.params, real.params);
        assert!(!verify_password("secret1", DECOY_PASSWORD_HASH));
        assert!(!verify_password("", DECOY_PASSWORD_HASH));
        Ok(())
    }

    #[tokio::test]
    async fn blocking_wrappers_agree() -> Result<()> {
        let hash = hash_password_blocking(SecretString::from("s3cret!")).await?;
        assert!(verify_password_blocking(SecretString::from("s3cret!"), hash.clone()).await);
        assert!(!verify_password_blocking(SecretString::from("wrong!!"), hash).await);
        Ok(())
    }
}
