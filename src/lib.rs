//! # Pqrix (client and admin sessions)
//!
//! `pqrix` issues, verifies and refreshes the sessions used by the agency site's
//! client self-service area and its admin panel.
//!
//! ## Tokens
//!
//! A login yields a short-lived signed access token (HS256 JWT) and a long-lived
//! opaque refresh token. Access tokens are verified statelessly and are never
//! accepted at or after their expiry. Refresh tokens are stored hashed, rotate on
//! every use, and a replayed refresh token revokes its whole session.
//!
//! ## Client side
//!
//! [`client::AutoRefreshClient`] attaches the current access token to API calls,
//! performs a single coalesced refresh when the server reports `token_expired`, and
//! retries the call once. [`guard::RouteGuard`] gates protected views by role and
//! redirects to the matching login entry point.
//!
//! ## Storage
//!
//! Identities live behind [`store::CredentialStore`] and refresh tokens behind
//! [`auth::RefreshStore`]; both have in-memory and Postgres implementations.

pub mod api;
pub mod auth;
pub mod cli;
pub mod client;
pub mod guard;
pub mod store;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_git_commit_hash_format() {
        if GIT_COMMIT_HASH == "unknown" {
            // Acceptable in non-git build environments
            return;
        }
        assert!(
            GIT_COMMIT_HASH.chars().all(|c| c.is_ascii_hexdigit()),
            "GIT_COMMIT_HASH should be a hex string, got: {GIT_COMMIT_HASH}"
        );
        assert!(GIT_COMMIT_HASH.len() >= 7);
    }

    #[test]
    fn test_app_user_agent_format() {
        assert!(APP_USER_AGENT.starts_with("pqrix/"));
        assert!(APP_USER_AGENT.ends_with(env!("CARGO_PKG_VERSION")));
    }
}
