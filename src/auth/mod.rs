//! Token issuance, verification and password handling.

pub mod bootstrap;
pub mod error;
pub mod identity;
pub mod password;
pub mod refresh;
pub mod token;

pub use self::error::{AuthError, VerifyError};
pub use self::identity::{Identity, IdentitySummary, IdentityUpdate, NewIdentity, Profile, Role};
pub use self::refresh::{MemoryRefreshStore, Redemption, RefreshRecord, RefreshStore};
pub use self::token::{IssuedTokens, Principal, SessionVerifier, TokenIssuer, TokenSettings};

use std::time::{SystemTime, UNIX_EPOCH};

/// Current time in unix seconds.
#[must_use]
pub fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
}

/// Lower-case and trim an email so lookups are case insensitive.
#[must_use]
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[must_use]
pub fn valid_email(email: &str) -> bool {
    regex::Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|re| re.is_match(email))
}
