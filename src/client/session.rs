//! Observable client session state.
//!
//! The token pair and identity live in a `watch` channel and are always replaced
//! whole, so readers never see an access token paired with another login's refresh
//! token. Two counters guard concurrent updates:
//!
//! - `epoch` changes on every login and logout. Responses that started under an
//!   older epoch must not write into the session.
//! - `generation` changes whenever the tokens change. A refresh that started from an
//!   older generation knows someone else already rotated the pair.

use std::{fmt, sync::Arc, time::Duration};
use tokio::{sync::watch, time::Instant};

use crate::{api::types::SessionResponse, auth::IdentitySummary};

#[derive(Clone, PartialEq, Eq)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub access_expires_at: Instant,
    pub refresh_expires_at: Instant,
}

impl TokenPair {
    /// Build a pair from a login or refresh response, anchoring expiry to the local clock.
    #[must_use]
    pub fn from_response(response: &SessionResponse) -> Self {
        let now = Instant::now();
        let secs = |value: i64| Duration::from_secs(u64::try_from(value).unwrap_or(0));
        Self {
            access_token: response.access_token.clone(),
            refresh_token: response.refresh_token.clone(),
            access_expires_at: now + secs(response.expires_in),
            refresh_expires_at: now + secs(response.refresh_expires_in),
        }
    }

    #[must_use]
    pub fn access_expired(&self) -> bool {
        Instant::now() >= self.access_expires_at
    }
}

impl fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenPair")
            .field("access_expires_at", &self.access_expires_at)
            .field("refresh_expires_at", &self.refresh_expires_at)
            .finish_non_exhaustive()
    }
}

#[derive(Clone, Debug, Default)]
pub struct SessionSnapshot {
    pub epoch: u64,
    pub generation: u64,
    pub tokens: Option<TokenPair>,
    pub identity: Option<IdentitySummary>,
}

impl SessionSnapshot {
    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        self.tokens.is_some()
    }
}

/// Shared handle to the session; clones observe and mutate the same state.
#[derive(Clone, Debug)]
pub struct SessionStore {
    tx: Arc<watch::Sender<SessionSnapshot>>,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore {
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(SessionSnapshot::default());
        Self { tx: Arc::new(tx) }
    }

    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        self.tx.borrow().clone()
    }

    #[must_use]
    pub fn epoch(&self) -> u64 {
        self.tx.borrow().epoch
    }

    #[must_use]
    pub fn identity(&self) -> Option<IdentitySummary> {
        self.tx.borrow().identity.clone()
    }

    /// Receive every session change: login, refresh, profile update and logout.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.tx.subscribe()
    }

    /// Install a new login if the session is still at `expected_epoch`.
    ///
    /// Returns the new epoch, or `None` when another login or logout got there first.
    pub fn establish(
        &self,
        expected_epoch: u64,
        tokens: TokenPair,
        identity: IdentitySummary,
    ) -> Option<u64> {
        let mut new_epoch = None;
        self.tx.send_if_modified(|state| {
            if state.epoch != expected_epoch {
                return false;
            }
            state.epoch += 1;
            state.generation += 1;
            state.tokens = Some(tokens);
            state.identity = Some(identity);
            new_epoch = Some(state.epoch);
            true
        });
        new_epoch
    }

    /// Swap in a refreshed pair, only within the same login.
    pub fn replace_tokens(&self, expected_epoch: u64, tokens: TokenPair) -> bool {
        self.tx.send_if_modified(|state| {
            if state.epoch != expected_epoch || state.tokens.is_none() {
                return false;
            }
            state.generation += 1;
            state.tokens = Some(tokens);
            true
        })
    }

    pub fn set_identity(&self, expected_epoch: u64, identity: IdentitySummary) -> bool {
        self.tx.send_if_modified(|state| {
            if state.epoch != expected_epoch || state.tokens.is_none() {
                return false;
            }
            if state.identity.as_ref() == Some(&identity) {
                return false;
            }
            state.identity = Some(identity);
            true
        })
    }

    /// Drop the session. Returns the tokens that were cleared, if any.
    pub fn clear(&self) -> Option<TokenPair> {
        let mut previous = None;
        self.tx.send_modify(|state| {
            previous = state.tokens.take();
            state.identity = None;
            state.epoch += 1;
            state.generation += 1;
        });
        previous
    }

    /// [`Self::clear`], but only if no newer login replaced the session meanwhile.
    pub fn clear_if(&self, expected_epoch: u64) -> bool {
        self.tx.send_if_modified(|state| {
            if state.epoch != expected_epoch {
                return false;
            }
            state.tokens = None;
            state.identity = None;
            state.epoch += 1;
            state.generation += 1;
            true
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Role;
    use uuid::Uuid;

    fn identity(name: &str) -> IdentitySummary {
        IdentitySummary {
            id: Uuid::nil(),
            email: "ana@studio.test".to_string(),
            role: Role::Client,
            name: name.to_string(),
            phone: None,
            company: None,
            avatar: None,
        }
    }

    fn tokens(tag: &str) -> TokenPair {
        let now = Instant::now();
        TokenPair {
            access_token: format!("access-{tag}"),
            refresh_token: format!("refresh-{tag}"),
            access_expires_at: now + Duration::from_secs(60),
            refresh_expires_at: now + Duration::from_secs(600),
        }
    }

    #[tokio::test]
    async fn establish_bumps_epoch_and_notifies() {
        let store = SessionStore::new();
        let mut rx = store.subscribe();

        let epoch = store.establish(0, tokens("a"), identity("Ana"));
        assert_eq!(epoch, Some(1));
        assert!(rx.has_changed().unwrap_or(false));

        let snapshot = rx.borrow_and_update().clone();
        assert!(snapshot.is_authenticated());
        assert_eq!(snapshot.identity.map(|i| i.name), Some("Ana".to_string()));
    }

    #[tokio::test]
    async fn stale_writes_are_ignored() {
        let store = SessionStore::new();
        let epoch = store.establish(0, tokens("a"), identity("Ana")).unwrap_or(0);
        store.clear();

        assert!(!store.replace_tokens(epoch, tokens("b")));
        assert!(!store.set_identity(epoch, identity("Late")));
        assert!(store.establish(epoch, tokens("c"), identity("Late")).is_none());
        assert!(!store.snapshot().is_authenticated());
    }

    #[tokio::test]
    async fn replace_tokens_swaps_the_whole_pair() {
        let store = SessionStore::new();
        let epoch = store.establish(0, tokens("a"), identity("Ana")).unwrap_or(0);
        let before = store.snapshot().generation;

        assert!(store.replace_tokens(epoch, tokens("b")));
        let snapshot = store.snapshot();
        assert_eq!(snapshot.generation, before + 1);
        assert_eq!(snapshot.epoch, epoch);
        let pair = snapshot.tokens.unwrap_or_else(|| tokens("missing"));
        assert_eq!(pair.access_token, "access-b");
        assert_eq!(pair.refresh_token, "refresh-b");
    }

    #[tokio::test]
    async fn identity_updates_notify_subscribers() {
        let store = SessionStore::new();
        let epoch = store.establish(0, tokens("a"), identity("Ana")).unwrap_or(0);
        let mut rx = store.subscribe();

        // unchanged identity is not a change
        assert!(!store.set_identity(epoch, identity("Ana")));
        assert!(!rx.has_changed().unwrap_or(true));

        assert!(store.set_identity(epoch, identity("Ana B.")));
        assert!(rx.has_changed().unwrap_or(false));
        assert_eq!(
            store.identity().map(|i| i.name),
            Some("Ana B.".to_string())
        );
    }

    #[tokio::test]
    async fn clear_if_respects_newer_logins() {
        let store = SessionStore::new();
        let first = store.establish(0, tokens("a"), identity("Ana")).unwrap_or(0);
        store.clear();
        let second = store.establish(store.epoch(), tokens("b"), identity("Ana")).unwrap_or(0);

        assert!(!store.clear_if(first));
        assert!(store.snapshot().is_authenticated());
        assert!(store.clear_if(second));
        assert!(!store.snapshot().is_authenticated());
    }

    #[test]
    fn debug_hides_tokens() {
        let rendered = format!("{:?}", tokens("secret"));
        assert!(!rendered.contains("access-secret"));
        assert!(!rendered.contains("refresh-secret"));
    }
}
