//! Refresh token records and their storage.
//!
//! Refresh tokens are opaque random strings. Only their SHA-256 is persisted, keyed
//! per token, and grouped by `session_id` so a whole login lineage can be revoked.
//! Each token is single use: redeeming it marks it used, and redeeming a used token
//! again is reported as a replay.

use anyhow::{Context, Result};
use async_trait::async_trait;
use base64ct::{Base64UrlUnpadded, Encoding};
use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};
use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
    time::Duration,
};
use tokio::{
    sync::RwLock,
    task::JoinHandle,
    time::{interval, MissedTickBehavior},
};
use tracing::{debug, error};
use uuid::Uuid;

use super::{identity::Role, unix_now};
use crate::store::StoreError;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RefreshRecord {
    pub token_hash: String,
    pub identity_id: Uuid,
    pub role: Role,
    pub session_id: Uuid,
    pub expires_at: i64,
    pub used_at: Option<i64>,
    pub revoked_at: Option<i64>,
}

impl RefreshRecord {
    /// Unused, unrevoked and not yet expired at `now`.
    #[must_use]
    pub const fn is_live(&self, now: i64) -> bool {
        self.used_at.is_none() && self.revoked_at.is_none() && self.expires_at > now
    }
}

/// Result of presenting a refresh token.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Redemption {
    /// First use of a live token; it is now marked used.
    Redeemed(RefreshRecord),
    /// The token was already used once.
    Replayed(RefreshRecord),
    Expired,
    Revoked,
    Unknown,
}

#[async_trait]
pub trait RefreshStore: Send + Sync {
    async fn insert(&self, record: RefreshRecord) -> Result<(), StoreError>;

    /// Atomically classify the token and, if live, mark it used at `now`.
    async fn redeem(&self, token_hash: &str, now: i64) -> Result<Redemption, StoreError>;

    async fn find(&self, token_hash: &str) -> Result<Option<RefreshRecord>, StoreError>;

    /// Mark every token of the session revoked.
    async fn revoke_session(&self, session_id: Uuid, now: i64) -> Result<(), StoreError>;

    /// A session is active while at least one of its tokens is not revoked.
    async fn session_active(&self, session_id: Uuid) -> Result<bool, StoreError>;

    /// Delete expired records, and used or revoked records of sessions with no
    /// live token left. Returns how many records were deleted.
    async fn purge_expired(&self, now: i64) -> Result<u64, StoreError>;
}

/// Generate a new opaque refresh token (32 random bytes, base64url).
///
/// # Errors
/// Returns an error if the OS random source fails.
pub fn generate_refresh_token() -> Result<String> {
    let mut bytes = [0u8; 32];
    OsRng
        .try_fill_bytes(&mut bytes)
        .context("failed to generate refresh token")?;
    Ok(Base64UrlUnpadded::encode_string(&bytes))
}

/// Hash a refresh token so the raw value never reaches storage.
#[must_use]
pub fn hash_refresh_token(token: &str) -> String {
    let digest = Sha256::digest(token.as_bytes());
    Base64UrlUnpadded::encode_string(&digest)
}

#[derive(Debug, Default)]
struct Records {
    by_hash: HashMap<String, RefreshRecord>,
    by_session: HashMap<Uuid, HashSet<String>>,
}

impl Records {
    fn session(&self, session_id: Uuid) -> impl Iterator<Item = &RefreshRecord> {
        self.by_session
            .get(&session_id)
            .into_iter()
            .flatten()
            .filter_map(|hash| self.by_hash.get(hash))
    }

    fn remove(&mut self, token_hash: &str) {
        if let Some(record) = self.by_hash.remove(token_hash) {
            if let Some(hashes) = self.by_session.get_mut(&record.session_id) {
                hashes.remove(token_hash);
                if hashes.is_empty() {
                    self.by_session.remove(&record.session_id);
                }
            }
        }
    }
}

/// In-memory refresh store, indexed by token hash and by session.
#[derive(Debug, Default)]
pub struct MemoryRefreshStore {
    records: RwLock<Records>,
}

impl MemoryRefreshStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records, live or not.
    pub async fn len(&self) -> usize {
        self.records.read().await.by_hash.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl RefreshStore for MemoryRefreshStore {
    async fn insert(&self, record: RefreshRecord) -> Result<(), StoreError> {
        let mut records = self.records.write().await;
        records
            .by_session
            .entry(record.session_id)
            .or_default()
            .insert(record.token_hash.clone());
        records.by_hash.insert(record.token_hash.clone(), record);
        Ok(())
    }

    async fn redeem(&self, token_hash: &str, now: i64) -> Result<Redemption, StoreError> {
        let mut records = self.records.write().await;
        let Some(record) = records.by_hash.get_mut(token_hash) else {
            return Ok(Redemption::Unknown);
        };
        if record.revoked_at.is_some() {
            return Ok(Redemption::Revoked);
        }
        if record.used_at.is_some() {
            return Ok(Redemption::Replayed(record.clone()));
        }
        if record.expires_at <= now {
            return Ok(Redemption::Expired);
        }
        record.used_at = Some(now);
        Ok(Redemption::Redeemed(record.clone()))
    }

    async fn find(&self, token_hash: &str) -> Result<Option<RefreshRecord>, StoreError> {
        Ok(self.records.read().await.by_hash.get(token_hash).cloned())
    }

    async fn revoke_session(&self, session_id: Uuid, now: i64) -> Result<(), StoreError> {
        let mut guard = self.records.write().await;
        let records = &mut *guard;
        for hash in records.by_session.get(&session_id).into_iter().flatten() {
            if let Some(record) = records.by_hash.get_mut(hash) {
                record.revoked_at.get_or_insert(now);
            }
        }
        Ok(())
    }

    async fn session_active(&self, session_id: Uuid) -> Result<bool, StoreError> {
        Ok(self
            .records
            .read()
            .await
            .session(session_id)
            .any(|r| r.revoked_at.is_none()))
    }

    async fn purge_expired(&self, now: i64) -> Result<u64, StoreError> {
        let mut guard = self.records.write().await;
        let doomed: Vec<String> = {
            let records: &Records = &guard;
            records
                .by_session
                .keys()
                .flat_map(move |&session_id| {
                    let alive = records.session(session_id).any(|r| r.is_live(now));
                    records
                        .session(session_id)
                        .filter(move |r| r.expires_at <= now || !alive)
                        .map(|r| r.token_hash.clone())
                })
                .collect()
        };
        for hash in &doomed {
            guard.remove(hash);
        }
        Ok(u64::try_from(doomed.len()).unwrap_or(u64::MAX))
    }
}

/// Purge dead refresh records every `every` until the task is aborted.
pub fn spawn_purge(store: Arc<dyn RefreshStore>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match store.purge_expired(unix_now()).await {
                Ok(0) => {}
                Ok(purged) => debug!(purged, "purged refresh tokens"),
                Err(err) => error!("Failed to purge refresh tokens: {err}"),
            }
        }
    })
}
