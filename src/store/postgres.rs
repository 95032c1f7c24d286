//! Postgres-backed credential and refresh token storage.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, postgres::PgRow, Connection, PgPool, Row};
use std::time::Duration;
use tracing::{info_span, Instrument, Span};
use uuid::Uuid;

use super::{CredentialStore, StoreError};
use crate::auth::{
    identity::{Identity, IdentityUpdate, NewIdentity, Profile, Role},
    refresh::{Redemption, RefreshRecord, RefreshStore},
};

pub const SCHEMA_SQL: &str = include_str!("../../sql/schema.sql");

const IDENTITY_COLUMNS: &str = "id, email, password_hash, role, display_name, phone, company, \
     avatar, EXTRACT(EPOCH FROM created_at)::bigint AS created_at_unix";

const REFRESH_COLUMNS: &str =
    "token_hash, identity_id, role, session_id, expires_at, used_at, revoked_at";

#[derive(Clone, Debug)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect with the pool settings used by the server.
    ///
    /// # Errors
    /// Returns an error if the database is unreachable.
    pub async fn connect(dsn: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .min_connections(1)
            .max_connections(5)
            .max_lifetime(Duration::from_secs(60 * 2))
            .test_before_acquire(true)
            .connect(dsn)
            .await
            .context("Failed to connect to database")?;
        Ok(Self::new(pool))
    }

    /// Create tables and indexes if they do not exist yet.
    ///
    /// # Errors
    /// Returns an error if the schema cannot be applied.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::raw_sql(SCHEMA_SQL)
            .execute(&self.pool)
            .instrument(db_span("MIGRATE", "sql/schema.sql"))
            .await
            .context("failed to apply schema")?;
        Ok(())
    }

    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn db_span(operation: &'static str, statement: &str) -> Span {
    info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = operation,
        db.statement = statement
    )
}

fn parse_role(value: &str) -> Result<Role, StoreError> {
    value
        .parse()
        .map_err(|e: crate::auth::identity::UnknownRole| StoreError::Corrupt(e.to_string()))
}

fn identity_from_row(row: &PgRow) -> Result<Identity, StoreError> {
    let role: String = row.try_get("role")?;
    Ok(Identity {
        id: row.try_get("id")?,
        email: row.try_get("email")?,
        password_hash: row.try_get("password_hash")?,
        role: parse_role(&role)?,
        display_name: row.try_get("display_name")?,
        profile: Profile {
            phone: row.try_get("phone")?,
            company: row.try_get("company")?,
            avatar: row.try_get("avatar")?,
        },
        created_at_unix: row.try_get("created_at_unix")?,
    })
}

fn refresh_from_row(row: &PgRow) -> Result<RefreshRecord, StoreError> {
    let role: String = row.try_get("role")?;
    Ok(RefreshRecord {
        token_hash: row.try_get("token_hash")?,
        identity_id: row.try_get("identity_id")?,
        role: parse_role(&role)?,
        session_id: row.try_get("session_id")?,
        expires_at: row.try_get("expires_at")?,
        used_at: row.try_get("used_at")?,
        revoked_at: row.try_get("revoked_at")?,
    })
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

#[async_trait]
impl CredentialStore for PgStore {
    async fn ping(&self) -> Result<(), StoreError> {
        let acquire_span = info_span!(
            "db.acquire",
            db.system = "postgresql",
            db.operation = "ACQUIRE"
        );
        let mut conn = self.pool.acquire().instrument(acquire_span).await?;
        let ping_span = info_span!("db.ping", db.system = "postgresql", db.operation = "PING");
        conn.ping().instrument(ping_span).await?;
        Ok(())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Identity>, StoreError> {
        let query = format!("SELECT {IDENTITY_COLUMNS} FROM identities WHERE email = $1");
        let row = sqlx::query(&query)
            .bind(email)
            .fetch_optional(&self.pool)
            .instrument(db_span("SELECT", &query))
            .await?;
        row.as_ref().map(identity_from_row).transpose()
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Identity>, StoreError> {
        let query = format!("SELECT {IDENTITY_COLUMNS} FROM identities WHERE id = $1");
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .instrument(db_span("SELECT", &query))
            .await?;
        row.as_ref().map(identity_from_row).transpose()
    }

    async fn create(&self, identity: NewIdentity) -> Result<Identity, StoreError> {
        let query = format!(
            "INSERT INTO identities \
                (id, email, password_hash, role, display_name, phone, company, avatar) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             RETURNING {IDENTITY_COLUMNS}"
        );
        let result = sqlx::query(&query)
            .bind(Uuid::now_v7())
            .bind(&identity.email)
            .bind(&identity.password_hash)
            .bind(identity.role.as_str())
            .bind(&identity.display_name)
            .bind(&identity.profile.phone)
            .bind(&identity.profile.company)
            .bind(&identity.profile.avatar)
            .fetch_one(&self.pool)
            .instrument(db_span("INSERT", &query))
            .await;

        match result {
            Ok(row) => identity_from_row(&row),
            Err(err) if is_unique_violation(&err) => Err(StoreError::DuplicateEmail),
            Err(err) => Err(err.into()),
        }
    }

    async fn update(&self, id: Uuid, update: IdentityUpdate) -> Result<Identity, StoreError> {
        let query = format!(
            "UPDATE identities SET \
                display_name = COALESCE($2, display_name), \
                phone = COALESCE($3, phone), \
                company = COALESCE($4, company), \
                avatar = COALESCE($5, avatar), \
                password_hash = COALESCE($6, password_hash) \
             WHERE id = $1 \
             RETURNING {IDENTITY_COLUMNS}"
        );
        let row = sqlx::query(&query)
            .bind(id)
            .bind(update.display_name)
            .bind(update.phone)
            .bind(update.company)
            .bind(update.avatar)
            .bind(update.password_hash)
            .fetch_optional(&self.pool)
            .instrument(db_span("UPDATE", &query))
            .await?;
        row.as_ref()
            .map(identity_from_row)
            .transpose()?
            .ok_or(StoreError::NotFound)
    }

    async fn list(&self, role: Option<Role>) -> Result<Vec<Identity>, StoreError> {
        let query = format!(
            "SELECT {IDENTITY_COLUMNS} FROM identities \
             WHERE $1::text IS NULL OR role = $1 \
             ORDER BY created_at, id"
        );
        let rows = sqlx::query(&query)
            .bind(role.map(Role::as_str))
            .fetch_all(&self.pool)
            .instrument(db_span("SELECT", &query))
            .await?;
        rows.iter().map(identity_from_row).collect()
    }

    fn kind(&self) -> &'static str {
        "postgres"
    }
}

#[async_trait]
impl RefreshStore for PgStore {
    async fn insert(&self, record: RefreshRecord) -> Result<(), StoreError> {
        let query = r"
            INSERT INTO refresh_tokens
                (token_hash, identity_id, role, session_id, expires_at, used_at, revoked_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
        ";
        sqlx::query(query)
            .bind(&record.token_hash)
            .bind(record.identity_id)
            .bind(record.role.as_str())
            .bind(record.session_id)
            .bind(record.expires_at)
            .bind(record.used_at)
            .bind(record.revoked_at)
            .execute(&self.pool)
            .instrument(db_span("INSERT", query))
            .await?;
        Ok(())
    }

    async fn redeem(&self, token_hash: &str, now: i64) -> Result<Redemption, StoreError> {
        // The guarded UPDATE is the single point of truth for "first use wins".
        let query = format!(
            "UPDATE refresh_tokens SET used_at = $2 \
             WHERE token_hash = $1 AND used_at IS NULL AND revoked_at IS NULL AND expires_at > $2 \
             RETURNING {REFRESH_COLUMNS}"
        );
        let row = sqlx::query(&query)
            .bind(token_hash)
            .bind(now)
            .fetch_optional(&self.pool)
            .instrument(db_span("UPDATE", &query))
            .await?;
        if let Some(row) = row {
            return Ok(Redemption::Redeemed(refresh_from_row(&row)?));
        }

        let Some(record) = self.find(token_hash).await? else {
            return Ok(Redemption::Unknown);
        };
        Ok(if record.revoked_at.is_some() {
            Redemption::Revoked
        } else if record.used_at.is_some() {
            Redemption::Replayed(record)
        } else {
            Redemption::Expired
        })
    }

    async fn find(&self, token_hash: &str) -> Result<Option<RefreshRecord>, StoreError> {
        let query = format!("SELECT {REFRESH_COLUMNS} FROM refresh_tokens WHERE token_hash = $1");
        let row = sqlx::query(&query)
            .bind(token_hash)
            .fetch_optional(&self.pool)
            .instrument(db_span("SELECT", &query))
            .await?;
        row.as_ref().map(refresh_from_row).transpose()
    }

    async fn revoke_session(&self, session_id: Uuid, now: i64) -> Result<(), StoreError> {
        let query = r"
            UPDATE refresh_tokens SET revoked_at = $2
            WHERE session_id = $1 AND revoked_at IS NULL
        ";
        sqlx::query(query)
            .bind(session_id)
            .bind(now)
            .execute(&self.pool)
            .instrument(db_span("UPDATE", query))
            .await?;
        Ok(())
    }

    async fn session_active(&self, session_id: Uuid) -> Result<bool, StoreError> {
        let query = r"
            SELECT EXISTS (
                SELECT 1 FROM refresh_tokens WHERE session_id = $1 AND revoked_at IS NULL
            ) AS active
        ";
        let row = sqlx::query(query)
            .bind(session_id)
            .fetch_one(&self.pool)
            .instrument(db_span("SELECT", query))
            .await?;
        Ok(row.try_get("active")?)
    }

    async fn purge_expired(&self, now: i64) -> Result<u64, StoreError> {
        let query = r"
            DELETE FROM refresh_tokens AS dead
            WHERE dead.expires_at <= $1
               OR NOT EXISTS (
                   SELECT 1 FROM refresh_tokens AS live
                   WHERE live.session_id = dead.session_id
                     AND live.used_at IS NULL
                     AND live.revoked_at IS NULL
                     AND live.expires_at > $1
               )
        ";
        let result = sqlx::query(query)
            .bind(now)
            .execute(&self.pool)
            .instrument(db_span("DELETE", query))
            .await?;
        Ok(result.rows_affected())
    }
}
