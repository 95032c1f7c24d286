use crate::{
    api::{self, AuthConfig, AuthState},
    auth::{bootstrap::ensure_admin, refresh::spawn_purge, MemoryRefreshStore, RefreshStore},
    store::{postgres::PgStore, CredentialStore, MemoryCredentialStore},
};
use anyhow::{Context, Result};
use secrecy::SecretString;
use std::{sync::Arc, time::Duration};
use tracing::{info, warn};

const REFRESH_PURGE_INTERVAL: Duration = Duration::from_secs(10 * 60);

#[derive(Debug)]
pub struct AdminSeed {
    pub email: String,
    pub password: SecretString,
}

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: Option<String>,
    pub jwt_secret: SecretString,
    pub access_ttl_seconds: i64,
    pub refresh_ttl_seconds: i64,
    pub frontend_url: String,
    pub issuer: String,
    pub admin: Option<AdminSeed>,
}

impl Args {
    fn auth_config(&self) -> AuthConfig {
        AuthConfig::new(self.frontend_url.clone())
            .with_access_ttl_seconds(self.access_ttl_seconds)
            .with_refresh_ttl_seconds(self.refresh_ttl_seconds)
            .with_issuer(self.issuer.clone())
    }
}

/// Execute the server action.
/// # Errors
/// Returns an error if the store cannot be prepared, the admin cannot be seeded,
/// or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    log_startup_args(&args);

    let (credentials, refresh): (Arc<dyn CredentialStore>, Arc<dyn RefreshStore>) =
        if let Some(dsn) = &args.dsn {
            let store = Arc::new(PgStore::connect(dsn).await?);
            store.migrate().await?;
            (store.clone(), store)
        } else {
            warn!("No DSN configured: accounts and sessions are kept in memory only");
            (
                Arc::new(MemoryCredentialStore::new()),
                Arc::new(MemoryRefreshStore::new()),
            )
        };

    if let Some(admin) = &args.admin {
        let identity = ensure_admin(credentials.as_ref(), &admin.email, &admin.password)
            .await
            .context("Failed to bootstrap admin")?;
        info!(identity_id = %identity.id, "admin account ready");
    }

    let purge = spawn_purge(refresh.clone(), REFRESH_PURGE_INTERVAL);

    let state = Arc::new(AuthState::new(
        args.auth_config(),
        &args.jwt_secret,
        credentials,
        refresh,
    ));

    let result = api::new(args.port, state).await;
    purge.abort();
    result
}

fn log_startup_args(args: &Args) {
    info!(
        port = args.port,
        store = if args.dsn.is_some() { "postgres" } else { "memory" },
        access_ttl_seconds = args.access_ttl_seconds,
        refresh_ttl_seconds = args.refresh_ttl_seconds,
        frontend_url = %args.frontend_url,
        issuer = %args.issuer,
        admin_seed = args.admin.is_some(),
        "starting pqrix"
    );
}
