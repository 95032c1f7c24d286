use crate::cli::{
    actions::{
        server::{AdminSeed, Args},
        Action,
    },
    commands::auth::{
        ARG_ACCESS_TTL, ARG_ADMIN_EMAIL, ARG_ADMIN_PASSWORD, ARG_FRONTEND_URL, ARG_ISSUER,
        ARG_JWT_SECRET, ARG_REFRESH_TTL,
    },
};
use anyhow::{ensure, Context, Result};
use secrecy::SecretString;

/// HS256 keys shorter than the hash output are easy to brute force.
pub const MIN_JWT_SECRET_BYTES: usize = 32;

/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>("port").copied().unwrap_or(8080);
    let dsn = matches.get_one::<String>("dsn").cloned();

    let jwt_secret = matches
        .get_one::<String>(ARG_JWT_SECRET)
        .cloned()
        .context("missing required argument: --jwt-secret")?;
    ensure!(
        jwt_secret.len() >= MIN_JWT_SECRET_BYTES,
        "--jwt-secret must be at least {MIN_JWT_SECRET_BYTES} bytes"
    );

    let access_ttl_seconds = matches
        .get_one::<i64>(ARG_ACCESS_TTL)
        .copied()
        .context("missing required argument: --access-ttl")?;
    let refresh_ttl_seconds = matches
        .get_one::<i64>(ARG_REFRESH_TTL)
        .copied()
        .context("missing required argument: --refresh-ttl")?;
    ensure!(
        refresh_ttl_seconds > access_ttl_seconds,
        "--refresh-ttl must be longer than --access-ttl"
    );

    let frontend_url = matches
        .get_one::<String>(ARG_FRONTEND_URL)
        .cloned()
        .context("missing required argument: --frontend-url")?;
    let issuer = matches
        .get_one::<String>(ARG_ISSUER)
        .cloned()
        .context("missing required argument: --issuer")?;

    let admin = match (
        matches.get_one::<String>(ARG_ADMIN_EMAIL),
        matches.get_one::<String>(ARG_ADMIN_PASSWORD),
    ) {
        (Some(email), Some(password)) => Some(AdminSeed {
            email: email.clone(),
            password: SecretString::from(password.clone()),
        }),
        _ => None,
    };

    Ok(Action::Server(Args {
        port,
        dsn,
        jwt_secret: SecretString::from(jwt_secret),
        access_ttl_seconds,
        refresh_ttl_seconds,
        frontend_url,
        issuer,
        admin,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::commands;
    use secrecy::ExposeSecret;

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    fn dispatch(args: &[&str]) -> Result<Action> {
        let mut argv = vec!["pqrix"];
        argv.extend_from_slice(args);
        let matches = commands::new().try_get_matches_from(argv)?;
        handler(&matches)
    }

    fn clean_env<F: FnOnce()>(f: F) {
        temp_env::with_vars_unset(
            [
                "PQRIX_PORT",
                "PQRIX_DSN",
                "PQRIX_JWT_SECRET",
                "PQRIX_ACCESS_TTL_SECONDS",
                "PQRIX_REFRESH_TTL_SECONDS",
                "PQRIX_FRONTEND_URL",
                "PQRIX_JWT_ISSUER",
                "PQRIX_ADMIN_EMAIL",
                "PQRIX_ADMIN_PASSWORD",
            ],
            f,
        );
    }

    #[test]
    fn builds_server_action() {
        clean_env(|| {
            let action = dispatch(&[
                "--jwt-secret",
                SECRET,
                "--port",
                "9000",
                "--admin-email",
                "admin@studio.test",
                "--admin-password",
                "admin-pass",
            ]);
            let args = match action {
                Ok(Action::Server(args)) => args,
                Err(err) => panic!("expected server action, got {err:?}"),
            };
            assert_eq!(args.port, 9000);
            assert_eq!(args.dsn, None);
            assert_eq!(args.jwt_secret.expose_secret(), SECRET);
            assert_eq!(args.access_ttl_seconds, 900);
            assert_eq!(
                args.admin.as_ref().map(|a| a.email.as_str()),
                Some("admin@studio.test")
            );
        });
    }

    #[test]
    fn rejects_short_secret() {
        clean_env(|| {
            let result = dispatch(&["--jwt-secret", "too-short"]);
            assert!(result.is_err());
        });
    }

    #[test]
    fn rejects_refresh_ttl_not_longer_than_access_ttl() {
        clean_env(|| {
            let result = dispatch(&[
                "--jwt-secret",
                SECRET,
                "--access-ttl",
                "600",
                "--refresh-ttl",
                "600",
            ]);
            assert!(result.is_err());
        });
    }
}
