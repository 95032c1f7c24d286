use utoipa::{
    openapi::{
        security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
        Contact,
    },
    Modify, OpenApi,
};

use super::{
    handlers::{admin, auth, health},
    types,
};
use crate::auth::{IdentitySummary, Role};

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        auth::register::register,
        auth::login::login,
        auth::session::refresh,
        auth::session::logout,
        auth::me::me,
        auth::me::update_me,
        auth::password::change_password,
        admin::list_identities,
    ),
    components(schemas(
        health::Health,
        Role,
        IdentitySummary,
        types::LoginRequest,
        types::RegisterRequest,
        types::RefreshRequest,
        types::ProfileUpdateRequest,
        types::ChangePasswordRequest,
        types::SessionResponse,
        types::IdentityResponse,
        types::IdentityListResponse,
        types::ErrorResponse,
    )),
    modifiers(&BearerAuth, &CargoInfo),
    tags(
        (name = "auth", description = "Login, registration and session refresh"),
        (name = "admin", description = "Admin-only management"),
        (name = "health", description = "Service health"),
    )
)]
pub struct ApiDoc;

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

/// Use Cargo.toml metadata instead of the derive defaults.
struct CargoInfo;

impl Modify for CargoInfo {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        openapi.info.title = env!("CARGO_PKG_NAME").to_string();
        openapi.info.version = env!("CARGO_PKG_VERSION").to_string();
        openapi.info.description = optional_str(env!("CARGO_PKG_DESCRIPTION"));
        openapi.info.contact = cargo_contact();
    }
}

fn cargo_contact() -> Option<Contact> {
    // Cargo authors are `:` separated and may include "Name <email>".
    let primary = env!("CARGO_PKG_AUTHORS").split(':').next().map(str::trim)?;
    if primary.is_empty() {
        return None;
    }
    let (name, email) = match primary.split_once('<') {
        Some((name, rest)) => (name.trim(), rest.trim_end_matches('>').trim()),
        None => (primary, ""),
    };
    let mut contact = Contact::new();
    contact.name = optional_str(name);
    contact.email = optional_str(email);
    Some(contact)
}

fn optional_str(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn documents_every_route() {
        let doc = ApiDoc::openapi();
        let paths: Vec<&str> = doc.paths.paths.keys().map(String::as_str).collect();
        for path in [
            "/health",
            "/v1/auth/register",
            "/v1/auth/login",
            "/v1/auth/refresh",
            "/v1/auth/logout",
            "/v1/auth/me",
            "/v1/auth/change-password",
            "/v1/admin/identities",
        ] {
            assert!(paths.contains(&path), "missing {path}");
        }
        assert_eq!(doc.info.title, "pqrix");
    }

    #[test]
    fn me_supports_get_and_patch() {
        let doc = ApiDoc::openapi();
        let item = doc.paths.paths.get("/v1/auth/me");
        assert!(item.is_some_and(|item| item.get.is_some() && item.patch.is_some()));
    }

    #[test]
    fn bearer_scheme_is_registered() {
        let doc = ApiDoc::openapi();
        let schemes = doc.components.map(|c| c.security_schemes).unwrap_or_default();
        assert!(schemes.contains_key("bearer"));
    }

    #[test]
    fn contact_comes_from_cargo_authors() {
        let contact = cargo_contact();
        assert_eq!(
            contact.and_then(|c| c.email).as_deref(),
            Some("team@pqrix.studio")
        );
    }
}
