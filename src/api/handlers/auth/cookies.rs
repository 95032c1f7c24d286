//! Session cookies and token extraction.
//!
//! The access cookie is sent to every path; the refresh cookie only to the auth
//! endpoints that consume it. Both are `HttpOnly` and `SameSite=Lax`.

use axum::http::{
    header::{AUTHORIZATION, COOKIE, SET_COOKIE},
    HeaderMap, HeaderValue,
};

use super::state::AuthConfig;
use crate::auth::IssuedTokens;

pub const ACCESS_COOKIE_NAME: &str = "pqrix_access";
pub const REFRESH_COOKIE_NAME: &str = "pqrix_refresh";
const ACCESS_COOKIE_PATH: &str = "/";
const REFRESH_COOKIE_PATH: &str = "/v1/auth";

fn cookie(config: &AuthConfig, name: &str, value: &str, path: &str, max_age: i64) -> Option<HeaderValue> {
    let mut cookie = format!("{name}={value}; Path={path}; HttpOnly; SameSite=Lax; Max-Age={max_age}");
    if config.session_cookie_secure() {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie).ok()
}

/// `Set-Cookie` headers for a freshly issued token pair.
#[must_use]
pub fn session_cookies(config: &AuthConfig, tokens: &IssuedTokens) -> HeaderMap {
    let mut headers = HeaderMap::new();
    let cookies = [
        cookie(
            config,
            ACCESS_COOKIE_NAME,
            &tokens.access_token,
            ACCESS_COOKIE_PATH,
            tokens.expires_in(),
        ),
        cookie(
            config,
            REFRESH_COOKIE_NAME,
            &tokens.refresh_token,
            REFRESH_COOKIE_PATH,
            tokens.refresh_expires_in(),
        ),
    ];
    for value in cookies.into_iter().flatten() {
        headers.append(SET_COOKIE, value);
    }
    headers
}

/// `Set-Cookie` headers that expire both session cookies.
#[must_use]
pub fn clear_session_cookies(config: &AuthConfig) -> HeaderMap {
    let mut headers = HeaderMap::new();
    let cookies = [
        cookie(config, ACCESS_COOKIE_NAME, "", ACCESS_COOKIE_PATH, 0),
        cookie(config, REFRESH_COOKIE_NAME, "", REFRESH_COOKIE_PATH, 0),
    ];
    for value in cookies.into_iter().flatten() {
        headers.append(SET_COOKIE, value);
    }
    headers
}

#[must_use]
pub fn extract_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| {
            let (key, val) = pair.trim().split_once('=')?;
            (key.trim() == name).then(|| val.trim().to_string())
        })
        .find(|val| !val.is_empty())
}

#[must_use]
pub fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let trimmed = value.trim();
    let token = trimmed
        .strip_prefix("Bearer ")
        .or_else(|| trimmed.strip_prefix("bearer "))?
        .trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

/// The access token of a request: the bearer header wins over the cookie.
#[must_use]
pub fn extract_access_token(headers: &HeaderMap) -> Option<String> {
    extract_bearer_token(headers).or_else(|| extract_cookie(headers, ACCESS_COOKIE_NAME))
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn tokens() -> IssuedTokens {
        IssuedTokens {
            access_token: "acc".to_string(),
            access_expires_at: 1_900,
            refresh_token: "ref".to_string(),
            refresh_expires_at: 4_600,
            session_id: Uuid::nil(),
            issued_at: 1_000,
        }
    }

    fn set_cookies(headers: &HeaderMap) -> Vec<String> {
        headers
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok().map(ToString::to_string))
            .collect()
    }

    #[test]
    fn session_cookies_carry_ttls_and_paths() {
        let cookies = set_cookies(&session_cookies(&AuthConfig::default(), &tokens()));
        assert_eq!(
            cookies,
            vec![
                "pqrix_access=acc; Path=/; HttpOnly; SameSite=Lax; Max-Age=900".to_string(),
                "pqrix_refresh=ref; Path=/v1/auth; HttpOnly; SameSite=Lax; Max-Age=3600"
                    .to_string(),
            ]
        );
    }

    #[test]
    fn https_frontend_marks_cookies_secure() {
        let config = AuthConfig::new("https://studio.test".to_string());
        let cookies = set_cookies(&clear_session_cookies(&config));
        assert_eq!(cookies.len(), 2);
        assert!(cookies.iter().all(|c| c.ends_with("; Secure")));
        assert!(cookies.iter().all(|c| c.contains("Max-Age=0")));
    }

    #[test]
    fn bearer_header_wins_over_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("theme=dark; pqrix_access=from-cookie"));
        assert_eq!(extract_access_token(&headers).as_deref(), Some("from-cookie"));

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer from-header"));
        assert_eq!(extract_access_token(&headers).as_deref(), Some("from-header"));
    }

    #[test]
    fn empty_values_are_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer   "));
        headers.insert(COOKIE, HeaderValue::from_static("pqrix_refresh="));
        assert_eq!(extract_bearer_token(&headers), None);
        assert_eq!(extract_cookie(&headers, REFRESH_COOKIE_NAME), None);
        assert_eq!(extract_access_token(&headers), None);
    }
}
