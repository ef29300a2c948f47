//! Cookie helpers for the session, PKCE verifier and referral capture.

use axum::http::{header, HeaderMap, HeaderValue};

pub const ACCESS_TOKEN: &str = "sb-access-token";
pub const REFRESH_TOKEN: &str = "sb-refresh-token";
pub const CODE_VERIFIER: &str = "sb-code-verifier";
pub const REFERRAL_CODE: &str = "referral_code";

pub const REFERRAL_MAX_AGE_SECS: i64 = 60 * 60 * 24 * 30;
pub const VERIFIER_MAX_AGE_SECS: i64 = 60 * 60;
pub const SESSION_MAX_AGE_SECS: i64 = 60 * 60 * 24 * 7;

/// Reads a cookie value from the request headers.
pub fn read(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.to_string())
        .filter(|value| !value.is_empty())
}

/// Builds a `Set-Cookie` value scoped to the whole site.
pub fn build(name: &str, value: &str, max_age_secs: i64, http_only: bool) -> String {
    let mut cookie = format!("{name}={value}; Path=/; Max-Age={max_age_secs}; SameSite=Lax");
    if http_only {
        cookie.push_str("; HttpOnly");
    }
    cookie
}

pub fn clear(name: &str) -> String {
    format!("{name}=; Path=/; Max-Age=0; SameSite=Lax")
}

pub fn to_header(cookie: &str) -> Option<HeaderValue> {
    HeaderValue::from_str(cookie).ok()
}

/// Access token from `Authorization: Bearer` or the session cookie.
pub fn access_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .or_else(|| read(headers, ACCESS_TOKEN))
}
