use axum::{
    extract::{Query, Request},
    http::header,
    middleware::Next,
    response::Response,
};
use serde::Deserialize;
use tracing::debug;

use crate::auth::cookies;

const MAX_REFERRAL_LEN: usize = 64;

#[derive(Deserialize)]
struct RefParam {
    #[serde(rename = "ref")]
    referral: Option<String>,
}

/// Captures `?ref=CODE` on any request into the `referral_code` cookie.
pub async fn capture_referral(request: Request, next: Next) -> Response {
    let referral = Query::<RefParam>::try_from_uri(request.uri())
        .ok()
        .and_then(|Query(p)| p.referral)
        .filter(|code| cookie_safe(code));

    let mut response = next.run(request).await;

    if let Some(code) = referral {
        debug!("Captured referral code {code}");
        let cookie = cookies::build(
            cookies::REFERRAL_CODE,
            &code,
            cookies::REFERRAL_MAX_AGE_SECS,
            false,
        );
        if let Some(value) = cookies::to_header(&cookie) {
            response.headers_mut().append(header::SET_COOKIE, value);
        }
    }

    response
}

/// Codes go into a header verbatim, so only plain tokens are stored.
fn cookie_safe(code: &str) -> bool {
    !code.is_empty()
        && code.len() <= MAX_REFERRAL_LEN
        && code
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}
