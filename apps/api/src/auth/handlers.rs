use axum::{
    extract::{Query, State},
    http::{header, HeaderMap},
    response::{AppendHeaders, IntoResponse, Redirect, Response},
    Json,
};
use reqwest::Url;
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info, warn};

use crate::auth::cookies;
use crate::auth::pkce::PkcePair;
use crate::errors::AppError;
use crate::referrals::ClaimOutcome;
use crate::rewards::spawn_reward_evaluation;
use crate::state::AppState;

pub const AUTH_ERROR_PATH: &str = "/auth/auth-code-error";

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    #[serde(default)]
    pub next: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub next: Option<String>,
}

/// Only same-site paths are followed after login.
pub fn safe_next(next: Option<&str>) -> String {
    match next {
        Some(path) if path.starts_with('/') && !path.starts_with("//") && !path.contains('\\') => {
            path.to_string()
        }
        _ => "/".to_string(),
    }
}

/// POST /auth/login
///
/// Sends a magic link and stores the PKCE verifier the callback will need.
pub async fn handle_login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> Result<Response, AppError> {
    let email = body.email.trim();
    if email.is_empty() || !email.contains('@') {
        return Err(AppError::Validation("A valid email is required".to_string()));
    }

    let next = safe_next(body.next.as_deref());
    let redirect_to = Url::parse_with_params(
        &format!("{}/auth/callback", state.config.site_url),
        &[("next", next.as_str())],
    )
    .map_err(|e| AppError::Config(format!("SITE_URL is not a valid URL: {e}")))?;

    let pkce = PkcePair::generate();
    state
        .auth
        .send_magic_link(email, redirect_to.as_str(), &pkce.challenge)
        .await?;
    info!("Magic link sent to {email}");

    let verifier = cookies::build(
        cookies::CODE_VERIFIER,
        &pkce.verifier,
        cookies::VERIFIER_MAX_AGE_SECS,
        true,
    );
    Ok((
        AppendHeaders([(header::SET_COOKIE, verifier)]),
        Json(json!({ "sent": true })),
    )
        .into_response())
}

/// GET /auth/callback
///
/// Exchanges the one-time code for a session. A pending referral is claimed
/// before the redirect; reward evaluation runs detached.
pub async fn handle_callback(
    State(state): State<AppState>,
    Query(params): Query<CallbackParams>,
    headers: HeaderMap,
) -> Response {
    let site = state.config.site_url.as_str();
    let next = safe_next(params.next.as_deref());
    let error_redirect = || Redirect::to(&format!("{site}{AUTH_ERROR_PATH}")).into_response();

    let Some(code) = params.code.filter(|c| !c.is_empty()) else {
        warn!("Auth callback without code");
        return error_redirect();
    };
    let Some(verifier) = cookies::read(&headers, cookies::CODE_VERIFIER) else {
        warn!("Auth callback without code verifier cookie");
        return error_redirect();
    };

    let session = match state.auth.exchange_code(&code, &verifier).await {
        Ok(session) => session,
        Err(e) => {
            error!("Code exchange failed: {e}");
            return error_redirect();
        }
    };
    let user = &session.user;
    info!("User {} signed in", user.id);

    let referral = cookies::read(&headers, cookies::REFERRAL_CODE);
    match (&referral, user.email.as_deref()) {
        (Some(code), Some(email)) => {
            if let ClaimOutcome::Credited { inviter_id } = state.referrals.claim(code, email).await {
                state.sessions.invalidate(inviter_id);
            }
        }
        (Some(_), None) => warn!("Referral cookie present but user {} has no email", user.id),
        _ => {}
    }

    state.sessions.invalidate(user.id);
    if let Some(email) = user.email.clone().filter(|e| !e.is_empty()) {
        spawn_reward_evaluation(
            state.rewards.clone(),
            state.sessions.clone(),
            user.id,
            email,
        );
    }

    let max_age = session
        .expires_in
        .filter(|secs| *secs > 0)
        .unwrap_or(cookies::SESSION_MAX_AGE_SECS);
    let mut set_cookies = vec![
        cookies::build(cookies::ACCESS_TOKEN, &session.access_token, max_age, true),
        cookies::build(
            cookies::REFRESH_TOKEN,
            &session.refresh_token,
            cookies::SESSION_MAX_AGE_SECS,
            true,
        ),
        cookies::clear(cookies::CODE_VERIFIER),
    ];
    if referral.is_some() {
        set_cookies.push(cookies::clear(cookies::REFERRAL_CODE));
    }

    let mut response = Redirect::to(&format!("{site}{next}")).into_response();
    for cookie in set_cookies {
        if let Some(value) = cookies::to_header(&cookie) {
            response.headers_mut().append(header::SET_COOKIE, value);
        }
    }
    response
}

/// POST /auth/signout
pub async fn handle_signout(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Some(token) = cookies::access_token(&headers) {
        if let Ok(user) = state.auth.current_user(&token).await {
            state.sessions.invalidate(user.id);
        }
        if let Err(e) = state.auth.sign_out(&token).await {
            warn!("Sign-out at the auth provider failed: {e}");
        }
    }

    let mut response = Redirect::to(&format!("{}/", state.config.site_url)).into_response();
    for name in [cookies::ACCESS_TOKEN, cookies::REFRESH_TOKEN] {
        if let Some(value) = cookies::to_header(&cookies::clear(name)) {
            response.headers_mut().append(header::SET_COOKIE, value);
        }
    }
    response
}
