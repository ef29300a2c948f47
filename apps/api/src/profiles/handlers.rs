use axum::{extract::State, http::HeaderMap, Json};
use chrono::Utc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::auth::cookies;
use crate::auth::provider::AuthError;
use crate::models::auth::AuthUser;
use crate::models::profile::{ProfileResponse, ProfileRow};
use crate::profiles::StoreError;
use crate::state::AppState;

/// Resolves the caller from the bearer header or session cookie.
/// Missing, expired or unverifiable tokens all read as anonymous.
pub async fn authenticated_user(state: &AppState, headers: &HeaderMap) -> Option<AuthUser> {
    let token = cookies::access_token(headers)?;
    match state.auth.current_user(&token).await {
        Ok(user) => Some(user),
        Err(AuthError::InvalidSession) => {
            debug!("Session token rejected; treating caller as anonymous");
            None
        }
        Err(e) => {
            warn!("Could not verify session: {e}");
            None
        }
    }
}

/// Profile for `user_id`, served from the session cache when present.
pub async fn load_profile(
    state: &AppState,
    user_id: Uuid,
) -> Result<Option<ProfileRow>, StoreError> {
    if let Some(cached) = state.sessions.get(user_id) {
        return Ok(Some(cached));
    }
    let row = state.profiles.find(user_id).await?;
    if let Some(row) = &row {
        state.sessions.put(row.clone());
    }
    Ok(row)
}

/// GET /api/profile
///
/// Never fails: anything short of a verified user with a profile row
/// answers `{ "is_pro": false }`.
pub async fn handle_get_profile(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Json<ProfileResponse> {
    let Some(user) = authenticated_user(&state, &headers).await else {
        return Json(ProfileResponse::anonymous());
    };

    match load_profile(&state, user.id).await {
        Ok(Some(row)) => Json(ProfileResponse::from_row(
            &row,
            user.email.as_deref(),
            Utc::now(),
        )),
        Ok(None) => {
            debug!("No profile row yet for {}", user.id);
            Json(ProfileResponse::anonymous())
        }
        Err(e) => {
            warn!("Profile lookup for {} failed: {e}", user.id);
            Json(ProfileResponse::anonymous())
        }
    }
}
