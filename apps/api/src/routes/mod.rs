pub mod health;

use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
    Router,
};

use crate::auth::{handlers as auth, middleware::capture_referral};
use crate::billing::handlers as billing;
use crate::profiles::handlers as profiles;
use crate::state::AppState;
use crate::upload::handlers as upload;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Session
        .route("/auth/login", post(auth::handle_login))
        .route("/auth/callback", get(auth::handle_callback))
        .route("/auth/signout", post(auth::handle_signout))
        // Profile and processing
        .route("/api/profile", get(profiles::handle_get_profile))
        .route(
            "/api/uploads",
            post(upload::handle_upload).layer(DefaultBodyLimit::max(upload::UPLOAD_BODY_LIMIT)),
        )
        .route("/api/remaining", get(upload::handle_remaining))
        // Billing
        .route(
            "/api/webhooks/lemonsqueezy",
            post(billing::handle_lemonsqueezy),
        )
        .layer(middleware::from_fn(capture_referral))
        .with_state(state)
}
