use axum::{body::Bytes, extract::State, http::HeaderMap, Json};
use serde_json::{json, Value};
use tracing::{error, info, warn};

use crate::billing::signature;
use crate::billing::webhook::{SubscriptionEvent, WebhookEvent};
use crate::errors::AppError;
use crate::state::AppState;

const SIGNATURE_HEADER: &str = "x-signature";

/// POST /api/webhooks/lemonsqueezy
///
/// Verifies the HMAC over the raw body before parsing anything, then applies
/// the subscription state to the user's profile.
pub async fn handle_lemonsqueezy(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, AppError> {
    let secret = state
        .config
        .lemonsqueezy_webhook_secret
        .as_deref()
        .ok_or_else(|| AppError::Config("LEMONSQUEEZY_WEBHOOK_SECRET is not set".to_string()))?;

    let provided = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());
    signature::verify(secret.as_bytes(), &body, provided)?;

    let event: WebhookEvent = serde_json::from_slice(&body)
        .map_err(|e| AppError::Validation(format!("Malformed webhook payload: {e}")))?;
    info!("Webhook received: {}", event.meta.event_name);

    match event
        .classify()
        .map_err(|e| AppError::Validation(e.to_string()))?
    {
        SubscriptionEvent::Upsert { user_id, update } => {
            let updated = state.profiles.apply_subscription(user_id, &update).await?;
            if updated == 0 {
                warn!("Webhook for user {user_id} matched no profile");
            }
            state.sessions.invalidate(user_id);
            info!("User {user_id} updated: is_pro={}", update.is_pro);
        }
        SubscriptionEvent::Revoke { user_id: Some(user_id) } => {
            if let Err(e) = state.profiles.clear_pro(user_id).await {
                error!("Failed to clear pro for {user_id}: {e}");
            }
            state.sessions.invalidate(user_id);
            info!("User {user_id} subscription cancelled");
        }
        SubscriptionEvent::Revoke { user_id: None } => {
            warn!("Cancellation event without user_id; nothing to revoke");
        }
        SubscriptionEvent::Ignored { event_name } => {
            info!("Ignoring webhook event {event_name}");
        }
    }

    Ok(Json(json!({ "received": true })))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use chrono::Utc;
    use serde_json::json;
    use tower::ServiceExt;
    use uuid::Uuid;

    use crate::billing::signature::sign;
    use crate::models::profile::ProfileRow;
    use crate::routes::build_router;
    use crate::test_support::{harness, test_config};

    const USER: u128 = 42;

    fn payload(event_name: &str, status: &str) -> Vec<u8> {
        serde_json::to_vec(&json!({
            "meta": {
                "event_name": event_name,
                "custom_data": { "user_id": Uuid::from_u128(USER).to_string() }
            },
            "data": { "id": "sub_1", "attributes": { "status": status, "customer_id": 77 } }
        }))
        .unwrap()
    }

    fn request(body: Vec<u8>, signature: Option<String>) -> Request<Body> {
        let mut builder = Request::post("/api/webhooks/lemonsqueezy")
            .header("content-type", "application/json");
        if let Some(sig) = signature {
            builder = builder.header("x-signature", sig);
        }
        builder.body(Body::from(body)).unwrap()
    }

    fn seeded() -> crate::test_support::TestHarness {
        let h = harness(test_config());
        h.profiles.seed(ProfileRow::basic(
            Uuid::from_u128(USER),
            "sub@example.com",
            "SUBS2345",
            Utc::now(),
        ));
        h
    }

    #[tokio::test]
    async fn test_valid_signature_activates_subscription() {
        let h = seeded();
        let body = payload("subscription_created", "active");
        let sig = sign(b"whsec_test", &body);

        let response = build_router(h.state.clone())
            .oneshot(request(body, Some(sig)))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(
            serde_json::from_slice::<serde_json::Value>(&bytes).unwrap(),
            json!({ "received": true })
        );
        let row = h.profiles.get(Uuid::from_u128(USER)).unwrap();
        assert!(row.is_pro);
        assert_eq!(row.subscription_id.as_deref(), Some("sub_1"));
        assert_eq!(row.customer_id.as_deref(), Some("77"));
    }

    #[tokio::test]
    async fn test_bad_signature_is_rejected_without_writes() {
        let h = seeded();
        let body = payload("subscription_created", "active");
        let sig = sign(b"wrong-secret", &body);

        let response = build_router(h.state.clone())
            .oneshot(request(body, Some(sig)))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(h.profiles.writes(), 0);
        assert!(!h.profiles.get(Uuid::from_u128(USER)).unwrap().is_pro);
    }

    #[tokio::test]
    async fn test_missing_signature_is_rejected() {
        let h = seeded();
        let response = build_router(h.state.clone())
            .oneshot(request(payload("subscription_created", "active"), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(h.profiles.writes(), 0);
    }

    #[tokio::test]
    async fn test_missing_secret_is_server_error() {
        let mut config = test_config();
        config.lemonsqueezy_webhook_secret = None;
        let h = harness(config);
        let body = payload("subscription_created", "active");
        let sig = sign(b"whsec_test", &body);

        let response = build_router(h.state)
            .oneshot(request(body, Some(sig)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_cancellation_clears_pro() {
        let h = seeded();
        let body = payload("subscription_created", "active");
        let sig = sign(b"whsec_test", &body);
        build_router(h.state.clone())
            .oneshot(request(body, Some(sig)))
            .await
            .unwrap();

        let body = payload("subscription_cancelled", "cancelled");
        let sig = sign(b"whsec_test", &body);
        let response = build_router(h.state.clone())
            .oneshot(request(body, Some(sig)))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(!h.profiles.get(Uuid::from_u128(USER)).unwrap().is_pro);
    }

    #[tokio::test]
    async fn test_store_failure_returns_500() {
        let h = seeded();
        h.profiles.fail_update.store(true, Ordering::SeqCst);
        let body = payload("subscription_updated", "active");
        let sig = sign(b"whsec_test", &body);

        let response = build_router(h.state.clone())
            .oneshot(request(body, Some(sig)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_cancellation_with_malformed_user_is_acknowledged() {
        let h = seeded();
        let body = serde_json::to_vec(&json!({
            "meta": {
                "event_name": "subscription_expired",
                "custom_data": { "user_id": "legacy-user-17" }
            },
            "data": { "id": "sub_1", "attributes": { "status": "expired" } }
        }))
        .unwrap();
        let sig = sign(b"whsec_test", &body);

        let response = build_router(h.state.clone())
            .oneshot(request(body, Some(sig)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(h.profiles.writes(), 0);
    }

    #[tokio::test]
    async fn test_upsert_without_user_id_is_bad_request() {
        let h = seeded();
        let body = serde_json::to_vec(&json!({
            "meta": { "event_name": "subscription_created" },
            "data": { "id": "sub_1", "attributes": { "status": "active" } }
        }))
        .unwrap();
        let sig = sign(b"whsec_test", &body);

        let response = build_router(h.state.clone())
            .oneshot(request(body, Some(sig)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
