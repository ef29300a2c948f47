//! Lemon Squeezy subscription events.

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

use crate::profiles::SubscriptionUpdate;

#[derive(Debug, Deserialize)]
pub struct WebhookEvent {
    pub meta: EventMeta,
    #[serde(default)]
    pub data: Option<EventData>,
}

#[derive(Debug, Deserialize)]
pub struct EventMeta {
    pub event_name: String,
    #[serde(default)]
    pub custom_data: Option<CustomData>,
}

#[derive(Debug, Deserialize)]
pub struct CustomData {
    #[serde(default)]
    pub user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct EventData {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub attributes: Option<Attributes>,
}

#[derive(Debug, Deserialize)]
pub struct Attributes {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub customer_id: Option<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SubscriptionEvent {
    Upsert {
        user_id: Uuid,
        update: SubscriptionUpdate,
    },
    /// Cancellation or expiry. Without a usable user id there is nothing to
    /// revoke; the event is still acknowledged so it is not redelivered.
    Revoke { user_id: Option<Uuid> },
    Ignored { event_name: String },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WebhookError {
    #[error("Missing user_id")]
    MissingUserId,

    #[error("Invalid user_id: {0}")]
    InvalidUserId(String),
}

/// Statuses that keep a subscriber on Pro.
pub fn is_active_status(status: Option<&str>) -> bool {
    matches!(status, Some("active") | Some("on_trial"))
}

impl WebhookEvent {
    fn user_id(&self) -> Result<Option<Uuid>, WebhookError> {
        match self
            .meta
            .custom_data
            .as_ref()
            .and_then(|c| c.user_id.as_deref())
            .filter(|id| !id.is_empty())
        {
            None => Ok(None),
            Some(raw) => Uuid::parse_str(raw)
                .map(Some)
                .map_err(|_| WebhookError::InvalidUserId(raw.to_string())),
        }
    }

    pub fn classify(&self) -> Result<SubscriptionEvent, WebhookError> {
        match self.meta.event_name.as_str() {
            "subscription_created" | "subscription_updated" => {
                let user_id = self.user_id()?.ok_or(WebhookError::MissingUserId)?;
                let attributes = self.data.as_ref().and_then(|d| d.attributes.as_ref());
                Ok(SubscriptionEvent::Upsert {
                    user_id,
                    update: SubscriptionUpdate {
                        is_pro: is_active_status(attributes.and_then(|a| a.status.as_deref())),
                        subscription_id: self
                            .data
                            .as_ref()
                            .and_then(|d| d.id.as_ref())
                            .and_then(scalar_to_string),
                        customer_id: attributes
                            .and_then(|a| a.customer_id.as_ref())
                            .and_then(scalar_to_string),
                    },
                })
            }
            "subscription_cancelled" | "subscription_expired" => {
                let user_id = self.user_id().unwrap_or_else(|e| {
                    warn!("{e} on {}; nothing to revoke", self.meta.event_name);
                    None
                });
                Ok(SubscriptionEvent::Revoke { user_id })
            }
            other => Ok(SubscriptionEvent::Ignored {
                event_name: other.to_string(),
            }),
        }
    }
}

/// Lemon Squeezy sends ids as strings and customer ids as numbers.
fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
