use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// One row of the `profiles` table.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ProfileRow {
    pub id: Uuid,
    pub email: Option<String>,
    pub is_pro: bool,
    pub pro_expires_at: Option<DateTime<Utc>>,
    pub referral_code: Option<String>,
    pub referred_by: Option<String>,
    pub is_early_adopter: bool,
    pub subscription_id: Option<String>,
    pub customer_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProfileRow {
    /// A fresh row with no subscription or promotional state.
    pub fn basic(id: Uuid, email: &str, referral_code: &str, now: DateTime<Utc>) -> Self {
        Self {
            id,
            email: Some(email.to_string()),
            is_pro: false,
            pro_expires_at: None,
            referral_code: Some(referral_code.to_string()),
            referred_by: None,
            is_early_adopter: false,
            subscription_id: None,
            customer_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_effective_pro(&self, now: DateTime<Utc>) -> bool {
        effective_pro(self.is_pro, self.pro_expires_at, now)
    }
}

/// Pro if subscribed, or if a promotional window is still open.
pub fn effective_pro(
    is_pro: bool,
    pro_expires_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> bool {
    is_pro || pro_expires_at.is_some_and(|expires| expires > now)
}

/// Body of `GET /api/profile`. Anonymous callers only see `is_pro: false`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProfileResponse {
    pub is_pro: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub referral_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pro_expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_early_adopter: bool,
}

impl ProfileResponse {
    pub fn anonymous() -> Self {
        Self {
            is_pro: false,
            user_id: None,
            email: None,
            referral_code: None,
            pro_expires_at: None,
            is_early_adopter: false,
        }
    }

    pub fn from_row(row: &ProfileRow, auth_email: Option<&str>, now: DateTime<Utc>) -> Self {
        Self {
            is_pro: row.is_effective_pro(now),
            user_id: Some(row.id),
            email: auth_email.map(str::to_string).or_else(|| row.email.clone()),
            referral_code: row.referral_code.clone(),
            pro_expires_at: row.pro_expires_at,
            is_early_adopter: row.is_early_adopter,
        }
    }
}
