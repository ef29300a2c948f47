//! Profile store: the `profiles` table behind a trait seam.
//!
//! `PgProfileStore` is the production backend. Handlers, the reward evaluator
//! and the referral claimer only see `Arc<dyn ProfileStore>`.

use async_trait::async_trait;
use sqlx::PgPool;
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::profile::ProfileRow;
use crate::profiles::referral_code;

const MAX_CODE_ATTEMPTS: usize = 5;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("could not generate a unique referral code after {0} attempts")]
    ReferralCodeExhausted(usize),

    #[error("profile store unavailable: {0}")]
    Unavailable(String),
}

/// Parameters of the one-time early adopter grant.
#[derive(Debug, Clone)]
pub struct EarlyAdopterGrant {
    pub user_id: Uuid,
    pub email: String,
    /// Used only when the row does not exist yet or has no code.
    pub referral_code: String,
    pub days: i32,
}

/// Fields written by the payment webhook.
#[derive(Debug, Clone, PartialEq)]
pub struct SubscriptionUpdate {
    pub is_pro: bool,
    pub subscription_id: Option<String>,
    pub customer_id: Option<String>,
}

#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// `Ok(None)` means the row does not exist, which is a valid state.
    async fn find(&self, user_id: Uuid) -> Result<Option<ProfileRow>, StoreError>;

    async fn count(&self) -> Result<i64, StoreError>;

    /// Returns a code no existing profile uses.
    async fn generate_referral_code(&self) -> Result<String, StoreError>;

    /// Inserts a row without any reward. Returns false if the row already existed.
    async fn insert_basic(
        &self,
        user_id: Uuid,
        email: &str,
        referral_code: &str,
    ) -> Result<bool, StoreError>;

    /// Atomically flips `is_early_adopter` and extends `pro_expires_at`, only
    /// where the flag is still false. Creates the row when missing.
    /// `Ok(None)` means the user had already been rewarded.
    async fn grant_early_adopter(
        &self,
        grant: &EarlyAdopterGrant,
    ) -> Result<Option<ProfileRow>, StoreError>;

    /// Credits inviter and invitee in one procedure call.
    /// Returns the inviter's id when the referral was applied.
    async fn claim_referral(
        &self,
        code: &str,
        new_user_email: &str,
    ) -> Result<Option<Uuid>, StoreError>;

    /// Returns the number of rows updated.
    async fn apply_subscription(
        &self,
        user_id: Uuid,
        update: &SubscriptionUpdate,
    ) -> Result<u64, StoreError>;

    async fn clear_pro(&self, user_id: Uuid) -> Result<u64, StoreError>;

    /// Operator action: makes the user eligible for the early adopter reward again.
    async fn reset_early_adopter(&self, user_id: Uuid) -> Result<u64, StoreError>;
}

/// Postgres-backed profile store.
#[derive(Clone)]
pub struct PgProfileStore {
    pool: PgPool,
}

impl PgProfileStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProfileStore for PgProfileStore {
    async fn find(&self, user_id: Uuid) -> Result<Option<ProfileRow>, StoreError> {
        Ok(
            sqlx::query_as::<_, ProfileRow>("SELECT * FROM profiles WHERE id = $1")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    async fn count(&self) -> Result<i64, StoreError> {
        Ok(sqlx::query_scalar("SELECT COUNT(*) FROM profiles")
            .fetch_one(&self.pool)
            .await?)
    }

    async fn generate_referral_code(&self) -> Result<String, StoreError> {
        for _ in 0..MAX_CODE_ATTEMPTS {
            let candidate = referral_code::generate();
            let taken: bool =
                sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM profiles WHERE referral_code = $1)")
                    .bind(&candidate)
                    .fetch_one(&self.pool)
                    .await?;
            if !taken {
                return Ok(candidate);
            }
            debug!("Referral code collision on {candidate}, drawing again");
        }
        warn!("Referral code space looks crowded");
        Err(StoreError::ReferralCodeExhausted(MAX_CODE_ATTEMPTS))
    }

    async fn insert_basic(
        &self,
        user_id: Uuid,
        email: &str,
        referral_code: &str,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO profiles (id, email, referral_code)
            VALUES ($1, $2, $3)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(user_id)
        .bind(email)
        .bind(referral_code)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn grant_early_adopter(
        &self,
        grant: &EarlyAdopterGrant,
    ) -> Result<Option<ProfileRow>, StoreError> {
        // Single statement: the WHERE on the conflict arm is the idempotency guard.
        Ok(sqlx::query_as::<_, ProfileRow>(
            r#"
            INSERT INTO profiles (id, email, referral_code, is_early_adopter, pro_expires_at)
            VALUES ($1, $2, $3, TRUE, now() + make_interval(days => $4))
            ON CONFLICT (id) DO UPDATE
            SET is_early_adopter = TRUE,
                pro_expires_at = GREATEST(COALESCE(profiles.pro_expires_at, now()), now())
                                 + make_interval(days => $4),
                email = COALESCE(profiles.email, EXCLUDED.email),
                referral_code = COALESCE(profiles.referral_code, EXCLUDED.referral_code),
                updated_at = now()
            WHERE profiles.is_early_adopter = FALSE
            RETURNING *
            "#,
        )
        .bind(grant.user_id)
        .bind(&grant.email)
        .bind(&grant.referral_code)
        .bind(grant.days)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn claim_referral(
        &self,
        code: &str,
        new_user_email: &str,
    ) -> Result<Option<Uuid>, StoreError> {
        let inviter: Option<Uuid> = sqlx::query_scalar("SELECT claim_referral($1, $2)")
            .bind(code)
            .bind(new_user_email)
            .fetch_one(&self.pool)
            .await?;
        Ok(inviter)
    }

    async fn apply_subscription(
        &self,
        user_id: Uuid,
        update: &SubscriptionUpdate,
    ) -> Result<u64, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE profiles
            SET is_pro = $2, subscription_id = $3, customer_id = $4, updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .bind(update.is_pro)
        .bind(&update.subscription_id)
        .bind(&update.customer_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn clear_pro(&self, user_id: Uuid) -> Result<u64, StoreError> {
        let result =
            sqlx::query("UPDATE profiles SET is_pro = FALSE, updated_at = now() WHERE id = $1")
                .bind(user_id)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected())
    }

    async fn reset_early_adopter(&self, user_id: Uuid) -> Result<u64, StoreError> {
        let result = sqlx::query(
            "UPDATE profiles SET is_early_adopter = FALSE, updated_at = now() WHERE id = $1",
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
