//! Reward Evaluator: one-time early adopter grant after authentication.
//!
//! Order per invocation: profile lookup → profile count → signup rank →
//! conditional grant → email. The grant is a single conditional write in the
//! store; the earlier lookup only short-circuits the common already-rewarded case.

use std::sync::Arc;

use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::auth::provider::{AuthError, AuthProvider};
use crate::auth::session::SessionCache;
use crate::config::Config;
use crate::models::profile::ProfileRow;
use crate::notify::templates::early_adopter_email;
use crate::notify::Mailer;
use crate::profiles::referral_code::referral_link;
use crate::profiles::{EarlyAdopterGrant, ProfileStore, StoreError};
use crate::rewards::eligibility::{
    check_profile_count, check_rank, signup_rank, Eligibility, LimitReason,
};

#[derive(Debug, Clone)]
pub struct RewardSettings {
    pub limit: usize,
    pub days: i32,
    pub site_url: String,
    pub email_from: String,
}

impl RewardSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            limit: config.early_adopter_limit,
            days: config.early_adopter_days,
            site_url: config.site_url.clone(),
            email_from: config.email_from.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RewardOutcome {
    /// No email to key the grant on.
    Skipped,
    AlreadyRewarded,
    Ineligible(LimitReason),
    /// Over the limit with no profile row: a bare row was created.
    RepairedProfile { referral_code: String },
    Granted { referral_code: String, notified: bool },
}

impl RewardOutcome {
    pub fn wrote_profile(&self) -> bool {
        matches!(
            self,
            RewardOutcome::RepairedProfile { .. } | RewardOutcome::Granted { .. }
        )
    }
}

#[derive(Debug, Error)]
pub enum RewardError {
    #[error("profile lookup failed: {0}")]
    ProfileLookup(#[source] StoreError),

    #[error("listing auth users failed: {0}")]
    Ranking(#[source] AuthError),

    #[error("referral code generation failed: {0}")]
    ReferralCode(#[source] StoreError),

    #[error("profile repair failed: {0}")]
    Repair(#[source] StoreError),

    #[error("grant failed: {0}")]
    Grant(#[source] StoreError),
}

pub struct RewardEvaluator {
    pub(crate) profiles: Arc<dyn ProfileStore>,
    pub(crate) auth: Arc<dyn AuthProvider>,
    mailer: Option<Arc<dyn Mailer>>,
    settings: RewardSettings,
}

impl RewardEvaluator {
    pub fn new(
        profiles: Arc<dyn ProfileStore>,
        auth: Arc<dyn AuthProvider>,
        mailer: Option<Arc<dyn Mailer>>,
        settings: RewardSettings,
    ) -> Self {
        Self {
            profiles,
            auth,
            mailer,
            settings,
        }
    }

    pub fn settings(&self) -> &RewardSettings {
        &self.settings
    }

    /// Evaluates with the configured limit.
    pub async fn evaluate(&self, user_id: Uuid, email: &str) -> Result<RewardOutcome, RewardError> {
        self.evaluate_with_limit(user_id, email, self.settings.limit)
            .await
    }

    pub async fn evaluate_with_limit(
        &self,
        user_id: Uuid,
        email: &str,
        limit: usize,
    ) -> Result<RewardOutcome, RewardError> {
        self.run(user_id, email, limit, None).await
    }

    /// Same as `evaluate_with_limit`, with the signup rank already known from
    /// a listing the caller made. Skips the per-user auth listing.
    pub async fn evaluate_ranked(
        &self,
        user_id: Uuid,
        email: &str,
        rank: Option<usize>,
        limit: usize,
    ) -> Result<RewardOutcome, RewardError> {
        self.run(user_id, email, limit, Some(rank)).await
    }

    async fn run(
        &self,
        user_id: Uuid,
        email: &str,
        limit: usize,
        known_rank: Option<Option<usize>>,
    ) -> Result<RewardOutcome, RewardError> {
        if email.trim().is_empty() {
            debug!("No email for user {user_id}; skipping reward evaluation");
            return Ok(RewardOutcome::Skipped);
        }

        let profile = self.profiles.find(user_id).await.map_err(|e| {
            error!("Error fetching profile for {email}: {e}");
            RewardError::ProfileLookup(e)
        })?;

        if profile.as_ref().is_some_and(|p| p.is_early_adopter) {
            info!("User {email} already received the early adopter reward. Skipping.");
            return Ok(RewardOutcome::AlreadyRewarded);
        }

        match self.eligibility(user_id, limit, known_rank).await? {
            Eligibility::OverLimit(reason) => {
                info!("User {email} is not eligible ({reason:?}, limit {limit})");
                match profile {
                    None => self.repair_profile(user_id, email).await,
                    Some(_) => Ok(RewardOutcome::Ineligible(reason)),
                }
            }
            Eligibility::Eligible { rank } => {
                info!("User {email} is signup #{} of the first {limit}. Granting reward...", rank + 1);
                self.grant(user_id, email, profile.as_ref()).await
            }
        }
    }

    async fn eligibility(
        &self,
        user_id: Uuid,
        limit: usize,
        known_rank: Option<Option<usize>>,
    ) -> Result<Eligibility, RewardError> {
        let count = match self.profiles.count().await {
            Ok(count) => Some(count),
            Err(e) => {
                warn!("Profile count failed, treating as over limit: {e}");
                None
            }
        };
        if let Err(reason) = check_profile_count(count, limit) {
            return Ok(Eligibility::OverLimit(reason));
        }

        if let Some(rank) = known_rank {
            return Ok(check_rank(rank, limit));
        }
        let users = self.auth.list_users().await.map_err(|e| {
            error!("Error listing auth users: {e}");
            RewardError::Ranking(e)
        })?;
        Ok(check_rank(signup_rank(&users, user_id), limit))
    }

    /// Backfills a profile the signup trigger failed to create. Not a reward.
    async fn repair_profile(&self, user_id: Uuid, email: &str) -> Result<RewardOutcome, RewardError> {
        warn!("Profile missing for {email}; creating a basic profile");

        let code = self
            .profiles
            .generate_referral_code()
            .await
            .map_err(RewardError::ReferralCode)?;

        let inserted = self
            .profiles
            .insert_basic(user_id, email, &code)
            .await
            .map_err(|e| {
                error!("Failed to create basic profile for {email}: {e}");
                RewardError::Repair(e)
            })?;

        if inserted {
            info!("Basic profile created for {email} (no early adopter reward)");
            Ok(RewardOutcome::RepairedProfile {
                referral_code: code,
            })
        } else {
            debug!("Profile for {email} appeared concurrently; nothing to repair");
            Ok(RewardOutcome::Ineligible(LimitReason::SignupRank(None)))
        }
    }

    async fn grant(
        &self,
        user_id: Uuid,
        email: &str,
        profile: Option<&ProfileRow>,
    ) -> Result<RewardOutcome, RewardError> {
        let code = match profile.and_then(|p| p.referral_code.clone()) {
            Some(code) => code,
            None => self
                .profiles
                .generate_referral_code()
                .await
                .map_err(RewardError::ReferralCode)?,
        };

        let grant = EarlyAdopterGrant {
            user_id,
            email: email.to_string(),
            referral_code: code.clone(),
            days: self.settings.days,
        };

        let granted = self.profiles.grant_early_adopter(&grant).await.map_err(|e| {
            error!("Failed to grant pro to {email}: {e}");
            RewardError::Grant(e)
        })?;

        let Some(row) = granted else {
            info!("Early adopter reward for {email} was granted concurrently. Skipping.");
            return Ok(RewardOutcome::AlreadyRewarded);
        };

        let referral_code = row.referral_code.unwrap_or(code);
        let notified = self.notify(email, &referral_code).await;

        Ok(RewardOutcome::Granted {
            referral_code,
            notified,
        })
    }

    /// Best effort: failures are logged, the grant stands.
    async fn notify(&self, email: &str, referral_code: &str) -> bool {
        let Some(mailer) = &self.mailer else {
            error!("Missing RESEND_API_KEY. Cannot send reward email to {email}.");
            return false;
        };

        let message = early_adopter_email(
            &self.settings.email_from,
            email,
            &referral_link(&self.settings.site_url, referral_code),
            &self.settings.site_url,
            self.settings.days,
        );

        match mailer.send(&message).await {
            Ok(()) => {
                info!("Sent reward email to {email}");
                true
            }
            Err(e) => {
                error!("Failed to send reward email to {email}: {e}");
                false
            }
        }
    }
}

/// Runs the evaluator on a detached task. The outcome is logged and the
/// cached profile dropped if anything was written; nobody joins the handle.
pub fn spawn_reward_evaluation(
    evaluator: Arc<RewardEvaluator>,
    sessions: Arc<SessionCache>,
    user_id: Uuid,
    email: String,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        match evaluator.evaluate(user_id, &email).await {
            Ok(outcome) => {
                if outcome.wrote_profile() {
                    sessions.invalidate(user_id);
                }
                debug!("Reward evaluation for {email}: {outcome:?}");
            }
            Err(e) => error!("Reward evaluation for {email} failed: {e}"),
        }
    })
}
