//! Batch reconciliation for the first N signups.
//!
//! Used by `rewards-admin grant` to catch up users whose post-login
//! evaluation never ran or failed.

use tracing::{error, info};

use crate::auth::provider::AuthError;
use crate::rewards::eligibility::first_signups;
use crate::rewards::{RewardEvaluator, RewardOutcome};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BatchReport {
    pub considered: usize,
    pub granted: usize,
    pub already_rewarded: usize,
    pub repaired: usize,
    pub ineligible: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Runs the evaluator, one user at a time, over the oldest `limit` signups.
/// Users are listed once; each user's position in that listing is its rank.
pub async fn reward_first_signups(
    evaluator: &RewardEvaluator,
    limit: usize,
) -> Result<BatchReport, AuthError> {
    info!("Fetching first {limit} users...");
    let users = first_signups(evaluator.auth.list_users().await?, limit);
    info!("Found {} users. Processing...", users.len());

    let mut report = BatchReport::default();
    for (rank, user) in users.into_iter().enumerate() {
        report.considered += 1;
        let Some(email) = user.email.filter(|e| !e.trim().is_empty()) else {
            report.skipped += 1;
            continue;
        };

        info!("Checking user: {email}");
        match evaluator
            .evaluate_ranked(user.id, &email, Some(rank), limit)
            .await
        {
            Ok(RewardOutcome::Granted { .. }) => report.granted += 1,
            Ok(RewardOutcome::AlreadyRewarded) => report.already_rewarded += 1,
            Ok(RewardOutcome::RepairedProfile { .. }) => report.repaired += 1,
            Ok(RewardOutcome::Ineligible(_)) => report.ineligible += 1,
            Ok(RewardOutcome::Skipped) => report.skipped += 1,
            Err(e) => {
                error!("Reward evaluation for {email} failed: {e}");
                report.failed += 1;
            }
        }
    }

    Ok(report)
}
