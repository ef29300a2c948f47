//! Referral Claimer: credits inviter and invitee after signup.
//!
//! Code validation, self-referral checks and the credit amounts all live in
//! the `claim_referral` database procedure. This side only forwards the pair
//! and makes sure a failure never blocks the login redirect.

use std::sync::Arc;

use tracing::{error, info};
use uuid::Uuid;

use crate::profiles::ProfileStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// Both sides were credited. The inviter's cached profile is now stale.
    Credited { inviter_id: Uuid },
    /// The procedure declined (unknown code, self-referral, already referred).
    NotApplied,
    Failed,
}

#[derive(Clone)]
pub struct ReferralClaimer {
    profiles: Arc<dyn ProfileStore>,
}

impl ReferralClaimer {
    pub fn new(profiles: Arc<dyn ProfileStore>) -> Self {
        Self { profiles }
    }

    pub async fn claim(&self, code: &str, new_user_email: &str) -> ClaimOutcome {
        info!("Claiming referral code {code} for {new_user_email}");
        match self.profiles.claim_referral(code, new_user_email).await {
            Ok(Some(inviter_id)) => {
                info!("Referral {code} credited for {new_user_email} and inviter {inviter_id}");
                ClaimOutcome::Credited { inviter_id }
            }
            Ok(None) => {
                info!("Referral {code} not applied for {new_user_email}");
                ClaimOutcome::NotApplied
            }
            Err(e) => {
                error!("Referral claim failed for {new_user_email}: {e}");
                ClaimOutcome::Failed
            }
        }
    }
}
