pub mod claimer;

pub use claimer::{ClaimOutcome, ReferralClaimer};
