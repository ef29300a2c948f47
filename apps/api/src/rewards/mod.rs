pub mod batch;
pub mod eligibility;
pub mod evaluator;

pub use evaluator::{
    spawn_reward_evaluation, RewardError, RewardEvaluator, RewardOutcome, RewardSettings,
};
