//! Operator tool for the early adopter promotion.
//!
//! `grant` replays reward evaluation over the oldest signups; `reset` clears
//! one user's flag so the promotion can be re-tested against them.

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use watermark_api::config::Config;
use watermark_api::rewards::batch::reward_first_signups;
use watermark_api::state::AppState;

#[derive(Parser)]
#[command(name = "rewards-admin", version, about = "Early adopter reward maintenance")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Reward every eligible user among the first signups.
    Grant {
        /// How many of the oldest signups to consider.
        #[arg(long, env = "EARLY_ADOPTER_LIMIT", default_value_t = 50)]
        limit: usize,
    },
    /// Clear the early adopter flag for one user.
    Reset {
        #[arg(long)]
        email: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::from_env()?;

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!(
                "rewards_admin={level},watermark_api={level}",
                level = &config.rust_log
            ))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let state = AppState::connect(config).await?;

    match cli.command {
        Command::Grant { limit } => {
            let report = reward_first_signups(&state.rewards, limit).await?;
            info!(
                "Done. considered={} granted={} already={} repaired={} ineligible={} skipped={} failed={}",
                report.considered,
                report.granted,
                report.already_rewarded,
                report.repaired,
                report.ineligible,
                report.skipped,
                report.failed
            );
            if report.failed > 0 {
                bail!("{} evaluations failed", report.failed);
            }
        }
        Command::Reset { email } => {
            let users = state.auth.list_users().await?;
            let Some(user) = users
                .iter()
                .find(|u| u.email.as_deref().is_some_and(|e| e.eq_ignore_ascii_case(&email)))
            else {
                bail!("No user found with email {email}");
            };
            let updated = state.profiles.reset_early_adopter(user.id).await?;
            if updated == 0 {
                bail!("User {email} has no profile row");
            }
            info!("Reset early adopter status for {email} ({})", user.id);
        }
    }

    Ok(())
}
