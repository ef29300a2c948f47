use std::sync::Arc;

use tracing::{info, warn};

use crate::auth::provider::{AuthProvider, SupabaseAuth};
use crate::auth::session::SessionCache;
use crate::config::Config;
use crate::db::create_pool;
use crate::notify::{Mailer, ResendMailer};
use crate::profiles::{PgProfileStore, ProfileStore};
use crate::referrals::ReferralClaimer;
use crate::rewards::{RewardEvaluator, RewardSettings};
use crate::upload::client::{ProcessingApi, ProcessingClient};
use crate::upload::orchestrator::PreviewRegistry;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub profiles: Arc<dyn ProfileStore>,
    pub auth: Arc<dyn AuthProvider>,
    pub processing: Arc<dyn ProcessingApi>,
    pub rewards: Arc<RewardEvaluator>,
    pub referrals: ReferralClaimer,
    /// Last profile read per user; written handlers invalidate explicitly.
    pub sessions: Arc<SessionCache>,
    /// Tracks upload preview buffers still alive across requests.
    pub previews: PreviewRegistry,
}

impl AppState {
    /// Wires the production collaborators from configuration.
    pub async fn connect(config: Config) -> anyhow::Result<Self> {
        let db = create_pool(&config.database_url).await?;
        let profiles: Arc<dyn ProfileStore> = Arc::new(PgProfileStore::new(db));

        let auth: Arc<dyn AuthProvider> = Arc::new(SupabaseAuth::new(
            &config.supabase_url,
            &config.supabase_anon_key,
            &config.supabase_service_role_key,
        )?);
        info!("Auth client initialized ({})", config.supabase_url);

        let mailer: Option<Arc<dyn Mailer>> = match config.resend_api_key.clone() {
            Some(key) => Some(Arc::new(ResendMailer::new(key)?) as Arc<dyn Mailer>),
            None => {
                warn!("RESEND_API_KEY not set; reward emails are disabled");
                None
            }
        };

        let processing: Arc<dyn ProcessingApi> =
            Arc::new(ProcessingClient::new(&config.processing_api_url)?);
        info!("Processing client initialized ({})", config.processing_api_url);

        let rewards = Arc::new(RewardEvaluator::new(
            profiles.clone(),
            auth.clone(),
            mailer,
            RewardSettings::from_config(&config),
        ));
        info!(
            "Early adopter rewards: first {} signups, {} days",
            config.early_adopter_limit, config.early_adopter_days
        );

        Ok(Self {
            referrals: ReferralClaimer::new(profiles.clone()),
            config,
            profiles,
            auth,
            processing,
            rewards,
            sessions: Arc::new(SessionCache::new()),
            previews: PreviewRegistry::new(),
        })
    }
}
