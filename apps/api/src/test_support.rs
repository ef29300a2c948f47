//! In-memory collaborators for unit and router tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use uuid::Uuid;

use crate::auth::provider::{AuthError, AuthProvider};
use crate::auth::session::SessionCache;
use crate::config::Config;
use crate::models::auth::{AuthUser, Session};
use crate::models::profile::ProfileRow;
use crate::notify::{Email, MailError, Mailer};
use crate::profiles::referral_code;
use crate::profiles::{EarlyAdopterGrant, ProfileStore, StoreError, SubscriptionUpdate};
use crate::referrals::ReferralClaimer;
use crate::rewards::{RewardEvaluator, RewardSettings};
use crate::state::AppState;
use crate::upload::client::{ProcessingApi, ProcessingError, Remaining, RemoveResponse, UploadFile};
use crate::upload::orchestrator::PreviewRegistry;

pub const REFERRAL_DAYS: i64 = 7;

pub fn signup_time(n: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap() + Duration::minutes(n)
}

pub fn auth_user(n: u128, email: &str) -> AuthUser {
    AuthUser {
        id: Uuid::from_u128(n),
        email: Some(email.to_string()),
        created_at: signup_time(n as i64),
    }
}

fn unavailable(what: &str) -> StoreError {
    StoreError::Unavailable(format!("{what} failed (injected)"))
}

// ────────────────────────────────────────────────────────────────────────────
// Profile store
// ────────────────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct InMemoryProfiles {
    rows: Mutex<HashMap<Uuid, ProfileRow>>,
    pub fail_find: AtomicBool,
    pub fail_count: AtomicBool,
    pub fail_grant: AtomicBool,
    pub fail_claim: AtomicBool,
    pub fail_update: AtomicBool,
    /// Padding added to `count()` to simulate a crowded table.
    pub extra_count: AtomicUsize,
    pub writes: AtomicUsize,
}

impl InMemoryProfiles {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn seed(&self, row: ProfileRow) {
        self.rows.lock().unwrap().insert(row.id, row);
    }

    pub fn get(&self, id: Uuid) -> Option<ProfileRow> {
        self.rows.lock().unwrap().get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        self.rows.lock().unwrap().len()
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn touch(&self) {
        self.writes.fetch_add(1, Ordering::SeqCst);
    }
}

fn extend_window(current: Option<DateTime<Utc>>, days: i64) -> DateTime<Utc> {
    let now = Utc::now();
    current.filter(|t| *t > now).unwrap_or(now) + Duration::days(days)
}

#[async_trait]
impl ProfileStore for InMemoryProfiles {
    async fn find(&self, user_id: Uuid) -> Result<Option<ProfileRow>, StoreError> {
        if self.fail_find.load(Ordering::SeqCst) {
            return Err(unavailable("find"));
        }
        Ok(self.get(user_id))
    }

    async fn count(&self) -> Result<i64, StoreError> {
        if self.fail_count.load(Ordering::SeqCst) {
            return Err(unavailable("count"));
        }
        Ok((self.len() + self.extra_count.load(Ordering::SeqCst)) as i64)
    }

    async fn generate_referral_code(&self) -> Result<String, StoreError> {
        Ok(referral_code::generate())
    }

    async fn insert_basic(
        &self,
        user_id: Uuid,
        email: &str,
        referral_code: &str,
    ) -> Result<bool, StoreError> {
        let mut rows = self.rows.lock().unwrap();
        if rows.contains_key(&user_id) {
            return Ok(false);
        }
        rows.insert(
            user_id,
            ProfileRow::basic(user_id, email, referral_code, Utc::now()),
        );
        self.touch();
        Ok(true)
    }

    async fn grant_early_adopter(
        &self,
        grant: &EarlyAdopterGrant,
    ) -> Result<Option<ProfileRow>, StoreError> {
        if self.fail_grant.load(Ordering::SeqCst) {
            return Err(unavailable("grant"));
        }
        let mut rows = self.rows.lock().unwrap();
        let row = rows.entry(grant.user_id).or_insert_with(|| {
            ProfileRow::basic(grant.user_id, &grant.email, &grant.referral_code, Utc::now())
        });
        if row.is_early_adopter {
            return Ok(None);
        }
        row.is_early_adopter = true;
        row.pro_expires_at = Some(extend_window(row.pro_expires_at, grant.days as i64));
        if row.referral_code.is_none() {
            row.referral_code = Some(grant.referral_code.clone());
        }
        row.updated_at = Utc::now();
        let granted = row.clone();
        drop(rows);
        self.touch();
        Ok(Some(granted))
    }

    async fn claim_referral(
        &self,
        code: &str,
        new_user_email: &str,
    ) -> Result<Option<Uuid>, StoreError> {
        if self.fail_claim.load(Ordering::SeqCst) {
            return Err(unavailable("claim"));
        }
        let mut rows = self.rows.lock().unwrap();
        let inviter = rows
            .values()
            .find(|r| r.referral_code.as_deref() == Some(code))
            .map(|r| r.id);
        let invitee = rows
            .values()
            .find(|r| r.email.as_deref() == Some(new_user_email))
            .map(|r| (r.id, r.referred_by.is_some()));

        let (Some(inviter), Some((invitee, already_referred))) = (inviter, invitee) else {
            return Ok(None);
        };
        if inviter == invitee || already_referred {
            return Ok(None);
        }
        for id in [inviter, invitee] {
            if let Some(row) = rows.get_mut(&id) {
                row.pro_expires_at = Some(extend_window(row.pro_expires_at, REFERRAL_DAYS));
            }
        }
        if let Some(row) = rows.get_mut(&invitee) {
            row.referred_by = Some(code.to_string());
        }
        drop(rows);
        self.touch();
        Ok(Some(inviter))
    }

    async fn apply_subscription(
        &self,
        user_id: Uuid,
        update: &SubscriptionUpdate,
    ) -> Result<u64, StoreError> {
        if self.fail_update.load(Ordering::SeqCst) {
            return Err(unavailable("update"));
        }
        let mut rows = self.rows.lock().unwrap();
        let Some(row) = rows.get_mut(&user_id) else {
            return Ok(0);
        };
        row.is_pro = update.is_pro;
        row.subscription_id = update.subscription_id.clone();
        row.customer_id = update.customer_id.clone();
        row.updated_at = Utc::now();
        drop(rows);
        self.touch();
        Ok(1)
    }

    async fn clear_pro(&self, user_id: Uuid) -> Result<u64, StoreError> {
        if self.fail_update.load(Ordering::SeqCst) {
            return Err(unavailable("update"));
        }
        let mut rows = self.rows.lock().unwrap();
        let Some(row) = rows.get_mut(&user_id) else {
            return Ok(0);
        };
        row.is_pro = false;
        drop(rows);
        self.touch();
        Ok(1)
    }

    async fn reset_early_adopter(&self, user_id: Uuid) -> Result<u64, StoreError> {
        let mut rows = self.rows.lock().unwrap();
        let Some(row) = rows.get_mut(&user_id) else {
            return Ok(0);
        };
        row.is_early_adopter = false;
        drop(rows);
        self.touch();
        Ok(1)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Auth provider
// ────────────────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct FakeAuth {
    users: Mutex<Vec<AuthUser>>,
    tokens: Mutex<HashMap<String, AuthUser>>,
    codes: Mutex<HashMap<String, AuthUser>>,
    pub magic_links: Mutex<Vec<(String, String)>>,
    pub signed_out: Mutex<Vec<String>>,
    pub fail_list: AtomicBool,
    pub list_calls: AtomicUsize,
}

impl FakeAuth {
    pub fn with_users(users: Vec<AuthUser>) -> Arc<Self> {
        let auth = Self::default();
        *auth.users.lock().unwrap() = users;
        Arc::new(auth)
    }

    pub fn add_user(&self, user: AuthUser) {
        self.users.lock().unwrap().push(user);
    }

    /// Registers a token resolving to `user`.
    pub fn issue_token(&self, token: &str, user: AuthUser) {
        self.tokens.lock().unwrap().insert(token.to_string(), user);
    }

    /// Registers a one-time auth code resolving to `user`.
    pub fn issue_code(&self, code: &str, user: AuthUser) {
        self.codes.lock().unwrap().insert(code.to_string(), user);
    }
}

#[async_trait]
impl AuthProvider for FakeAuth {
    async fn send_magic_link(
        &self,
        email: &str,
        redirect_to: &str,
        _code_challenge: &str,
    ) -> Result<(), AuthError> {
        self.magic_links
            .lock()
            .unwrap()
            .push((email.to_string(), redirect_to.to_string()));
        Ok(())
    }

    async fn exchange_code(&self, code: &str, _code_verifier: &str) -> Result<Session, AuthError> {
        let user = self
            .codes
            .lock()
            .unwrap()
            .remove(code)
            .ok_or(AuthError::Api {
                status: 400,
                message: "invalid flow state".to_string(),
            })?;
        let access_token = format!("access-{code}");
        self.issue_token(&access_token, user.clone());
        Ok(Session {
            access_token,
            refresh_token: format!("refresh-{code}"),
            expires_in: Some(3600),
            user,
        })
    }

    async fn current_user(&self, access_token: &str) -> Result<AuthUser, AuthError> {
        self.tokens
            .lock()
            .unwrap()
            .get(access_token)
            .cloned()
            .ok_or(AuthError::InvalidSession)
    }

    async fn sign_out(&self, access_token: &str) -> Result<(), AuthError> {
        self.tokens.lock().unwrap().remove(access_token);
        self.signed_out.lock().unwrap().push(access_token.to_string());
        Ok(())
    }

    async fn list_users(&self) -> Result<Vec<AuthUser>, AuthError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_list.load(Ordering::SeqCst) {
            return Err(AuthError::Api {
                status: 503,
                message: "auth unavailable".to_string(),
            });
        }
        Ok(self.users.lock().unwrap().clone())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Mailer
// ────────────────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingMailer {
    pub sent: Mutex<Vec<Email>>,
    pub fail: AtomicBool,
}

impl RecordingMailer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn sent(&self) -> Vec<Email> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, email: &Email) -> Result<(), MailError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(MailError::Api {
                status: 500,
                message: "mail down".to_string(),
            });
        }
        self.sent.lock().unwrap().push(email.clone());
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Processing API
// ────────────────────────────────────────────────────────────────────────────

/// Succeeds for every file except those whose name starts with `fail`.
pub struct FakeProcessing {
    remaining: AtomicUsize,
    pub limit: usize,
    pub calls: AtomicUsize,
    pub client_ips: Mutex<Vec<String>>,
}

impl FakeProcessing {
    pub fn new(limit: usize) -> Arc<Self> {
        Arc::new(Self {
            remaining: AtomicUsize::new(limit),
            limit,
            calls: AtomicUsize::new(0),
            client_ips: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProcessingApi for FakeProcessing {
    async fn remove(
        &self,
        file: &UploadFile,
        _user_id: Option<Uuid>,
        client_ip: Option<&str>,
    ) -> Result<RemoveResponse, ProcessingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(ip) = client_ip {
            self.client_ips.lock().unwrap().push(ip.to_string());
        }
        tokio::task::yield_now().await;
        if file.file_name.starts_with("fail") {
            return Ok(RemoveResponse {
                success: false,
                download_id: None,
                filename: None,
                error: Some("Processing failed. Try another image.".to_string()),
                code: None,
                message: None,
            });
        }
        if self.remaining.load(Ordering::SeqCst) == 0 {
            return Ok(RemoveResponse {
                success: false,
                download_id: None,
                filename: None,
                error: Some("Daily limit reached. Upgrade to Pro for unlimited access.".to_string()),
                code: Some("RATE_LIMITED".to_string()),
                message: None,
            });
        }
        self.remaining.fetch_sub(1, Ordering::SeqCst);
        Ok(RemoveResponse {
            success: true,
            download_id: Some(format!("dl-{}", file.file_name)),
            filename: Some(file.file_name.clone()),
            error: None,
            code: None,
            message: None,
        })
    }

    async fn remaining(&self, _client_ip: Option<&str>) -> Result<Remaining, ProcessingError> {
        Ok(Remaining {
            remaining: self.remaining.load(Ordering::SeqCst) as u32,
            limit: self.limit as u32,
        })
    }

    fn download_url(&self, download_id: &str) -> String {
        format!("http://processing.test/api/download/{download_id}")
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Wiring
// ────────────────────────────────────────────────────────────────────────────

pub fn test_config() -> Config {
    Config {
        database_url: "postgres://unused".to_string(),
        supabase_url: "http://supabase.test".to_string(),
        supabase_anon_key: "anon".to_string(),
        supabase_service_role_key: "service".to_string(),
        processing_api_url: "http://processing.test".to_string(),
        resend_api_key: Some("re_test".to_string()),
        email_from: "GeminiWatermark AI <gemini@example.com>".to_string(),
        lemonsqueezy_webhook_secret: Some("whsec_test".to_string()),
        early_adopter_limit: 50,
        early_adopter_days: 30,
        site_url: "https://site.test".to_string(),
        port: 0,
        rust_log: "info".to_string(),
    }
}

pub fn settings(limit: usize) -> RewardSettings {
    RewardSettings {
        limit,
        days: 30,
        site_url: "https://site.test".to_string(),
        email_from: "GeminiWatermark AI <gemini@example.com>".to_string(),
    }
}

pub struct TestHarness {
    pub state: AppState,
    pub profiles: Arc<InMemoryProfiles>,
    pub auth: Arc<FakeAuth>,
    pub mailer: Arc<RecordingMailer>,
    pub processing: Arc<FakeProcessing>,
}

pub fn harness(config: Config) -> TestHarness {
    let profiles = InMemoryProfiles::new();
    let auth = FakeAuth::with_users(Vec::new());
    let mailer = RecordingMailer::new();
    let processing = FakeProcessing::new(100);

    let rewards = Arc::new(RewardEvaluator::new(
        profiles.clone(),
        auth.clone(),
        Some(mailer.clone() as Arc<dyn Mailer>),
        RewardSettings::from_config(&config),
    ));

    let state = AppState {
        config,
        profiles: profiles.clone(),
        auth: auth.clone(),
        processing: processing.clone(),
        rewards,
        referrals: ReferralClaimer::new(profiles.clone()),
        sessions: Arc::new(SessionCache::new()),
        previews: PreviewRegistry::new(),
    };

    TestHarness {
        state,
        profiles,
        auth,
        mailer,
        processing,
    }
}
