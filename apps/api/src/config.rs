use anyhow::{ensure, Context, Result};

const DEFAULT_SITE_URL: &str = "https://geminiwatermark.ai";
const DEFAULT_EMAIL_FROM: &str = "GeminiWatermark AI <gemini@cmoontech.com>";

/// Application configuration loaded from environment variables.
/// Startup fails if required variables are missing.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub supabase_service_role_key: String,
    pub processing_api_url: String,
    /// Absent key disables reward emails; grants still happen.
    pub resend_api_key: Option<String>,
    pub email_from: String,
    /// Absent secret makes the payment webhook answer 500.
    pub lemonsqueezy_webhook_secret: Option<String>,
    pub early_adopter_limit: usize,
    pub early_adopter_days: i32,
    pub site_url: String,
    pub port: u16,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Ok(Config {
            database_url: require_env("DATABASE_URL")?,
            supabase_url: trim_slash(require_env("SUPABASE_URL")?),
            supabase_anon_key: require_env("SUPABASE_ANON_KEY")?,
            supabase_service_role_key: require_env("SUPABASE_SERVICE_ROLE_KEY")?,
            processing_api_url: trim_slash(require_env("PROCESSING_API_URL")?),
            resend_api_key: optional_env("RESEND_API_KEY"),
            email_from: optional_env("EMAIL_FROM")
                .unwrap_or_else(|| DEFAULT_EMAIL_FROM.to_string()),
            lemonsqueezy_webhook_secret: optional_env("LEMONSQUEEZY_WEBHOOK_SECRET"),
            early_adopter_limit: std::env::var("EARLY_ADOPTER_LIMIT")
                .unwrap_or_else(|_| "50".to_string())
                .parse::<usize>()
                .context("EARLY_ADOPTER_LIMIT must be a non-negative integer")?,
            early_adopter_days: parse_days(
                &std::env::var("EARLY_ADOPTER_DAYS").unwrap_or_else(|_| "30".to_string()),
            )?,
            site_url: trim_slash(
                optional_env("SITE_URL").unwrap_or_else(|| DEFAULT_SITE_URL.to_string()),
            ),
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse::<u16>()
                .context("PORT must be a valid port number")?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        })
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

/// Empty values count as unset.
fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// A grant must extend the Pro window, so zero and negative values are rejected.
fn parse_days(raw: &str) -> Result<i32> {
    let days = raw
        .trim()
        .parse::<i32>()
        .context("EARLY_ADOPTER_DAYS must be an integer")?;
    ensure!(days >= 1, "EARLY_ADOPTER_DAYS must be at least 1, got {days}");
    Ok(days)
}

fn trim_slash(url: String) -> String {
    url.trim_end_matches('/').to_string()
}
