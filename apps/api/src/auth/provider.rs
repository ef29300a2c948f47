//! Auth provider client: Supabase GoTrue over HTTP.
//!
//! Every call to the identity service goes through `AuthProvider` so the
//! reward evaluator and handlers can run against an in-memory provider in tests.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::models::auth::{AuthUser, Session};

const ADMIN_PAGE_SIZE: usize = 1000;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("auth API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("invalid or expired session")]
    InvalidSession,
}

#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Sends a magic link. `code_challenge` is the S256 PKCE challenge.
    async fn send_magic_link(
        &self,
        email: &str,
        redirect_to: &str,
        code_challenge: &str,
    ) -> Result<(), AuthError>;

    async fn exchange_code(&self, code: &str, code_verifier: &str) -> Result<Session, AuthError>;

    /// Resolves the user behind an access token.
    async fn current_user(&self, access_token: &str) -> Result<AuthUser, AuthError>;

    async fn sign_out(&self, access_token: &str) -> Result<(), AuthError>;

    /// Every user known to the provider, in no particular order.
    async fn list_users(&self) -> Result<Vec<AuthUser>, AuthError>;
}

#[derive(Debug, Serialize)]
struct OtpRequest<'a> {
    email: &'a str,
    create_user: bool,
    code_challenge: &'a str,
    code_challenge_method: &'a str,
}

#[derive(Debug, Serialize)]
struct PkceExchange<'a> {
    auth_code: &'a str,
    code_verifier: &'a str,
}

#[derive(Debug, Deserialize)]
struct UserPage {
    users: Vec<AuthUser>,
}

#[derive(Debug, Deserialize)]
struct GoTrueError {
    #[serde(alias = "error_description", alias = "message")]
    msg: Option<String>,
}

#[derive(Clone)]
pub struct SupabaseAuth {
    client: Client,
    base_url: String,
    anon_key: String,
    service_role_key: String,
}

impl SupabaseAuth {
    pub fn new(base_url: &str, anon_key: &str, service_role_key: &str) -> Result<Self, AuthError> {
        Ok(Self {
            client: Client::builder().timeout(Duration::from_secs(30)).build()?,
            base_url: base_url.trim_end_matches('/').to_string(),
            anon_key: anon_key.to_string(),
            service_role_key: service_role_key.to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/auth/v1{}", self.base_url, path)
    }
}

/// Maps non-success responses to `AuthError::Api`, keeping GoTrue's message.
async fn check(response: reqwest::Response) -> Result<reqwest::Response, AuthError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status.as_u16() == 401 || status.as_u16() == 403 {
        return Err(AuthError::InvalidSession);
    }
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<GoTrueError>(&body)
        .ok()
        .and_then(|e| e.msg)
        .unwrap_or(body);
    Err(AuthError::Api {
        status: status.as_u16(),
        message,
    })
}

#[async_trait]
impl AuthProvider for SupabaseAuth {
    async fn send_magic_link(
        &self,
        email: &str,
        redirect_to: &str,
        code_challenge: &str,
    ) -> Result<(), AuthError> {
        let response = self
            .client
            .post(self.url("/otp"))
            .query(&[("redirect_to", redirect_to)])
            .header("apikey", &self.anon_key)
            .json(&OtpRequest {
                email,
                create_user: true,
                code_challenge,
                code_challenge_method: "s256",
            })
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }

    async fn exchange_code(&self, code: &str, code_verifier: &str) -> Result<Session, AuthError> {
        let response = self
            .client
            .post(self.url("/token"))
            .query(&[("grant_type", "pkce")])
            .header("apikey", &self.anon_key)
            .json(&PkceExchange {
                auth_code: code,
                code_verifier,
            })
            .send()
            .await?;
        Ok(check(response).await?.json().await?)
    }

    async fn current_user(&self, access_token: &str) -> Result<AuthUser, AuthError> {
        let response = self
            .client
            .get(self.url("/user"))
            .header("apikey", &self.anon_key)
            .bearer_auth(access_token)
            .send()
            .await?;
        Ok(check(response).await?.json().await?)
    }

    async fn sign_out(&self, access_token: &str) -> Result<(), AuthError> {
        let response = self
            .client
            .post(self.url("/logout"))
            .header("apikey", &self.anon_key)
            .bearer_auth(access_token)
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }

    async fn list_users(&self) -> Result<Vec<AuthUser>, AuthError> {
        let mut users = Vec::new();
        let mut page = 1usize;
        loop {
            let response = self
                .client
                .get(self.url("/admin/users"))
                .query(&[("page", page), ("per_page", ADMIN_PAGE_SIZE)])
                .header("apikey", &self.service_role_key)
                .bearer_auth(&self.service_role_key)
                .send()
                .await?;
            let batch: UserPage = check(response).await?.json().await?;
            let fetched = batch.users.len();
            users.extend(batch.users);
            debug!("Fetched auth user page {page} ({fetched} users)");
            if fetched < ADMIN_PAGE_SIZE {
                break;
            }
            page += 1;
        }
        Ok(users)
    }
}
