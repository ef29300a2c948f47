//! Client for the external watermark-removal API.
//!
//! The service is a black box: `/api/remove` takes a multipart image and
//! answers with a download handle or an error body, `/api/remaining` reports
//! the caller's daily quota.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

const FORWARDED_FOR: &str = "X-Forwarded-For";

#[derive(Debug, Error)]
pub enum ProcessingError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("processing API error (status {status}): {message}")]
    Api { status: u16, message: String },
}

#[derive(Debug, Clone)]
pub struct UploadFile {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Bytes,
}

/// Body of `POST /api/remove`, for success and failure alike.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RemoveResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub download_id: Option<String>,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl RemoveResponse {
    /// The service's own wording, passed through unchanged.
    pub fn failure_message(&self) -> String {
        self.message
            .clone()
            .or_else(|| self.error.clone())
            .or_else(|| self.code.clone())
            .unwrap_or_else(|| "Processing failed".to_string())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Remaining {
    pub remaining: u32,
    pub limit: u32,
}

#[async_trait]
pub trait ProcessingApi: Send + Sync {
    /// `client_ip` is forwarded on both calls because the quota is tracked
    /// per address, not per proxy.
    async fn remove(
        &self,
        file: &UploadFile,
        user_id: Option<Uuid>,
        client_ip: Option<&str>,
    ) -> Result<RemoveResponse, ProcessingError>;

    async fn remaining(&self, client_ip: Option<&str>) -> Result<Remaining, ProcessingError>;

    fn download_url(&self, download_id: &str) -> String;
}

#[derive(Clone)]
pub struct ProcessingClient {
    client: Client,
    base_url: String,
}

impl ProcessingClient {
    pub fn new(base_url: &str) -> Result<Self, ProcessingError> {
        Ok(Self {
            client: Client::builder().timeout(Duration::from_secs(90)).build()?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl ProcessingApi for ProcessingClient {
    async fn remove(
        &self,
        file: &UploadFile,
        user_id: Option<Uuid>,
        client_ip: Option<&str>,
    ) -> Result<RemoveResponse, ProcessingError> {
        let part = Part::bytes(file.bytes.to_vec())
            .file_name(file.file_name.clone())
            .mime_str(&file.content_type)?;
        let mut form = Form::new().part("file", part);
        if let Some(user_id) = user_id {
            form = form.text("user_id", user_id.to_string());
        }

        let mut request = self
            .client
            .post(format!("{}/api/remove", self.base_url))
            .multipart(form);
        if let Some(ip) = client_ip {
            request = request.header(FORWARDED_FOR, ip);
        }
        let response = request.send().await?;

        // Error statuses still carry a JSON body worth surfacing.
        let status = response.status();
        let body = response.text().await?;
        debug!("Processing API answered {status} for {}", file.file_name);
        serde_json::from_str::<RemoveResponse>(&body).map_err(|_| ProcessingError::Api {
            status: status.as_u16(),
            message: body,
        })
    }

    async fn remaining(&self, client_ip: Option<&str>) -> Result<Remaining, ProcessingError> {
        let mut request = self.client.get(format!("{}/api/remaining", self.base_url));
        if let Some(ip) = client_ip {
            request = request.header(FORWARDED_FOR, ip);
        }
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ProcessingError::Api {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }
        Ok(response.json().await?)
    }

    fn download_url(&self, download_id: &str) -> String {
        format!("{}/api/download/{}", self.base_url, download_id)
    }
}
