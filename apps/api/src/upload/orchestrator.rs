//! Upload orchestration: one batch of images against the processing API.
//!
//! Item lifecycle: `Pending → Uploading → Success | Error`. All items in a
//! batch are sent at once and awaited together; completion order is not
//! preserved. Progress while uploading is simulated and never reaches 100
//! until the API answers.

use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::future::join_all;
use serde::Serialize;
use tokio::time::{interval_at, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::upload::client::{ProcessingApi, ProcessingError, RemoveResponse, UploadFile};
use crate::upload::validation::validate;

pub const PROGRESS_STEP: u8 = 10;
pub const PROGRESS_CAP: u8 = 90;
pub const PROGRESS_TICK: Duration = Duration::from_millis(300);

pub const FREE_BATCH_WARNING: &str =
    "Free plan processes one image at a time. Upgrade to Pro for bulk uploads.";

/// Counts preview buffers that are still alive.
#[derive(Clone, Default)]
pub struct PreviewRegistry {
    live: Arc<AtomicUsize>,
}

impl PreviewRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&self, bytes: Bytes) -> PreviewHandle {
        self.live.fetch_add(1, Ordering::SeqCst);
        PreviewHandle {
            bytes,
            live: self.live.clone(),
        }
    }

    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }
}

/// A preview of a local file. Released when dropped.
pub struct PreviewHandle {
    bytes: Bytes,
    live: Arc<AtomicUsize>,
}

impl PreviewHandle {
    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }
}

impl Drop for PreviewHandle {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadStatus {
    Pending,
    Uploading,
    Success,
    Error,
}

pub struct UploadItem {
    id: Uuid,
    file: UploadFile,
    preview: PreviewHandle,
    status: UploadStatus,
    progress: AtomicU8,
    download_url: Option<String>,
    error: Option<String>,
}

impl UploadItem {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn file_name(&self) -> &str {
        &self.file.file_name
    }

    pub fn status(&self) -> UploadStatus {
        self.status
    }

    pub fn progress(&self) -> u8 {
        self.progress.load(Ordering::SeqCst)
    }

    pub fn download_url(&self) -> Option<&str> {
        self.download_url.as_deref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn preview(&self) -> &PreviewHandle {
        &self.preview
    }

    fn finish(&mut self, result: Result<RemoveResponse, ProcessingError>, api: &dyn ProcessingApi) {
        match result {
            Ok(response) if response.success => match response.download_id {
                Some(download_id) => {
                    self.status = UploadStatus::Success;
                    self.progress.store(100, Ordering::SeqCst);
                    self.download_url = Some(api.download_url(&download_id));
                }
                None => self.fail("Processing failed. No download available.".to_string()),
            },
            Ok(response) => self.fail(response.failure_message()),
            Err(e) => self.fail(e.to_string()),
        }
    }

    fn fail(&mut self, message: String) {
        warn!("Upload of {} failed: {message}", self.file.file_name);
        self.status = UploadStatus::Error;
        self.error = Some(message);
    }

    pub fn snapshot(&self) -> ItemSnapshot {
        ItemSnapshot {
            id: self.id,
            file_name: self.file.file_name.clone(),
            status: self.status,
            progress: self.progress(),
            download_url: self.download_url.clone(),
            error: self.error.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ItemSnapshot {
    pub id: Uuid,
    pub file_name: String,
    pub status: UploadStatus,
    pub progress: u8,
    pub download_url: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Rejection {
    pub file_name: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchSummary {
    pub items: Vec<ItemSnapshot>,
    pub warning: Option<String>,
    pub rejected: Vec<Rejection>,
}

/// Who is uploading. The batch cap is a UI convenience, not an access control.
#[derive(Debug, Clone, Copy, Default)]
pub struct Viewer {
    pub user_id: Option<Uuid>,
    pub is_pro: bool,
}

impl Viewer {
    pub fn max_batch(&self) -> Option<usize> {
        (!self.is_pro).then_some(1)
    }
}

pub struct UploadBatch {
    items: Vec<UploadItem>,
    warning: Option<String>,
    rejected: Vec<Rejection>,
    previews: PreviewRegistry,
}

impl UploadBatch {
    pub fn new(previews: PreviewRegistry) -> Self {
        Self {
            items: Vec::new(),
            warning: None,
            rejected: Vec::new(),
            previews,
        }
    }

    pub fn items(&self) -> &[UploadItem] {
        &self.items
    }

    pub fn warning(&self) -> Option<&str> {
        self.warning.as_deref()
    }

    pub fn rejected(&self) -> &[Rejection] {
        &self.rejected
    }

    /// Validates and queues files. Returns how many were queued.
    pub fn add_files(&mut self, files: Vec<UploadFile>, viewer: &Viewer) -> usize {
        let mut accepted = Vec::new();
        for file in files {
            match validate(&file.content_type, file.bytes.len()) {
                Ok(()) => accepted.push(file),
                Err(e) => self.rejected.push(Rejection {
                    file_name: file.file_name,
                    reason: e.to_string(),
                }),
            }
        }

        if let Some(max) = viewer.max_batch() {
            let room = max.saturating_sub(self.items.len());
            if accepted.len() > room {
                info!("Dropping {} files over the free batch size", accepted.len() - room);
                accepted.truncate(room);
                self.warning = Some(FREE_BATCH_WARNING.to_string());
            }
        }

        let queued = accepted.len();
        for file in accepted {
            let preview = self.previews.create(file.bytes.clone());
            self.items.push(UploadItem {
                id: Uuid::new_v4(),
                file,
                preview,
                status: UploadStatus::Pending,
                progress: AtomicU8::new(0),
                download_url: None,
                error: None,
            });
        }
        queued
    }

    /// Sends every pending item concurrently and records each result.
    /// `client_ip` is the end user's address, charged for the quota.
    pub async fn submit(
        &mut self,
        api: &dyn ProcessingApi,
        viewer: &Viewer,
        client_ip: Option<&str>,
    ) {
        for item in self
            .items
            .iter_mut()
            .filter(|i| i.status == UploadStatus::Pending)
        {
            item.status = UploadStatus::Uploading;
            item.progress.store(0, Ordering::SeqCst);
        }

        let results = {
            let uploads = self
                .items
                .iter()
                .filter(|i| i.status == UploadStatus::Uploading)
                .map(|item| async move {
                    let result = upload_with_progress(
                        api,
                        &item.file,
                        viewer.user_id,
                        client_ip,
                        &item.progress,
                    )
                    .await;
                    (item.id, result)
                });
            join_all(uploads).await
        };

        debug!("Batch finished with {} results", results.len());
        for (id, result) in results {
            if let Some(item) = self.items.iter_mut().find(|i| i.id == id) {
                item.finish(result, api);
            }
        }
    }

    /// Drops one item and its preview.
    pub fn remove(&mut self, id: Uuid) -> bool {
        let before = self.items.len();
        self.items.retain(|i| i.id != id);
        before != self.items.len()
    }

    /// Clears every item, preview, rejection and warning.
    pub fn reset(&mut self) {
        self.items.clear();
        self.rejected.clear();
        self.warning = None;
    }

    pub fn summary(&self) -> BatchSummary {
        BatchSummary {
            items: self.items.iter().map(UploadItem::snapshot).collect(),
            warning: self.warning.clone(),
            rejected: self.rejected.clone(),
        }
    }
}

/// Monotonic, never past the cap.
pub fn next_progress(current: u8) -> u8 {
    current.max(current.saturating_add(PROGRESS_STEP).min(PROGRESS_CAP))
}

async fn upload_with_progress(
    api: &dyn ProcessingApi,
    file: &UploadFile,
    user_id: Option<Uuid>,
    client_ip: Option<&str>,
    progress: &AtomicU8,
) -> Result<RemoveResponse, ProcessingError> {
    let request = api.remove(file, user_id, client_ip);
    tokio::pin!(request);
    let mut ticker = interval_at(Instant::now() + PROGRESS_TICK, PROGRESS_TICK);
    loop {
        tokio::select! {
            result = &mut request => return result,
            _ = ticker.tick() => {
                let _ = progress.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |p| Some(next_progress(p)));
            }
        }
    }
}
