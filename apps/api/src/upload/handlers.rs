use axum::{
    extract::{Multipart, State},
    http::HeaderMap,
    Json,
};
use chrono::Utc;
use tracing::{info, warn};

use crate::errors::AppError;
use crate::profiles::handlers::{authenticated_user, load_profile};
use crate::state::AppState;
use crate::upload::client::{Remaining, UploadFile};
use crate::upload::orchestrator::{BatchSummary, UploadBatch, Viewer};
use crate::upload::validation::MAX_FILE_SIZE;

/// Room for a Pro batch of several full-size images plus multipart framing.
pub const UPLOAD_BODY_LIMIT: usize = MAX_FILE_SIZE * 10 + 64 * 1024;

/// POST /api/uploads
///
/// Accepts one or more `file` parts, sends them to the processing API
/// together and answers with the per-file outcome.
pub async fn handle_upload(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Json<BatchSummary>, AppError> {
    let viewer = resolve_viewer(&state, &headers).await;

    let mut files = Vec::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Malformed upload: {e}")))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field.file_name().unwrap_or("upload").to_string();
        let content_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| AppError::Validation(format!("Failed to read {file_name}: {e}")))?;
        files.push(UploadFile {
            file_name,
            content_type,
            bytes,
        });
    }

    if files.is_empty() {
        return Err(AppError::Validation("No file provided".to_string()));
    }

    let mut batch = UploadBatch::new(state.previews.clone());
    let queued = batch.add_files(files, &viewer);
    info!(
        "Processing {queued} upload(s) for {}",
        viewer
            .user_id
            .map(|id| id.to_string())
            .unwrap_or_else(|| "anonymous".to_string())
    );
    let ip = client_ip(&headers);
    batch
        .submit(state.processing.as_ref(), &viewer, ip.as_deref())
        .await;

    Ok(Json(batch.summary()))
}

/// GET /api/remaining
pub async fn handle_remaining(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Remaining>, AppError> {
    let remaining = state.processing.remaining(client_ip(&headers).as_deref()).await?;
    Ok(Json(remaining))
}

async fn resolve_viewer(state: &AppState, headers: &HeaderMap) -> Viewer {
    let Some(user) = authenticated_user(state, headers).await else {
        return Viewer::default();
    };
    let is_pro = match load_profile(state, user.id).await {
        Ok(profile) => profile.is_some_and(|p| p.is_effective_pro(Utc::now())),
        Err(e) => {
            warn!("Profile lookup for {} failed: {e}", user.id);
            false
        }
    };
    Viewer {
        user_id: Some(user.id),
        is_pro,
    }
}

/// First hop of the proxy chain, since the quota is tracked per address.
fn client_ip(headers: &HeaderMap) -> Option<String> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };
    header("cf-connecting-ip")
        .or_else(|| header("x-forwarded-for").and_then(|v| v.split(',').next()).map(str::trim))
        .or_else(|| header("x-real-ip"))
        .map(str::to_string)
}
