use crate::api::error::AppError;
use crate::api::middleware::rate_limit::{extract_client_ip, extract_user_agent};
use crate::services::upload_service::{FinalizedFile, PresignOutcome, RequestOrigin};
use axum::{
    Json,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

// ── Request / Response Types ──────────────────────────────────────────

#[derive(Deserialize, ToSchema)]
pub struct PresignRequest {
    /// Desired slug; empty or omitted means the server picks one
    pub slug: Option<String>,
    pub file_names: Vec<String>,
    #[serde(default)]
    pub is_private: bool,
    pub access_code: Option<String>,
    pub visibility: Option<String>,
    /// Duration class: "24", "168", anything else maps to the short default
    pub duration: String,
    pub captcha_token: String,
}

#[derive(Deserialize, ToSchema)]
pub struct FinalizeRequest {
    pub slug: String,
    pub files: Vec<FinalizedFile>,
    #[serde(default)]
    pub is_private: bool,
    pub access_code: Option<String>,
    pub visibility: Option<String>,
    pub duration: String,
}

#[derive(Serialize, ToSchema)]
pub struct FinalizeResponse {
    pub share_id: String,
}

fn extract_user_id(headers: &HeaderMap) -> Option<String> {
    // Injected by the upstream auth layer; absent for anonymous shares
    headers
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(|v| v.to_string())
}

// ── Handlers ──────────────────────────────────────────────────────────

/// Phase 1: request presigned PUT URLs for a batch of files
#[utoipa::path(
    post,
    path = "/upload/presign",
    request_body = PresignRequest,
    responses(
        (status = 200, description = "Presigned URLs issued", body = PresignOutcome),
        (status = 400, description = "Invalid slug, file name or batch"),
        (status = 403, description = "CAPTCHA rejected"),
        (status = 429, description = "Rate limit exceeded"),
        (status = 503, description = "Object store or CAPTCHA gate unreachable")
    ),
    tag = "upload"
)]
pub async fn presign_upload(
    State(state): State<crate::AppState>,
    headers: HeaderMap,
    Json(req): Json<PresignRequest>,
) -> Result<Json<PresignOutcome>, AppError> {
    let ip = extract_client_ip(&headers);

    let outcome = state
        .upload_service
        .presign(
            req.slug,
            req.file_names,
            req.is_private,
            req.access_code.as_deref(),
            req.duration,
            &req.captcha_token,
            &ip,
        )
        .await?;

    Ok(Json(outcome))
}

/// Phase 2: record the uploaded batch and create the share
#[utoipa::path(
    post,
    path = "/upload/finalize",
    request_body = FinalizeRequest,
    responses(
        (status = 201, description = "Share created", body = FinalizeResponse),
        (status = 400, description = "Invalid slug, file name or batch"),
        (status = 409, description = "Slug already taken"),
        (status = 429, description = "Rate limit exceeded")
    ),
    tag = "upload"
)]
pub async fn finalize_upload(
    State(state): State<crate::AppState>,
    headers: HeaderMap,
    Json(req): Json<FinalizeRequest>,
) -> Result<(StatusCode, Json<FinalizeResponse>), AppError> {
    let origin = RequestOrigin {
        user_id: extract_user_id(&headers),
        ip_address: Some(extract_client_ip(&headers)),
        user_agent: extract_user_agent(&headers),
    };

    let share_id = state
        .upload_service
        .finalize(
            req.slug,
            req.files,
            req.is_private,
            req.access_code.as_deref(),
            req.visibility.unwrap_or_else(|| "unlisted".to_string()),
            req.duration,
            origin,
        )
        .await?;

    Ok((StatusCode::CREATED, Json(FinalizeResponse { share_id })))
}

/// Cancel an upload that was never finalized
#[utoipa::path(
    delete,
    path = "/upload/{slug}",
    params(("slug" = String, Path, description = "Share slug")),
    responses(
        (status = 204, description = "Nothing to cancel; any stray objects are left for reclamation"),
        (status = 409, description = "Upload already finalized for this slug")
    ),
    tag = "upload"
)]
pub async fn cancel_upload(
    State(state): State<crate::AppState>,
    Path(slug): Path<String>,
) -> Result<StatusCode, AppError> {
    state.upload_service.cancel(&slug).await?;
    Ok(StatusCode::NO_CONTENT)
}
