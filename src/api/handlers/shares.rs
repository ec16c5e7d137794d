use crate::api::error::AppError;
use crate::entities::{prelude::*, *};
use crate::services::share_service::ShareService;
use axum::{
    Json,
    extract::{Path, State},
    http::{HeaderMap, HeaderValue, header},
    response::{IntoResponse, Response},
};
use chrono::Utc;
use percent_encoding::{NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

// ── Request / Response Types ──────────────────────────────────────────

#[derive(Serialize, ToSchema)]
pub struct ShareFileEntry {
    pub id: String,
    pub file_name: String,
    pub size: i64,
}

#[derive(Serialize, ToSchema)]
pub struct ShareInfoResponse {
    pub id: String,
    pub slug: String,
    pub private: bool,
    /// True when the share is private and this request carries no valid code
    pub locked: bool,
    pub visibility: String,
    pub created_at: chrono::DateTime<Utc>,
    pub updated_at: chrono::DateTime<Utc>,
    pub expires_at: chrono::DateTime<Utc>,
    /// Withheld while locked
    #[serde(skip_serializing_if = "Option::is_none")]
    pub files: Option<Vec<ShareFileEntry>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_size: Option<i64>,
}

#[derive(Deserialize, ToSchema)]
pub struct UnlockShareRequest {
    pub code: String,
}

#[derive(Serialize, ToSchema)]
pub struct DownloadUrlResponse {
    pub file_name: String,
    pub url: String,
}

#[derive(Serialize, ToSchema)]
pub struct UserUsageResponse {
    pub share_count: u64,
    pub file_count: u64,
    pub total_bytes: i64,
}

// ── Unlock cookie handling ────────────────────────────────────────────
//
// Unlock state lives in an httpOnly cookie named by the share id whose value
// is the plaintext access code. The code is re-verified against the stored
// hash on every request, so rotating or wiping the code revokes access
// immediately; a bare "unlocked" flag could not do that.

fn find_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    let raw = headers.get(header::COOKIE)?.to_str().ok()?;
    for pair in raw.split(';') {
        if let Some((key, value)) = pair.trim().split_once('=')
            && key == name
        {
            return percent_decode_str(value)
                .decode_utf8()
                .ok()
                .map(|v| v.to_string());
        }
    }
    None
}

fn unlock_cookie(share_id: &str, code: &str, max_age_secs: u64) -> String {
    format!(
        "{}={}; Max-Age={}; Path=/; HttpOnly; SameSite=Strict",
        share_id,
        utf8_percent_encode(code, NON_ALPHANUMERIC),
        max_age_secs
    )
}

fn clear_cookie(share_id: &str) -> String {
    format!(
        "{}=; Max-Age=0; Path=/; HttpOnly; SameSite=Strict",
        share_id
    )
}

enum Access {
    Public,
    /// `stale_cookie`: a cookie was presented but failed re-verification
    Locked { stale_cookie: bool },
    Unlocked,
}

fn evaluate_access(share: &shares::Model, headers: &HeaderMap) -> Result<Access, AppError> {
    if !share.private {
        return Ok(Access::Public);
    }

    match (find_cookie(headers, &share.id), &share.code) {
        (Some(value), Some(hash)) => {
            if ShareService::verify_access_code(&value, hash)? {
                Ok(Access::Unlocked)
            } else {
                Ok(Access::Locked { stale_cookie: true })
            }
        }
        (Some(_), None) => Ok(Access::Locked { stale_cookie: true }),
        (None, _) => Ok(Access::Locked {
            stale_cookie: false,
        }),
    }
}

async fn share_response(
    db: &sea_orm::DatabaseConnection,
    share: shares::Model,
    locked: bool,
) -> Result<ShareInfoResponse, AppError> {
    let (files, total_size) = if locked {
        (None, None)
    } else {
        let (files, total) = ShareService::files_for_share(db, &share.id).await?;
        let entries = files
            .into_iter()
            .map(|f| ShareFileEntry {
                id: f.id,
                file_name: f.file_name,
                size: f.size,
            })
            .collect();
        (Some(entries), Some(total))
    };

    Ok(ShareInfoResponse {
        id: share.id,
        slug: share.slug,
        private: share.private,
        locked,
        visibility: share.visibility,
        created_at: share.created_at,
        updated_at: share.updated_at,
        expires_at: share.expires_at,
        files,
        total_size,
    })
}

// ── Handlers ──────────────────────────────────────────────────────────

/// Resolve a share by slug
#[utoipa::path(
    get,
    path = "/share/{slug}",
    params(("slug" = String, Path, description = "Share slug")),
    responses(
        (status = 200, description = "Share info; file list withheld while locked", body = ShareInfoResponse),
        (status = 404, description = "Share not found"),
        (status = 410, description = "Share expired")
    ),
    tag = "shares"
)]
pub async fn resolve_share(
    State(state): State<crate::AppState>,
    Path(slug): Path<String>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let share = ShareService::resolve_by_slug(&state.db, &slug, Utc::now()).await?;

    match evaluate_access(&share, &headers)? {
        Access::Public | Access::Unlocked => {
            let body = share_response(&state.db, share, false).await?;
            Ok(Json(body).into_response())
        }
        Access::Locked { stale_cookie } => {
            let share_id = share.id.clone();
            let body = share_response(&state.db, share, true).await?;
            let mut response = Json(body).into_response();
            if stale_cookie
                && let Ok(value) = HeaderValue::from_str(&clear_cookie(&share_id))
            {
                response.headers_mut().append(header::SET_COOKIE, value);
            }
            Ok(response)
        }
    }
}

/// Unlock a private share with its access code
#[utoipa::path(
    post,
    path = "/share/{slug}/unlock",
    params(("slug" = String, Path, description = "Share slug")),
    request_body = UnlockShareRequest,
    responses(
        (status = 200, description = "Unlocked; session cookie set", body = ShareInfoResponse),
        (status = 403, description = "Wrong access code"),
        (status = 404, description = "Share not found"),
        (status = 410, description = "Share expired")
    ),
    tag = "shares"
)]
pub async fn unlock_share(
    State(state): State<crate::AppState>,
    Path(slug): Path<String>,
    Json(req): Json<UnlockShareRequest>,
) -> Result<Response, AppError> {
    let share = ShareService::resolve_by_slug(&state.db, &slug, Utc::now()).await?;

    if !share.private {
        // Nothing to unlock; behave like a plain resolution
        let body = share_response(&state.db, share, false).await?;
        return Ok(Json(body).into_response());
    }

    let hash = share.code.as_deref().ok_or_else(|| {
        // private ⟹ code is a storage invariant; a row violating it is corrupt
        AppError::Internal(format!("private share {} has no access code", share.id))
    })?;

    if !ShareService::verify_access_code(&req.code, hash)? {
        return Err(AppError::Forbidden("Invalid access code".to_string()));
    }

    let cookie = unlock_cookie(
        &share.id,
        &req.code,
        state.config.unlock_cookie_max_age_secs,
    );
    let body = share_response(&state.db, share, false).await?;
    let mut response = Json(body).into_response();
    if let Ok(value) = HeaderValue::from_str(&cookie) {
        response.headers_mut().append(header::SET_COOKIE, value);
    }
    Ok(response)
}

/// Obtain a presigned download URL for one file of a share
#[utoipa::path(
    get,
    path = "/share/{slug}/files/{file_name}",
    params(
        ("slug" = String, Path, description = "Share slug"),
        ("file_name" = String, Path, description = "File name within the share")
    ),
    responses(
        (status = 200, description = "Short-lived download URL", body = DownloadUrlResponse),
        (status = 403, description = "Share is locked"),
        (status = 404, description = "Share or file not found"),
        (status = 410, description = "Share expired")
    ),
    tag = "shares"
)]
pub async fn download_file(
    State(state): State<crate::AppState>,
    Path((slug, file_name)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<Json<DownloadUrlResponse>, AppError> {
    let share = ShareService::resolve_by_slug(&state.db, &slug, Utc::now()).await?;

    if let Access::Locked { .. } = evaluate_access(&share, &headers)? {
        return Err(AppError::Forbidden("Access code required".to_string()));
    }

    let file = UploadedFiles::find()
        .filter(uploaded_files::Column::ShareId.eq(&share.id))
        .filter(uploaded_files::Column::FileName.eq(&file_name))
        .one(&state.db)
        .await?
        .ok_or(AppError::NotFound("File not found in share".to_string()))?;

    let url = state
        .storage
        .presign_get(&file.storage_path, state.config.download_ttl_secs)
        .await
        .map_err(|e| {
            tracing::error!("Failed to presign download for {}: {}", file.storage_path, e);
            AppError::Unavailable("object storage unavailable".to_string())
        })?;

    Ok(Json(DownloadUrlResponse { file_name, url }))
}

/// Aggregate share usage of the calling user
#[utoipa::path(
    get,
    path = "/users/me/usage",
    responses(
        (status = 200, description = "Share, file and byte totals", body = UserUsageResponse),
        (status = 403, description = "No user identity on the request")
    ),
    tag = "users"
)]
pub async fn user_usage(
    State(state): State<crate::AppState>,
    headers: HeaderMap,
) -> Result<Json<UserUsageResponse>, AppError> {
    let user_id = headers
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .ok_or(AppError::Forbidden("Missing user identity".to_string()))?;

    let usage = ShareService::user_usage(&state.db, user_id).await?;

    Ok(Json(UserUsageResponse {
        share_count: usage.share_count,
        file_count: usage.file_count,
        total_bytes: usage.total_bytes,
    }))
}
