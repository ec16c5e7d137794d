use crate::api::error::AppError;
use crate::config::AppConfig;
use crate::entities::{prelude::*, *};
use crate::services::captcha::{CaptchaGate, CaptchaVerdict};
use crate::services::share_service::ShareService;
use crate::services::storage::ObjectStorage;
use crate::utils::validation::{validate_file_count, validate_file_name, validate_slug};
use chrono::Utc;
use sea_orm::ActiveValue::Set;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Serialize, Deserialize, ToSchema)]
pub struct PresignedFile {
    pub file_name: String,
    pub url: String,
}

#[derive(Serialize, ToSchema)]
pub struct PresignOutcome {
    pub presigned_data: Vec<PresignedFile>,
    pub slug: String,
    pub duration: String,
}

#[derive(Serialize, Deserialize, Clone, ToSchema)]
pub struct FinalizedFile {
    pub file_name: String,
    pub size: i64,
}

/// Request provenance recorded on the share for abuse forensics
#[derive(Debug, Clone, Default)]
pub struct RequestOrigin {
    pub user_id: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// Coordinates the two-phase upload protocol. Phase 1 (presign) issues
/// capability URLs and creates no durable state; phase 2 (finalize) writes
/// the share and its files in one transaction. The server never stores bytes.
pub struct UploadService {
    db: DatabaseConnection,
    storage: Arc<dyn ObjectStorage>,
    captcha: Arc<dyn CaptchaGate>,
    config: AppConfig,
}

impl UploadService {
    pub fn new(
        db: DatabaseConnection,
        storage: Arc<dyn ObjectStorage>,
        captcha: Arc<dyn CaptchaGate>,
        config: AppConfig,
    ) -> Self {
        Self {
            db,
            storage,
            captcha,
            config,
        }
    }

    /// Phase 1: validate the batch, check the anti-automation token, and
    /// issue one presigned PUT per file.
    ///
    /// Validation fails fast, before the CAPTCHA gate or the object store is
    /// contacted. Slug collision with an existing share is tolerated here;
    /// the unique constraint decides at finalize. URLs are issued
    /// concurrently and the call fails as a whole if any single presign
    /// fails.
    pub async fn presign(
        &self,
        slug: Option<String>,
        file_names: Vec<String>,
        is_private: bool,
        access_code: Option<&str>,
        duration: String,
        captcha_token: &str,
        client_ip: &str,
    ) -> Result<PresignOutcome, AppError> {
        if file_names.is_empty() {
            return Err(AppError::Validation(
                "At least one file name is required".to_string(),
            ));
        }
        validate_file_count(file_names.len(), self.config.max_share_files)?;

        let mut seen = HashSet::new();
        for name in &file_names {
            validate_file_name(name)?;
            if !seen.insert(name.as_str()) {
                return Err(AppError::Validation(format!(
                    "Duplicate file name in batch: {}",
                    name
                )));
            }
        }

        if is_private && access_code.unwrap_or("").is_empty() {
            return Err(AppError::Validation(
                "Private shares require an access code".to_string(),
            ));
        }

        let slug = match slug.filter(|s| !s.is_empty()) {
            Some(s) => {
                validate_slug(&s)?;
                s
            }
            None => ShareService::generate_slug(),
        };

        let verdict = self
            .captcha
            .verify(captcha_token, client_ip)
            .await
            .map_err(|e| {
                tracing::error!("CAPTCHA gate unreachable: {}", e);
                AppError::Unavailable("CAPTCHA gate unreachable".to_string())
            })?;
        if let CaptchaVerdict::Fail { reason } = verdict {
            return Err(AppError::Forbidden(format!("CAPTCHA rejected: {}", reason)));
        }

        let ttl = self.config.presign_ttl_secs;
        let presigned_data = futures::future::try_join_all(file_names.iter().map(|name| {
            let key = format!("{}/{}", slug, name);
            let name = name.clone();
            async move {
                let url = self.storage.presign_put(&key, ttl).await?;
                Ok::<_, anyhow::Error>(PresignedFile {
                    file_name: name,
                    url,
                })
            }
        }))
        .await
        .map_err(|e| {
            tracing::error!("Failed to presign upload batch for {}: {}", slug, e);
            AppError::Unavailable("object storage unavailable".to_string())
        })?;

        tracing::debug!(
            %slug,
            files = presigned_data.len(),
            "issued presigned upload batch"
        );

        Ok(PresignOutcome {
            presigned_data,
            slug,
            duration,
        })
    }

    /// Phase 2: record the uploaded batch. Inserts the share row and all of
    /// its file rows in a single transaction; a duplicate slug rolls back and
    /// surfaces as a conflict, never as partial state.
    pub async fn finalize(
        &self,
        slug: String,
        files: Vec<FinalizedFile>,
        is_private: bool,
        access_code: Option<&str>,
        visibility: String,
        duration: String,
        origin: RequestOrigin,
    ) -> Result<String, AppError> {
        validate_slug(&slug)?;
        validate_file_count(files.len(), self.config.max_share_files)?;

        let mut seen = HashSet::new();
        for file in &files {
            validate_file_name(&file.file_name)?;
            if file.size < 0 {
                return Err(AppError::Validation(format!(
                    "Negative size for file {}",
                    file.file_name
                )));
            }
            if !seen.insert(file.file_name.as_str()) {
                return Err(AppError::Validation(format!(
                    "Duplicate file name in batch: {}",
                    file.file_name
                )));
            }
        }

        // Invariant: private ⟺ stored code hash present
        let code = match (is_private, access_code.unwrap_or("")) {
            (true, "") => {
                return Err(AppError::Validation(
                    "Private shares require an access code".to_string(),
                ));
            }
            (true, code) => Some(ShareService::hash_access_code(code)?),
            (false, _) => None,
        };

        let now = Utc::now();
        let expires_at = now + chrono::Duration::milliseconds(self.config.duration_ms(&duration));
        let share_id = Uuid::new_v4().to_string();

        let share = shares::ActiveModel {
            id: Set(share_id.clone()),
            slug: Set(slug.clone()),
            user_id: Set(origin.user_id),
            private: Set(is_private),
            code: Set(code),
            visibility: Set(visibility),
            ip_address: Set(origin.ip_address),
            user_agent: Set(origin.user_agent),
            created_at: Set(now),
            updated_at: Set(now),
            expires_at: Set(expires_at),
        };

        let file_rows: Vec<uploaded_files::ActiveModel> = files
            .iter()
            .map(|f| uploaded_files::ActiveModel {
                id: Set(Uuid::new_v4().to_string()),
                share_id: Set(share_id.clone()),
                file_name: Set(f.file_name.clone()),
                size: Set(f.size),
                storage_path: Set(format!("{}/{}", slug, f.file_name)),
            })
            .collect();

        let txn_result = self
            .db
            .transaction::<_, (), sea_orm::DbErr>(|txn| {
                Box::pin(async move {
                    share.insert(txn).await?;
                    for row in file_rows {
                        row.insert(txn).await?;
                    }
                    Ok(())
                })
            })
            .await;

        match txn_result {
            Ok(()) => {
                tracing::info!(%share_id, %slug, files = files.len(), "share finalized");
                Ok(share_id)
            }
            Err(sea_orm::TransactionError::Transaction(e)) => {
                if matches!(
                    e.sql_err(),
                    Some(sea_orm::SqlErr::UniqueConstraintViolation(_))
                ) {
                    Err(AppError::Conflict(format!(
                        "Slug '{}' is already taken",
                        slug
                    )))
                } else {
                    Err(AppError::Database(e))
                }
            }
            Err(sea_orm::TransactionError::Connection(e)) => Err(AppError::Database(e)),
        }
    }

    /// Cancels an upload by slug. Refused once any file row references the
    /// slug (the upload is complete or in progress); otherwise a no-op, since
    /// presign creates no durable record. Objects already written under the
    /// prefix are left for the reclamation sweeps.
    pub async fn cancel(&self, slug: &str) -> Result<(), AppError> {
        let share = Shares::find()
            .filter(shares::Column::Slug.eq(slug))
            .one(&self.db)
            .await?;

        if let Some(share) = share {
            let file_count = UploadedFiles::find()
                .filter(uploaded_files::Column::ShareId.eq(&share.id))
                .count(&self.db)
                .await?;
            if file_count > 0 {
                return Err(AppError::Conflict(
                    "Upload already finalized for this slug".to_string(),
                ));
            }
        }

        Ok(())
    }
}
