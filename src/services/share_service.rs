use crate::api::error::AppError;
use crate::entities::{prelude::*, *};
use argon2::{
    Argon2,
    password_hash::{PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use base64::Engine;
use chrono::{DateTime, Utc};
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder};

pub struct ShareService;

/// Aggregate usage of one owner across all their live shares
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserUsage {
    pub share_count: u64,
    pub file_count: u64,
    pub total_bytes: i64,
}

impl ShareService {
    /// Generate a URL-safe random slug. The slug doubles as the object-store
    /// key prefix, so the alphabet is restricted to base64url characters.
    pub fn generate_slug() -> String {
        use rand::Rng;
        let mut rng = rand::thread_rng();
        let bytes: Vec<u8> = (0..9).map(|_| rng.r#gen()).collect();
        base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(&bytes)
    }

    /// Hash a share access code using argon2
    pub fn hash_access_code(code: &str) -> Result<String, AppError> {
        let salt = SaltString::generate(&mut OsRng);
        let argon2 = Argon2::default();
        let hash = argon2
            .hash_password(code.as_bytes(), &salt)
            .map_err(|e| AppError::Internal(e.to_string()))?
            .to_string();
        Ok(hash)
    }

    /// Verify an access code against the stored hash. One-way comparison;
    /// the stored value is never decoded back into a code.
    pub fn verify_access_code(code: &str, hash: &str) -> Result<bool, AppError> {
        let argon2 = Argon2::default();
        let parsed_hash =
            argon2::PasswordHash::new(hash).map_err(|e| AppError::Internal(e.to_string()))?;
        Ok(argon2
            .verify_password(code.as_bytes(), &parsed_hash)
            .is_ok())
    }

    /// Look up a share by slug, enforcing time-bounded access: a row whose
    /// expiry has passed but that the sweep has not removed yet is reported
    /// as gone, never served.
    pub async fn resolve_by_slug(
        db: &DatabaseConnection,
        slug: &str,
        now: DateTime<Utc>,
    ) -> Result<shares::Model, AppError> {
        let share = Shares::find()
            .filter(shares::Column::Slug.eq(slug))
            .one(db)
            .await?
            .ok_or(AppError::NotFound("Share not found".to_string()))?;

        if now > share.expires_at {
            return Err(AppError::Gone("Share has expired".to_string()));
        }

        Ok(share)
    }

    /// File list of a share plus the aggregate byte size.
    pub async fn files_for_share(
        db: &DatabaseConnection,
        share_id: &str,
    ) -> Result<(Vec<uploaded_files::Model>, i64), AppError> {
        let files = UploadedFiles::find()
            .filter(uploaded_files::Column::ShareId.eq(share_id))
            .order_by_asc(uploaded_files::Column::FileName)
            .all(db)
            .await?;

        let total_size = files.iter().map(|f| f.size).sum();
        Ok((files, total_size))
    }

    /// Aggregate share/file counts and total bytes owned by one user.
    pub async fn user_usage(
        db: &DatabaseConnection,
        user_id: &str,
    ) -> Result<UserUsage, AppError> {
        let shares = Shares::find()
            .filter(shares::Column::UserId.eq(user_id))
            .all(db)
            .await?;

        let share_ids: Vec<String> = shares.iter().map(|s| s.id.clone()).collect();
        if share_ids.is_empty() {
            return Ok(UserUsage {
                share_count: 0,
                file_count: 0,
                total_bytes: 0,
            });
        }

        let files = UploadedFiles::find()
            .filter(uploaded_files::Column::ShareId.is_in(share_ids))
            .all(db)
            .await?;

        Ok(UserUsage {
            share_count: shares.len() as u64,
            file_count: files.len() as u64,
            total_bytes: files.iter().map(|f| f.size).sum(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_slugs_are_key_safe() {
        for _ in 0..32 {
            let slug = ShareService::generate_slug();
            assert_eq!(slug.len(), 12);
            assert!(
                slug.chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'),
                "unexpected character in slug {slug}"
            );
            assert!(crate::utils::validation::validate_slug(&slug).is_ok());
        }
    }

    #[test]
    fn test_access_code_roundtrip() {
        let hash = ShareService::hash_access_code("hunter2").unwrap();
        assert_ne!(hash, "hunter2");
        assert!(ShareService::verify_access_code("hunter2", &hash).unwrap());
        assert!(!ShareService::verify_access_code("hunter3", &hash).unwrap());
        assert!(!ShareService::verify_access_code("", &hash).unwrap());
    }

    #[test]
    fn test_hashes_are_salted() {
        let first = ShareService::hash_access_code("same-code").unwrap();
        let second = ShareService::hash_access_code("same-code").unwrap();
        assert_ne!(first, second);
    }
}
