#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, Response};
use http_body_util::BodyExt;
use rust_share_backend::AppState;
use rust_share_backend::config::AppConfig;
use rust_share_backend::infrastructure::database;
use rust_share_backend::services::captcha::DisabledCaptchaGate;
use rust_share_backend::services::notify::NotificationSink;
use rust_share_backend::services::rate_limit::{MemoryCounterStore, RateLimiter};
use rust_share_backend::services::storage::ObjectStorage;
use rust_share_backend::services::upload_service::UploadService;
use sea_orm::Database;
use serde_json::Value;
use std::collections::{BTreeSet, HashSet};
use std::sync::{Arc, Mutex};

pub async fn setup_test_db() -> sea_orm::DatabaseConnection {
    unsafe {
        std::env::set_var("DATABASE_URL", "sqlite::memory:");
    }
    let db = Database::connect("sqlite::memory:").await.unwrap();
    database::run_migrations(&db).await.unwrap();
    db
}

/// In-memory stand-in for the object store. Tracks issued presigns and held
/// keys; deletion failures can be injected per prefix to exercise the
/// best-effort sweep paths.
#[derive(Default)]
pub struct MockObjectStorage {
    keys: Mutex<BTreeSet<String>>,
    presigned_puts: Mutex<Vec<String>>,
    failing_prefixes: Mutex<HashSet<String>>,
}

impl MockObjectStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_object(&self, key: &str) {
        self.keys.lock().unwrap().insert(key.to_string());
    }

    pub fn contains(&self, key: &str) -> bool {
        self.keys.lock().unwrap().contains(key)
    }

    pub fn key_count(&self) -> usize {
        self.keys.lock().unwrap().len()
    }

    pub fn presigned_put_keys(&self) -> Vec<String> {
        self.presigned_puts.lock().unwrap().clone()
    }

    pub fn fail_deletes_under(&self, prefix: &str) {
        self.failing_prefixes
            .lock()
            .unwrap()
            .insert(prefix.to_string());
    }

    pub fn clear_delete_failures(&self) {
        self.failing_prefixes.lock().unwrap().clear();
    }
}

#[async_trait]
impl ObjectStorage for MockObjectStorage {
    async fn presign_put(&self, key: &str, _ttl_secs: u64) -> Result<String> {
        self.presigned_puts.lock().unwrap().push(key.to_string());
        Ok(format!(
            "http://mock-s3.local/test-bucket/{}?X-Amz-Signature=mock",
            key
        ))
    }

    async fn presign_get(&self, key: &str, _ttl_secs: u64) -> Result<String> {
        Ok(format!(
            "http://mock-s3.local/test-bucket/{}?X-Amz-Signature=mock-get",
            key
        ))
    }

    async fn delete_object(&self, key: &str) -> Result<()> {
        let failing = self.failing_prefixes.lock().unwrap();
        if failing.iter().any(|p| key.starts_with(p.as_str())) {
            return Err(anyhow::anyhow!("injected delete failure for {}", key));
        }
        drop(failing);
        self.keys.lock().unwrap().remove(key);
        Ok(())
    }

    async fn list_objects(&self, prefix: Option<&str>) -> Result<Vec<String>> {
        let keys = self.keys.lock().unwrap();
        Ok(keys
            .iter()
            .filter(|k| prefix.is_none_or(|p| k.starts_with(p)))
            .cloned()
            .collect())
    }

    async fn object_exists(&self, key: &str) -> Result<bool> {
        Ok(self.keys.lock().unwrap().contains(key))
    }
}

/// Notification sink that records every message for assertions.
#[derive(Default)]
pub struct CollectingNotifier {
    pub messages: Mutex<Vec<String>>,
}

#[async_trait]
impl NotificationSink for CollectingNotifier {
    async fn send(&self, text: &str) {
        self.messages.lock().unwrap().push(text.to_string());
    }
}

pub fn build_state(
    db: sea_orm::DatabaseConnection,
    storage: Arc<MockObjectStorage>,
    config: AppConfig,
) -> AppState {
    let limiter = Arc::new(RateLimiter::new(
        Arc::new(MemoryCounterStore::new()),
        &config,
    ));
    let upload_service = Arc::new(UploadService::new(
        db.clone(),
        storage.clone(),
        Arc::new(DisabledCaptchaGate),
        config.clone(),
    ));

    AppState {
        db,
        storage,
        upload_service,
        limiter,
        config,
    }
}

pub fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
