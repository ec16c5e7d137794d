use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;

/// Fire-and-forget notification sink for sweep summaries. Delivery failures
/// are swallowed and logged; nothing in the lifecycle depends on them.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn send(&self, text: &str);
}

/// Posts `{"text": ...}` to a configured webhook.
pub struct WebhookNotifier {
    http: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: String, timeout: Duration) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { http, url })
    }
}

#[async_trait]
impl NotificationSink for WebhookNotifier {
    async fn send(&self, text: &str) {
        let result = self
            .http
            .post(&self.url)
            .json(&json!({ "text": text }))
            .send()
            .await;

        match result {
            Ok(response) if !response.status().is_success() => {
                tracing::warn!(status = %response.status(), "Notification webhook rejected message");
            }
            Err(e) => {
                tracing::warn!("Failed to deliver notification: {}", e);
            }
            Ok(_) => {}
        }
    }
}

/// Default sink when no webhook is configured.
pub struct LogNotifier;

#[async_trait]
impl NotificationSink for LogNotifier {
    async fn send(&self, text: &str) {
        tracing::info!("📣 {}", text);
    }
}
