use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

/// Result of checking an anti-automation token with the external gate.
#[derive(Debug, Clone)]
pub enum CaptchaVerdict {
    Pass,
    Fail { reason: String },
}

/// External CAPTCHA gate, consumed as a pass/fail oracle. Transport errors
/// are surfaced (not treated as a failed challenge) so callers can answer
/// with a retryable 503 instead of a misleading 403.
#[async_trait]
pub trait CaptchaGate: Send + Sync {
    async fn verify(&self, token: &str, client_ip: &str) -> Result<CaptchaVerdict>;
}

#[derive(Deserialize)]
struct SiteverifyResponse {
    success: bool,
    #[serde(rename = "error-codes", default)]
    error_codes: Vec<String>,
}

/// Turnstile-compatible siteverify client.
pub struct HttpCaptchaGate {
    http: reqwest::Client,
    verify_url: String,
    secret: String,
}

impl HttpCaptchaGate {
    pub fn new(verify_url: String, secret: String, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            verify_url,
            secret,
        })
    }
}

#[async_trait]
impl CaptchaGate for HttpCaptchaGate {
    async fn verify(&self, token: &str, client_ip: &str) -> Result<CaptchaVerdict> {
        let params = [
            ("secret", self.secret.as_str()),
            ("response", token),
            ("remoteip", client_ip),
        ];

        let response: SiteverifyResponse = self
            .http
            .post(&self.verify_url)
            .form(&params)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if response.success {
            Ok(CaptchaVerdict::Pass)
        } else {
            let reason = if response.error_codes.is_empty() {
                "challenge failed".to_string()
            } else {
                response.error_codes.join(", ")
            };
            tracing::debug!(client_ip, %reason, "CAPTCHA verification failed");
            Ok(CaptchaVerdict::Fail { reason })
        }
    }
}

/// Gate used when no CAPTCHA secret is configured (development, tests).
pub struct DisabledCaptchaGate;

#[async_trait]
impl CaptchaGate for DisabledCaptchaGate {
    async fn verify(&self, _token: &str, _client_ip: &str) -> Result<CaptchaVerdict> {
        Ok(CaptchaVerdict::Pass)
    }
}
