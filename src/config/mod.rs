use std::env;

/// Runtime configuration for the share service
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Maximum number of files accepted per share (default: 50)
    pub max_share_files: usize,

    /// TTL of presigned PUT URLs in seconds (default: 200)
    pub presign_ttl_secs: u64,

    /// TTL of presigned GET URLs handed out for downloads (default: 300)
    pub download_ttl_secs: u64,

    /// Max-Age of the per-share unlock cookie in seconds (default: 1800)
    pub unlock_cookie_max_age_secs: u64,

    /// Expiry for duration class "24" in milliseconds (default: 24h)
    pub duration_day_ms: i64,
    /// Expiry for duration class "168" in milliseconds (default: 7 days)
    pub duration_week_ms: i64,
    /// Expiry for every other duration value in milliseconds (default: 30min)
    pub duration_default_ms: i64,

    /// Interval between lifecycle sweep runs in seconds (default: 900)
    pub sweep_interval_secs: u64,

    /// Timeout applied to counter store / CAPTCHA / webhook calls (default: 5)
    pub external_timeout_secs: u64,

    /// Rate limit budgets per action class: {points, window seconds}
    pub upload_points: u32,
    pub upload_window_secs: u64,
    pub default_points: u32,
    pub default_window_secs: u64,
    pub auth_points: u32,
    pub auth_window_secs: u64,
    pub check_points: u32,
    pub check_window_secs: u64,

    /// Redis connection URL for the shared rate-limit counter store.
    /// Unset: counters are kept in process memory (single-instance deployments).
    pub redis_url: Option<String>,

    /// CAPTCHA verification endpoint (Turnstile-compatible siteverify shape)
    pub captcha_verify_url: String,
    /// CAPTCHA secret key. Unset: the gate is disabled and every token passes.
    pub captcha_secret: Option<String>,

    /// Webhook URL for sweep notifications. Unset: notifications go to the log.
    pub notify_webhook_url: Option<String>,

    /// Allowed CORS Origins (comma separated)
    pub allowed_origins: Vec<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            max_share_files: 50,
            presign_ttl_secs: 200,
            download_ttl_secs: 300,
            unlock_cookie_max_age_secs: 1800,
            duration_day_ms: 24 * 60 * 60 * 1000,
            duration_week_ms: 7 * 24 * 60 * 60 * 1000,
            duration_default_ms: 30 * 60 * 1000,
            sweep_interval_secs: 900,
            external_timeout_secs: 5,
            upload_points: 20,
            upload_window_secs: 3600,
            default_points: 60,
            default_window_secs: 60,
            auth_points: 10,
            auth_window_secs: 900,
            check_points: 120,
            check_window_secs: 60,
            redis_url: None,
            captcha_verify_url: "https://challenges.cloudflare.com/turnstile/v0/siteverify"
                .to_string(),
            captcha_secret: None,
            notify_webhook_url: None,
            allowed_origins: vec![
                "http://localhost:3000".to_string(),
                "http://localhost:5173".to_string(), // Vite default
                "http://127.0.0.1:3000".to_string(),
            ],
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, fallback: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(fallback)
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            max_share_files: env_parse("MAX_SHARE_FILES", default.max_share_files),
            presign_ttl_secs: env_parse("PRESIGN_TTL_SECS", default.presign_ttl_secs),
            download_ttl_secs: env_parse("DOWNLOAD_TTL_SECS", default.download_ttl_secs),
            unlock_cookie_max_age_secs: env_parse(
                "UNLOCK_COOKIE_MAX_AGE_SECS",
                default.unlock_cookie_max_age_secs,
            ),
            duration_day_ms: env_parse("DURATION_DAY_MS", default.duration_day_ms),
            duration_week_ms: env_parse("DURATION_WEEK_MS", default.duration_week_ms),
            duration_default_ms: env_parse("DURATION_DEFAULT_MS", default.duration_default_ms),
            sweep_interval_secs: env_parse("SWEEP_INTERVAL_SECS", default.sweep_interval_secs),
            external_timeout_secs: env_parse(
                "EXTERNAL_TIMEOUT_SECS",
                default.external_timeout_secs,
            ),
            upload_points: env_parse("RATE_UPLOAD_POINTS", default.upload_points),
            upload_window_secs: env_parse("RATE_UPLOAD_WINDOW_SECS", default.upload_window_secs),
            default_points: env_parse("RATE_DEFAULT_POINTS", default.default_points),
            default_window_secs: env_parse("RATE_DEFAULT_WINDOW_SECS", default.default_window_secs),
            auth_points: env_parse("RATE_AUTH_POINTS", default.auth_points),
            auth_window_secs: env_parse("RATE_AUTH_WINDOW_SECS", default.auth_window_secs),
            check_points: env_parse("RATE_CHECK_POINTS", default.check_points),
            check_window_secs: env_parse("RATE_CHECK_WINDOW_SECS", default.check_window_secs),
            redis_url: env::var("REDIS_URL").ok(),
            captcha_verify_url: env::var("CAPTCHA_VERIFY_URL")
                .unwrap_or(default.captcha_verify_url),
            captcha_secret: env::var("CAPTCHA_SECRET").ok(),
            notify_webhook_url: env::var("NOTIFY_WEBHOOK_URL").ok(),
            allowed_origins: env::var("ALLOWED_ORIGINS")
                .ok()
                .map(|v| v.split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or(default.allowed_origins),
        }
    }

    /// Maps a caller-selected duration class to share lifetime in milliseconds.
    /// The table is a closed enumeration: "24" and "168" are the only named
    /// classes, everything else falls back to the short default window.
    pub fn duration_ms(&self, duration: &str) -> i64 {
        match duration {
            "24" => self.duration_day_ms,
            "168" => self.duration_week_ms,
            _ => self.duration_default_ms,
        }
    }
}
