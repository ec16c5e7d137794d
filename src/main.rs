use clap::Parser;
use dotenvy::dotenv;
use rust_share_backend::config::AppConfig;
use rust_share_backend::infrastructure::{counters, database, storage};
use rust_share_backend::services::captcha::{CaptchaGate, DisabledCaptchaGate, HttpCaptchaGate};
use rust_share_backend::services::lifecycle::LifecycleService;
use rust_share_backend::services::notify::{LogNotifier, NotificationSink, WebhookNotifier};
use rust_share_backend::services::rate_limit::RateLimiter;
use rust_share_backend::services::upload_service::UploadService;
use rust_share_backend::{AppState, create_app};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Service type to run (api, cron, all)
    #[arg(short, long, default_value = "all")]
    mode: String,

    /// Port for the API server
    #[arg(short, long, default_value_t = 3000)]
    port: u16,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Initial Environment & Logging Setup
    dotenv().ok();
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rust_share_backend=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("🚀 Starting Rust Share Backend [Mode: {}]...", args.mode);

    // 2. Setup Common Infrastructure
    let config = AppConfig::from_env();
    info!(
        "🛡️  Config: Max Files/Share={}, Presign TTL={}s, Sweep Interval={}s",
        config.max_share_files, config.presign_ttl_secs, config.sweep_interval_secs
    );

    let db = database::setup_database().await?;
    let storage_service = storage::setup_storage(&config).await;

    let counter_store = counters::setup_counter_store(&config).await?;
    let limiter = Arc::new(RateLimiter::new(counter_store, &config));

    let captcha: Arc<dyn CaptchaGate> = match &config.captcha_secret {
        Some(secret) => {
            info!("🤖 CAPTCHA gate: enabled ({})", config.captcha_verify_url);
            Arc::new(HttpCaptchaGate::new(
                config.captcha_verify_url.clone(),
                secret.clone(),
                Duration::from_secs(config.external_timeout_secs),
            )?)
        }
        None => {
            info!("🤖 CAPTCHA gate: disabled");
            Arc::new(DisabledCaptchaGate)
        }
    };

    let notifier: Arc<dyn NotificationSink> = match &config.notify_webhook_url {
        Some(url) => Arc::new(WebhookNotifier::new(
            url.clone(),
            Duration::from_secs(config.external_timeout_secs),
        )?),
        None => Arc::new(LogNotifier),
    };

    // 3. Setup Graceful Shutdown Channel
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let mut handles = Vec::new();

    // 4. Initialize Lifecycle Sweeps
    if args.mode == "cron" || args.mode == "all" {
        let lifecycle = Arc::new(LifecycleService::new(
            db.clone(),
            storage_service.clone(),
            notifier.clone(),
            Duration::from_secs(config.sweep_interval_secs),
        ));
        handles.push(lifecycle.start(shutdown_rx.clone()));
        info!("🧹 Lifecycle sweeps scheduled.");
    }

    // 5. Initialize API Service
    if args.mode == "api" || args.mode == "all" {
        let upload_service = Arc::new(UploadService::new(
            db.clone(),
            storage_service.clone(),
            captcha,
            config.clone(),
        ));

        let state = AppState {
            db: db.clone(),
            storage: storage_service.clone(),
            upload_service,
            limiter,
            config: config.clone(),
        };

        // Configure tracing layer for HTTP requests
        let trace_layer = TraceLayer::new_for_http()
            .make_span_with(|request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("unknown");
                tracing::info_span!(
                    "http_request",
                    method = %request.method(),
                    uri = %request.uri(),
                    request_id = %request_id,
                )
            })
            .on_request(|request: &axum::http::Request<_>, _span: &tracing::Span| {
                info!("📥 {} {}", request.method(), request.uri());
            })
            .on_response(
                |response: &axum::http::Response<_>,
                 latency: std::time::Duration,
                 _span: &tracing::Span| {
                    info!(
                        "📤 Finished in {:?} with status {}",
                        latency,
                        response.status()
                    );
                },
            );

        let app = create_app(state).layer(trace_layer);
        let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
        let listener = tokio::net::TcpListener::bind(addr).await?;

        info!("✅ API Server listening on: http://0.0.0.0:{}", args.port);
        info!(
            "📖 Swagger UI documentation: http://localhost:{}/swagger-ui",
            args.port
        );

        let server_handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    shutdown_signal().await;
                })
                .await
            {
                error!("❌ Server runtime error: {}", e);
            }
        });
        handles.push(server_handle);
    }

    // 6. Wait for Shutdown Signal
    shutdown_signal().await;
    let _ = shutdown_tx.send(true);

    info!("🛑 Shutting down backend services...");

    for handle in handles {
        let _ = handle.await;
    }

    info!("👋 Backend exited cleanly.");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("⌨️  Ctrl+C received, initiating graceful shutdown...");
        },
        _ = terminate => {
            info!("💤 SIGTERM received, initiating graceful shutdown...");
        },
    }
}
