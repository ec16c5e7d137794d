pub mod api;
pub mod config;
pub mod entities;
pub mod infrastructure;
pub mod services;
pub mod utils;

use crate::api::middleware::rate_limit::{RateLimitContext, rate_limit_middleware};
use crate::config::AppConfig;
use crate::services::rate_limit::{ActionClass, RateLimiter};
use crate::services::storage::ObjectStorage;
use crate::services::upload_service::UploadService;
use axum::{
    Router,
    http::{Method, header},
    middleware::{from_fn, from_fn_with_state},
    routing::{delete, get, post},
};
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        api::handlers::health::health_check,
        api::handlers::upload::presign_upload,
        api::handlers::upload::finalize_upload,
        api::handlers::upload::cancel_upload,
        api::handlers::shares::resolve_share,
        api::handlers::shares::unlock_share,
        api::handlers::shares::download_file,
        api::handlers::shares::user_usage,
    ),
    components(
        schemas(
            api::handlers::health::HealthResponse,
            api::handlers::upload::PresignRequest,
            api::handlers::upload::FinalizeRequest,
            api::handlers::upload::FinalizeResponse,
            api::handlers::shares::ShareInfoResponse,
            api::handlers::shares::ShareFileEntry,
            api::handlers::shares::UnlockShareRequest,
            api::handlers::shares::DownloadUrlResponse,
            api::handlers::shares::UserUsageResponse,
            services::upload_service::PresignOutcome,
            services::upload_service::PresignedFile,
            services::upload_service::FinalizedFile,
        )
    ),
    tags(
        (name = "upload", description = "Two-phase upload endpoints"),
        (name = "shares", description = "Share resolution and access control"),
        (name = "system", description = "Health and diagnostics")
    )
)]
pub struct ApiDoc;

#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub storage: Arc<dyn ObjectStorage>,
    pub upload_service: Arc<UploadService>,
    pub limiter: Arc<RateLimiter>,
    pub config: AppConfig,
}

pub fn create_app(state: AppState) -> Router {
    let limit = |class: ActionClass| RateLimitContext {
        limiter: state.limiter.clone(),
        class,
    };
    let upload_limit = limit(ActionClass::Upload);
    let default_limit = limit(ActionClass::Default);
    let auth_limit = limit(ActionClass::Auth);
    let check_limit = limit(ActionClass::Check);

    let origins: Vec<axum::http::HeaderValue> = state
        .config
        .allowed_origins
        .iter()
        .filter_map(|o| o.parse().ok())
        .collect();

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/health", get(api::handlers::health::health_check))
        .route(
            "/upload/presign",
            post(api::handlers::upload::presign_upload).layer(from_fn_with_state(
                upload_limit.clone(),
                rate_limit_middleware,
            )),
        )
        .route(
            "/upload/finalize",
            post(api::handlers::upload::finalize_upload).layer(from_fn_with_state(
                upload_limit,
                rate_limit_middleware,
            )),
        )
        .route(
            "/upload/:slug",
            delete(api::handlers::upload::cancel_upload).layer(from_fn_with_state(
                default_limit.clone(),
                rate_limit_middleware,
            )),
        )
        .route(
            "/share/:slug",
            get(api::handlers::shares::resolve_share).layer(from_fn_with_state(
                check_limit.clone(),
                rate_limit_middleware,
            )),
        )
        .route(
            "/share/:slug/unlock",
            post(api::handlers::shares::unlock_share).layer(from_fn_with_state(
                auth_limit,
                rate_limit_middleware,
            )),
        )
        .route(
            "/share/:slug/files/:file_name",
            get(api::handlers::shares::download_file).layer(from_fn_with_state(
                check_limit,
                rate_limit_middleware,
            )),
        )
        .route(
            "/users/me/usage",
            get(api::handlers::shares::user_usage).layer(from_fn_with_state(
                default_limit,
                rate_limit_middleware,
            )),
        )
        .layer(from_fn(api::middleware::security::security_headers))
        .layer(from_fn(api::middleware::request_id::request_id_middleware))
        .layer(
            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods([Method::GET, Method::POST, Method::DELETE])
                .allow_headers([header::CONTENT_TYPE])
                .allow_credentials(true),
        )
        .with_state(state)
}
