mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::Utc;
use common::{MockObjectStorage, body_json, build_state, json_request, setup_test_db};
use rust_share_backend::config::AppConfig;
use rust_share_backend::create_app;
use rust_share_backend::entities::shares;
use sea_orm::{ActiveModelTrait, ActiveValue::Set};
use serde_json::json;
use std::sync::Arc;
use tower::ServiceExt;

async fn create_private_share(app: &axum::Router, slug: &str, code: &str) -> String {
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/upload/finalize",
            json!({
                "slug": slug,
                "files": [
                    {"file_name": "doc.pdf", "size": 1000},
                    {"file_name": "notes.txt", "size": 24}
                ],
                "is_private": true,
                "access_code": code,
                "duration": "24"
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    body_json(response).await["share_id"]
        .as_str()
        .unwrap()
        .to_string()
}

fn get_share(slug: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(format!("/share/{}", slug));
    if let Some(cookie) = cookie {
        builder = builder.header("cookie", cookie);
    }
    builder.body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_unknown_slug_is_not_found() {
    let db = setup_test_db().await;
    let state = build_state(db, Arc::new(MockObjectStorage::new()), AppConfig::default());
    let app = create_app(state);

    let response = app.oneshot(get_share("no-such-slug", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_json(response).await;
    assert_eq!(body["kind"], "not_found");
}

#[tokio::test]
async fn test_private_share_unlock_flow() {
    let db = setup_test_db().await;
    let state = build_state(db, Arc::new(MockObjectStorage::new()), AppConfig::default());
    let app = create_app(state);

    let share_id = create_private_share(&app, "vault-drop", "open sesame").await;

    // Locked: metadata only, file list withheld
    let response = app.clone().oneshot(get_share("vault-drop", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["locked"], true);
    assert_eq!(body["private"], true);
    assert_eq!(body["slug"], "vault-drop");
    assert!(body.get("files").is_none());
    assert!(body.get("total_size").is_none());

    // Wrong code stays locked
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/share/vault-drop/unlock",
            json!({"code": "wrong"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body = body_json(response).await;
    assert_eq!(body["kind"], "forbidden");

    // Right code unlocks and sets the share-scoped session cookie
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/share/vault-drop/unlock",
            json!({"code": "open sesame"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let cookie = response
        .headers()
        .get("set-cookie")
        .expect("unlock must set a cookie")
        .to_str()
        .unwrap()
        .to_string();
    assert!(cookie.starts_with(&format!("{}=", share_id)));
    assert!(cookie.contains("Max-Age=1800"));
    assert!(cookie.contains("HttpOnly"));
    assert!(cookie.contains("SameSite=Strict"));

    let body = body_json(response).await;
    assert_eq!(body["locked"], false);
    assert_eq!(body["total_size"], 1024);
    assert_eq!(body["files"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_cookie_reverification_and_tampering() {
    let db = setup_test_db().await;
    let state = build_state(db, Arc::new(MockObjectStorage::new()), AppConfig::default());
    let app = create_app(state);

    let share_id = create_private_share(&app, "cookie-drop", "s3cret").await;

    // A valid cookie carries the unlocked state across requests
    let cookie = format!("{}=s3cret", share_id);
    let response = app
        .clone()
        .oneshot(get_share("cookie-drop", Some(&cookie)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["locked"], false);
    assert!(body["files"].is_array());

    // A tampered cookie value fails re-verification: back to locked,
    // and the stale cookie is deleted
    let tampered = format!("{}=guessed-code", share_id);
    let response = app
        .clone()
        .oneshot(get_share("cookie-drop", Some(&tampered)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let clear = response
        .headers()
        .get("set-cookie")
        .expect("stale cookie must be cleared")
        .to_str()
        .unwrap()
        .to_string();
    assert!(clear.starts_with(&format!("{}=;", share_id)));
    assert!(clear.contains("Max-Age=0"));
    let body = body_json(response).await;
    assert_eq!(body["locked"], true);
    assert!(body.get("files").is_none());
}

#[tokio::test]
async fn test_unlock_public_share_is_plain_resolution() {
    let db = setup_test_db().await;
    let state = build_state(db, Arc::new(MockObjectStorage::new()), AppConfig::default());
    let app = create_app(state);

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/upload/finalize",
            json!({
                "slug": "open-drop",
                "files": [{"file_name": "a.txt", "size": 7}],
                "duration": "24"
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/share/open-drop/unlock",
            json!({"code": "irrelevant"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().get("set-cookie").is_none());
    let body = body_json(response).await;
    assert_eq!(body["locked"], false);
    assert_eq!(body["total_size"], 7);
}

#[tokio::test]
async fn test_download_urls_respect_access_control() {
    let db = setup_test_db().await;
    let storage = Arc::new(MockObjectStorage::new());
    let state = build_state(db, storage, AppConfig::default());
    let app = create_app(state);

    let share_id = create_private_share(&app, "dl-drop", "let-me-in").await;

    // Locked: no URL
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/share/dl-drop/files/doc.pdf")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // Unlocked via cookie: presigned GET for the exact storage path
    let cookie = format!("{}=let-me-in", share_id);
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/share/dl-drop/files/doc.pdf")
                .header("cookie", &cookie)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["file_name"], "doc.pdf");
    assert!(body["url"].as_str().unwrap().contains("dl-drop/doc.pdf"));

    // A file name outside the share is not served
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/share/dl-drop/files/other.bin")
                .header("cookie", &cookie)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_expired_share_is_gone_before_sweep() {
    let db = setup_test_db().await;
    let state = build_state(
        db.clone(),
        Arc::new(MockObjectStorage::new()),
        AppConfig::default(),
    );
    let app = create_app(state);

    // A row past its expiry that the reconciler has not removed yet
    let now = Utc::now();
    shares::ActiveModel {
        id: Set("expired-share-id".to_string()),
        slug: Set("stale-drop".to_string()),
        user_id: Set(None),
        private: Set(false),
        code: Set(None),
        visibility: Set("unlisted".to_string()),
        ip_address: Set(None),
        user_agent: Set(None),
        created_at: Set(now - chrono::Duration::hours(2)),
        updated_at: Set(now - chrono::Duration::hours(2)),
        expires_at: Set(now - chrono::Duration::hours(1)),
    }
    .insert(&db)
    .await
    .unwrap();

    let response = app.oneshot(get_share("stale-drop", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::GONE);
    let body = body_json(response).await;
    assert_eq!(body["kind"], "gone");
}

#[tokio::test]
async fn test_rate_limit_denies_over_budget() {
    let db = setup_test_db().await;
    let config = AppConfig {
        check_points: 3,
        check_window_secs: 60,
        ..AppConfig::default()
    };
    let state = build_state(db, Arc::new(MockObjectStorage::new()), config);
    let app = create_app(state);

    for _ in 0..3 {
        let response = app.clone().oneshot(get_share("whatever", None)).await.unwrap();
        // Budget is consumed even though the share does not exist
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(response.headers().contains_key("x-ratelimit-remaining"));
    }

    let response = app.clone().oneshot(get_share("whatever", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(response.headers().contains_key("retry-after"));
    assert_eq!(
        response.headers().get("x-ratelimit-remaining").unwrap(),
        "0"
    );
    let body = body_json(response).await;
    assert_eq!(body["kind"], "rate_limited");
}

#[tokio::test]
async fn test_user_usage_aggregates_owned_shares() {
    let db = setup_test_db().await;
    let state = build_state(db, Arc::new(MockObjectStorage::new()), AppConfig::default());
    let app = create_app(state);

    for (slug, size) in [("mine-1", 100), ("mine-2", 250)] {
        let mut request = json_request(
            "POST",
            "/upload/finalize",
            json!({
                "slug": slug,
                "files": [{"file_name": "a.bin", "size": size}],
                "duration": "24"
            }),
        );
        request
            .headers_mut()
            .insert("x-user-id", "owner-7".parse().unwrap());
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/users/me/usage")
                .header("x-user-id", "owner-7")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["share_count"], 2);
    assert_eq!(body["file_count"], 2);
    assert_eq!(body["total_bytes"], 350);

    // No identity, no aggregate
    let response = app
        .oneshot(
            Request::builder()
                .uri("/users/me/usage")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}
