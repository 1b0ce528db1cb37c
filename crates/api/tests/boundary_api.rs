//! HTTP-level tests for credential verification and tenant isolation.

mod common;

use axum::http::StatusCode;
use chrono::{Duration, Utc};
use common::{body_json, build_test_app, get, get_auth, post_auth, post_json, post_json_auth, reminder};
use inmo_core::roles::ROLE_ADMIN;

// ---------------------------------------------------------------------------
// Public routes
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_health_needs_no_credential() {
    let app = build_test_app();
    let response = get(app.app(), "/health").await;

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().get("x-request-id").is_some());
    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
    assert!(json["version"].is_string());
}

#[tokio::test]
async fn test_unknown_route_returns_404() {
    let app = build_test_app();
    let response = get(app.app(), "/this-route-does-not-exist").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

// ---------------------------------------------------------------------------
// Credential rejection
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_missing_credential_is_rejected() {
    let app = build_test_app();
    let response = get(app.app(), "/api/v1/notifications").await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let json = body_json(response).await;
    assert_eq!(json["code"], "INVALID_CREDENTIAL");
}

#[tokio::test]
async fn test_tampered_credential_is_rejected() {
    let app = build_test_app();
    let mine = app.token(1, 10);
    let theirs = app.token(2, 20);

    let a: Vec<&str> = mine.split('.').collect();
    let b: Vec<&str> = theirs.split('.').collect();
    let forged = format!("{}.{}.{}", a[0], b[1], a[2]);

    let response = get_auth(app.app(), "/api/v1/notifications", &forged).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_expired_credential_is_rejected() {
    let app = build_test_app();
    let issued_long_ago = Utc::now() - Duration::hours(1);
    let token = app
        .state
        .codec
        .issue_at(10, 1, ROLE_ADMIN, issued_long_ago)
        .unwrap();

    let response = get_auth(app.app(), "/api/v1/notifications", &token).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_rejected_request_creates_nothing() {
    let app = build_test_app();
    let response = post_json(app.app(), "/api/v1/notifications", reminder(42)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let token = app.token(1, 10);
    let json = body_json(get_auth(app.app(), "/api/v1/notifications/summary", &token).await).await;
    assert_eq!(json["data"]["total"], 0);
}

// ---------------------------------------------------------------------------
// Tenant isolation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_tenant_comes_from_credential_not_body() {
    let app = build_test_app();
    let token = app.token(1, 10);

    let mut body = reminder(42);
    body["tenant_id"] = serde_json::json!(2);
    let response = post_json_auth(app.app(), "/api/v1/notifications", body, &token).await;

    assert_eq!(response.status(), StatusCode::CREATED);
    let json = body_json(response).await;
    assert_eq!(json["data"]["tenant_id"], 1);
}

#[tokio::test]
async fn test_other_tenant_cannot_see_or_touch_notification() {
    let app = build_test_app();
    let owner = app.token(1, 10);
    let intruder = app.token(2, 20);

    let created = body_json(
        post_json_auth(app.app(), "/api/v1/notifications", reminder(42), &owner).await,
    )
    .await;
    let id = created["data"]["id"].as_i64().unwrap();

    let uri = format!("/api/v1/notifications/{id}");
    assert_eq!(
        get_auth(app.app(), &uri, &intruder).await.status(),
        StatusCode::NOT_FOUND
    );
    assert_eq!(
        post_auth(app.app(), &format!("{uri}/cancel"), &intruder)
            .await
            .status(),
        StatusCode::NOT_FOUND
    );
    assert_eq!(
        post_auth(app.app(), &format!("{uri}/send"), &intruder)
            .await
            .status(),
        StatusCode::NOT_FOUND
    );

    let listed = body_json(get_auth(app.app(), "/api/v1/notifications", &intruder).await).await;
    assert_eq!(listed["data"].as_array().unwrap().len(), 0);

    let still_pending = body_json(get_auth(app.app(), &uri, &owner).await).await;
    assert_eq!(still_pending["data"]["state"], "PENDIENTE");
}

// ---------------------------------------------------------------------------
// Refresh
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_refresh_issues_credential_for_same_identity() {
    let app = build_test_app();
    let token = app.token(3, 30);

    let response = post_auth(app.app(), "/api/v1/auth/refresh", &token).await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["token_type"], "Bearer");
    assert_eq!(json["expires_in"], 15 * 60);

    let fresh = json["access_token"].as_str().unwrap();
    let claims = app.state.codec.verify(fresh).unwrap();
    assert_eq!(claims.tenant_id, 3);
    assert_eq!(claims.sub, 30);
}
