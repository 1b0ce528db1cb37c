#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{Method, Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use inmo_core::notification::NotificationType;
use inmo_core::roles::ROLE_AGENT;
use inmo_core::types::DbId;
use inmo_notifications::{
    ChannelSenders, DispatchConfig, LogSender, MemoryNotificationStore, MemoryPolicyStore,
    NotificationEngine, PolicyResolver, SweepConfig,
};
use tower::ServiceExt;

use inmo_api::auth::jwt::{JwtConfig, TokenCodec};
use inmo_api::config::ServerConfig;
use inmo_api::router::build_app_router;
use inmo_api::state::AppState;

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        jwt: JwtConfig {
            secret: "integration-test-secret-long-enough".to_string(),
            expiry_mins: 15,
        },
        dispatch: DispatchConfig::default(),
        sweep: SweepConfig::default(),
        sweep_enabled: false,
    }
}

/// The full application router over in-memory stores.
///
/// Only the email channel has a sender; WhatsApp and SMS deliveries fail
/// with an unsupported-channel transport error.
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
}

impl TestApp {
    pub fn app(&self) -> Router {
        self.router.clone()
    }

    /// A valid credential for `user_id` acting in `tenant_id`.
    pub fn token(&self, tenant_id: DbId, user_id: DbId) -> String {
        self.state
            .codec
            .issue(user_id, tenant_id, ROLE_AGENT)
            .expect("token issuing should succeed")
    }
}

pub fn build_test_app() -> TestApp {
    let config = test_config();
    let senders = ChannelSenders::new().with(NotificationType::Email, Arc::new(LogSender));
    let engine = Arc::new(NotificationEngine::new(
        Arc::new(MemoryNotificationStore::new()),
        PolicyResolver::new(Arc::new(MemoryPolicyStore::new())),
        Arc::new(senders),
        config.dispatch,
    ));

    let state = AppState {
        pool: None,
        codec: Arc::new(TokenCodec::new(&config.jwt)),
        config: Arc::new(config),
        engine,
    };

    TestApp {
        router: build_app_router(state.clone()),
        state,
    }
}

// ---------------------------------------------------------------------------
// Request helpers
// ---------------------------------------------------------------------------

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body should be readable")
        .to_bytes();
    serde_json::from_slice(&bytes).expect("body should be JSON")
}

async fn send(
    app: Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<serde_json::Value>,
) -> Response<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
    }
    let request = match body {
        Some(json) => builder
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string())),
        None => builder.body(Body::empty()),
    }
    .expect("request should build");

    app.oneshot(request).await.expect("router is infallible")
}

pub async fn get(app: Router, uri: &str) -> Response<Body> {
    send(app, Method::GET, uri, None, None).await
}

pub async fn get_auth(app: Router, uri: &str, token: &str) -> Response<Body> {
    send(app, Method::GET, uri, Some(token), None).await
}

pub async fn post_auth(app: Router, uri: &str, token: &str) -> Response<Body> {
    send(app, Method::POST, uri, Some(token), None).await
}

pub async fn post_json(app: Router, uri: &str, body: serde_json::Value) -> Response<Body> {
    send(app, Method::POST, uri, None, Some(body)).await
}

pub async fn post_json_auth(
    app: Router,
    uri: &str,
    body: serde_json::Value,
    token: &str,
) -> Response<Body> {
    send(app, Method::POST, uri, Some(token), Some(body)).await
}

pub async fn put_json_auth(
    app: Router,
    uri: &str,
    body: serde_json::Value,
    token: &str,
) -> Response<Body> {
    send(app, Method::PUT, uri, Some(token), Some(body)).await
}

/// A payment reminder body for person 7 about contract `reference_id`.
pub fn reminder(reference_id: DbId) -> serde_json::Value {
    serde_json::json!({
        "person_id": 7,
        "notification_type": "EMAIL",
        "category": "PAGO_PENDIENTE",
        "destination": "ana@example.com",
        "subject": "Recordatorio de pago",
        "body": "Su pago vence pronto",
        "reference_type": "CONTRATO",
        "reference_id": reference_id,
    })
}
