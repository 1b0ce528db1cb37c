use std::sync::Arc;

use inmo_notifications::NotificationEngine;

use crate::auth::jwt::TokenCodec;
use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc` or is already `Clone`).
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool; `None` when running on in-memory stores.
    pub pool: Option<inmo_db::DbPool>,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Credential issuing and verification.
    pub codec: Arc<TokenCodec>,
    /// Notification creation, delivery, and policy resolution.
    pub engine: Arc<NotificationEngine>,
}
