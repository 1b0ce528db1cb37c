//! Credential refresh.

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::error::AppResult;
use crate::middleware::tenant::Tenant;
use crate::state::AppState;

/// Response body for a refreshed credential.
#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: &'static str,
    /// Lifetime in seconds.
    pub expires_in: i64,
}

/// POST /api/v1/auth/refresh
///
/// Issue a fresh credential for the identity the current one carries. The
/// tenant and role are copied from the verified claims, never from input.
pub async fn refresh(
    Tenant(me): Tenant,
    State(state): State<AppState>,
) -> AppResult<Json<TokenResponse>> {
    let access_token = state.codec.issue(me.user_id, me.tenant_id, &me.role)?;
    tracing::info!(
        tenant_id = me.tenant_id,
        user_id = me.user_id,
        "Credential refreshed"
    );

    Ok(Json(TokenResponse {
        access_token,
        token_type: "Bearer",
        expires_in: state.codec.lifetime_secs(),
    }))
}
