//! Handlers for the `/notification-policies` resource.

use axum::extract::{Path, State};
use axum::Json;
use inmo_core::notification::NotificationCategory;
use inmo_core::policy::{NotificationPolicy, PolicyUpdate};

use crate::error::AppResult;
use crate::middleware::tenant::Tenant;
use crate::response::DataResponse;
use crate::state::AppState;

/// GET /api/v1/notification-policies
///
/// Policies the tenant has stored, active or not. Categories without a row
/// use the defaults.
pub async fn list_policies(
    Tenant(me): Tenant,
    State(state): State<AppState>,
) -> AppResult<Json<DataResponse<Vec<NotificationPolicy>>>> {
    let data = state.engine.policies().list(me.tenant_id).await?;
    Ok(Json(DataResponse { data }))
}

/// GET /api/v1/notification-policies/{category}
///
/// The effective policy: the stored one when active, otherwise the default.
pub async fn get_policy(
    Tenant(me): Tenant,
    State(state): State<AppState>,
    Path(category): Path<NotificationCategory>,
) -> AppResult<Json<DataResponse<NotificationPolicy>>> {
    let data = state.engine.policies().resolve(me.tenant_id, category).await?;
    Ok(Json(DataResponse { data }))
}

/// PUT /api/v1/notification-policies
///
/// Create or merge the policy for `category`; only the fields present in the
/// body change. 400 on out-of-range values.
pub async fn upsert_policy(
    Tenant(me): Tenant,
    State(state): State<AppState>,
    Json(input): Json<PolicyUpdate>,
) -> AppResult<Json<DataResponse<NotificationPolicy>>> {
    let data = state.engine.policies().update(me.tenant_id, &input).await?;
    Ok(Json(DataResponse { data }))
}
