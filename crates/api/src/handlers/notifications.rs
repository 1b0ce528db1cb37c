//! Handlers for the `/notifications` resource.
//!
//! Every handler is scoped to the tenant of the verified credential.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use inmo_core::notification::{CreateNotificationRequest, NotificationCategory, NotificationState};
use inmo_core::types::DbId;
use inmo_db::models::notification::Notification;
use inmo_notifications::NotificationSummary;
use serde::{Deserialize, Serialize};

use crate::error::AppResult;
use crate::middleware::tenant::Tenant;
use crate::response::DataResponse;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Query / response types
// ---------------------------------------------------------------------------

/// Query parameters for `GET /notifications`.
#[derive(Debug, Deserialize)]
pub struct ListQuery {
    /// Maximum number of results. Defaults to 50, capped at 100.
    pub limit: Option<i64>,
    /// Number of results to skip. Defaults to 0.
    pub offset: Option<i64>,
}

/// Maximum page size for notification listing.
const MAX_LIMIT: i64 = 100;

/// Default page size for notification listing.
const DEFAULT_LIMIT: i64 = 50;

/// Result of a manual send.
#[derive(Debug, Serialize)]
pub struct SendResult {
    /// `sent`, `retrying` or `failed`.
    pub outcome: &'static str,
    pub notification: Notification,
}

// ---------------------------------------------------------------------------
// Reads
// ---------------------------------------------------------------------------

/// GET /api/v1/notifications
///
/// The tenant's notifications, newest first.
pub async fn list_notifications(
    Tenant(me): Tenant,
    State(state): State<AppState>,
    Query(params): Query<ListQuery>,
) -> AppResult<Json<DataResponse<Vec<Notification>>>> {
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let offset = params.offset.unwrap_or(0).max(0);

    let data = state.engine.list(me.tenant_id, limit, offset).await?;
    Ok(Json(DataResponse { data }))
}

/// GET /api/v1/notifications/{id}
pub async fn get_notification(
    Tenant(me): Tenant,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<Json<DataResponse<Notification>>> {
    let data = state.engine.get(me.tenant_id, id).await?;
    Ok(Json(DataResponse { data }))
}

/// GET /api/v1/notifications/summary
pub async fn summary(
    Tenant(me): Tenant,
    State(state): State<AppState>,
) -> AppResult<Json<DataResponse<NotificationSummary>>> {
    let data = state.engine.summary(me.tenant_id).await?;
    Ok(Json(DataResponse { data }))
}

/// GET /api/v1/notifications/person/{person_id}
pub async fn by_person(
    Tenant(me): Tenant,
    State(state): State<AppState>,
    Path(person_id): Path<DbId>,
) -> AppResult<Json<DataResponse<Vec<Notification>>>> {
    let data = state.engine.find_by_person(me.tenant_id, person_id).await?;
    Ok(Json(DataResponse { data }))
}

/// GET /api/v1/notifications/state/{state}
pub async fn by_state(
    Tenant(me): Tenant,
    State(state): State<AppState>,
    Path(wanted): Path<NotificationState>,
) -> AppResult<Json<DataResponse<Vec<Notification>>>> {
    let data = state.engine.find_by_state(me.tenant_id, wanted).await?;
    Ok(Json(DataResponse { data }))
}

/// GET /api/v1/notifications/category/{category}
pub async fn by_category(
    Tenant(me): Tenant,
    State(state): State<AppState>,
    Path(category): Path<NotificationCategory>,
) -> AppResult<Json<DataResponse<Vec<Notification>>>> {
    let data = state.engine.find_by_category(me.tenant_id, category).await?;
    Ok(Json(DataResponse { data }))
}

// ---------------------------------------------------------------------------
// Writes
// ---------------------------------------------------------------------------

/// POST /api/v1/notifications
///
/// Idempotent: returns 201 for a new row, 200 with the existing active row
/// when the person, category, and reference already have one.
pub async fn create_notification(
    Tenant(me): Tenant,
    State(state): State<AppState>,
    Json(input): Json<CreateNotificationRequest>,
) -> AppResult<(StatusCode, Json<DataResponse<Notification>>)> {
    let (data, created) = state.engine.create(me.tenant_id, input).await?;
    let status = if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(DataResponse { data })))
}

/// POST /api/v1/notifications/{id}/send
///
/// Attempt delivery now. 409 if the row is not `PENDIENTE` or is being
/// delivered by another worker.
pub async fn send_notification(
    Tenant(me): Tenant,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<Json<DataResponse<SendResult>>> {
    let (delivery, notification) = state.engine.dispatch_by_id(me.tenant_id, id).await?;
    let outcome = delivery.as_str();

    tracing::info!(
        tenant_id = me.tenant_id,
        user_id = me.user_id,
        notification_id = id,
        outcome,
        "Manual notification send"
    );

    Ok(Json(DataResponse {
        data: SendResult {
            outcome,
            notification,
        },
    }))
}

/// POST /api/v1/notifications/{id}/cancel
pub async fn cancel_notification(
    Tenant(me): Tenant,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<Json<DataResponse<Notification>>> {
    let data = state.engine.cancel(me.tenant_id, id).await?;
    Ok(Json(DataResponse { data }))
}

/// POST /api/v1/notifications/retry-failed
///
/// Returns the rows moved back to `PENDIENTE`.
pub async fn retry_failed(
    Tenant(me): Tenant,
    State(state): State<AppState>,
) -> AppResult<Json<DataResponse<Vec<Notification>>>> {
    let data = state.engine.retry_failed(me.tenant_id).await?;
    Ok(Json(DataResponse { data }))
}
