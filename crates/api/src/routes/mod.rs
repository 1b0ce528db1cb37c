pub mod auth;
pub mod health;
pub mod notifications;
pub mod policies;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// Every route here requires a verified credential; the boundary is applied
/// by [`crate::router::build_app_router`].
///
/// ```text
/// /auth/refresh                                    fresh credential (POST)
///
/// /notifications                                   list, create
/// /notifications/summary                           counts by state
/// /notifications/retry-failed                      revive FALLIDA rows (POST)
/// /notifications/{id}                              get
/// /notifications/{id}/send                         deliver now (POST)
/// /notifications/{id}/cancel                       cancel (POST)
/// /notifications/person/{person_id}                by person
/// /notifications/state/{state}                     by state
/// /notifications/category/{category}               by category
///
/// /notification-policies                           list, upsert (PUT)
/// /notification-policies/{category}                effective policy
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/auth", auth::router())
        .nest("/notifications", notifications::router())
        .nest("/notification-policies", policies::router())
}
