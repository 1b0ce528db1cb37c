//! Route definitions for the `/notifications` resource.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::notifications;
use crate::state::AppState;

/// Routes mounted at `/notifications`.
///
/// ```text
/// GET    /                          -> list_notifications
/// POST   /                          -> create_notification
/// GET    /summary                   -> summary
/// POST   /retry-failed              -> retry_failed
/// GET    /{id}                      -> get_notification
/// POST   /{id}/send                 -> send_notification
/// POST   /{id}/cancel               -> cancel_notification
/// GET    /person/{person_id}        -> by_person
/// GET    /state/{state}             -> by_state
/// GET    /category/{category}       -> by_category
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(notifications::list_notifications).post(notifications::create_notification),
        )
        .route("/summary", get(notifications::summary))
        .route("/retry-failed", post(notifications::retry_failed))
        .route("/{id}", get(notifications::get_notification))
        .route("/{id}/send", post(notifications::send_notification))
        .route("/{id}/cancel", post(notifications::cancel_notification))
        .route("/person/{person_id}", get(notifications::by_person))
        .route("/state/{state}", get(notifications::by_state))
        .route("/category/{category}", get(notifications::by_category))
}
