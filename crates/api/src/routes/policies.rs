//! Route definitions for the `/notification-policies` resource.

use axum::routing::get;
use axum::Router;

use crate::handlers::policies;
use crate::state::AppState;

/// Routes mounted at `/notification-policies`.
///
/// ```text
/// GET    /                          -> list_policies
/// PUT    /                          -> upsert_policy
/// GET    /{category}                -> get_policy
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(policies::list_policies).put(policies::upsert_policy))
        .route("/{category}", get(policies::get_policy))
}
