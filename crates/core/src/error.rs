use crate::notification::NotificationState;
use crate::types::DbId;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: DbId },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Internal error: {0}")]
    Internal(String),

    /// The presented credential is malformed, tampered with, or expired.
    #[error("Invalid credential: {0}")]
    InvalidCredential(String),

    /// A tenant-scoped operation ran without an established tenant context.
    #[error("No tenant context is established for this request")]
    NoTenantContext,

    /// The tenant context was populated twice without an intervening clear.
    #[error("Tenant context is already set for this request")]
    ContextAlreadySet,

    /// A notification policy update violated a field constraint.
    #[error("Invalid notification policy: {0}")]
    InvalidPolicy(String),

    /// A notification state change that the state machine does not allow.
    #[error("Invalid transition: {from} -> {to}")]
    InvalidTransition {
        from: NotificationState,
        to: NotificationState,
    },
}
