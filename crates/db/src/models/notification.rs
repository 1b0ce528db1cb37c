//! Notification entity model and dispatch bookkeeping types.

use inmo_core::notification::{
    DedupKey, NotificationCategory, NotificationState, NotificationType,
};
use inmo_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

/// A row from the `notifications` table.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize)]
pub struct Notification {
    pub id: DbId,
    pub tenant_id: DbId,
    pub person_id: Option<DbId>,
    #[sqlx(try_from = "String")]
    pub notification_type: NotificationType,
    #[sqlx(try_from = "String")]
    pub category: NotificationCategory,
    #[sqlx(try_from = "String")]
    pub state: NotificationState,
    pub destination: String,
    pub subject: String,
    pub body: String,
    pub reference_type: Option<String>,
    pub reference_id: Option<DbId>,
    pub scheduled_at: Option<Timestamp>,
    pub sent_at: Option<Timestamp>,
    pub attempts: i32,
    pub error_message: Option<String>,
    /// Identifier of the dispatch attempt currently holding this row.
    #[serde(skip)]
    pub claim_id: Option<Uuid>,
    #[serde(skip)]
    pub claim_expires_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Notification {
    /// The deduplication tuple this row occupies.
    pub fn dedup_key(&self) -> DedupKey {
        DedupKey {
            tenant_id: self.tenant_id,
            person_id: self.person_id,
            category: self.category,
            reference_type: self.reference_type.clone(),
            reference_id: self.reference_id,
        }
    }

    /// Whether the row may be attempted at `now`, ignoring claims.
    pub fn is_due(&self, now: Timestamp) -> bool {
        self.state == NotificationState::Pending && self.scheduled_at.is_none_or(|at| at <= now)
    }

    /// Whether a dispatch attempt holds an unexpired claim at `now`.
    pub fn is_claimed(&self, now: Timestamp) -> bool {
        self.claim_id.is_some() && self.claim_expires_at.is_some_and(|exp| exp > now)
    }

    /// Sweep ordering key: scheduled time, or creation time when unscheduled.
    pub fn due_at(&self) -> Timestamp {
        self.scheduled_at.unwrap_or(self.created_at)
    }
}

/// Exclusive right to attempt delivery of one notification until `expires_at`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchClaim {
    pub claim_id: Uuid,
    pub expires_at: Timestamp,
}

impl DispatchClaim {
    /// A new claim valid for `lease` from `now`.
    pub fn new(now: Timestamp, lease: chrono::Duration) -> Self {
        Self {
            claim_id: Uuid::new_v4(),
            expires_at: now + lease,
        }
    }
}

/// Result of one delivery attempt, written back under the claim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// The sender accepted the message.
    Sent { sent_at: Timestamp },
    /// The sender failed. `attempts` is the new counter value; the row moves
    /// to `FALLIDA` when `exhausted`, otherwise stays `PENDIENTE`.
    Failed {
        attempts: i32,
        error: String,
        exhausted: bool,
    },
}

impl AttemptOutcome {
    /// The state the row ends in after this outcome.
    pub fn resulting_state(&self) -> NotificationState {
        match self {
            Self::Sent { .. } => NotificationState::Sent,
            Self::Failed { exhausted: true, .. } => NotificationState::Failed,
            Self::Failed { .. } => NotificationState::Pending,
        }
    }
}

/// Count of notifications per state for one tenant.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize)]
pub struct StateCount {
    #[sqlx(try_from = "String")]
    pub state: NotificationState,
    pub count: i64,
}
