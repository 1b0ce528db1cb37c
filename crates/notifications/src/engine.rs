//! The notification state machine.
//!
//! Rows start `PENDIENTE` and are only ever changed by guarded writes:
//!
//! - delivery goes through a claim (`PENDIENTE` and unclaimed -> claimed),
//!   one Sender call bounded by a timeout, and an outcome write that applies
//!   only while the same claim is still held;
//! - `cancel` applies only to an unclaimed `PENDIENTE` row;
//! - `retry_failed` applies only to a `FALLIDA` row with attempts left.
//!
//! Two workers racing on one row therefore produce one Sender call and one
//! final state.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use inmo_core::error::CoreError;
use inmo_core::notification::{
    state_machine, CreateNotificationRequest, DedupKey, NotificationCategory, NotificationState,
};
use inmo_core::policy::NotificationPolicy;
use inmo_core::types::{DbId, Timestamp};
use inmo_db::models::notification::{AttemptOutcome, DispatchClaim, Notification};
use serde::Serialize;

use crate::error::EngineError;
use crate::policy::PolicyResolver;
use crate::sender::{OutboundMessage, SendError, Sender};
use crate::store::NotificationStore;

/// Default bound on a single Sender call.
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(30);

/// Default lifetime of a dispatch claim.
pub const DEFAULT_CLAIM_LEASE: Duration = Duration::from_secs(120);

/// Timing of individual delivery attempts.
#[derive(Debug, Clone, Copy)]
pub struct DispatchConfig {
    /// Upper bound on one Sender call; expiry counts as a transport failure.
    pub send_timeout: Duration,
    /// How long a claim protects a row. Must exceed `send_timeout`.
    pub claim_lease: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            send_timeout: DEFAULT_SEND_TIMEOUT,
            claim_lease: DEFAULT_CLAIM_LEASE,
        }
    }
}

impl DispatchConfig {
    /// A config whose lease is guaranteed to outlive the send timeout.
    pub fn new(send_timeout: Duration, claim_lease: Duration) -> Self {
        let min_lease = send_timeout + Duration::from_secs(1);
        Self {
            send_timeout,
            claim_lease: claim_lease.max(min_lease),
        }
    }

    /// Load from environment variables, falling back to defaults.
    ///
    /// | Variable            | Default |
    /// |---------------------|---------|
    /// | `SEND_TIMEOUT_SECS` | `30`    |
    /// | `CLAIM_LEASE_SECS`  | `120`   |
    pub fn from_env() -> Self {
        Self::new(
            env_secs("SEND_TIMEOUT_SECS").unwrap_or(DEFAULT_SEND_TIMEOUT),
            env_secs("CLAIM_LEASE_SECS").unwrap_or(DEFAULT_CLAIM_LEASE),
        )
    }
}

/// Parse a whole-seconds duration from the environment.
pub(crate) fn env_secs(var: &str) -> Option<Duration> {
    std::env::var(var)
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

/// What a single `dispatch` call did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Delivered; the row is `ENVIADA`.
    Sent(Notification),
    /// Delivery failed with attempts left; the row stays `PENDIENTE`.
    Retrying(Notification),
    /// Delivery failed and attempts are exhausted; the row is `FALLIDA`.
    Failed(Notification),
    /// Another worker holds the row or it already left `PENDIENTE`.
    Skipped,
}

impl DispatchOutcome {
    /// Split an attempted delivery into its result and the updated row.
    /// `None` for [`DispatchOutcome::Skipped`].
    pub fn into_delivery(self) -> Option<(Delivery, Notification)> {
        match self {
            Self::Sent(n) => Some((Delivery::Sent, n)),
            Self::Retrying(n) => Some((Delivery::Retrying, n)),
            Self::Failed(n) => Some((Delivery::Failed, n)),
            Self::Skipped => None,
        }
    }
}

/// Result of a delivery attempt that actually reached the Sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Sent,
    Retrying,
    Failed,
}

impl Delivery {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sent => "sent",
            Self::Retrying => "retrying",
            Self::Failed => "failed",
        }
    }
}

/// Per-state totals for one tenant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NotificationSummary {
    pub pending: i64,
    pub sent: i64,
    pub failed: i64,
    pub cancelled: i64,
    pub total: i64,
}

/// Creates, delivers, and transitions notification records.
pub struct NotificationEngine {
    store: Arc<dyn NotificationStore>,
    policies: PolicyResolver,
    sender: Arc<dyn Sender>,
    config: DispatchConfig,
}

impl NotificationEngine {
    pub fn new(
        store: Arc<dyn NotificationStore>,
        policies: PolicyResolver,
        sender: Arc<dyn Sender>,
        config: DispatchConfig,
    ) -> Self {
        Self {
            store,
            policies,
            sender,
            config,
        }
    }

    pub fn policies(&self) -> &PolicyResolver {
        &self.policies
    }

    // -----------------------------------------------------------------------
    // Creation
    // -----------------------------------------------------------------------

    /// Validate `request` and store it for `tenant_id`.
    ///
    /// If an active row (`PENDIENTE` or `ENVIADA`) already exists for the same
    /// person, category, and reference, that row is returned instead and the
    /// flag is `false`.
    pub async fn create(
        &self,
        tenant_id: DbId,
        request: CreateNotificationRequest,
    ) -> Result<(Notification, bool), EngineError> {
        let new = request.into_new(tenant_id)?;
        let (notification, created) = self.store.create_deduplicated(new, Utc::now()).await?;

        if created {
            tracing::info!(
                tenant_id,
                notification_id = notification.id,
                category = %notification.category,
                channel = %notification.notification_type,
                "Notification created"
            );
        } else {
            tracing::debug!(
                tenant_id,
                notification_id = notification.id,
                state = %notification.state,
                "Active notification already exists, returning it"
            );
        }
        Ok((notification, created))
    }

    // -----------------------------------------------------------------------
    // Due work
    // -----------------------------------------------------------------------

    /// `PENDIENTE` rows of one tenant that are due at `now`, oldest first.
    pub async fn due_for_dispatch(
        &self,
        tenant_id: DbId,
        now: Timestamp,
        limit: i64,
    ) -> Result<Vec<Notification>, EngineError> {
        self.store.list_due(Some(tenant_id), now, limit).await
    }

    /// Due rows across every tenant, oldest first.
    pub async fn all_due(&self, now: Timestamp, limit: i64) -> Result<Vec<Notification>, EngineError> {
        self.store.list_due(None, now, limit).await
    }

    /// Tenants with at least one due row at `now`.
    pub async fn tenants_with_due(&self, now: Timestamp) -> Result<Vec<DbId>, EngineError> {
        self.store.tenants_with_due(now).await
    }

    // -----------------------------------------------------------------------
    // Dispatch
    // -----------------------------------------------------------------------

    /// Attempt delivery of `notification` once.
    ///
    /// Returns [`DispatchOutcome::Skipped`] without calling the Sender when
    /// the row cannot be claimed. Transport failures and timeouts are absorbed
    /// into the row; only storage errors are returned.
    pub async fn dispatch(&self, notification: &Notification) -> Result<DispatchOutcome, EngineError> {
        let policy = self
            .policies
            .resolve(notification.tenant_id, notification.category)
            .await?;

        let now = Utc::now();
        let claim = DispatchClaim::new(now, lease(self.config.claim_lease));
        let Some(claimed) = self
            .store
            .claim(notification.tenant_id, notification.id, &claim, now)
            .await?
        else {
            tracing::debug!(
                tenant_id = notification.tenant_id,
                notification_id = notification.id,
                "Notification not claimable, skipping"
            );
            return Ok(DispatchOutcome::Skipped);
        };

        let result = self.send_bounded(&claimed).await;
        let outcome = attempt_outcome(&claimed, &policy, result, Utc::now());

        let Some(updated) = self
            .store
            .complete(claimed.id, claim.claim_id, &outcome, Utc::now())
            .await?
        else {
            tracing::warn!(
                tenant_id = claimed.tenant_id,
                notification_id = claimed.id,
                "Dispatch claim lost before the outcome was recorded"
            );
            return Ok(DispatchOutcome::Skipped);
        };

        Ok(match updated.state {
            NotificationState::Sent => {
                tracing::info!(
                    tenant_id = updated.tenant_id,
                    notification_id = updated.id,
                    channel = %updated.notification_type,
                    "Notification sent"
                );
                DispatchOutcome::Sent(updated)
            }
            NotificationState::Failed => {
                tracing::warn!(
                    tenant_id = updated.tenant_id,
                    notification_id = updated.id,
                    attempts = updated.attempts,
                    error = updated.error_message.as_deref().unwrap_or_default(),
                    "Notification failed permanently"
                );
                DispatchOutcome::Failed(updated)
            }
            _ => {
                tracing::warn!(
                    tenant_id = updated.tenant_id,
                    notification_id = updated.id,
                    attempts = updated.attempts,
                    max_attempts = policy.max_attempts,
                    error = updated.error_message.as_deref().unwrap_or_default(),
                    "Notification delivery failed, will retry"
                );
                DispatchOutcome::Retrying(updated)
            }
        })
    }

    /// Attempt one tenant-owned notification immediately.
    ///
    /// A row that is not `PENDIENTE` fails with `InvalidTransition`; a row
    /// another worker is delivering right now fails with `Conflict`.
    pub async fn dispatch_by_id(
        &self,
        tenant_id: DbId,
        id: DbId,
    ) -> Result<(Delivery, Notification), EngineError> {
        let notification = self.get(tenant_id, id).await?;
        state_machine::validate_transition(notification.state, NotificationState::Sent)?;
        if notification.is_claimed(Utc::now()) {
            return Err(in_flight(id).into());
        }

        self.dispatch(&notification)
            .await?
            .into_delivery()
            .ok_or_else(|| EngineError::from(in_flight(id)))
    }

    async fn send_bounded(&self, notification: &Notification) -> Result<(), SendError> {
        let message = OutboundMessage::from(notification);
        match tokio::time::timeout(self.config.send_timeout, self.sender.send(&message)).await {
            Ok(result) => result,
            Err(_) => Err(SendError::Timeout(self.config.send_timeout)),
        }
    }

    // -----------------------------------------------------------------------
    // Manual transitions
    // -----------------------------------------------------------------------

    /// Move a tenant's `FALLIDA` rows with attempts left back to `PENDIENTE`.
    ///
    /// Attempts are kept, so a revived row gets only the remainder of its
    /// policy's ceiling. Returns the revived rows.
    pub async fn retry_failed(&self, tenant_id: DbId) -> Result<Vec<Notification>, EngineError> {
        let failed = self
            .store
            .list_by_state(tenant_id, NotificationState::Failed)
            .await?;

        let mut policies: HashMap<NotificationCategory, NotificationPolicy> = HashMap::new();
        let mut revived = Vec::new();
        for notification in failed {
            let policy = match policies.get(&notification.category) {
                Some(p) => p.clone(),
                None => {
                    let p = self.policies.resolve(tenant_id, notification.category).await?;
                    policies.insert(notification.category, p.clone());
                    p
                }
            };
            if policy.attempts_exhausted(notification.attempts) {
                continue;
            }
            if let Some(row) = self
                .store
                .revive_failed(tenant_id, notification.id, Utc::now())
                .await?
            {
                revived.push(row);
            }
        }

        tracing::info!(tenant_id, revived = revived.len(), "Failed notifications revived");
        Ok(revived)
    }

    /// Cancel a tenant's `PENDIENTE` notification.
    pub async fn cancel(&self, tenant_id: DbId, id: DbId) -> Result<Notification, EngineError> {
        if let Some(cancelled) = self.store.cancel(tenant_id, id, Utc::now()).await? {
            tracing::info!(tenant_id, notification_id = id, "Notification cancelled");
            return Ok(cancelled);
        }

        let current = self.get(tenant_id, id).await?;
        state_machine::validate_transition(current.state, NotificationState::Cancelled)?;
        Err(in_flight(id).into())
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// A tenant's notification by ID; other tenants' rows are `NotFound`.
    pub async fn get(&self, tenant_id: DbId, id: DbId) -> Result<Notification, EngineError> {
        self.store
            .get(tenant_id, id)
            .await?
            .ok_or_else(|| CoreError::NotFound {
                entity: "Notification",
                id,
            })
            .map_err(EngineError::from)
    }

    pub async fn list(
        &self,
        tenant_id: DbId,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Notification>, EngineError> {
        self.store.list(tenant_id, limit, offset).await
    }

    pub async fn find_by_state(
        &self,
        tenant_id: DbId,
        state: NotificationState,
    ) -> Result<Vec<Notification>, EngineError> {
        self.store.list_by_state(tenant_id, state).await
    }

    pub async fn find_by_person(
        &self,
        tenant_id: DbId,
        person_id: DbId,
    ) -> Result<Vec<Notification>, EngineError> {
        self.store.list_by_person(tenant_id, person_id).await
    }

    pub async fn find_by_category(
        &self,
        tenant_id: DbId,
        category: NotificationCategory,
    ) -> Result<Vec<Notification>, EngineError> {
        self.store.list_by_category(tenant_id, category).await
    }

    /// The most recent row for a dedup tuple, in any state.
    pub async fn latest_for_key(&self, key: &DedupKey) -> Result<Option<Notification>, EngineError> {
        self.store.latest_for_key(key).await
    }

    /// Count a tenant's notifications per state.
    pub async fn summary(&self, tenant_id: DbId) -> Result<NotificationSummary, EngineError> {
        let counts = self.store.count_by_state(tenant_id).await?;
        let mut summary = NotificationSummary::default();
        for c in counts {
            match c.state {
                NotificationState::Pending => summary.pending = c.count,
                NotificationState::Sent => summary.sent = c.count,
                NotificationState::Failed => summary.failed = c.count,
                NotificationState::Cancelled => summary.cancelled = c.count,
            }
            summary.total += c.count;
        }
        Ok(summary)
    }
}

/// Decide the outcome write for one attempt on `claimed`.
fn attempt_outcome(
    claimed: &Notification,
    policy: &NotificationPolicy,
    result: Result<(), SendError>,
    now: Timestamp,
) -> AttemptOutcome {
    match result {
        Ok(()) => AttemptOutcome::Sent { sent_at: now },
        Err(e) => {
            let attempts = claimed.attempts + 1;
            AttemptOutcome::Failed {
                attempts,
                error: e.to_string(),
                exhausted: policy.attempts_exhausted(attempts),
            }
        }
    }
}

fn lease(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or(chrono::Duration::seconds(
        DEFAULT_CLAIM_LEASE.as_secs() as i64,
    ))
}

fn in_flight(id: DbId) -> CoreError {
    CoreError::Conflict(format!("Notification {id} is being dispatched"))
}

#[cfg(test)]
mod tests {
    use inmo_core::notification::NotificationType;

    use super::*;

    fn row(attempts: i32) -> Notification {
        let now = Utc::now();
        Notification {
            id: 1,
            tenant_id: 1,
            person_id: None,
            notification_type: NotificationType::Email,
            category: NotificationCategory::PaymentDue,
            state: NotificationState::Pending,
            destination: "ana@example.com".to_string(),
            subject: "s".to_string(),
            body: "b".to_string(),
            reference_type: None,
            reference_id: None,
            scheduled_at: None,
            sent_at: None,
            attempts,
            error_message: None,
            claim_id: None,
            claim_expires_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn failure_below_ceiling_keeps_pending() {
        let policy = NotificationPolicy::default_for(1, NotificationCategory::PaymentDue);
        let outcome = attempt_outcome(
            &row(1),
            &policy,
            Err(SendError::Transport("smtp down".to_string())),
            Utc::now(),
        );
        assert_eq!(outcome.resulting_state(), NotificationState::Pending);
        assert_eq!(
            outcome,
            AttemptOutcome::Failed {
                attempts: 2,
                error: "Transport error: smtp down".to_string(),
                exhausted: false,
            }
        );
    }

    #[test]
    fn failure_at_ceiling_is_exhausted() {
        let policy = NotificationPolicy::default_for(1, NotificationCategory::PaymentDue);
        let outcome = attempt_outcome(
            &row(2),
            &policy,
            Err(SendError::Timeout(Duration::from_secs(30))),
            Utc::now(),
        );
        assert_eq!(outcome.resulting_state(), NotificationState::Failed);
    }

    #[test]
    fn success_does_not_count_an_attempt() {
        let policy = NotificationPolicy::default_for(1, NotificationCategory::PaymentDue);
        let now = Utc::now();
        let outcome = attempt_outcome(&row(2), &policy, Ok(()), now);
        assert_eq!(outcome, AttemptOutcome::Sent { sent_at: now });
    }

    #[test]
    fn lease_is_raised_above_send_timeout() {
        let config = DispatchConfig::new(Duration::from_secs(30), Duration::from_secs(10));
        assert!(config.claim_lease > config.send_timeout);
    }

    #[test]
    fn skipped_outcome_has_no_delivery() {
        assert_eq!(DispatchOutcome::Skipped.into_delivery(), None);
        assert_eq!(
            DispatchOutcome::Failed(row(3)).into_delivery().map(|(d, _)| d.as_str()),
            Some("failed")
        );
    }
}
