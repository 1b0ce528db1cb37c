//! Persistence seams for the engine.
//!
//! [`PgNotificationStore`] and [`PgPolicyStore`] delegate to the `inmo-db`
//! repositories. The in-memory stores implement the same conditional-write
//! semantics under a single lock and back the tests and local runs without a
//! database.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use inmo_core::notification::{
    DedupKey, NewNotification, NotificationCategory, NotificationState,
};
use inmo_core::policy::NotificationPolicy;
use inmo_core::types::{DbId, Timestamp};
use inmo_db::models::notification::{AttemptOutcome, DispatchClaim, Notification, StateCount};
use inmo_db::repositories::{NotificationPolicyRepo, NotificationRepo};
use inmo_db::DbPool;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::EngineError;

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Storage for notification rows.
///
/// Every conditional write returns `None` when its guard did not hold.
#[async_trait]
pub trait NotificationStore: Send + Sync {
    /// Insert unless an active row occupies the dedup tuple; `true` if inserted.
    async fn create_deduplicated(
        &self,
        new: NewNotification,
        now: Timestamp,
    ) -> Result<(Notification, bool), EngineError>;

    async fn latest_for_key(&self, key: &DedupKey) -> Result<Option<Notification>, EngineError>;

    async fn get(&self, tenant_id: DbId, id: DbId) -> Result<Option<Notification>, EngineError>;

    async fn list(
        &self,
        tenant_id: DbId,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Notification>, EngineError>;

    async fn list_by_state(
        &self,
        tenant_id: DbId,
        state: NotificationState,
    ) -> Result<Vec<Notification>, EngineError>;

    async fn list_by_person(
        &self,
        tenant_id: DbId,
        person_id: DbId,
    ) -> Result<Vec<Notification>, EngineError>;

    async fn list_by_category(
        &self,
        tenant_id: DbId,
        category: NotificationCategory,
    ) -> Result<Vec<Notification>, EngineError>;

    async fn count_by_state(&self, tenant_id: DbId) -> Result<Vec<StateCount>, EngineError>;

    async fn tenants_with_due(&self, now: Timestamp) -> Result<Vec<DbId>, EngineError>;

    /// Due rows, oldest-scheduled first. `None` spans all tenants.
    async fn list_due(
        &self,
        tenant_id: Option<DbId>,
        now: Timestamp,
        limit: i64,
    ) -> Result<Vec<Notification>, EngineError>;

    async fn claim(
        &self,
        tenant_id: DbId,
        id: DbId,
        claim: &DispatchClaim,
        now: Timestamp,
    ) -> Result<Option<Notification>, EngineError>;

    async fn complete(
        &self,
        id: DbId,
        claim_id: Uuid,
        outcome: &AttemptOutcome,
        now: Timestamp,
    ) -> Result<Option<Notification>, EngineError>;

    async fn cancel(
        &self,
        tenant_id: DbId,
        id: DbId,
        now: Timestamp,
    ) -> Result<Option<Notification>, EngineError>;

    async fn revive_failed(
        &self,
        tenant_id: DbId,
        id: DbId,
        now: Timestamp,
    ) -> Result<Option<Notification>, EngineError>;
}

/// Storage for per-tenant notification policies.
#[async_trait]
pub trait PolicyStore: Send + Sync {
    /// The stored policy for the pair, active or not.
    async fn find(
        &self,
        tenant_id: DbId,
        category: NotificationCategory,
    ) -> Result<Option<NotificationPolicy>, EngineError>;

    async fn list(&self, tenant_id: DbId) -> Result<Vec<NotificationPolicy>, EngineError>;

    async fn upsert(&self, policy: &NotificationPolicy) -> Result<NotificationPolicy, EngineError>;
}

// ---------------------------------------------------------------------------
// PostgreSQL
// ---------------------------------------------------------------------------

/// [`NotificationStore`] backed by the `notifications` table.
#[derive(Clone)]
pub struct PgNotificationStore {
    pool: DbPool,
}

impl PgNotificationStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NotificationStore for PgNotificationStore {
    async fn create_deduplicated(
        &self,
        new: NewNotification,
        now: Timestamp,
    ) -> Result<(Notification, bool), EngineError> {
        Ok(NotificationRepo::create_deduplicated(&self.pool, &new, now).await?)
    }

    async fn latest_for_key(&self, key: &DedupKey) -> Result<Option<Notification>, EngineError> {
        Ok(NotificationRepo::latest_for_key(&self.pool, key).await?)
    }

    async fn get(&self, tenant_id: DbId, id: DbId) -> Result<Option<Notification>, EngineError> {
        Ok(NotificationRepo::find_by_id(&self.pool, tenant_id, id).await?)
    }

    async fn list(
        &self,
        tenant_id: DbId,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Notification>, EngineError> {
        Ok(NotificationRepo::list_for_tenant(&self.pool, tenant_id, limit, offset).await?)
    }

    async fn list_by_state(
        &self,
        tenant_id: DbId,
        state: NotificationState,
    ) -> Result<Vec<Notification>, EngineError> {
        Ok(NotificationRepo::list_by_state(&self.pool, tenant_id, state).await?)
    }

    async fn list_by_person(
        &self,
        tenant_id: DbId,
        person_id: DbId,
    ) -> Result<Vec<Notification>, EngineError> {
        Ok(NotificationRepo::list_by_person(&self.pool, tenant_id, person_id).await?)
    }

    async fn list_by_category(
        &self,
        tenant_id: DbId,
        category: NotificationCategory,
    ) -> Result<Vec<Notification>, EngineError> {
        Ok(NotificationRepo::list_by_category(&self.pool, tenant_id, category).await?)
    }

    async fn count_by_state(&self, tenant_id: DbId) -> Result<Vec<StateCount>, EngineError> {
        Ok(NotificationRepo::count_by_state(&self.pool, tenant_id).await?)
    }

    async fn tenants_with_due(&self, now: Timestamp) -> Result<Vec<DbId>, EngineError> {
        Ok(NotificationRepo::tenants_with_due(&self.pool, now).await?)
    }

    async fn list_due(
        &self,
        tenant_id: Option<DbId>,
        now: Timestamp,
        limit: i64,
    ) -> Result<Vec<Notification>, EngineError> {
        Ok(NotificationRepo::list_due(&self.pool, tenant_id, now, limit).await?)
    }

    async fn claim(
        &self,
        tenant_id: DbId,
        id: DbId,
        claim: &DispatchClaim,
        now: Timestamp,
    ) -> Result<Option<Notification>, EngineError> {
        Ok(NotificationRepo::claim(&self.pool, tenant_id, id, claim, now).await?)
    }

    async fn complete(
        &self,
        id: DbId,
        claim_id: Uuid,
        outcome: &AttemptOutcome,
        now: Timestamp,
    ) -> Result<Option<Notification>, EngineError> {
        Ok(NotificationRepo::complete(&self.pool, id, claim_id, outcome, now).await?)
    }

    async fn cancel(
        &self,
        tenant_id: DbId,
        id: DbId,
        now: Timestamp,
    ) -> Result<Option<Notification>, EngineError> {
        Ok(NotificationRepo::cancel(&self.pool, tenant_id, id, now).await?)
    }

    async fn revive_failed(
        &self,
        tenant_id: DbId,
        id: DbId,
        now: Timestamp,
    ) -> Result<Option<Notification>, EngineError> {
        Ok(NotificationRepo::revive_failed(&self.pool, tenant_id, id, now).await?)
    }
}

/// [`PolicyStore`] backed by the `notification_policies` table.
#[derive(Clone)]
pub struct PgPolicyStore {
    pool: DbPool,
}

impl PgPolicyStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PolicyStore for PgPolicyStore {
    async fn find(
        &self,
        tenant_id: DbId,
        category: NotificationCategory,
    ) -> Result<Option<NotificationPolicy>, EngineError> {
        let stored = NotificationPolicyRepo::find(&self.pool, tenant_id, category).await?;
        Ok(stored.map(|p| p.into_policy()))
    }

    async fn list(&self, tenant_id: DbId) -> Result<Vec<NotificationPolicy>, EngineError> {
        let stored = NotificationPolicyRepo::list_for_tenant(&self.pool, tenant_id).await?;
        Ok(stored.into_iter().map(|p| p.into_policy()).collect())
    }

    async fn upsert(&self, policy: &NotificationPolicy) -> Result<NotificationPolicy, EngineError> {
        let stored = NotificationPolicyRepo::upsert(&self.pool, policy).await?;
        Ok(stored.into_policy())
    }
}

// ---------------------------------------------------------------------------
// In-memory
// ---------------------------------------------------------------------------

#[derive(Default)]
struct MemoryRows {
    next_id: DbId,
    rows: BTreeMap<DbId, Notification>,
}

impl MemoryRows {
    fn tenant_rows(&self, tenant_id: DbId) -> impl Iterator<Item = &Notification> {
        self.rows.values().filter(move |n| n.tenant_id == tenant_id)
    }

    fn due(&self, now: Timestamp) -> impl Iterator<Item = &Notification> {
        self.rows
            .values()
            .filter(move |n| n.is_due(now) && !n.is_claimed(now))
    }
}

/// Newest first, matching the SQL listings.
fn newest_first<'a>(rows: impl Iterator<Item = &'a Notification>) -> Vec<Notification> {
    let mut out: Vec<Notification> = rows.cloned().collect();
    out.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
    out
}

/// [`NotificationStore`] holding rows in process memory.
#[derive(Default)]
pub struct MemoryNotificationStore {
    inner: RwLock<MemoryRows>,
}

impl MemoryNotificationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of stored rows across all tenants.
    pub async fn len(&self) -> usize {
        self.inner.read().await.rows.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl NotificationStore for MemoryNotificationStore {
    async fn create_deduplicated(
        &self,
        new: NewNotification,
        now: Timestamp,
    ) -> Result<(Notification, bool), EngineError> {
        let key = new.dedup_key();
        let mut inner = self.inner.write().await;

        if let Some(existing) = inner
            .rows
            .values()
            .find(|n| n.state.is_active() && n.dedup_key() == key)
        {
            return Ok((existing.clone(), false));
        }

        inner.next_id += 1;
        let row = Notification {
            id: inner.next_id,
            tenant_id: new.tenant_id,
            person_id: new.person_id,
            notification_type: new.notification_type,
            category: new.category,
            state: NotificationState::Pending,
            destination: new.destination,
            subject: new.subject,
            body: new.body,
            reference_type: new.reference_type,
            reference_id: new.reference_id,
            scheduled_at: new.scheduled_at,
            sent_at: None,
            attempts: 0,
            error_message: None,
            claim_id: None,
            claim_expires_at: None,
            created_at: now,
            updated_at: now,
        };
        inner.rows.insert(row.id, row.clone());
        Ok((row, true))
    }

    async fn latest_for_key(&self, key: &DedupKey) -> Result<Option<Notification>, EngineError> {
        let inner = self.inner.read().await;
        Ok(inner
            .rows
            .values()
            .filter(|n| n.dedup_key() == *key)
            .max_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)))
            .cloned())
    }

    async fn get(&self, tenant_id: DbId, id: DbId) -> Result<Option<Notification>, EngineError> {
        let inner = self.inner.read().await;
        Ok(inner.rows.get(&id).filter(|n| n.tenant_id == tenant_id).cloned())
    }

    async fn list(
        &self,
        tenant_id: DbId,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Notification>, EngineError> {
        let inner = self.inner.read().await;
        Ok(newest_first(inner.tenant_rows(tenant_id))
            .into_iter()
            .skip(usize::try_from(offset).unwrap_or(0))
            .take(usize::try_from(limit).unwrap_or(0))
            .collect())
    }

    async fn list_by_state(
        &self,
        tenant_id: DbId,
        state: NotificationState,
    ) -> Result<Vec<Notification>, EngineError> {
        let inner = self.inner.read().await;
        Ok(newest_first(
            inner.tenant_rows(tenant_id).filter(|n| n.state == state),
        ))
    }

    async fn list_by_person(
        &self,
        tenant_id: DbId,
        person_id: DbId,
    ) -> Result<Vec<Notification>, EngineError> {
        let inner = self.inner.read().await;
        Ok(newest_first(
            inner
                .tenant_rows(tenant_id)
                .filter(|n| n.person_id == Some(person_id)),
        ))
    }

    async fn list_by_category(
        &self,
        tenant_id: DbId,
        category: NotificationCategory,
    ) -> Result<Vec<Notification>, EngineError> {
        let inner = self.inner.read().await;
        Ok(newest_first(
            inner.tenant_rows(tenant_id).filter(|n| n.category == category),
        ))
    }

    async fn count_by_state(&self, tenant_id: DbId) -> Result<Vec<StateCount>, EngineError> {
        let inner = self.inner.read().await;
        let mut counts: BTreeMap<&'static str, (NotificationState, i64)> = BTreeMap::new();
        for n in inner.tenant_rows(tenant_id) {
            counts.entry(n.state.as_str()).or_insert((n.state, 0)).1 += 1;
        }
        Ok(counts
            .into_values()
            .map(|(state, count)| StateCount { state, count })
            .collect())
    }

    async fn tenants_with_due(&self, now: Timestamp) -> Result<Vec<DbId>, EngineError> {
        let inner = self.inner.read().await;
        let mut tenants: Vec<DbId> = inner.due(now).map(|n| n.tenant_id).collect();
        tenants.sort_unstable();
        tenants.dedup();
        Ok(tenants)
    }

    async fn list_due(
        &self,
        tenant_id: Option<DbId>,
        now: Timestamp,
        limit: i64,
    ) -> Result<Vec<Notification>, EngineError> {
        let inner = self.inner.read().await;
        let mut due: Vec<Notification> = inner
            .due(now)
            .filter(|n| tenant_id.is_none_or(|t| n.tenant_id == t))
            .cloned()
            .collect();
        due.sort_by(|a, b| a.due_at().cmp(&b.due_at()).then(a.id.cmp(&b.id)));
        due.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(due)
    }

    async fn claim(
        &self,
        tenant_id: DbId,
        id: DbId,
        claim: &DispatchClaim,
        now: Timestamp,
    ) -> Result<Option<Notification>, EngineError> {
        let mut inner = self.inner.write().await;
        let Some(row) = inner.rows.get_mut(&id) else {
            return Ok(None);
        };
        if row.tenant_id != tenant_id
            || row.state != NotificationState::Pending
            || row.is_claimed(now)
        {
            return Ok(None);
        }
        row.claim_id = Some(claim.claim_id);
        row.claim_expires_at = Some(claim.expires_at);
        row.updated_at = now;
        Ok(Some(row.clone()))
    }

    async fn complete(
        &self,
        id: DbId,
        claim_id: Uuid,
        outcome: &AttemptOutcome,
        now: Timestamp,
    ) -> Result<Option<Notification>, EngineError> {
        let mut inner = self.inner.write().await;
        let Some(row) = inner.rows.get_mut(&id) else {
            return Ok(None);
        };
        if row.state != NotificationState::Pending || row.claim_id != Some(claim_id) {
            return Ok(None);
        }
        match outcome {
            AttemptOutcome::Sent { sent_at } => {
                row.sent_at = Some(*sent_at);
                row.error_message = None;
            }
            AttemptOutcome::Failed {
                attempts, error, ..
            } => {
                if *attempts <= row.attempts {
                    return Ok(None);
                }
                row.attempts = *attempts;
                row.error_message = Some(error.clone());
            }
        }
        row.state = outcome.resulting_state();
        row.claim_id = None;
        row.claim_expires_at = None;
        row.updated_at = now;
        Ok(Some(row.clone()))
    }

    async fn cancel(
        &self,
        tenant_id: DbId,
        id: DbId,
        now: Timestamp,
    ) -> Result<Option<Notification>, EngineError> {
        let mut inner = self.inner.write().await;
        let Some(row) = inner.rows.get_mut(&id) else {
            return Ok(None);
        };
        if row.tenant_id != tenant_id
            || row.state != NotificationState::Pending
            || row.is_claimed(now)
        {
            return Ok(None);
        }
        row.state = NotificationState::Cancelled;
        row.updated_at = now;
        Ok(Some(row.clone()))
    }

    async fn revive_failed(
        &self,
        tenant_id: DbId,
        id: DbId,
        now: Timestamp,
    ) -> Result<Option<Notification>, EngineError> {
        let mut inner = self.inner.write().await;
        let Some(row) = inner.rows.get_mut(&id) else {
            return Ok(None);
        };
        if row.tenant_id != tenant_id || row.state != NotificationState::Failed {
            return Ok(None);
        }
        row.state = NotificationState::Pending;
        row.updated_at = now;
        Ok(Some(row.clone()))
    }
}

/// [`PolicyStore`] holding policies in process memory.
#[derive(Default)]
pub struct MemoryPolicyStore {
    policies: RwLock<HashMap<(DbId, NotificationCategory), NotificationPolicy>>,
}

impl MemoryPolicyStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PolicyStore for MemoryPolicyStore {
    async fn find(
        &self,
        tenant_id: DbId,
        category: NotificationCategory,
    ) -> Result<Option<NotificationPolicy>, EngineError> {
        Ok(self
            .policies
            .read()
            .await
            .get(&(tenant_id, category))
            .cloned())
    }

    async fn list(&self, tenant_id: DbId) -> Result<Vec<NotificationPolicy>, EngineError> {
        let mut out: Vec<NotificationPolicy> = self
            .policies
            .read()
            .await
            .values()
            .filter(|p| p.tenant_id == tenant_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| a.category.as_str().cmp(b.category.as_str()));
        Ok(out)
    }

    async fn upsert(&self, policy: &NotificationPolicy) -> Result<NotificationPolicy, EngineError> {
        self.policies
            .write()
            .await
            .insert((policy.tenant_id, policy.category), policy.clone());
        Ok(policy.clone())
    }
}
