//! Repository for the `notifications` table.
//!
//! All reads and writes are scoped by `tenant_id`; the only tenant-agnostic
//! queries are the sweep helpers [`NotificationRepo::tenants_with_due`] and
//! [`NotificationRepo::list_due`] with `tenant_id = None`.

use inmo_core::notification::{
    DedupKey, NewNotification, NotificationCategory, NotificationState,
};
use inmo_core::types::{DbId, Timestamp};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::models::notification::{AttemptOutcome, DispatchClaim, Notification, StateCount};

/// Column list for `notifications` queries.
const COLUMNS: &str = "id, tenant_id, person_id, notification_type, category, state, \
    destination, subject, body, reference_type, reference_id, scheduled_at, sent_at, \
    attempts, error_message, claim_id, claim_expires_at, created_at, updated_at";

/// Predicate matching one deduplication tuple, binding `$1..=$5`.
const DEDUP_MATCH: &str = "tenant_id = $1 \
    AND person_id IS NOT DISTINCT FROM $2::BIGINT \
    AND category = $3 \
    AND reference_type IS NOT DISTINCT FROM $4::TEXT \
    AND reference_id IS NOT DISTINCT FROM $5::BIGINT";

/// Predicate for rows the sweep may attempt at `$now`.
const DUE_MATCH: &str = "state = 'PENDIENTE' \
    AND (scheduled_at IS NULL OR scheduled_at <= $1) \
    AND (claim_id IS NULL OR claim_expires_at <= $1)";

/// Provides tenant-scoped reads and the conditional writes of the dispatch engine.
pub struct NotificationRepo;

impl NotificationRepo {
    // -----------------------------------------------------------------------
    // Creation
    // -----------------------------------------------------------------------

    /// Insert `new` unless an active row already occupies its dedup tuple.
    ///
    /// Runs in one transaction holding a transaction-scoped advisory lock on
    /// the tuple, so concurrent creates for the same tuple serialize. Returns
    /// the stored row and whether it was inserted by this call.
    pub async fn create_deduplicated(
        pool: &PgPool,
        new: &NewNotification,
        now: Timestamp,
    ) -> Result<(Notification, bool), sqlx::Error> {
        let key = new.dedup_key();
        let mut tx = pool.begin().await?;

        sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
            .bind(lock_key(&key))
            .execute(&mut *tx)
            .await?;

        if let Some(existing) = Self::find_active(&mut tx, &key).await? {
            tx.commit().await?;
            return Ok((existing, false));
        }

        let query = format!(
            "INSERT INTO notifications \
                (tenant_id, person_id, notification_type, category, state, destination, \
                 subject, body, reference_type, reference_id, scheduled_at, attempts, \
                 created_at, updated_at) \
             VALUES ($1, $2, $3, $4, 'PENDIENTE', $5, $6, $7, $8, $9, $10, 0, $11, $11) \
             RETURNING {COLUMNS}"
        );
        let inserted = sqlx::query_as::<_, Notification>(&query)
            .bind(new.tenant_id)
            .bind(new.person_id)
            .bind(new.notification_type.as_str())
            .bind(new.category.as_str())
            .bind(&new.destination)
            .bind(&new.subject)
            .bind(&new.body)
            .bind(&new.reference_type)
            .bind(new.reference_id)
            .bind(new.scheduled_at)
            .bind(now)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok((inserted, true))
    }

    /// Find the oldest `PENDIENTE` or `ENVIADA` row for a dedup tuple.
    pub async fn find_active(
        conn: &mut PgConnection,
        key: &DedupKey,
    ) -> Result<Option<Notification>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM notifications \
             WHERE {DEDUP_MATCH} AND state IN ('PENDIENTE', 'ENVIADA') \
             ORDER BY id \
             LIMIT 1"
        );
        bind_key(sqlx::query_as::<_, Notification>(&query), key)
            .fetch_optional(conn)
            .await
    }

    /// Most recently created row for a dedup tuple, in any state.
    pub async fn latest_for_key(
        pool: &PgPool,
        key: &DedupKey,
    ) -> Result<Option<Notification>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM notifications \
             WHERE {DEDUP_MATCH} \
             ORDER BY created_at DESC, id DESC \
             LIMIT 1"
        );
        bind_key(sqlx::query_as::<_, Notification>(&query), key)
            .fetch_optional(pool)
            .await
    }

    // -----------------------------------------------------------------------
    // Tenant-scoped reads
    // -----------------------------------------------------------------------

    /// Find a notification by ID within a tenant.
    pub async fn find_by_id(
        pool: &PgPool,
        tenant_id: DbId,
        id: DbId,
    ) -> Result<Option<Notification>, sqlx::Error> {
        let query =
            format!("SELECT {COLUMNS} FROM notifications WHERE tenant_id = $1 AND id = $2");
        sqlx::query_as::<_, Notification>(&query)
            .bind(tenant_id)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// List a tenant's notifications, newest first.
    pub async fn list_for_tenant(
        pool: &PgPool,
        tenant_id: DbId,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Notification>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM notifications \
             WHERE tenant_id = $1 \
             ORDER BY created_at DESC, id DESC \
             LIMIT $2 OFFSET $3"
        );
        sqlx::query_as::<_, Notification>(&query)
            .bind(tenant_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await
    }

    /// List a tenant's notifications in one state, newest first.
    pub async fn list_by_state(
        pool: &PgPool,
        tenant_id: DbId,
        state: NotificationState,
    ) -> Result<Vec<Notification>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM notifications \
             WHERE tenant_id = $1 AND state = $2 \
             ORDER BY created_at DESC, id DESC"
        );
        sqlx::query_as::<_, Notification>(&query)
            .bind(tenant_id)
            .bind(state.as_str())
            .fetch_all(pool)
            .await
    }

    /// List a tenant's notifications addressed to one person, newest first.
    pub async fn list_by_person(
        pool: &PgPool,
        tenant_id: DbId,
        person_id: DbId,
    ) -> Result<Vec<Notification>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM notifications \
             WHERE tenant_id = $1 AND person_id = $2 \
             ORDER BY created_at DESC, id DESC"
        );
        sqlx::query_as::<_, Notification>(&query)
            .bind(tenant_id)
            .bind(person_id)
            .fetch_all(pool)
            .await
    }

    /// List a tenant's notifications of one category, newest first.
    pub async fn list_by_category(
        pool: &PgPool,
        tenant_id: DbId,
        category: NotificationCategory,
    ) -> Result<Vec<Notification>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM notifications \
             WHERE tenant_id = $1 AND category = $2 \
             ORDER BY created_at DESC, id DESC"
        );
        sqlx::query_as::<_, Notification>(&query)
            .bind(tenant_id)
            .bind(category.as_str())
            .fetch_all(pool)
            .await
    }

    /// Count a tenant's notifications per state. States with no rows are omitted.
    pub async fn count_by_state(
        pool: &PgPool,
        tenant_id: DbId,
    ) -> Result<Vec<StateCount>, sqlx::Error> {
        sqlx::query_as::<_, StateCount>(
            "SELECT state, COUNT(*) AS count FROM notifications \
             WHERE tenant_id = $1 \
             GROUP BY state \
             ORDER BY state",
        )
        .bind(tenant_id)
        .fetch_all(pool)
        .await
    }

    // -----------------------------------------------------------------------
    // Sweep queries
    // -----------------------------------------------------------------------

    /// Distinct tenants that have at least one row due at `now`.
    pub async fn tenants_with_due(
        pool: &PgPool,
        now: Timestamp,
    ) -> Result<Vec<DbId>, sqlx::Error> {
        let query = format!(
            "SELECT DISTINCT tenant_id FROM notifications \
             WHERE {DUE_MATCH} \
             ORDER BY tenant_id"
        );
        sqlx::query_scalar(&query).bind(now).fetch_all(pool).await
    }

    /// Rows due at `now`, oldest-scheduled first.
    ///
    /// Unscheduled rows order by creation time. `tenant_id = None` spans every
    /// tenant and is meant for the global sweep only.
    pub async fn list_due(
        pool: &PgPool,
        tenant_id: Option<DbId>,
        now: Timestamp,
        limit: i64,
    ) -> Result<Vec<Notification>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM notifications \
             WHERE {DUE_MATCH} AND ($2::BIGINT IS NULL OR tenant_id = $2) \
             ORDER BY COALESCE(scheduled_at, created_at), id \
             LIMIT $3"
        );
        sqlx::query_as::<_, Notification>(&query)
            .bind(now)
            .bind(tenant_id)
            .bind(limit)
            .fetch_all(pool)
            .await
    }

    // -----------------------------------------------------------------------
    // Conditional writes
    // -----------------------------------------------------------------------

    /// Claim a `PENDIENTE` row for one delivery attempt.
    ///
    /// Succeeds only when no other attempt holds an unexpired claim. Returns
    /// `None` if the row is missing, belongs to another tenant, left
    /// `PENDIENTE`, or is claimed.
    pub async fn claim(
        pool: &PgPool,
        tenant_id: DbId,
        id: DbId,
        claim: &DispatchClaim,
        now: Timestamp,
    ) -> Result<Option<Notification>, sqlx::Error> {
        let query = format!(
            "UPDATE notifications \
             SET claim_id = $3, claim_expires_at = $4, updated_at = $5 \
             WHERE tenant_id = $1 AND id = $2 AND state = 'PENDIENTE' \
               AND (claim_id IS NULL OR claim_expires_at <= $5) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Notification>(&query)
            .bind(tenant_id)
            .bind(id)
            .bind(claim.claim_id)
            .bind(claim.expires_at)
            .bind(now)
            .fetch_optional(pool)
            .await
    }

    /// Write the outcome of an attempt and release the claim.
    ///
    /// Applies only while the row is still `PENDIENTE` and held by
    /// `claim_id`; a failure outcome additionally requires `attempts` to move
    /// forward. Returns `None` when the guard did not hold.
    pub async fn complete(
        pool: &PgPool,
        id: DbId,
        claim_id: Uuid,
        outcome: &AttemptOutcome,
        now: Timestamp,
    ) -> Result<Option<Notification>, sqlx::Error> {
        match outcome {
            AttemptOutcome::Sent { sent_at } => {
                let query = format!(
                    "UPDATE notifications \
                     SET state = 'ENVIADA', sent_at = $3, error_message = NULL, \
                         claim_id = NULL, claim_expires_at = NULL, updated_at = $4 \
                     WHERE id = $1 AND state = 'PENDIENTE' AND claim_id = $2 \
                     RETURNING {COLUMNS}"
                );
                sqlx::query_as::<_, Notification>(&query)
                    .bind(id)
                    .bind(claim_id)
                    .bind(*sent_at)
                    .bind(now)
                    .fetch_optional(pool)
                    .await
            }
            AttemptOutcome::Failed {
                attempts, error, ..
            } => {
                let query = format!(
                    "UPDATE notifications \
                     SET state = $3, attempts = $4, error_message = $5, \
                         claim_id = NULL, claim_expires_at = NULL, updated_at = $6 \
                     WHERE id = $1 AND state = 'PENDIENTE' AND claim_id = $2 \
                       AND attempts < $4 \
                     RETURNING {COLUMNS}"
                );
                sqlx::query_as::<_, Notification>(&query)
                    .bind(id)
                    .bind(claim_id)
                    .bind(outcome.resulting_state().as_str())
                    .bind(*attempts)
                    .bind(error)
                    .bind(now)
                    .fetch_optional(pool)
                    .await
            }
        }
    }

    /// Move an unclaimed `PENDIENTE` row to `CANCELADA`.
    ///
    /// Returns `None` when the guard did not hold; the caller re-reads the
    /// row to tell a wrong state from a live claim.
    pub async fn cancel(
        pool: &PgPool,
        tenant_id: DbId,
        id: DbId,
        now: Timestamp,
    ) -> Result<Option<Notification>, sqlx::Error> {
        let query = format!(
            "UPDATE notifications \
             SET state = 'CANCELADA', updated_at = $3 \
             WHERE tenant_id = $1 AND id = $2 AND state = 'PENDIENTE' \
               AND (claim_id IS NULL OR claim_expires_at <= $3) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Notification>(&query)
            .bind(tenant_id)
            .bind(id)
            .bind(now)
            .fetch_optional(pool)
            .await
    }

    /// Move a `FALLIDA` row back to `PENDIENTE`. Attempts are kept.
    pub async fn revive_failed(
        pool: &PgPool,
        tenant_id: DbId,
        id: DbId,
        now: Timestamp,
    ) -> Result<Option<Notification>, sqlx::Error> {
        let query = format!(
            "UPDATE notifications \
             SET state = 'PENDIENTE', updated_at = $3 \
             WHERE tenant_id = $1 AND id = $2 AND state = 'FALLIDA' \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Notification>(&query)
            .bind(tenant_id)
            .bind(id)
            .bind(now)
            .fetch_optional(pool)
            .await
    }
}

/// Bind the five dedup tuple parameters in `DEDUP_MATCH` order.
fn bind_key<'q, O>(
    query: sqlx::query::QueryAs<'q, sqlx::Postgres, O, sqlx::postgres::PgArguments>,
    key: &'q DedupKey,
) -> sqlx::query::QueryAs<'q, sqlx::Postgres, O, sqlx::postgres::PgArguments> {
    query
        .bind(key.tenant_id)
        .bind(key.person_id)
        .bind(key.category.as_str())
        .bind(key.reference_type.as_deref())
        .bind(key.reference_id)
}

/// Advisory lock name for a dedup tuple.
fn lock_key(key: &DedupKey) -> String {
    format!(
        "notification:{}:{}:{}:{}:{}",
        key.tenant_id,
        key.person_id.map(|v| v.to_string()).unwrap_or_default(),
        key.category.as_str(),
        key.reference_type.as_deref().unwrap_or(""),
        key.reference_id.map(|v| v.to_string()).unwrap_or_default(),
    )
}
