//! Repository for the `notification_policies` table.

use inmo_core::notification::NotificationCategory;
use inmo_core::policy::NotificationPolicy;
use inmo_core::types::DbId;
use sqlx::PgPool;

use crate::models::notification_policy::StoredPolicy;

/// Column list for `notification_policies` queries.
const COLUMNS: &str = "id, tenant_id, category, email_enabled, whatsapp_enabled, \
    max_attempts, reminder_cadence_days, lead_time_days, email_template, \
    whatsapp_template, active, created_at, updated_at";

/// Provides lookups and upserts for per-tenant notification policies.
pub struct NotificationPolicyRepo;

impl NotificationPolicyRepo {
    /// Find the stored policy for a tenant and category, active or not.
    pub async fn find(
        pool: &PgPool,
        tenant_id: DbId,
        category: NotificationCategory,
    ) -> Result<Option<StoredPolicy>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM notification_policies \
             WHERE tenant_id = $1 AND category = $2"
        );
        sqlx::query_as::<_, StoredPolicy>(&query)
            .bind(tenant_id)
            .bind(category.as_str())
            .fetch_optional(pool)
            .await
    }

    /// List every stored policy of a tenant, ordered by category.
    pub async fn list_for_tenant(
        pool: &PgPool,
        tenant_id: DbId,
    ) -> Result<Vec<StoredPolicy>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM notification_policies \
             WHERE tenant_id = $1 \
             ORDER BY category"
        );
        sqlx::query_as::<_, StoredPolicy>(&query)
            .bind(tenant_id)
            .fetch_all(pool)
            .await
    }

    /// Insert or replace the policy for `(policy.tenant_id, policy.category)`.
    ///
    /// The caller merges partial updates onto the effective policy first, so
    /// every column is written.
    pub async fn upsert(
        pool: &PgPool,
        policy: &NotificationPolicy,
    ) -> Result<StoredPolicy, sqlx::Error> {
        let query = format!(
            "INSERT INTO notification_policies \
                (tenant_id, category, email_enabled, whatsapp_enabled, max_attempts, \
                 reminder_cadence_days, lead_time_days, email_template, whatsapp_template, active) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
             ON CONFLICT (tenant_id, category) DO UPDATE SET \
                email_enabled = EXCLUDED.email_enabled, \
                whatsapp_enabled = EXCLUDED.whatsapp_enabled, \
                max_attempts = EXCLUDED.max_attempts, \
                reminder_cadence_days = EXCLUDED.reminder_cadence_days, \
                lead_time_days = EXCLUDED.lead_time_days, \
                email_template = EXCLUDED.email_template, \
                whatsapp_template = EXCLUDED.whatsapp_template, \
                active = EXCLUDED.active, \
                updated_at = NOW() \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, StoredPolicy>(&query)
            .bind(policy.tenant_id)
            .bind(policy.category.as_str())
            .bind(policy.email_enabled)
            .bind(policy.whatsapp_enabled)
            .bind(policy.max_attempts)
            .bind(policy.reminder_cadence_days)
            .bind(policy.lead_time_days)
            .bind(&policy.email_template)
            .bind(&policy.whatsapp_template)
            .bind(policy.active)
            .fetch_one(pool)
            .await
    }
}
