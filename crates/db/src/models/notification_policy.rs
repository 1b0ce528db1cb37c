use inmo_core::notification::NotificationCategory;
use inmo_core::policy::NotificationPolicy;
use inmo_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `notification_policies` table.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize)]
pub struct StoredPolicy {
    pub id: DbId,
    pub tenant_id: DbId,
    #[sqlx(try_from = "String")]
    pub category: NotificationCategory,
    pub email_enabled: bool,
    pub whatsapp_enabled: bool,
    pub max_attempts: i32,
    pub reminder_cadence_days: i32,
    pub lead_time_days: i32,
    pub email_template: Option<String>,
    pub whatsapp_template: Option<String>,
    pub active: bool,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl StoredPolicy {
    pub fn into_policy(self) -> NotificationPolicy {
        NotificationPolicy {
            tenant_id: self.tenant_id,
            category: self.category,
            email_enabled: self.email_enabled,
            whatsapp_enabled: self.whatsapp_enabled,
            max_attempts: self.max_attempts,
            reminder_cadence_days: self.reminder_cadence_days,
            lead_time_days: self.lead_time_days,
            email_template: self.email_template,
            whatsapp_template: self.whatsapp_template,
            active: self.active,
        }
    }
}
