//! Per-tenant, per-category notification policy value object.
//!
//! A policy decides which channels may be used, how many delivery attempts a
//! notification gets, and how reminders are paced. Tenants without a stored
//! policy for a category get [`NotificationPolicy::default_for`].

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::notification::{NotificationCategory, NotificationType};
use crate::types::DbId;

/// Delivery attempts before a notification is marked failed.
pub const DEFAULT_MAX_ATTEMPTS: i32 = 3;
/// Minimum days between two reminders for the same subject.
pub const DEFAULT_REMINDER_CADENCE_DAYS: i32 = 1;
/// Days before the triggering date that reminders start.
pub const DEFAULT_LEAD_TIME_DAYS: i32 = 0;

/// Effective delivery policy for one tenant and category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationPolicy {
    pub tenant_id: DbId,
    pub category: NotificationCategory,
    pub email_enabled: bool,
    /// Alternate channel toggle (WhatsApp / SMS).
    pub whatsapp_enabled: bool,
    pub max_attempts: i32,
    pub reminder_cadence_days: i32,
    pub lead_time_days: i32,
    pub email_template: Option<String>,
    pub whatsapp_template: Option<String>,
    pub active: bool,
}

impl NotificationPolicy {
    /// The built-in policy used when nothing active is stored for the pair.
    pub fn default_for(tenant_id: DbId, category: NotificationCategory) -> Self {
        Self {
            tenant_id,
            category,
            email_enabled: true,
            whatsapp_enabled: false,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            reminder_cadence_days: DEFAULT_REMINDER_CADENCE_DAYS,
            lead_time_days: DEFAULT_LEAD_TIME_DAYS,
            email_template: None,
            whatsapp_template: None,
            active: true,
        }
    }

    /// Whether this policy allows delivery over `channel`.
    pub fn channel_enabled(&self, channel: NotificationType) -> bool {
        match channel {
            NotificationType::Email => self.email_enabled,
            NotificationType::Whatsapp | NotificationType::Sms => self.whatsapp_enabled,
        }
    }

    /// Whether `attempts` failed deliveries use up the retry ceiling.
    pub fn attempts_exhausted(&self, attempts: i32) -> bool {
        attempts >= self.max_attempts
    }

    /// Template configured for `channel`, if any non-empty one exists.
    pub fn template_for(&self, channel: NotificationType) -> Option<&str> {
        let template = match channel {
            NotificationType::Email => self.email_template.as_deref(),
            NotificationType::Whatsapp | NotificationType::Sms => self.whatsapp_template.as_deref(),
        };
        template.filter(|t| !t.trim().is_empty())
    }

    /// Merge the fields explicitly present in `update` into this policy.
    pub fn apply(&mut self, update: &PolicyUpdate) {
        if let Some(v) = update.email_enabled {
            self.email_enabled = v;
        }
        if let Some(v) = update.whatsapp_enabled {
            self.whatsapp_enabled = v;
        }
        if let Some(v) = update.max_attempts {
            self.max_attempts = v;
        }
        if let Some(v) = update.reminder_cadence_days {
            self.reminder_cadence_days = v;
        }
        if let Some(v) = update.lead_time_days {
            self.lead_time_days = v;
        }
        if let Some(v) = &update.email_template {
            self.email_template = Some(v.clone());
        }
        if let Some(v) = &update.whatsapp_template {
            self.whatsapp_template = Some(v.clone());
        }
        if let Some(v) = update.active {
            self.active = v;
        }
    }
}

/// Partial policy update. Absent fields keep their stored (or default) value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PolicyUpdate {
    pub category: Option<NotificationCategory>,
    pub email_enabled: Option<bool>,
    pub whatsapp_enabled: Option<bool>,
    pub max_attempts: Option<i32>,
    pub reminder_cadence_days: Option<i32>,
    pub lead_time_days: Option<i32>,
    pub email_template: Option<String>,
    pub whatsapp_template: Option<String>,
    pub active: Option<bool>,
}

impl PolicyUpdate {
    /// An update targeting `category` with no fields set.
    pub fn for_category(category: NotificationCategory) -> Self {
        Self {
            category: Some(category),
            ..Self::default()
        }
    }

    /// Check field constraints and return the targeted category.
    pub fn validate(&self) -> Result<NotificationCategory, CoreError> {
        let category = self
            .category
            .ok_or_else(|| CoreError::InvalidPolicy("category is required".to_string()))?;
        if let Some(v) = self.max_attempts {
            if v < 1 {
                return Err(CoreError::InvalidPolicy(format!(
                    "max_attempts must be at least 1, got {v}"
                )));
            }
        }
        if let Some(v) = self.reminder_cadence_days {
            if v < 1 {
                return Err(CoreError::InvalidPolicy(format!(
                    "reminder_cadence_days must be at least 1, got {v}"
                )));
            }
        }
        if let Some(v) = self.lead_time_days {
            if v < 0 {
                return Err(CoreError::InvalidPolicy(format!(
                    "lead_time_days must not be negative, got {v}"
                )));
            }
        }
        Ok(category)
    }
}
