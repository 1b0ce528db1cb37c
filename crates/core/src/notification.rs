//! Notification vocabulary, validation, and the delivery state machine.
//!
//! String values match the `notifications` table and the JSON wire format,
//! which keep the names used by existing clients (`PENDIENTE`, `ENVIADA`, ...).

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::channels::{CHANNEL_EMAIL, CHANNEL_SMS, CHANNEL_WHATSAPP, VALID_CHANNELS};
use crate::error::CoreError;
use crate::types::{DbId, Timestamp};

// ---------------------------------------------------------------------------
// State constants
// ---------------------------------------------------------------------------

/// Created and waiting for (another) delivery attempt.
pub const STATE_PENDING: &str = "PENDIENTE";
/// Delivered successfully. Terminal.
pub const STATE_SENT: &str = "ENVIADA";
/// Attempts exhausted. Only an explicit retry revives it.
pub const STATE_FAILED: &str = "FALLIDA";
/// Cancelled by a user before delivery. Terminal.
pub const STATE_CANCELLED: &str = "CANCELADA";

/// All valid notification states.
pub const VALID_STATES: &[&str] = &[STATE_PENDING, STATE_SENT, STATE_FAILED, STATE_CANCELLED];

// ---------------------------------------------------------------------------
// Category constants
// ---------------------------------------------------------------------------

pub const CATEGORY_CONTRACT_EXPIRY: &str = "VENCIMIENTO_CONTRATO";
pub const CATEGORY_PAYMENT_DUE: &str = "PAGO_PENDIENTE";
pub const CATEGORY_PAYMENT_OVERDUE: &str = "PAGO_VENCIDO";
pub const CATEGORY_PAYMENT_CONFIRMATION: &str = "CONFIRMACION_PAGO";
pub const CATEGORY_GENERAL_REMINDER: &str = "RECORDATORIO_GENERAL";
pub const CATEGORY_DELINQUENCY_ALERT: &str = "ALERTA_MOROSIDAD";

/// All valid notification categories.
pub const VALID_CATEGORIES: &[&str] = &[
    CATEGORY_CONTRACT_EXPIRY,
    CATEGORY_PAYMENT_DUE,
    CATEGORY_PAYMENT_OVERDUE,
    CATEGORY_PAYMENT_CONFIRMATION,
    CATEGORY_GENERAL_REMINDER,
    CATEGORY_DELINQUENCY_ALERT,
];

// ---------------------------------------------------------------------------
// NotificationState
// ---------------------------------------------------------------------------

/// Delivery state of a notification record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NotificationState {
    #[serde(rename = "PENDIENTE")]
    Pending,
    #[serde(rename = "ENVIADA")]
    Sent,
    #[serde(rename = "FALLIDA")]
    Failed,
    #[serde(rename = "CANCELADA")]
    Cancelled,
}

impl NotificationState {
    /// Return the database string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => STATE_PENDING,
            Self::Sent => STATE_SENT,
            Self::Failed => STATE_FAILED,
            Self::Cancelled => STATE_CANCELLED,
        }
    }

    /// Parse from a string, returning an error for unknown states.
    pub fn from_str(s: &str) -> Result<Self, CoreError> {
        match s {
            STATE_PENDING => Ok(Self::Pending),
            STATE_SENT => Ok(Self::Sent),
            STATE_FAILED => Ok(Self::Failed),
            STATE_CANCELLED => Ok(Self::Cancelled),
            other => Err(CoreError::Validation(format!(
                "Unknown notification state: '{other}'. Valid states: {}",
                VALID_STATES.join(", ")
            ))),
        }
    }

    /// Whether a record in this state blocks creation of a duplicate.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Pending | Self::Sent)
    }

    /// Whether no transition out of this state exists at all.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Sent | Self::Cancelled)
    }
}

impl fmt::Display for NotificationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for NotificationState {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_str(&value)
    }
}

// ---------------------------------------------------------------------------
// NotificationType
// ---------------------------------------------------------------------------

/// Delivery channel of a single notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NotificationType {
    #[serde(rename = "EMAIL")]
    Email,
    #[serde(rename = "WHATSAPP")]
    Whatsapp,
    #[serde(rename = "SMS")]
    Sms,
}

impl NotificationType {
    /// Return the database string representation (also the channel name).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Email => CHANNEL_EMAIL,
            Self::Whatsapp => CHANNEL_WHATSAPP,
            Self::Sms => CHANNEL_SMS,
        }
    }

    /// Parse from a string, returning an error for unknown types.
    pub fn from_str(s: &str) -> Result<Self, CoreError> {
        match s {
            CHANNEL_EMAIL => Ok(Self::Email),
            CHANNEL_WHATSAPP => Ok(Self::Whatsapp),
            CHANNEL_SMS => Ok(Self::Sms),
            other => Err(CoreError::Validation(format!(
                "Unknown notification type: '{other}'. Valid types: {}",
                VALID_CHANNELS.join(", ")
            ))),
        }
    }
}

impl fmt::Display for NotificationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for NotificationType {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_str(&value)
    }
}

// ---------------------------------------------------------------------------
// NotificationCategory
// ---------------------------------------------------------------------------

/// Business event family a notification belongs to. Policies are keyed by it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NotificationCategory {
    #[serde(rename = "VENCIMIENTO_CONTRATO")]
    ContractExpiry,
    #[serde(rename = "PAGO_PENDIENTE")]
    PaymentDue,
    #[serde(rename = "PAGO_VENCIDO")]
    PaymentOverdue,
    #[serde(rename = "CONFIRMACION_PAGO")]
    PaymentConfirmation,
    #[serde(rename = "RECORDATORIO_GENERAL")]
    GeneralReminder,
    #[serde(rename = "ALERTA_MOROSIDAD")]
    DelinquencyAlert,
}

impl NotificationCategory {
    /// Return the database string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ContractExpiry => CATEGORY_CONTRACT_EXPIRY,
            Self::PaymentDue => CATEGORY_PAYMENT_DUE,
            Self::PaymentOverdue => CATEGORY_PAYMENT_OVERDUE,
            Self::PaymentConfirmation => CATEGORY_PAYMENT_CONFIRMATION,
            Self::GeneralReminder => CATEGORY_GENERAL_REMINDER,
            Self::DelinquencyAlert => CATEGORY_DELINQUENCY_ALERT,
        }
    }

    /// Parse from a string, returning an error for unknown categories.
    pub fn from_str(s: &str) -> Result<Self, CoreError> {
        match s {
            CATEGORY_CONTRACT_EXPIRY => Ok(Self::ContractExpiry),
            CATEGORY_PAYMENT_DUE => Ok(Self::PaymentDue),
            CATEGORY_PAYMENT_OVERDUE => Ok(Self::PaymentOverdue),
            CATEGORY_PAYMENT_CONFIRMATION => Ok(Self::PaymentConfirmation),
            CATEGORY_GENERAL_REMINDER => Ok(Self::GeneralReminder),
            CATEGORY_DELINQUENCY_ALERT => Ok(Self::DelinquencyAlert),
            other => Err(CoreError::Validation(format!(
                "Unknown notification category: '{other}'. Valid categories: {}",
                VALID_CATEGORIES.join(", ")
            ))),
        }
    }
}

impl fmt::Display for NotificationCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for NotificationCategory {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_str(&value)
    }
}

// ---------------------------------------------------------------------------
// State machine
// ---------------------------------------------------------------------------

/// Allowed notification state changes.
///
/// `Pending -> Pending` after a failed attempt is not a state change; the
/// attempt counter moves but the state does not.
pub mod state_machine {
    use super::NotificationState::{self, *};
    use crate::error::CoreError;

    /// Returns the set of states reachable from `from`.
    ///
    /// `Failed -> Pending` exists only for the explicit retry operation.
    pub fn valid_transitions(from: NotificationState) -> &'static [NotificationState] {
        match from {
            Pending => &[Sent, Failed, Cancelled],
            Failed => &[Pending],
            Sent | Cancelled => &[],
        }
    }

    /// Check whether a transition from `from` to `to` is valid.
    pub fn can_transition(from: NotificationState, to: NotificationState) -> bool {
        valid_transitions(from).contains(&to)
    }

    /// Validate a state transition, returning `InvalidTransition` for invalid ones.
    pub fn validate_transition(
        from: NotificationState,
        to: NotificationState,
    ) -> Result<(), CoreError> {
        if can_transition(from, to) {
            Ok(())
        } else {
            Err(CoreError::InvalidTransition { from, to })
        }
    }
}

// ---------------------------------------------------------------------------
// Creation input
// ---------------------------------------------------------------------------

/// Body of a create request, as sent by clients or business modules.
///
/// The tenant is deliberately absent: it always comes from the verified
/// credential of the calling request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateNotificationRequest {
    pub person_id: Option<DbId>,
    pub notification_type: Option<NotificationType>,
    pub category: Option<NotificationCategory>,
    pub destination: Option<String>,
    pub subject: Option<String>,
    pub body: Option<String>,
    pub reference_type: Option<String>,
    pub reference_id: Option<DbId>,
    pub scheduled_at: Option<Timestamp>,
}

/// A validated notification ready to be stored for a specific tenant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewNotification {
    pub tenant_id: DbId,
    pub person_id: Option<DbId>,
    pub notification_type: NotificationType,
    pub category: NotificationCategory,
    pub destination: String,
    pub subject: String,
    pub body: String,
    pub reference_type: Option<String>,
    pub reference_id: Option<DbId>,
    pub scheduled_at: Option<Timestamp>,
}

/// The tuple under which at most one active notification may exist.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DedupKey {
    pub tenant_id: DbId,
    pub person_id: Option<DbId>,
    pub category: NotificationCategory,
    pub reference_type: Option<String>,
    pub reference_id: Option<DbId>,
}

impl CreateNotificationRequest {
    /// Validate required fields and bind the request to `tenant_id`.
    ///
    /// Category and type must be present; destination, subject, and body
    /// must contain at least one non-whitespace character.
    pub fn into_new(self, tenant_id: DbId) -> Result<NewNotification, CoreError> {
        let category = self
            .category
            .ok_or_else(|| CoreError::Validation("category is required".to_string()))?;
        let notification_type = self
            .notification_type
            .ok_or_else(|| CoreError::Validation("notification_type is required".to_string()))?;
        let destination = require_non_blank("destination", self.destination)?;
        let subject = require_non_blank("subject", self.subject)?;
        let body = require_non_blank("body", self.body)?;

        Ok(NewNotification {
            tenant_id,
            person_id: self.person_id,
            notification_type,
            category,
            destination,
            subject,
            body,
            reference_type: self.reference_type.filter(|t| !t.trim().is_empty()),
            reference_id: self.reference_id,
            scheduled_at: self.scheduled_at,
        })
    }
}

impl NewNotification {
    /// The deduplication tuple for this notification.
    pub fn dedup_key(&self) -> DedupKey {
        DedupKey {
            tenant_id: self.tenant_id,
            person_id: self.person_id,
            category: self.category,
            reference_type: self.reference_type.clone(),
            reference_id: self.reference_id,
        }
    }
}

/// Validate that a required text field is present and not blank.
pub fn require_non_blank(field: &str, value: Option<String>) -> Result<String, CoreError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(CoreError::Validation(format!("{field} must not be blank"))),
    }
}
