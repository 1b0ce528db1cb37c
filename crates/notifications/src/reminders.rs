//! Reminder planning for contract and payment deadlines.
//!
//! Business modules expose their upcoming deadlines through
//! [`ReminderSource`]. [`ReminderPlanner`] filters them by the tenant's
//! policy (lead time, cadence, enabled channels), renders the message, and
//! hands the result to [`NotificationEngine::create`], which deduplicates.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use inmo_core::notification::{
    CreateNotificationRequest, DedupKey, NotificationCategory, NotificationType,
};
use inmo_core::policy::NotificationPolicy;
use inmo_core::template::{
    self, VAR_AMOUNT, VAR_CONTRACT_NUMBER, VAR_DAYS_OVERDUE, VAR_DAYS_REMAINING, VAR_DUE_DATE,
    VAR_NAME, VAR_PROPERTY,
};
use inmo_core::types::{DbId, Timestamp};

use crate::engine::NotificationEngine;
use crate::error::EngineError;

/// Reference type recorded on reminders about a contract.
pub const REFERENCE_CONTRACT: &str = "CONTRATO";

/// Categories the planner knows how to produce.
pub const PLANNED_CATEGORIES: &[NotificationCategory] = &[
    NotificationCategory::ContractExpiry,
    NotificationCategory::PaymentDue,
    NotificationCategory::PaymentOverdue,
];

/// One person/contract deadline offered by a business module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReminderCandidate {
    pub person_id: DbId,
    pub person_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub contract_id: DbId,
    pub contract_number: String,
    pub property: String,
    /// Outstanding amount, already formatted for display.
    pub amount: Option<String>,
    /// Contract end date or payment due date.
    pub due_date: NaiveDate,
}

/// Supplies reminder candidates for a tenant and category.
#[async_trait]
pub trait ReminderSource: Send + Sync {
    async fn candidates(
        &self,
        tenant_id: DbId,
        category: NotificationCategory,
        today: NaiveDate,
    ) -> Result<Vec<ReminderCandidate>, EngineError>;
}

/// Tally of one planning pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlanReport {
    pub candidates: usize,
    pub created: usize,
    /// Candidates that matched an active notification instead.
    pub deduplicated: usize,
    /// Candidates outside the lead-time window, inside the cadence, or
    /// without a usable channel.
    pub skipped: usize,
}

/// Creates reminder notifications from business deadlines.
pub struct ReminderPlanner {
    engine: Arc<NotificationEngine>,
    source: Arc<dyn ReminderSource>,
}

impl ReminderPlanner {
    pub fn new(engine: Arc<NotificationEngine>, source: Arc<dyn ReminderSource>) -> Self {
        Self { engine, source }
    }

    /// Plan every known category for each tenant. Errors are logged per
    /// tenant and category and do not stop the pass.
    pub async fn plan_all(&self, tenants: &[DbId], now: Timestamp) -> PlanReport {
        let mut total = PlanReport::default();
        for &tenant_id in tenants {
            for &category in PLANNED_CATEGORIES {
                match self.plan(tenant_id, category, now).await {
                    Ok(r) => {
                        total.candidates += r.candidates;
                        total.created += r.created;
                        total.deduplicated += r.deduplicated;
                        total.skipped += r.skipped;
                    }
                    Err(e) => {
                        tracing::error!(
                            tenant_id,
                            category = %category,
                            error = %e,
                            "Reminder planning failed"
                        );
                    }
                }
            }
        }
        total
    }

    /// Plan reminders of one category for one tenant.
    ///
    /// A stored but inactive policy disables planning for the pair; a missing
    /// policy plans with the defaults.
    pub async fn plan(
        &self,
        tenant_id: DbId,
        category: NotificationCategory,
        now: Timestamp,
    ) -> Result<PlanReport, EngineError> {
        let policy = match self.engine.policies().stored(tenant_id, category).await? {
            Some(p) if !p.active => {
                tracing::debug!(tenant_id, category = %category, "Policy inactive, no reminders");
                return Ok(PlanReport::default());
            }
            Some(p) => p,
            None => NotificationPolicy::default_for(tenant_id, category),
        };

        let today = now.date_naive();
        let candidates = self.source.candidates(tenant_id, category, today).await?;
        let mut report = PlanReport {
            candidates: candidates.len(),
            ..PlanReport::default()
        };

        for candidate in &candidates {
            let days_remaining = (candidate.due_date - today).num_days();
            if !in_window(category, &policy, days_remaining) {
                report.skipped += 1;
                continue;
            }

            let key = DedupKey {
                tenant_id,
                person_id: Some(candidate.person_id),
                category,
                reference_type: Some(REFERENCE_CONTRACT.to_string()),
                reference_id: Some(candidate.contract_id),
            };
            if let Some(last) = self.engine.latest_for_key(&key).await? {
                let next_allowed = last.created_at
                    + chrono::Duration::days(i64::from(policy.reminder_cadence_days));
                if now < next_allowed {
                    tracing::debug!(
                        tenant_id,
                        person_id = candidate.person_id,
                        contract_id = candidate.contract_id,
                        %next_allowed,
                        "Reminder within cadence, skipping"
                    );
                    report.skipped += 1;
                    continue;
                }
            }

            let Some((channel, destination)) = pick_channel(&policy, candidate) else {
                report.skipped += 1;
                continue;
            };

            let request = CreateNotificationRequest {
                person_id: Some(candidate.person_id),
                notification_type: Some(channel),
                category: Some(category),
                destination: Some(destination),
                subject: Some(subject(category, candidate)),
                body: Some(body(category, &policy, channel, candidate, days_remaining)),
                reference_type: Some(REFERENCE_CONTRACT.to_string()),
                reference_id: Some(candidate.contract_id),
                scheduled_at: None,
            };
            let (_, created) = self.engine.create(tenant_id, request).await?;
            if created {
                report.created += 1;
            } else {
                report.deduplicated += 1;
            }
        }

        tracing::info!(
            tenant_id,
            category = %category,
            candidates = report.candidates,
            created = report.created,
            "Reminder planning finished"
        );
        Ok(report)
    }
}

/// Whether a deadline `days_remaining` away is due for a reminder.
fn in_window(category: NotificationCategory, policy: &NotificationPolicy, days_remaining: i64) -> bool {
    let lead = i64::from(policy.lead_time_days);
    match category {
        NotificationCategory::ContractExpiry | NotificationCategory::PaymentDue => {
            (0..=lead).contains(&days_remaining)
        }
        NotificationCategory::PaymentOverdue => days_remaining < 0,
        _ => false,
    }
}

/// Email when enabled and known, otherwise WhatsApp when enabled and known.
fn pick_channel(
    policy: &NotificationPolicy,
    candidate: &ReminderCandidate,
) -> Option<(NotificationType, String)> {
    let usable = |v: &Option<String>| v.as_ref().filter(|s| !s.trim().is_empty()).cloned();

    if policy.channel_enabled(NotificationType::Email) {
        if let Some(email) = usable(&candidate.email) {
            return Some((NotificationType::Email, email));
        }
    }
    if policy.channel_enabled(NotificationType::Whatsapp) {
        if let Some(phone) = usable(&candidate.phone) {
            return Some((NotificationType::Whatsapp, phone));
        }
    }
    None
}

fn subject(category: NotificationCategory, c: &ReminderCandidate) -> String {
    match category {
        NotificationCategory::ContractExpiry => {
            format!("Aviso: Contrato próximo a vencer - {}", c.property)
        }
        NotificationCategory::PaymentOverdue => format!("URGENTE: Pago vencido - {}", c.property),
        _ => format!("Recordatorio de pago - {}", c.property),
    }
}

fn body(
    category: NotificationCategory,
    policy: &NotificationPolicy,
    channel: NotificationType,
    c: &ReminderCandidate,
    days_remaining: i64,
) -> String {
    let amount = c.amount.clone().unwrap_or_else(|| "0".to_string());

    if let Some(tpl) = policy.template_for(channel) {
        return template::render(
            tpl,
            &[
                (VAR_NAME, c.person_name.clone()),
                (VAR_PROPERTY, c.property.clone()),
                (VAR_AMOUNT, amount),
                (VAR_DUE_DATE, c.due_date.to_string()),
                (VAR_DAYS_REMAINING, days_remaining.max(0).to_string()),
                (VAR_DAYS_OVERDUE, (-days_remaining).max(0).to_string()),
                (VAR_CONTRACT_NUMBER, c.contract_number.clone()),
            ],
        );
    }

    match category {
        NotificationCategory::ContractExpiry => format!(
            "Estimado(a) {},\n\nLe informamos que su contrato de arrendamiento número {} \
             para la propiedad ubicada en {} vencerá en {} días (fecha: {}).\n\n\
             Por favor, comuníquese con nosotros para discutir la renovación o \
             terminación del contrato.\n\nSaludos cordiales,\nAdministración",
            c.person_name, c.contract_number, c.property, days_remaining, c.due_date
        ),
        NotificationCategory::PaymentOverdue => format!(
            "Estimado(a) {},\n\nLe informamos que tiene un pago vencido desde hace {} días \
             por la cantidad de ${} correspondiente a la propiedad ubicada en {}.\n\n\
             Es urgente que regularice su situación para evitar cargos adicionales.\n\n\
             Saludos cordiales,\nAdministración",
            c.person_name, -days_remaining, amount, c.property
        ),
        _ => format!(
            "Estimado(a) {},\n\nLe recordamos que tiene un pago pendiente por la cantidad \
             de ${} correspondiente a la propiedad ubicada en {}.\n\n\
             Por favor, realice su pago a la brevedad posible.\n\n\
             Saludos cordiales,\nAdministración",
            c.person_name, amount, c.property
        ),
    }
}
