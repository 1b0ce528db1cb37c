//! Reminder planning against the engine.

mod common;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, NaiveDate, Utc};
use common::{harness, ScriptedSender};
use inmo_core::notification::{NotificationCategory, NotificationType};
use inmo_core::policy::PolicyUpdate;
use inmo_core::types::DbId;
use inmo_notifications::{EngineError, ReminderCandidate, ReminderPlanner, ReminderSource};

struct FixedSource(Vec<ReminderCandidate>);

#[async_trait]
impl ReminderSource for FixedSource {
    async fn candidates(
        &self,
        _tenant_id: DbId,
        _category: NotificationCategory,
        _today: NaiveDate,
    ) -> Result<Vec<ReminderCandidate>, EngineError> {
        Ok(self.0.clone())
    }
}

fn candidate(contract_id: DbId, due_in_days: i64) -> ReminderCandidate {
    ReminderCandidate {
        person_id: 7,
        person_name: "Ana Pérez".to_string(),
        email: Some("ana@example.com".to_string()),
        phone: None,
        contract_id,
        contract_number: format!("C-{contract_id}"),
        property: "Av. Reforma 100".to_string(),
        amount: Some("1500.00".to_string()),
        due_date: Utc::now().date_naive() + Duration::days(due_in_days),
    }
}

async fn set_lead_time(planner_engine: &inmo_notifications::NotificationEngine, days: i32) {
    let update = PolicyUpdate {
        lead_time_days: Some(days),
        ..PolicyUpdate::for_category(NotificationCategory::ContractExpiry)
    };
    planner_engine.policies().update(1, &update).await.unwrap();
}

#[tokio::test]
async fn creates_reminders_inside_the_lead_time() {
    let h = harness(ScriptedSender::succeeding());
    set_lead_time(&h.engine, 30).await;
    let source = FixedSource(vec![candidate(1, 10), candidate(2, 45)]);
    let planner = ReminderPlanner::new(h.engine.clone(), Arc::new(source));

    let report = planner
        .plan(1, NotificationCategory::ContractExpiry, Utc::now())
        .await
        .unwrap();

    assert_eq!(report.candidates, 2);
    assert_eq!(report.created, 1);
    assert_eq!(report.skipped, 1);

    let rows = h
        .engine
        .find_by_category(1, NotificationCategory::ContractExpiry)
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].reference_id, Some(1));
    assert_eq!(rows[0].reference_type.as_deref(), Some("CONTRATO"));
    assert_eq!(rows[0].notification_type, NotificationType::Email);
    assert!(rows[0].body.contains("C-1"));
}

#[tokio::test]
async fn second_pass_within_cadence_creates_nothing() {
    let h = harness(ScriptedSender::succeeding());
    set_lead_time(&h.engine, 30).await;
    let planner = ReminderPlanner::new(
        h.engine.clone(),
        Arc::new(FixedSource(vec![candidate(1, 10)])),
    );

    let now = Utc::now();
    planner
        .plan(1, NotificationCategory::ContractExpiry, now)
        .await
        .unwrap();
    let again = planner
        .plan(1, NotificationCategory::ContractExpiry, now)
        .await
        .unwrap();

    assert_eq!(again.created, 0);
    assert_eq!(again.skipped, 1);
    assert_eq!(h.store.len().await, 1);
}

#[tokio::test]
async fn pending_reminder_deduplicates_after_cadence() {
    let h = harness(ScriptedSender::succeeding());
    set_lead_time(&h.engine, 30).await;
    let planner = ReminderPlanner::new(
        h.engine.clone(),
        Arc::new(FixedSource(vec![candidate(1, 10)])),
    );

    planner
        .plan(1, NotificationCategory::ContractExpiry, Utc::now())
        .await
        .unwrap();
    let later = planner
        .plan(
            1,
            NotificationCategory::ContractExpiry,
            Utc::now() + Duration::days(2),
        )
        .await
        .unwrap();

    assert_eq!(later.deduplicated, 1);
    assert_eq!(h.store.len().await, 1);
}

#[tokio::test]
async fn inactive_policy_plans_nothing() {
    let h = harness(ScriptedSender::succeeding());
    let update = PolicyUpdate {
        active: Some(false),
        ..PolicyUpdate::for_category(NotificationCategory::PaymentOverdue)
    };
    h.engine.policies().update(1, &update).await.unwrap();
    let planner = ReminderPlanner::new(
        h.engine.clone(),
        Arc::new(FixedSource(vec![candidate(1, -5)])),
    );

    let report = planner
        .plan(1, NotificationCategory::PaymentOverdue, Utc::now())
        .await
        .unwrap();
    assert_eq!(report.candidates, 0);
    assert!(h.store.is_empty().await);
}

#[tokio::test]
async fn candidate_without_usable_channel_is_skipped() {
    let h = harness(ScriptedSender::succeeding());
    let no_contact = ReminderCandidate {
        email: None,
        phone: Some("+5215550000".to_string()),
        ..candidate(1, -5)
    };
    let planner = ReminderPlanner::new(h.engine.clone(), Arc::new(FixedSource(vec![no_contact])));

    let report = planner
        .plan(1, NotificationCategory::PaymentOverdue, Utc::now())
        .await
        .unwrap();
    assert_eq!(report.skipped, 1);
    assert!(h.store.is_empty().await);
}

#[tokio::test]
async fn plan_all_covers_every_reminder_category() {
    let h = harness(ScriptedSender::succeeding());
    let planner = ReminderPlanner::new(
        h.engine.clone(),
        Arc::new(FixedSource(vec![candidate(1, 0), candidate(2, -3)])),
    );

    let report = planner.plan_all(&[1], Utc::now()).await;

    // Due today: contract expiry and payment due. Three days late: overdue.
    assert_eq!(report.created, 3);
    assert_eq!(
        h.engine
            .find_by_category(1, NotificationCategory::PaymentOverdue)
            .await
            .unwrap()
            .len(),
        1
    );
}
