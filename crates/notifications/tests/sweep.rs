//! Sweep fairness, isolation, and shutdown.

mod common;

use std::time::Duration;

use chrono::Utc;
use common::{harness, request, scheduled, ScriptedSender};
use inmo_core::notification::{CreateNotificationRequest, NotificationState};
use inmo_notifications::{NotificationSweeper, SweepConfig, SweepReport};
use tokio_util::sync::CancellationToken;

fn config(batch_per_tenant: i64) -> SweepConfig {
    SweepConfig {
        interval: Duration::from_millis(20),
        workers: 4,
        batch_per_tenant,
    }
}

#[tokio::test]
async fn large_backlog_does_not_starve_other_tenants() {
    let h = harness(ScriptedSender::succeeding());
    for reference in 0..10 {
        h.engine.create(1, request(reference)).await.unwrap();
    }
    let (small, _) = h.engine.create(2, request(100)).await.unwrap();

    let sweeper = NotificationSweeper::new(h.engine.clone(), config(3));
    let report = sweeper.sweep_once(Utc::now(), &CancellationToken::new()).await;

    assert_eq!(report.tenants, 2);
    assert_eq!(report.sent, 4);
    assert_eq!(
        h.engine.get(2, small.id).await.unwrap().state,
        NotificationState::Sent
    );
    assert_eq!(h.engine.summary(1).await.unwrap().pending, 7);
}

#[tokio::test]
async fn batch_takes_the_oldest_scheduled_rows() {
    let h = harness(ScriptedSender::succeeding());
    let now = Utc::now();
    let (recent, _) = h
        .engine
        .create(1, scheduled(1, now - chrono::Duration::minutes(1)))
        .await
        .unwrap();
    let (oldest, _) = h
        .engine
        .create(1, scheduled(2, now - chrono::Duration::days(2)))
        .await
        .unwrap();

    let sweeper = NotificationSweeper::new(h.engine.clone(), config(1));
    sweeper.sweep_once(now, &CancellationToken::new()).await;

    assert_eq!(
        h.engine.get(1, oldest.id).await.unwrap().state,
        NotificationState::Sent
    );
    assert_eq!(
        h.engine.get(1, recent.id).await.unwrap().state,
        NotificationState::Pending
    );
}

#[tokio::test]
async fn one_tenant_failing_does_not_stop_another() {
    let h = harness(ScriptedSender::failing_for("broken@example.com"));
    let broken = CreateNotificationRequest {
        destination: Some("broken@example.com".to_string()),
        ..request(1)
    };
    let (bad, _) = h.engine.create(1, broken).await.unwrap();
    let (good, _) = h.engine.create(2, request(2)).await.unwrap();

    let sweeper = NotificationSweeper::new(h.engine.clone(), config(10));
    let report = sweeper.sweep_once(Utc::now(), &CancellationToken::new()).await;

    assert_eq!(report.retrying, 1);
    assert_eq!(report.sent, 1);
    assert_eq!(report.errors, 0);
    let bad = h.engine.get(1, bad.id).await.unwrap();
    assert_eq!(bad.state, NotificationState::Pending);
    assert_eq!(bad.attempts, 1);
    assert_eq!(
        h.engine.get(2, good.id).await.unwrap().state,
        NotificationState::Sent
    );
}

#[tokio::test]
async fn repeated_sweeps_exhaust_attempts() {
    let h = harness(ScriptedSender::failing_for("ana@example.com"));
    let (n, _) = h.engine.create(1, request(42)).await.unwrap();
    let sweeper = NotificationSweeper::new(h.engine.clone(), config(10));

    for _ in 0..5 {
        sweeper.sweep_once(Utc::now(), &CancellationToken::new()).await;
    }

    let row = h.engine.get(1, n.id).await.unwrap();
    assert_eq!(row.state, NotificationState::Failed);
    assert_eq!(row.attempts, 3);
    assert_eq!(h.sender.calls(), 3);
}

#[tokio::test]
async fn nothing_due_is_an_empty_report() {
    let h = harness(ScriptedSender::succeeding());
    h.engine
        .create(1, scheduled(1, Utc::now() + chrono::Duration::days(1)))
        .await
        .unwrap();

    let sweeper = NotificationSweeper::new(h.engine.clone(), config(10));
    let report = sweeper.sweep_once(Utc::now(), &CancellationToken::new()).await;
    assert_eq!(report.attempted, 0);
    assert_eq!(h.sender.calls(), 0);
}

#[tokio::test]
async fn run_delivers_and_stops_on_cancel() {
    let h = harness(ScriptedSender::succeeding());
    let (n, _) = h.engine.create(1, request(42)).await.unwrap();

    let cancel = CancellationToken::new();
    let sweeper = NotificationSweeper::new(h.engine.clone(), config(10));
    let handle = tokio::spawn(sweeper.run(cancel.clone()));

    tokio::time::sleep(Duration::from_millis(100)).await;
    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .expect("sweeper should stop after cancel")
        .unwrap();

    assert_eq!(
        h.engine.get(1, n.id).await.unwrap().state,
        NotificationState::Sent
    );
    assert_eq!(h.sender.calls(), 1);
}

#[tokio::test]
async fn cancel_mid_sweep_claims_no_further_rows() {
    let h = harness(ScriptedSender::slow(Duration::from_millis(100)));
    for reference in 0..20 {
        h.engine.create(1, request(reference)).await.unwrap();
    }

    let cancel = CancellationToken::new();
    let sweeper = NotificationSweeper::new(
        h.engine.clone(),
        SweepConfig {
            workers: 1,
            ..config(100)
        },
    );
    let handle = tokio::spawn(sweeper.run(cancel.clone()));

    tokio::time::sleep(Duration::from_millis(50)).await;
    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .expect("sweeper should stop once the in-flight send finishes")
        .unwrap();

    assert_eq!(h.sender.calls(), 1);
    let summary = h.engine.summary(1).await.unwrap();
    assert_eq!(summary.sent, 1);
    assert_eq!(summary.pending, 19);

    // Untouched rows are immediately due again, not held by a claim.
    let due = h.engine.due_for_dispatch(1, Utc::now(), 100).await.unwrap();
    assert_eq!(due.len(), 19);
}

#[tokio::test]
async fn cancelled_token_sweeps_nothing() {
    let h = harness(ScriptedSender::succeeding());
    h.engine.create(1, request(42)).await.unwrap();

    let cancel = CancellationToken::new();
    cancel.cancel();
    let sweeper = NotificationSweeper::new(h.engine.clone(), config(10));
    let report = sweeper.sweep_once(Utc::now(), &cancel).await;

    assert_eq!(report, SweepReport::default());
    assert_eq!(h.sender.calls(), 0);
}
