//! Periodic dispatch of due notifications.
//!
//! Each sweep lists the tenants with due work and processes each tenant's
//! backlog independently: at most `batch_per_tenant` rows per tenant,
//! oldest-scheduled first, with up to `workers` tenants in flight at once. A
//! tenant with a large backlog therefore cannot use up another tenant's
//! share of the sweep, and one tenant's failures never stop the others.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use inmo_core::types::{DbId, Timestamp};
use tokio_util::sync::CancellationToken;

use crate::engine::{env_secs, DispatchOutcome, NotificationEngine};

/// Default time between sweeps.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(300);

/// Scheduling knobs for [`NotificationSweeper`].
#[derive(Debug, Clone, Copy)]
pub struct SweepConfig {
    pub interval: Duration,
    /// Tenants processed concurrently.
    pub workers: usize,
    /// Rows attempted per tenant per sweep.
    pub batch_per_tenant: i64,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_SWEEP_INTERVAL,
            workers: 4,
            batch_per_tenant: 100,
        }
    }
}

impl SweepConfig {
    /// Load from environment variables, falling back to defaults.
    ///
    /// | Variable                 | Default |
    /// |--------------------------|---------|
    /// | `SWEEP_INTERVAL_SECS`    | `300`   |
    /// | `SWEEP_WORKERS`          | `4`     |
    /// | `SWEEP_BATCH_PER_TENANT` | `100`   |
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            interval: env_secs("SWEEP_INTERVAL_SECS")
                .filter(|d| !d.is_zero())
                .unwrap_or(defaults.interval),
            workers: std::env::var("SWEEP_WORKERS")
                .ok()
                .and_then(|v| v.trim().parse().ok())
                .filter(|&w| w > 0)
                .unwrap_or(defaults.workers),
            batch_per_tenant: std::env::var("SWEEP_BATCH_PER_TENANT")
                .ok()
                .and_then(|v| v.trim().parse().ok())
                .filter(|&b| b > 0)
                .unwrap_or(defaults.batch_per_tenant),
        }
    }
}

/// Tally of one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub tenants: usize,
    pub attempted: usize,
    pub sent: usize,
    pub retrying: usize,
    pub failed: usize,
    pub skipped: usize,
    /// Rows or tenants whose processing hit a storage error.
    pub errors: usize,
}

impl SweepReport {
    fn merge(mut self, other: SweepReport) -> Self {
        self.tenants += other.tenants;
        self.attempted += other.attempted;
        self.sent += other.sent;
        self.retrying += other.retrying;
        self.failed += other.failed;
        self.skipped += other.skipped;
        self.errors += other.errors;
        self
    }
}

/// Background task driving [`NotificationEngine::dispatch`].
pub struct NotificationSweeper {
    engine: Arc<NotificationEngine>,
    config: SweepConfig,
}

impl NotificationSweeper {
    pub fn new(engine: Arc<NotificationEngine>, config: SweepConfig) -> Self {
        Self { engine, config }
    }

    /// Run sweeps on the configured interval until `cancel` fires.
    ///
    /// Cancelling mid-sweep stops new claims; dispatches already in flight
    /// finish (each bounded by the send timeout) and write their outcome
    /// before the loop exits.
    pub async fn run(self, cancel: CancellationToken) {
        tracing::info!(
            interval_secs = self.config.interval.as_secs(),
            workers = self.config.workers,
            batch_per_tenant = self.config.batch_per_tenant,
            "Notification sweeper started"
        );

        let mut interval = tokio::time::interval(self.config.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Notification sweeper stopping");
                    break;
                }
                _ = interval.tick() => {
                    let report = self.sweep_once(Utc::now(), &cancel).await;
                    if report.attempted > 0 || report.errors > 0 {
                        tracing::info!(
                            tenants = report.tenants,
                            attempted = report.attempted,
                            sent = report.sent,
                            retrying = report.retrying,
                            failed = report.failed,
                            skipped = report.skipped,
                            errors = report.errors,
                            "Notification sweep finished"
                        );
                    } else {
                        tracing::debug!("Notification sweep: nothing due");
                    }
                }
            }
        }
    }

    /// Attempt everything due at `now` once, claiming nothing new after
    /// `cancel` fires.
    pub async fn sweep_once(&self, now: Timestamp, cancel: &CancellationToken) -> SweepReport {
        if cancel.is_cancelled() {
            return SweepReport::default();
        }
        let tenants = match self.engine.tenants_with_due(now).await {
            Ok(tenants) => tenants,
            Err(e) => {
                tracing::error!(error = %e, "Notification sweep: listing due tenants failed");
                return SweepReport {
                    errors: 1,
                    ..SweepReport::default()
                };
            }
        };

        stream::iter(tenants)
            .map(|tenant_id| self.sweep_tenant(tenant_id, now, cancel))
            .buffer_unordered(self.config.workers.max(1))
            .fold(SweepReport::default(), |acc, r| async move { acc.merge(r) })
            .await
    }

    /// Attempt one tenant's due rows in order.
    async fn sweep_tenant(
        &self,
        tenant_id: DbId,
        now: Timestamp,
        cancel: &CancellationToken,
    ) -> SweepReport {
        if cancel.is_cancelled() {
            return SweepReport::default();
        }
        let mut report = SweepReport {
            tenants: 1,
            ..SweepReport::default()
        };

        let due = match self
            .engine
            .due_for_dispatch(tenant_id, now, self.config.batch_per_tenant)
            .await
        {
            Ok(due) => due,
            Err(e) => {
                tracing::error!(tenant_id, error = %e, "Notification sweep: listing due rows failed");
                report.errors += 1;
                return report;
            }
        };

        for notification in &due {
            if cancel.is_cancelled() {
                tracing::info!(
                    tenant_id,
                    remaining = due.len() - report.attempted,
                    "Notification sweep: cancelled, leaving remaining rows for the next run"
                );
                break;
            }
            report.attempted += 1;
            match self.engine.dispatch(notification).await {
                Ok(DispatchOutcome::Sent(_)) => report.sent += 1,
                Ok(DispatchOutcome::Retrying(_)) => report.retrying += 1,
                Ok(DispatchOutcome::Failed(_)) => report.failed += 1,
                Ok(DispatchOutcome::Skipped) => report.skipped += 1,
                Err(e) => {
                    tracing::error!(
                        tenant_id,
                        notification_id = notification.id,
                        error = %e,
                        "Notification sweep: dispatch failed"
                    );
                    report.errors += 1;
                }
            }
        }
        report
    }
}
