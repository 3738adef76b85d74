use super::notification::NotificationGate;
use super::resolver::StatusResolver;
use crate::config::SchedulerConfig;
use crate::domain::payment::{PaymentRecord, PaymentStatus};
use crate::domain::ports::PaymentStoreRef;
use crate::domain::resolution::Resolution;
use crate::error::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Semaphore, watch};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// What one record check ended up doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckOutcome {
    Succeeded,
    Cancelled,
    Unchanged,
    Failed,
}

/// Per-tick counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub checked: usize,
    pub succeeded: usize,
    pub cancelled: usize,
    pub unchanged: usize,
    pub failed: usize,
}

impl TickReport {
    fn record(&mut self, outcome: CheckOutcome) {
        match outcome {
            CheckOutcome::Succeeded => self.succeeded += 1,
            CheckOutcome::Cancelled => self.cancelled += 1,
            CheckOutcome::Unchanged => self.unchanged += 1,
            CheckOutcome::Failed => self.failed += 1,
        }
    }
}

/// Everything a single spawned check needs, cheap to clone into a task.
#[derive(Clone)]
struct RecordChecker {
    store: PaymentStoreRef,
    resolver: Arc<StatusResolver>,
    gate: NotificationGate,
    check_timeout: Duration,
}

impl RecordChecker {
    async fn run(&self, record: PaymentRecord) -> CheckOutcome {
        let payment_id = record.id.clone();
        match self.check(record).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(payment_id = %payment_id, error = %e, "reconciliation: check failed");
                CheckOutcome::Failed
            }
        }
    }

    async fn check(&self, mut record: PaymentRecord) -> Result<CheckOutcome> {
        debug!(payment_id = %record.id, method = %record.method, "reconciliation: checking payment");

        let resolution =
            match tokio::time::timeout(self.check_timeout, self.resolver.resolve_record(&record))
                .await
            {
                Ok(resolution) => resolution,
                Err(_) => {
                    warn!(
                        payment_id = %record.id,
                        timeout_ms = self.check_timeout.as_millis() as u64,
                        "reconciliation: probe timed out"
                    );
                    Resolution::Indeterminate
                }
            };

        let Resolution::Definitive(resolved) = resolution else {
            return Ok(CheckOutcome::Unchanged);
        };
        let Some(target) = resolved.status.target_status() else {
            debug!(payment_id = %record.id, code = %resolved.code, "reconciliation: still pending");
            return Ok(CheckOutcome::Unchanged);
        };

        let patch = resolved.to_details();
        if !self
            .store
            .merge_status(&record.id, target, patch.clone())
            .await?
        {
            warn!(payment_id = %record.id, "reconciliation: payment disappeared from store");
            return Ok(CheckOutcome::Unchanged);
        }

        record.status = target;
        record.merge_details(patch);
        info!(payment_id = %record.id, status = %target, "reconciliation: payment resolved");

        // The record is no longer pending, so it will not be selected again.
        match target {
            PaymentStatus::Success => {
                self.gate.notify_success(record).await;
                Ok(CheckOutcome::Succeeded)
            }
            _ => {
                self.gate.notify_cancelled(record).await;
                Ok(CheckOutcome::Cancelled)
            }
        }
    }
}

/// Periodically re-evaluates every pending payment.
///
/// Each tick re-reads the pending set from the store, checks the records
/// with bounded concurrency, waits for the whole batch and then sleeps. The
/// scheduler keeps no state between ticks.
pub struct ReconciliationScheduler {
    checker: RecordChecker,
    limiter: Arc<Semaphore>,
    config: SchedulerConfig,
}

impl ReconciliationScheduler {
    pub fn new(
        store: PaymentStoreRef,
        resolver: Arc<StatusResolver>,
        gate: NotificationGate,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            checker: RecordChecker {
                store,
                resolver,
                gate,
                check_timeout: config.check_timeout,
            },
            limiter: Arc::new(Semaphore::new(config.max_concurrency.max(1))),
            config,
        }
    }

    /// Runs ticks until `shutdown` flips to `true` or its sender is dropped.
    ///
    /// The signal is honoured between ticks and interrupts the sleep; checks
    /// already in flight are allowed to finish. Only a failure to read the
    /// pending set stops the loop with an error.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        info!(
            tick_interval_s = self.config.tick_interval.as_secs(),
            max_concurrency = self.config.max_concurrency,
            "reconciliation: scheduler started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            let report = self.tick().await?;
            if report.checked > 0 {
                info!(
                    checked = report.checked,
                    succeeded = report.succeeded,
                    cancelled = report.cancelled,
                    unchanged = report.unchanged,
                    failed = report.failed,
                    "reconciliation: tick finished"
                );
            }

            tokio::select! {
                _ = tokio::time::sleep(self.config.tick_interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        info!("reconciliation: scheduler stopped");
        Ok(())
    }

    /// Runs one full pass over the pending set and waits for every check.
    pub async fn tick(&self) -> Result<TickReport> {
        // Anything beyond chrono's range means "no age limit".
        let max_age =
            chrono::Duration::from_std(self.config.max_age).unwrap_or(chrono::Duration::MAX);
        let batch = self.checker.store.list_pending(max_age).await?;

        let mut report = TickReport {
            checked: batch.len(),
            ..TickReport::default()
        };
        if batch.is_empty() {
            return Ok(report);
        }
        debug!(count = batch.len(), "reconciliation: checking pending payments");

        let mut tasks = JoinSet::new();
        for record in batch {
            let checker = self.checker.clone();
            let limiter = Arc::clone(&self.limiter);
            tasks.spawn(async move {
                let Ok(_permit) = limiter.acquire_owned().await else {
                    return CheckOutcome::Failed;
                };
                checker.run(record).await
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => report.record(outcome),
                Err(e) => {
                    error!(error = %e, "reconciliation: check task aborted");
                    report.record(CheckOutcome::Failed);
                }
            }
        }

        Ok(report)
    }
}
