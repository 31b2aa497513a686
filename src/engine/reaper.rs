//! Reaper: returns pending items with an absent or expired lease to queued.
//!
//! Each tick snapshots the pending sequence of every registered queue and,
//! for each item without an active lease, asks the store to reclaim it. The
//! store re-checks the lease and pending membership inside the reclaim
//! transaction, so a reclaim never wins against a `done` or `extend` that
//! committed after the snapshot.
//!
//! Failures are logged and skipped per item and per queue. One broken queue
//! never stops the others from being reclaimed, and no error ever ends the
//! loop.

use super::Engine;
use crate::error::Result;
use crate::model::{Item, QueueId};
use crate::telemetry::metrics;
use crate::telemetry::spans::{record_reclaimed, record_transition, start_tick_span};
use chrono::{DateTime, Utc};
use opentelemetry::KeyValue;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{Instrument, Span, debug, error, info, warn};

/// What one tick did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    /// Queues scanned.
    pub queues: usize,
    /// Pending items looked at.
    pub scanned: usize,
    pub reclaimed: usize,
    /// Lookups or reclaims that failed and were skipped.
    pub failures: usize,
}

pub struct Reaper {
    engine: Engine,
    interval: Duration,
    ticks: AtomicU64,
}

impl Reaper {
    pub fn new(engine: Engine, interval: Duration) -> Self {
        Self {
            engine,
            interval,
            ticks: AtomicU64::new(0),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Run one reclaim pass over every registered queue.
    pub async fn tick(&self) -> TickReport {
        let tick = self.ticks.fetch_add(1, Ordering::Relaxed);
        let span = start_tick_span(tick);
        let started = Instant::now();

        let report = self.sweep(&span).instrument(span.clone()).await;

        record_reclaimed(&span, report.reclaimed as u64);
        metrics::reaper_tick_duration_ms().record(started.elapsed().as_secs_f64() * 1000.0, &[]);
        if report.reclaimed > 0 || report.failures > 0 {
            info!(
                reclaimed = report.reclaimed,
                failures = report.failures,
                queues = report.queues,
                "reaper tick finished"
            );
        }
        report
    }

    async fn sweep(&self, span: &Span) -> TickReport {
        let mut report = TickReport::default();

        let queues = match self.engine.store.list_queues().await {
            Ok(queues) => queues,
            Err(e) => {
                error!("reaper could not list queues: {e}");
                failure("list_queues");
                report.failures += 1;
                return report;
            }
        };

        let now = self.engine.now();
        for queue in &queues {
            report.queues += 1;
            if let Err(e) = self.sweep_queue(queue, now, span, &mut report).await {
                warn!(%queue, "reaper skipped queue: {e}");
                failure("list_pending");
                report.failures += 1;
            }
        }
        report
    }

    async fn sweep_queue(
        &self,
        queue: &QueueId,
        now: DateTime<Utc>,
        span: &Span,
        report: &mut TickReport,
    ) -> Result<()> {
        let pending = self.engine.list_pending(queue).await?;

        for item in &pending {
            report.scanned += 1;
            match self.engine.store.lease(queue, item, now).await {
                Ok(Some(_)) => continue,
                Ok(None) => {}
                Err(e) => {
                    warn!(%queue, %item, "reaper lease lookup failed: {e}");
                    failure("lease");
                    report.failures += 1;
                    continue;
                }
            }

            match self.reclaim(queue, item, now, span).await {
                Ok(true) => report.reclaimed += 1,
                Ok(false) => {}
                Err(e) => {
                    warn!(%queue, %item, "reaper reclaim failed: {e}");
                    failure("reclaim");
                    report.failures += 1;
                }
            }
        }
        Ok(())
    }

    async fn reclaim(
        &self,
        queue: &QueueId,
        item: &Item,
        now: DateTime<Utc>,
        span: &Span,
    ) -> Result<bool> {
        if !self.engine.store.reclaim(queue, item, now).await? {
            // Completed, extended or already reclaimed since the snapshot.
            debug!(%queue, %item, "reclaim lost race");
            return Ok(false);
        }
        record_transition(span, queue.as_str(), "pending", "queued");
        super::transition("pending", "queued");
        metrics::reaper_reclaimed().add(1, &[KeyValue::new("queue", queue.to_string())]);
        info!(%queue, %item, "put expired item back to queue");
        Ok(true)
    }

    /// Run the reaper on its own task until [`ReaperHandle::stop`].
    ///
    /// The first tick runs immediately.
    pub fn spawn(self) -> ReaperHandle {
        let shutdown = Arc::new(Notify::new());
        let signal = Arc::clone(&shutdown);
        let task = tokio::spawn(async move { self.run(signal).await });
        ReaperHandle { shutdown, task }
    }

    async fn run(self, shutdown: Arc<Notify>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(interval_ms = self.interval.as_millis() as u64, "reaper started");
        loop {
            tokio::select! {
                _ = shutdown.notified() => {
                    info!("reaper shutting down");
                    return;
                }
                _ = ticker.tick() => {
                    self.tick().await;
                }
            }
        }
    }
}

fn failure(stage: &'static str) {
    metrics::reaper_failures().add(1, &[KeyValue::new("stage", stage)]);
}

/// Handle to a spawned reaper.
pub struct ReaperHandle {
    shutdown: Arc<Notify>,
    task: JoinHandle<()>,
}

impl ReaperHandle {
    /// Signal shutdown and wait for the current tick to finish.
    pub async fn stop(self) {
        self.shutdown.notify_one();
        if let Err(e) = self.task.await {
            error!("reaper task ended abnormally: {e}");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}
