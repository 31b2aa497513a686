//! Queue engine: registry lifecycle, the item state machine and status
//! queries, all expressed over one injected [`Store`].
//!
//! `Engine` holds no queue state of its own. Every transition it performs
//! is a single store transaction, so any number of clones can run
//! concurrently with each other and with the [`Reaper`].

pub mod dispatch;
pub mod reaper;
pub mod status;

pub use reaper::{Reaper, ReaperHandle, TickReport};

use crate::clock::{Clock, SystemClock};
use crate::config::{Config, DEFAULT_LEASE_DURATION, DEFAULT_STATUS_CONCURRENCY};
use crate::error::Result;
use crate::model::{Item, QueueId};
use crate::store::Store;
use crate::telemetry::metrics;
use chrono::{DateTime, SubsecRound, TimeDelta, Utc};
use opentelemetry::KeyValue;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Configuration for the engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Visibility timeout applied by `next` and reset by `extend`.
    pub lease_duration: Duration,
    /// Bound on concurrent lease lookups in `list_pending_detail`.
    pub status_concurrency: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            lease_duration: DEFAULT_LEASE_DURATION,
            status_concurrency: DEFAULT_STATUS_CONCURRENCY,
        }
    }
}

impl From<&Config> for EngineConfig {
    fn from(config: &Config) -> Self {
        Self {
            lease_duration: config.lease_duration,
            status_concurrency: config.status_concurrency,
        }
    }
}

#[derive(Clone)]
pub struct Engine {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
    lease_delta: TimeDelta,
}

impl Engine {
    pub fn new(store: Arc<dyn Store>, config: EngineConfig) -> Self {
        Self::with_clock(store, Arc::new(SystemClock), config)
    }

    pub fn with_clock(store: Arc<dyn Store>, clock: Arc<dyn Clock>, config: EngineConfig) -> Self {
        let lease_delta = TimeDelta::from_std(config.lease_duration).unwrap_or(TimeDelta::MAX);
        Self {
            store,
            clock,
            config,
            lease_delta,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Current time at the microsecond precision every store keeps.
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now().trunc_subsecs(6)
    }

    /// Expiry of a lease taken or refreshed at `now`.
    fn lease_expiry(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now.checked_add_signed(self.lease_delta)
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    // --- Registry ---

    pub async fn create(&self, queue: &QueueId) -> Result<()> {
        self.store.create_queue(queue).await?;
        count(queue, "create");
        info!(%queue, "queue created");
        Ok(())
    }

    /// Drop the queue with all three sequences and its leases.
    pub async fn delete(&self, queue: &QueueId) -> Result<()> {
        self.store.delete_queue(queue).await?;
        count(queue, "delete");
        info!(%queue, "queue deleted");
        Ok(())
    }

    pub async fn exists(&self, queue: &QueueId) -> Result<bool> {
        self.store.queue_exists(queue).await
    }

    pub async fn list(&self) -> Result<BTreeSet<QueueId>> {
        self.store.list_queues().await
    }

    /// Register `queue` if needed and append `items` to queued in one
    /// transaction. With `reset`, the queue is emptied first.
    pub async fn bulk(&self, queue: &QueueId, items: &[Item], reset: bool) -> Result<usize> {
        let loaded = self.store.bulk_load(queue, items, reset).await?;
        count(queue, "bulk");
        debug!(%queue, loaded, reset, "bulk load");
        Ok(loaded)
    }
}

fn count(queue: &QueueId, operation: &'static str) {
    metrics::queue_operations().add(
        1,
        &[
            KeyValue::new("queue", queue.to_string()),
            KeyValue::new("operation", operation),
        ],
    );
}

fn transition(from: &'static str, to: &'static str) {
    metrics::item_transitions().add(1, &[KeyValue::new("from", from), KeyValue::new("to", to)]);
}
