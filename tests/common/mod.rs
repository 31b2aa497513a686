//! Shared helpers for the reaper and status tests.
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use leaseq::clock::ManualClock;
use leaseq::engine::{Engine, EngineConfig};
use leaseq::error::{Error, Result};
use leaseq::model::{Holder, Item, Lease, QueueId, Sequence, Summary};
use leaseq::store::{MemoryStore, Store};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

pub const LEASE: Duration = Duration::from_secs(300);

pub fn q(s: &str) -> QueueId {
    QueueId::parse(s).unwrap()
}

pub fn item(s: &str) -> Item {
    Item::parse(s).unwrap()
}

pub fn holder(s: &str) -> Holder {
    Holder::parse(s).unwrap()
}

pub fn engine_over(store: Arc<dyn Store>) -> (Engine, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::default());
    let engine = Engine::with_clock(
        store,
        clock.clone(),
        EngineConfig {
            lease_duration: LEASE,
            status_concurrency: 4,
        },
    );
    (engine, clock)
}

pub fn test_engine() -> (Engine, Arc<ManualClock>) {
    engine_over(Arc::new(MemoryStore::new()))
}

/// A memory store that fails on purpose: listing any sequence of the queue
/// named `broken`, and looking up the lease of the item `poison`.
#[derive(Default)]
pub struct FlakyStore {
    inner: MemoryStore,
}

fn boom(what: &str) -> Error {
    Error::Other(format!("injected failure: {what}"))
}

#[async_trait]
impl Store for FlakyStore {
    async fn create_queue(&self, queue: &QueueId) -> Result<()> {
        self.inner.create_queue(queue).await
    }

    async fn delete_queue(&self, queue: &QueueId) -> Result<()> {
        self.inner.delete_queue(queue).await
    }

    async fn queue_exists(&self, queue: &QueueId) -> Result<bool> {
        self.inner.queue_exists(queue).await
    }

    async fn list_queues(&self) -> Result<BTreeSet<QueueId>> {
        self.inner.list_queues().await
    }

    async fn bulk_load(&self, queue: &QueueId, items: &[Item], reset: bool) -> Result<usize> {
        self.inner.bulk_load(queue, items, reset).await
    }

    async fn enqueue(&self, queue: &QueueId, item: &Item) -> Result<()> {
        self.inner.enqueue(queue, item).await
    }

    async fn claim_next(
        &self,
        queue: &QueueId,
        holder: &Holder,
        expires_at: DateTime<Utc>,
    ) -> Result<Option<Item>> {
        self.inner.claim_next(queue, holder, expires_at).await
    }

    async fn complete(&self, queue: &QueueId, item: &Item) -> Result<bool> {
        self.inner.complete(queue, item).await
    }

    async fn extend_lease(
        &self,
        queue: &QueueId,
        item: &Item,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<bool> {
        self.inner.extend_lease(queue, item, now, expires_at).await
    }

    async fn clear_lease(&self, queue: &QueueId, item: &Item) -> Result<()> {
        self.inner.clear_lease(queue, item).await
    }

    async fn lease(
        &self,
        queue: &QueueId,
        item: &Item,
        now: DateTime<Utc>,
    ) -> Result<Option<Lease>> {
        if item.as_bytes() == b"poison" {
            return Err(boom("lease"));
        }
        self.inner.lease(queue, item, now).await
    }

    async fn reclaim(&self, queue: &QueueId, item: &Item, now: DateTime<Utc>) -> Result<bool> {
        self.inner.reclaim(queue, item, now).await
    }

    async fn summary(&self, queue: &QueueId) -> Result<Summary> {
        self.inner.summary(queue).await
    }

    async fn list(&self, queue: &QueueId, sequence: Sequence) -> Result<Vec<Item>> {
        if queue.as_str() == "broken" {
            return Err(boom("list"));
        }
        self.inner.list(queue, sequence).await
    }
}
