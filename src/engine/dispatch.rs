//! The item state machine: enqueue, next, done, and lease maintenance.
//!
//! ```text
//! enqueue ──► queued ──next──► pending ──done──► done
//!               ▲                 │
//!               └──── reaper ─────┘   (lease absent or expired)
//! ```
//!
//! `done` does not check that the caller holds the lease: any caller may
//! complete a pending item.

use super::{Engine, count, transition};
use crate::error::{Error, Result};
use crate::model::{Holder, Item, Lease, QueueId};
use std::time::Duration;
use tracing::debug;

impl Engine {
    /// Append `item` to the tail of queued.
    pub async fn enqueue(&self, queue: &QueueId, item: &Item) -> Result<()> {
        self.store.enqueue(queue, item).await?;
        count(queue, "enqueue");
        debug!(%queue, %item, "enqueued");
        Ok(())
    }

    /// Lease the head of queued to `holder`. `None` when nothing is queued.
    pub async fn next(&self, queue: &QueueId, holder: &Holder) -> Result<Option<Item>> {
        let expires_at = self.lease_expiry(self.now());
        let claimed = self.store.claim_next(queue, holder, expires_at).await?;

        match &claimed {
            Some(item) => {
                count(queue, "next");
                transition("queued", "pending");
                debug!(%queue, %item, %holder, %expires_at, "leased");
            }
            None => count(queue, "next_empty"),
        }
        Ok(claimed)
    }

    /// Complete one pending occurrence of `item`.
    ///
    /// Fails with `Conflict` when `item` is not pending, including when it
    /// was already completed or has been reclaimed.
    pub async fn done(&self, queue: &QueueId, item: &Item, holder: &Holder) -> Result<Item> {
        if !self.store.complete(queue, item).await? {
            count(queue, "done_conflict");
            return Err(Error::Conflict(format!("{item} was not in pending")));
        }
        count(queue, "done");
        transition("pending", "done");
        debug!(%queue, %item, %holder, "completed");
        Ok(item.clone())
    }

    /// Reset the lease on `item` to a full lease duration from now.
    pub async fn extend(&self, queue: &QueueId, item: &Item, holder: &Holder) -> Result<()> {
        let now = self.now();
        let expires_at = self.lease_expiry(now);
        if !self.store.extend_lease(queue, item, now, expires_at).await? {
            return Err(no_lease(queue, item));
        }
        count(queue, "extend");
        debug!(%queue, %item, %holder, %expires_at, "lease extended");
        Ok(())
    }

    /// Drop the lease on `item` so the next reaper tick reclaims it.
    pub async fn expire(&self, queue: &QueueId, item: &Item) -> Result<()> {
        self.store.clear_lease(queue, item).await?;
        count(queue, "expire");
        debug!(%queue, %item, "lease expired");
        Ok(())
    }

    /// Remaining time on the active lease for `item`.
    pub async fn ttl(&self, queue: &QueueId, item: &Item) -> Result<Duration> {
        let now = self.now();
        self.store
            .lease(queue, item, now)
            .await?
            .and_then(|lease| lease.remaining(now))
            .ok_or_else(|| no_lease(queue, item))
    }

    /// The active lease for `item`, if any.
    pub async fn lease(&self, queue: &QueueId, item: &Item) -> Result<Option<Lease>> {
        self.store.lease(queue, item, self.now()).await
    }
}

fn no_lease(queue: &QueueId, item: &Item) -> Error {
    Error::NotFound(format!("no active lease for {item} in queue {queue}"))
}
