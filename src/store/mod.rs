//! Queue state store and lease table.
//!
//! [`Store`] is the single synchronization point of the system. Every method
//! is one atomic, isolated transaction: either all of its effects commit or
//! none do. Callers never lock anything themselves.
//!
//! Operations that reference a queue fail with `Error::NotFound` when the
//! queue is not registered. Lease expiry is evaluated against the `now`
//! passed in by the caller, never against a store-side clock, and an expired
//! lease is treated exactly like an absent one.

pub mod memory;

pub use memory::MemoryStore;

use crate::error::Result;
use crate::model::{Holder, Item, Lease, QueueId, Sequence, Summary};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;

#[async_trait]
pub trait Store: Send + Sync {
    // --- Registry ---

    /// Register a queue with three empty sequences. `AlreadyExists` if taken.
    async fn create_queue(&self, queue: &QueueId) -> Result<()>;

    /// Drop a queue, its sequences and every lease scoped to it.
    async fn delete_queue(&self, queue: &QueueId) -> Result<()>;

    async fn queue_exists(&self, queue: &QueueId) -> Result<bool>;

    async fn list_queues(&self) -> Result<BTreeSet<QueueId>>;

    /// Register `queue` if needed, optionally wipe it, then append `items`
    /// to its queued sequence. Returns the number of items appended.
    async fn bulk_load(&self, queue: &QueueId, items: &[Item], reset: bool) -> Result<usize>;

    // --- Items + leases ---

    /// Append to the tail of queued.
    async fn enqueue(&self, queue: &QueueId, item: &Item) -> Result<()>;

    /// Move the head of queued to the tail of pending and lease it to
    /// `holder` until `expires_at`. `None` when queued is empty.
    async fn claim_next(
        &self,
        queue: &QueueId,
        holder: &Holder,
        expires_at: DateTime<Utc>,
    ) -> Result<Option<Item>>;

    /// Move one occurrence of `item` from pending to done and drop its
    /// lease. `false` when no occurrence was pending.
    async fn complete(&self, queue: &QueueId, item: &Item) -> Result<bool>;

    /// Reset the expiry of an active lease. `false` when none is active.
    async fn extend_lease(
        &self,
        queue: &QueueId,
        item: &Item,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<bool>;

    /// Drop the lease on `item`, leaving sequence membership untouched.
    async fn clear_lease(&self, queue: &QueueId, item: &Item) -> Result<()>;

    /// The active lease on `item`, if any.
    async fn lease(
        &self,
        queue: &QueueId,
        item: &Item,
        now: DateTime<Utc>,
    ) -> Result<Option<Lease>>;

    /// Move one occurrence of `item` from pending back to queued, but only
    /// if, inside the same transaction, it is still pending and its lease is
    /// still absent or expired. `false` when either check fails.
    async fn reclaim(&self, queue: &QueueId, item: &Item, now: DateTime<Utc>) -> Result<bool>;

    // --- Reads ---

    async fn summary(&self, queue: &QueueId) -> Result<Summary>;

    /// Contents of one sequence, head first.
    async fn list(&self, queue: &QueueId, sequence: Sequence) -> Result<Vec<Item>>;
}
