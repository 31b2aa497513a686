//! In-process store.
//!
//! All queue state lives behind one `tokio::sync::Mutex`; each trait method
//! takes the lock once and validates before mutating, which makes it atomic
//! and isolated with respect to every other method.

use super::Store;
use crate::error::{Error, Result};
use crate::model::{Holder, Item, Lease, QueueId, Sequence, Summary};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use tokio::sync::Mutex;

#[derive(Debug, Default)]
struct QueueState {
    queued: VecDeque<Item>,
    pending: VecDeque<Item>,
    done: Vec<Item>,
    leases: HashMap<Item, Lease>,
}

impl QueueState {
    fn active_lease(&self, item: &Item, now: DateTime<Utc>) -> Option<&Lease> {
        self.leases.get(item).filter(|l| l.is_active(now))
    }

    /// Remove the first pending occurrence of `item`.
    fn take_pending(&mut self, item: &Item) -> Option<Item> {
        let pos = self.pending.iter().position(|i| i == item)?;
        self.pending.remove(pos)
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    queues: Mutex<BTreeMap<QueueId, QueueState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn missing(queue: &QueueId) -> Error {
    Error::NotFound(format!("queue {queue} does not exist"))
}

#[async_trait]
impl Store for MemoryStore {
    async fn create_queue(&self, queue: &QueueId) -> Result<()> {
        let mut queues = self.queues.lock().await;
        if queues.contains_key(queue) {
            return Err(Error::AlreadyExists(format!("queue {queue} already exists")));
        }
        queues.insert(queue.clone(), QueueState::default());
        Ok(())
    }

    async fn delete_queue(&self, queue: &QueueId) -> Result<()> {
        self.queues
            .lock()
            .await
            .remove(queue)
            .map(|_| ())
            .ok_or_else(|| missing(queue))
    }

    async fn queue_exists(&self, queue: &QueueId) -> Result<bool> {
        Ok(self.queues.lock().await.contains_key(queue))
    }

    async fn list_queues(&self) -> Result<BTreeSet<QueueId>> {
        Ok(self.queues.lock().await.keys().cloned().collect())
    }

    async fn bulk_load(&self, queue: &QueueId, items: &[Item], reset: bool) -> Result<usize> {
        let mut queues = self.queues.lock().await;
        let state = queues.entry(queue.clone()).or_default();
        if reset {
            *state = QueueState::default();
        }
        state.queued.extend(items.iter().cloned());
        Ok(items.len())
    }

    async fn enqueue(&self, queue: &QueueId, item: &Item) -> Result<()> {
        let mut queues = self.queues.lock().await;
        let state = queues.get_mut(queue).ok_or_else(|| missing(queue))?;
        state.queued.push_back(item.clone());
        Ok(())
    }

    async fn claim_next(
        &self,
        queue: &QueueId,
        holder: &Holder,
        expires_at: DateTime<Utc>,
    ) -> Result<Option<Item>> {
        let mut queues = self.queues.lock().await;
        let state = queues.get_mut(queue).ok_or_else(|| missing(queue))?;
        let Some(item) = state.queued.pop_front() else {
            return Ok(None);
        };
        state.pending.push_back(item.clone());
        state.leases.insert(
            item.clone(),
            Lease {
                queue: queue.clone(),
                item: item.clone(),
                holder: holder.clone(),
                expires_at,
            },
        );
        Ok(Some(item))
    }

    async fn complete(&self, queue: &QueueId, item: &Item) -> Result<bool> {
        let mut queues = self.queues.lock().await;
        let state = queues.get_mut(queue).ok_or_else(|| missing(queue))?;
        let Some(item) = state.take_pending(item) else {
            return Ok(false);
        };
        state.leases.remove(&item);
        state.done.push(item);
        Ok(true)
    }

    async fn extend_lease(
        &self,
        queue: &QueueId,
        item: &Item,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<bool> {
        let mut queues = self.queues.lock().await;
        let state = queues.get_mut(queue).ok_or_else(|| missing(queue))?;
        match state.leases.get_mut(item) {
            Some(lease) if lease.is_active(now) => {
                lease.expires_at = expires_at;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn clear_lease(&self, queue: &QueueId, item: &Item) -> Result<()> {
        let mut queues = self.queues.lock().await;
        let state = queues.get_mut(queue).ok_or_else(|| missing(queue))?;
        state.leases.remove(item);
        Ok(())
    }

    async fn lease(
        &self,
        queue: &QueueId,
        item: &Item,
        now: DateTime<Utc>,
    ) -> Result<Option<Lease>> {
        let queues = self.queues.lock().await;
        let state = queues.get(queue).ok_or_else(|| missing(queue))?;
        Ok(state.active_lease(item, now).cloned())
    }

    async fn reclaim(&self, queue: &QueueId, item: &Item, now: DateTime<Utc>) -> Result<bool> {
        let mut queues = self.queues.lock().await;
        let state = queues.get_mut(queue).ok_or_else(|| missing(queue))?;
        if state.active_lease(item, now).is_some() {
            return Ok(false);
        }
        let Some(item) = state.take_pending(item) else {
            return Ok(false);
        };
        state.leases.remove(&item);
        state.queued.push_back(item);
        Ok(true)
    }

    async fn summary(&self, queue: &QueueId) -> Result<Summary> {
        let queues = self.queues.lock().await;
        let state = queues.get(queue).ok_or_else(|| missing(queue))?;
        Ok(Summary::new(
            state.queued.len() as u64,
            state.pending.len() as u64,
            state.done.len() as u64,
        ))
    }

    async fn list(&self, queue: &QueueId, sequence: Sequence) -> Result<Vec<Item>> {
        let queues = self.queues.lock().await;
        let state = queues.get(queue).ok_or_else(|| missing(queue))?;
        Ok(match sequence {
            Sequence::Queued => state.queued.iter().cloned().collect(),
            Sequence::Pending => state.pending.iter().cloned().collect(),
            Sequence::Done => state.done.clone(),
        })
    }
}
