//! Postgres-backed store: connection pool, migrations, health check.
//!
//! Each [`Store`] method runs as a single SQL transaction. Row locks are
//! always taken in the same order (queue row, then item row, then lease
//! row) so a completion, a reclaim and an extend touching the same item
//! serialize instead of deadlocking.

pub mod items;
pub mod queues;

use crate::error::{Error, Result};
use crate::model::{Holder, Item, Lease, QueueId, Sequence, Summary};
use crate::store::Store;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgConnection, PgPool};
use std::collections::BTreeSet;

/// Database handle. Owns the connection pool.
pub struct Db {
    pool: PgPool,
}

impl Db {
    /// Connect to Postgres and create a connection pool.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(url)
            .await?;
        Ok(Self { pool })
    }

    /// Run all pending migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    /// Simple health check: run a SELECT 1.
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

/// Take a shared lock on the queue row, failing if it is not registered.
/// Held until the transaction ends, so a concurrent delete waits for us.
async fn lock_queue(conn: &mut PgConnection, queue: &QueueId) -> Result<()> {
    let row: Option<(String,)> = sqlx::query_as("SELECT id FROM queues WHERE id = $1 FOR SHARE")
        .bind(queue.as_str())
        .fetch_optional(conn)
        .await?;
    row.map(|_| ())
        .ok_or_else(|| Error::NotFound(format!("queue {queue} does not exist")))
}

fn decode_item(bytes: Vec<u8>) -> Result<Item> {
    Item::from_bytes(bytes).map_err(|e| Error::Other(format!("corrupt item row: {e}")))
}

#[async_trait]
impl Store for Db {
    async fn create_queue(&self, queue: &QueueId) -> Result<()> {
        self.insert_queue(queue).await
    }

    async fn delete_queue(&self, queue: &QueueId) -> Result<()> {
        self.remove_queue(queue).await
    }

    async fn queue_exists(&self, queue: &QueueId) -> Result<bool> {
        self.has_queue(queue).await
    }

    async fn list_queues(&self) -> Result<BTreeSet<QueueId>> {
        self.queue_ids().await
    }

    async fn bulk_load(&self, queue: &QueueId, items: &[Item], reset: bool) -> Result<usize> {
        self.load_items(queue, items, reset).await
    }

    async fn enqueue(&self, queue: &QueueId, item: &Item) -> Result<()> {
        self.push_queued(queue, item).await
    }

    async fn claim_next(
        &self,
        queue: &QueueId,
        holder: &Holder,
        expires_at: DateTime<Utc>,
    ) -> Result<Option<Item>> {
        self.claim_head(queue, holder, expires_at).await
    }

    async fn complete(&self, queue: &QueueId, item: &Item) -> Result<bool> {
        self.move_pending_to_done(queue, item).await
    }

    async fn extend_lease(
        &self,
        queue: &QueueId,
        item: &Item,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<bool> {
        self.refresh_lease(queue, item, now, expires_at).await
    }

    async fn clear_lease(&self, queue: &QueueId, item: &Item) -> Result<()> {
        self.drop_lease(queue, item).await
    }

    async fn lease(
        &self,
        queue: &QueueId,
        item: &Item,
        now: DateTime<Utc>,
    ) -> Result<Option<Lease>> {
        self.active_lease(queue, item, now).await
    }

    async fn reclaim(&self, queue: &QueueId, item: &Item, now: DateTime<Utc>) -> Result<bool> {
        self.move_pending_to_queued(queue, item, now).await
    }

    async fn summary(&self, queue: &QueueId) -> Result<Summary> {
        self.count_items(queue).await
    }

    async fn list(&self, queue: &QueueId, sequence: Sequence) -> Result<Vec<Item>> {
        self.list_items(queue, sequence).await
    }
}
