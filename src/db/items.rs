//! Item state transitions and the lease table.

use super::{decode_item, lock_queue};
use crate::error::Result;
use crate::model::{Holder, Item, Lease, QueueId};
use chrono::{DateTime, Utc};

impl super::Db {
    pub(crate) async fn push_queued(&self, queue: &QueueId, item: &Item) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        lock_queue(&mut tx, queue).await?;

        sqlx::query("INSERT INTO queue_items (queue_id, item, state) VALUES ($1, $2, 'queued')")
            .bind(queue.as_str())
            .bind(item.as_bytes())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Pop the queued head into pending and lease it.
    ///
    /// SKIP LOCKED lets concurrent claimers move past a head row another
    /// claimer holds instead of waiting on it and then seeing nothing.
    pub(crate) async fn claim_head(
        &self,
        queue: &QueueId,
        holder: &Holder,
        expires_at: DateTime<Utc>,
    ) -> Result<Option<Item>> {
        let mut tx = self.pool.begin().await?;
        lock_queue(&mut tx, queue).await?;

        let row: Option<(Vec<u8>,)> = sqlx::query_as(
            "UPDATE queue_items SET state = 'pending', position = nextval('queue_items_position')
             WHERE id = (
                 SELECT id FROM queue_items
                 WHERE queue_id = $1 AND state = 'queued'
                 ORDER BY position
                 LIMIT 1
                 FOR UPDATE SKIP LOCKED
             )
             RETURNING item",
        )
        .bind(queue.as_str())
        .fetch_optional(&mut *tx)
        .await?;

        let Some((bytes,)) = row else {
            tx.commit().await?;
            return Ok(None);
        };

        sqlx::query(
            "INSERT INTO leases (queue_id, item, holder, expires_at) VALUES ($1, $2, $3, $4)
             ON CONFLICT (queue_id, item)
             DO UPDATE SET holder = EXCLUDED.holder, expires_at = EXCLUDED.expires_at",
        )
        .bind(queue.as_str())
        .bind(bytes.as_slice())
        .bind(holder.as_str())
        .bind(expires_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        decode_item(bytes).map(Some)
    }

    pub(crate) async fn move_pending_to_done(&self, queue: &QueueId, item: &Item) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        lock_queue(&mut tx, queue).await?;

        // The row lock is re-checked against state after waiting, so a
        // concurrent reclaim that won the row leaves us with zero rows.
        let rows_affected = sqlx::query(
            "UPDATE queue_items SET state = 'done', position = nextval('queue_items_position')
             WHERE id = (
                 SELECT id FROM queue_items
                 WHERE queue_id = $1 AND state = 'pending' AND item = $2
                 ORDER BY position
                 LIMIT 1
                 FOR UPDATE
             )",
        )
        .bind(queue.as_str())
        .bind(item.as_bytes())
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if rows_affected == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        sqlx::query("DELETE FROM leases WHERE queue_id = $1 AND item = $2")
            .bind(queue.as_str())
            .bind(item.as_bytes())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(true)
    }

    pub(crate) async fn move_pending_to_queued(
        &self,
        queue: &QueueId,
        item: &Item,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        lock_queue(&mut tx, queue).await?;

        let row: Option<(i64,)> = sqlx::query_as(
            "SELECT id FROM queue_items
             WHERE queue_id = $1 AND state = 'pending' AND item = $2
             ORDER BY position
             LIMIT 1
             FOR UPDATE",
        )
        .bind(queue.as_str())
        .bind(item.as_bytes())
        .fetch_optional(&mut *tx)
        .await?;

        let Some((row_id,)) = row else {
            tx.rollback().await?;
            return Ok(false);
        };

        let lease: Option<(DateTime<Utc>,)> = sqlx::query_as(
            "SELECT expires_at FROM leases WHERE queue_id = $1 AND item = $2 FOR UPDATE",
        )
        .bind(queue.as_str())
        .bind(item.as_bytes())
        .fetch_optional(&mut *tx)
        .await?;

        if matches!(lease, Some((expires_at,)) if expires_at > now) {
            tx.rollback().await?;
            return Ok(false);
        }

        sqlx::query(
            "UPDATE queue_items SET state = 'queued', position = nextval('queue_items_position')
             WHERE id = $1",
        )
        .bind(row_id)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM leases WHERE queue_id = $1 AND item = $2")
            .bind(queue.as_str())
            .bind(item.as_bytes())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(true)
    }

    pub(crate) async fn refresh_lease(
        &self,
        queue: &QueueId,
        item: &Item,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        lock_queue(&mut tx, queue).await?;

        let rows_affected = sqlx::query(
            "UPDATE leases SET expires_at = $3
             WHERE queue_id = $1 AND item = $2 AND expires_at > $4",
        )
        .bind(queue.as_str())
        .bind(item.as_bytes())
        .bind(expires_at)
        .bind(now)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        tx.commit().await?;
        Ok(rows_affected > 0)
    }

    pub(crate) async fn drop_lease(&self, queue: &QueueId, item: &Item) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        lock_queue(&mut tx, queue).await?;

        sqlx::query("DELETE FROM leases WHERE queue_id = $1 AND item = $2")
            .bind(queue.as_str())
            .bind(item.as_bytes())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    pub(crate) async fn active_lease(
        &self,
        queue: &QueueId,
        item: &Item,
        now: DateTime<Utc>,
    ) -> Result<Option<Lease>> {
        let mut tx = self.pool.begin().await?;
        lock_queue(&mut tx, queue).await?;

        let row: Option<(String, DateTime<Utc>)> = sqlx::query_as(
            "SELECT holder, expires_at FROM leases
             WHERE queue_id = $1 AND item = $2 AND expires_at > $3",
        )
        .bind(queue.as_str())
        .bind(item.as_bytes())
        .bind(now)
        .fetch_optional(&mut *tx)
        .await?;
        tx.commit().await?;

        row.map(|(holder, expires_at)| {
            Ok(Lease {
                queue: queue.clone(),
                item: item.clone(),
                holder: Holder::parse(&holder)?,
                expires_at,
            })
        })
        .transpose()
    }
}
