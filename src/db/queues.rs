//! Queue registry operations: create, delete, list, bulk load, counts.

use super::{decode_item, lock_queue};
use crate::error::{Error, Result};
use crate::model::{Item, QueueId, Sequence, Summary};
use std::collections::BTreeSet;

impl super::Db {
    pub(crate) async fn insert_queue(&self, queue: &QueueId) -> Result<()> {
        let rows_affected = sqlx::query("INSERT INTO queues (id) VALUES ($1) ON CONFLICT DO NOTHING")
            .bind(queue.as_str())
            .execute(&self.pool)
            .await?
            .rows_affected();

        if rows_affected == 0 {
            return Err(Error::AlreadyExists(format!("queue {queue} already exists")));
        }
        Ok(())
    }

    /// Sequences and leases go with the queue row via ON DELETE CASCADE.
    pub(crate) async fn remove_queue(&self, queue: &QueueId) -> Result<()> {
        let rows_affected = sqlx::query("DELETE FROM queues WHERE id = $1")
            .bind(queue.as_str())
            .execute(&self.pool)
            .await?
            .rows_affected();

        if rows_affected == 0 {
            return Err(Error::NotFound(format!("queue {queue} does not exist")));
        }
        Ok(())
    }

    pub(crate) async fn has_queue(&self, queue: &QueueId) -> Result<bool> {
        let row: (bool,) = sqlx::query_as("SELECT EXISTS (SELECT 1 FROM queues WHERE id = $1)")
            .bind(queue.as_str())
            .fetch_one(&self.pool)
            .await?;
        Ok(row.0)
    }

    pub(crate) async fn queue_ids(&self) -> Result<BTreeSet<QueueId>> {
        let rows: Vec<(String,)> = sqlx::query_as("SELECT id FROM queues")
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter()
            .map(|(id,)| QueueId::parse(&id))
            .collect()
    }

    pub(crate) async fn load_items(
        &self,
        queue: &QueueId,
        items: &[Item],
        reset: bool,
    ) -> Result<usize> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("INSERT INTO queues (id) VALUES ($1) ON CONFLICT DO NOTHING")
            .bind(queue.as_str())
            .execute(&mut *tx)
            .await?;
        lock_queue(&mut tx, queue).await?;

        if reset {
            sqlx::query("DELETE FROM leases WHERE queue_id = $1")
                .bind(queue.as_str())
                .execute(&mut *tx)
                .await?;
            sqlx::query("DELETE FROM queue_items WHERE queue_id = $1")
                .bind(queue.as_str())
                .execute(&mut *tx)
                .await?;
        }

        // One insert per item keeps positions in input order.
        for item in items {
            sqlx::query("INSERT INTO queue_items (queue_id, item, state) VALUES ($1, $2, 'queued')")
                .bind(queue.as_str())
                .bind(item.as_bytes())
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(items.len())
    }

    pub(crate) async fn count_items(&self, queue: &QueueId) -> Result<Summary> {
        let mut tx = self.pool.begin().await?;
        lock_queue(&mut tx, queue).await?;

        let rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT state, COUNT(*) FROM queue_items WHERE queue_id = $1 GROUP BY state",
        )
        .bind(queue.as_str())
        .fetch_all(&mut *tx)
        .await?;
        tx.commit().await?;

        let (mut queued, mut pending, mut done) = (0, 0, 0);
        for (state, count) in rows {
            let count = count as u64;
            match state.parse::<Sequence>()? {
                Sequence::Queued => queued = count,
                Sequence::Pending => pending = count,
                Sequence::Done => done = count,
            }
        }
        Ok(Summary::new(queued, pending, done))
    }

    pub(crate) async fn list_items(&self, queue: &QueueId, sequence: Sequence) -> Result<Vec<Item>> {
        let mut tx = self.pool.begin().await?;
        lock_queue(&mut tx, queue).await?;

        let rows: Vec<(Vec<u8>,)> = sqlx::query_as(
            "SELECT item FROM queue_items WHERE queue_id = $1 AND state = $2 ORDER BY position",
        )
        .bind(queue.as_str())
        .bind(sequence.as_str())
        .fetch_all(&mut *tx)
        .await?;
        tx.commit().await?;

        rows.into_iter().map(|(bytes,)| decode_item(bytes)).collect()
    }
}
