//! Read-only status queries.
//!
//! Results are snapshots; they are not linearized with in-flight writes.

use super::Engine;
use crate::error::Result;
use crate::model::{Item, PendingDetail, QueueId, Sequence, Summary};
use futures::stream::{self, StreamExt};
use tracing::warn;

impl Engine {
    pub async fn summary(&self, queue: &QueueId) -> Result<Summary> {
        self.store.summary(queue).await
    }

    pub async fn list_queued(&self, queue: &QueueId) -> Result<Vec<Item>> {
        self.store.list(queue, Sequence::Queued).await
    }

    pub async fn list_pending(&self, queue: &QueueId) -> Result<Vec<Item>> {
        self.store.list(queue, Sequence::Pending).await
    }

    pub async fn list_done(&self, queue: &QueueId) -> Result<Vec<Item>> {
        self.store.list(queue, Sequence::Done).await
    }

    /// Every pending item with its lease holder and remaining TTL, in
    /// pending order.
    ///
    /// Lookups run concurrently, at most `status_concurrency` at a time. A
    /// failed lookup or a missing lease yields an entry with no holder and
    /// no TTL instead of failing the request.
    pub async fn list_pending_detail(&self, queue: &QueueId) -> Result<Vec<PendingDetail>> {
        let pending = self.store.list(queue, Sequence::Pending).await?;
        let now = self.now();

        let details: Vec<PendingDetail> = stream::iter(pending)
            .map(|item| async move {
                match self.store.lease(queue, &item, now).await {
                    Ok(Some(lease)) => PendingDetail {
                        ttl: lease.remaining(now),
                        holder: Some(lease.holder),
                        item,
                    },
                    Ok(None) => PendingDetail {
                        item,
                        holder: None,
                        ttl: None,
                    },
                    Err(e) => {
                        warn!(%queue, %item, "lease lookup failed: {e}");
                        PendingDetail {
                            item,
                            holder: None,
                            ttl: None,
                        }
                    }
                }
            })
            .buffered(self.config.status_concurrency.max(1))
            .collect()
            .await;

        Ok(details)
    }
}
