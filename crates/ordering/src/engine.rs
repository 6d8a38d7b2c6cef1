use shared::domain::{QueueId, QueueItemId, SongId};
use tracing::{debug, error, warn};

use crate::{
    transition::{self, OrderedItem},
    OrderingError, QueueItemRecord, QueueStore,
};

/// Applies queue mutations through a [`QueueStore`], one transition per call.
pub struct QueueOrderingEngine<'a, S: ?Sized> {
    store: &'a S,
}

impl<'a, S: QueueStore + ?Sized> QueueOrderingEngine<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Current items sorted by order.
    pub async fn items(&self, queue_id: QueueId) -> Result<Vec<QueueItemRecord>, OrderingError> {
        let mut items = self.store.list_queue_items(queue_id).await?;
        items.sort_by_key(|item| item.order);
        Ok(items)
    }

    pub async fn append(
        &self,
        queue_id: QueueId,
        song_id: SongId,
    ) -> Result<QueueItemRecord, OrderingError> {
        let current = self.items(queue_id).await?;
        let slots = slots(&current);
        if !transition::is_dense(&slots) {
            self.repair(queue_id).await?;
        }
        let order = transition::next_order(&slots);
        let record = self
            .store
            .insert_queue_item(queue_id, song_id, order)
            .await?;
        debug!(queue_id = queue_id.0, item_id = record.item_id.0, order, "appended queue item");
        Ok(record)
    }

    pub async fn remove(
        &self,
        queue_id: QueueId,
        item_id: QueueItemId,
    ) -> Result<Vec<QueueItemRecord>, OrderingError> {
        let current = self.items(queue_id).await?;
        let before = slots(&current);
        let after = transition::remove(&baseline(queue_id, &before), item_id)?;
        self.commit(queue_id, &before, &after).await?;
        debug!(queue_id = queue_id.0, item_id = item_id.0, "removed queue item");
        Ok(reassign(current, &after))
    }

    pub async fn move_item(
        &self,
        queue_id: QueueId,
        item_id: QueueItemId,
        new_order: u32,
    ) -> Result<Vec<QueueItemRecord>, OrderingError> {
        let current = self.items(queue_id).await?;
        let before = slots(&current);
        let after = transition::move_item(&baseline(queue_id, &before), item_id, new_order)?;
        self.commit(queue_id, &before, &after).await?;
        debug!(queue_id = queue_id.0, item_id = item_id.0, new_order, "moved queue item");
        Ok(reassign(current, &after))
    }

    /// Renumbers a queue back to `1..=N` without changing its relative order.
    pub async fn repair(&self, queue_id: QueueId) -> Result<Vec<QueueItemRecord>, OrderingError> {
        let current = self.items(queue_id).await?;
        let before = slots(&current);
        let after = transition::compact(&before);
        self.commit(queue_id, &before, &after).await?;
        Ok(reassign(current, &after))
    }

    async fn commit(
        &self,
        queue_id: QueueId,
        before: &[OrderedItem],
        after: &[OrderedItem],
    ) -> Result<(), OrderingError> {
        let change = transition::diff(before, after);
        if change.is_empty() {
            return Ok(());
        }

        let Err(source) = self.store.commit_transition(queue_id, &change).await else {
            return Ok(());
        };

        let observed = match self.store.list_queue_items(queue_id).await {
            Ok(items) => slots(&items),
            Err(reload_error) => {
                error!(queue_id = queue_id.0, %source, %reload_error, "queue state unverifiable after failed reorder");
                return Err(OrderingError::PartialReorder { queue_id, source });
            }
        };

        if transition::same_assignment(&observed, before) {
            return Err(OrderingError::Persist(source));
        }
        if transition::same_assignment(&observed, after) {
            warn!(queue_id = queue_id.0, %source, "store reported failure but reorder is fully applied");
            return Ok(());
        }

        error!(queue_id = queue_id.0, %source, "reorder left the queue partially applied");
        Err(OrderingError::PartialReorder { queue_id, source })
    }
}

fn slots(items: &[QueueItemRecord]) -> Vec<OrderedItem> {
    items.iter().map(QueueItemRecord::slot).collect()
}

/// Stored orders that drifted from `1..=N` are compacted before the
/// operation runs, so the committed result is always dense.
fn baseline(queue_id: QueueId, before: &[OrderedItem]) -> Vec<OrderedItem> {
    if transition::is_dense(before) {
        return before.to_vec();
    }
    warn!(queue_id = queue_id.0, "stored queue orders are not dense, compacting");
    transition::compact(before)
}

fn reassign(records: Vec<QueueItemRecord>, after: &[OrderedItem]) -> Vec<QueueItemRecord> {
    let mut next: Vec<QueueItemRecord> = records
        .into_iter()
        .filter_map(|mut record| {
            let slot = after.iter().find(|slot| slot.item_id == record.item_id)?;
            record.order = slot.order;
            Some(record)
        })
        .collect();
    next.sort_by_key(|record| record.order);
    next
}

#[cfg(test)]
#[path = "tests/engine_tests.rs"]
mod tests;
