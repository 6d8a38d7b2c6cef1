use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::*;
use crate::{PersistError, Transition};

#[derive(Default)]
struct MemoryStore {
    items: Mutex<Vec<QueueItemRecord>>,
    next_id: AtomicUsize,
    /// Number of `set_order` calls that succeed before every later one fails.
    fail_after: Option<usize>,
    set_calls: AtomicUsize,
    atomic: bool,
}

impl MemoryStore {
    fn failing_after(successes: usize) -> Self {
        Self {
            fail_after: Some(successes),
            ..Self::default()
        }
    }

    async fn orders(&self, queue_id: QueueId) -> Vec<(i64, u32)> {
        let mut items: Vec<(i64, u32)> = self
            .items
            .lock()
            .await
            .iter()
            .filter(|item| item.queue_id == queue_id)
            .map(|item| (item.item_id.0, item.order))
            .collect();
        items.sort_by_key(|(_, order)| *order);
        items
    }
}

#[async_trait]
impl QueueStore for MemoryStore {
    async fn list_queue_items(&self, queue_id: QueueId) -> Result<Vec<QueueItemRecord>, PersistError> {
        Ok(self
            .items
            .lock()
            .await
            .iter()
            .filter(|item| item.queue_id == queue_id)
            .cloned()
            .collect())
    }

    async fn set_order(&self, item_id: QueueItemId, new_order: u32) -> Result<(), PersistError> {
        let call = self.set_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_after.is_some_and(|limit| call >= limit) {
            return Err(PersistError::msg("disk full"));
        }
        let mut items = self.items.lock().await;
        let item = items
            .iter_mut()
            .find(|item| item.item_id == item_id)
            .ok_or_else(|| PersistError::msg("missing row"))?;
        item.order = new_order;
        Ok(())
    }

    async fn insert_queue_item(
        &self,
        queue_id: QueueId,
        song_id: SongId,
        order: u32,
    ) -> Result<QueueItemRecord, PersistError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) as i64 + 1;
        let record = QueueItemRecord {
            item_id: QueueItemId(id),
            queue_id,
            song_id,
            order,
        };
        self.items.lock().await.push(record.clone());
        Ok(record)
    }

    async fn delete_queue_item(&self, item_id: QueueItemId) -> Result<(), PersistError> {
        self.items.lock().await.retain(|item| item.item_id != item_id);
        Ok(())
    }

    async fn commit_transition(
        &self,
        queue_id: QueueId,
        transition: &Transition,
    ) -> Result<(), PersistError> {
        if !self.atomic {
            if let Some(removed) = transition.removed {
                self.delete_queue_item(removed).await?;
            }
            for change in &transition.changes {
                self.set_order(change.item_id, change.to).await?;
            }
            return Ok(());
        }

        let snapshot = self.items.lock().await.clone();
        let result = async {
            if let Some(removed) = transition.removed {
                self.delete_queue_item(removed).await?;
            }
            for change in &transition.changes {
                self.set_order(change.item_id, change.to).await?;
            }
            Ok::<_, PersistError>(())
        }
        .await;
        if result.is_err() {
            let mut items = self.items.lock().await;
            items.retain(|item| item.queue_id != queue_id);
            items.extend(snapshot.into_iter().filter(|item| item.queue_id == queue_id));
        }
        result
    }
}

const QUEUE: QueueId = QueueId(1);

async fn seeded(store: &MemoryStore, count: usize) -> Vec<QueueItemId> {
    let engine = QueueOrderingEngine::new(store);
    let mut ids = Vec::new();
    for song in 0..count {
        let record = engine
            .append(QUEUE, SongId(song as i64 + 100))
            .await
            .expect("append");
        ids.push(record.item_id);
    }
    ids
}

#[tokio::test]
async fn append_assigns_consecutive_orders() {
    let store = MemoryStore::default();
    seeded(&store, 3).await;
    assert_eq!(store.orders(QUEUE).await, vec![(1, 1), (2, 2), (3, 3)]);
}

#[tokio::test]
async fn remove_renumbers_remaining_items() {
    let store = MemoryStore::default();
    let ids = seeded(&store, 4).await;
    let engine = QueueOrderingEngine::new(&store);

    let items = engine.remove(QUEUE, ids[1]).await.expect("remove");
    let orders: Vec<(i64, u32)> = items.iter().map(|i| (i.item_id.0, i.order)).collect();
    assert_eq!(orders, vec![(1, 1), (3, 2), (4, 3)]);
    assert_eq!(store.orders(QUEUE).await, orders);
}

#[tokio::test]
async fn move_to_front_matches_stored_state() {
    let store = MemoryStore::default();
    let ids = seeded(&store, 3).await;
    let engine = QueueOrderingEngine::new(&store);

    engine.move_item(QUEUE, ids[2], 1).await.expect("move");
    assert_eq!(store.orders(QUEUE).await, vec![(3, 1), (1, 2), (2, 3)]);
}

#[tokio::test]
async fn validation_errors_leave_the_store_untouched() {
    let store = MemoryStore::default();
    let ids = seeded(&store, 2).await;
    let engine = QueueOrderingEngine::new(&store);

    assert!(matches!(
        engine.move_item(QUEUE, ids[0], 3).await,
        Err(OrderingError::InvalidTarget { requested: 3, len: 2 })
    ));
    assert!(matches!(
        engine.remove(QUEUE, QueueItemId(42)).await,
        Err(OrderingError::NotFound(QueueItemId(42)))
    ));
    assert_eq!(store.set_calls.load(Ordering::SeqCst), 0);
    assert_eq!(store.orders(QUEUE).await, vec![(1, 1), (2, 2)]);
}

#[tokio::test]
async fn failure_before_any_write_is_a_plain_persist_error() {
    let store = MemoryStore::failing_after(0);
    let ids = seeded(&store, 3).await;
    let engine = QueueOrderingEngine::new(&store);

    let err = engine.move_item(QUEUE, ids[2], 1).await.expect_err("fails");
    assert!(matches!(err, OrderingError::Persist(_)));
    assert_eq!(store.orders(QUEUE).await, vec![(1, 1), (2, 2), (3, 3)]);
}

#[tokio::test]
async fn half_applied_transition_is_reported_as_partial_reorder() {
    let store = MemoryStore::failing_after(1);
    let ids = seeded(&store, 3).await;
    let engine = QueueOrderingEngine::new(&store);

    let err = engine.move_item(QUEUE, ids[2], 1).await.expect_err("fails");
    assert!(matches!(err, OrderingError::PartialReorder { queue_id: QUEUE, .. }));

    let repaired = engine.repair(QUEUE).await;
    // The store keeps failing writes, so repair cannot succeed either, but it
    // must not claim the queue is healthy.
    assert!(repaired.is_err());
}

#[tokio::test]
async fn atomic_store_rolls_back_and_reports_persist_error() {
    let store = MemoryStore {
        atomic: true,
        ..MemoryStore::failing_after(1)
    };
    let ids = seeded(&store, 3).await;
    let engine = QueueOrderingEngine::new(&store);

    let err = engine.move_item(QUEUE, ids[2], 1).await.expect_err("fails");
    assert!(matches!(err, OrderingError::Persist(_)));
    assert_eq!(store.orders(QUEUE).await, vec![(1, 1), (2, 2), (3, 3)]);
}

#[tokio::test]
async fn repair_compacts_drifted_orders() {
    let store = MemoryStore::default();
    let ids = seeded(&store, 3).await;
    store.set_order(ids[2], 9).await.expect("drift");
    let engine = QueueOrderingEngine::new(&store);

    let items = engine.repair(QUEUE).await.expect("repair");
    assert!(transition::is_dense(&slots(&items)));
    assert_eq!(store.orders(QUEUE).await, vec![(1, 1), (2, 2), (3, 3)]);
}

#[tokio::test]
async fn operations_on_drifted_queue_still_produce_dense_orders() {
    let store = MemoryStore::default();
    let ids = seeded(&store, 3).await;
    store.set_order(ids[0], 7).await.expect("drift");
    let engine = QueueOrderingEngine::new(&store);

    engine.remove(QUEUE, ids[1]).await.expect("remove");
    assert_eq!(store.orders(QUEUE).await, vec![(3, 1), (1, 2)]);
}
