use async_trait::async_trait;
use shared::domain::{QueueId, QueueItemId, SongId};

use crate::{OrderedItem, PersistError, Transition};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueItemRecord {
    pub item_id: QueueItemId,
    pub queue_id: QueueId,
    pub song_id: SongId,
    pub order: u32,
}

impl QueueItemRecord {
    pub fn slot(&self) -> OrderedItem {
        OrderedItem::new(self.item_id, self.order)
    }
}

/// Persistence collaborator consumed by [`crate::QueueOrderingEngine`].
#[async_trait]
pub trait QueueStore: Send + Sync {
    async fn list_queue_items(&self, queue_id: QueueId) -> Result<Vec<QueueItemRecord>, PersistError>;

    async fn set_order(&self, item_id: QueueItemId, new_order: u32) -> Result<(), PersistError>;

    async fn insert_queue_item(
        &self,
        queue_id: QueueId,
        song_id: SongId,
        order: u32,
    ) -> Result<QueueItemRecord, PersistError>;

    async fn delete_queue_item(&self, item_id: QueueItemId) -> Result<(), PersistError>;

    /// Writes a whole transition.
    ///
    /// The default applies each write on its own and is therefore not atomic.
    /// Stores that can do better (a database transaction) override it.
    async fn commit_transition(
        &self,
        _queue_id: QueueId,
        transition: &Transition,
    ) -> Result<(), PersistError> {
        if let Some(removed) = transition.removed {
            self.delete_queue_item(removed).await?;
        }
        for change in &transition.changes {
            self.set_order(change.item_id, change.to).await?;
        }
        Ok(())
    }
}
