use shared::domain::{QueueId, QueueItemId};
use thiserror::Error;

/// Failure reported by a [`crate::QueueStore`] implementation.
#[derive(Debug, Error)]
#[error(transparent)]
pub struct PersistError(#[from] anyhow::Error);

impl PersistError {
    pub fn msg(message: impl Into<String>) -> Self {
        Self(anyhow::anyhow!(message.into()))
    }
}

#[derive(Debug, Error)]
pub enum OrderingError {
    #[error("queue item {0} not found")]
    NotFound(QueueItemId),
    #[error("target position {requested} is outside 1..={len}")]
    InvalidTarget { requested: u32, len: usize },
    /// The store applied only part of a transition. Local state must not be
    /// trusted; callers re-fetch the queue.
    #[error("queue {queue_id} was left partially reordered")]
    PartialReorder {
        queue_id: QueueId,
        #[source]
        source: PersistError,
    },
    #[error(transparent)]
    Persist(#[from] PersistError),
}
