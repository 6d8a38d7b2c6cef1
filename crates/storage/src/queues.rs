use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{sqlite::SqliteRow, Row};

use ordering::{PersistError, QueueItemRecord, QueueStore, Transition};
use shared::domain::{QueueId, QueueItemId, SongId};

use crate::{order_from_position, Storage, StoredQueue};

/// A queue item joined with the title of the song it points at.
#[derive(Debug, Clone)]
pub struct StoredQueueEntry {
    pub record: QueueItemRecord,
    pub song_title: String,
}

impl Storage {
    pub async fn create_queue(&self, name: &str, service_date: NaiveDate) -> Result<QueueId> {
        let rec = sqlx::query(
            "INSERT INTO service_queues (name, service_date, created_at) VALUES (?, ?, ?) RETURNING id",
        )
        .bind(name)
        .bind(service_date)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;
        Ok(QueueId(rec.get::<i64, _>(0)))
    }

    pub async fn list_queues(&self) -> Result<Vec<StoredQueue>> {
        let rows = sqlx::query(
            "SELECT id, name, service_date, created_at
             FROM service_queues
             ORDER BY service_date DESC, id DESC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(queue_from_row).collect())
    }

    pub async fn load_queue(&self, queue_id: QueueId) -> Result<Option<StoredQueue>> {
        let row = sqlx::query("SELECT id, name, service_date, created_at FROM service_queues WHERE id = ?")
            .bind(queue_id.0)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(queue_from_row))
    }

    /// Removes a queue together with its items.
    pub async fn delete_queue(&self, queue_id: QueueId) -> Result<bool> {
        let affected = sqlx::query("DELETE FROM service_queues WHERE id = ?")
            .bind(queue_id.0)
            .execute(&self.pool)
            .await
            .with_context(|| format!("failed to delete queue {queue_id}"))?
            .rows_affected();
        Ok(affected > 0)
    }

    pub async fn list_queue_entries(&self, queue_id: QueueId) -> Result<Vec<StoredQueueEntry>> {
        let rows = sqlx::query(
            "SELECT qi.id, qi.queue_id, qi.song_id, qi.position, s.title
             FROM queue_items qi
             JOIN songs s ON s.id = qi.song_id
             WHERE qi.queue_id = ?
             ORDER BY qi.position ASC",
        )
        .bind(queue_id.0)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .iter()
            .map(|row| StoredQueueEntry {
                record: record_from_row(row),
                song_title: row.get::<String, _>(4),
            })
            .collect())
    }

    /// Every queue item that references `song_id`, across all queues.
    pub async fn queue_items_for_song(&self, song_id: SongId) -> Result<Vec<QueueItemRecord>> {
        let rows = sqlx::query(
            "SELECT id, queue_id, song_id, position
             FROM queue_items
             WHERE song_id = ?
             ORDER BY queue_id ASC, position ASC",
        )
        .bind(song_id.0)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(record_from_row).collect())
    }
}

#[async_trait]
impl QueueStore for Storage {
    async fn list_queue_items(&self, queue_id: QueueId) -> Result<Vec<QueueItemRecord>, PersistError> {
        let rows = sqlx::query(
            "SELECT id, queue_id, song_id, position
             FROM queue_items
             WHERE queue_id = ?
             ORDER BY position ASC",
        )
        .bind(queue_id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(persist)?;
        Ok(rows.iter().map(record_from_row).collect())
    }

    async fn set_order(&self, item_id: QueueItemId, new_order: u32) -> Result<(), PersistError> {
        let affected = sqlx::query("UPDATE queue_items SET position = ? WHERE id = ?")
            .bind(i64::from(new_order))
            .bind(item_id.0)
            .execute(&self.pool)
            .await
            .map_err(persist)?
            .rows_affected();
        if affected == 0 {
            return Err(PersistError::msg(format!("queue item {item_id} does not exist")));
        }
        Ok(())
    }

    async fn insert_queue_item(
        &self,
        queue_id: QueueId,
        song_id: SongId,
        order: u32,
    ) -> Result<QueueItemRecord, PersistError> {
        let rec = sqlx::query(
            "INSERT INTO queue_items (queue_id, song_id, position, created_at) VALUES (?, ?, ?, ?) RETURNING id",
        )
        .bind(queue_id.0)
        .bind(song_id.0)
        .bind(i64::from(order))
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(persist)?;
        Ok(QueueItemRecord {
            item_id: QueueItemId(rec.get::<i64, _>(0)),
            queue_id,
            song_id,
            order,
        })
    }

    async fn delete_queue_item(&self, item_id: QueueItemId) -> Result<(), PersistError> {
        let affected = sqlx::query("DELETE FROM queue_items WHERE id = ?")
            .bind(item_id.0)
            .execute(&self.pool)
            .await
            .map_err(persist)?
            .rows_affected();
        if affected == 0 {
            return Err(PersistError::msg(format!("queue item {item_id} does not exist")));
        }
        Ok(())
    }

    /// Applies the whole transition in one transaction.
    ///
    /// `(queue_id, position)` is unique, so changed rows are first parked at
    /// `floor - to`, strictly below every stored position, and then flipped
    /// into place in a single statement. Every write must hit exactly the row
    /// it expects; otherwise the transaction rolls back. A change from order 0
    /// matches whatever out-of-range position the row actually holds.
    async fn commit_transition(
        &self,
        queue_id: QueueId,
        transition: &Transition,
    ) -> Result<(), PersistError> {
        let mut tx = self.pool.begin().await.map_err(persist)?;

        if let Some(removed) = transition.removed {
            let affected = sqlx::query("DELETE FROM queue_items WHERE id = ? AND queue_id = ?")
                .bind(removed.0)
                .bind(queue_id.0)
                .execute(&mut *tx)
                .await
                .map_err(persist)?
                .rows_affected();
            if affected != 1 {
                return Err(PersistError::msg(format!(
                    "queue item {removed} is not part of queue {queue_id}"
                )));
            }
        }

        let lowest = sqlx::query("SELECT MIN(position) FROM queue_items WHERE queue_id = ?")
            .bind(queue_id.0)
            .fetch_one(&mut *tx)
            .await
            .map_err(persist)?
            .get::<Option<i64>, _>(0)
            .unwrap_or(1);
        let floor = lowest.min(1) - 1;

        for change in &transition.changes {
            let query = if change.from == 0 {
                sqlx::query(
                    "UPDATE queue_items SET position = ? WHERE id = ? AND queue_id = ? AND (position < 1 OR position > ?)",
                )
                .bind(floor - i64::from(change.to))
                .bind(change.item_id.0)
                .bind(queue_id.0)
                .bind(i64::from(u32::MAX))
            } else {
                sqlx::query(
                    "UPDATE queue_items SET position = ? WHERE id = ? AND queue_id = ? AND position = ?",
                )
                .bind(floor - i64::from(change.to))
                .bind(change.item_id.0)
                .bind(queue_id.0)
                .bind(i64::from(change.from))
            };
            let affected = query
                .execute(&mut *tx)
                .await
                .map_err(persist)?
                .rows_affected();
            if affected != 1 {
                return Err(PersistError::msg(format!(
                    "queue item {} is no longer at position {} in queue {queue_id}",
                    change.item_id, change.from
                )));
            }
        }

        let flipped = sqlx::query(
            "UPDATE queue_items SET position = ? - position WHERE queue_id = ? AND position < ?",
        )
        .bind(floor)
        .bind(queue_id.0)
        .bind(floor)
        .execute(&mut *tx)
        .await
        .map_err(persist)?
        .rows_affected();
        if flipped != transition.changes.len() as u64 {
            return Err(PersistError::msg(format!(
                "expected {} reordered rows in queue {queue_id}, found {flipped}",
                transition.changes.len()
            )));
        }

        tx.commit().await.map_err(persist)?;
        Ok(())
    }
}

fn persist(err: sqlx::Error) -> PersistError {
    PersistError::from(anyhow!(err))
}

fn record_from_row(row: &SqliteRow) -> QueueItemRecord {
    QueueItemRecord {
        item_id: QueueItemId(row.get::<i64, _>(0)),
        queue_id: QueueId(row.get::<i64, _>(1)),
        song_id: SongId(row.get::<i64, _>(2)),
        order: order_from_position(row.get::<i64, _>(3)),
    }
}

fn queue_from_row(row: &SqliteRow) -> StoredQueue {
    StoredQueue {
        queue_id: QueueId(row.get::<i64, _>(0)),
        name: row.get::<String, _>(1),
        service_date: row.get::<NaiveDate, _>(2),
        created_at: row.get::<DateTime<Utc>, _>(3),
    }
}
