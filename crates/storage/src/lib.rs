use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow},
    Pool, Row, Sqlite,
};
use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};

use shared::{
    domain::{QueueId, SegmentId, SegmentKind, SongId},
    protocol::NewSegment,
};

mod queues;

pub use queues::StoredQueueEntry;

#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
}

#[derive(Debug, Clone)]
pub struct StoredSegment {
    pub segment_id: SegmentId,
    pub song_id: SongId,
    pub content: String,
    pub order: u32,
    pub kind: SegmentKind,
}

#[derive(Debug, Clone)]
pub struct StoredSong {
    pub song_id: SongId,
    pub title: String,
    pub author: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub segments: Vec<StoredSegment>,
}

#[derive(Debug, Clone)]
pub struct StoredQueue {
    pub queue_id: QueueId,
    pub name: String,
    pub service_date: NaiveDate,
    pub created_at: DateTime<Utc>,
}

impl Storage {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(connect_options)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    /// Inserts a song and its segments in one transaction. Segment orders
    /// follow the slice order, starting at 1.
    pub async fn create_song(
        &self,
        title: &str,
        author: Option<&str>,
        segments: &[NewSegment],
    ) -> Result<SongId> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let rec = sqlx::query(
            "INSERT INTO songs (title, author, created_at, updated_at) VALUES (?, ?, ?, ?) RETURNING id",
        )
        .bind(title)
        .bind(author)
        .bind(now)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;
        let song_id = SongId(rec.get::<i64, _>(0));

        for (segment, position) in segments.iter().zip(1i64..) {
            sqlx::query(
                "INSERT INTO segments (song_id, content, position, kind, created_at, updated_at)
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(song_id.0)
            .bind(&segment.content)
            .bind(position)
            .bind(segment.kind.as_str())
            .bind(now)
            .bind(now)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("failed to insert segment {position} of song {song_id}"))?;
        }

        tx.commit().await?;
        Ok(song_id)
    }

    pub async fn list_songs(&self) -> Result<Vec<StoredSong>> {
        let rows = sqlx::query(
            "SELECT id, title, author, created_at, updated_at
             FROM songs
             ORDER BY lower(title) ASC, id ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        let mut songs: Vec<StoredSong> = rows.iter().map(song_from_row).collect();

        let segment_rows = sqlx::query(
            "SELECT id, song_id, content, position, kind
             FROM segments
             ORDER BY song_id ASC, position ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        for segment in segment_rows.iter().map(segment_from_row) {
            if let Some(song) = songs.iter_mut().find(|song| song.song_id == segment.song_id) {
                song.segments.push(segment);
            }
        }

        Ok(songs)
    }

    pub async fn load_song(&self, song_id: SongId) -> Result<Option<StoredSong>> {
        let row = sqlx::query("SELECT id, title, author, created_at, updated_at FROM songs WHERE id = ?")
            .bind(song_id.0)
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = row else {
            return Ok(None);
        };

        let mut song = song_from_row(&row);
        song.segments = sqlx::query(
            "SELECT id, song_id, content, position, kind
             FROM segments
             WHERE song_id = ?
             ORDER BY position ASC",
        )
        .bind(song_id.0)
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(segment_from_row)
        .collect();
        Ok(Some(song))
    }

    pub async fn load_segment(&self, segment_id: SegmentId) -> Result<Option<StoredSegment>> {
        let row = sqlx::query("SELECT id, song_id, content, position, kind FROM segments WHERE id = ?")
            .bind(segment_id.0)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(segment_from_row))
    }

    /// Deletes a song and, through the foreign key, its segments. Queue items
    /// must be removed first; a song still queued fails the foreign key.
    pub async fn delete_song(&self, song_id: SongId) -> Result<bool> {
        let affected = sqlx::query("DELETE FROM songs WHERE id = ?")
            .bind(song_id.0)
            .execute(&self.pool)
            .await
            .with_context(|| format!("failed to delete song {song_id}"))?
            .rows_affected();
        Ok(affected > 0)
    }
}

fn song_from_row(row: &SqliteRow) -> StoredSong {
    StoredSong {
        song_id: SongId(row.get::<i64, _>(0)),
        title: row.get::<String, _>(1),
        author: row.get::<Option<String>, _>(2),
        created_at: row.get::<DateTime<Utc>, _>(3),
        updated_at: row.get::<DateTime<Utc>, _>(4),
        segments: Vec::new(),
    }
}

fn segment_from_row(row: &SqliteRow) -> StoredSegment {
    StoredSegment {
        segment_id: SegmentId(row.get::<i64, _>(0)),
        song_id: SongId(row.get::<i64, _>(1)),
        content: row.get::<String, _>(2),
        order: order_from_position(row.get::<i64, _>(3)),
        kind: SegmentKind::from_label(&row.get::<String, _>(4)),
    }
}

/// Out-of-range positions map to 0, which the ordering engine treats as drift
/// and compacts away. `commit_transition` matches such rows by range.
pub(crate) fn order_from_position(position: i64) -> u32 {
    u32::try_from(position).unwrap_or(0)
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;

    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if database_url.starts_with("sqlite::memory:") || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
