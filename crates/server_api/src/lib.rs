use std::sync::Arc;

use display::{DisplayChannel, DisplayError};
use ordering::{OrderingError, QueueOrderingEngine};
use shared::{
    domain::{QueueId, QueueItemId, SongId},
    error::{ApiError, ErrorCode},
    protocol::{
        DisplayContentRequest, DisplayStatus, NewQueue, NewSong, QueueItemPayload, QueueSummary,
        SegmentPayload, SongPayload,
    },
};
use storage::{Storage, StoredQueue, StoredQueueEntry, StoredSegment, StoredSong};
use tracing::{info, warn};

/// Everything a request handler needs: the song library and the one
/// presentation channel of this control panel.
#[derive(Clone)]
pub struct ApiContext {
    pub storage: Storage,
    pub display: Arc<DisplayChannel>,
}

pub async fn list_songs(ctx: &ApiContext) -> Result<Vec<SongPayload>, ApiError> {
    let songs = ctx.storage.list_songs().await.map_err(internal)?;
    Ok(songs.into_iter().map(song_payload).collect())
}

pub async fn get_song(ctx: &ApiContext, song_id: SongId) -> Result<SongPayload, ApiError> {
    ctx.storage
        .load_song(song_id)
        .await
        .map_err(internal)?
        .map(song_payload)
        .ok_or_else(|| ApiError::not_found(format!("song {song_id} not found")))
}

pub async fn create_song(ctx: &ApiContext, song: NewSong) -> Result<SongPayload, ApiError> {
    let title = song.title.trim();
    if title.is_empty() {
        return Err(ApiError::validation("song title must not be empty"));
    }
    if song.segments.iter().any(|segment| segment.content.trim().is_empty()) {
        return Err(ApiError::validation("segment content must not be empty"));
    }
    let author = song
        .author
        .as_deref()
        .map(str::trim)
        .filter(|author| !author.is_empty());

    let song_id = ctx
        .storage
        .create_song(title, author, &song.segments)
        .await
        .map_err(internal)?;
    info!(song_id = song_id.0, segments = song.segments.len(), "song created");
    get_song(ctx, song_id).await
}

/// Deletes a song after taking it out of every queue that still holds it.
/// Returns the queues whose items changed.
pub async fn delete_song(ctx: &ApiContext, song_id: SongId) -> Result<Vec<QueueId>, ApiError> {
    if ctx.storage.load_song(song_id).await.map_err(internal)?.is_none() {
        return Err(ApiError::not_found(format!("song {song_id} not found")));
    }

    let engine = QueueOrderingEngine::new(&ctx.storage);
    let mut touched = Vec::new();
    for record in ctx
        .storage
        .queue_items_for_song(song_id)
        .await
        .map_err(internal)?
    {
        engine
            .remove(record.queue_id, record.item_id)
            .await
            .map_err(ordering_error)?;
        if !touched.contains(&record.queue_id) {
            touched.push(record.queue_id);
        }
    }

    ctx.storage.delete_song(song_id).await.map_err(internal)?;
    info!(song_id = song_id.0, queues = touched.len(), "song deleted");
    Ok(touched)
}

pub async fn list_queues(ctx: &ApiContext) -> Result<Vec<QueueSummary>, ApiError> {
    let queues = ctx.storage.list_queues().await.map_err(internal)?;
    Ok(queues.into_iter().map(queue_summary).collect())
}

pub async fn create_queue(ctx: &ApiContext, queue: NewQueue) -> Result<QueueSummary, ApiError> {
    let name = queue.name.trim();
    if name.is_empty() {
        return Err(ApiError::validation("queue name must not be empty"));
    }
    let queue_id = ctx
        .storage
        .create_queue(name, queue.service_date)
        .await
        .map_err(internal)?;
    let stored = ensure_queue(ctx, queue_id).await?;
    Ok(queue_summary(stored))
}

pub async fn delete_queue(ctx: &ApiContext, queue_id: QueueId) -> Result<(), ApiError> {
    if !ctx.storage.delete_queue(queue_id).await.map_err(internal)? {
        return Err(ApiError::not_found(format!("queue {queue_id} not found")));
    }
    Ok(())
}

pub async fn list_queue_items(
    ctx: &ApiContext,
    queue_id: QueueId,
) -> Result<Vec<QueueItemPayload>, ApiError> {
    ensure_queue(ctx, queue_id).await?;
    queue_items(ctx, queue_id).await
}

pub async fn add_song_to_queue(
    ctx: &ApiContext,
    queue_id: QueueId,
    song_id: SongId,
) -> Result<Vec<QueueItemPayload>, ApiError> {
    ensure_queue(ctx, queue_id).await?;
    if ctx.storage.load_song(song_id).await.map_err(internal)?.is_none() {
        return Err(ApiError::not_found(format!("song {song_id} not found")));
    }

    QueueOrderingEngine::new(&ctx.storage)
        .append(queue_id, song_id)
        .await
        .map_err(ordering_error)?;
    queue_items(ctx, queue_id).await
}

pub async fn remove_queue_item(
    ctx: &ApiContext,
    queue_id: QueueId,
    item_id: QueueItemId,
) -> Result<Vec<QueueItemPayload>, ApiError> {
    ensure_queue(ctx, queue_id).await?;
    QueueOrderingEngine::new(&ctx.storage)
        .remove(queue_id, item_id)
        .await
        .map_err(ordering_error)?;
    queue_items(ctx, queue_id).await
}

pub async fn move_queue_item(
    ctx: &ApiContext,
    queue_id: QueueId,
    item_id: QueueItemId,
    new_order: u32,
) -> Result<Vec<QueueItemPayload>, ApiError> {
    ensure_queue(ctx, queue_id).await?;
    QueueOrderingEngine::new(&ctx.storage)
        .move_item(queue_id, item_id, new_order)
        .await
        .map_err(ordering_error)?;
    queue_items(ctx, queue_id).await
}

/// Renumbers a queue whose stored orders drifted away from `1..=N`.
pub async fn repair_queue(
    ctx: &ApiContext,
    queue_id: QueueId,
) -> Result<Vec<QueueItemPayload>, ApiError> {
    ensure_queue(ctx, queue_id).await?;
    QueueOrderingEngine::new(&ctx.storage)
        .repair(queue_id)
        .await
        .map_err(ordering_error)?;
    queue_items(ctx, queue_id).await
}

pub async fn display_status(ctx: &ApiContext) -> DisplayStatus {
    DisplayStatus {
        open: ctx.display.is_open().await,
        ready: ctx.display.is_ready().await,
    }
}

pub async fn open_display(ctx: &ApiContext) -> Result<DisplayStatus, ApiError> {
    ctx.display.open().await.map_err(display_error)?;
    Ok(display_status(ctx).await)
}

pub async fn close_display(ctx: &ApiContext) -> DisplayStatus {
    ctx.display.close().await;
    display_status(ctx).await
}

/// Sends literal text or the content of a stored segment to the surface and
/// returns what was sent.
pub async fn show_content(
    ctx: &ApiContext,
    request: DisplayContentRequest,
) -> Result<String, ApiError> {
    let text = match (request.text, request.segment_id) {
        (Some(text), None) => text,
        (None, Some(segment_id)) => {
            let segment = ctx
                .storage
                .load_segment(segment_id)
                .await
                .map_err(internal)?
                .ok_or_else(|| ApiError::not_found(format!("segment {segment_id} not found")))?;
            segment.content
        }
        _ => {
            return Err(ApiError::validation(
                "exactly one of text or segment_id is required",
            ))
        }
    };

    ctx.display.send(&text).await.map_err(display_error)?;
    Ok(text)
}

pub fn ordering_error(err: OrderingError) -> ApiError {
    match err {
        OrderingError::NotFound(item_id) => {
            ApiError::not_found(format!("queue item {item_id} not found"))
        }
        OrderingError::InvalidTarget { .. } => {
            ApiError::new(ErrorCode::InvalidTarget, err.to_string())
        }
        OrderingError::PartialReorder { queue_id, ref source } => {
            warn!(queue_id = queue_id.0, %source, "queue needs a resync");
            ApiError::new(ErrorCode::PartialReorder, err.to_string())
        }
        OrderingError::Persist(source) => internal(source.into()),
    }
}

pub fn display_error(err: DisplayError) -> ApiError {
    let code = match err {
        DisplayError::PopupBlocked => ErrorCode::PopupBlocked,
        DisplayError::NotOpen => ErrorCode::NotOpen,
        DisplayError::TransportFailure(_) => ErrorCode::TransportFailure,
    };
    ApiError::new(code, err.to_string())
}

async fn ensure_queue(ctx: &ApiContext, queue_id: QueueId) -> Result<StoredQueue, ApiError> {
    ctx.storage
        .load_queue(queue_id)
        .await
        .map_err(internal)?
        .ok_or_else(|| ApiError::not_found(format!("queue {queue_id} not found")))
}

async fn queue_items(ctx: &ApiContext, queue_id: QueueId) -> Result<Vec<QueueItemPayload>, ApiError> {
    let entries = ctx
        .storage
        .list_queue_entries(queue_id)
        .await
        .map_err(internal)?;
    Ok(entries.into_iter().map(queue_item_payload).collect())
}

fn song_payload(song: StoredSong) -> SongPayload {
    SongPayload {
        song_id: song.song_id,
        title: song.title,
        author: song.author,
        segments: song.segments.into_iter().map(segment_payload).collect(),
        created_at: song.created_at,
        updated_at: song.updated_at,
    }
}

fn segment_payload(segment: StoredSegment) -> SegmentPayload {
    SegmentPayload {
        segment_id: segment.segment_id,
        song_id: segment.song_id,
        content: segment.content,
        order: segment.order,
        kind: segment.kind,
    }
}

fn queue_summary(queue: StoredQueue) -> QueueSummary {
    QueueSummary {
        queue_id: queue.queue_id,
        name: queue.name,
        service_date: queue.service_date,
        created_at: queue.created_at,
    }
}

fn queue_item_payload(entry: StoredQueueEntry) -> QueueItemPayload {
    QueueItemPayload {
        item_id: entry.record.item_id,
        queue_id: entry.record.queue_id,
        song_id: entry.record.song_id,
        order: entry.record.order,
        song_title: Some(entry.song_title),
    }
}

fn internal(err: anyhow::Error) -> ApiError {
    ApiError::new(ErrorCode::Internal, err.to_string())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
