use super::*;
use ordering::{transition::OrderChange, QueueStore, Transition};
use shared::domain::QueueItemId;

fn segment(kind: SegmentKind, content: &str) -> NewSegment {
    NewSegment {
        content: content.to_string(),
        kind,
    }
}

fn service_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, 2).expect("date")
}

async fn queue_with_songs(storage: &Storage, titles: &[&str]) -> (QueueId, Vec<QueueItemId>) {
    let queue = storage
        .create_queue("Sunday", service_date())
        .await
        .expect("queue");
    let mut items = Vec::new();
    for (title, order) in titles.iter().zip(1u32..) {
        let song = storage.create_song(title, None, &[]).await.expect("song");
        let record = storage
            .insert_queue_item(queue, song, order)
            .await
            .expect("item");
        items.push(record.item_id);
    }
    (queue, items)
}

async fn positions(storage: &Storage, queue: QueueId) -> Vec<(QueueItemId, u32)> {
    storage
        .list_queue_items(queue)
        .await
        .expect("items")
        .into_iter()
        .map(|record| (record.item_id, record.order))
        .collect()
}

#[tokio::test]
async fn health_check_succeeds_for_live_pool() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    storage.health_check().await.expect("health check");
}

#[tokio::test]
async fn creates_database_file_when_missing() {
    let temp_root = tempfile::tempdir().expect("tempdir");
    let db_path = temp_root.path().join("nested").join("lyrics.db");
    let database_url = format!("sqlite://{}", db_path.to_string_lossy().replace('\\', "/"));

    let storage = Storage::new(&database_url).await.expect("db");
    drop(storage);

    assert!(
        db_path.exists(),
        "database file should exist: {}",
        db_path.display()
    );
}

#[test]
fn sqlite_path_ignores_memory_and_query() {
    assert_eq!(sqlite_path("sqlite::memory:"), None);
    assert_eq!(sqlite_path("postgres://localhost/db"), None);
    assert_eq!(
        sqlite_path("sqlite://./data/lyrics.db?mode=rwc"),
        Some(PathBuf::from("./data/lyrics.db"))
    );
}

#[tokio::test]
async fn stores_song_with_ordered_segments() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let song = storage
        .create_song(
            "Amazing Grace",
            Some("John Newton"),
            &[
                segment(SegmentKind::Verse, "Amazing grace, how sweet the sound"),
                segment(SegmentKind::Chorus, "My chains are gone"),
                segment(SegmentKind::Verse, "'Twas grace that taught my heart to fear"),
            ],
        )
        .await
        .expect("song");

    let loaded = storage.load_song(song).await.expect("load").expect("song exists");
    assert_eq!(loaded.title, "Amazing Grace");
    assert_eq!(loaded.author.as_deref(), Some("John Newton"));
    let orders: Vec<u32> = loaded.segments.iter().map(|s| s.order).collect();
    assert_eq!(orders, vec![1, 2, 3]);
    assert_eq!(loaded.segments[1].kind, SegmentKind::Chorus);

    let segment = storage
        .load_segment(loaded.segments[1].segment_id)
        .await
        .expect("segment")
        .expect("segment exists");
    assert_eq!(segment.content, "My chains are gone");
    assert_eq!(segment.song_id, song);
}

#[tokio::test]
async fn lists_songs_by_title_with_segments() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    storage
        .create_song("way maker", None, &[segment(SegmentKind::Intro, "Way maker")])
        .await
        .expect("song");
    storage
        .create_song("Be Thou My Vision", None, &[])
        .await
        .expect("song");

    let songs = storage.list_songs().await.expect("songs");
    let titles: Vec<&str> = songs.iter().map(|s| s.title.as_str()).collect();
    assert_eq!(titles, vec!["Be Thou My Vision", "way maker"]);
    assert!(songs[0].segments.is_empty());
    assert_eq!(songs[1].segments.len(), 1);
}

#[tokio::test]
async fn missing_rows_load_as_none() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    assert!(storage.load_song(SongId(99)).await.expect("load").is_none());
    assert!(storage.load_segment(SegmentId(99)).await.expect("load").is_none());
    assert!(storage.load_queue(QueueId(99)).await.expect("load").is_none());
    assert!(!storage.delete_song(SongId(99)).await.expect("delete"));
    assert!(!storage.delete_queue(QueueId(99)).await.expect("delete"));
}

#[tokio::test]
async fn deleting_song_removes_segments() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let song = storage
        .create_song("Doxology", None, &[segment(SegmentKind::Verse, "Praise God")])
        .await
        .expect("song");
    let segment_id = storage.load_song(song).await.expect("load").expect("song").segments[0].segment_id;

    assert!(storage.delete_song(song).await.expect("delete"));
    assert!(storage.load_segment(segment_id).await.expect("load").is_none());
}

#[tokio::test]
async fn queued_song_cannot_be_deleted_directly() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let (queue, _) = queue_with_songs(&storage, &["Holy Holy Holy"]).await;
    let song = storage.list_queue_entries(queue).await.expect("entries")[0].record.song_id;

    assert!(storage.delete_song(song).await.is_err());
    assert_eq!(storage.queue_items_for_song(song).await.expect("items").len(), 1);
}

#[tokio::test]
async fn queues_list_newest_service_first() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let earlier = NaiveDate::from_ymd_opt(2024, 5, 26).expect("date");
    storage.create_queue("Last week", earlier).await.expect("queue");
    let latest = storage.create_queue("This week", service_date()).await.expect("queue");

    let queues = storage.list_queues().await.expect("queues");
    assert_eq!(queues.len(), 2);
    assert_eq!(queues[0].queue_id, latest);
    assert_eq!(queues[0].service_date, service_date());
}

#[tokio::test]
async fn deleting_queue_removes_its_items() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let (queue, _) = queue_with_songs(&storage, &["One", "Two"]).await;

    assert!(storage.delete_queue(queue).await.expect("delete"));
    assert!(storage.list_queue_items(queue).await.expect("items").is_empty());
    assert_eq!(storage.list_songs().await.expect("songs").len(), 2);
}

#[tokio::test]
async fn queue_entries_carry_song_titles_in_order() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let (queue, items) = queue_with_songs(&storage, &["Opening", "Closing"]).await;

    let entries = storage.list_queue_entries(queue).await.expect("entries");
    let titles: Vec<&str> = entries.iter().map(|e| e.song_title.as_str()).collect();
    assert_eq!(titles, vec!["Opening", "Closing"]);
    assert_eq!(entries[1].record.item_id, items[1]);
    assert_eq!(entries[1].record.order, 2);
}

#[tokio::test]
async fn duplicate_position_is_rejected() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let (queue, _) = queue_with_songs(&storage, &["First"]).await;
    let song = storage.create_song("Second", None, &[]).await.expect("song");

    assert!(storage.insert_queue_item(queue, song, 1).await.is_err());
}

#[tokio::test]
async fn commit_transition_swaps_positions_atomically() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let (queue, items) = queue_with_songs(&storage, &["A", "B", "C"]).await;

    let transition = Transition {
        removed: None,
        changes: vec![
            OrderChange { item_id: items[0], from: 1, to: 3 },
            OrderChange { item_id: items[1], from: 2, to: 1 },
            OrderChange { item_id: items[2], from: 3, to: 2 },
        ],
    };
    storage
        .commit_transition(queue, &transition)
        .await
        .expect("commit");

    assert_eq!(
        positions(&storage, queue).await,
        vec![(items[1], 1), (items[2], 2), (items[0], 3)]
    );
}

#[tokio::test]
async fn commit_transition_rolls_back_on_stale_change() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let (queue, items) = queue_with_songs(&storage, &["A", "B", "C"]).await;

    let transition = Transition {
        removed: Some(items[0]),
        changes: vec![
            OrderChange { item_id: items[1], from: 2, to: 1 },
            OrderChange { item_id: items[2], from: 7, to: 2 },
        ],
    };
    assert!(storage.commit_transition(queue, &transition).await.is_err());

    assert_eq!(
        positions(&storage, queue).await,
        vec![(items[0], 1), (items[1], 2), (items[2], 3)]
    );
}

#[tokio::test]
async fn commit_transition_rejects_item_from_other_queue() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let (queue, items) = queue_with_songs(&storage, &["A", "B"]).await;
    let (other, foreign) = queue_with_songs(&storage, &["X"]).await;

    let transition = Transition {
        removed: Some(foreign[0]),
        changes: vec![OrderChange { item_id: items[1], from: 2, to: 1 }],
    };
    assert!(storage.commit_transition(queue, &transition).await.is_err());

    assert_eq!(positions(&storage, queue).await, vec![(items[0], 1), (items[1], 2)]);
    assert_eq!(positions(&storage, other).await, vec![(foreign[0], 1)]);
}

#[tokio::test]
async fn commit_transition_moves_rows_from_out_of_range_positions() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let (queue, items) = queue_with_songs(&storage, &["A", "B"]).await;
    sqlx::query("UPDATE queue_items SET position = -1 WHERE id = ?")
        .bind(items[1].0)
        .execute(storage.pool())
        .await
        .expect("drift");

    let transition = Transition {
        removed: None,
        changes: vec![
            OrderChange { item_id: items[1], from: 0, to: 1 },
            OrderChange { item_id: items[0], from: 1, to: 2 },
        ],
    };
    storage
        .commit_transition(queue, &transition)
        .await
        .expect("commit");

    assert_eq!(positions(&storage, queue).await, vec![(items[1], 1), (items[0], 2)]);
}

#[tokio::test]
async fn commit_transition_from_zero_requires_an_out_of_range_row() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let (queue, items) = queue_with_songs(&storage, &["A", "B"]).await;

    let transition = Transition {
        removed: None,
        changes: vec![OrderChange { item_id: items[1], from: 0, to: 1 }],
    };
    assert!(storage.commit_transition(queue, &transition).await.is_err());
    assert_eq!(positions(&storage, queue).await, vec![(items[0], 1), (items[1], 2)]);
}

#[tokio::test]
async fn set_order_and_delete_report_missing_items() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    assert!(storage.set_order(QueueItemId(42), 1).await.is_err());
    assert!(storage.delete_queue_item(QueueItemId(42)).await.is_err());
}
