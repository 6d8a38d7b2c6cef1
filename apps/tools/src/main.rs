use anyhow::{anyhow, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use ordering::QueueOrderingEngine;
use shared::{
    domain::{QueueId, QueueItemId, SegmentKind, SongId},
    protocol::NewSegment,
};
use storage::Storage;

#[derive(Parser, Debug)]
struct Cli {
    #[arg(long, default_value = "sqlite://./data/lyrics.db")]
    database_url: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    CreateSong {
        title: String,
        #[arg(long)]
        author: Option<String>,
        /// `kind:content`, repeatable, in display order.
        #[arg(long = "segment", value_parser = parse_segment)]
        segments: Vec<NewSegment>,
    },
    ListSongs,
    CreateQueue {
        name: String,
        /// YYYY-MM-DD
        service_date: NaiveDate,
    },
    AddToQueue {
        queue_id: i64,
        song_id: i64,
    },
    MoveItem {
        queue_id: i64,
        item_id: i64,
        order: u32,
    },
    RemoveItem {
        queue_id: i64,
        item_id: i64,
    },
    RepairQueue {
        queue_id: i64,
    },
    ListQueue {
        queue_id: i64,
    },
}

fn parse_segment(raw: &str) -> Result<NewSegment, String> {
    let (kind, content) = raw
        .split_once(':')
        .ok_or_else(|| format!("expected kind:content, got '{raw}'"))?;
    let content = content.replace("\\n", "\n");
    if content.trim().is_empty() {
        return Err("segment content must not be empty".into());
    }
    Ok(NewSegment {
        content,
        kind: SegmentKind::from_label(kind.trim()),
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let storage = Storage::new(&cli.database_url).await?;
    let engine = QueueOrderingEngine::new(&storage);

    match cli.command {
        Command::CreateSong {
            title,
            author,
            segments,
        } => {
            let song_id = storage
                .create_song(&title, author.as_deref(), &segments)
                .await?;
            println!("created song_id={} segments={}", song_id.0, segments.len());
        }
        Command::ListSongs => {
            for song in storage.list_songs().await? {
                println!(
                    "{}\t{}\t{} segments",
                    song.song_id.0,
                    song.title,
                    song.segments.len()
                );
            }
        }
        Command::CreateQueue { name, service_date } => {
            let queue_id = storage.create_queue(&name, service_date).await?;
            println!("created queue_id={}", queue_id.0);
        }
        Command::AddToQueue { queue_id, song_id } => {
            let record = engine.append(QueueId(queue_id), SongId(song_id)).await?;
            println!("added item_id={} order={}", record.item_id.0, record.order);
        }
        Command::MoveItem {
            queue_id,
            item_id,
            order,
        } => {
            engine
                .move_item(QueueId(queue_id), QueueItemId(item_id), order)
                .await?;
            print_queue(&storage, QueueId(queue_id)).await?;
        }
        Command::RemoveItem { queue_id, item_id } => {
            engine
                .remove(QueueId(queue_id), QueueItemId(item_id))
                .await?;
            print_queue(&storage, QueueId(queue_id)).await?;
        }
        Command::RepairQueue { queue_id } => {
            engine.repair(QueueId(queue_id)).await?;
            print_queue(&storage, QueueId(queue_id)).await?;
        }
        Command::ListQueue { queue_id } => {
            print_queue(&storage, QueueId(queue_id)).await?;
        }
    }

    Ok(())
}

async fn print_queue(storage: &Storage, queue_id: QueueId) -> Result<()> {
    let queue = storage
        .load_queue(queue_id)
        .await?
        .ok_or_else(|| anyhow!("queue {queue_id} not found"))?;
    println!("{} ({})", queue.name, queue.service_date);
    for entry in storage.list_queue_entries(queue_id).await? {
        println!(
            "{:>3}. {}\t(item_id={})",
            entry.record.order, entry.song_title, entry.record.item_id.0
        );
    }
    Ok(())
}
