use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    domain::{QueueId, QueueItemId, SegmentId, SegmentKind, SongId, SurfaceId},
    error::ApiError,
};

/// Frame exchanged with a presentation surface.
///
/// The JSON shape is the interoperability contract across the window/process
/// boundary: `{"kind":"READY"}` travels from the surface to the controller and
/// `{"kind":"CONTENT_UPDATE","text":"..."}` travels the other way. Frames that
/// do not decode into this enum are ignored by receivers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DisplayMessage {
    Ready,
    ContentUpdate { text: String },
}

impl DisplayMessage {
    pub fn content(text: impl Into<String>) -> Self {
        Self::ContentUpdate { text: text.into() }
    }

    pub fn to_frame(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Decodes a text frame, returning `None` for anything outside the protocol.
    pub fn from_frame(frame: &str) -> Option<Self> {
        serde_json::from_str(frame).ok()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentPayload {
    pub segment_id: SegmentId,
    pub song_id: SongId,
    pub content: String,
    pub order: u32,
    pub kind: SegmentKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SongPayload {
    pub song_id: SongId,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    pub segments: Vec<SegmentPayload>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSegment {
    pub content: String,
    pub kind: SegmentKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSong {
    pub title: String,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub segments: Vec<NewSegment>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueSummary {
    pub queue_id: QueueId,
    pub name: String,
    pub service_date: NaiveDate,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewQueue {
    pub name: String,
    pub service_date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueItemPayload {
    pub item_id: QueueItemId,
    pub queue_id: QueueId,
    pub song_id: SongId,
    pub order: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub song_title: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddQueueItemRequest {
    pub song_id: SongId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MoveQueueItemRequest {
    pub order: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayStatus {
    pub open: bool,
    pub ready: bool,
}

/// Either literal text or a stored segment whose content should be shown.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayContentRequest {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub segment_id: Option<SegmentId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ServerEvent {
    DisplayStatusChanged {
        open: bool,
    },
    DisplayLaunchRequested {
        surface_id: SurfaceId,
        url: String,
        width: u32,
        height: u32,
    },
    DisplayContentChanged {
        text: String,
    },
    QueueUpdated {
        queue_id: QueueId,
        items: Vec<QueueItemPayload>,
    },
    QueueResyncRequired {
        queue_id: QueueId,
    },
    SongsUpdated,
    Error(ApiError),
}
