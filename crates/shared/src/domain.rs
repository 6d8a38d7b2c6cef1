use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_newtype!(SongId);
id_newtype!(SegmentId);
id_newtype!(QueueId);
id_newtype!(QueueItemId);

/// Identifies one presentation surface for the lifetime of its connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SurfaceId(pub Uuid);

impl SurfaceId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SurfaceId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SurfaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentKind {
    Verse,
    Chorus,
    PreChorus,
    Bridge,
    Intro,
    Outro,
    Tag,
}

impl SegmentKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SegmentKind::Verse => "verse",
            SegmentKind::Chorus => "chorus",
            SegmentKind::PreChorus => "pre_chorus",
            SegmentKind::Bridge => "bridge",
            SegmentKind::Intro => "intro",
            SegmentKind::Outro => "outro",
            SegmentKind::Tag => "tag",
        }
    }

    /// Unknown labels fall back to `Verse`, matching how segments were typed
    /// before the kind list existed.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().replace(['-', ' '], "_").as_str() {
            "chorus" => SegmentKind::Chorus,
            "pre_chorus" | "prechorus" => SegmentKind::PreChorus,
            "bridge" => SegmentKind::Bridge,
            "intro" => SegmentKind::Intro,
            "outro" | "ending" => SegmentKind::Outro,
            "tag" => SegmentKind::Tag,
            _ => SegmentKind::Verse,
        }
    }
}

impl fmt::Display for SegmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Width and height requested for a newly launched presentation surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurfaceDimensions {
    pub width: u32,
    pub height: u32,
}

impl Default for SurfaceDimensions {
    fn default() -> Self {
        Self {
            width: 800,
            height: 600,
        }
    }
}
