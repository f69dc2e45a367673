//! Media-capture boundary: what the host's camera stack has to provide.

mod video_source;

pub use video_source::{VideoSource, VideoSourceHandle};

use std::sync::Arc;

use chrono::{DateTime, Utc};
use image::RgbaImage;
use serde::{Deserialize, Serialize};

/// Buffered-data level of a video source, ordered from empty to fully buffered.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, Default,
)]
#[serde(rename_all = "camelCase")]
pub enum ReadyState {
    #[default]
    HaveNothing,
    HaveMetadata,
    /// Enough to decode the current frame.
    HaveCurrentData,
    HaveFutureData,
    HaveEnoughData,
}

/// One decoded camera frame.
#[derive(Debug, Clone)]
pub struct VideoFrame {
    pub image: Arc<RgbaImage>,
    pub captured_at: DateTime<Utc>,
}

impl VideoFrame {
    pub fn new(image: RgbaImage) -> Self {
        Self {
            image: Arc::new(image),
            captured_at: Utc::now(),
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    Video,
    Audio,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaConstraints {
    pub video: bool,
    pub audio: bool,
}

impl Default for MediaConstraints {
    fn default() -> Self {
        Self {
            video: true,
            audio: false,
        }
    }
}

pub trait MediaTrack: Send + Sync {
    fn kind(&self) -> TrackKind;
    fn label(&self) -> String;
    fn is_live(&self) -> bool;
    /// Releases the underlying device. Must be idempotent.
    fn stop(&self);
}

pub trait MediaStream: Send + Sync {
    fn tracks(&self) -> Vec<Arc<dyn MediaTrack>>;
    fn ready_state(&self) -> ReadyState;
    fn current_frame(&self) -> Option<VideoFrame>;
}

/// Permission-gated camera access. May block while the user decides; callers
/// run it off the async executor.
pub trait MediaDevices: Send + Sync {
    fn get_user_media(
        &self,
        constraints: &MediaConstraints,
    ) -> anyhow::Result<Arc<dyn MediaStream>>;
}
