pub mod controller;
pub mod loop_worker;
pub mod ticker;

pub use controller::CameraMonitor;
pub use ticker::{RefreshSource, RefreshTicker};

use serde::{Deserialize, Serialize};

/// Which detector a sampling loop drives.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SamplerKind {
    Face,
    Object,
}

impl SamplerKind {
    pub const ALL: [SamplerKind; 2] = [SamplerKind::Face, SamplerKind::Object];

    pub fn as_str(self) -> &'static str {
        match self {
            SamplerKind::Face => "face",
            SamplerKind::Object => "object",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SamplerState {
    /// No stream attached yet (or access was denied).
    #[default]
    Idle,
    Sampling,
    /// Torn down; never restarts.
    Stopped,
}
