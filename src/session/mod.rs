//! One proctoring session: every monitor wired to the same document, camera
//! and detector provider, plus the read-only views the exam UI consumes.

mod controller;

pub use controller::{Platform, ProctoringSession};

use tokio::sync::watch;

use crate::environment::{FullScreenStatus, FullscreenTrigger};
use crate::error::Result;
use crate::media::VideoSourceHandle;
use crate::violations::{CameraStatus, ViolationStatus};

/// `fullScreen` as seen by the exam UI.
#[derive(Clone)]
pub struct FullScreenView {
    status: watch::Receiver<FullScreenStatus>,
    trigger: FullscreenTrigger,
}

impl FullScreenView {
    pub fn status(&self) -> FullScreenStatus {
        *self.status.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<FullScreenStatus> {
        self.status.clone()
    }

    /// Must be called from a user gesture in browser hosts.
    pub fn trigger(&self) -> Result<()> {
        self.trigger.trigger()
    }
}

#[derive(Clone)]
pub struct TabFocusView {
    status: watch::Receiver<bool>,
}

impl TabFocusView {
    pub fn status(&self) -> bool {
        *self.status.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.status.clone()
    }
}

#[derive(Clone)]
pub struct CamDetectionView {
    status: watch::Receiver<CameraStatus>,
    video_source: VideoSourceHandle,
}

impl CamDetectionView {
    pub fn violation_status(&self) -> ViolationStatus {
        self.status.borrow().violation_status.clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<CameraStatus> {
        self.status.clone()
    }

    /// Read-only handle for rendering the preview.
    pub fn video_source(&self) -> &VideoSourceHandle {
        &self.video_source
    }
}
