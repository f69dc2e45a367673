use std::sync::Arc;

use tokio::sync::watch;

use super::state::{CameraStatus, FrameUpdate};

/// Owns the published [`CameraStatus`]. The sampling loops write through
/// [`publish`](Self::publish); everyone else only subscribes.
#[derive(Clone)]
pub struct ViolationAggregator {
    tx: Arc<watch::Sender<CameraStatus>>,
    allowed_category: Arc<str>,
}

impl ViolationAggregator {
    pub fn new(allowed_category: &str) -> Self {
        let (tx, _rx) = watch::channel(CameraStatus::default());
        Self {
            tx: Arc::new(tx),
            allowed_category: Arc::from(allowed_category),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<CameraStatus> {
        self.tx.subscribe()
    }

    pub fn current(&self) -> CameraStatus {
        self.tx.borrow().clone()
    }

    pub fn publish(&self, update: FrameUpdate) {
        let allowed = &self.allowed_category;
        self.tx.send_if_modified(|status| {
            let before = status.clone();
            status.apply(update, allowed);
            *status != before
        });
    }

    /// Back to the zero snapshot, e.g. when the stream is gone.
    pub fn reset(&self) {
        self.tx.send_replace(CameraStatus::default());
    }
}
