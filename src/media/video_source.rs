use std::sync::{Arc, RwLock};

use super::{MediaStream, ReadyState, VideoFrame};

const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

#[derive(Default)]
struct Inner {
    stream: RwLock<Option<Arc<dyn MediaStream>>>,
}

impl Inner {
    fn stream(&self) -> Option<Arc<dyn MediaStream>> {
        match self.stream.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn take_stream(&self) -> Option<Arc<dyn MediaStream>> {
        match self.stream.write() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        }
    }
}

/// Owner of the live camera stream. Not `Clone`: whoever created it is the
/// only one that can release the device. Dropping it stops every track.
pub struct VideoSource {
    inner: Arc<Inner>,
}

impl VideoSource {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner::default()),
        }
    }

    /// Read-only view for the sampling loops and the presentation layer.
    pub fn handle(&self) -> VideoSourceHandle {
        VideoSourceHandle {
            inner: Arc::clone(&self.inner),
        }
    }

    /// Attaches a freshly granted stream, releasing any previous one first.
    pub fn attach(&self, stream: Arc<dyn MediaStream>) -> usize {
        let previous = match self.inner.stream.write() {
            Ok(mut guard) => guard.replace(Arc::clone(&stream)),
            Err(poisoned) => poisoned.into_inner().replace(Arc::clone(&stream)),
        };
        if let Some(previous) = previous {
            log_warn!("replacing attached camera stream; stopping previous tracks");
            stop_tracks(previous.as_ref());
        }
        stream.tracks().len()
    }

    /// Stops every track and detaches the stream. Returns how many tracks were
    /// still live. Safe to call repeatedly.
    pub fn release(&self) -> usize {
        match self.inner.take_stream() {
            Some(stream) => {
                let stopped = stop_tracks(stream.as_ref());
                log_info!("camera released ({stopped} live tracks stopped)");
                stopped
            }
            None => 0,
        }
    }
}

impl Default for VideoSource {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for VideoSource {
    fn drop(&mut self) {
        self.release();
    }
}

fn stop_tracks(stream: &dyn MediaStream) -> usize {
    let mut stopped = 0;
    for track in stream.tracks() {
        if track.is_live() {
            stopped += 1;
        }
        track.stop();
    }
    stopped
}

/// Cheap, cloneable, read-only access to a [`VideoSource`].
#[derive(Clone)]
pub struct VideoSourceHandle {
    inner: Arc<Inner>,
}

impl VideoSourceHandle {
    pub fn is_attached(&self) -> bool {
        self.inner.stream().is_some()
    }

    pub fn ready_state(&self) -> ReadyState {
        self.inner
            .stream()
            .map(|stream| stream.ready_state())
            .unwrap_or(ReadyState::HaveNothing)
    }

    pub fn current_frame(&self) -> Option<VideoFrame> {
        self.inner.stream().and_then(|stream| stream.current_frame())
    }
}

impl std::fmt::Debug for VideoSourceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VideoSourceHandle")
            .field("attached", &self.is_attached())
            .field("ready_state", &self.ready_state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::{MediaTrack, TrackKind};
    use std::sync::atomic::{AtomicBool, Ordering};

    struct Track {
        live: AtomicBool,
    }

    impl MediaTrack for Track {
        fn kind(&self) -> TrackKind {
            TrackKind::Video
        }
        fn label(&self) -> String {
            "test camera".into()
        }
        fn is_live(&self) -> bool {
            self.live.load(Ordering::SeqCst)
        }
        fn stop(&self) {
            self.live.store(false, Ordering::SeqCst);
        }
    }

    struct Stream {
        track: Arc<Track>,
    }

    impl MediaStream for Stream {
        fn tracks(&self) -> Vec<Arc<dyn MediaTrack>> {
            vec![self.track.clone() as Arc<dyn MediaTrack>]
        }
        fn ready_state(&self) -> ReadyState {
            ReadyState::HaveEnoughData
        }
        fn current_frame(&self) -> Option<VideoFrame> {
            Some(VideoFrame::new(image::RgbaImage::new(4, 4)))
        }
    }

    fn live_stream() -> (Arc<Track>, Arc<dyn MediaStream>) {
        let track = Arc::new(Track {
            live: AtomicBool::new(true),
        });
        let stream: Arc<dyn MediaStream> = Arc::new(Stream {
            track: track.clone(),
        });
        (track, stream)
    }

    #[test]
    fn detached_source_has_nothing() {
        let source = VideoSource::new();
        let handle = source.handle();
        assert!(!handle.is_attached());
        assert_eq!(handle.ready_state(), ReadyState::HaveNothing);
        assert!(handle.current_frame().is_none());
    }

    #[test]
    fn release_stops_tracks_once() {
        let (track, stream) = live_stream();
        let source = VideoSource::new();
        assert_eq!(source.attach(stream), 1);
        assert!(source.handle().is_attached());

        assert_eq!(source.release(), 1);
        assert!(!track.is_live());
        assert_eq!(source.release(), 0);
        assert!(!source.handle().is_attached());
    }

    #[test]
    fn drop_releases_camera() {
        let (track, stream) = live_stream();
        let handle = {
            let source = VideoSource::new();
            source.attach(stream);
            source.handle()
        };
        assert!(!track.is_live());
        assert!(!handle.is_attached());
    }

    #[test]
    fn reattach_stops_previous_stream() {
        let (first_track, first) = live_stream();
        let (second_track, second) = live_stream();
        let source = VideoSource::new();
        source.attach(first);
        source.attach(second);
        assert!(!first_track.is_live());
        assert!(second_track.is_live());
    }
}
