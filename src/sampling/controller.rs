use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::SamplerConfig;
use crate::diagnostics::{DiagnosticEvent, SharedSink};
use crate::error::{ProctorError, Result};
use crate::media::{MediaConstraints, MediaDevices, MediaStream, VideoSource, VideoSourceHandle};
use crate::violations::{CameraStatus, ViolationAggregator};
use crate::vision::DetectorProvider;

use super::loop_worker::{sampling_loop, LoopContext};
use super::{RefreshSource, SamplerKind, SamplerState};

const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info, log_warn};

/// Camera monitor: acquires the stream, owns the [`VideoSource`] and runs one
/// sampling loop per detector against it.
pub struct CameraMonitor {
    disabled: bool,
    video: VideoSource,
    provider: Arc<DetectorProvider>,
    media: Arc<dyn MediaDevices>,
    aggregator: ViolationAggregator,
    config: SamplerConfig,
    refresh: RefreshSource,
    sink: SharedSink,
    face_state: Arc<watch::Sender<SamplerState>>,
    object_state: Arc<watch::Sender<SamplerState>>,
    handles: Vec<JoinHandle<()>>,
    cancel_token: CancellationToken,
}

#[allow(clippy::too_many_arguments)]
impl CameraMonitor {
    pub fn new(
        disabled: bool,
        provider: Arc<DetectorProvider>,
        media: Arc<dyn MediaDevices>,
        aggregator: ViolationAggregator,
        config: SamplerConfig,
        refresh: RefreshSource,
        sink: SharedSink,
        cancel_token: CancellationToken,
    ) -> Self {
        let (face_state, _) = watch::channel(SamplerState::Idle);
        let (object_state, _) = watch::channel(SamplerState::Idle);
        Self {
            disabled,
            video: VideoSource::new(),
            provider,
            media,
            aggregator,
            config,
            refresh,
            sink,
            face_state: Arc::new(face_state),
            object_state: Arc::new(object_state),
            handles: Vec::new(),
            cancel_token,
        }
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    pub fn video_source(&self) -> VideoSourceHandle {
        self.video.handle()
    }

    pub fn status(&self) -> watch::Receiver<CameraStatus> {
        self.aggregator.subscribe()
    }

    pub fn sampler_state(&self, kind: SamplerKind) -> watch::Receiver<SamplerState> {
        self.state_sender(kind).subscribe()
    }

    /// Requests the camera and starts sampling. A denied or failed request is
    /// returned as [`ProctorError::MediaAccess`] and leaves both loops `Idle`.
    pub async fn start(&mut self) -> Result<()> {
        if self.disabled {
            return Ok(());
        }
        if !self.handles.is_empty() {
            log_warn!("camera monitor already sampling");
            return Ok(());
        }

        // Kick off model loading while the permission prompt is up.
        self.provider.preload();

        let media = Arc::clone(&self.media);
        let mut request = tokio::task::spawn_blocking(move || {
            media.get_user_media(&MediaConstraints::default())
        });

        let granted = tokio::select! {
            _ = self.cancel_token.cancelled() => {
                log_info!("camera request abandoned by teardown");
                release_when_granted(request);
                return Ok(());
            }
            result = &mut request => result,
        };

        let stream = match granted {
            Ok(Ok(stream)) => stream,
            Ok(Err(err)) => return Err(self.access_denied(format!("{err:#}"))),
            Err(join_err) => {
                return Err(self.access_denied(format!("media request worker failed: {join_err}")))
            }
        };

        let tracks = self.video.attach(stream);
        log_info!("camera stream attached ({tracks} tracks)");
        self.sink.record(DiagnosticEvent::StreamAttached { tracks });

        let epoch = Instant::now();
        for kind in SamplerKind::ALL {
            let ctx = LoopContext {
                kind,
                video: self.video.handle(),
                provider: Arc::clone(&self.provider),
                aggregator: self.aggregator.clone(),
                config: self.config.clone(),
                refresh: self.refresh.clone(),
                sink: Arc::clone(&self.sink),
                state_tx: Arc::clone(self.state_sender(kind)),
                epoch,
            };
            self.handles
                .push(tokio::spawn(sampling_loop(ctx, self.cancel_token.child_token())));
        }
        Ok(())
    }

    /// Stops every loop, then releases the camera. Idempotent.
    pub async fn stop(&mut self) -> Result<()> {
        self.cancel_token.cancel();

        let mut join_error = None;
        for handle in self.handles.drain(..) {
            if let Err(err) = handle.await {
                log_error!("sampling loop failed to join: {err}");
                join_error = Some(ProctorError::Shutdown(err.to_string()));
            }
        }

        let stopped = self.video.release();
        if stopped > 0 {
            self.sink.record(DiagnosticEvent::TracksReleased { stopped });
        }

        match join_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn access_denied(&self, error: String) -> ProctorError {
        log_error!("Error accessing webcam: {error}");
        self.sink
            .record(DiagnosticEvent::MediaAccessDenied { error: error.clone() });
        ProctorError::MediaAccess(error)
    }

    fn state_sender(&self, kind: SamplerKind) -> &Arc<watch::Sender<SamplerState>> {
        match kind {
            SamplerKind::Face => &self.face_state,
            SamplerKind::Object => &self.object_state,
        }
    }
}

impl Drop for CameraMonitor {
    fn drop(&mut self) {
        // Loops observe the token and exit; the VideoSource drop stops tracks.
        self.cancel_token.cancel();
    }
}

/// A permission prompt cannot be withdrawn. If it is granted after teardown,
/// stop the tracks straight away so the device is not left open.
fn release_when_granted(request: JoinHandle<anyhow::Result<Arc<dyn MediaStream>>>) {
    tokio::spawn(async move {
        if let Ok(Ok(stream)) = request.await {
            for track in stream.tracks() {
                track.stop();
            }
            log_info!("late camera grant released");
        }
    });
}
