use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::SamplerConfig;
use crate::diagnostics::{DiagnosticEvent, SharedSink};
use crate::media::{VideoFrame, VideoSourceHandle};
use crate::violations::{FrameUpdate, ViolationAggregator};
use crate::vision::{DetectorProvider, FaceDetector, ObjectDetector};

use super::{RefreshSource, SamplerKind, SamplerState};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

/// Everything one sampling loop reads. Owned by the loop; nothing here is
/// shared mutably with the other loop.
pub struct LoopContext {
    pub kind: SamplerKind,
    pub video: VideoSourceHandle,
    pub provider: Arc<DetectorProvider>,
    pub aggregator: ViolationAggregator,
    pub config: SamplerConfig,
    pub refresh: RefreshSource,
    pub sink: SharedSink,
    pub state_tx: Arc<watch::Sender<SamplerState>>,
    /// Shared origin for detector timestamps.
    pub epoch: Instant,
}

/// Result of one refresh tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    Sampled(FrameUpdate),
    /// Source below the configured ready state.
    WarmingUp,
    /// Detector for this loop not loaded (yet).
    DetectorNotReady,
    NoFrame,
    /// A previous detection for this loop is still running.
    Busy,
    TimedOut,
    Failed,
}

enum Detector {
    Face(Arc<dyn FaceDetector>),
    Object(Arc<dyn ObjectDetector>),
}

impl Detector {
    fn for_kind(kind: SamplerKind, provider: &DetectorProvider) -> Option<Self> {
        match kind {
            SamplerKind::Face => provider.face_detector().map(Detector::Face),
            SamplerKind::Object => provider.object_detector().map(Detector::Object),
        }
    }

    fn detect(&self, frame: &VideoFrame, timestamp_ms: f64) -> anyhow::Result<FrameUpdate> {
        match self {
            Detector::Face(detector) => detector
                .detect_for_video(frame, timestamp_ms)
                .map(|result| FrameUpdate::from(&result)),
            Detector::Object(detector) => detector
                .detect_for_video(frame, timestamp_ms)
                .map(|result| FrameUpdate::from(&result)),
        }
    }
}

/// Per-loop mutable state, kept out of the context so the tick function
/// borrows it explicitly.
#[derive(Default)]
pub struct LoopState {
    last_timestamp_ms: f64,
    /// Detection still running on the blocking pool after a timeout.
    outstanding: Option<JoinHandle<anyhow::Result<FrameUpdate>>>,
    /// Ticks missed since the last sample.
    missed: u32,
    pub frames: u64,
    pub skipped: u64,
}

impl LoopState {
    /// True exactly once per outage: on the tick where the run of missed
    /// ticks reaches `max_missed`.
    fn just_went_stale(&self, max_missed: u32) -> bool {
        self.missed == max_missed.max(1)
    }
}

pub async fn sampling_loop(ctx: LoopContext, cancel_token: CancellationToken) {
    let kind = ctx.kind;
    set_state(&ctx, SamplerState::Sampling);
    log_info!("{} sampling loop started", kind.as_str());

    let mut ticker = ctx.refresh.ticker();
    let mut state = LoopState::default();

    loop {
        tokio::select! {
            biased;
            _ = cancel_token.cancelled() => {
                log_info!(
                    "{} sampling loop shutting down ({} frames, {} skipped ticks)",
                    kind.as_str(), state.frames, state.skipped
                );
                break;
            }
            alive = ticker.tick() => {
                if !alive {
                    log_warn!("{} sampling loop lost its refresh source", kind.as_str());
                    break;
                }
                match sample_tick(&ctx, &mut state).await {
                    TickOutcome::Sampled(update) => {
                        if cancel_token.is_cancelled() {
                            break;
                        }
                        ctx.aggregator.publish(update);
                    }
                    outcome => {
                        log_debug!("{} tick skipped: {outcome:?}", kind.as_str());
                        if state.just_went_stale(ctx.config.max_missed_ticks) {
                            log_warn!(
                                "{} samples went stale after {} missed ticks ({outcome:?})",
                                kind.as_str(), state.missed
                            );
                            ctx.aggregator.publish(lost_update(kind));
                        }
                    }
                }
            }
        }
    }

    if let Some(outstanding) = state.outstanding.take() {
        outstanding.abort();
    }
    set_state(&ctx, SamplerState::Stopped);
}

/// One refresh tick: sample if the source and detector are ready, otherwise
/// report why the tick was skipped. Never overlaps a previous detection.
pub async fn sample_tick(ctx: &LoopContext, state: &mut LoopState) -> TickOutcome {
    let outcome = try_sample(ctx, state).await;
    match &outcome {
        TickOutcome::Sampled(_) => {
            state.frames += 1;
            state.missed = 0;
        }
        _ => {
            state.skipped += 1;
            state.missed = state.missed.saturating_add(1);
        }
    }
    outcome
}

fn lost_update(kind: SamplerKind) -> FrameUpdate {
    match kind {
        SamplerKind::Face => FrameUpdate::FacesLost,
        SamplerKind::Object => FrameUpdate::ObjectsLost,
    }
}

async fn try_sample(ctx: &LoopContext, state: &mut LoopState) -> TickOutcome {
    if state
        .outstanding
        .as_ref()
        .is_some_and(|job| !job.is_finished())
    {
        return TickOutcome::Busy;
    }
    state.outstanding = None;

    if ctx.video.ready_state() < ctx.config.min_ready_state {
        return TickOutcome::WarmingUp;
    }

    let Some(detector) = Detector::for_kind(ctx.kind, &ctx.provider) else {
        return TickOutcome::DetectorNotReady;
    };

    let Some(frame) = ctx.video.current_frame() else {
        return TickOutcome::NoFrame;
    };

    let timestamp_ms = next_timestamp(ctx.epoch, &mut state.last_timestamp_ms);
    let mut job = tokio::task::spawn_blocking(move || detector.detect(&frame, timestamp_ms));

    let result = tokio::time::timeout(ctx.config.detection_timeout(), &mut job).await;
    match result {
        Ok(Ok(Ok(update))) => TickOutcome::Sampled(update),
        Ok(Ok(Err(err))) => {
            report_failure(ctx, format!("{err:#}"));
            TickOutcome::Failed
        }
        Ok(Err(join_err)) => {
            report_failure(ctx, format!("detection worker join failed: {join_err}"));
            TickOutcome::Failed
        }
        Err(_) => {
            log_warn!(
                "{} detection timeout (> {}ms)",
                ctx.kind.as_str(),
                ctx.config.detection_timeout_ms
            );
            state.outstanding = Some(job);
            TickOutcome::TimedOut
        }
    }
}

/// Milliseconds since `epoch`, strictly increasing per loop.
fn next_timestamp(epoch: Instant, last: &mut f64) -> f64 {
    let now = epoch.elapsed().as_secs_f64() * 1000.0;
    let timestamp = if now > *last { now } else { *last + 0.001 };
    *last = timestamp;
    timestamp
}

fn report_failure(ctx: &LoopContext, error: String) {
    log_warn!("{} detection failed: {error}", ctx.kind.as_str());
    ctx.sink.record(DiagnosticEvent::DetectionFailed {
        sampler: ctx.kind,
        error,
    });
}

fn set_state(ctx: &LoopContext, state: SamplerState) {
    let changed = ctx.state_tx.send_if_modified(|current| {
        if *current == state {
            false
        } else {
            *current = state;
            true
        }
    });
    if changed {
        ctx.sink.record(DiagnosticEvent::SamplerStateChanged {
            sampler: ctx.kind,
            state,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DetectorConfig;
    use crate::diagnostics::MemorySink;
    use crate::media::{MediaStream, MediaTrack, ReadyState, VideoSource};
    use crate::violations::ALLOWED_CATEGORY;
    use crate::vision::{
        Category, FaceDetection, FaceDetections, FaceDetectorOptions, FaceLandmarker,
        FaceLandmarkerOptions, ObjectDetection, ObjectDetections, ObjectDetectorOptions,
        VisionBackend,
    };
    use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
    use std::time::Duration;

    struct Faces(usize);
    impl FaceDetector for Faces {
        fn detect_for_video(&self, _: &VideoFrame, _: f64) -> anyhow::Result<FaceDetections> {
            Ok(FaceDetections {
                detections: vec![FaceDetection::default(); self.0],
            })
        }
    }

    struct SlowObjects {
        calls: Arc<AtomicUsize>,
        delay: Duration,
    }
    impl ObjectDetector for SlowObjects {
        fn detect_for_video(&self, _: &VideoFrame, _: f64) -> anyhow::Result<ObjectDetections> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(self.delay);
            Ok(ObjectDetections {
                detections: vec![ObjectDetection {
                    bounding_box: None,
                    categories: vec![Category::new("cell phone", 0.7)],
                }],
            })
        }
    }

    struct Backend {
        object_calls: Arc<AtomicUsize>,
        object_delay: Duration,
    }
    impl VisionBackend for Backend {
        fn resolve_runtime(&self, _: &str) -> anyhow::Result<()> {
            Ok(())
        }
        fn create_face_detector(
            &self,
            _: &FaceDetectorOptions,
        ) -> anyhow::Result<Arc<dyn FaceDetector>> {
            Ok(Arc::new(Faces(1)))
        }
        fn create_object_detector(
            &self,
            _: &ObjectDetectorOptions,
        ) -> anyhow::Result<Arc<dyn ObjectDetector>> {
            Ok(Arc::new(SlowObjects {
                calls: self.object_calls.clone(),
                delay: self.object_delay,
            }))
        }
        fn create_face_landmarker(
            &self,
            _: &FaceLandmarkerOptions,
        ) -> anyhow::Result<Arc<dyn FaceLandmarker>> {
            anyhow::bail!("not used")
        }
    }

    struct Stream {
        ready: AtomicU8,
    }
    impl MediaStream for Stream {
        fn tracks(&self) -> Vec<Arc<dyn MediaTrack>> {
            Vec::new()
        }
        fn ready_state(&self) -> ReadyState {
            match self.ready.load(Ordering::SeqCst) {
                0 => ReadyState::HaveNothing,
                1 => ReadyState::HaveMetadata,
                _ => ReadyState::HaveEnoughData,
            }
        }
        fn current_frame(&self) -> Option<VideoFrame> {
            Some(VideoFrame::new(image::RgbaImage::new(2, 2)))
        }
    }

    struct Fixture {
        source: VideoSource,
        stream: Arc<Stream>,
        provider: Arc<DetectorProvider>,
        object_calls: Arc<AtomicUsize>,
        sink: Arc<MemorySink>,
    }

    fn fixture(object_delay: Duration) -> Fixture {
        let object_calls = Arc::new(AtomicUsize::new(0));
        let sink = MemorySink::new();
        let provider = Arc::new(DetectorProvider::new(
            Arc::new(Backend {
                object_calls: object_calls.clone(),
                object_delay,
            }),
            DetectorConfig::default(),
            sink.clone(),
        ));
        let stream = Arc::new(Stream {
            ready: AtomicU8::new(2),
        });
        let source = VideoSource::new();
        source.attach(stream.clone());
        Fixture {
            source,
            stream,
            provider,
            object_calls,
            sink,
        }
    }

    fn context(fx: &Fixture, kind: SamplerKind, timeout_ms: u64) -> LoopContext {
        let (state_tx, _) = watch::channel(SamplerState::Idle);
        LoopContext {
            kind,
            video: fx.source.handle(),
            provider: fx.provider.clone(),
            aggregator: ViolationAggregator::new(ALLOWED_CATEGORY),
            config: SamplerConfig {
                detection_timeout_ms: timeout_ms,
                ..SamplerConfig::default()
            },
            refresh: RefreshSource::Interval(Duration::from_millis(1)),
            sink: fx.sink.clone(),
            state_tx: Arc::new(state_tx),
            epoch: Instant::now(),
        }
    }

    #[tokio::test]
    async fn skips_until_detector_ready() {
        let fx = fixture(Duration::ZERO);
        let ctx = context(&fx, SamplerKind::Face, 1_000);
        let mut state = LoopState::default();

        assert_eq!(sample_tick(&ctx, &mut state).await, TickOutcome::DetectorNotReady);

        fx.provider.ensure_ready().await.unwrap();
        assert_eq!(
            sample_tick(&ctx, &mut state).await,
            TickOutcome::Sampled(FrameUpdate::Faces(1))
        );
        assert_eq!((state.frames, state.skipped), (1, 1));
    }

    #[tokio::test]
    async fn skips_while_source_warms_up() {
        let fx = fixture(Duration::ZERO);
        fx.provider.ensure_ready().await.unwrap();
        let ctx = context(&fx, SamplerKind::Object, 1_000);
        let mut state = LoopState::default();

        fx.stream.ready.store(1, Ordering::SeqCst);
        assert_eq!(sample_tick(&ctx, &mut state).await, TickOutcome::WarmingUp);
        assert_eq!(fx.object_calls.load(Ordering::SeqCst), 0);

        fx.stream.ready.store(2, Ordering::SeqCst);
        assert_eq!(
            sample_tick(&ctx, &mut state).await,
            TickOutcome::Sampled(FrameUpdate::Objects(vec!["cell phone".into()]))
        );
    }

    #[tokio::test]
    async fn timed_out_detection_is_never_overlapped() {
        let fx = fixture(Duration::from_millis(150));
        fx.provider.ensure_ready().await.unwrap();
        let ctx = context(&fx, SamplerKind::Object, 10);
        let mut state = LoopState::default();

        assert_eq!(sample_tick(&ctx, &mut state).await, TickOutcome::TimedOut);
        assert_eq!(sample_tick(&ctx, &mut state).await, TickOutcome::Busy);
        assert_eq!(fx.object_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn missed_run_goes_stale_once() {
        let fx = fixture(Duration::ZERO);
        fx.provider.ensure_ready().await.unwrap();
        let ctx = context(&fx, SamplerKind::Face, 1_000);
        let mut state = LoopState::default();

        sample_tick(&ctx, &mut state).await;
        fx.stream.ready.store(0, Ordering::SeqCst);
        let mut stale = Vec::new();
        for _ in 0..4 {
            assert_eq!(sample_tick(&ctx, &mut state).await, TickOutcome::WarmingUp);
            stale.push(state.just_went_stale(2));
        }
        assert_eq!(stale, vec![false, true, false, false]);

        fx.stream.ready.store(2, Ordering::SeqCst);
        sample_tick(&ctx, &mut state).await;
        assert_eq!(state.missed, 0);
    }

    #[tokio::test]
    async fn stalled_source_clears_published_half() {
        let fx = fixture(Duration::ZERO);
        fx.provider.ensure_ready().await.unwrap();
        let ctx = context(&fx, SamplerKind::Face, 1_000);
        let mut status = ctx.aggregator.subscribe();

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(sampling_loop(ctx, cancel.clone()));
        tokio::time::timeout(Duration::from_secs(2), status.wait_for(|s| s.face_current))
            .await
            .unwrap()
            .unwrap();

        fx.stream.ready.store(0, Ordering::SeqCst);
        let stale = tokio::time::timeout(
            Duration::from_secs(2),
            status.wait_for(|s| !s.face_current),
        )
        .await
        .unwrap()
        .unwrap()
        .clone();
        assert_eq!(stale.violation_status.faces_detected, 0);

        cancel.cancel();
        handle.await.unwrap();
    }

    #[test]
    fn timestamps_strictly_increase() {
        let epoch = Instant::now();
        let mut last = 0.0;
        let a = next_timestamp(epoch, &mut last);
        let b = next_timestamp(epoch, &mut last);
        assert!(b > a);
    }

    #[tokio::test]
    async fn loop_publishes_and_stops_on_cancel() {
        let fx = fixture(Duration::ZERO);
        fx.provider.ensure_ready().await.unwrap();
        let ctx = context(&fx, SamplerKind::Face, 1_000);
        let aggregator = ctx.aggregator.clone();
        let mut states = ctx.state_tx.subscribe();
        let mut status = aggregator.subscribe();

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(sampling_loop(ctx, cancel.clone()));

        tokio::time::timeout(Duration::from_secs(2), status.wait_for(|s| s.face_samples > 0))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(*states.borrow_and_update(), SamplerState::Sampling);

        cancel.cancel();
        handle.await.unwrap();
        assert_eq!(*states.borrow(), SamplerState::Stopped);
        assert!(fx.sink.contains(|e| matches!(
            e,
            DiagnosticEvent::SamplerStateChanged { state: SamplerState::Stopped, .. }
        )));
    }
}
