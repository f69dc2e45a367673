#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use proctor::config::{DetectorConfig, SamplerConfig};
use proctor::media::{
    MediaConstraints, MediaStream, MediaTrack, ReadyState, TrackKind, VideoFrame,
};
use proctor::vision::{
    Category, FaceDetection, FaceDetections, FaceDetector, FaceDetectorOptions, FaceLandmarker,
    FaceLandmarkerOptions, ObjectDetection, ObjectDetections, ObjectDetector, ObjectDetectorOptions,
};
use proctor::{
    CameraStatus, DetectorProvider, MediaDevices, MemoryDocument, MemorySink, Platform,
    ProctoringConfig, ProctoringSession, RefreshSource, VisionBackend,
};
use tokio::sync::watch;

/// What the fake camera currently "sees".
#[derive(Default)]
pub struct Scene {
    faces: Mutex<usize>,
    objects: Mutex<Vec<String>>,
}

impl Scene {
    pub fn new(faces: usize, objects: &[&str]) -> Arc<Self> {
        let scene = Arc::new(Self::default());
        scene.set(faces, objects);
        scene
    }

    pub fn set(&self, faces: usize, objects: &[&str]) {
        *self.faces.lock().unwrap() = faces;
        *self.objects.lock().unwrap() = objects.iter().map(|s| s.to_string()).collect();
    }
}

struct SceneFaces(Arc<Scene>);

impl FaceDetector for SceneFaces {
    fn detect_for_video(&self, _: &VideoFrame, _: f64) -> anyhow::Result<FaceDetections> {
        let count = *self.0.faces.lock().unwrap();
        Ok(FaceDetections {
            detections: vec![FaceDetection::default(); count],
        })
    }
}

struct SceneObjects(Arc<Scene>);

impl ObjectDetector for SceneObjects {
    fn detect_for_video(&self, _: &VideoFrame, _: f64) -> anyhow::Result<ObjectDetections> {
        let detections = self
            .0
            .objects
            .lock()
            .unwrap()
            .iter()
            .map(|name| ObjectDetection {
                bounding_box: None,
                categories: vec![Category::new(name.clone(), 0.8)],
            })
            .collect();
        Ok(ObjectDetections { detections })
    }
}

pub struct SceneBackend {
    scene: Arc<Scene>,
    fail_loading: bool,
    fail_objects: bool,
}

impl VisionBackend for SceneBackend {
    fn resolve_runtime(&self, _: &str) -> anyhow::Result<()> {
        if self.fail_loading {
            anyhow::bail!("wasm bundle unreachable");
        }
        Ok(())
    }

    fn create_face_detector(
        &self,
        _: &FaceDetectorOptions,
    ) -> anyhow::Result<Arc<dyn FaceDetector>> {
        Ok(Arc::new(SceneFaces(self.scene.clone())))
    }

    fn create_object_detector(
        &self,
        _: &ObjectDetectorOptions,
    ) -> anyhow::Result<Arc<dyn ObjectDetector>> {
        if self.fail_objects {
            anyhow::bail!("efficientdet_lite0.tflite: 404 Not Found");
        }
        Ok(Arc::new(SceneObjects(self.scene.clone())))
    }

    fn create_face_landmarker(
        &self,
        _: &FaceLandmarkerOptions,
    ) -> anyhow::Result<Arc<dyn FaceLandmarker>> {
        anyhow::bail!("landmarker not configured")
    }
}

pub struct FakeTrack {
    live: AtomicBool,
}

impl FakeTrack {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            live: AtomicBool::new(true),
        })
    }
}

impl MediaTrack for FakeTrack {
    fn kind(&self) -> TrackKind {
        TrackKind::Video
    }

    fn label(&self) -> String {
        "integrated camera".into()
    }

    fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }

    fn stop(&self) {
        self.live.store(false, Ordering::SeqCst);
    }
}

/// Buffering level the fake camera reports, adjustable mid-session.
pub struct StreamControl {
    ready: Mutex<ReadyState>,
}

impl StreamControl {
    pub fn set_ready(&self, ready: ReadyState) {
        *self.ready.lock().unwrap() = ready;
    }
}

struct FakeStream {
    track: Arc<FakeTrack>,
    control: Arc<StreamControl>,
}

impl MediaStream for FakeStream {
    fn tracks(&self) -> Vec<Arc<dyn MediaTrack>> {
        vec![self.track.clone() as Arc<dyn MediaTrack>]
    }

    fn ready_state(&self) -> ReadyState {
        *self.control.ready.lock().unwrap()
    }

    fn current_frame(&self) -> Option<VideoFrame> {
        Some(VideoFrame::new(image::RgbaImage::new(4, 4)))
    }
}

pub struct FakeCamera {
    pub track: Arc<FakeTrack>,
    pub control: Arc<StreamControl>,
    pub deny: bool,
    pub prompt_delay: Duration,
}

impl MediaDevices for FakeCamera {
    fn get_user_media(&self, _: &MediaConstraints) -> anyhow::Result<Arc<dyn MediaStream>> {
        std::thread::sleep(self.prompt_delay);
        if self.deny {
            anyhow::bail!("NotAllowedError: Permission denied by user");
        }
        Ok(Arc::new(FakeStream {
            track: self.track.clone(),
            control: self.control.clone(),
        }))
    }
}

pub struct Harness {
    pub document: Arc<MemoryDocument>,
    pub scene: Arc<Scene>,
    pub track: Arc<FakeTrack>,
    pub stream: Arc<StreamControl>,
    pub sink: Arc<MemorySink>,
    pub session: ProctoringSession,
}

pub struct HarnessOptions {
    pub config: ProctoringConfig,
    pub deny_camera: bool,
    pub prompt_delay: Duration,
    pub fail_loading: bool,
    pub fail_objects: bool,
}

impl Default for HarnessOptions {
    fn default() -> Self {
        Self {
            config: ProctoringConfig {
                sampler: SamplerConfig {
                    refresh_interval_ms: 2,
                    ..SamplerConfig::default()
                },
                ..ProctoringConfig::strict()
            },
            deny_camera: false,
            prompt_delay: Duration::ZERO,
            fail_loading: false,
            fail_objects: false,
        }
    }
}

pub async fn start(scene: Arc<Scene>, options: HarnessOptions) -> Harness {
    let document = Arc::new(MemoryDocument::new());
    let sink = MemorySink::new();
    let track = FakeTrack::new();
    let backend = Arc::new(SceneBackend {
        scene: scene.clone(),
        fail_loading: options.fail_loading,
        fail_objects: options.fail_objects,
    });
    let stream = Arc::new(StreamControl {
        ready: Mutex::new(ReadyState::HaveEnoughData),
    });
    let refresh = RefreshSource::Interval(options.config.sampler.refresh_interval());

    let platform = Platform {
        document: document.clone(),
        media: Arc::new(FakeCamera {
            track: track.clone(),
            control: stream.clone(),
            deny: options.deny_camera,
            prompt_delay: options.prompt_delay,
        }),
        provider: Arc::new(DetectorProvider::new(
            backend,
            DetectorConfig::default(),
            sink.clone(),
        )),
        refresh,
        sink: sink.clone(),
    };

    let session = ProctoringSession::start(options.config, platform).await;
    Harness {
        document,
        scene,
        track,
        stream,
        sink,
        session,
    }
}

/// Waits for two fresh samples from each loop so the status reflects the
/// scene as it is now, not a detection that started before a change.
pub async fn settle(status: &mut watch::Receiver<CameraStatus>) -> CameraStatus {
    let (faces, objects) = {
        let current = status.borrow();
        (current.face_samples, current.object_samples)
    };
    let settled = tokio::time::timeout(
        Duration::from_secs(5),
        status.wait_for(|s| s.face_samples >= faces + 2 && s.object_samples >= objects + 2),
    )
    .await
    .expect("camera loops did not sample in time")
    .expect("camera status sender dropped")
    .clone();
    settled
}

pub async fn eventually(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}
