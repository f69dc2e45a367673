use std::sync::{Arc, OnceLock};

use tokio::sync::Mutex;

use crate::config::DetectorConfig;
use crate::diagnostics::{DiagnosticEvent, SharedSink};
use crate::error::{ProctorError, Result};

use super::{
    CapabilityKind, FaceDetector, FaceDetectorOptions, FaceLandmarker, FaceLandmarkerOptions,
    ObjectDetector, ObjectDetectorOptions, RunningMode, VisionBackend,
};

const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info, log_warn};

static GLOBAL: OnceLock<Arc<DetectorProvider>> = OnceLock::new();

#[derive(Default)]
struct LoadState {
    attempts: u32,
    last_error: Option<String>,
}

/// Lazily loaded vision capabilities, shared read-only by every consumer.
///
/// Sub-capabilities become available one by one as they load. A missing one
/// means "not ready yet", never an error. Loads are serialized behind an async
/// mutex, so concurrent first callers wait on the same load instead of
/// starting their own.
pub struct DetectorProvider {
    backend: Arc<dyn VisionBackend>,
    config: DetectorConfig,
    sink: SharedSink,
    runtime: OnceLock<()>,
    face: OnceLock<Arc<dyn FaceDetector>>,
    objects: OnceLock<Arc<dyn ObjectDetector>>,
    landmarks: OnceLock<Arc<dyn FaceLandmarker>>,
    load: Mutex<LoadState>,
}

impl DetectorProvider {
    pub fn new(backend: Arc<dyn VisionBackend>, config: DetectorConfig, sink: SharedSink) -> Self {
        Self {
            backend,
            config,
            sink,
            runtime: OnceLock::new(),
            face: OnceLock::new(),
            objects: OnceLock::new(),
            landmarks: OnceLock::new(),
            load: Mutex::new(LoadState::default()),
        }
    }

    /// Process-wide instance. The first call installs it (later arguments are
    /// ignored) and, inside a tokio runtime, starts loading in the background.
    /// Pass [`log_sink`](crate::diagnostics::log_sink) to only log.
    pub fn global(
        backend: Arc<dyn VisionBackend>,
        config: DetectorConfig,
        sink: SharedSink,
    ) -> Arc<Self> {
        let mut created = false;
        let provider = GLOBAL
            .get_or_init(|| {
                created = true;
                Arc::new(Self::new(backend, config, sink))
            })
            .clone();

        if created {
            provider.preload();
        }
        provider
    }

    /// The process-wide instance if one was installed.
    pub fn instance() -> Option<Arc<Self>> {
        GLOBAL.get().cloned()
    }

    /// Starts loading on the current runtime without waiting for it.
    pub fn preload(self: &Arc<Self>) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            log_warn!("no async runtime; detector load deferred to first ensure_ready");
            return;
        };
        let provider = Arc::clone(self);
        handle.spawn(async move {
            // Failures are already reported through the sink.
            let _ = provider.ensure_ready().await;
        });
    }

    pub fn face_detector(&self) -> Option<Arc<dyn FaceDetector>> {
        self.face.get().cloned()
    }

    pub fn object_detector(&self) -> Option<Arc<dyn ObjectDetector>> {
        self.objects.get().cloned()
    }

    pub fn face_landmarker(&self) -> Option<Arc<dyn FaceLandmarker>> {
        self.landmarks.get().cloned()
    }

    pub fn is_ready(&self) -> bool {
        self.face.get().is_some()
            && self.objects.get().is_some()
            && (self.config.landmark_model.is_none() || self.landmarks.get().is_some())
    }

    pub async fn attempts(&self) -> u32 {
        self.load.lock().await.attempts
    }

    pub async fn last_error(&self) -> Option<String> {
        self.load.lock().await.last_error.clone()
    }

    /// Waits until every configured capability is loaded.
    ///
    /// After a failed load (retry budget spent) this returns the recorded
    /// error without touching the backend again; call [`retry`](Self::retry)
    /// to restart.
    pub async fn ensure_ready(&self) -> Result<()> {
        if self.is_ready() {
            return Ok(());
        }

        let mut state = self.load.lock().await;
        if self.is_ready() {
            return Ok(());
        }
        if let Some(err) = &state.last_error {
            return Err(ProctorError::Initialization(err.clone()));
        }

        let budget = self.config.retry.max_attempts.saturating_add(1);
        let mut tries = 0;
        loop {
            state.attempts += 1;
            tries += 1;
            let attempt = state.attempts;
            self.sink
                .record(DiagnosticEvent::DetectorLoadStarted { attempt });
            log_info!("loading vision capabilities (attempt {attempt})");

            match self.load_missing().await {
                Ok(()) => {
                    state.last_error = None;
                    log_info!("vision capabilities ready");
                    return Ok(());
                }
                Err(err) => {
                    let message = format!("{err:#}");
                    log_error!("vision load attempt {attempt} failed: {message}");
                    self.sink.record(DiagnosticEvent::DetectorLoadFailed {
                        attempt,
                        error: message.clone(),
                    });
                    if tries >= budget {
                        state.last_error = Some(message.clone());
                        return Err(ProctorError::Initialization(message));
                    }
                    tokio::time::sleep(self.config.retry.backoff()).await;
                }
            }
        }
    }

    /// Manual restart after a failed load.
    pub async fn retry(&self) -> Result<()> {
        self.load.lock().await.last_error = None;
        self.ensure_ready().await
    }

    /// Runtime, face detector, object detector, then the optional landmarker.
    /// Anything already loaded by an earlier attempt is kept.
    async fn load_missing(&self) -> anyhow::Result<()> {
        if self.runtime.get().is_none() {
            let wasm_root = self.config.wasm_root.clone();
            self.blocking(move |backend| backend.resolve_runtime(&wasm_root))
                .await?;
            let _ = self.runtime.set(());
            self.ready(CapabilityKind::Runtime);
        }

        if self.face.get().is_none() {
            let options = FaceDetectorOptions {
                model: self.config.face_model.clone(),
                running_mode: RunningMode::Video,
            };
            let detector = self
                .blocking(move |backend| backend.create_face_detector(&options))
                .await?;
            let _ = self.face.set(detector);
            self.ready(CapabilityKind::FaceDetector);
        }

        if self.objects.get().is_none() {
            let options = ObjectDetectorOptions {
                model: self.config.object_model.clone(),
                running_mode: RunningMode::Video,
                score_threshold: self.config.object_score_threshold,
            };
            let detector = self
                .blocking(move |backend| backend.create_object_detector(&options))
                .await?;
            let _ = self.objects.set(detector);
            self.ready(CapabilityKind::ObjectDetector);
        }

        if let Some(model) = &self.config.landmark_model {
            if self.landmarks.get().is_none() {
                let options = FaceLandmarkerOptions {
                    model: model.clone(),
                    running_mode: RunningMode::Video,
                    num_faces: self.config.max_faces,
                };
                let landmarker = self
                    .blocking(move |backend| backend.create_face_landmarker(&options))
                    .await?;
                let _ = self.landmarks.set(landmarker);
                self.ready(CapabilityKind::FaceLandmarker);
            }
        }

        Ok(())
    }

    async fn blocking<T, F>(&self, f: F) -> anyhow::Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&dyn VisionBackend) -> anyhow::Result<T> + Send + 'static,
    {
        let backend = Arc::clone(&self.backend);
        tokio::task::spawn_blocking(move || f(backend.as_ref()))
            .await
            .map_err(|err| anyhow::anyhow!("vision loader worker join failed: {err}"))?
    }

    fn ready(&self, capability: CapabilityKind) {
        self.sink
            .record(DiagnosticEvent::DetectorCapabilityReady { capability });
    }
}
