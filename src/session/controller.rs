use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::admission::{evaluate, AdmissionDecision, AdmissionInputs, AdmissionWatcher};
use crate::config::ProctoringConfig;
use crate::diagnostics::SharedSink;
use crate::environment::{
    Document, FullscreenMonitor, InputSuppressor, SuppressionKind, TabFocusMonitor,
};
use crate::error::{ProctorError, Result};
use crate::media::{MediaDevices, VideoSourceHandle};
use crate::sampling::{CameraMonitor, RefreshSource, SamplerKind, SamplerState};
use crate::violations::ViolationAggregator;
use crate::vision::DetectorProvider;

use super::{CamDetectionView, FullScreenView, TabFocusView};

const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info};

/// Everything the host supplies for a session.
pub struct Platform {
    pub document: Arc<dyn Document>,
    pub media: Arc<dyn MediaDevices>,
    pub provider: Arc<DetectorProvider>,
    pub refresh: RefreshSource,
    pub sink: SharedSink,
}

pub struct ProctoringSession {
    id: String,
    started_at: DateTime<Utc>,
    config: ProctoringConfig,
    fullscreen: FullscreenMonitor,
    tab_focus: TabFocusMonitor,
    suppressors: Vec<InputSuppressor>,
    camera: Arc<Mutex<CameraMonitor>>,
    camera_task: Option<JoinHandle<()>>,
    video: VideoSourceHandle,
    aggregator: ViolationAggregator,
    sampler_states: [watch::Receiver<SamplerState>; 2],
    admission_rx: watch::Receiver<AdmissionDecision>,
    admission_task: Option<JoinHandle<()>>,
    cancel_token: CancellationToken,
}

impl ProctoringSession {
    /// Attaches every enabled monitor and starts the camera in the
    /// background. Must be called inside a tokio runtime.
    pub async fn start(config: ProctoringConfig, platform: Platform) -> Self {
        let Platform {
            document,
            media,
            provider,
            refresh,
            sink,
        } = platform;

        let id = Uuid::new_v4().to_string();
        let cancel_token = CancellationToken::new();
        log_info!("starting proctoring session {id}");

        let mut fullscreen = FullscreenMonitor::new(
            !config.force_full_screen,
            Arc::clone(&document),
            Arc::clone(&sink),
        );
        fullscreen.start();

        let mut tab_focus = TabFocusMonitor::new(
            !config.prevent_tab_switch,
            Arc::clone(&document),
            Arc::clone(&sink),
        );
        tab_focus.start();

        let suppressors = SuppressionKind::ALL
            .into_iter()
            .map(|kind| {
                let disabled = match kind {
                    SuppressionKind::Copy => !config.prevent_copy,
                    SuppressionKind::ContextMenu => !config.prevent_context_menu,
                    SuppressionKind::Selection => !config.prevent_user_selection,
                };
                let mut suppressor =
                    InputSuppressor::new(kind, disabled, Arc::clone(&document), Arc::clone(&sink));
                suppressor.start();
                suppressor
            })
            .collect();

        let aggregator = ViolationAggregator::new(&config.admission.allowed_category);
        let camera = CameraMonitor::new(
            !config.monitor_cam,
            provider,
            media,
            aggregator.clone(),
            config.sampler.clone(),
            refresh,
            Arc::clone(&sink),
            cancel_token.child_token(),
        );
        let video = camera.video_source();
        let sampler_states = SamplerKind::ALL.map(|kind| camera.sampler_state(kind));
        let camera = Arc::new(Mutex::new(camera));

        let camera_task = config.monitor_cam.then(|| {
            let camera = Arc::clone(&camera);
            tokio::spawn(async move {
                // Denied access is already logged and reported by the monitor.
                if let Err(err) = camera.lock().await.start().await {
                    log_error!("camera monitor did not start: {err}");
                }
            })
        });

        let watcher = AdmissionWatcher {
            fullscreen_disabled: fullscreen.is_disabled(),
            fullscreen: fullscreen.subscribe(),
            tab_focus_disabled: tab_focus.is_disabled(),
            tab_focus: tab_focus.subscribe(),
            camera_disabled: !config.monitor_cam,
            camera: aggregator.subscribe(),
            policy: config.admission.unsampled_camera,
        };
        let (admission_tx, admission_rx) = watch::channel(watcher.decide());
        let admission_task = tokio::spawn(watcher.run(
            admission_tx,
            Arc::clone(&sink),
            cancel_token.child_token(),
        ));

        Self {
            id,
            started_at: Utc::now(),
            config,
            fullscreen,
            tab_focus,
            suppressors,
            camera,
            camera_task,
            video,
            aggregator,
            sampler_states,
            admission_rx,
            admission_task: Some(admission_task),
            cancel_token,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn config(&self) -> &ProctoringConfig {
        &self.config
    }

    pub fn full_screen(&self) -> FullScreenView {
        FullScreenView {
            status: self.fullscreen.subscribe(),
            trigger: self.fullscreen.trigger_handle(),
        }
    }

    pub fn tab_focus(&self) -> TabFocusView {
        TabFocusView {
            status: self.tab_focus.subscribe(),
        }
    }

    pub fn cam_detection(&self) -> CamDetectionView {
        CamDetectionView {
            status: self.aggregator.subscribe(),
            video_source: self.video.clone(),
        }
    }

    pub fn sampler_state(&self, kind: SamplerKind) -> SamplerState {
        let index = match kind {
            SamplerKind::Face => 0,
            SamplerKind::Object => 1,
        };
        *self.sampler_states[index].borrow()
    }

    /// Evaluated from the current monitor values, independent of the watcher.
    pub fn admission(&self) -> AdmissionDecision {
        let inputs = AdmissionInputs {
            fullscreen_disabled: self.fullscreen.is_disabled(),
            fullscreen: self.fullscreen.current(),
            tab_focus_disabled: self.tab_focus.is_disabled(),
            tab_focused: self.tab_focus.current(),
            camera_disabled: !self.config.monitor_cam,
            camera: self.aggregator.current(),
        };
        evaluate(&inputs, self.config.admission.unsampled_camera)
    }

    /// Notifies whenever the admission decision changes.
    pub fn admission_updates(&self) -> watch::Receiver<AdmissionDecision> {
        self.admission_rx.clone()
    }

    /// Detaches every listener, stops both sampling loops and releases the
    /// camera. Safe to call more than once.
    pub async fn shutdown(&mut self) -> Result<()> {
        self.cancel_token.cancel();

        self.fullscreen.stop();
        self.tab_focus.stop();
        for suppressor in &mut self.suppressors {
            suppressor.stop();
        }

        let mut failure = None;
        if let Some(task) = self.camera_task.take() {
            if let Err(err) = task.await {
                failure = Some(ProctorError::Shutdown(format!("camera start task: {err}")));
            }
        }
        if let Err(err) = self.camera.lock().await.stop().await {
            failure = Some(err);
        }
        if let Some(task) = self.admission_task.take() {
            if let Err(err) = task.await {
                failure = Some(ProctorError::Shutdown(format!("admission watcher: {err}")));
            }
        }

        log_info!("proctoring session {} shut down", self.id);
        match failure {
            Some(err) => {
                log_error!("session teardown incomplete: {err}");
                Err(err)
            }
            None => Ok(()),
        }
    }
}

impl Drop for ProctoringSession {
    fn drop(&mut self) {
        // Listener guards detach on drop; loops and the watcher exit on cancel.
        self.cancel_token.cancel();
    }
}
