use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    sync::RwLock,
    time::Duration,
};

use crate::error::{ProctorError, Result};
use crate::media::ReadyState;

pub const CONFIG_PATH_ENV: &str = "PROCTOR_CONFIG";

const DEFAULT_WASM_ROOT: &str =
    "https://cdn.jsdelivr.net/npm/@mediapipe/tasks-vision@latest/wasm";
const DEFAULT_FACE_MODEL: &str = concat!(
    "https://storage.googleapis.com/mediapipe-models/",
    "face_detector/blaze_face_short_range/float16/latest/blaze_face_short_range.tflite",
);
const DEFAULT_OBJECT_MODEL: &str = concat!(
    "https://storage.googleapis.com/mediapipe-tasks/",
    "object_detector/efficientdet_lite0_uint8.tflite",
);
pub const DEFAULT_LANDMARK_MODEL: &str = concat!(
    "https://storage.googleapis.com/mediapipe-models/",
    "face_landmarker/face_landmarker/float16/latest/face_landmarker.task",
);

/// Execution delegate requested for a model.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum Delegate {
    Cpu,
    Gpu,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ModelAsset {
    pub path: String,
    pub delegate: Delegate,
}

impl ModelAsset {
    pub fn new(path: impl Into<String>, delegate: Delegate) -> Self {
        Self {
            path: path.into(),
            delegate,
        }
    }
}

/// How many extra load attempts the detector provider makes on its own.
/// `max_attempts == 0` means a failed load waits for a manual `retry()`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 0,
            backoff_ms: 1_000,
        }
    }
}

impl RetryPolicy {
    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct DetectorConfig {
    /// Locator of the shared vision runtime bundle.
    pub wasm_root: String,
    /// Short-range face detector, accelerated.
    pub face_model: ModelAsset,
    pub object_model: ModelAsset,
    /// Landmarker is reserved; only built when configured.
    pub landmark_model: Option<ModelAsset>,
    pub object_score_threshold: f32,
    pub max_faces: u32,
    pub retry: RetryPolicy,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            wasm_root: DEFAULT_WASM_ROOT.into(),
            face_model: ModelAsset::new(DEFAULT_FACE_MODEL, Delegate::Gpu),
            object_model: ModelAsset::new(DEFAULT_OBJECT_MODEL, Delegate::Cpu),
            landmark_model: None,
            object_score_threshold: 0.2,
            max_faces: 1,
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct SamplerConfig {
    /// Refresh period used when the host does not drive refresh ticks.
    pub refresh_interval_ms: u64,
    /// Minimum buffered-data level before a frame is handed to a detector.
    pub min_ready_state: ReadyState,
    pub detection_timeout_ms: u64,
    /// Consecutive ticks a loop may miss before its half of the camera
    /// status is dropped as stale.
    pub max_missed_ticks: u32,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            refresh_interval_ms: 16,
            min_ready_state: ReadyState::HaveCurrentData,
            detection_timeout_ms: 2_000,
            max_missed_ticks: 1,
        }
    }
}

impl SamplerConfig {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms.max(1))
    }

    pub fn detection_timeout(&self) -> Duration {
        Duration::from_millis(self.detection_timeout_ms)
    }
}

/// Admission treatment of a camera monitor that has not produced a frame.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum UnsampledCameraPolicy {
    #[default]
    FailClosed,
    FailOpen,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct AdmissionConfig {
    pub unsampled_camera: UnsampledCameraPolicy,
    /// The one object category that is expected in frame.
    pub allowed_category: String,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            unsampled_camera: UnsampledCameraPolicy::FailClosed,
            allowed_category: crate::violations::ALLOWED_CATEGORY.into(),
        }
    }
}

/// Per-session switches plus the tunables of every monitor.
/// A switch left at `false` means the corresponding monitor is disabled.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct ProctoringConfig {
    pub prevent_tab_switch: bool,
    pub force_full_screen: bool,
    pub prevent_context_menu: bool,
    pub prevent_user_selection: bool,
    pub prevent_copy: bool,
    pub monitor_cam: bool,
    pub detector: DetectorConfig,
    pub sampler: SamplerConfig,
    pub admission: AdmissionConfig,
}

impl ProctoringConfig {
    /// Every monitor enabled, as a strict exam would run.
    pub fn strict() -> Self {
        Self {
            prevent_tab_switch: true,
            force_full_screen: true,
            prevent_context_menu: true,
            prevent_user_selection: true,
            prevent_copy: true,
            monitor_cam: true,
            ..Self::default()
        }
    }
}

pub struct ConfigStore {
    path: PathBuf,
    data: RwLock<ProctoringConfig>,
}

impl ConfigStore {
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let data = if path.exists() {
            let contents = fs::read_to_string(&path).map_err(|err| {
                ProctorError::Config(format!("failed to read {}: {err}", path.display()))
            })?;
            serde_json::from_str(&contents).map_err(|err| {
                ProctorError::Config(format!("invalid config {}: {err}", path.display()))
            })?
        } else {
            ProctoringConfig::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    /// Loads from `$PROCTOR_CONFIG`, falling back to defaults when unset.
    pub fn from_env() -> Result<Option<Self>> {
        match std::env::var_os(CONFIG_PATH_ENV) {
            Some(path) => Self::load(PathBuf::from(path)).map(Some),
            None => Ok(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self) -> ProctoringConfig {
        match self.data.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn update(&self, config: ProctoringConfig) -> Result<()> {
        let mut guard = match self.data.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        self.persist(&config)?;
        *guard = config;
        Ok(())
    }

    fn persist(&self, data: &ProctoringConfig) -> Result<()> {
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized).map_err(|err| {
            ProctorError::Config(format!("failed to write {}: {err}", self.path.display()))
        })
    }
}
