//! Vision backend boundary.
//!
//! The core never talks to a model directly. A host plugs in a
//! [`VisionBackend`] (MediaPipe over WASM, ONNX, a test double...) and the
//! [`DetectorProvider`] builds the detectors from it exactly once.

mod provider;

pub use provider::DetectorProvider;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::ModelAsset;
use crate::media::VideoFrame;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityKind {
    Runtime,
    FaceDetector,
    ObjectDetector,
    FaceLandmarker,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum RunningMode {
    Image,
    #[default]
    Video,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BoundingBox {
    pub origin_x: f32,
    pub origin_y: f32,
    pub width: f32,
    pub height: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Category {
    pub name: String,
    pub score: f32,
}

impl Category {
    pub fn new(name: impl Into<String>, score: f32) -> Self {
        Self {
            name: name.into(),
            score,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct FaceDetection {
    pub bounding_box: Option<BoundingBox>,
    pub score: f32,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct FaceDetections {
    pub detections: Vec<FaceDetection>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ObjectDetection {
    pub bounding_box: Option<BoundingBox>,
    /// Ranked best first.
    pub categories: Vec<Category>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ObjectDetections {
    pub detections: Vec<ObjectDetection>,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct LandmarkResult {
    pub faces: Vec<Vec<Landmark>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FaceDetectorOptions {
    pub model: ModelAsset,
    pub running_mode: RunningMode,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ObjectDetectorOptions {
    pub model: ModelAsset,
    pub running_mode: RunningMode,
    pub score_threshold: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FaceLandmarkerOptions {
    pub model: ModelAsset,
    pub running_mode: RunningMode,
    pub num_faces: u32,
}

/// `timestamp_ms` must increase monotonically per detector in video mode.
pub trait FaceDetector: Send + Sync {
    fn detect_for_video(
        &self,
        frame: &VideoFrame,
        timestamp_ms: f64,
    ) -> anyhow::Result<FaceDetections>;
}

pub trait ObjectDetector: Send + Sync {
    fn detect_for_video(
        &self,
        frame: &VideoFrame,
        timestamp_ms: f64,
    ) -> anyhow::Result<ObjectDetections>;
}

/// Reserved: built when configured, not consumed by the aggregation.
pub trait FaceLandmarker: Send + Sync {
    fn detect_for_video(
        &self,
        frame: &VideoFrame,
        timestamp_ms: f64,
    ) -> anyhow::Result<LandmarkResult>;
}

/// Model loading. Every method may block on asset download or compilation;
/// the provider calls them on the blocking pool, in declaration order.
pub trait VisionBackend: Send + Sync + 'static {
    fn resolve_runtime(&self, wasm_root: &str) -> anyhow::Result<()>;

    fn create_face_detector(
        &self,
        options: &FaceDetectorOptions,
    ) -> anyhow::Result<Arc<dyn FaceDetector>>;

    fn create_object_detector(
        &self,
        options: &ObjectDetectorOptions,
    ) -> anyhow::Result<Arc<dyn ObjectDetector>>;

    fn create_face_landmarker(
        &self,
        options: &FaceLandmarkerOptions,
    ) -> anyhow::Result<Arc<dyn FaceLandmarker>>;
}
