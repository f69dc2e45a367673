use serde::{Deserialize, Serialize};

use crate::vision::{FaceDetections, ObjectDetection, ObjectDetections};

/// The one object category expected in frame: the examinee.
pub const ALLOWED_CATEGORY: &str = "person";

/// Label given to a detected object that came back without any category.
pub const UNKNOWN_CATEGORY: &str = "unknown";

/// Normalized output of one detection pass.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionFrame {
    pub face_count: usize,
    /// One label per detected object, duplicates kept.
    pub object_categories: Vec<String>,
}

impl DetectionFrame {
    pub fn new(face_count: usize, object_categories: Vec<String>) -> Self {
        Self {
            face_count,
            object_categories,
        }
    }

    /// Reduces to the next status. Every frame fully replaces the previous one.
    pub fn reduce(&self, allowed_category: &str) -> ViolationStatus {
        ViolationStatus {
            faces_detected: self.face_count,
            object_detected: disallowed(&self.object_categories, allowed_category),
        }
    }
}

/// Top-ranked category of a detection, `"unknown"` when none was reported.
pub fn top_category(detection: &ObjectDetection) -> String {
    detection
        .categories
        .first()
        .map(|category| category.name.trim())
        .filter(|name| !name.is_empty())
        .unwrap_or(UNKNOWN_CATEGORY)
        .to_string()
}

fn disallowed(categories: &[String], allowed_category: &str) -> Vec<String> {
    categories
        .iter()
        .filter(|category| category.as_str() != allowed_category)
        .cloned()
        .collect()
}

/// Output of one loop's sample. The face and object loops run independently,
/// so each one only replaces its own half of the status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameUpdate {
    Faces(usize),
    Objects(Vec<String>),
    /// The face loop missed too many ticks; its last count no longer holds.
    FacesLost,
    ObjectsLost,
}

impl From<&FaceDetections> for FrameUpdate {
    fn from(result: &FaceDetections) -> Self {
        FrameUpdate::Faces(result.detections.len())
    }
}

impl From<&ObjectDetections> for FrameUpdate {
    fn from(result: &ObjectDetections) -> Self {
        FrameUpdate::Objects(result.detections.iter().map(top_category).collect())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViolationStatus {
    pub faces_detected: usize,
    /// Disallowed categories from the latest object sample.
    pub object_detected: Vec<String>,
}

impl ViolationStatus {
    /// Anything but exactly one face, or any disallowed object.
    pub fn is_violation(&self) -> bool {
        self.faces_detected != 1 || !self.object_detected.is_empty()
    }
}

/// Published camera state: the violation snapshot, how many samples each
/// loop has contributed since the session started, and whether each half is
/// backed by a recent sample.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CameraStatus {
    pub violation_status: ViolationStatus,
    pub face_samples: u64,
    pub object_samples: u64,
    pub face_current: bool,
    pub object_current: bool,
}

impl CameraStatus {
    /// Both halves hold a current observation. A zero face count or an empty
    /// object list only means something once its loop has sampled.
    pub fn has_sampled(&self) -> bool {
        self.face_current && self.object_current
    }

    pub fn apply(&mut self, update: FrameUpdate, allowed_category: &str) {
        match update {
            FrameUpdate::Faces(count) => {
                self.violation_status.faces_detected = count;
                self.face_samples += 1;
                self.face_current = true;
            }
            FrameUpdate::Objects(categories) => {
                self.violation_status.object_detected = disallowed(&categories, allowed_category);
                self.object_samples += 1;
                self.object_current = true;
            }
            FrameUpdate::FacesLost => {
                self.violation_status.faces_detected = 0;
                self.face_current = false;
            }
            FrameUpdate::ObjectsLost => {
                self.violation_status.object_detected.clear();
                self.object_current = false;
            }
        }
    }
}
