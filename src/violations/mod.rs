pub mod aggregator;
pub mod state;

pub use aggregator::ViolationAggregator;
pub use state::{
    top_category, CameraStatus, DetectionFrame, FrameUpdate, ViolationStatus, ALLOWED_CATEGORY,
    UNKNOWN_CATEGORY,
};
