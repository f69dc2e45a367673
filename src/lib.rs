//! Exam proctoring monitor.
//!
//! A [`ProctoringSession`] runs independent monitors (fullscreen, tab focus,
//! input suppression and camera sampling) against host-supplied platform
//! adapters and folds their outputs into a single [`AdmissionDecision`].

pub mod utils;

pub mod admission;
pub mod config;
pub mod diagnostics;
pub mod environment;
pub mod error;
pub mod media;
pub mod sampling;
pub mod session;
pub mod violations;
pub mod vision;

pub use admission::{AdmissionDecision, PauseReason};
pub use config::{ConfigStore, ProctoringConfig};
pub use diagnostics::{log_sink, DiagnosticEvent, DiagnosticSink, MemorySink, SharedSink};
pub use environment::{Document, FullScreenStatus, MemoryDocument};
pub use error::{ProctorError, Result};
pub use media::{MediaDevices, VideoSourceHandle};
pub use sampling::{RefreshSource, SamplerKind, SamplerState};
pub use session::{CamDetectionView, FullScreenView, Platform, ProctoringSession, TabFocusView};
pub use violations::{CameraStatus, ViolationStatus};
pub use vision::{DetectorProvider, VisionBackend};

/// Installs `env_logger` honouring `RUST_LOG`, defaulting to `info`.
/// Returns quietly if the host already installed a logger.
pub fn init_logging() {
    let env = env_logger::Env::default().default_filter_or("info");
    let _ = env_logger::Builder::from_env(env).try_init();

    log::info!("proctor logging initialised");
}
