use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::environment::MonitorKind;
use crate::sampling::{SamplerKind, SamplerState};
use crate::vision::CapabilityKind;

/// Structured events emitted by the monitors. Sinks decide where they go.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DiagnosticEvent {
    DetectorLoadStarted { attempt: u32 },
    DetectorCapabilityReady { capability: CapabilityKind },
    DetectorLoadFailed { attempt: u32, error: String },
    MediaAccessDenied { error: String },
    StreamAttached { tracks: usize },
    TracksReleased { stopped: usize },
    SamplerStateChanged { sampler: SamplerKind, state: SamplerState },
    DetectionFailed { sampler: SamplerKind, error: String },
    MonitorAttached { monitor: MonitorKind },
    MonitorDetached { monitor: MonitorKind },
    FullscreenTriggerRejected { error: String },
    AdmissionChanged { allowed: bool },
}

pub trait DiagnosticSink: Send + Sync {
    fn record(&self, event: DiagnosticEvent);
}

pub type SharedSink = Arc<dyn DiagnosticSink>;

/// Default sink: forwards every event to the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl DiagnosticSink for LogSink {
    fn record(&self, event: DiagnosticEvent) {
        match &event {
            DiagnosticEvent::DetectorLoadFailed { .. }
            | DiagnosticEvent::MediaAccessDenied { .. } => {
                log::error!("[proctor] {event:?}");
            }
            DiagnosticEvent::DetectionFailed { .. }
            | DiagnosticEvent::FullscreenTriggerRejected { .. } => {
                log::warn!("[proctor] {event:?}");
            }
            _ => log::info!("[proctor] {event:?}"),
        }
    }
}

pub fn log_sink() -> SharedSink {
    Arc::new(LogSink)
}

/// Records events in memory with their arrival time.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<(DateTime<Utc>, DiagnosticEvent)>>,
}

impl MemorySink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<DiagnosticEvent> {
        self.lock().iter().map(|(_, event)| event.clone()).collect()
    }

    pub fn contains(&self, predicate: impl Fn(&DiagnosticEvent) -> bool) -> bool {
        self.lock().iter().any(|(_, event)| predicate(event))
    }

    pub fn count(&self, predicate: impl Fn(&DiagnosticEvent) -> bool) -> usize {
        self.lock().iter().filter(|(_, event)| predicate(event)).count()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<(DateTime<Utc>, DiagnosticEvent)>> {
        match self.events.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl DiagnosticSink for MemorySink {
    fn record(&self, event: DiagnosticEvent) {
        self.lock().push((Utc::now(), event));
    }
}
