use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::config::UnsampledCameraPolicy;
use crate::diagnostics::{DiagnosticEvent, SharedSink};
use crate::environment::FullScreenStatus;
use crate::violations::CameraStatus;

const ENABLE_LOGS: bool = true;

use crate::log_info;

/// Latest value of every monitor the decision depends on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdmissionInputs {
    pub fullscreen_disabled: bool,
    pub fullscreen: FullScreenStatus,
    pub tab_focus_disabled: bool,
    pub tab_focused: bool,
    pub camera_disabled: bool,
    pub camera: CameraStatus,
}

impl Default for AdmissionInputs {
    fn default() -> Self {
        Self {
            fullscreen_disabled: true,
            fullscreen: FullScreenStatus::Off,
            tab_focus_disabled: true,
            tab_focused: true,
            camera_disabled: true,
            camera: CameraStatus::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum PauseReason {
    FullscreenOff,
    FullscreenUnsupported,
    TabHidden,
    /// Anything but exactly one face.
    FaceCount(usize),
    DisallowedObjects(Vec<String>),
    /// Camera monitoring is on but the face or object loop has no current
    /// sample (not started, detector missing, or stalled).
    CameraNotSampling,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionDecision {
    pub allowed: bool,
    pub reasons: Vec<PauseReason>,
}

impl AdmissionDecision {
    pub fn is_paused(&self) -> bool {
        !self.allowed
    }
}

/// Pure gate: every enabled monitor has to pass. Disabled monitors always pass.
pub fn evaluate(inputs: &AdmissionInputs, policy: UnsampledCameraPolicy) -> AdmissionDecision {
    let mut reasons = Vec::new();

    if !inputs.fullscreen_disabled {
        match inputs.fullscreen {
            FullScreenStatus::On => {}
            FullScreenStatus::Off => reasons.push(PauseReason::FullscreenOff),
            FullScreenStatus::Unsupported => reasons.push(PauseReason::FullscreenUnsupported),
        }
    }

    if !inputs.tab_focus_disabled && !inputs.tab_focused {
        reasons.push(PauseReason::TabHidden);
    }

    if !inputs.camera_disabled {
        camera_reasons(&inputs.camera, policy, &mut reasons);
    }

    AdmissionDecision {
        allowed: reasons.is_empty(),
        reasons,
    }
}

fn camera_reasons(
    camera: &CameraStatus,
    policy: UnsampledCameraPolicy,
    reasons: &mut Vec<PauseReason>,
) {
    if !camera.has_sampled() {
        if policy == UnsampledCameraPolicy::FailClosed {
            reasons.push(PauseReason::CameraNotSampling);
        }
        return;
    }

    let status = &camera.violation_status;
    if status.faces_detected != 1 {
        reasons.push(PauseReason::FaceCount(status.faces_detected));
    }
    if !status.object_detected.is_empty() {
        reasons.push(PauseReason::DisallowedObjects(status.object_detected.clone()));
    }
}

/// Receivers for every monitor output, plus the fixed disabled flags.
pub struct AdmissionWatcher {
    pub fullscreen_disabled: bool,
    pub fullscreen: watch::Receiver<FullScreenStatus>,
    pub tab_focus_disabled: bool,
    pub tab_focus: watch::Receiver<bool>,
    pub camera_disabled: bool,
    pub camera: watch::Receiver<CameraStatus>,
    pub policy: UnsampledCameraPolicy,
}

impl AdmissionWatcher {
    pub fn snapshot(&self) -> AdmissionInputs {
        AdmissionInputs {
            fullscreen_disabled: self.fullscreen_disabled,
            fullscreen: *self.fullscreen.borrow(),
            tab_focus_disabled: self.tab_focus_disabled,
            tab_focused: *self.tab_focus.borrow(),
            camera_disabled: self.camera_disabled,
            camera: self.camera.borrow().clone(),
        }
    }

    pub fn decide(&self) -> AdmissionDecision {
        evaluate(&self.snapshot(), self.policy)
    }

    /// Recomputes on every publish from any monitor until cancelled or a
    /// monitor goes away. `tx` only notifies when the decision changes.
    pub async fn run(
        mut self,
        tx: watch::Sender<AdmissionDecision>,
        sink: SharedSink,
        cancel_token: CancellationToken,
    ) {
        publish(&tx, self.decide(), &sink);

        loop {
            let changed = tokio::select! {
                _ = cancel_token.cancelled() => break,
                res = self.fullscreen.changed() => res,
                res = self.tab_focus.changed() => res,
                res = self.camera.changed() => res,
            };
            if changed.is_err() {
                log_info!("admission watcher stopping: monitor closed");
                break;
            }

            self.fullscreen.mark_unchanged();
            self.tab_focus.mark_unchanged();
            self.camera.mark_unchanged();
            publish(&tx, self.decide(), &sink);
        }
    }
}

fn publish(tx: &watch::Sender<AdmissionDecision>, decision: AdmissionDecision, sink: &SharedSink) {
    let allowed = decision.allowed;
    let mut flipped = false;
    tx.send_if_modified(|current| {
        if *current == decision {
            return false;
        }
        flipped = current.allowed != decision.allowed;
        *current = decision;
        true
    });
    if flipped {
        log_info!("admission decision: {}", if allowed { "running" } else { "paused" });
        sink.record(DiagnosticEvent::AdmissionChanged { allowed });
    }
}
