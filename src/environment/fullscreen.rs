use std::sync::{Arc, Weak};

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::diagnostics::{DiagnosticEvent, SharedSink};
use crate::error::{ProctorError, Result};

use super::{Document, DomEvent, DomEventKind, ListenerGuard, ListenerOptions, MonitorKind};

const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum FullScreenStatus {
    On,
    #[default]
    Off,
    Unsupported,
}

fn read_status(document: &dyn Document) -> FullScreenStatus {
    if !document.fullscreen_enabled() {
        FullScreenStatus::Unsupported
    } else if document.has_fullscreen_element() {
        FullScreenStatus::On
    } else {
        FullScreenStatus::Off
    }
}

/// State the change handler works on. The handler holds it weakly so a
/// listener the host forgets to drop cannot keep the document alive.
struct FullscreenState {
    document: Weak<dyn Document>,
    status: watch::Sender<FullScreenStatus>,
}

impl FullscreenState {
    fn refresh(&self) {
        if let Some(document) = self.document.upgrade() {
            self.status.send_if_modified(|current| {
                let next = read_status(document.as_ref());
                let changed = *current != next;
                *current = next;
                changed
            });
        }
    }
}

pub struct FullscreenMonitor {
    disabled: bool,
    document: Arc<dyn Document>,
    state: Arc<FullscreenState>,
    sink: SharedSink,
    listener: Option<ListenerGuard>,
}

impl FullscreenMonitor {
    pub fn new(disabled: bool, document: Arc<dyn Document>, sink: SharedSink) -> Self {
        let (status, _) = watch::channel(FullScreenStatus::Off);
        let state = Arc::new(FullscreenState {
            document: Arc::downgrade(&document),
            status,
        });
        Self {
            disabled,
            document,
            state,
            sink,
            listener: None,
        }
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    /// Reads the current state and starts following `fullscreenchange`.
    pub fn start(&mut self) {
        if self.disabled || self.listener.is_some() {
            return;
        }

        self.state.refresh();
        if self.current() == FullScreenStatus::Unsupported {
            log_warn!("fullscreen is not supported in this environment");
            return;
        }

        let state = Arc::clone(&self.state);
        self.listener = Some(ListenerGuard::attach(
            &self.document,
            MonitorKind::Fullscreen,
            DomEventKind::FullscreenChange,
            Arc::new(move |_: &mut DomEvent| state.refresh()),
            ListenerOptions::default(),
            &self.sink,
        ));
    }

    pub fn stop(&mut self) {
        self.listener = None;
    }

    pub fn current(&self) -> FullScreenStatus {
        *self.state.status.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<FullScreenStatus> {
        self.state.status.subscribe()
    }

    /// Asks for fullscreen on the root element. A refusal is logged and
    /// reported; the status only changes when the environment says so.
    pub fn trigger(&self) -> Result<()> {
        trigger_fullscreen(self.disabled, self.document.as_ref(), &self.sink)
    }

    /// Cloneable trigger for the presentation layer.
    pub fn trigger_handle(&self) -> FullscreenTrigger {
        FullscreenTrigger {
            disabled: self.disabled,
            document: Arc::clone(&self.document),
            sink: Arc::clone(&self.sink),
        }
    }
}

#[derive(Clone)]
pub struct FullscreenTrigger {
    disabled: bool,
    document: Arc<dyn Document>,
    sink: SharedSink,
}

impl FullscreenTrigger {
    pub fn trigger(&self) -> Result<()> {
        trigger_fullscreen(self.disabled, self.document.as_ref(), &self.sink)
    }
}

fn trigger_fullscreen(disabled: bool, document: &dyn Document, sink: &SharedSink) -> Result<()> {
    if disabled {
        return Ok(());
    }
    match document.request_fullscreen() {
        Ok(()) => {
            log_info!("fullscreen requested");
            Ok(())
        }
        Err(err) => {
            let error = format!("{err:#}");
            log_warn!("fullscreen request rejected: {error}");
            sink.record(DiagnosticEvent::FullscreenTriggerRejected {
                error: error.clone(),
            });
            Err(ProctorError::Trigger(error))
        }
    }
}
