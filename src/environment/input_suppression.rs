use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::diagnostics::SharedSink;

use super::{Document, DomEvent, DomEventKind, ListenerGuard, ListenerOptions, MonitorKind};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SuppressionKind {
    Copy,
    ContextMenu,
    Selection,
}

impl SuppressionKind {
    pub const ALL: [SuppressionKind; 3] = [
        SuppressionKind::Copy,
        SuppressionKind::ContextMenu,
        SuppressionKind::Selection,
    ];

    pub fn event(self) -> DomEventKind {
        match self {
            SuppressionKind::Copy => DomEventKind::Copy,
            SuppressionKind::ContextMenu => DomEventKind::ContextMenu,
            SuppressionKind::Selection => DomEventKind::SelectStart,
        }
    }

    fn monitor(self) -> MonitorKind {
        match self {
            SuppressionKind::Copy => MonitorKind::Copy,
            SuppressionKind::ContextMenu => MonitorKind::ContextMenu,
            SuppressionKind::Selection => MonitorKind::Selection,
        }
    }
}

/// Cancels the default action of one input event while attached. No status.
pub struct InputSuppressor {
    kind: SuppressionKind,
    disabled: bool,
    document: Arc<dyn Document>,
    sink: SharedSink,
    listener: Option<ListenerGuard>,
}

impl InputSuppressor {
    pub fn new(
        kind: SuppressionKind,
        disabled: bool,
        document: Arc<dyn Document>,
        sink: SharedSink,
    ) -> Self {
        Self {
            kind,
            disabled,
            document,
            sink,
            listener: None,
        }
    }

    pub fn kind(&self) -> SuppressionKind {
        self.kind
    }

    pub fn is_active(&self) -> bool {
        self.listener.is_some()
    }

    pub fn start(&mut self) {
        if self.disabled || self.listener.is_some() {
            return;
        }
        self.listener = Some(ListenerGuard::attach(
            &self.document,
            self.kind.monitor(),
            self.kind.event(),
            Arc::new(|event: &mut DomEvent| event.prevent_default()),
            ListenerOptions { capture: true },
            &self.sink,
        ));
    }

    pub fn stop(&mut self) {
        self.listener = None;
    }
}
