//! Browser-level signals: fullscreen, tab visibility and input suppression.
//!
//! The host exposes its document through [`Document`]; monitors attach
//! listeners through it and hold a [`ListenerGuard`] per listener so that
//! dropping a monitor always detaches what it added.

pub mod fullscreen;
pub mod input_suppression;
pub mod memory;
pub mod tab_focus;

pub use fullscreen::{FullScreenStatus, FullscreenMonitor, FullscreenTrigger};
pub use input_suppression::{InputSuppressor, SuppressionKind};
pub use memory::MemoryDocument;
pub use tab_focus::TabFocusMonitor;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::diagnostics::{DiagnosticEvent, SharedSink};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MonitorKind {
    Fullscreen,
    TabFocus,
    Copy,
    ContextMenu,
    Selection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DomEventKind {
    FullscreenChange,
    VisibilityChange,
    Copy,
    ContextMenu,
    SelectStart,
}

impl DomEventKind {
    pub fn name(self) -> &'static str {
        match self {
            DomEventKind::FullscreenChange => "fullscreenchange",
            DomEventKind::VisibilityChange => "visibilitychange",
            DomEventKind::Copy => "copy",
            DomEventKind::ContextMenu => "contextmenu",
            DomEventKind::SelectStart => "selectstart",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomEvent {
    pub kind: DomEventKind,
    default_prevented: bool,
}

impl DomEvent {
    pub fn new(kind: DomEventKind) -> Self {
        Self {
            kind,
            default_prevented: false,
        }
    }

    pub fn prevent_default(&mut self) {
        self.default_prevented = true;
    }

    pub fn default_prevented(&self) -> bool {
        self.default_prevented
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Visible,
    Hidden,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ListenerOptions {
    /// Run during the capture phase, ahead of page handlers.
    pub capture: bool,
}

pub type EventHandler = Arc<dyn Fn(&mut DomEvent) + Send + Sync>;

/// What the host document has to offer the monitors.
pub trait Document: Send + Sync {
    /// Whether fullscreen exists at all in this environment.
    fn fullscreen_enabled(&self) -> bool;
    fn has_fullscreen_element(&self) -> bool;
    /// Requests fullscreen on the root element. May be refused, e.g. outside
    /// a user gesture.
    fn request_fullscreen(&self) -> anyhow::Result<()>;
    fn visibility(&self) -> Visibility;
    fn add_event_listener(
        &self,
        kind: DomEventKind,
        handler: EventHandler,
        options: ListenerOptions,
    ) -> ListenerId;
    fn remove_event_listener(&self, id: ListenerId);
}

/// Detaches its listener when dropped.
pub struct ListenerGuard {
    document: Arc<dyn Document>,
    id: ListenerId,
    monitor: MonitorKind,
    sink: SharedSink,
}

impl ListenerGuard {
    pub fn attach(
        document: &Arc<dyn Document>,
        monitor: MonitorKind,
        kind: DomEventKind,
        handler: EventHandler,
        options: ListenerOptions,
        sink: &SharedSink,
    ) -> Self {
        let id = document.add_event_listener(kind, handler, options);
        sink.record(DiagnosticEvent::MonitorAttached { monitor });
        Self {
            document: Arc::clone(document),
            id,
            monitor,
            sink: Arc::clone(sink),
        }
    }

    pub fn id(&self) -> ListenerId {
        self.id
    }
}

impl Drop for ListenerGuard {
    fn drop(&mut self) {
        self.document.remove_event_listener(self.id);
        self.sink.record(DiagnosticEvent::MonitorDetached {
            monitor: self.monitor,
        });
    }
}
