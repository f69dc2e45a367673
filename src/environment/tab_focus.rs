use std::sync::{Arc, Weak};

use tokio::sync::watch;

use crate::diagnostics::SharedSink;

use super::{
    Document, DomEvent, DomEventKind, ListenerGuard, ListenerOptions, MonitorKind, Visibility,
};

struct TabFocusState {
    document: Weak<dyn Document>,
    focused: watch::Sender<bool>,
}

impl TabFocusState {
    fn refresh(&self) {
        if let Some(document) = self.document.upgrade() {
            let visible = document.visibility() == Visibility::Visible;
            self.focused.send_if_modified(|current| {
                let changed = *current != visible;
                *current = visible;
                changed
            });
        }
    }
}

/// `true` while the exam tab is visible. Every visibility change is applied
/// immediately; a disabled monitor stays `true`.
pub struct TabFocusMonitor {
    disabled: bool,
    document: Arc<dyn Document>,
    state: Arc<TabFocusState>,
    sink: SharedSink,
    listener: Option<ListenerGuard>,
}

impl TabFocusMonitor {
    pub fn new(disabled: bool, document: Arc<dyn Document>, sink: SharedSink) -> Self {
        let (focused, _) = watch::channel(true);
        let state = Arc::new(TabFocusState {
            document: Arc::downgrade(&document),
            focused,
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

    pub fn start(&mut self) {
        if self.disabled || self.listener.is_some() {
            return;
        }
        self.state.refresh();

        let state = Arc::clone(&self.state);
        self.listener = Some(ListenerGuard::attach(
            &self.document,
            MonitorKind::TabFocus,
            DomEventKind::VisibilityChange,
            Arc::new(move |_: &mut DomEvent| state.refresh()),
            ListenerOptions::default(),
            &self.sink,
        ));
    }

    pub fn stop(&mut self) {
        self.listener = None;
    }

    pub fn current(&self) -> bool {
        *self.state.focused.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.state.focused.subscribe()
    }
}
